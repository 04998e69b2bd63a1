//! Compiling charts and publishing them to playback.
//!
//! [`compile`] is the single entry point over both dialects. It builds into private values and returns a fresh
//! [`Timeline`]; nothing shared is touched until the caller hands the result to [`ChartHandle::publish`]. Dispatchers
//! reading from the handle notice the new generation on their next seek.

pub mod dispatcher;

use std::sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use thiserror::Error;

#[cfg(feature = "bmson")]
use crate::bmson::{BmsonWarning, compile_bmson};
use crate::{
    bms::{BmsWarningWithRange, CompilePasses, compile_bms},
    command::channel::ChannelMap,
    timeline::Timeline,
};

/// A chart source in one of the supported dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChartSource<'a> {
    /// The line-oriented BMS text.
    Bms(&'a str),
    /// A bmson JSON document.
    #[cfg(feature = "bmson")]
    Bmson(&'a str),
}

/// Options of a compilation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompileOptions {
    /// Which parts of a BMS source are read.
    pub passes: CompilePasses,
    /// Channel aliases.
    pub channel_map: ChannelMap,
    /// The tempo used when the chart does not declare a valid one.
    pub default_tempo: f64,
    /// Seed of the `#RANDOM` generator. `None` draws fresh entropy on every compilation.
    pub seed: Option<u64>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            passes: CompilePasses::default(),
            channel_map: ChannelMap::default(),
            default_tempo: crate::DEFAULT_TEMPO,
            seed: None,
        }
    }
}

/// A compilation that produced no timeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CompileError {
    /// The [`CancelFlag`] was raised.
    #[error("compilation was cancelled")]
    Cancelled,
    /// The bmson document could not be decoded.
    #[error("invalid bmson at `{path}`: {message}")]
    Json {
        /// Where in the document decoding failed.
        path: String,
        /// What went wrong.
        message: String,
    },
}

/// A recoverable problem found by either compiler.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum CompileWarning {
    /// From a BMS source.
    #[error(transparent)]
    Bms(#[from] BmsWarningWithRange),
    /// From a bmson document.
    #[cfg(feature = "bmson")]
    #[error(transparent)]
    Bmson(#[from] BmsonWarning),
}

/// The result of [`compile`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutput {
    /// The compiled chart.
    pub timeline: Timeline,
    /// Recoverable problems.
    pub warnings: Vec<CompileWarning>,
}

/// Compiles a chart in either dialect.
///
/// ```
/// use bms_timeline::chart_process::{CancelFlag, ChartSource, CompileOptions, compile};
///
/// let output = compile(ChartSource::Bms("#00111:01"), &CompileOptions::default(), &CancelFlag::new()).unwrap();
/// assert_eq!(output.timeline.events().len(), 1);
/// ```
///
/// # Errors
///
/// Returns [`CompileError::Cancelled`] if `cancel` is raised while compiling, or [`CompileError::Json`] when a bmson
/// document cannot be decoded.
pub fn compile(
    source: ChartSource<'_>,
    options: &CompileOptions,
    cancel: &CancelFlag,
) -> Result<CompileOutput, CompileError> {
    match source {
        ChartSource::Bms(text) => {
            let output = compile_bms(text, options, cancel)?;
            Ok(CompileOutput {
                timeline: output.timeline,
                warnings: output.warnings.into_iter().map(Into::into).collect(),
            })
        }
        #[cfg(feature = "bmson")]
        ChartSource::Bmson(text) => {
            let output = compile_bmson(text, options, cancel)?;
            Ok(CompileOutput {
                timeline: output.timeline,
                warnings: output.warnings.into_iter().map(Into::into).collect(),
            })
        }
    }
}

/// A cooperative cancellation flag shared between the compiling thread and its owner.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a lowered flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Compilations polling it stop at their next line or event.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns whether the flag is raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Polls the flag.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Cancelled`] if the flag is raised.
    pub fn check(&self) -> Result<(), CompileError> {
        if self.is_cancelled() {
            Err(CompileError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The published timeline of a chart, shared by every dispatcher playing it.
///
/// Publishing swaps the whole timeline at once and bumps the generation, so readers see either the old or the new
/// timeline and never a partial one.
#[derive(Debug, Default)]
pub struct ChartHandle {
    timeline: RwLock<Arc<Timeline>>,
    generation: AtomicU64,
}

impl ChartHandle {
    /// Creates a handle publishing `timeline` as generation 0.
    #[must_use]
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline: RwLock::new(Arc::new(timeline)),
            generation: AtomicU64::new(0),
        }
    }

    /// The current timeline.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Timeline> {
        self.load().0
    }

    /// The number of publishes so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// The current timeline together with its generation.
    #[must_use]
    pub fn load(&self) -> (Arc<Timeline>, u64) {
        let guard = self.timeline.read().unwrap_or_else(PoisonError::into_inner);
        (Arc::clone(&guard), self.generation.load(Ordering::Acquire))
    }

    /// Replaces the timeline, returning the new generation.
    pub fn publish(&self, timeline: Timeline) -> u64 {
        let mut guard = self.timeline.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(timeline);
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Compiles `source` and publishes the result. A failed compilation leaves the published timeline untouched.
    ///
    /// # Errors
    ///
    /// Returns the [`CompileError`] of [`compile`].
    pub fn recompile(
        &self,
        source: ChartSource<'_>,
        options: &CompileOptions,
        cancel: &CancelFlag,
    ) -> Result<Vec<CompileWarning>, CompileError> {
        let output = compile(source, options, cancel)?;
        self.publish(output.timeline);
        Ok(output.warnings)
    }
}
