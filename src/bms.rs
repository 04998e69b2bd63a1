//! The line-oriented BMS dialect.
//!
//! Compilation runs over the source once, line by line:
//!
//! 1. Lines inside a branch that is not taken only update the conditional state.
//! 2. Header directives fill the [`ChartHeader`].
//! 3. `#WAVxx`, `#BMPxx`, `#BGAxx`, `#BPMxx` and `#STOPxx` register resources.
//! 4. `#RANDOM`, `#IF` and friends feed the [`ConditionalEvaluator`].
//! 5. `#mmmcc:data` lines are decoded into objects.
//!
//! The collected objects are then resolved into wall-clock time by [`resolve`](resolve::resolve).
//!
//! Problems never abort compilation. They are returned as [`BmsWarningWithRange`]s alongside the timeline, and can be
//! rendered with [`crate::diagnostics`].
//!
//! ```
//! use bms_timeline::{bms::compile_bms, chart_process::{CancelFlag, CompileOptions}};
//!
//! let source = "#BPM 120\n#WAV01 kick.wav\n#00111:01\n";
//! let output = compile_bms(source, &CompileOptions::default(), &CancelFlag::new()).unwrap();
//! assert_eq!(output.timeline.events().len(), 1);
//! assert!(output.warnings.is_empty());
//! ```

pub mod body;
pub mod header;
pub mod lex;
pub mod random;
pub mod resolve;
pub mod resource;
pub mod rng;

use thiserror::Error;

use self::{
    body::{decode_cells, decode_measure_length},
    header::{HeaderOutcome, apply_header},
    lex::directives,
    random::{ConditionalEvaluator, ControlDirective, ControlFlowRule, ControlParse},
    resolve::{RawBody, resolve},
    resource::read_resource,
    rng::{Rng, default_rng},
};
use crate::{
    chart_process::{CancelFlag, CompileError, CompileOptions},
    command::{
        channel::{ChannelKind, ChannelMap, INVALID_CHANNEL},
        encode_base36,
        mixin::{SourceRangeMixin, SourceRangeMixinExt},
    },
    timeline::{ChartHeader, ResourceTable, Timeline},
};

/// A recoverable problem found while compiling a BMS source. The offending line or cell is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum BmsWarning {
    /// A cell that is not a base-36 pair, or a data string of odd length.
    #[error("malformed cell {cell:?}")]
    MalformedCell {
        /// The cell text.
        cell: String,
    },
    /// A channel `02` value that is not a positive number.
    #[error("malformed measure length {value:?}")]
    MalformedMeasureLength {
        /// The value text.
        value: String,
    },
    /// A resource directive whose id or value cannot be read.
    #[error("malformed resource definition for id {id:?}: {param:?}")]
    MalformedResource {
        /// The id token.
        id: String,
        /// The parameter text.
        param: String,
    },
    /// A header directive whose value cannot be read.
    #[error("malformed header #{command}: {param:?}")]
    MalformedHeader {
        /// The command.
        command: String,
        /// The parameter text.
        param: String,
    },
    /// A conditional directive whose argument is not a number.
    #[error("malformed conditional directive #{command}")]
    MalformedControl {
        /// The command.
        command: String,
    },
    /// A body line whose channel token cannot be read.
    #[error("unknown channel {0:?}")]
    UnknownChannel(String),
    /// A channel `08` cell referring to an undefined `#BPMxx`.
    #[error("#BPM{} is not defined", id_token(.0))]
    UndefinedTempo(i64),
    /// A channel `09` cell referring to an undefined `#STOPxx`.
    #[error("#STOP{} is not defined", id_token(.0))]
    UndefinedStop(i64),
    /// A conditional directive outside of its block.
    #[error("unbalanced control flow: {0}")]
    UnbalancedControlFlow(#[from] ControlFlowRule),
    /// A long note boundary without its counterpart.
    #[error("unpaired long note on channel {channel}")]
    UnpairedLongNote {
        /// The normalized channel.
        channel: i32,
    },
}

fn id_token(id: &i64) -> String {
    encode_base36(*id).unwrap_or_else(|| id.to_string())
}

/// A [`BmsWarning`] with the byte range of its line.
pub type BmsWarningWithRange = SourceRangeMixin<BmsWarning>;

/// Which parts of the source a compilation reads.
///
/// Lines of a part that is switched off are skipped. That part is taken from the base timeline given to
/// [`BmsCompiler::with_base`] if there is one, so that the body can be recompiled without touching the header, and is
/// left empty otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompilePasses {
    /// Header directives.
    pub header: bool,
    /// Resource definitions.
    pub resources: bool,
    /// Body lines.
    pub body: bool,
}

impl Default for CompilePasses {
    fn default() -> Self {
        Self {
            header: true,
            resources: true,
            body: true,
        }
    }
}

/// The result of compiling a BMS source.
#[derive(Debug, Clone, PartialEq)]
pub struct BmsCompileOutput {
    /// The compiled chart.
    pub timeline: Timeline,
    /// Recoverable problems.
    pub warnings: Vec<BmsWarningWithRange>,
}

/// Compiles BMS sources.
#[derive(Debug, Clone)]
pub struct BmsCompiler<'a> {
    passes: CompilePasses,
    channel_map: &'a ChannelMap,
    default_tempo: f64,
    base: Option<&'a Timeline>,
}

impl<'a> BmsCompiler<'a> {
    /// Creates a compiler from the options.
    #[must_use]
    pub fn new(options: &'a CompileOptions) -> Self {
        Self {
            passes: options.passes,
            channel_map: &options.channel_map,
            default_tempo: options.default_tempo,
            base: None,
        }
    }

    /// Takes the parts whose pass is off from `base`.
    #[must_use]
    pub const fn with_base(mut self, base: &'a Timeline) -> Self {
        self.base = Some(base);
        self
    }

    /// Compiles `source`, drawing `#RANDOM` values from `rng`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Cancelled`] if `cancel` is raised. Nothing is published in that case.
    pub fn compile(
        &self,
        source: &str,
        rng: impl Rng,
        cancel: &CancelFlag,
    ) -> Result<BmsCompileOutput, CompileError> {
        let mut header = ChartHeader::default();
        let mut resources = ResourceTable::default();
        let mut body = RawBody::default();
        let mut warnings: Vec<BmsWarningWithRange> = Vec::new();
        let mut evaluator = ConditionalEvaluator::new(rng);
        let mut skipped_header = ChartHeader::default();
        let mut skipped_resources = ResourceTable::default();

        for directive in directives(source) {
            cancel.check()?;
            let range = directive.range.clone();
            let control = ControlDirective::parse(directive.command, directive.param);

            if !evaluator.is_executing() {
                if let ControlParse::Directive(control) = control {
                    if let Err(rule) = evaluator.apply(control) {
                        warnings.push(BmsWarning::from(rule).into_wrapper_range(range));
                    }
                }
                continue;
            }

            let (header_target, image_target) = if self.passes.header {
                (&mut header, &mut resources)
            } else {
                (&mut skipped_header, &mut skipped_resources)
            };
            match apply_header(
                header_target,
                image_target,
                directive.command,
                directive.param,
            ) {
                HeaderOutcome::Applied => continue,
                HeaderOutcome::Malformed if !self.passes.header => continue,
                HeaderOutcome::Malformed => {
                    warnings.push(
                        BmsWarning::MalformedHeader {
                            command: directive.command.to_string(),
                            param: directive.param.to_string(),
                        }
                        .into_wrapper_range(range),
                    );
                    continue;
                }
                HeaderOutcome::NotHeader => {}
            }

            if let Some((tag, id)) = directive.resource_form() {
                if !self.passes.resources {
                    continue;
                }
                match read_resource(tag, id, directive.param) {
                    Ok(entry) => {
                        resources.insert(entry);
                    }
                    Err(warning) => warnings.push(warning.into_wrapper_range(range)),
                }
                continue;
            }

            match control {
                ControlParse::Directive(control) => {
                    if let Err(rule) = evaluator.apply(control) {
                        warnings.push(BmsWarning::from(rule).into_wrapper_range(range));
                    }
                    continue;
                }
                ControlParse::Malformed => {
                    warnings.push(
                        BmsWarning::MalformedControl {
                            command: directive.command.to_string(),
                        }
                        .into_wrapper_range(range),
                    );
                    continue;
                }
                ControlParse::NotControl => {}
            }

            if !self.passes.body {
                continue;
            }
            let Some((measure, channel_token)) = directive.body_form() else {
                continue;
            };
            let channel = self.channel_map.normalize(channel_token);
            if channel == INVALID_CHANNEL {
                warnings.push(
                    BmsWarning::UnknownChannel(channel_token.to_string()).into_wrapper_range(range),
                );
                continue;
            }
            let branch = evaluator.branch();
            if ChannelKind::of(channel) == ChannelKind::MeasureLength {
                match decode_measure_length(measure, directive.param, branch) {
                    Ok(length) => body.measure_lengths.push(length),
                    Err(warning) => warnings.push(warning.into_wrapper_range(range)),
                }
                continue;
            }
            let mut cell_warnings = Vec::new();
            decode_cells(
                measure,
                channel,
                directive.param,
                branch,
                &range,
                &mut body.objs,
                &mut cell_warnings,
            );
            warnings.extend(
                cell_warnings
                    .into_iter()
                    .map(|warning| warning.into_wrapper_range(range.clone())),
            );
        }

        if let Some(base) = self.base {
            if !self.passes.header {
                header = base.header().clone();
            }
            if !self.passes.resources {
                resources = base.resources().clone();
            }
        }

        let initial_tempo = header.tempo.unwrap_or(self.default_tempo);
        let (events, bar_lines) = if self.passes.body {
            let resolved = resolve(body, &resources, initial_tempo, header.ln_obj, cancel)?;
            warnings.extend(resolved.warnings);
            (resolved.events, resolved.bar_lines)
        } else {
            self.base.map_or_else(Default::default, |base| {
                (base.events().to_vec(), base.bar_lines().to_vec())
            })
        };

        Ok(BmsCompileOutput {
            timeline: Timeline::from_parts(header, resources, events, bar_lines),
            warnings,
        })
    }
}

/// Compiles a BMS source with a generator seeded from `options.seed`, or from entropy when it is `None`.
///
/// # Errors
///
/// Returns [`CompileError::Cancelled`] if `cancel` is raised.
pub fn compile_bms(
    source: &str,
    options: &CompileOptions,
    cancel: &CancelFlag,
) -> Result<BmsCompileOutput, CompileError> {
    BmsCompiler::new(options).compile(source, default_rng(options.seed), cancel)
}
