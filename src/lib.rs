//! Chart compiler and seekable event timeline for BMS and bmson rhythm game charts.
//!
//! A chart source is compiled into a [`Timeline`](timeline::Timeline): a resource table and the list of its events
//! in wall-clock order. An [`EventDispatcher`](chart_process::dispatcher::EventDispatcher) replays the timeline in
//! either direction, and a [`ScoreCalculator`](judge::ScoreCalculator) turns hit timing into a score.
//!
//! # Dialects
//!
//! - [`bms`]: the line-oriented text format, including its `#RANDOM` / `#IF` blocks.
//! - [`bmson`]: the JSON format, behind the `bmson` feature.
//!
//! Both are reachable through [`chart_process::compile`]:
//!
//! ```
//! use bms_timeline::prelude::*;
//!
//! let source = "#BPM 120\n#WAV01 kick.wav\n#00111:01010101\n";
//! let output = compile(ChartSource::Bms(source), &CompileOptions::default(), &CancelFlag::new()).unwrap();
//! assert_eq!(output.timeline.playable_note_count(), 4);
//!
//! let handle = std::sync::Arc::new(ChartHandle::new(output.timeline));
//! let mut dispatcher = EventDispatcher::new(handle);
//! assert_eq!(dispatcher.seek_to_end(true), 4);
//! assert!(dispatcher.is_at_end());
//! ```
//!
//! # Features
//!
//! - `bmson` (default): the bmson dialect, using `serde_json`.
//! - `rand` (default): draws `#RANDOM` values with `rand`. Without it a small built-in generator is used.
//! - `diagnostics` (default): renders warnings with `ariadne`.
//! - `serde`: `Serialize` / `Deserialize` on the value types.
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bms;
#[cfg(feature = "bmson")]
#[cfg_attr(docsrs, doc(cfg(feature = "bmson")))]
pub mod bmson;
pub mod cache;
pub mod chart_process;
pub mod command;
#[cfg(feature = "diagnostics")]
#[cfg_attr(docsrs, doc(cfg(feature = "diagnostics")))]
pub mod diagnostics;
pub mod judge;
pub mod prelude;
pub mod time;
pub mod timeline;

/// The tempo of a chart that declares none, in beats per minute.
pub const DEFAULT_TEMPO: f64 = 130.0;
