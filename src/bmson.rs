//! The [bmson format](https://bmson-spec.readthedocs.io/en/master/doc/index.html) definition and its compiler.
//!
//! # Order of Processing
//!
//! When there are coincident events in the same pulse, they are processed in the order below:
//!
//! - [`Note`] and [`BgaEvent`] (are independent each other),
//! - [`BpmEvent`],
//! - [`StopEvent`].
//!
//! If a [`BpmEvent`] and a [`StopEvent`] appear on the same pulse, the current BPM is changed at first, then the
//! chart stops for a while depending on the changed BPM. A [`Note`] on the pulse of a [`StopEvent`] happens before
//! the stop.
//!
//! # Sound Slicing
//!
//! Every sound channel plays one sound file. A note that starts no later than the end of the previous note on the
//! channel (its `y` plus `l`) continues the sound from where it would be by then; any other note restarts it. The
//! compiled event carries that offset as an [`AudioSlice`], ending at the next note of the channel.

pub mod lane;
pub mod pulse;

use std::num::NonZeroU8;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strict_num_extended::FinF64;
use thiserror::Error;

use self::{
    lane::LaneLayout,
    pulse::{PulseMap, PulseNumber},
};
use crate::{
    bms::resource::is_video,
    chart_process::{CancelFlag, CompileError, CompileOptions},
    time::span_from_secs,
    timeline::{
        AudioSlice, ChartHeader, EventKind, ResourceEntry, ResourceExtra, ResourceKind,
        ResourceTable, Timeline, TimelineEvent, reserved,
    },
};

/// Top-level object for bmson format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bmson {
    /// Version of bmson format. Older bmson file may not have this field.
    #[serde(default)]
    pub version: String,
    /// Score metadata.
    pub info: BmsonInfo,
    /// Location of bar lines in pulses. If `None`, a bar line is placed every 4 quarter notes. If `Some(vec![])`, the
    /// chart has no bar line.
    pub lines: Option<Vec<BarLine>>,
    /// Events of bpm change. Among coincident events, the last one is applied.
    #[serde(default)]
    pub bpm_events: Vec<BpmEvent>,
    /// Events of scroll stop. Coincident events happen in succession.
    #[serde(default)]
    pub stop_events: Vec<StopEvent>,
    /// Note data.
    #[serde(default)]
    pub sound_channels: Vec<SoundChannel>,
    /// BGA data.
    #[serde(default)]
    pub bga: Bga,
}

/// Header metadata of chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmsonInfo {
    /// Self explanatory title.
    pub title: String,
    /// Self explanatory subtitle.
    #[serde(default)]
    pub subtitle: String,
    /// Author of the chart.
    #[serde(default)]
    pub artist: String,
    /// Other authors of the chart, in `key:value` form.
    #[serde(default)]
    pub subartists: Vec<String>,
    /// Self explanatory genre.
    #[serde(default)]
    pub genre: String,
    /// Hint for layout lanes, e.g. "beat-7k", "popn-5k", "generic-nkeys". Defaults to `"beat-7k"`.
    #[serde(default = "default_mode_hint")]
    pub mode_hint: String,
    /// Special chart name, e.g. "BEGINNER", "NORMAL", "HYPER".
    #[serde(default)]
    pub chart_name: String,
    /// Self explanatory level number.
    #[serde(default)]
    pub level: u32,
    /// Initial BPM.
    pub init_bpm: FinF64,
    /// Relative judge width in percentage.
    #[serde(default)]
    pub judge_rank: Option<FinF64>,
    /// Relative life bar gain in percentage.
    #[serde(default)]
    pub total: Option<FinF64>,
    /// Background image file name.
    #[serde(default)]
    pub back_image: Option<String>,
    /// Eyecatch image file name, displayed while the chart is loading.
    #[serde(default)]
    pub eyecatch_image: Option<String>,
    /// Title image file name.
    #[serde(default)]
    pub title_image: Option<String>,
    /// Banner image file name.
    #[serde(default)]
    pub banner_image: Option<String>,
    /// Preview music file name.
    #[serde(default)]
    pub preview_music: Option<String>,
    /// Numbers of pulse per quarter note in 4/4 measure.
    #[serde(default = "default_resolution")]
    pub resolution: u32,
}

/// Default mode hint, beatmania 7 keys.
#[must_use]
pub fn default_mode_hint() -> String {
    "beat-7k".into()
}

/// Default resolution pulses per quarter note in 4/4 measure, 240 pulses.
#[must_use]
pub const fn default_resolution() -> u32 {
    240
}

/// Event of bar line of the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarLine {
    /// Pulse number to place the line.
    pub y: PulseNumber,
}

/// Note sound file and positions to be placed in the chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundChannel {
    /// Sound file path.
    pub name: String,
    /// Data to be placed.
    #[serde(default)]
    pub notes: Vec<Note>,
}

/// Sound note to ring a sound file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Position to be placed.
    pub y: PulseNumber,
    /// Lane information. `None` places a background sound.
    #[serde(default)]
    pub x: Option<NonZeroU8>,
    /// Length of the long note in pulses. `0` is a normal note.
    #[serde(default)]
    pub l: u64,
    /// Continuation flag as written by the editor. Compiling derives continuation from note positions instead.
    #[serde(default)]
    pub c: bool,
}

/// BPM change note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BpmEvent {
    /// Position to change BPM of the chart.
    pub y: PulseNumber,
    /// New BPM to be.
    pub bpm: FinF64,
}

/// Scroll stop note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopEvent {
    /// Start position to scroll stop.
    pub y: PulseNumber,
    /// Stopping duration in pulses.
    pub duration: u64,
}

/// BGA header and events.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bga {
    /// Pictures data for playing BGA.
    #[serde(default)]
    pub bga_header: Vec<BgaHeader>,
    /// Base picture sequence.
    #[serde(default)]
    pub bga_events: Vec<BgaEvent>,
    /// Layered picture sequence.
    #[serde(default)]
    pub layer_events: Vec<BgaEvent>,
    /// Picture sequence displayed when missed.
    #[serde(default)]
    pub poor_events: Vec<BgaEvent>,
}

/// Picture file information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgaHeader {
    /// Self explanatory ID of picture.
    pub id: BgaId,
    /// Picture file name.
    pub name: String,
}

/// BGA note to display the picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgaEvent {
    /// Position to display.
    pub y: PulseNumber,
    /// ID of picture to display.
    pub id: BgaId,
}

/// Picture id for [`Bga`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BgaId(pub u32);

/// A recoverable problem found while compiling a bmson document.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum BmsonWarning {
    /// The document has no `version`.
    #[error("the document has no version")]
    MissingVersion,
    /// `info.resolution` is zero. The default resolution is used instead.
    #[error("resolution must be positive, using {}", default_resolution())]
    ZeroResolution,
    /// `info.init_bpm` is not positive. The default tempo is used instead.
    #[error("initial bpm {0} must be positive")]
    NonPositiveInitialTempo(f64),
    /// A BPM event whose value is not positive. The event is dropped.
    #[error("bpm {bpm} at pulse {y} must be positive")]
    NonPositiveTempo {
        /// The pulse of the event.
        y: u64,
        /// The value.
        bpm: f64,
    },
    /// A note on a lane the mode hint does not have. It is placed as a background sound.
    #[error("lane {x} does not exist in mode {mode_hint:?}")]
    UnknownLane {
        /// The lane.
        x: u8,
        /// The mode hint.
        mode_hint: String,
    },
    /// A BGA event referring to an id not in `bga_header`.
    #[error("bga id {0} is not defined")]
    UndefinedBga(u32),
}

/// The result of compiling a bmson document.
#[derive(Debug, Clone, PartialEq)]
pub struct BmsonCompileOutput {
    /// The compiled chart.
    pub timeline: Timeline,
    /// Recoverable problems.
    pub warnings: Vec<BmsonWarning>,
}

/// Parses a bmson document.
///
/// # Errors
///
/// Returns [`CompileError::Json`] with the path of the offending value when `source` is not a bmson document.
pub fn parse_bmson(source: &str) -> Result<Bmson, CompileError> {
    let deserializer = &mut serde_json::Deserializer::from_str(source);
    serde_path_to_error::deserialize(deserializer).map_err(|err| CompileError::Json {
        path: err.path().to_string(),
        message: err.inner().to_string(),
    })
}

/// Parses and compiles a bmson document.
///
/// # Errors
///
/// Returns [`CompileError::Json`] when the document cannot be decoded, or [`CompileError::Cancelled`] if `cancel` is
/// raised.
pub fn compile_bmson(
    source: &str,
    options: &CompileOptions,
    cancel: &CancelFlag,
) -> Result<BmsonCompileOutput, CompileError> {
    let bmson = parse_bmson(source)?;
    BmsonCompiler::new(options).compile(&bmson, cancel)
}

/// The channel of background sounds.
const BGM_CHANNEL: i32 = 1;
/// The channel of tempo changes.
const TEMPO_CHANNEL: i32 = 3;
/// The channel of stops.
const PAUSE_CHANNEL: i32 = 9;
/// Offset from a note channel to its long note channel.
const LONG_NOTE_OFFSET: i32 = 40;

/// Compiles bmson documents into timelines.
#[derive(Debug, Clone)]
pub struct BmsonCompiler<'a> {
    options: &'a CompileOptions,
}

impl<'a> BmsonCompiler<'a> {
    /// Creates a compiler from the options.
    #[must_use]
    pub const fn new(options: &'a CompileOptions) -> Self {
        Self { options }
    }

    /// Compiles `bmson`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Cancelled`] if `cancel` is raised between events.
    pub fn compile(
        &self,
        bmson: &Bmson,
        cancel: &CancelFlag,
    ) -> Result<BmsonCompileOutput, CompileError> {
        let mut warnings = Vec::new();
        if bmson.version.is_empty() {
            warnings.push(BmsonWarning::MissingVersion);
        }
        let info = &bmson.info;
        let resolution = if info.resolution == 0 {
            warnings.push(BmsonWarning::ZeroResolution);
            u64::from(default_resolution())
        } else {
            u64::from(info.resolution)
        };
        let init_tempo = info.init_bpm.as_f64();
        let init_tempo = if init_tempo > 0.0 {
            init_tempo
        } else {
            warnings.push(BmsonWarning::NonPositiveInitialTempo(init_tempo));
            self.options.default_tempo
        };

        let (header, mut resources) = read_header(info, init_tempo);
        for (index, channel) in bmson.sound_channels.iter().enumerate() {
            resources.insert(ResourceEntry {
                kind: ResourceKind::Sound,
                id: sound_id(index),
                path: channel.name.clone(),
                extra: ResourceExtra::None,
            });
        }
        for bga_header in &bmson.bga.bga_header {
            let kind = if is_video(&bga_header.name) {
                ResourceKind::VideoBgaClip
            } else {
                ResourceKind::Image
            };
            resources.insert(ResourceEntry {
                kind,
                id: i64::from(bga_header.id.0),
                path: bga_header.name.clone(),
                extra: ResourceExtra::None,
            });
        }

        let mut tempos = Vec::with_capacity(bmson.bpm_events.len());
        for event in &bmson.bpm_events {
            let bpm = event.bpm.as_f64();
            if bpm > 0.0 {
                tempos.push((event.y, bpm));
            } else {
                warnings.push(BmsonWarning::NonPositiveTempo { y: event.y.0, bpm });
            }
        }
        let stops: Vec<_> = bmson
            .stop_events
            .iter()
            .map(|stop| (stop.y, stop.duration))
            .collect();
        let map = PulseMap::new(resolution, init_tempo, &tempos, &stops);

        let layout = LaneLayout::from_mode_hint(&info.mode_hint);
        let mut events = Vec::new();
        let mut order = 0u64;
        let mut next_order = || {
            order += 1;
            order
        };
        let mut last_pulse = PulseNumber(0);

        for (index, channel) in bmson.sound_channels.iter().enumerate() {
            let notes: Vec<&Note> = channel.notes.iter().sorted_by_key(|note| note.y).collect();
            let mut restart = PulseNumber(0);
            let mut previous: Option<&Note> = None;
            for (position, note) in notes.iter().enumerate() {
                cancel.check()?;
                let continues =
                    previous.is_some_and(|prev| note.y.0 <= prev.y.0.saturating_add(prev.l));
                if !continues {
                    restart = note.y;
                }
                previous = Some(note);
                let restart_secs = map.seconds_at(restart);
                let next = notes.get(position + 1);
                let slice = (continues || next.is_some()).then(|| AudioSlice {
                    start: span_from_secs(map.seconds_at(note.y) - restart_secs),
                    end: next.map(|next| span_from_secs(map.seconds_at(next.y) - restart_secs)),
                });
                let lane = match note.x {
                    Some(x) => {
                        let lane = layout.channel_of(x);
                        if lane.is_none() {
                            warnings.push(BmsonWarning::UnknownLane {
                                x: x.get(),
                                mode_hint: info.mode_hint.clone(),
                            });
                        }
                        lane
                    }
                    None => None,
                };
                let payload = sound_id(index);
                let time = map.time_at(note.y);
                let event = match lane {
                    None => TimelineEvent::new(
                        time,
                        EventKind::SoundTrigger,
                        self.options.channel_map.redirect(BGM_CHANNEL),
                        payload,
                    ),
                    Some(lane) if note.l == 0 => TimelineEvent::new(
                        time,
                        EventKind::Note,
                        self.options.channel_map.redirect(lane),
                        payload,
                    ),
                    Some(lane) => {
                        let end_y = PulseNumber(note.y.0.saturating_add(note.l));
                        let end = map.time_at(end_y);
                        let long_channel =
                            self.options.channel_map.redirect(lane + LONG_NOTE_OFFSET);
                        events.push(
                            TimelineEvent::new(end, EventKind::LongNoteEnd, long_channel, payload)
                                .with_order(next_order()),
                        );
                        last_pulse = last_pulse.max(end_y);
                        TimelineEvent {
                            long_duration: Some(end - time),
                            ..TimelineEvent::new(
                                time,
                                EventKind::LongNoteStart,
                                long_channel,
                                payload,
                            )
                        }
                    }
                };
                last_pulse = last_pulse.max(note.y);
                events.push(TimelineEvent {
                    slice,
                    ..event.with_order(next_order())
                });
            }
        }

        let layers = [
            (4, &bmson.bga.bga_events),
            (6, &bmson.bga.poor_events),
            (7, &bmson.bga.layer_events),
        ];
        for (channel, layer) in layers {
            for bga_event in layer {
                cancel.check()?;
                let id = i64::from(bga_event.id.0);
                if resources.image(id).is_none() {
                    warnings.push(BmsonWarning::UndefinedBga(bga_event.id.0));
                }
                last_pulse = last_pulse.max(bga_event.y);
                events.push(
                    TimelineEvent::new(
                        map.time_at(bga_event.y),
                        EventKind::ImageSwap,
                        self.options.channel_map.redirect(channel),
                        id,
                    )
                    .with_order(next_order()),
                );
            }
        }

        for &(y, bpm) in &tempos {
            cancel.check()?;
            last_pulse = last_pulse.max(y);
            events.push(
                TimelineEvent::new(
                    map.time_at(y),
                    EventKind::TempoChange,
                    self.options.channel_map.redirect(TEMPO_CHANNEL),
                    0,
                )
                .with_scalar(bpm)
                .with_order(next_order()),
            );
        }
        for stop in &bmson.stop_events {
            cancel.check()?;
            last_pulse = last_pulse.max(stop.y);
            events.push(
                TimelineEvent::new(
                    map.time_at(stop.y),
                    EventKind::Pause,
                    self.options.channel_map.redirect(PAUSE_CHANNEL),
                    stop.duration as i64,
                )
                .with_scalar(map.stop_seconds(stop.y, stop.duration))
                .with_order(next_order()),
            );
        }

        let bar_lines = match &bmson.lines {
            Some(lines) => lines.iter().map(|line| map.time_at(line.y)).collect(),
            None => {
                let measure = 4 * resolution;
                (0..=last_pulse.0 / measure)
                    .map(|index| map.time_at(PulseNumber(index * measure)))
                    .collect()
            }
        };

        Ok(BmsonCompileOutput {
            timeline: Timeline::from_parts(header, resources, events, bar_lines),
            warnings,
        })
    }
}

/// Sound channels are numbered from 1 in document order.
const fn sound_id(index: usize) -> i64 {
    index as i64 + 1
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

fn read_header(info: &BmsonInfo, tempo: f64) -> (ChartHeader, ResourceTable) {
    let mut resources = ResourceTable::default();
    let mut reserve = |id: i64, path: &Option<String>| {
        if let Some(path) = path {
            resources.insert(ResourceEntry {
                kind: ResourceKind::Image,
                id,
                path: path.clone(),
                extra: ResourceExtra::None,
            });
        }
        path.clone()
    };
    let header = ChartHeader {
        title: non_empty(&info.title),
        subtitle: non_empty(&info.subtitle),
        artist: non_empty(&info.artist),
        subartists: info.subartists.clone(),
        genre: non_empty(&info.genre),
        tempo: Some(tempo),
        play_level: Some(i64::from(info.level)),
        rank: info.judge_rank.map(|rank| rank.as_f64().round() as i64),
        stage_file: reserve(reserved::STAGE_FILE, &info.eyecatch_image),
        banner: reserve(reserved::BANNER, &info.banner_image),
        back_bmp: reserve(reserved::BACK_BMP, &info.back_image),
        mode_hint: Some(info.mode_hint.clone()),
        ..ChartHeader::default()
    };
    (header, resources)
}

#[cfg(test)]
mod tests {
    use gametime::TimeSpan;
    use pretty_assertions::assert_eq;

    use super::*;

    const MINIMAL: &str = r#"{
        "version": "1.0.0",
        "info": { "title": "Song", "artist": "Someone", "genre": "Test", "level": 3, "init_bpm": 120 },
        "sound_channels": [
            { "name": "piano.wav", "notes": [
                { "x": 1, "y": 0, "l": 0, "c": false },
                { "x": 8, "y": 240, "l": 480, "c": true },
                { "y": 960, "l": 0, "c": false }
            ] }
        ]
    }"#;

    fn compile(source: &str) -> BmsonCompileOutput {
        compile_bmson(source, &CompileOptions::default(), &CancelFlag::new()).unwrap()
    }

    #[test]
    fn defaults_are_filled() {
        let bmson = parse_bmson(MINIMAL).unwrap();
        assert_eq!(bmson.info.mode_hint, "beat-7k");
        assert_eq!(bmson.info.resolution, 240);
        assert_eq!(bmson.bga, Bga::default());
        assert_eq!(bmson.lines, None);
    }

    #[test]
    fn notes_become_events() {
        let output = compile(MINIMAL);
        assert_eq!(output.warnings, vec![]);
        let kinds: Vec<_> = output
            .timeline
            .events()
            .iter()
            .map(|event| (event.kind, event.channel))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (EventKind::Note, 11),
                (EventKind::LongNoteStart, 56),
                (EventKind::LongNoteEnd, 56),
                (EventKind::SoundTrigger, 1),
            ]
        );
        let start = &output.timeline.events()[1];
        assert_eq!(start.time, span_from_secs(0.5));
        assert_eq!(start.long_duration, Some(span_from_secs(1.0)));
        assert_eq!(
            start.slice,
            Some(AudioSlice {
                start: TimeSpan::ZERO,
                end: Some(span_from_secs(1.5)),
            })
        );
        assert_eq!(output.timeline.events()[3].slice, None);
    }

    #[test]
    fn contiguous_notes_continue_the_sound() {
        let output = compile(
            r#"{
                "version": "1.0.0",
                "info": { "title": "s", "init_bpm": 120 },
                "sound_channels": [ { "name": "voice.wav", "notes": [
                    { "x": 1, "y": 0, "l": 240 },
                    { "x": 2, "y": 240, "c": false },
                    { "x": 3, "y": 960, "c": true },
                    { "x": 4, "y": 960 }
                ] } ]
            }"#,
        );
        let slices: Vec<_> = output
            .timeline
            .events()
            .iter()
            .filter(|event| event.kind != EventKind::LongNoteEnd)
            .map(|event| event.slice)
            .collect();
        assert_eq!(
            slices,
            vec![
                Some(AudioSlice {
                    start: TimeSpan::ZERO,
                    end: Some(span_from_secs(0.5)),
                }),
                Some(AudioSlice {
                    start: span_from_secs(0.5),
                    end: Some(span_from_secs(2.0)),
                }),
                Some(AudioSlice {
                    start: TimeSpan::ZERO,
                    end: Some(TimeSpan::ZERO),
                }),
                Some(AudioSlice {
                    start: TimeSpan::ZERO,
                    end: None,
                }),
            ]
        );
    }

    #[test]
    fn missing_info_is_an_error() {
        let err = parse_bmson(r#"{ "version": "1.0.0" }"#).unwrap_err();
        assert!(matches!(err, CompileError::Json { .. }));
        let err = parse_bmson(r#"{ "info": { "title": 3 } }"#).unwrap_err();
        let CompileError::Json { path, .. } = err else {
            panic!("expected a json error");
        };
        assert_eq!(path, "info.title");
    }

    #[test]
    fn bad_values_fall_back() {
        let output = compile(
            r#"{
                "info": { "title": "x", "init_bpm": 0, "resolution": 0, "mode_hint": "popn-9k" },
                "bpm_events": [ { "y": 0, "bpm": -1 } ],
                "sound_channels": [ { "name": "a.wav", "notes": [ { "x": 12, "y": 0 } ] } ],
                "bga": { "bga_events": [ { "y": 0, "id": 5 } ] }
            }"#,
        );
        assert_eq!(
            output.warnings,
            vec![
                BmsonWarning::MissingVersion,
                BmsonWarning::ZeroResolution,
                BmsonWarning::NonPositiveInitialTempo(0.0),
                BmsonWarning::NonPositiveTempo { y: 0, bpm: -1.0 },
                BmsonWarning::UnknownLane {
                    x: 12,
                    mode_hint: "popn-9k".to_string(),
                },
                BmsonWarning::UndefinedBga(5),
            ]
        );
        assert_eq!(output.timeline.header().tempo, Some(crate::DEFAULT_TEMPO));
    }

    #[test]
    fn bar_lines_every_measure_without_lines() {
        let output = compile(MINIMAL);
        assert_eq!(
            output.timeline.bar_lines(),
            &[span_from_secs(0.0), span_from_secs(2.0)]
        );
    }
}
