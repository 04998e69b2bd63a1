//! Post-processing of the collected objects into timeline events.
//!
//! - A measure length other than `1.0` lasts for its own measure only, so a reset to `1.0` is synthesized for the
//!   next measure unless that measure declares its own length.
//! - Tempo and pause objects feed the [`TimingResolver`], which then gives every object its wall-clock time.
//! - Long note channels pair their cells in order: the first opens a note and the next closes it.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use gametime::TimeSpan;

use super::{BmsWarning, BmsWarningWithRange, body::RawMeasureLength, body::RawObj};
use crate::{
    chart_process::{CancelFlag, CompileError},
    command::{
        channel::{ChannelKind, MEASURE_LENGTH_CHANNEL},
        mixin::SourceRangeMixinExt,
    },
    time::{TimingResolver, beats_to_secs},
    timeline::{EventKind, ResourceTable, TimelineEvent},
};

/// `#STOPxx` values are in 1/192 of a measure, that is 1/48 of a beat.
const STOP_UNITS_PER_BEAT: f64 = 48.0;

/// Everything the body pass collected.
#[derive(Debug, Default)]
pub struct RawBody {
    /// Nonzero cells in source order.
    pub objs: Vec<RawObj>,
    /// Channel `02` lines in source order.
    pub measure_lengths: Vec<RawMeasureLength>,
}

/// The resolved body.
#[derive(Debug, Default)]
pub struct ResolvedBody {
    /// The events, not yet sorted.
    pub events: Vec<TimelineEvent>,
    /// Start of every measure.
    pub bar_lines: Vec<TimeSpan>,
    /// Problems found while resolving.
    pub warnings: Vec<BmsWarningWithRange>,
}

/// Explicit measure lengths plus the synthesized resets, by measure.
fn signature_changes(measure_lengths: &[RawMeasureLength]) -> BTreeMap<u32, f64> {
    let explicit: BTreeMap<u32, f64> = measure_lengths
        .iter()
        .map(|length| (length.measure, length.ratio))
        .collect();
    let mut changes = explicit.clone();
    for (&measure, &ratio) in &explicit {
        let next = measure.saturating_add(1);
        if (ratio - 1.0).abs() > f64::EPSILON && !explicit.contains_key(&next) {
            changes.insert(next, 1.0);
        }
    }
    changes
}

/// Resolves `body` into events.
///
/// # Errors
///
/// Returns [`CompileError::Cancelled`] when `cancel` is raised between objects.
pub fn resolve(
    body: RawBody,
    resources: &ResourceTable,
    initial_tempo: f64,
    ln_obj: Option<i64>,
    cancel: &CancelFlag,
) -> Result<ResolvedBody, CompileError> {
    let mut warnings = Vec::new();

    let changes = signature_changes(&body.measure_lengths);
    let signatures: Vec<(u32, f64)> = changes.iter().map(|(&m, &r)| (m, r)).collect();

    let mut objs = body.objs;
    objs.sort_by_key(|obj| obj.position);

    let mut tempos = Vec::new();
    let mut pauses = Vec::new();
    for obj in &objs {
        let position = obj.position.to_measure_beat();
        match ChannelKind::of(obj.channel) {
            ChannelKind::TempoInline => tempos.push((position, obj.value as f64)),
            ChannelKind::TempoRef => match resources.tempo(obj.value) {
                Some(tempo) => tempos.push((position, tempo)),
                None => warnings.push(
                    BmsWarning::UndefinedTempo(obj.value).into_wrapper_range(obj.line.clone()),
                ),
            },
            ChannelKind::Pause => match resources.pause(obj.value) {
                Some(length) => pauses.push((position, length / STOP_UNITS_PER_BEAT)),
                None => warnings.push(
                    BmsWarning::UndefinedStop(obj.value).into_wrapper_range(obj.line.clone()),
                ),
            },
            _ => {}
        }
    }
    let resolver = TimingResolver::new(initial_tempo, &signatures, &tempos, &pauses);

    let mut events = Vec::with_capacity(objs.len() + changes.len());
    let mut order = 0u64;
    let mut next_order = || {
        order += 1;
        order
    };

    let measure_branch: HashMap<u32, _> = body
        .measure_lengths
        .iter()
        .map(|length| (length.measure, length.branch))
        .collect();
    for (&measure, &ratio) in &changes {
        let event = TimelineEvent::new(
            resolver.measure_start(measure),
            EventKind::MeasureLengthChange,
            MEASURE_LENGTH_CHANNEL,
            0,
        )
        .with_scalar(ratio)
        .with_branch(measure_branch.get(&measure).copied().flatten())
        .with_order(next_order());
        events.push(event);
    }

    // Index into `events` of the open long note per channel, and of the last plain note per lane.
    let mut open_long: HashMap<i32, (usize, Range<usize>)> = HashMap::new();
    let mut last_note: HashMap<i32, usize> = HashMap::new();

    for obj in &objs {
        cancel.check()?;
        let position = obj.position.to_measure_beat();
        let time = resolver.time_at(position);
        let kind = ChannelKind::of(obj.channel);
        let base = TimelineEvent::new(time, EventKind::Unknown, obj.channel, obj.value)
            .with_branch(obj.branch)
            .with_order(next_order());
        let event = match kind {
            ChannelKind::Bgm => TimelineEvent {
                kind: EventKind::SoundTrigger,
                ..base
            },
            ChannelKind::BgaBase | ChannelKind::BgaPoor | ChannelKind::BgaLayer => TimelineEvent {
                kind: EventKind::ImageSwap,
                ..base
            },
            ChannelKind::TempoInline => TimelineEvent {
                kind: EventKind::TempoChange,
                scalar: obj.value as f64,
                ..base
            },
            ChannelKind::TempoRef => {
                let Some(tempo) = resources.tempo(obj.value) else {
                    continue;
                };
                TimelineEvent {
                    kind: EventKind::TempoChange,
                    scalar: tempo,
                    ..base
                }
            }
            ChannelKind::Pause => {
                let Some(length) = resources.pause(obj.value) else {
                    continue;
                };
                let beats = length / STOP_UNITS_PER_BEAT;
                TimelineEvent {
                    kind: EventKind::Pause,
                    scalar: beats_to_secs(beats, resolver.tempo_at(position)),
                    ..base
                }
            }
            ChannelKind::Note { .. } if ln_obj == Some(obj.value) => {
                let Some(start) = last_note.remove(&obj.channel) else {
                    warnings.push(
                        BmsWarning::UnpairedLongNote {
                            channel: obj.channel,
                        }
                        .into_wrapper_range(obj.line.clone()),
                    );
                    continue;
                };
                close_long_note(&mut events[start], time);
                TimelineEvent {
                    kind: EventKind::LongNoteEnd,
                    ..base
                }
            }
            ChannelKind::Note { .. } => {
                last_note.insert(obj.channel, events.len());
                TimelineEvent {
                    kind: EventKind::Note,
                    ..base
                }
            }
            ChannelKind::LongNote { .. } => {
                if let Some((start, _)) = open_long.remove(&obj.channel) {
                    close_long_note(&mut events[start], time);
                    TimelineEvent {
                        kind: EventKind::LongNoteEnd,
                        ..base
                    }
                } else {
                    open_long.insert(obj.channel, (events.len(), obj.line.clone()));
                    TimelineEvent {
                        kind: EventKind::LongNoteStart,
                        ..base
                    }
                }
            }
            _ => continue,
        };
        events.push(event);
    }

    let mut unpaired: Vec<_> = open_long.into_iter().collect();
    unpaired.sort_by_key(|(_, (index, _))| *index);
    for (channel, (_, line)) in unpaired {
        warnings.push(BmsWarning::UnpairedLongNote { channel }.into_wrapper_range(line));
    }

    let last_measure = objs
        .iter()
        .map(|obj| obj.position.measure)
        .chain(body.measure_lengths.iter().map(|length| length.measure))
        .max();
    let bar_lines = last_measure
        .map(|last| (0..=last).map(|measure| resolver.measure_start(measure)).collect())
        .unwrap_or_default();

    Ok(ResolvedBody {
        events,
        bar_lines,
        warnings,
    })
}

fn close_long_note(start: &mut TimelineEvent, end: TimeSpan) {
    start.kind = EventKind::LongNoteStart;
    start.long_duration = Some(end - start.time);
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn length(measure: u32, ratio: f64) -> RawMeasureLength {
        RawMeasureLength {
            measure,
            ratio,
            branch: None,
        }
    }

    #[test]
    fn reset_follows_non_unit_length() {
        let changes = signature_changes(&[length(1, 0.75), length(4, 1.5), length(5, 2.0)]);
        assert_eq!(
            changes.into_iter().collect::<Vec<_>>(),
            vec![(1, 0.75), (2, 1.0), (4, 1.5), (5, 2.0), (6, 1.0)]
        );
    }

    #[test]
    fn unit_length_emits_no_reset() {
        let changes = signature_changes(&[length(3, 1.0)]);
        assert_eq!(changes.into_iter().collect::<Vec<_>>(), vec![(3, 1.0)]);
    }
}
