//! The compiled chart: header, resource table and the time-sorted event list.
//!
//! A [`Timeline`] is built once by a compiler and never mutated afterwards. Rebuilding produces a fresh value which
//! is swapped in through [`crate::chart_process::ChartHandle`].

use std::collections::BTreeMap;
use std::ops::RangeBounds;

use gametime::TimeSpan;

/// The kind of a [`TimelineEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    /// A playable note.
    Note,
    /// The head of a long note.
    LongNoteStart,
    /// The tail of a long note.
    LongNoteEnd,
    /// A background image or video switches.
    ImageSwap,
    /// A background sound is triggered.
    SoundTrigger,
    /// The tempo changes to `scalar` beats per minute.
    TempoChange,
    /// Playback halts for `scalar` seconds.
    Pause,
    /// The measure length ratio changes to `scalar`.
    MeasureLengthChange,
    /// Anything else.
    Unknown,
}

impl EventKind {
    /// The code of the kind in the binary cache.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Note => 0,
            Self::LongNoteStart => 1,
            Self::LongNoteEnd => 2,
            Self::ImageSwap => 3,
            Self::SoundTrigger => 4,
            Self::TempoChange => 5,
            Self::Pause => 6,
            Self::MeasureLengthChange => 7,
            Self::Unknown => 8,
        }
    }

    /// Reads a kind from its cache code. Unrecognized codes become [`EventKind::Unknown`].
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Note,
            1 => Self::LongNoteStart,
            2 => Self::LongNoteEnd,
            3 => Self::ImageSwap,
            4 => Self::SoundTrigger,
            5 => Self::TempoChange,
            6 => Self::Pause,
            7 => Self::MeasureLengthChange,
            _ => Self::Unknown,
        }
    }

    /// Returns whether the player has to hit this event.
    #[must_use]
    pub const fn is_playable(self) -> bool {
        matches!(self, Self::Note | Self::LongNoteStart)
    }
}

/// Identifies the conditional branch an event was compiled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BranchTag {
    /// The ordinal of the `#RANDOM` block, starting from 1.
    pub group: u32,
    /// The value of the `#IF` that selected the branch.
    pub index: u64,
}

/// Where a sound resumes playing, for sounds that continue across several notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSlice {
    /// Offset into the sound where playback starts.
    pub start: TimeSpan,
    /// Offset into the sound where playback stops, or `None` to play to the end.
    pub end: Option<TimeSpan>,
}

/// A discrete event on the timeline.
///
/// Two events are equal when their time, kind, channel and payload are equal; the remaining fields are
/// auxiliary.
#[derive(Debug, Clone, Copy)]
pub struct TimelineEvent {
    /// The wall-clock time of the event.
    pub time: TimeSpan,
    /// The kind.
    pub kind: EventKind,
    /// The normalized channel id.
    pub channel: i32,
    /// The decoded cell value, usually a resource id.
    pub payload: i64,
    /// A numeric value depending on `kind`: the tempo, the pause seconds or the measure ratio.
    pub scalar: f64,
    /// Audio slicing of the sound this event plays.
    pub slice: Option<AudioSlice>,
    /// For a long note start, the duration until its end.
    pub long_duration: Option<TimeSpan>,
    /// The conditional branch this event came from, if any.
    pub branch: Option<BranchTag>,
    /// Tiebreak among events at the same time, in source order.
    pub order: u64,
}

impl TimelineEvent {
    /// Creates an event with no auxiliary data.
    #[must_use]
    pub const fn new(time: TimeSpan, kind: EventKind, channel: i32, payload: i64) -> Self {
        Self {
            time,
            kind,
            channel,
            payload,
            scalar: 0.0,
            slice: None,
            long_duration: None,
            branch: None,
            order: 0,
        }
    }

    /// Sets the scalar value.
    #[must_use]
    pub const fn with_scalar(mut self, scalar: f64) -> Self {
        self.scalar = scalar;
        self
    }

    /// Sets the branch tag.
    #[must_use]
    pub const fn with_branch(mut self, branch: Option<BranchTag>) -> Self {
        self.branch = branch;
        self
    }

    /// Sets the ordering tiebreak.
    #[must_use]
    pub const fn with_order(mut self, order: u64) -> Self {
        self.order = order;
        self
    }
}

impl PartialEq for TimelineEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time
            && self.kind == other.kind
            && self.channel == other.channel
            && self.payload == other.payload
    }
}

impl Eq for TimelineEvent {}

/// The kind of a [`ResourceEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResourceKind {
    /// A still image.
    Image,
    /// A sound file.
    Sound,
    /// A `#BPMxx` tempo value.
    TempoDefinition,
    /// A `#STOPxx` pause length.
    PauseDefinition,
    /// A video used as a background layer.
    VideoBgaClip,
    /// A `#BGAxx` crop of another image.
    BgaCrop,
}

/// Reserved image ids for header images.
pub mod reserved {
    /// `#STAGEFILE`, the title screen image.
    pub const STAGE_FILE: i64 = -1;
    /// `#BANNER`.
    pub const BANNER: i64 = -2;
    /// `#BACKBMP`, the image behind the play field.
    pub const BACK_BMP: i64 = -3;
}

/// A rectangle cut out of another image by `#BGAxx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CropRect {
    /// The image id the rectangle is cut from.
    pub source: i64,
    /// Left of the source rectangle.
    pub x1: i32,
    /// Top of the source rectangle.
    pub y1: i32,
    /// Right of the source rectangle.
    pub x2: i32,
    /// Bottom of the source rectangle.
    pub y2: i32,
    /// Destination left.
    pub dx: i32,
    /// Destination top.
    pub dy: i32,
}

/// Typed data attached to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResourceExtra {
    /// Nothing.
    #[default]
    None,
    /// A tempo in beats per minute, or a pause in beats.
    Number(f64),
    /// A crop rectangle.
    Crop(CropRect),
}

/// A resource definition.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceEntry {
    /// The kind.
    pub kind: ResourceKind,
    /// The id, negative for reserved slots.
    pub id: i64,
    /// The path, or the raw value text for numeric definitions.
    pub path: String,
    /// Typed data.
    pub extra: ResourceExtra,
}

impl ResourceEntry {
    /// The numeric value of a tempo or pause definition.
    #[must_use]
    pub const fn number(&self) -> Option<f64> {
        match self.extra {
            ResourceExtra::Number(value) => Some(value),
            _ => None,
        }
    }
}

/// Resources keyed by kind and id.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceTable {
    entries: BTreeMap<(ResourceKind, i64), ResourceEntry>,
}

impl ResourceTable {
    /// Registers an entry. Returns the previous entry if it was redefined with a different path or value.
    pub fn insert(&mut self, entry: ResourceEntry) -> Option<ResourceEntry> {
        let key = (entry.kind, entry.id);
        let previous = self.entries.insert(key, entry)?;
        (self.entries.get(&key) != Some(&previous)).then_some(previous)
    }

    /// Looks an entry up.
    #[must_use]
    pub fn get(&self, kind: ResourceKind, id: i64) -> Option<&ResourceEntry> {
        self.entries.get(&(kind, id))
    }

    /// Looks up what an image channel would show for `id`: a still image, a video or a crop.
    #[must_use]
    pub fn image(&self, id: i64) -> Option<&ResourceEntry> {
        self.get(ResourceKind::BgaCrop, id)
            .or_else(|| self.get(ResourceKind::VideoBgaClip, id))
            .or_else(|| self.get(ResourceKind::Image, id))
    }

    /// The value of a `#BPMxx` definition.
    #[must_use]
    pub fn tempo(&self, id: i64) -> Option<f64> {
        self.get(ResourceKind::TempoDefinition, id)?.number()
    }

    /// The value of a `#STOPxx` definition.
    #[must_use]
    pub fn pause(&self, id: i64) -> Option<f64> {
        self.get(ResourceKind::PauseDefinition, id)?.number()
    }

    /// Iterates all entries of `kind`, ascending by id.
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceEntry> {
        self.entries
            .range((kind, i64::MIN)..=(kind, i64::MAX))
            .map(|(_, entry)| entry)
    }

    /// Iterates all entries.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceEntry> {
        self.entries.values()
    }

    /// The number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there is no entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Chart metadata.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChartHeader {
    /// The title.
    pub title: Option<String>,
    /// The subtitle.
    pub subtitle: Option<String>,
    /// The artist.
    pub artist: Option<String>,
    /// Co-artists.
    pub subartists: Vec<String>,
    /// The genre.
    pub genre: Option<String>,
    /// Free text.
    pub comment: Option<String>,
    /// The initial tempo.
    pub tempo: Option<f64>,
    /// `#PLAYER`, the play style.
    pub player: Option<u8>,
    /// The difficulty level.
    pub play_level: Option<i64>,
    /// The judge rank.
    pub rank: Option<i64>,
    /// The volume percentage of key sounds.
    pub volume: Option<f64>,
    /// `#STAGEFILE`.
    pub stage_file: Option<String>,
    /// `#BANNER`.
    pub banner: Option<String>,
    /// `#BACKBMP`.
    pub back_bmp: Option<String>,
    /// `#LNTYPE`. Recorded only; pairing does not depend on it.
    pub ln_type: Option<u8>,
    /// `#LNOBJ`, the cell value that ends a long note.
    pub ln_obj: Option<i64>,
    /// The lane layout hint of bmson.
    pub mode_hint: Option<String>,
}

/// A compiled chart.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Timeline {
    header: ChartHeader,
    resources: ResourceTable,
    events: Vec<TimelineEvent>,
    bar_lines: Vec<TimeSpan>,
}

impl Timeline {
    /// Assembles a timeline, sorting `events` by time and then by their order tiebreak.
    #[must_use]
    pub fn from_parts(
        header: ChartHeader,
        resources: ResourceTable,
        mut events: Vec<TimelineEvent>,
        mut bar_lines: Vec<TimeSpan>,
    ) -> Self {
        events.sort_by_key(|event| (event.time, event.order));
        bar_lines.sort();
        bar_lines.dedup();
        Self {
            header,
            resources,
            events,
            bar_lines,
        }
    }

    /// The header.
    #[must_use]
    pub const fn header(&self) -> &ChartHeader {
        &self.header
    }

    /// The resource table.
    #[must_use]
    pub const fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    /// The events, ascending by time.
    #[must_use]
    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// The start time of every measure.
    #[must_use]
    pub fn bar_lines(&self) -> &[TimeSpan] {
        &self.bar_lines
    }

    /// The time of the last event, or zero when there is none.
    #[must_use]
    pub fn end_time(&self) -> TimeSpan {
        self.events
            .last()
            .map_or(TimeSpan::ZERO, |event| event.time)
    }

    /// The number of events the player has to hit.
    #[must_use]
    pub fn playable_note_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| event.kind.is_playable())
            .count()
    }

    /// The events whose time is in `range`.
    #[must_use]
    pub fn events_in_range(&self, range: impl RangeBounds<TimeSpan>) -> &[TimelineEvent] {
        use std::ops::Bound;
        let start = match range.start_bound() {
            Bound::Included(&t) => self.events.partition_point(|event| event.time < t),
            Bound::Excluded(&t) => self.events.partition_point(|event| event.time <= t),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&t) => self.events.partition_point(|event| event.time <= t),
            Bound::Excluded(&t) => self.events.partition_point(|event| event.time < t),
            Bound::Unbounded => self.events.len(),
        };
        self.events.get(start..end.max(start)).unwrap_or_default()
    }

    fn tempos(&self) -> impl Iterator<Item = f64> + '_ {
        self.header.tempo.into_iter().chain(
            self.events
                .iter()
                .filter(|event| event.kind == EventKind::TempoChange)
                .map(|event| event.scalar),
        )
    }

    /// The lowest tempo the chart reaches.
    #[must_use]
    pub fn min_tempo(&self) -> Option<f64> {
        self.tempos().reduce(f64::min)
    }

    /// The highest tempo the chart reaches.
    #[must_use]
    pub fn max_tempo(&self) -> Option<f64> {
        self.tempos().reduce(f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::span_from_secs;

    fn event(secs: f64, kind: EventKind, order: u64) -> TimelineEvent {
        TimelineEvent::new(span_from_secs(secs), kind, 11, 1).with_order(order)
    }

    #[test]
    fn sorts_by_time_then_order() {
        let timeline = Timeline::from_parts(
            ChartHeader::default(),
            ResourceTable::default(),
            vec![
                event(1.0, EventKind::Note, 2),
                event(0.5, EventKind::Note, 3),
                event(1.0, EventKind::SoundTrigger, 1),
            ],
            vec![],
        );
        let kinds: Vec<_> = timeline.events().iter().map(|e| (e.order, e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (3, EventKind::Note),
                (1, EventKind::SoundTrigger),
                (2, EventKind::Note)
            ]
        );
        assert_eq!(timeline.end_time(), span_from_secs(1.0));
        assert_eq!(timeline.playable_note_count(), 2);
    }

    #[test]
    fn empty_timeline_ends_at_zero() {
        assert_eq!(Timeline::default().end_time(), TimeSpan::ZERO);
        assert_eq!(Timeline::default().min_tempo(), None);
    }

    #[test]
    fn equality_ignores_auxiliary_fields() {
        let a = event(1.0, EventKind::Note, 0).with_scalar(3.0);
        let b = event(1.0, EventKind::Note, 9);
        assert_eq!(a, b);
        let c = TimelineEvent { payload: 2, ..b };
        assert_ne!(a, c);
    }

    #[test]
    fn range_queries() {
        let timeline = Timeline::from_parts(
            ChartHeader::default(),
            ResourceTable::default(),
            (0..5).map(|i| event(f64::from(i), EventKind::Note, 0)).collect(),
            vec![],
        );
        assert_eq!(
            timeline
                .events_in_range(span_from_secs(1.0)..span_from_secs(3.0))
                .len(),
            2
        );
        assert_eq!(timeline.events_in_range(span_from_secs(1.0)..).len(), 4);
        assert_eq!(timeline.events_in_range(..=span_from_secs(0.0)).len(), 1);
    }

    #[test]
    fn resource_redefinition() {
        let mut table = ResourceTable::default();
        let entry = ResourceEntry {
            kind: ResourceKind::Sound,
            id: 1,
            path: "a.wav".into(),
            extra: ResourceExtra::None,
        };
        assert_eq!(table.insert(entry.clone()), None);
        assert_eq!(table.insert(entry.clone()), None);
        let replaced = table.insert(ResourceEntry {
            path: "b.wav".into(),
            ..entry
        });
        assert_eq!(replaced.map(|e| e.path), Some("a.wav".to_string()));
        assert_eq!(table.len(), 1);
    }
}
