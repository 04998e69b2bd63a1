//! The BMSC binary snapshot of a compiled timeline.
//!
//! Every number is little-endian. Strings are a `u32` byte length followed by UTF-8 bytes. Times are stored in
//! 100 ns ticks, so reading a snapshot back truncates times to that precision.
//!
//! ```text
//! "BMSC"
//! title subtitle artist subartists genre comment        strings, subartists joined by '\n'
//! tempo player play_level rank volume ln_type ln_obj    each a u8 presence flag and a value
//! stage_file banner back_bmp mode_hint                  strings, empty when absent
//! "_WAV_" count (id:i64 path)*
//! "_BMP_" count (kind:u8 id:i64 path)*
//! "_BGA_" count (id:i64 path source:i64 x1 y1 x2 y2 dx dy:i32)*
//! "_DEF_" count (kind:u8 id:i64 path value:f64)*
//! "_BMS_" count (ticks:i64 channel:i32 value:i64 group:u32 index:u64 kind:u8 scalar:f64 paired:i64
//!                slice_start:i64 slice_end:i64)*
//! "_BAR_" count (ticks:i64)*
//! ```
//!
//! A group of `0` marks an event outside any conditional branch; `i64::MIN` marks an absent paired duration or slice
//! bound.

use std::io::Write;

use thiserror::Error;

use crate::{
    time::{span_from_ticks, span_to_ticks},
    timeline::{
        AudioSlice, BranchTag, ChartHeader, CropRect, EventKind, ResourceEntry, ResourceExtra,
        ResourceKind, ResourceTable, Timeline, TimelineEvent,
    },
};

const MAGIC: &[u8; 4] = b"BMSC";
const NONE_TICKS: i64 = i64::MIN;

/// An error reading or writing a snapshot.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The data does not start with `BMSC`.
    #[error("not a BMSC snapshot")]
    BadMagic,
    /// A section tag is not where it should be.
    #[error("missing section tag {0}")]
    MissingTag(&'static str),
    /// The data ends in the middle of a value.
    #[error("unexpected end of snapshot")]
    UnexpectedEof,
    /// A string is not UTF-8.
    #[error("invalid UTF-8 in snapshot string")]
    InvalidUtf8,
    /// A count does not fit in memory.
    #[error("count {0} is too large")]
    TooLarge(u64),
    /// Writing failed.
    #[error("failed to write snapshot: {0}")]
    Io(#[from] std::io::Error),
}

struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u32(&mut self, value: u32) {
        self.bytes(&value.to_le_bytes());
    }

    fn i32(&mut self, value: i32) {
        self.bytes(&value.to_le_bytes());
    }

    fn i64(&mut self, value: i64) {
        self.bytes(&value.to_le_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.bytes(&value.to_le_bytes());
    }

    fn f64(&mut self, value: f64) {
        self.bytes(&value.to_le_bytes());
    }

    fn len(&mut self, len: usize) {
        self.u32(len as u32);
    }

    fn str(&mut self, text: &str) {
        self.len(text.len());
        self.bytes(text.as_bytes());
    }

    fn opt_str(&mut self, text: Option<&String>) {
        self.str(text.map_or("", String::as_str));
    }

    fn opt_f64(&mut self, value: Option<f64>) {
        self.u8(u8::from(value.is_some()));
        self.f64(value.unwrap_or_default());
    }

    fn opt_i64(&mut self, value: Option<i64>) {
        self.u8(u8::from(value.is_some()));
        self.i64(value.unwrap_or_default());
    }
}

struct Decoder<'a> {
    bytes: &'a [u8],
}

impl<'a> Decoder<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], CacheError> {
        if self.bytes.len() < len {
            return Err(CacheError::UnexpectedEof);
        }
        let (head, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CacheError> {
        self.take(N)?
            .try_into()
            .map_err(|_| CacheError::UnexpectedEof)
    }

    fn u8(&mut self) -> Result<u8, CacheError> {
        let [byte] = self.array()?;
        Ok(byte)
    }

    fn u32(&mut self) -> Result<u32, CacheError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, CacheError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, CacheError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, CacheError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64, CacheError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn len(&mut self) -> Result<usize, CacheError> {
        let len = self.u32()?;
        usize::try_from(len).map_err(|_| CacheError::TooLarge(u64::from(len)))
    }

    fn string(&mut self) -> Result<String, CacheError> {
        let len = self.len()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CacheError::InvalidUtf8)
    }

    fn opt_string(&mut self) -> Result<Option<String>, CacheError> {
        let text = self.string()?;
        Ok((!text.is_empty()).then_some(text))
    }

    fn opt_f64(&mut self) -> Result<Option<f64>, CacheError> {
        let present = self.u8()? != 0;
        let value = self.f64()?;
        Ok(present.then_some(value))
    }

    fn opt_i64(&mut self) -> Result<Option<i64>, CacheError> {
        let present = self.u8()? != 0;
        let value = self.i64()?;
        Ok(present.then_some(value))
    }

    fn tag(&mut self, tag: &'static str) -> Result<(), CacheError> {
        if self.bytes.starts_with(tag.as_bytes()) {
            self.take(tag.len())?;
            Ok(())
        } else {
            Err(CacheError::MissingTag(tag))
        }
    }
}

fn kind_code(kind: ResourceKind) -> u8 {
    match kind {
        ResourceKind::Image => 0,
        ResourceKind::Sound => 1,
        ResourceKind::TempoDefinition => 2,
        ResourceKind::PauseDefinition => 3,
        ResourceKind::VideoBgaClip => 4,
        ResourceKind::BgaCrop => 5,
    }
}

fn kind_from_code(code: u8) -> ResourceKind {
    match code {
        1 => ResourceKind::Sound,
        2 => ResourceKind::TempoDefinition,
        3 => ResourceKind::PauseDefinition,
        4 => ResourceKind::VideoBgaClip,
        5 => ResourceKind::BgaCrop,
        _ => ResourceKind::Image,
    }
}

fn encode_header(enc: &mut Encoder, header: &ChartHeader) {
    enc.opt_str(header.title.as_ref());
    enc.opt_str(header.subtitle.as_ref());
    enc.opt_str(header.artist.as_ref());
    enc.str(&header.subartists.join("\n"));
    enc.opt_str(header.genre.as_ref());
    enc.opt_str(header.comment.as_ref());
    enc.opt_f64(header.tempo);
    enc.opt_i64(header.player.map(i64::from));
    enc.opt_i64(header.play_level);
    enc.opt_i64(header.rank);
    enc.opt_f64(header.volume);
    enc.opt_i64(header.ln_type.map(i64::from));
    enc.opt_i64(header.ln_obj);
    enc.opt_str(header.stage_file.as_ref());
    enc.opt_str(header.banner.as_ref());
    enc.opt_str(header.back_bmp.as_ref());
    enc.opt_str(header.mode_hint.as_ref());
}

fn decode_header(dec: &mut Decoder<'_>) -> Result<ChartHeader, CacheError> {
    let title = dec.opt_string()?;
    let subtitle = dec.opt_string()?;
    let artist = dec.opt_string()?;
    let subartists = dec.string()?;
    Ok(ChartHeader {
        title,
        subtitle,
        artist,
        subartists: if subartists.is_empty() {
            Vec::new()
        } else {
            subartists.split('\n').map(str::to_string).collect()
        },
        genre: dec.opt_string()?,
        comment: dec.opt_string()?,
        tempo: dec.opt_f64()?,
        player: dec.opt_i64()?.map(|player| player as u8),
        play_level: dec.opt_i64()?,
        rank: dec.opt_i64()?,
        volume: dec.opt_f64()?,
        ln_type: dec.opt_i64()?.map(|ln_type| ln_type as u8),
        ln_obj: dec.opt_i64()?,
        stage_file: dec.opt_string()?,
        banner: dec.opt_string()?,
        back_bmp: dec.opt_string()?,
        mode_hint: dec.opt_string()?,
    })
}

fn encode_resources(enc: &mut Encoder, resources: &ResourceTable) {
    let sounds: Vec<_> = resources.of_kind(ResourceKind::Sound).collect();
    enc.bytes(b"_WAV_");
    enc.len(sounds.len());
    for entry in sounds {
        enc.i64(entry.id);
        enc.str(&entry.path);
    }

    let images: Vec<_> = resources
        .iter()
        .filter(|entry| matches!(entry.kind, ResourceKind::Image | ResourceKind::VideoBgaClip))
        .collect();
    enc.bytes(b"_BMP_");
    enc.len(images.len());
    for entry in images {
        enc.u8(kind_code(entry.kind));
        enc.i64(entry.id);
        enc.str(&entry.path);
    }

    let crops: Vec<_> = resources
        .of_kind(ResourceKind::BgaCrop)
        .filter_map(|entry| match entry.extra {
            ResourceExtra::Crop(crop) => Some((entry, crop)),
            _ => None,
        })
        .collect();
    enc.bytes(b"_BGA_");
    enc.len(crops.len());
    for (entry, crop) in crops {
        enc.i64(entry.id);
        enc.str(&entry.path);
        enc.i64(crop.source);
        for value in [crop.x1, crop.y1, crop.x2, crop.y2, crop.dx, crop.dy] {
            enc.i32(value);
        }
    }

    let definitions: Vec<_> = resources
        .iter()
        .filter_map(|entry| entry.number().map(|value| (entry, value)))
        .collect();
    enc.bytes(b"_DEF_");
    enc.len(definitions.len());
    for (entry, value) in definitions {
        enc.u8(kind_code(entry.kind));
        enc.i64(entry.id);
        enc.str(&entry.path);
        enc.f64(value);
    }
}

fn decode_resources(dec: &mut Decoder<'_>) -> Result<ResourceTable, CacheError> {
    let mut resources = ResourceTable::default();

    dec.tag("_WAV_")?;
    for _ in 0..dec.len()? {
        let id = dec.i64()?;
        let path = dec.string()?;
        resources.insert(ResourceEntry {
            kind: ResourceKind::Sound,
            id,
            path,
            extra: ResourceExtra::None,
        });
    }

    dec.tag("_BMP_")?;
    for _ in 0..dec.len()? {
        let kind = kind_from_code(dec.u8()?);
        let id = dec.i64()?;
        let path = dec.string()?;
        resources.insert(ResourceEntry {
            kind,
            id,
            path,
            extra: ResourceExtra::None,
        });
    }

    dec.tag("_BGA_")?;
    for _ in 0..dec.len()? {
        let id = dec.i64()?;
        let path = dec.string()?;
        let source = dec.i64()?;
        let mut fields = [0i32; 6];
        for field in &mut fields {
            *field = dec.i32()?;
        }
        let [x1, y1, x2, y2, dx, dy] = fields;
        resources.insert(ResourceEntry {
            kind: ResourceKind::BgaCrop,
            id,
            path,
            extra: ResourceExtra::Crop(CropRect {
                source,
                x1,
                y1,
                x2,
                y2,
                dx,
                dy,
            }),
        });
    }

    dec.tag("_DEF_")?;
    for _ in 0..dec.len()? {
        let kind = kind_from_code(dec.u8()?);
        let id = dec.i64()?;
        let path = dec.string()?;
        let value = dec.f64()?;
        resources.insert(ResourceEntry {
            kind,
            id,
            path,
            extra: ResourceExtra::Number(value),
        });
    }

    Ok(resources)
}

fn ticks_or_none(span: Option<gametime::TimeSpan>) -> i64 {
    span.map_or(NONE_TICKS, span_to_ticks)
}

fn span_or_none(ticks: i64) -> Option<gametime::TimeSpan> {
    (ticks != NONE_TICKS).then(|| span_from_ticks(ticks))
}

/// Serializes `timeline` into a snapshot.
#[must_use]
pub fn to_bytes(timeline: &Timeline) -> Vec<u8> {
    let mut enc = Encoder { buf: Vec::new() };
    enc.bytes(MAGIC);
    encode_header(&mut enc, timeline.header());
    encode_resources(&mut enc, timeline.resources());

    enc.bytes(b"_BMS_");
    enc.len(timeline.events().len());
    for event in timeline.events() {
        let branch = event.branch.unwrap_or(BranchTag { group: 0, index: 0 });
        enc.i64(span_to_ticks(event.time));
        enc.i32(event.channel);
        enc.i64(event.payload);
        enc.u32(branch.group);
        enc.u64(branch.index);
        enc.u8(event.kind.code());
        enc.f64(event.scalar);
        enc.i64(ticks_or_none(event.long_duration));
        enc.i64(ticks_or_none(event.slice.map(|slice| slice.start)));
        enc.i64(ticks_or_none(event.slice.and_then(|slice| slice.end)));
    }

    enc.bytes(b"_BAR_");
    enc.len(timeline.bar_lines().len());
    for &bar in timeline.bar_lines() {
        enc.i64(span_to_ticks(bar));
    }
    enc.buf
}

/// Writes a snapshot of `timeline` into `writer`.
///
/// # Errors
///
/// Returns [`CacheError::Io`] when writing fails.
pub fn write_timeline(timeline: &Timeline, mut writer: impl Write) -> Result<(), CacheError> {
    writer.write_all(&to_bytes(timeline))?;
    Ok(())
}

/// Reads a snapshot written by [`write_timeline`].
///
/// # Errors
///
/// Returns a [`CacheError`] describing where the data is malformed.
pub fn read_timeline(bytes: &[u8]) -> Result<Timeline, CacheError> {
    let mut dec = Decoder { bytes };
    if dec.take(MAGIC.len()).map_err(|_| CacheError::BadMagic)? != MAGIC {
        return Err(CacheError::BadMagic);
    }
    let header = decode_header(&mut dec)?;
    let resources = decode_resources(&mut dec)?;

    dec.tag("_BMS_")?;
    let count = dec.len()?;
    let mut events = Vec::with_capacity(count.min(bytes.len()));
    for order in 0..count {
        let time = span_from_ticks(dec.i64()?);
        let channel = dec.i32()?;
        let payload = dec.i64()?;
        let group = dec.u32()?;
        let index = dec.u64()?;
        let kind = EventKind::from_code(dec.u8()?);
        let scalar = dec.f64()?;
        let long_duration = span_or_none(dec.i64()?);
        let slice_start = span_or_none(dec.i64()?);
        let slice_end = span_or_none(dec.i64()?);
        events.push(TimelineEvent {
            scalar,
            slice: slice_start.map(|start| AudioSlice {
                start,
                end: slice_end,
            }),
            long_duration,
            branch: (group != 0).then_some(BranchTag { group, index }),
            order: order as u64,
            ..TimelineEvent::new(time, kind, channel, payload)
        });
    }

    dec.tag("_BAR_")?;
    let count = dec.len()?;
    let mut bar_lines = Vec::with_capacity(count.min(bytes.len()));
    for _ in 0..count {
        bar_lines.push(span_from_ticks(dec.i64()?));
    }

    Ok(Timeline::from_parts(header, resources, events, bar_lines))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn rejects_foreign_data() {
        assert!(matches!(read_timeline(b"BMS"), Err(CacheError::BadMagic)));
        assert!(matches!(read_timeline(b"RIFF...."), Err(CacheError::BadMagic)));
    }

    #[test]
    fn empty_timeline() {
        let bytes = to_bytes(&Timeline::default());
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(read_timeline(&bytes).unwrap(), Timeline::default());
    }

    #[test]
    fn truncated_snapshot() {
        let bytes = to_bytes(&Timeline::default());
        assert!(matches!(
            read_timeline(&bytes[..bytes.len() - 2]),
            Err(CacheError::UnexpectedEof)
        ));
        let mut broken = bytes.clone();
        let at = broken
            .windows(5)
            .position(|window| window == b"_BMS_")
            .unwrap();
        broken[at + 1] = b'X';
        assert!(matches!(
            read_timeline(&broken),
            Err(CacheError::MissingTag("_BMS_"))
        ));
    }
}
