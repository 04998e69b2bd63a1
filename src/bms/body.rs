//! Body lines: `#mmmcc:data`.

use std::ops::Range;

use super::BmsWarning;
use crate::{
    command::{INVALID_ID, ObjId, channel::ChannelKind, decode_base16},
    time::ObjTime,
    timeline::BranchTag,
};

/// A nonzero cell of a body line, before its time is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObj {
    /// Where the cell is.
    pub position: ObjTime,
    /// The normalized channel.
    pub channel: i32,
    /// The decoded cell value.
    pub value: i64,
    /// The branch the line was compiled in.
    pub branch: Option<BranchTag>,
    /// The line in the source.
    pub line: Range<usize>,
}

/// An explicit measure length from channel `02`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMeasureLength {
    /// The measure.
    pub measure: u32,
    /// The length ratio.
    pub ratio: f64,
    /// The branch the line was compiled in.
    pub branch: Option<BranchTag>,
}

/// Decodes the cells of a body line into objects. Zero cells produce nothing; unreadable cells are reported and
/// skipped.
pub fn decode_cells(
    measure: u32,
    channel: i32,
    data: &str,
    branch: Option<BranchTag>,
    line: &Range<usize>,
    objs: &mut Vec<RawObj>,
    warnings: &mut Vec<BmsWarning>,
) {
    let compact: String = data.chars().filter(|ch| !ch.is_whitespace()).collect();
    if compact.len() % 2 != 0 || !compact.is_ascii() {
        warnings.push(BmsWarning::MalformedCell {
            cell: compact.clone(),
        });
    }
    let bytes = compact.as_bytes();
    let total = (bytes.len() / 2) as u64;
    let hex = ChannelKind::of(channel) == ChannelKind::TempoInline;
    for (index, pair) in bytes.chunks_exact(2).enumerate() {
        let Ok(cell) = std::str::from_utf8(pair) else {
            continue;
        };
        let value = if hex {
            decode_base16(cell)
        } else {
            ObjId::try_from(cell).map_or(INVALID_ID, ObjId::as_i64)
        };
        if value == INVALID_ID {
            warnings.push(BmsWarning::MalformedCell {
                cell: cell.to_string(),
            });
            continue;
        }
        if value == 0 {
            continue;
        }
        let Some(position) = ObjTime::new(measure, index as u64, total) else {
            continue;
        };
        objs.push(RawObj {
            position,
            channel,
            value,
            branch,
            line: line.clone(),
        });
    }
}

/// Reads the decimal multiplier of a channel `02` line.
///
/// # Errors
///
/// Returns [`BmsWarning::MalformedMeasureLength`] unless `data` is a finite positive number.
pub fn decode_measure_length(
    measure: u32,
    data: &str,
    branch: Option<BranchTag>,
) -> Result<RawMeasureLength, BmsWarning> {
    match data.trim().parse::<f64>() {
        Ok(ratio) if ratio.is_finite() && ratio > 0.0 => Ok(RawMeasureLength {
            measure,
            ratio,
            branch,
        }),
        _ => Err(BmsWarning::MalformedMeasureLength {
            value: data.to_string(),
        }),
    }
}
