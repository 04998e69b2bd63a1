//! Definitions of channel in BMS.
//!
//! A raw channel token is two base-36 characters. It is normalized into an integer id with the historical digit
//! shuffle: `01..99` keep their decimal reading, while tokens whose second character is a letter land in the
//! extended range above `1000`.

use std::collections::HashMap;

use super::char_to_base36;

/// The value returned by [`ChannelMap::normalize`] for a token that is not a channel.
pub const INVALID_CHANNEL: i32 = -1;

/// The normalized id of the measure length channel `02`.
pub const MEASURE_LENGTH_CHANNEL: i32 = 2;

/// Maps raw channel tokens into normalized channel ids.
///
/// The map carries an optional override table that redirects specific normalized ids to alternate ids. It is empty by
/// default, and it is a plain value owned by the caller: there is no process-wide table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelMap {
    overrides: HashMap<i32, i32>,
}

impl ChannelMap {
    /// Creates a map without any override.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an alias so that tokens normalizing to `from` are read as `to`.
    #[must_use]
    pub fn with_override(mut self, from: i32, to: i32) -> Self {
        self.overrides.insert(from, to);
        self
    }

    /// Adds an alias, returning the previous target of `from` if any.
    pub fn insert_override(&mut self, from: i32, to: i32) -> Option<i32> {
        self.overrides.insert(from, to)
    }

    /// Returns the override table.
    #[must_use]
    pub const fn overrides(&self) -> &HashMap<i32, i32> {
        &self.overrides
    }

    /// Normalizes a channel token, applying the override table.
    ///
    /// ```
    /// use bms_timeline::command::channel::{ChannelMap, INVALID_CHANNEL};
    ///
    /// let map = ChannelMap::new();
    /// assert_eq!(map.normalize("01"), 1);
    /// assert_eq!(map.normalize("0A"), 1010);
    /// assert_eq!(map.normalize("ZZ"), 4535);
    /// assert_eq!(map.normalize("abc"), INVALID_CHANNEL);
    /// ```
    #[must_use]
    pub fn normalize(&self, token: &str) -> i32 {
        let id = normalize_channel(token);
        if id == INVALID_CHANNEL {
            return id;
        }
        self.redirect(id)
    }

    /// Applies the override table to an already normalized id.
    #[must_use]
    pub fn redirect(&self, channel: i32) -> i32 {
        self.overrides.get(&channel).copied().unwrap_or(channel)
    }
}

/// Normalizes a channel token without any override.
#[must_use]
pub fn normalize_channel(token: &str) -> i32 {
    let &[hi, lo] = token.as_bytes() else {
        return INVALID_CHANNEL;
    };
    let (Some(d0), Some(d1)) = (char_to_base36(hi), char_to_base36(lo)) else {
        return INVALID_CHANNEL;
    };
    let (d0, d1) = (i32::from(d0), i32::from(d1));
    if d1 > 9 {
        d0 * 100 + d1 + 1000
    } else {
        d0 * 10 + d1
    }
}

/// A side of the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PlayerSide {
    /// The player 1 side.
    #[default]
    Player1,
    /// The player 2 side.
    Player2,
}

/// The meaning of a normalized channel id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum ChannelKind {
    /// `01`: the background sound.
    Bgm,
    /// `02`: the length of the measure, as a decimal multiplier.
    MeasureLength,
    /// `03`: a tempo change whose value is the hexadecimal cell itself.
    TempoInline,
    /// `04`: the base layer of the background animation.
    BgaBase,
    /// `06`: the image shown on a poor judgement.
    BgaPoor,
    /// `07`: the overlay layer of the background animation.
    BgaLayer,
    /// `08`: a tempo change referring to a `#BPMxx` definition.
    TempoRef,
    /// `09`: a pause referring to a `#STOPxx` definition.
    Pause,
    /// `11-19` and `21-29`: a playable note.
    Note {
        /// The side of the lane.
        side: PlayerSide,
        /// The key number, `1-9`.
        key: u8,
    },
    /// `51-59` and `61-69`: a long note boundary, paired in order of appearance.
    LongNote {
        /// The side of the lane.
        side: PlayerSide,
        /// The key number, `1-9`.
        key: u8,
    },
    /// Anything else. No event is produced for these.
    Unknown,
}

impl ChannelKind {
    /// Classifies a normalized channel id.
    #[must_use]
    pub const fn of(channel: i32) -> Self {
        match channel {
            1 => Self::Bgm,
            2 => Self::MeasureLength,
            3 => Self::TempoInline,
            4 => Self::BgaBase,
            6 => Self::BgaPoor,
            7 => Self::BgaLayer,
            8 => Self::TempoRef,
            9 => Self::Pause,
            11..=19 => Self::Note {
                side: PlayerSide::Player1,
                key: (channel - 10) as u8,
            },
            21..=29 => Self::Note {
                side: PlayerSide::Player2,
                key: (channel - 20) as u8,
            },
            51..=59 => Self::LongNote {
                side: PlayerSide::Player1,
                key: (channel - 50) as u8,
            },
            61..=69 => Self::LongNote {
                side: PlayerSide::Player2,
                key: (channel - 60) as u8,
            },
            _ => Self::Unknown,
        }
    }

    /// Returns whether the channel carries an image swap.
    #[must_use]
    pub const fn is_image(self) -> bool {
        matches!(self, Self::BgaBase | Self::BgaPoor | Self::BgaLayer)
    }

    /// Returns whether the channel is a lane the player hits.
    #[must_use]
    pub const fn is_playable(self) -> bool {
        matches!(self, Self::Note { .. } | Self::LongNote { .. })
    }
}

/// Returns the normalized note channel for a side and key, `11-19` or `21-29`.
#[must_use]
pub const fn note_channel(side: PlayerSide, key: u8) -> i32 {
    match side {
        PlayerSide::Player1 => 10 + key as i32,
        PlayerSide::Player2 => 20 + key as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_plain_and_extended() {
        assert_eq!(normalize_channel("01"), 1);
        assert_eq!(normalize_channel("09"), 9);
        assert_eq!(normalize_channel("16"), 16);
        assert_eq!(normalize_channel("0A"), 1010);
        assert_eq!(normalize_channel("0a"), 1010);
        assert_eq!(normalize_channel("ZZ"), 4535);
        assert_eq!(normalize_channel("A1"), 101);
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert_eq!(normalize_channel(""), INVALID_CHANNEL);
        assert_eq!(normalize_channel("1"), INVALID_CHANNEL);
        assert_eq!(normalize_channel("abc"), INVALID_CHANNEL);
        assert_eq!(normalize_channel("0-"), INVALID_CHANNEL);
    }

    #[test]
    fn override_table_redirects() {
        let map = ChannelMap::new().with_override(1010, 11);
        assert_eq!(map.normalize("0A"), 11);
        assert_eq!(map.normalize("01"), 1);
        assert_eq!(map.normalize("0-"), INVALID_CHANNEL);
    }

    #[test]
    fn classification() {
        assert_eq!(ChannelKind::of(1), ChannelKind::Bgm);
        assert_eq!(ChannelKind::of(5), ChannelKind::Unknown);
        assert_eq!(
            ChannelKind::of(16),
            ChannelKind::Note {
                side: PlayerSide::Player1,
                key: 6
            }
        );
        assert_eq!(
            ChannelKind::of(62),
            ChannelKind::LongNote {
                side: PlayerSide::Player2,
                key: 2
            }
        );
        assert_eq!(ChannelKind::of(31), ChannelKind::Unknown);
        assert_eq!(ChannelKind::of(1010), ChannelKind::Unknown);
        assert_eq!(note_channel(PlayerSide::Player2, 2), 22);
    }
}
