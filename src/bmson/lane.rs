//! Lane layouts of bmson. The `x` of a note is a logical lane whose meaning depends on `info.mode_hint`; this maps it
//! onto the normalized BMS channel numbering.
//!
//! A mode hint is a family and a lane count, such as `beat-7k`, `popn-5k` or `generic-6keys`. The family decides
//! where lanes sit and the count decides which of them exist.

use std::num::NonZeroU8;

use crate::command::channel::{PlayerSide, note_channel};

/// The family part of a mode hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LaneFamily {
    /// `beat-*`: seven keys and a scratch per side, eight lanes per side.
    #[default]
    Beat,
    /// `popn-*`: up to nine buttons on one side.
    PopN,
    /// Anything else: lanes map onto keys in order, nine per side.
    Generic,
}

/// A lane layout selected by the mode hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaneLayout {
    family: LaneFamily,
    keys: u8,
}

impl Default for LaneLayout {
    fn default() -> Self {
        Self::new(LaneFamily::Beat, 7)
    }
}

impl LaneLayout {
    /// Creates a layout with `keys` keys, not counting scratches.
    #[must_use]
    pub const fn new(family: LaneFamily, keys: u8) -> Self {
        Self { family, keys }
    }

    /// The family.
    #[must_use]
    pub const fn family(self) -> LaneFamily {
        self.family
    }

    /// The number of keys, not counting scratches.
    #[must_use]
    pub const fn keys(self) -> u8 {
        self.keys
    }

    /// Selects the layout for a mode hint such as `beat-7k`, `popn-9k` or `generic-6keys`.
    ///
    /// A hint without a readable count takes the largest count of its family.
    #[must_use]
    pub fn from_mode_hint(hint: &str) -> Self {
        let (family, count) = hint.split_once('-').unwrap_or((hint, ""));
        let digits = count
            .split(|c: char| !c.is_ascii_digit())
            .next()
            .unwrap_or_default();
        let keys = digits.parse::<u8>().ok().filter(|&keys| keys > 0);
        if family.eq_ignore_ascii_case("beat") {
            Self::new(LaneFamily::Beat, keys.unwrap_or(14).min(14))
        } else if family.eq_ignore_ascii_case("popn") {
            Self::new(LaneFamily::PopN, keys.unwrap_or(9).min(9))
        } else {
            Self::new(LaneFamily::Generic, keys.unwrap_or(18).min(18))
        }
    }

    /// Returns the normalized note channel for lane `x`, or `None` when the layout has no such lane.
    ///
    /// ```
    /// use std::num::NonZeroU8;
    /// use bms_timeline::bmson::lane::LaneLayout;
    ///
    /// let lane = |x| NonZeroU8::new(x).unwrap();
    /// let seven = LaneLayout::from_mode_hint("beat-7k");
    /// assert_eq!(seven.channel_of(lane(1)), Some(11));
    /// assert_eq!(seven.channel_of(lane(8)), Some(16));
    /// assert_eq!(seven.channel_of(lane(9)), None);
    /// let fourteen = LaneLayout::from_mode_hint("beat-14k");
    /// assert_eq!(fourteen.channel_of(lane(15)), Some(29));
    /// assert_eq!(fourteen.channel_of(lane(17)), None);
    /// ```
    #[must_use]
    pub fn channel_of(self, x: NonZeroU8) -> Option<i32> {
        let x = x.get();
        match self.family {
            LaneFamily::Beat => {
                let keys_per_side = if self.keys > 7 {
                    self.keys / 2
                } else {
                    self.keys
                };
                let (lane, side) = if x > 8 {
                    if self.keys <= 7 {
                        return None;
                    }
                    (x - 8, PlayerSide::Player2)
                } else {
                    (x, PlayerSide::Player1)
                };
                let key = match lane {
                    8 => 6,
                    1..=7 if lane <= keys_per_side => match lane {
                        6 => 8,
                        7 => 9,
                        _ => lane,
                    },
                    _ => return None,
                };
                Some(note_channel(side, key))
            }
            LaneFamily::PopN => match x {
                _ if x > self.keys => None,
                1..=5 => Some(note_channel(PlayerSide::Player1, x)),
                6..=9 => Some(note_channel(PlayerSide::Player2, x - 4)),
                _ => None,
            },
            LaneFamily::Generic => match x {
                _ if x > self.keys => None,
                1..=9 => Some(note_channel(PlayerSide::Player1, x)),
                10..=18 => Some(note_channel(PlayerSide::Player2, x - 9)),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn lanes(hint: &str) -> Vec<Option<i32>> {
        let layout = LaneLayout::from_mode_hint(hint);
        (1..=19)
            .filter_map(NonZeroU8::new)
            .map(|x| layout.channel_of(x))
            .collect()
    }

    #[test]
    fn hints() {
        assert_eq!(
            LaneLayout::from_mode_hint("beat-7k"),
            LaneLayout::new(LaneFamily::Beat, 7)
        );
        assert_eq!(
            LaneLayout::from_mode_hint("BEAT-14k"),
            LaneLayout::new(LaneFamily::Beat, 14)
        );
        assert_eq!(
            LaneLayout::from_mode_hint("popn-5k"),
            LaneLayout::new(LaneFamily::PopN, 5)
        );
        assert_eq!(
            LaneLayout::from_mode_hint("generic-6keys"),
            LaneLayout::new(LaneFamily::Generic, 6)
        );
        assert_eq!(
            LaneLayout::from_mode_hint("keyboard-24k"),
            LaneLayout::new(LaneFamily::Generic, 18)
        );
        assert_eq!(
            LaneLayout::from_mode_hint("beat"),
            LaneLayout::new(LaneFamily::Beat, 14)
        );
        assert_eq!(
            LaneLayout::from_mode_hint(""),
            LaneLayout::new(LaneFamily::Generic, 18)
        );
    }

    #[test]
    fn beat_seven_keys() {
        let beat = lanes("beat-7k");
        assert_eq!(
            &beat[..8],
            &[Some(11), Some(12), Some(13), Some(14), Some(15), Some(18), Some(19), Some(16)]
        );
        assert!(beat[8..].iter().all(Option::is_none));
    }

    #[test]
    fn beat_five_keys_drop_the_outer_keys() {
        let beat = lanes("beat-5k");
        assert_eq!(
            &beat[..8],
            &[Some(11), Some(12), Some(13), Some(14), Some(15), None, None, Some(16)]
        );
        assert_eq!(beat[8], None);
    }

    #[test]
    fn beat_doubles() {
        let ten = lanes("beat-10k");
        assert_eq!(ten[8], Some(21));
        assert_eq!(ten[13], None);
        assert_eq!(ten[15], Some(26));

        let fourteen = lanes("beat-14k");
        assert_eq!(fourteen[8], Some(21));
        assert_eq!(fourteen[13], Some(28));
        assert_eq!(fourteen[15], Some(26));
        assert_eq!(fourteen[16], None);
    }

    #[test]
    fn popn_layouts() {
        let nine = lanes("popn-9k");
        assert_eq!(
            &nine[..9],
            &[Some(11), Some(12), Some(13), Some(14), Some(15), Some(22), Some(23), Some(24), Some(25)]
        );
        assert_eq!(nine[9], None);

        let five = lanes("popn-5k");
        assert_eq!(five[4], Some(15));
        assert_eq!(five[5], None);
    }

    #[test]
    fn generic_layout() {
        let generic = lanes("generic-18keys");
        assert_eq!(generic[0], Some(11));
        assert_eq!(generic[9], Some(21));
        assert_eq!(generic[17], Some(29));
        assert_eq!(generic[18], None);
        assert_eq!(lanes("generic-6keys")[6], None);
    }
}
