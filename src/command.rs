//! Definitions of command argument data.
//!
//! The two-character alphanumeric tokens (`01`, `0A`, `ZZ`, ...) appear everywhere in a chart: as resource ids, as
//! channel ids and as cell values. They are read as base-36 numbers, case-insensitively.

pub mod channel;
pub mod mixin;

/// The value returned by [`decode_base36`] for a token it cannot read.
pub const INVALID_ID: i64 = -1;

const BASE: i64 = 36;

pub(crate) const fn char_to_base36(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'A'..=b'Z' => Some(ch - b'A' + 10),
        b'a'..=b'z' => Some(ch - b'a' + 10),
        _ => None,
    }
}

const fn base36_to_char(digit: u8) -> char {
    match digit {
        0..=9 => (b'0' + digit) as char,
        _ => (b'A' + digit - 10) as char,
    }
}

/// Decodes a base-36 token, case-insensitively.
///
/// Returns [`INVALID_ID`] when `token` is empty, too long to fit in an `i64`, or contains a character outside
/// `0-9a-z`.
///
/// ```
/// use bms_timeline::command::{decode_base36, INVALID_ID};
///
/// assert_eq!(decode_base36("01"), 1);
/// assert_eq!(decode_base36("zz"), 36 * 36 - 1);
/// assert_eq!(decode_base36("0!"), INVALID_ID);
/// ```
#[must_use]
pub fn decode_base36(token: &str) -> i64 {
    // 36^12 still fits in an i64, 36^13 does not.
    if token.is_empty() || token.len() > 12 {
        return INVALID_ID;
    }
    let mut value = 0i64;
    for ch in token.bytes() {
        let Some(digit) = char_to_base36(ch) else {
            return INVALID_ID;
        };
        value = value * BASE + i64::from(digit);
    }
    value
}

/// Decodes a base-16 token, used by the inline tempo channel.
///
/// Returns [`INVALID_ID`] on the same conditions as [`decode_base36`].
#[must_use]
pub fn decode_base16(token: &str) -> i64 {
    if token.is_empty() || token.len() > 15 || !token.bytes().all(|ch| ch.is_ascii_hexdigit()) {
        return INVALID_ID;
    }
    i64::from_str_radix(token, 16).unwrap_or(INVALID_ID)
}

/// Encodes a non-negative number as an upper-case base-36 token of at least two characters.
///
/// Returns `None` for negative input.
///
/// ```
/// use bms_timeline::command::encode_base36;
///
/// assert_eq!(encode_base36(1).as_deref(), Some("01"));
/// assert_eq!(encode_base36(36 * 36).as_deref(), Some("100"));
/// assert_eq!(encode_base36(-3), None);
/// ```
#[must_use]
pub fn encode_base36(value: i64) -> Option<String> {
    if value < 0 {
        return None;
    }
    let mut digits = Vec::with_capacity(4);
    let mut rest = value;
    while rest > 0 {
        digits.push(base36_to_char((rest % BASE) as u8));
        rest /= BASE;
    }
    while digits.len() < 2 {
        digits.push('0');
    }
    Some(digits.into_iter().rev().collect())
}

/// An object id. Its meaning is determined by the channel or the directive it belongs to.
///
/// The representation is 2 digits of ASCII characters, normalized to upper case.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjId([u8; 2]);

impl std::fmt::Debug for ObjId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ObjId")
            .field(&format!("{}{}", self.0[0] as char, self.0[1] as char))
            .finish()
    }
}

impl std::fmt::Display for ObjId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.0[0] as char, self.0[1] as char)
    }
}

impl<'a> TryFrom<&'a str> for ObjId {
    type Error = &'a str;
    fn try_from(value: &'a str) -> core::result::Result<Self, Self::Error> {
        let &[ch1, ch2] = value.as_bytes() else {
            return Err(value);
        };
        if char_to_base36(ch1).is_none() || char_to_base36(ch2).is_none() {
            return Err(value);
        }
        Ok(Self([ch1.to_ascii_uppercase(), ch2.to_ascii_uppercase()]))
    }
}

impl ObjId {
    /// Instances a special null id, which means the rest object.
    #[must_use]
    pub const fn null() -> Self {
        Self([b'0', b'0'])
    }

    /// Returns whether the id is `00`, which never produces an object.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0[0] == b'0' && self.0[1] == b'0'
    }

    /// Converts the object id into its base-36 value.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        let hi = char_to_base36(self.0[0]).map_or(0, i64::from);
        let lo = char_to_base36(self.0[1]).map_or(0, i64::from);
        hi * BASE + lo
    }

    /// The two digits of the id, most significant first.
    #[must_use]
    pub fn digits(self) -> (u8, u8) {
        (
            char_to_base36(self.0[0]).unwrap_or_default(),
            char_to_base36(self.0[1]).unwrap_or_default(),
        )
    }
}

impl From<ObjId> for i64 {
    fn from(value: ObjId) -> Self {
        value.as_i64()
    }
}
