//! Splitting the source into directive lines.
//!
//! Only lines starting with `#` (after leading whitespace) are directives. The text after `#` is split into a
//! command and a parameter at the first `:` or whitespace, whichever comes first.

use std::ops::Range;

/// One directive line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Directive<'a> {
    /// The command without `#`, e.g. `TITLE` or `00111`.
    pub command: &'a str,
    /// The parameter, trimmed.
    pub param: &'a str,
    /// Byte range of the whole line in the source, without the line break.
    pub range: Range<usize>,
}

/// What a command names, after the resource form `#XXXyy` is split off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceTag {
    /// `#WAVyy`.
    Wav,
    /// `#BMPyy`.
    Bmp,
    /// `#BGAyy`.
    Bga,
    /// `#BPMyy`.
    Bpm,
    /// `#STOPyy`.
    Stop,
}

impl<'a> Directive<'a> {
    /// Reads the command as `#XXXyy` or `#STOPyy`, returning the tag and the id token.
    #[must_use]
    pub fn resource_form(&self) -> Option<(ResourceTag, &'a str)> {
        let command = self.command;
        if !command.is_ascii() {
            return None;
        }
        match command.len() {
            5 => {
                let (tag, id) = command.split_at(3);
                let tag = match tag.to_ascii_uppercase().as_str() {
                    "WAV" => ResourceTag::Wav,
                    "BMP" => ResourceTag::Bmp,
                    "BGA" => ResourceTag::Bga,
                    "BPM" => ResourceTag::Bpm,
                    _ => return None,
                };
                Some((tag, id))
            }
            6 => {
                let (tag, id) = command.split_at(4);
                tag.eq_ignore_ascii_case("STOP")
                    .then_some((ResourceTag::Stop, id))
            }
            _ => None,
        }
    }

    /// Reads the command as `mmmcc`, returning the measure and the channel token.
    #[must_use]
    pub fn body_form(&self) -> Option<(u32, &'a str)> {
        let command = self.command;
        if command.len() != 5 || !command.is_ascii() {
            return None;
        }
        let (measure, channel) = command.split_at(3);
        if !measure.bytes().all(|ch| ch.is_ascii_digit()) {
            return None;
        }
        Some((measure.parse().ok()?, channel))
    }
}

/// Iterates the directive lines of `source`.
pub fn directives(source: &str) -> impl Iterator<Item = Directive<'_>> {
    let mut offset = 0;
    source.split_inclusive('\n').filter_map(move |raw| {
        let line_start = offset;
        offset += raw.len();
        let line = raw.trim_end_matches(['\n', '\r']);
        let range = line_start..line_start + line.len();
        let body = line.trim_start().strip_prefix('#')?;
        let split = body.find(|ch: char| ch == ':' || ch.is_whitespace());
        let (command, param) = match split {
            Some(at) => (&body[..at], &body[at + 1..]),
            None => (body, ""),
        };
        if command.is_empty() {
            return None;
        }
        Some(Directive {
            command,
            param: param.trim(),
            range,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_first_separator() {
        let source = "#TITLE  My Song \r\n#00111:0101\n  #WAV01 kick.wav\nnot a directive\n#ENDIF";
        let lines: Vec<_> = directives(source)
            .map(|d| (d.command, d.param))
            .collect();
        assert_eq!(
            lines,
            vec![
                ("TITLE", "My Song"),
                ("00111", "0101"),
                ("WAV01", "kick.wav"),
                ("ENDIF", ""),
            ]
        );
    }

    #[test]
    fn colon_after_space_is_part_of_param() {
        let d = directives("#TITLE a:b").next().unwrap();
        assert_eq!((d.command, d.param), ("TITLE", "a:b"));
    }

    #[test]
    fn ranges_cover_lines() {
        let source = "#A 1\n#B 2";
        let ranges: Vec<_> = directives(source).map(|d| d.range).collect();
        assert_eq!(ranges, vec![0..4, 5..9]);
    }

    #[test]
    fn resource_and_body_forms() {
        let d = directives("#stop0A 96").next().unwrap();
        assert_eq!(d.resource_form(), Some((ResourceTag::Stop, "0A")));
        let d = directives("#BPM 120").next().unwrap();
        assert_eq!(d.resource_form(), None);
        let d = directives("#01203:78").next().unwrap();
        assert_eq!(d.body_form(), Some((12, "03")));
        assert_eq!(d.resource_form(), None);
    }
}
