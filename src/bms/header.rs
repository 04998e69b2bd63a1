//! Header directives.

use crate::{
    command::decode_base36,
    timeline::{ChartHeader, ResourceEntry, ResourceExtra, ResourceKind, ResourceTable, reserved},
};

/// The outcome of reading a line as a header directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderOutcome {
    /// Not a header directive.
    NotHeader,
    /// Consumed.
    Applied,
    /// A header directive whose parameter could not be read.
    Malformed,
}

fn text(param: &str) -> Option<String> {
    if param.is_empty() {
        return None;
    }
    let trimmed = param.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed);
    Some(unquoted.to_string())
}

fn reserve_image(resources: &mut ResourceTable, id: i64, path: &str) {
    resources.insert(ResourceEntry {
        kind: ResourceKind::Image,
        id,
        path: path.to_string(),
        extra: ResourceExtra::None,
    });
}

/// Applies a header directive to `header`. Header images are also registered in `resources` under their reserved
/// ids.
pub fn apply_header(
    header: &mut ChartHeader,
    resources: &mut ResourceTable,
    command: &str,
    param: &str,
) -> HeaderOutcome {
    let upper = command.to_ascii_uppercase();
    let parsed = match upper.as_str() {
        "TITLE" => {
            header.title = text(param);
            true
        }
        "SUBTITLE" => {
            header.subtitle = text(param);
            true
        }
        "ARTIST" => {
            header.artist = text(param);
            true
        }
        "SUBARTIST" => {
            header.subartists.extend(text(param));
            true
        }
        "GENRE" => {
            header.genre = text(param);
            true
        }
        "COMMENT" => {
            header.comment = text(param);
            true
        }
        "BPM" => match param.parse::<f64>() {
            Ok(tempo) if tempo.is_finite() && tempo > 0.0 => {
                header.tempo = Some(tempo);
                true
            }
            _ => false,
        },
        "PLAYER" => param
            .parse()
            .map(|player| header.player = Some(player))
            .is_ok(),
        "PLAYLEVEL" => param
            .parse()
            .map(|level| header.play_level = Some(level))
            .is_ok(),
        "RANK" => param.parse().map(|rank| header.rank = Some(rank)).is_ok(),
        "VOLWAV" => param
            .parse::<f64>()
            .map(|volume| header.volume = Some(volume))
            .is_ok(),
        "LNTYPE" => param
            .parse()
            .map(|ln_type| header.ln_type = Some(ln_type))
            .is_ok(),
        "LNOBJ" => {
            let id = decode_base36(param);
            if id > 0 {
                header.ln_obj = Some(id);
            }
            id > 0
        }
        "STAGEFILE" => {
            reserve_image(resources, reserved::STAGE_FILE, param);
            header.stage_file = Some(param.to_string());
            true
        }
        "BANNER" => {
            reserve_image(resources, reserved::BANNER, param);
            header.banner = Some(param.to_string());
            true
        }
        "BACKBMP" => {
            reserve_image(resources, reserved::BACK_BMP, param);
            header.back_bmp = Some(param.to_string());
            true
        }
        _ => return HeaderOutcome::NotHeader,
    };
    if parsed {
        HeaderOutcome::Applied
    } else {
        HeaderOutcome::Malformed
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn reads_metadata() {
        let mut header = ChartHeader::default();
        let mut resources = ResourceTable::default();
        for (command, param) in [
            ("TITLE", "Song"),
            ("artist", "Someone"),
            ("SUBARTIST", "obj: A"),
            ("SUBARTIST", "obj: B"),
            ("COMMENT", "\"quoted\""),
            ("BPM", "150.5"),
            ("PLAYLEVEL", "7"),
            ("LNOBJ", "ZZ"),
            ("STAGEFILE", "title.png"),
        ] {
            assert_eq!(
                apply_header(&mut header, &mut resources, command, param),
                HeaderOutcome::Applied
            );
        }
        assert_eq!(header.title.as_deref(), Some("Song"));
        assert_eq!(header.artist.as_deref(), Some("Someone"));
        assert_eq!(header.subartists, vec!["obj: A", "obj: B"]);
        assert_eq!(header.comment.as_deref(), Some("quoted"));
        assert_eq!(header.tempo, Some(150.5));
        assert_eq!(header.play_level, Some(7));
        assert_eq!(header.ln_obj, Some(36 * 36 - 1));
        assert_eq!(
            resources
                .get(ResourceKind::Image, reserved::STAGE_FILE)
                .map(|e| e.path.as_str()),
            Some("title.png")
        );
    }

    #[test]
    fn malformed_and_unknown() {
        let mut header = ChartHeader::default();
        let mut resources = ResourceTable::default();
        assert_eq!(
            apply_header(&mut header, &mut resources, "BPM", "fast"),
            HeaderOutcome::Malformed
        );
        assert_eq!(
            apply_header(&mut header, &mut resources, "BPM", "-3"),
            HeaderOutcome::Malformed
        );
        assert_eq!(
            apply_header(&mut header, &mut resources, "WAV01", "a.wav"),
            HeaderOutcome::NotHeader
        );
        assert_eq!(header.tempo, None);
    }
}
