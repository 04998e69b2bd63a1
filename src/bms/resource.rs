//! Resource directives: `#WAVxx`, `#BMPxx`, `#BGAxx`, `#BPMxx` and `#STOPxx`.

use super::{BmsWarning, lex::ResourceTag};
use crate::{
    command::{INVALID_ID, decode_base36},
    timeline::{CropRect, ResourceEntry, ResourceExtra, ResourceKind},
};

const VIDEO_EXTENSIONS: [&str; 10] = [
    "mpg", "mpeg", "avi", "mp4", "m4v", "wmv", "webm", "mkv", "ogv", "flv",
];

/// Returns whether `path` names a video container.
pub(crate) fn is_video(path: &str) -> bool {
    path.rsplit_once('.').is_some_and(|(_, ext)| {
        VIDEO_EXTENSIONS
            .iter()
            .any(|video| video.eq_ignore_ascii_case(ext))
    })
}

fn parse_crop(param: &str) -> Option<CropRect> {
    let mut fields = param.split_whitespace();
    let source = decode_base36(fields.next()?);
    if source == INVALID_ID {
        return None;
    }
    let mut numbers = [0i32; 6];
    for slot in &mut numbers {
        *slot = fields.next()?.parse().ok()?;
    }
    let [x1, y1, x2, y2, dx, dy] = numbers;
    Some(CropRect {
        source,
        x1,
        y1,
        x2,
        y2,
        dx,
        dy,
    })
}

/// Reads a resource directive into an entry.
///
/// # Errors
///
/// Returns [`BmsWarning::MalformedResource`] when the id or the value cannot be read.
pub fn read_resource(tag: ResourceTag, id: &str, param: &str) -> Result<ResourceEntry, BmsWarning> {
    let malformed = || BmsWarning::MalformedResource {
        id: id.to_string(),
        param: param.to_string(),
    };
    let id_value = decode_base36(id);
    if id_value == INVALID_ID || param.is_empty() {
        return Err(malformed());
    }
    let (kind, extra) = match tag {
        ResourceTag::Wav => (ResourceKind::Sound, ResourceExtra::None),
        ResourceTag::Bmp if is_video(param) => (ResourceKind::VideoBgaClip, ResourceExtra::None),
        ResourceTag::Bmp => (ResourceKind::Image, ResourceExtra::None),
        ResourceTag::Bpm => {
            let tempo = param.parse::<f64>().map_err(|_| malformed())?;
            if !tempo.is_finite() || tempo <= 0.0 {
                return Err(malformed());
            }
            (ResourceKind::TempoDefinition, ResourceExtra::Number(tempo))
        }
        ResourceTag::Stop => {
            let length = param.parse::<f64>().map_err(|_| malformed())?;
            if !length.is_finite() || length < 0.0 {
                return Err(malformed());
            }
            (ResourceKind::PauseDefinition, ResourceExtra::Number(length))
        }
        ResourceTag::Bga => {
            let crop = parse_crop(param).ok_or_else(malformed)?;
            (ResourceKind::BgaCrop, ResourceExtra::Crop(crop))
        }
    };
    Ok(ResourceEntry {
        kind,
        id: id_value,
        path: param.to_string(),
        extra,
    })
}
