use percent_encoding::percent_decode_str;

use crate::asset::{MediaKind, ProbedMetadata};
use crate::error::ProbeError;

/// Source window given to still images, which have no intrinsic duration.
pub const IMAGE_HOLD_SECONDS: f64 = 3600.0;

const VIDEO_EXTS: &[&str] = &["mp4", "m4v", "mov", "webm", "mkv", "avi", "ogv"];
const AUDIO_EXTS: &[&str] = &["mp3", "wav", "aac", "m4a", "ogg", "oga", "flac", "opus"];
const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// Media import boundary. Implementations read the source header and report
/// what they find; they never touch the registry.
pub trait Prober {
    fn probe(&self, source: &str, kind: MediaKind) -> Result<ProbedMetadata, ProbeError>;
}

impl<F> Prober for F
where
    F: Fn(&str, MediaKind) -> Result<ProbedMetadata, ProbeError>,
{
    fn probe(&self, source: &str, kind: MediaKind) -> Result<ProbedMetadata, ProbeError> { self(source, kind) }
}

/// Guess the media kind of a source reference.
///
/// Accepts `data:<mime>;...` handles, `<scheme>:<mime>#...` style in-memory
/// handles carrying a MIME type, and plain URLs/paths with an extension.
pub fn detect_kind(source: &str) -> Option<MediaKind> {
    if let Some(rest) = source.strip_prefix("data:") {
        return kind_from_mime(rest.split([';', ',']).next().unwrap_or(""));
    }
    let path = source.split(['?', '#']).next().unwrap_or(source);
    let last = path.rsplit('/').next().unwrap_or(path);
    if let Some((_, ext)) = last.rsplit_once('.') {
        let ext = ext.to_ascii_lowercase();
        if VIDEO_EXTS.contains(&ext.as_str()) { return Some(MediaKind::Video); }
        if AUDIO_EXTS.contains(&ext.as_str()) { return Some(MediaKind::Audio); }
        if IMAGE_EXTS.contains(&ext.as_str()) { return Some(MediaKind::Image); }
        return None;
    }
    // blob handles: "blob:video/mp4#<id>"
    source.split_once(':').and_then(|(_, rest)| kind_from_mime(rest.split('#').next().unwrap_or("")))
}

fn kind_from_mime(mime: &str) -> Option<MediaKind> {
    let top = mime.split('/').next().unwrap_or("").trim().to_ascii_lowercase();
    match top.as_str() {
        "video" => Some(MediaKind::Video),
        "audio" => Some(MediaKind::Audio),
        "image" => Some(MediaKind::Image),
        _ => None,
    }
}

/// Human readable name for a source: the decoded last path segment.
pub fn display_name(source: &str) -> String {
    let path = source.split(['?', '#']).next().unwrap_or(source);
    let last = path.rsplit('/').find(|s| !s.is_empty()).unwrap_or(path);
    let decoded = percent_decode_str(last).decode_utf8_lossy().into_owned();
    if decoded.is_empty() { source.to_string() } else { decoded }
}

/// Normalise raw probe output: stills get a hold window, timed media must
/// have a positive finite duration.
pub(crate) fn settle_metadata(kind: MediaKind, mut meta: ProbedMetadata) -> Result<ProbedMetadata, String> {
    if kind == MediaKind::Image {
        if meta.duration <= 0.0 || !meta.duration.is_finite() { meta.duration = IMAGE_HOLD_SECONDS; }
        return Ok(meta);
    }
    if !meta.duration.is_finite() || meta.duration <= 0.0 {
        return Err(format!("zero or invalid duration ({})", meta.duration));
    }
    if kind == MediaKind::Video && (meta.width == Some(0) || meta.height == Some(0)) {
        return Err("video stream reports zero dimensions".into());
    }
    Ok(meta)
}
