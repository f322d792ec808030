use std::collections::HashMap;

use media_io::{AssetId, MediaKind};
use serde::{Deserialize, Serialize};

use crate::effects::{Filter, Transition};
use crate::ids::{ClipId, ProjectId, TrackId};

/// Tolerance used for time comparisons (overlap, bounds).
pub const TIME_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    Webm,
    Mov,
    Mkv,
}

impl Container {
    pub fn mime(self) -> &'static str {
        match self {
            Container::Mp4 => "video/mp4",
            Container::Webm => "video/webm",
            Container::Mov => "video/quicktime",
            Container::Mkv => "video/x-matroska",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Webm => "webm",
            Container::Mov => "mov",
            Container::Mkv => "mkv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    H265,
    Vp9,
    Av1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Opus,
    Mp3,
}

/// Export target for the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub sample_rate: u32,
    pub container: Container,
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    /// Constant rate factor, lower is better quality.
    pub crf: u8,
    pub audio_bitrate_kbps: u32,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_rate: 30.0,
            sample_rate: 48_000,
            container: Container::Mp4,
            video_codec: VideoCodec::H264,
            audio_codec: AudioCodec::Aac,
            crf: 18,
            audio_bitrate_kbps: 192,
        }
    }
}

impl OutputSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 { return Err("resolution must be non-zero".into()); }
        if self.width % 2 != 0 || self.height % 2 != 0 { return Err("resolution must be even".into()); }
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) { return Err(format!("invalid frame rate {}", self.frame_rate)); }
        if self.sample_rate == 0 { return Err("sample rate must be non-zero".into()); }
        if self.crf > 51 { return Err(format!("crf {} out of range 0..=51", self.crf)); }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    /// Video tracks take picture sources; audio tracks take anything with sound.
    pub fn accepts(self, media: MediaKind) -> bool {
        match self {
            TrackKind::Video => media.has_picture(),
            TrackKind::Audio => media.has_sound(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackFlags {
    pub muted: bool,
    pub locked: bool,
    pub hidden: bool,
}

/// One lane of the timeline. Its ordering index is its position in
/// [`Project::tracks`]; index 0 is the bottom of the video stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub kind: TrackKind,
    #[serde(default)]
    pub flags: TrackFlags,
    pub volume: f32,
    /// Sorted by `start`, never overlapping.
    pub clips: Vec<Clip>,
}

impl Track {
    pub fn new(kind: TrackKind, name: impl Into<String>) -> Self {
        Self { id: TrackId::new(), name: name.into(), kind, flags: TrackFlags::default(), volume: 1.0, clips: Vec::new() }
    }

    pub fn clip_index(&self, id: ClipId) -> Option<usize> { self.clips.iter().position(|c| c.id == id) }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> { self.clips.iter().find(|c| c.id == id) }

    pub fn end(&self) -> f64 { self.clips.last().map(|c| c.end()).unwrap_or(0.0) }
}

/// A placed, trimmed reference to a media asset.
///
/// `duration` is always derived from the trim window and speed, so it can
/// never drift from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: ClipId,
    pub track_id: TrackId,
    pub asset_id: AssetId,
    pub start: f64,
    pub trim_in: f64,
    pub trim_out: f64,
    pub speed: f64,
    pub volume: f32,
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Transition into the clip immediately following this one.
    #[serde(default)]
    pub transition: Option<Transition>,
}

impl Clip {
    pub fn new(track_id: TrackId, asset_id: AssetId, start: f64, trim_in: f64, trim_out: f64) -> Self {
        Self { id: ClipId::new(), track_id, asset_id, start, trim_in, trim_out, speed: 1.0, volume: 1.0, filters: Vec::new(), transition: None }
    }

    pub fn duration(&self) -> f64 { (self.trim_out - self.trim_in) / self.speed }

    pub fn end(&self) -> f64 { self.start + self.duration() }

    pub fn contains(&self, t: f64) -> bool { t >= self.start && t < self.end() }

    /// Map a timeline time onto the asset's own timebase.
    pub fn source_time(&self, t: f64) -> f64 { self.trim_in + (t - self.start) * self.speed }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub settings: OutputSettings,
    pub tracks: Vec<Track>,
}

impl Project {
    pub fn new(name: impl Into<String>, settings: OutputSettings) -> Self {
        Self { id: ProjectId::new(), name: name.into(), settings, tracks: Vec::new() }
    }

    /// End of the last clip over all tracks.
    pub fn duration(&self) -> f64 { self.tracks.iter().map(Track::end).fold(0.0, f64::max) }

    pub fn is_empty(&self) -> bool { self.tracks.iter().all(|t| t.clips.is_empty()) }

    pub fn track(&self, id: TrackId) -> Option<&Track> { self.tracks.iter().find(|t| t.id == id) }

    pub fn track_index(&self, id: TrackId) -> Option<usize> { self.tracks.iter().position(|t| t.id == id) }

    /// (track index, clip index) of a clip.
    pub fn locate_clip(&self, id: ClipId) -> Option<(usize, usize)> {
        self.tracks.iter().enumerate().find_map(|(ti, t)| t.clip_index(id).map(|ci| (ti, ci)))
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> { self.locate_clip(id).map(|(ti, ci)| &self.tracks[ti].clips[ci]) }

    pub fn clips(&self) -> impl Iterator<Item = &Clip> { self.tracks.iter().flat_map(|t| t.clips.iter()) }

    /// Clips covering `t`, bottom track first.
    pub fn clips_at_time(&self, t: f64) -> Vec<&Clip> { self.clips().filter(|c| c.contains(t)).collect() }

    /// Number of clips referencing each asset.
    pub fn asset_usage(&self) -> HashMap<AssetId, usize> {
        let mut usage = HashMap::new();
        for clip in self.clips() {
            *usage.entry(clip.asset_id).or_insert(0) += 1;
        }
        usage
    }
}
