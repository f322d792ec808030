//! Compiles a timeline into engine operation lists.
//!
//! [`compile`] is a pure function of the project, the asset registry and the
//! request, so previews can be recompiled freely while scrubbing.

mod compile;

use jobs::EngineOperation;
use media_io::AssetId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use timeline::ClipId;

pub use compile::compile;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self { Self { start, end } }

    pub fn duration(&self) -> f64 { self.end - self.start }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum RenderRequest {
    PreviewFrame { time: f64 },
    Thumbnail { time: f64, width: u32, height: u32 },
    Waveform { clip_id: ClipId, samples: u32 },
    /// Whole timeline when `range` is `None`.
    Export { range: Option<TimeRange> },
}

impl RenderRequest {
    pub fn name(&self) -> &'static str {
        match self {
            RenderRequest::PreviewFrame { .. } => "preview_frame",
            RenderRequest::Thumbnail { .. } => "thumbnail",
            RenderRequest::Waveform { .. } => "waveform",
            RenderRequest::Export { .. } => "export",
        }
    }
}

/// Ordered operation list plus what the final buffer will be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPlan {
    pub operations: Vec<EngineOperation>,
    /// Seconds of media the final buffer covers.
    pub duration: f64,
    pub mime: String,
}

impl RenderPlan {
    pub fn empty(mime: impl Into<String>) -> Self { Self { operations: Vec::new(), duration: 0.0, mime: mime.into() } }

    pub fn is_empty(&self) -> bool { self.operations.is_empty() }

    pub fn to_json(&self) -> serde_json::Result<String> { serde_json::to_string_pretty(self) }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("invalid time {0}")]
    InvalidTime(f64),

    #[error("invalid range [{start}, {end})")]
    InvalidRange { start: f64, end: f64 },

    #[error("invalid output size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("waveform needs at least one sample")]
    NoSamples,

    #[error("clip not found: {0}")]
    ClipNotFound(ClipId),

    #[error("asset {0} has no audio")]
    NoAudio(AssetId),

    #[error("{} clip(s) reference missing or invalid media", .0.len())]
    InvalidClips(Vec<ClipId>),

    #[error("every track in range is muted or hidden")]
    NothingToRender,
}
