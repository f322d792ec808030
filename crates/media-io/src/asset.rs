use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub Uuid);

impl AssetId {
    pub fn new() -> Self { Self(Uuid::new_v4()) }
}

impl Default for AssetId {
    fn default() -> Self { Self::new() }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
}

impl MediaKind {
    pub fn has_picture(self) -> bool { matches!(self, MediaKind::Video | MediaKind::Image) }

    pub fn has_sound(self) -> bool { matches!(self, MediaKind::Video | MediaKind::Audio) }
}

/// Metadata reported by the probe. Immutable once attached to an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbedMetadata {
    /// Seconds of usable source material.
    pub duration: f64,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub frame_rate: Option<f64>,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    pub byte_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum AssetStatus {
    /// Registered, probe result not in yet.
    Pending,
    Ready,
    /// Probe failed; clips built on this asset need remediation.
    Invalid { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: AssetId,
    pub source: String,
    pub name: String,
    pub kind: MediaKind,
    pub status: AssetStatus,
    #[serde(default)]
    pub metadata: Option<ProbedMetadata>,
}

impl MediaAsset {
    pub fn is_ready(&self) -> bool { matches!(self.status, AssetStatus::Ready) && self.metadata.is_some() }

    pub fn is_invalid(&self) -> bool { matches!(self.status, AssetStatus::Invalid { .. }) }

    /// Usable source duration, if probed.
    pub fn duration(&self) -> Option<f64> { self.metadata.as_ref().map(|m| m.duration) }
}
