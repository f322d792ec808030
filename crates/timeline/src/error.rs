use media_io::{AssetId, MediaKind};
use thiserror::Error;

use crate::ids::{ClipId, FilterId, TrackId};
use crate::types::TrackKind;

/// Rejected timeline mutation. The project is left untouched whenever one
/// of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimelineError {
    #[error("clip {clip} would overlap clip {other} on track {track}")]
    Overlap { track: TrackId, clip: ClipId, other: ClipId },

    #[error("track not found: {0}")]
    TrackNotFound(TrackId),

    #[error("clip not found: {0}")]
    ClipNotFound(ClipId),

    #[error("filter {filter} not found on clip {clip}")]
    FilterNotFound { clip: ClipId, filter: FilterId },

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("track {0} is locked")]
    TrackLocked(TrackId),

    #[error("asset {0} is missing or not ready")]
    AssetUnavailable(AssetId),

    #[error("{asset:?} media cannot be placed on a {track:?} track")]
    KindMismatch { track: TrackKind, asset: MediaKind },

    #[error("invalid trim window [{trim_in}, {trim_out}) for clip {clip}: {reason}")]
    InvalidTrim { clip: ClipId, trim_in: f64, trim_out: f64, reason: String },

    #[error("invalid speed {0}, must be finite and > 0")]
    InvalidSpeed(f64),

    #[error("invalid volume {0}, must be finite and >= 0")]
    InvalidVolume(f32),

    #[error("invalid start time {0}")]
    InvalidStart(f64),

    #[error("split point {at} is not strictly inside clip {clip}")]
    SplitOutOfRange { clip: ClipId, at: f64 },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("{filter} filter does not apply to {track:?} tracks")]
    FilterNotApplicable { filter: &'static str, track: TrackKind },

    #[error("transition of {duration}s exceeds the shorter adjacent clip ({limit}s)")]
    TransitionTooLong { duration: f64, limit: f64 },

    #[error("transition from clip {from} must target the next clip on the track, not {to}")]
    TransitionTarget { from: ClipId, to: ClipId },

    #[error("clip {0} has no transition")]
    TransitionNotFound(ClipId),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("invalid ordering: {0}")]
    InvalidOrder(String),

    #[error("invalid output settings: {0}")]
    InvalidSettings(String),
}
