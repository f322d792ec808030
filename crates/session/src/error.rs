use media_io::AssetError;
use project::SchemaError;
use renderer::CompileError;
use thiserror::Error;
use timeline::{ClipId, TimelineError};

use crate::session::SessionState;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,

    #[error("no project is open")]
    NoProject,

    #[error("cannot {action} while {state:?}")]
    InvalidState { action: &'static str, state: SessionState },

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("failed to load project: {0}")]
    Schema(#[from] SchemaError),

    #[error("failed to serialize project: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Store failures arrive as `anyhow` chains from the persistence layer.
    #[error("project store: {0:#}")]
    Store(anyhow::Error),

    #[error("project {0} not found in store")]
    NotFound(String),

    #[error("clip not found: {0}")]
    ClipNotFound(ClipId),

    #[error("nothing selected")]
    NothingSelected,

    #[error("invalid range [{start}, {end})")]
    InvalidRange { start: f64, end: f64 },

    #[error("invalid playback rate {0}")]
    InvalidRate(f64),

    #[error("bad config {path}: {reason}")]
    Config { path: String, reason: String },
}
