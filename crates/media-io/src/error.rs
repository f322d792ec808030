use thiserror::Error;

use crate::asset::AssetId;

/// Failure reported by a [`Prober`](crate::Prober).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbeError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("probe failed: {0}")]
    ProbeFailed(String),
    #[error("probe timed out")]
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssetError {
    #[error("unsupported format for source {source_ref}")]
    UnsupportedFormat { source_ref: String },

    /// The asset stays registered (marked invalid) so clips can be flagged.
    #[error("probe failed for asset {asset_id}: {reason}")]
    ProbeFailed { asset_id: AssetId, reason: String },

    #[error("probe timed out for asset {asset_id}")]
    Timeout { asset_id: AssetId },

    #[error("unknown asset {0}")]
    NotFound(AssetId),

    #[error("asset {asset_id} is still referenced ({refs} references)")]
    InUse { asset_id: AssetId, refs: usize },

    #[error("asset {0} already probed")]
    AlreadyProbed(AssetId),
}
