use thiserror::Error;
use timeline::TimelineError;

use crate::schema::SchemaVersion;

/// Why a saved document could not be loaded. Never affects an open session.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid document: {reason}")]
    InvalidDocument { reason: String },

    #[error("cannot parse schema version {0:?}")]
    BadVersion(String),

    #[error("document schema {found} is newer than supported {supported}")]
    NewerMajor { found: SchemaVersion, supported: SchemaVersion },

    #[error("migration from schema {from} failed: {reason}")]
    MigrationFailed { from: SchemaVersion, reason: String },

    #[error("document violates timeline invariants: {0}")]
    Invariant(#[from] TimelineError),
}

pub type SchemaResult<T> = Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_major_message_names_both_versions() {
        let err = SchemaError::NewerMajor { found: SchemaVersion::new(3, 1), supported: SchemaVersion::CURRENT };
        let text = err.to_string();
        assert!(text.contains("3.1"));
        assert!(text.contains(&SchemaVersion::CURRENT.to_string()));
    }
}
