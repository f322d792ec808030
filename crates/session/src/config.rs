use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use timeline::{OutputSettings, DEFAULT_HISTORY_DEPTH};

use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub history_depth: usize,
    pub preview_timeout_ms: u64,
    /// `None` lets exports run as long as they need.
    pub export_timeout_ms: Option<u64>,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub waveform_samples: u32,
    /// Seconds; zero disables snapping.
    pub snap_grid: f64,
    /// Settings given to projects created in this session.
    pub output: OutputSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_depth: DEFAULT_HISTORY_DEPTH,
            preview_timeout_ms: 5_000,
            export_timeout_ms: None,
            thumbnail_width: 160,
            thumbnail_height: 90,
            waveform_samples: 512,
            snap_grid: 0.1,
            output: OutputSettings::default(),
        }
    }
}

impl SessionConfig {
    /// Read a JSON config file. Missing keys fall back to the defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, SessionError> {
        let config_err = |reason: String| SessionError::Config { path: path.display().to_string(), reason };
        let text = fs::read_to_string(path).map_err(|e| config_err(e.to_string()))?;
        let config: Self = serde_json::from_str(&text).map_err(|e| config_err(e.to_string()))?;
        config.output.validate().map_err(config_err)?;
        Ok(config)
    }

    pub fn preview_timeout(&self) -> Duration { Duration::from_millis(self.preview_timeout_ms) }

    pub fn export_timeout(&self) -> Option<Duration> { self.export_timeout_ms.map(Duration::from_millis) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "history_depth": 10, "export_timeout_ms": 60000 }}"#).unwrap();
        let config = SessionConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.history_depth, 10);
        assert_eq!(config.export_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.snap_grid, 0.1);
        assert_eq!(config.output, OutputSettings::default());
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SessionConfig::from_json_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, SessionError::Config { .. }));
    }
}
