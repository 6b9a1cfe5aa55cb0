//! Persisted camera selection.
//!
//! A small JSON side file remembers which capture device `setup-camera`
//! picked, so later sessions open the same one.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

const DEFAULT_DEVICE: &str = "/dev/video0";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings encode/decode failed: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Selected capture device, persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub device: String,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
        }
    }
}

impl CameraSettings {
    /// Load the side file, falling back to the default device when it
    /// does not exist yet. A corrupt file is an error, not a fallback.
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::info!(device = %self.device, path = %path.display(), "camera selection saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CameraSettings::load_or_default(&dir.path().join("camera.json")).unwrap();
        assert_eq!(settings.device, DEFAULT_DEVICE);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/camera.json");

        let settings = CameraSettings {
            device: "/dev/video3".to_string(),
        };
        settings.save(&path).unwrap();

        let loaded = CameraSettings::load_or_default(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(CameraSettings::load_or_default(&path).is_err());
    }
}
