//! Full reset: remove every persisted location the pipeline owns.

use crate::config::PipelineConfig;
use crate::SessionError;
use std::path::Path;

/// Delete the identity store, all face samples, all recognition
/// artifacts, and the camera selection. Absent locations are skipped.
pub fn reset(cfg: &PipelineConfig) -> Result<(), SessionError> {
    remove_file_if_present(&cfg.db_path)?;
    remove_file_if_present(&cfg.camera_settings_path)?;
    remove_dir_if_present(&cfg.image_dir)?;
    remove_dir_if_present(&cfg.model_dir)?;
    tracing::info!("all persisted state reset");
    Ok(())
}

fn remove_file_if_present(path: &Path) -> Result<(), SessionError> {
    if path.is_file() {
        std::fs::remove_file(path)?;
        tracing::info!(path = %path.display(), "deleted file");
    }
    Ok(())
}

fn remove_dir_if_present(path: &Path) -> Result<(), SessionError> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)?;
        tracing::info!(path = %path.display(), "deleted directory");
    }
    Ok(())
}
