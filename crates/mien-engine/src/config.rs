use std::path::{Path, PathBuf};

/// Face crops collected per enrollment session.
pub const DEFAULT_SAMPLE_QUOTA: u32 = 60;
/// Recognition distance above which a prediction is rejected.
/// The boundary itself still accepts: only `distance > threshold` fails.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 100.0;

/// Everything the orchestrators need injected: storage locations, the
/// sample quota, and the confidence gate. Built once and passed by
/// reference; no process-wide state.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// SQLite identity store file.
    pub db_path: PathBuf,
    /// Root of per-identity face sample directories.
    pub image_dir: PathBuf,
    /// Directory holding one recognition artifact per numeric identity.
    pub model_dir: PathBuf,
    /// Camera selection side file.
    pub camera_settings_path: PathBuf,
    /// SCRFD detector ONNX file.
    pub detector_model_path: PathBuf,
    pub sample_quota: u32,
    pub distance_threshold: f32,
}

impl PipelineConfig {
    /// Load configuration from `MIEN_*` environment variables with
    /// XDG-rooted defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("mien");

        let mut cfg = Self::rooted_at(&data_dir);

        if let Ok(v) = std::env::var("MIEN_DB_PATH") {
            cfg.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("MIEN_IMAGE_DIR") {
            cfg.image_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("MIEN_MODEL_DIR") {
            cfg.model_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("MIEN_CAMERA_CONFIG") {
            cfg.camera_settings_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("MIEN_DETECTOR_MODEL") {
            cfg.detector_model_path = PathBuf::from(v);
        }
        cfg.sample_quota = env_u32("MIEN_SAMPLE_QUOTA", DEFAULT_SAMPLE_QUOTA);
        cfg.distance_threshold = env_f32("MIEN_DISTANCE_THRESHOLD", DEFAULT_DISTANCE_THRESHOLD);
        cfg
    }

    /// Default layout under a single data root.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            db_path: root.join("store.db"),
            image_dir: root.join("images"),
            model_dir: root.join("recognizers"),
            camera_settings_path: root.join("camera.json"),
            detector_model_path: root.join("onnx/det_10g.onnx"),
            sample_quota: DEFAULT_SAMPLE_QUOTA,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }

    /// Face sample directory for one stable identity.
    pub fn user_image_dir(&self, stable_id: &str) -> PathBuf {
        self.image_dir.join(stable_id)
    }

    /// Recognition artifact path for one numeric identity.
    pub fn model_artifact_path(&self, label: i64) -> PathBuf {
        self.model_dir.join(format!("user{label}.faceModel.json"))
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
