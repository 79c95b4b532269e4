use photosecours_core::{AnalysisSettings, ModelPaths, ValidationSettings};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Listen address (default: 0.0.0.0:8000).
    pub bind_addr: String,
    /// Directory containing ONNX model files and the CLIP tokenizer.
    pub model_dir: PathBuf,
    /// Where uploaded and processed images are written.
    pub upload_dir: PathBuf,
    /// Largest accepted image, in bytes.
    pub max_upload_bytes: usize,
    /// Keep uploads after a successful analysis.
    pub keep_uploads: bool,
    /// Minimum face area as a fraction of the image.
    pub min_face_ratio: f32,
    /// Minimum aggregated "human face" probability.
    pub human_face_threshold: f32,
    /// Minimum "present" probability for a skin problem.
    pub problem_threshold: f32,
    /// Upper bound on a single inference request.
    pub inference_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `PHOTOSECOURS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("PHOTOSECOURS_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| photosecours_core::default_model_dir());

        let defaults = AnalysisSettings::default();

        Self {
            bind_addr: std::env::var("PHOTOSECOURS_BIND").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            model_dir,
            upload_dir: std::env::var("PHOTOSECOURS_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            max_upload_bytes: env_usize("PHOTOSECOURS_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            keep_uploads: env_bool("PHOTOSECOURS_KEEP_UPLOADS", true),
            min_face_ratio: env_f32("PHOTOSECOURS_MIN_FACE_RATIO", defaults.validation.min_face_area_ratio),
            human_face_threshold: env_f32(
                "PHOTOSECOURS_HUMAN_FACE_THRESHOLD",
                defaults.validation.human_face_threshold,
            ),
            problem_threshold: env_f32("PHOTOSECOURS_PROBLEM_THRESHOLD", defaults.problem_threshold),
            inference_timeout_secs: env_u64("PHOTOSECOURS_INFERENCE_TIMEOUT_SECS", 120),
        }
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::from_dir(&self.model_dir)
    }

    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            validation: ValidationSettings {
                min_face_area_ratio: self.min_face_ratio,
                human_face_threshold: self.human_face_threshold,
                ..ValidationSettings::default()
            },
            problem_threshold: self.problem_threshold,
        }
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}
