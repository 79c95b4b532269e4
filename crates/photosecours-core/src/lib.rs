//! photosecours-core — Image analysis engine.
//!
//! Uses SCRFD for face detection and CLIP for zero-shot prompt
//! classification, both running via ONNX Runtime for CPU inference.

pub mod clip;
pub mod detector;
pub mod pipeline;
pub mod preprocess;
pub mod skincare;
pub mod types;
pub mod validation;
pub mod wound;

use std::path::PathBuf;

pub use clip::{ClipModel, PromptSet};
pub use detector::FaceDetector;
pub use pipeline::{AnalysisSettings, ModelPaths, Pipeline, PipelineError, SkinReport, WoundReport};
pub use types::{BoundingBox, Embedding};
pub use validation::{FaceValidation, ValidationSettings};
pub use wound::WoundDescription;

/// `$XDG_DATA_HOME/photosecours/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("photosecours/models")
}
