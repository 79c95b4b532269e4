//! Load-once analysis pipeline.
//!
//! Owns the ONNX sessions and every embedded prompt set. Inference needs
//! `&mut` access to the sessions, so a `Pipeline` is meant to live on a
//! single thread.

use crate::clip::{ClipError, ClipModel};
use crate::detector::{DetectorError, FaceDetector};
use crate::preprocess;
use crate::skincare::{SkinAnalyzer, DEFAULT_PROBLEM_THRESHOLD};
use crate::validation::{FaceValidation, FaceValidator, ValidationSettings};
use crate::wound::{WoundAnalyzer, WoundDescription};
use image::{DynamicImage, RgbImage};
use photosecours_advice::{first_aid, skincare, FirstAidRecommendations, SkinAnalysis, SkincareRecommendations};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("CLIP error: {0}")]
    Clip(#[from] ClipError),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Locations of every model file, relative to one model directory.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub face_detector: PathBuf,
    pub clip_vision: PathBuf,
    pub clip_text: PathBuf,
    pub clip_tokenizer: PathBuf,
}

impl ModelPaths {
    pub fn from_dir(dir: &Path) -> Self {
        Self {
            face_detector: dir.join("det_10g.onnx"),
            clip_vision: dir.join("clip_vision.onnx"),
            clip_text: dir.join("clip_text.onnx"),
            clip_tokenizer: dir.join("clip_tokenizer.json"),
        }
    }
}

/// Tunable thresholds.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisSettings {
    pub validation: ValidationSettings,
    pub problem_threshold: f32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            validation: ValidationSettings::default(),
            problem_threshold: DEFAULT_PROBLEM_THRESHOLD,
        }
    }
}

/// Skin analysis result. `analysis` and `recommendations` are only present
/// when the face gate accepted the image.
#[derive(Debug, Clone, Serialize)]
pub struct SkinReport {
    pub validation: FaceValidation,
    pub analysis: Option<SkinAnalysis>,
    pub recommendations: Option<SkincareRecommendations>,
    /// Cropped, resized and contrast-enhanced face the analysis ran on.
    #[serde(skip)]
    pub prepared: Option<RgbImage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WoundReport {
    pub description: WoundDescription,
    pub recommendations: FirstAidRecommendations,
    /// Contrast-enhanced image with faces blurred.
    #[serde(skip)]
    pub processed: RgbImage,
}

pub struct Pipeline {
    detector: FaceDetector,
    clip: ClipModel,
    validator: FaceValidator,
    skin: SkinAnalyzer,
    wound: WoundAnalyzer,
}

impl Pipeline {
    /// Load all models and embed every prompt. Fails fast on any missing file.
    pub fn load(paths: &ModelPaths, settings: AnalysisSettings) -> Result<Self, PipelineError> {
        let detector = FaceDetector::load(&paths.face_detector)?;
        let mut clip = ClipModel::load(paths)?;

        let validator = FaceValidator::new(&mut clip, settings.validation)?;
        let skin = SkinAnalyzer::new(&mut clip, settings.problem_threshold)?;
        let wound = WoundAnalyzer::new(&mut clip)?;

        tracing::info!("analysis pipeline ready");
        Ok(Self { detector, clip, validator, skin, wound })
    }

    /// Run only the face gate.
    pub fn validate_face(&mut self, image: &DynamicImage) -> Result<FaceValidation, PipelineError> {
        let rgb = image.to_rgb8();
        self.validator.validate(&rgb, &mut self.detector, &mut self.clip)
    }

    /// Face gate, then skin analysis and recommendations when accepted.
    pub fn analyze_skin(&mut self, image: &DynamicImage) -> Result<SkinReport, PipelineError> {
        let rgb = image.to_rgb8();
        let validation = self.validator.validate(&rgb, &mut self.detector, &mut self.clip)?;
        if !validation.is_valid {
            return Ok(SkinReport { validation, analysis: None, recommendations: None, prepared: None });
        }

        let prepared = preprocess::prepare_skin(&rgb, validation.face());
        let analysis = self.skin.analyze(&prepared, &mut self.clip)?;
        let recommendations = skincare::recommend(&analysis);

        Ok(SkinReport {
            validation,
            analysis: Some(analysis),
            recommendations: Some(recommendations),
            prepared: Some(prepared),
        })
    }

    /// Enhance, anonymise, describe and recommend first aid for a wound photo.
    pub fn analyze_wound(&mut self, image: &DynamicImage) -> Result<WoundReport, PipelineError> {
        let mut processed = preprocess::limit_size(image.to_rgb8(), preprocess::WOUND_MAX_SIDE);
        preprocess::enhance_contrast(&mut processed, preprocess::WOUND_CLAHE_TILES, preprocess::WOUND_CLAHE_CLIP);

        let faces = self.detector.detect(&processed)?;
        if !faces.is_empty() {
            tracing::info!(count = faces.len(), "blurring faces in wound photo");
            preprocess::anonymize_faces(&mut processed, &faces, preprocess::FACE_BLUR_SIGMA);
        }

        let description = self.wound.describe(&processed, &mut self.clip)?;
        let recommendations = first_aid::recommend(&description.text);

        Ok(WoundReport { description, recommendations, processed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_paths_from_dir() {
        let paths = ModelPaths::from_dir(Path::new("/opt/models"));
        assert_eq!(paths.face_detector, Path::new("/opt/models/det_10g.onnx"));
        assert_eq!(paths.clip_tokenizer, Path::new("/opt/models/clip_tokenizer.json"));
    }

    #[test]
    fn test_load_fails_fast_on_missing_models() {
        let dir = std::env::temp_dir().join("photosecours-no-models");
        let result = Pipeline::load(&ModelPaths::from_dir(&dir), AnalysisSettings::default());
        assert!(matches!(
            result,
            Err(PipelineError::Detector(DetectorError::ModelNotFound(_)))
        ));
    }

    #[test]
    fn test_default_settings() {
        let settings = AnalysisSettings::default();
        assert_eq!(settings.validation.min_image_side, 50);
        assert!((settings.problem_threshold - 0.3).abs() < 1e-6);
    }
}
