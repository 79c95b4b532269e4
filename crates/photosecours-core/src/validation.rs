//! Face gate for skin analysis.
//!
//! An image passes when the detector finds a face covering enough of the
//! frame AND the vision-language model agrees the picture shows a human
//! face rather than an object, animal or document.

use crate::clip::{ClipModel, PromptSet};
use crate::detector::FaceDetector;
use crate::pipeline::PipelineError;
use crate::types::BoundingBox;
use image::RgbImage;
use serde::Serialize;
use std::collections::BTreeMap;

/// Semantic check prompts. The first [`HUMAN_PROMPTS`] describe a human face.
const FACE_CHECK_PROMPTS: [&str; 8] = [
    "a human face",
    "a person's face",
    "human facial features",
    "not a human face",
    "an object",
    "a vehicle",
    "an animal",
    "text or document",
];
const HUMAN_PROMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationSettings {
    pub min_image_side: u32,
    pub min_face_area_ratio: f32,
    pub human_face_threshold: f32,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            min_image_side: 50,
            min_face_area_ratio: 0.05,
            human_face_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub area: f32,
    pub area_ratio: f32,
    pub size_valid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaceDetectionSummary {
    pub faces_detected: usize,
    pub faces_info: Vec<DetectedFace>,
    pub has_valid_face: bool,
}

impl FaceDetectionSummary {
    pub fn from_faces(faces: &[BoundingBox], image_area: f32, min_area_ratio: f32) -> Self {
        let faces_info: Vec<DetectedFace> = faces
            .iter()
            .map(|bbox| {
                let area = bbox.area();
                let area_ratio = if image_area > 0.0 { area / image_area } else { 0.0 };
                DetectedFace {
                    bbox: *bbox,
                    area,
                    area_ratio,
                    size_valid: area_ratio >= min_area_ratio,
                }
            })
            .collect();

        Self {
            faces_detected: faces_info.len(),
            has_valid_face: faces_info.iter().any(|f| f.size_valid),
            faces_info,
        }
    }

    /// Highest-confidence face that is large enough.
    pub fn best_valid_face(&self) -> Option<&BoundingBox> {
        self.faces_info.iter().find(|f| f.size_valid).map(|f| &f.bbox)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HumanFaceCheck {
    pub is_human_face: bool,
    pub confidence: f32,
    pub threshold: f32,
    pub detailed_scores: BTreeMap<String, f32>,
}

impl HumanFaceCheck {
    /// Aggregate per-prompt probabilities (in [`FACE_CHECK_PROMPTS`] order).
    pub fn from_probabilities(probs: &[f32], threshold: f32) -> Self {
        let human: f32 = probs.iter().take(HUMAN_PROMPTS).sum();
        let total: f32 = probs.iter().sum();
        let confidence = if total > 0.0 { human / total } else { 0.0 };

        Self {
            is_human_face: confidence >= threshold,
            confidence,
            threshold,
            detailed_scores: FACE_CHECK_PROMPTS
                .iter()
                .zip(probs)
                .map(|(p, &s)| (p.to_string(), s))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ValidationPassed {
    pub face_detected: bool,
    pub human_confirmed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationDetails {
    pub image_size: (u32, u32),
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_required: Option<(u32, u32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_detection: Option<FaceDetectionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_check: Option<HumanFaceCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_passed: Option<ValidationPassed>,
}

/// Outcome of the face gate.
#[derive(Debug, Clone, Serialize)]
pub struct FaceValidation {
    pub is_valid: bool,
    pub reason: String,
    pub suggestion: String,
    pub details: ValidationDetails,
}

impl FaceValidation {
    /// Rejection for images below the minimum side length. No model runs.
    pub fn too_small(image_size: (u32, u32), min_side: u32) -> Self {
        Self {
            is_valid: false,
            reason: "Image trop petite".to_string(),
            suggestion: format!("Utilisez une image d'au moins {min_side}x{min_side} pixels"),
            details: ValidationDetails {
                image_size,
                min_required: Some((min_side, min_side)),
                face_detection: None,
                human_check: None,
                validation_passed: None,
            },
        }
    }

    /// Combine detector and semantic results into the final verdict.
    pub fn decide(image_size: (u32, u32), detection: FaceDetectionSummary, human: HumanFaceCheck) -> Self {
        let is_valid = detection.has_valid_face && human.is_human_face;

        let (reason, suggestion) = if !detection.has_valid_face {
            if detection.faces_detected == 0 {
                (
                    "Aucun visage détecté dans l'image",
                    "Prenez une photo claire de votre visage face à l'appareil photo",
                )
            } else {
                (
                    "Le visage détecté est trop petit dans l'image",
                    "Rapprochez-vous de l'appareil photo pour que votre visage soit plus visible",
                )
            }
        } else if !human.is_human_face {
            (
                "L'image ne semble pas contenir un visage humain",
                "Assurez-vous d'uploader une photo de votre visage, pas d'un objet ou d'un animal",
            )
        } else {
            (
                "Image validée pour l'analyse skincare",
                "Votre image est parfaite pour l'analyse !",
            )
        };

        let passed = ValidationPassed {
            face_detected: detection.has_valid_face,
            human_confirmed: human.is_human_face,
        };

        Self {
            is_valid,
            reason: reason.to_string(),
            suggestion: suggestion.to_string(),
            details: ValidationDetails {
                image_size,
                min_required: None,
                face_detection: Some(detection),
                human_check: Some(human),
                validation_passed: Some(passed),
            },
        }
    }

    /// Face to crop for skin analysis, when the gate found one.
    pub fn face(&self) -> Option<&BoundingBox> {
        self.details.face_detection.as_ref()?.best_valid_face()
    }
}

pub struct FaceValidator {
    settings: ValidationSettings,
    prompts: PromptSet,
}

impl FaceValidator {
    /// Embed the semantic check prompts once.
    pub fn new(clip: &mut ClipModel, settings: ValidationSettings) -> Result<Self, PipelineError> {
        let prompts = PromptSet::build(clip, FACE_CHECK_PROMPTS.iter().map(|p| (*p, *p)))?;
        Ok(Self { settings, prompts })
    }

    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    pub fn validate(
        &self,
        image: &RgbImage,
        detector: &mut FaceDetector,
        clip: &mut ClipModel,
    ) -> Result<FaceValidation, PipelineError> {
        let (w, h) = image.dimensions();
        tracing::info!(width = w, height = h, "validating image for skin analysis");

        if w < self.settings.min_image_side || h < self.settings.min_image_side {
            let outcome = FaceValidation::too_small((w, h), self.settings.min_image_side);
            tracing::warn!(reason = %outcome.reason, "image rejected");
            return Ok(outcome);
        }

        let faces = detector.detect(image)?;
        let detection =
            FaceDetectionSummary::from_faces(&faces, w as f32 * h as f32, self.settings.min_face_area_ratio);

        let embedding = clip.embed_image(image)?;
        let human = HumanFaceCheck::from_probabilities(
            &self.prompts.probabilities(&embedding),
            self.settings.human_face_threshold,
        );

        let outcome = FaceValidation::decide((w, h), detection, human);
        if outcome.is_valid {
            tracing::info!("image accepted: human face detected");
        } else {
            tracing::warn!(reason = %outcome.reason, "image rejected");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(w: f32, h: f32, confidence: f32) -> BoundingBox {
        BoundingBox { x: 0.0, y: 0.0, width: w, height: h, confidence }
    }

    fn human(confident: bool) -> HumanFaceCheck {
        let probs = if confident {
            [0.4, 0.3, 0.1, 0.05, 0.05, 0.04, 0.03, 0.03]
        } else {
            [0.05, 0.05, 0.05, 0.2, 0.3, 0.1, 0.2, 0.05]
        };
        HumanFaceCheck::from_probabilities(&probs, 0.6)
    }

    #[test]
    fn test_area_ratio_threshold() {
        // 100x100 image: 20x20 face = 4%, 30x30 = 9%
        let summary = FaceDetectionSummary::from_faces(&[face(20.0, 20.0, 0.9), face(30.0, 30.0, 0.8)], 10_000.0, 0.05);
        assert_eq!(summary.faces_detected, 2);
        assert!(!summary.faces_info[0].size_valid);
        assert!(summary.faces_info[1].size_valid);
        assert!(summary.has_valid_face);
        assert!((summary.best_valid_face().unwrap().confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_human_confidence_normalised() {
        let check = human(true);
        assert!((check.confidence - 0.8).abs() < 1e-5);
        assert!(check.is_human_face);
        assert_eq!(check.detailed_scores.len(), 8);
        assert!((check.detailed_scores["a human face"] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_human_check_zero_probabilities() {
        let check = HumanFaceCheck::from_probabilities(&[0.0; 8], 0.6);
        assert_eq!(check.confidence, 0.0);
        assert!(!check.is_human_face);
    }

    #[test]
    fn test_decide_no_face() {
        let detection = FaceDetectionSummary::from_faces(&[], 10_000.0, 0.05);
        let outcome = FaceValidation::decide((100, 100), detection, human(true));
        assert!(!outcome.is_valid);
        assert_eq!(outcome.reason, "Aucun visage détecté dans l'image");
    }

    #[test]
    fn test_decide_face_too_small() {
        let detection = FaceDetectionSummary::from_faces(&[face(10.0, 10.0, 0.9)], 10_000.0, 0.05);
        let outcome = FaceValidation::decide((100, 100), detection, human(true));
        assert!(!outcome.is_valid);
        assert_eq!(outcome.reason, "Le visage détecté est trop petit dans l'image");
        assert!(outcome.face().is_none());
    }

    #[test]
    fn test_decide_not_human() {
        let detection = FaceDetectionSummary::from_faces(&[face(50.0, 50.0, 0.9)], 10_000.0, 0.05);
        let outcome = FaceValidation::decide((100, 100), detection, human(false));
        assert!(!outcome.is_valid);
        assert_eq!(outcome.reason, "L'image ne semble pas contenir un visage humain");
        let passed = outcome.details.validation_passed.unwrap();
        assert!(passed.face_detected);
        assert!(!passed.human_confirmed);
    }

    #[test]
    fn test_decide_valid() {
        let detection = FaceDetectionSummary::from_faces(&[face(50.0, 50.0, 0.9)], 10_000.0, 0.05);
        let outcome = FaceValidation::decide((100, 100), detection, human(true));
        assert!(outcome.is_valid);
        assert_eq!(outcome.reason, "Image validée pour l'analyse skincare");
        assert!(outcome.face().is_some());
    }

    #[test]
    fn test_too_small_serialization() {
        let outcome = FaceValidation::too_small((40, 80), 50);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["is_valid"], false);
        assert_eq!(json["reason"], "Image trop petite");
        assert_eq!(json["details"]["min_required"], serde_json::json!([50, 50]));
        assert!(json["details"].get("face_detection").is_none());
    }
}
