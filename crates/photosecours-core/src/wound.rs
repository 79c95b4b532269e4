//! Wound describer.
//!
//! Classifies the wound kind and its apparent gravity against fixed prompts
//! and composes a short French description. The description carries the
//! keywords the first-aid rule engine keys on.

use crate::clip::{ClipModel, PromptSet};
use crate::pipeline::PipelineError;
use image::RgbImage;
use photosecours_advice::Classification;
use serde::Serialize;

/// Appended to every generated description.
pub const DESCRIPTION_WARNING: &str =
    "Attention: Cette description est générée automatiquement et ne remplace pas l'avis d'un professionnel de santé.";

/// Label of the kind prompt that means "nothing to treat".
const NO_WOUND: &str = "aucune blessure visible";

const WOUND_KINDS: [(&str, &str); 7] = [
    ("coupure", "a photo of a cut or laceration on the skin"),
    ("brûlure", "a photo of a burn on the skin"),
    ("fracture", "a photo of a broken bone or a deformed swollen limb"),
    ("écorchure", "a photo of a scrape or abrasion on the skin"),
    ("ecchymose", "a photo of a bruise on the skin"),
    ("piqûre d'insecte", "a photo of an insect bite on the skin"),
    (NO_WOUND, "a photo of healthy skin with no wound"),
];

const WOUND_GRAVITY: [(&str, &str); 3] = [
    ("superficielle", "a minor superficial wound"),
    ("modérée avec saignement", "a moderate wound with some bleeding"),
    ("profonde avec saignement abondant", "a deep severe wound with heavy bleeding"),
];

#[derive(Debug, Clone, Serialize)]
pub struct WoundDescription {
    pub kind: Classification,
    pub gravity: Classification,
    /// Human-readable description, warning included.
    pub text: String,
}

pub struct WoundAnalyzer {
    kinds: PromptSet,
    gravity: PromptSet,
}

impl WoundAnalyzer {
    /// Embed the wound prompts once.
    pub fn new(clip: &mut ClipModel) -> Result<Self, PipelineError> {
        let kinds = PromptSet::build(clip, WOUND_KINDS)?;
        let gravity = PromptSet::build(clip, WOUND_GRAVITY)?;
        Ok(Self { kinds, gravity })
    }

    /// Describe the wound in an already preprocessed image.
    pub fn describe(&self, image: &RgbImage, clip: &mut ClipModel) -> Result<WoundDescription, PipelineError> {
        let embedding = clip.embed_image(image)?;
        let kind = self.kinds.classify(&embedding);
        let gravity = self.gravity.classify(&embedding);

        tracing::info!(
            kind = %kind.category,
            kind_confidence = kind.confidence,
            gravity = %gravity.category,
            gravity_confidence = gravity.confidence,
            "wound classified"
        );

        let text = compose_description(&kind, &gravity);
        Ok(WoundDescription { kind, gravity, text })
    }
}

fn compose_description(kind: &Classification, gravity: &Classification) -> String {
    let sentence = if kind.category == NO_WOUND {
        "Aucune blessure nettement visible sur l'image.".to_string()
    } else {
        format!(
            "Blessure de type {} (confiance {:.0}%), d'apparence {} (confiance {:.0}%).",
            kind.category,
            kind.confidence * 100.0,
            gravity.category,
            gravity.confidence * 100.0,
        )
    };
    format!("{sentence}\n\n{DESCRIPTION_WARNING}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use photosecours_advice::{first_aid, Severity};
    use std::collections::BTreeMap;

    fn classification(category: &str, confidence: f32) -> Classification {
        Classification { category: category.to_string(), confidence, all_scores: BTreeMap::new() }
    }

    #[test]
    fn test_description_includes_labels_and_warning() {
        let text = compose_description(&classification("coupure", 0.82), &classification("superficielle", 0.6));
        assert!(text.starts_with("Blessure de type coupure (confiance 82%)"));
        assert!(text.contains("d'apparence superficielle"));
        assert!(text.ends_with(DESCRIPTION_WARNING));
    }

    #[test]
    fn test_no_wound_description() {
        let text = compose_description(&classification(NO_WOUND, 0.9), &classification("superficielle", 0.9));
        assert!(text.starts_with("Aucune blessure"));
    }

    #[test]
    fn test_descriptions_drive_first_aid_severity() {
        let deep = compose_description(
            &classification("coupure", 0.7),
            &classification("profonde avec saignement abondant", 0.7),
        );
        assert_eq!(first_aid::recommend(&deep).severity, Severity::High);

        let burn = compose_description(&classification("brûlure", 0.7), &classification("superficielle", 0.7));
        let recs = first_aid::recommend(&burn);
        assert_eq!(recs.severity, Severity::Medium);
        assert!(recs.steps[0].starts_with("Refroidissez"));

        let bruise = compose_description(&classification("ecchymose", 0.7), &classification("superficielle", 0.7));
        assert_eq!(first_aid::recommend(&bruise).severity, Severity::Low);
    }

    #[test]
    fn test_warning_does_not_trigger_keywords() {
        assert_eq!(first_aid::assess_severity(DESCRIPTION_WARNING), Severity::Low);
    }
}
