//! Skin analyzer: zero-shot skin type, condition and problem detection.

use crate::clip::{ClipModel, PromptSet};
use crate::pipeline::PipelineError;
use image::RgbImage;
use photosecours_advice::skincare::CONFIDENCE_NOTE;
use photosecours_advice::{DetectedProblem, SkinAnalysis, SkinCondition, SkinProblem, SkinType};

/// Problems are reported when their "present" probability exceeds this.
pub const DEFAULT_PROBLEM_THRESHOLD: f32 = 0.3;

/// Binary "with / without" prompt pair for one problem.
struct ProblemPrompts {
    label: &'static str,
    prompts: PromptSet,
}

pub struct SkinAnalyzer {
    skin_types: PromptSet,
    conditions: PromptSet,
    problems: Vec<ProblemPrompts>,
    problem_threshold: f32,
}

impl SkinAnalyzer {
    /// Embed every skin prompt once.
    pub fn new(clip: &mut ClipModel, problem_threshold: f32) -> Result<Self, PipelineError> {
        let skin_types = PromptSet::build(clip, SkinType::ALL.iter().map(|t| (t.label(), t.prompt())))?;
        let conditions = PromptSet::build(clip, SkinCondition::ALL.iter().map(|c| (c.label(), c.prompt())))?;

        let mut problems = Vec::with_capacity(SkinProblem::ALL.len());
        for problem in SkinProblem::ALL {
            let pair = [
                ("present", format!("a face with {}", problem.prompt())),
                ("absent", format!("a face without {}", problem.prompt())),
            ];
            problems.push(ProblemPrompts {
                label: problem.label(),
                prompts: PromptSet::build(clip, pair)?,
            });
        }

        tracing::info!(
            skin_types = skin_types.labels().len(),
            conditions = conditions.labels().len(),
            problems = problems.len(),
            "skin prompt sets embedded"
        );

        Ok(Self { skin_types, conditions, problems, problem_threshold })
    }

    /// Analyse a face already prepared with [`crate::preprocess::prepare_skin`].
    pub fn analyze(&self, prepared: &RgbImage, clip: &mut ClipModel) -> Result<SkinAnalysis, PipelineError> {
        let embedding = clip.embed_image(prepared)?;

        let skin_type = self.skin_types.classify(&embedding);
        tracing::info!(category = %skin_type.category, confidence = skin_type.confidence, "skin type");

        let skin_condition = self.conditions.classify(&embedding);
        tracing::info!(category = %skin_condition.category, confidence = skin_condition.confidence, "skin condition");

        let scored = self
            .problems
            .iter()
            .map(|problem| (problem.label, problem.prompts.probabilities(&embedding)[0]));
        let problems_detected = select_problems(scored, self.problem_threshold);
        tracing::info!(count = problems_detected.len(), "skin problems detected");

        Ok(SkinAnalysis {
            skin_type,
            problems_detected,
            skin_condition,
            confidence_note: CONFIDENCE_NOTE.to_string(),
        })
    }
}

/// Keep problems above `threshold`, most confident first.
fn select_problems<'a>(
    scored: impl IntoIterator<Item = (&'a str, f32)>,
    threshold: f32,
) -> Vec<DetectedProblem> {
    let mut detected: Vec<DetectedProblem> = scored
        .into_iter()
        .filter(|(_, p)| *p > threshold)
        .map(|(label, p)| DetectedProblem { condition: label.to_string(), confidence: p })
        .collect();
    detected.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    detected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_problems_filters_and_sorts() {
        let scored = [("acné", 0.45), ("rides", 0.2), ("rougeurs", 0.8), ("cernes", 0.3)];
        let detected = select_problems(scored, 0.3);
        let labels: Vec<&str> = detected.iter().map(|d| d.condition.as_str()).collect();
        assert_eq!(labels, vec!["rougeurs", "acné"]);
    }

    #[test]
    fn test_select_problems_none() {
        assert!(select_problems([("acné", 0.1)], 0.3).is_empty());
    }
}
