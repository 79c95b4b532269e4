//! Skincare rule engine.
//!
//! Builds a routine from the detected skin type, layers targeted guidance for
//! each confidently detected problem, then adds lifestyle adjustments for the
//! overall skin condition.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::catalog::{self, SkincareCatalog};
use crate::skin::{SkinType, UNDETERMINED};
use crate::Severity;

/// Problems below this confidence are reported but get no targeted guidance.
const PROBLEM_RECOMMENDATION_CONFIDENCE: f32 = 0.4;

/// Note attached to every skin analysis.
pub const CONFIDENCE_NOTE: &str =
    "Analyse basée sur l'intelligence artificielle. Pour un diagnostic précis, consultez un dermatologue.";

/// Single-label classification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub confidence: f32,
    /// Probability of every candidate label.
    pub all_scores: BTreeMap<String, f32>,
}

impl Classification {
    pub fn undetermined() -> Self {
        Self {
            category: UNDETERMINED.to_string(),
            confidence: 0.0,
            all_scores: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedProblem {
    pub condition: String,
    pub confidence: f32,
}

/// Output of the skin analyzer and input of [`recommend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinAnalysis {
    pub skin_type: Classification,
    /// Sorted by descending confidence.
    pub problems_detected: Vec<DetectedProblem>,
    pub skin_condition: Classification,
    pub confidence_note: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkincareSeverity {
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkincareRecommendations {
    pub routine_steps: Vec<String>,
    pub products_recommended: Vec<String>,
    pub ingredients_to_look_for: Vec<String>,
    pub ingredients_to_avoid: Vec<String>,
    pub lifestyle_tips: Vec<String>,
    pub severity: SkincareSeverity,
    pub consult_dermatologist: bool,
    pub disclaimer: String,
}

/// Generate personalised recommendations for a skin analysis.
pub fn recommend(analysis: &SkinAnalysis) -> SkincareRecommendations {
    recommend_with(catalog::skincare(), analysis)
}

/// Same as [`recommend`], against an explicit catalog.
pub fn recommend_with(catalog: &SkincareCatalog, analysis: &SkinAnalysis) -> SkincareRecommendations {
    let mut recs = SkincareRecommendations {
        routine_steps: base_routine(catalog, &analysis.skin_type.category),
        products_recommended: Vec::new(),
        ingredients_to_look_for: Vec::new(),
        ingredients_to_avoid: Vec::new(),
        lifestyle_tips: Vec::new(),
        severity: SkincareSeverity::Normal,
        consult_dermatologist: false,
        disclaimer: catalog.disclaimer.clone(),
    };

    for problem in &analysis.problems_detected {
        if problem.confidence <= PROBLEM_RECOMMENDATION_CONFIDENCE {
            continue;
        }
        let Some(guidance) = catalog.problems.get(&problem.condition) else {
            tracing::debug!(problem = %problem.condition, "no targeted guidance for problem");
            continue;
        };

        recs.products_recommended.extend(guidance.products.iter().cloned());
        recs.ingredients_to_look_for.extend(guidance.ingredients.iter().cloned());
        recs.ingredients_to_avoid.extend(guidance.avoid.iter().cloned());
        recs.lifestyle_tips.extend(guidance.tips.iter().cloned());

        if guidance.severity == Severity::High {
            recs.consult_dermatologist = true;
            recs.severity = SkincareSeverity::High;
        }
    }

    if let Some(adjustments) = catalog.conditions.get(&analysis.skin_condition.category) {
        recs.lifestyle_tips.extend(adjustments.iter().cloned());
    }

    dedup_in_place(&mut recs.products_recommended);
    dedup_in_place(&mut recs.ingredients_to_look_for);
    dedup_in_place(&mut recs.ingredients_to_avoid);
    dedup_in_place(&mut recs.lifestyle_tips);

    tracing::debug!(
        skin_type = %analysis.skin_type.category,
        products = recs.products_recommended.len(),
        tips = recs.lifestyle_tips.len(),
        "skincare recommendations generated"
    );

    recs
}

/// Routine for a skin type label; unknown labels get the normal-skin routine.
fn base_routine(catalog: &SkincareCatalog, skin_type: &str) -> Vec<String> {
    let routines = &catalog.routines;
    routines
        .get(skin_type)
        .or_else(|| routines.get(SkinType::Normal.label()))
        .cloned()
        .unwrap_or_default()
}

/// Remove duplicates, keeping the first occurrence of each entry.
fn dedup_in_place(items: &mut Vec<String>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification(category: &str, confidence: f32) -> Classification {
        Classification {
            category: category.to_string(),
            confidence,
            all_scores: BTreeMap::new(),
        }
    }

    fn analysis(skin_type: &str, problems: &[(&str, f32)], condition: &str) -> SkinAnalysis {
        SkinAnalysis {
            skin_type: classification(skin_type, 0.8),
            problems_detected: problems
                .iter()
                .map(|(c, p)| DetectedProblem { condition: c.to_string(), confidence: *p })
                .collect(),
            skin_condition: classification(condition, 0.7),
            confidence_note: CONFIDENCE_NOTE.to_string(),
        }
    }

    #[test]
    fn test_routine_follows_skin_type() {
        let recs = recommend(&analysis("peau grasse", &[], "peau lisse"));
        assert_eq!(recs.routine_steps.len(), 5);
        assert_eq!(recs.routine_steps[0], "Nettoyage matin et soir avec un nettoyant sans huile");
    }

    #[test]
    fn test_undetermined_type_falls_back_to_normal_routine() {
        let recs = recommend(&analysis(UNDETERMINED, &[], UNDETERMINED));
        let normal = recommend(&analysis("peau normale", &[], UNDETERMINED));
        assert_eq!(recs.routine_steps, normal.routine_steps);
        assert!(recs.lifestyle_tips.is_empty());
    }

    #[test]
    fn test_low_confidence_problem_ignored() {
        let recs = recommend(&analysis("peau mixte", &[("acné", 0.4)], "peau lisse"));
        assert!(recs.products_recommended.is_empty());
        assert!(recs.ingredients_to_look_for.is_empty());
    }

    #[test]
    fn test_confident_problem_adds_guidance() {
        let recs = recommend(&analysis("peau mixte", &[("acné", 0.75)], "peau lisse"));
        assert_eq!(recs.products_recommended.len(), 3);
        assert!(recs.ingredients_to_look_for.contains(&"zinc".to_string()));
        assert!(recs.lifestyle_tips.contains(&"Ne pas percer les boutons".to_string()));
        assert_eq!(recs.severity, SkincareSeverity::Normal);
        assert!(!recs.consult_dermatologist);
    }

    #[test]
    fn test_problem_without_guidance_adds_nothing() {
        let recs = recommend(&analysis("peau sèche", &[("cernes", 0.9)], "peau hydratée"));
        assert!(recs.products_recommended.is_empty());
        assert!(recs.lifestyle_tips.is_empty());
    }

    #[test]
    fn test_shared_ingredients_deduplicated_in_order() {
        let recs = recommend(&analysis(
            "peau grasse",
            &[("acné", 0.9), ("pores dilatés", 0.8), ("rougeurs", 0.6)],
            "peau lisse",
        ));
        let niacinamide = recs
            .ingredients_to_look_for
            .iter()
            .filter(|i| i.as_str() == "niacinamide")
            .count();
        assert_eq!(niacinamide, 1);
        assert_eq!(recs.ingredients_to_look_for[0], "acide salicylique");
        assert_eq!(recs.ingredients_to_look_for[1], "niacinamide");
    }

    #[test]
    fn test_condition_adjustments_appended_after_problem_tips() {
        let recs = recommend(&analysis("peau normale", &[("rides", 0.5)], "peau fatiguée"));
        let last = recs.lifestyle_tips.last().unwrap();
        assert_eq!(last, "Dormir 7-8h par nuit");
        assert_eq!(recs.lifestyle_tips[0], "Commencer le rétinol 1x/semaine");
    }

    #[test]
    fn test_disclaimer_attached() {
        let recs = recommend(&analysis("peau sensible", &[], "peau lisse"));
        assert!(recs.disclaimer.contains("dermatologue"));
    }

    #[test]
    fn test_serialized_shape() {
        let recs = recommend(&analysis("peau normale", &[], "peau terne"));
        let json = serde_json::to_value(&recs).unwrap();
        assert_eq!(json["severity"], "normal");
        assert_eq!(json["consult_dermatologist"], false);
        assert_eq!(json["lifestyle_tips"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let mut items: Vec<String> = ["b", "a", "b", "c", "a"].iter().map(|s| s.to_string()).collect();
        dedup_in_place(&mut items);
        assert_eq!(items, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_high_severity_problem_requires_dermatologist() {
        let mut catalog = catalog::skincare().clone();
        catalog.problems.insert(
            "acné".to_string(),
            crate::catalog::ProblemGuidance {
                products: vec!["Traitement prescrit".to_string()],
                severity: Severity::High,
                ..Default::default()
            },
        );

        let recs = recommend_with(&catalog, &analysis("peau grasse", &[("acné", 0.9)], "peau lisse"));
        assert!(recs.consult_dermatologist);
        assert_eq!(recs.severity, SkincareSeverity::High);
        assert_eq!(recs.products_recommended, vec!["Traitement prescrit"]);
        assert_eq!(serde_json::to_value(&recs).unwrap()["severity"], "high");

        // Below the guidance confidence the high entry is not applied.
        let quiet = recommend_with(&catalog, &analysis("peau grasse", &[("acné", 0.35)], "peau lisse"));
        assert!(!quiet.consult_dermatologist);
        assert_eq!(quiet.severity, SkincareSeverity::Normal);
    }
}
