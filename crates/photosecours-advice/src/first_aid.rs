//! First-aid rule engine.
//!
//! Severity and care steps are chosen by keyword matching on a wound
//! description. Matching is case-insensitive substring search.

use serde::{Deserialize, Serialize};

use crate::catalog::{self, FirstAidCatalog};
use crate::Severity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirstAidRecommendations {
    pub steps: Vec<String>,
    pub severity: Severity,
    pub seek_medical_help: bool,
    pub disclaimer: String,
}

/// Wound family driving the choice of care steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WoundFamily {
    Cut,
    Burn,
    Fracture,
    Other,
}

impl WoundFamily {
    /// Cuts take precedence over burns, burns over fractures.
    fn of(description: &str) -> Self {
        if description.contains("coupure") || description.contains("entaille") {
            WoundFamily::Cut
        } else if description.contains("brûlure") {
            WoundFamily::Burn
        } else if description.contains("fracture") {
            WoundFamily::Fracture
        } else {
            WoundFamily::Other
        }
    }

    fn steps<'a>(&self, catalog: &'a FirstAidCatalog) -> &'a [String] {
        match self {
            WoundFamily::Cut => &catalog.steps.cut,
            WoundFamily::Burn => &catalog.steps.burn,
            WoundFamily::Fracture => &catalog.steps.fracture,
            WoundFamily::Other => &catalog.steps.default,
        }
    }
}

/// Severity implied by the description's keywords.
pub fn assess_severity(description: &str) -> Severity {
    let catalog = catalog::first_aid();
    let lower = description.to_lowercase();
    let matches = |keywords: &[String]| keywords.iter().any(|k| lower.contains(k.as_str()));

    if matches(&catalog.high_keywords) {
        Severity::High
    } else if matches(&catalog.medium_keywords) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Generate first-aid recommendations for a wound description.
pub fn recommend(description: &str) -> FirstAidRecommendations {
    let catalog = catalog::first_aid();
    let lower = description.to_lowercase();

    let severity = assess_severity(&lower);
    let family = WoundFamily::of(&lower);
    let seek_medical_help = severity == Severity::High || family == WoundFamily::Fracture;

    tracing::debug!(%severity, ?family, seek_medical_help, "first-aid recommendations generated");

    FirstAidRecommendations {
        steps: family.steps(catalog).to_vec(),
        severity,
        seek_medical_help,
        disclaimer: catalog.disclaimer.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_keywords_is_low_with_default_steps() {
        let recs = recommend("Une petite rougeur sur le bras");
        assert_eq!(recs.severity, Severity::Low);
        assert!(!recs.seek_medical_help);
        assert_eq!(recs.steps[0], "Nettoyez doucement la zone affectée");
    }

    #[test]
    fn test_cut_is_medium() {
        let recs = recommend("Coupure superficielle sur le doigt");
        assert_eq!(recs.severity, Severity::Medium);
        assert!(!recs.seek_medical_help);
        assert_eq!(recs.steps.len(), 4);
        assert!(recs.steps[1].starts_with("Appliquez une pression directe"));
    }

    #[test]
    fn test_deep_wound_is_high_and_seeks_help() {
        let recs = recommend("Entaille PROFONDE avec saignement abondant");
        assert_eq!(recs.severity, Severity::High);
        assert!(recs.seek_medical_help);
        assert_eq!(recs.steps[0], "Nettoyez la plaie avec de l'eau propre et du savon doux");
    }

    #[test]
    fn test_burn_steps() {
        let recs = recommend("brûlure modérée sur la main");
        assert_eq!(recs.severity, Severity::Medium);
        assert!(recs.steps[0].starts_with("Refroidissez"));
    }

    #[test]
    fn test_fracture_forces_medical_help() {
        let recs = recommend("suspicion de fracture du poignet");
        // "fracture" is itself a high keyword
        assert_eq!(recs.severity, Severity::High);
        assert!(recs.seek_medical_help);
        assert_eq!(recs.steps[3], "Consultez immédiatement un médecin");
    }

    #[test]
    fn test_cut_takes_precedence_over_burn() {
        let recs = recommend("coupure et brûlure");
        assert!(recs.steps[0].starts_with("Nettoyez la plaie"));
    }

    #[test]
    fn test_assess_severity_levels() {
        assert_eq!(assess_severity("saignement léger"), Severity::Medium);
        assert_eq!(assess_severity("os visible"), Severity::High);
        assert_eq!(assess_severity("ecchymose"), Severity::Low);
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        let recs = recommend("grave brûlure");
        let json = serde_json::to_value(&recs).unwrap();
        assert_eq!(json["severity"], "high");
        assert_eq!(json["seek_medical_help"], true);
        assert!(json["disclaimer"].as_str().unwrap().contains("médecin"));
    }
}
