//! Recommendation catalogs.
//!
//! All recommendation text lives in `contrib/advice/*.toml` and is embedded
//! at compile time. Each catalog is parsed once, on first use.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::Severity;

const SKINCARE_TOML: &str = include_str!("../../../contrib/advice/skincare.toml");
const FIRST_AID_TOML: &str = include_str!("../../../contrib/advice/first_aid.toml");

static SKINCARE: OnceLock<SkincareCatalog> = OnceLock::new();
static FIRST_AID: OnceLock<FirstAidCatalog> = OnceLock::new();

/// Skincare catalog, keyed by French display labels.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkincareCatalog {
    pub disclaimer: String,
    /// Skin type label → ordered routine steps.
    pub routines: HashMap<String, Vec<String>>,
    /// Skin problem label → targeted guidance.
    pub problems: HashMap<String, ProblemGuidance>,
    /// Skin condition label → lifestyle adjustments.
    pub conditions: HashMap<String, Vec<String>>,
}

/// Guidance for one skin problem (the `[problems.<label>]` tables).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProblemGuidance {
    #[serde(default)]
    pub products: Vec<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub avoid: Vec<String>,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub severity: Severity,
}

/// First-aid catalog: severity keywords and step lists per wound family.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FirstAidCatalog {
    pub disclaimer: String,
    pub high_keywords: Vec<String>,
    pub medium_keywords: Vec<String>,
    pub steps: FirstAidSteps,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FirstAidSteps {
    pub cut: Vec<String>,
    pub burn: Vec<String>,
    pub fracture: Vec<String>,
    pub default: Vec<String>,
}

fn parse_or_empty<T: DeserializeOwned + Default>(name: &str, src: &str) -> T {
    match toml::from_str::<T>(src) {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::error!(catalog = name, error = %e, "bad catalog TOML; serving empty catalog");
            T::default()
        }
    }
}

/// The embedded skincare catalog.
pub fn skincare() -> &'static SkincareCatalog {
    SKINCARE.get_or_init(|| parse_or_empty("skincare", SKINCARE_TOML))
}

/// The embedded first-aid catalog.
pub fn first_aid() -> &'static FirstAidCatalog {
    FIRST_AID.get_or_init(|| parse_or_empty("first_aid", FIRST_AID_TOML))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skin::{SkinCondition, SkinProblem, SkinType};

    #[test]
    fn test_skincare_catalog_parses() {
        let catalog: SkincareCatalog = toml::from_str(SKINCARE_TOML).unwrap();
        assert!(!catalog.disclaimer.is_empty());
        assert_eq!(catalog.routines.len(), 5);
        assert_eq!(catalog.problems.len(), 6);
        assert_eq!(catalog.conditions.len(), 3);
    }

    #[test]
    fn test_first_aid_catalog_parses() {
        let catalog: FirstAidCatalog = toml::from_str(FIRST_AID_TOML).unwrap();
        assert!(!catalog.disclaimer.is_empty());
        assert_eq!(catalog.high_keywords.len(), 8);
        assert_eq!(catalog.medium_keywords.len(), 5);
        assert_eq!(catalog.steps.cut.len(), 4);
        assert_eq!(catalog.steps.default.len(), 4);
    }

    #[test]
    fn test_every_skin_type_has_a_routine() {
        for skin_type in SkinType::ALL {
            assert!(
                skincare().routines.contains_key(skin_type.label()),
                "missing routine for {}",
                skin_type.label()
            );
        }
    }

    #[test]
    fn test_catalog_keys_are_known_labels() {
        let catalog = skincare();
        for key in catalog.problems.keys() {
            assert!(SkinProblem::from_label(key).is_some(), "unknown problem key {key}");
        }
        for key in catalog.conditions.keys() {
            assert!(SkinCondition::from_label(key).is_some(), "unknown condition key {key}");
        }
    }

    #[test]
    fn test_problem_severity_parsed() {
        let acne = &skincare().problems["acné"];
        assert_eq!(acne.severity, Severity::Medium);
        assert_eq!(skincare().problems["rides"].severity, Severity::Low);
    }
}
