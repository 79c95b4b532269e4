//! photosecours-advice — Rule-based recommendation engines.
//!
//! Maps detected skin categories and wound descriptions to canned,
//! French-language recommendations. No model inference happens here.

pub mod catalog;
pub mod first_aid;
pub mod skin;
pub mod skincare;

pub use first_aid::FirstAidRecommendations;
pub use skin::{SkinCondition, SkinProblem, SkinType, UNDETERMINED};
pub use skincare::{
    Classification, DetectedProblem, SkinAnalysis, SkincareRecommendations, SkincareSeverity,
};

use serde::{Deserialize, Serialize};

/// Three-level severity shared by the first-aid engine and the skincare catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
