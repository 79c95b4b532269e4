//! Skin vocabulary: types, problems and overall conditions.
//!
//! `label()` is the French display label (and catalog key); `prompt()` is the
//! English text the vision-language model scores the image against.

use serde::{Serialize, Serializer};

/// Category label reported when a classification could not be made.
pub const UNDETERMINED: &str = "indéterminé";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkinType {
    Oily,
    Dry,
    Combination,
    Normal,
    Sensitive,
}

impl SkinType {
    pub const ALL: [SkinType; 5] = [
        SkinType::Oily,
        SkinType::Dry,
        SkinType::Combination,
        SkinType::Normal,
        SkinType::Sensitive,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SkinType::Oily => "peau grasse",
            SkinType::Dry => "peau sèche",
            SkinType::Combination => "peau mixte",
            SkinType::Normal => "peau normale",
            SkinType::Sensitive => "peau sensible",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            SkinType::Oily => "a close-up photo of a face with oily skin",
            SkinType::Dry => "a close-up photo of a face with dry skin",
            SkinType::Combination => "a close-up photo of a face with combination skin",
            SkinType::Normal => "a close-up photo of a face with normal skin",
            SkinType::Sensitive => "a close-up photo of a face with sensitive skin",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkinProblem {
    Acne,
    Blackheads,
    Pimples,
    Wrinkles,
    BrownSpots,
    Redness,
    EnlargedPores,
    DarkCircles,
    Dryness,
    Shine,
}

impl SkinProblem {
    pub const ALL: [SkinProblem; 10] = [
        SkinProblem::Acne,
        SkinProblem::Blackheads,
        SkinProblem::Pimples,
        SkinProblem::Wrinkles,
        SkinProblem::BrownSpots,
        SkinProblem::Redness,
        SkinProblem::EnlargedPores,
        SkinProblem::DarkCircles,
        SkinProblem::Dryness,
        SkinProblem::Shine,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SkinProblem::Acne => "acné",
            SkinProblem::Blackheads => "points noirs",
            SkinProblem::Pimples => "boutons",
            SkinProblem::Wrinkles => "rides",
            SkinProblem::BrownSpots => "taches brunes",
            SkinProblem::Redness => "rougeurs",
            SkinProblem::EnlargedPores => "pores dilatés",
            SkinProblem::DarkCircles => "cernes",
            SkinProblem::Dryness => "sécheresse cutanée",
            SkinProblem::Shine => "brillance excessive",
        }
    }

    /// Noun phrase completing "a face with ..." / "a face without ...".
    pub fn prompt(&self) -> &'static str {
        match self {
            SkinProblem::Acne => "acne",
            SkinProblem::Blackheads => "blackheads",
            SkinProblem::Pimples => "pimples",
            SkinProblem::Wrinkles => "wrinkles",
            SkinProblem::BrownSpots => "brown spots",
            SkinProblem::Redness => "redness",
            SkinProblem::EnlargedPores => "enlarged pores",
            SkinProblem::DarkCircles => "dark circles under the eyes",
            SkinProblem::Dryness => "dry flaky skin",
            SkinProblem::Shine => "excessively shiny skin",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.label() == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkinCondition {
    Smooth,
    Rough,
    Dull,
    Radiant,
    Tired,
    Hydrated,
}

impl SkinCondition {
    pub const ALL: [SkinCondition; 6] = [
        SkinCondition::Smooth,
        SkinCondition::Rough,
        SkinCondition::Dull,
        SkinCondition::Radiant,
        SkinCondition::Tired,
        SkinCondition::Hydrated,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SkinCondition::Smooth => "peau lisse",
            SkinCondition::Rough => "peau rugueuse",
            SkinCondition::Dull => "peau terne",
            SkinCondition::Radiant => "peau éclatante",
            SkinCondition::Tired => "peau fatiguée",
            SkinCondition::Hydrated => "peau hydratée",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            SkinCondition::Smooth => "a close-up photo of smooth skin",
            SkinCondition::Rough => "a close-up photo of rough skin",
            SkinCondition::Dull => "a close-up photo of dull skin",
            SkinCondition::Radiant => "a close-up photo of radiant glowing skin",
            SkinCondition::Tired => "a close-up photo of tired-looking skin",
            SkinCondition::Hydrated => "a close-up photo of well-hydrated skin",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }
}

/// All three vocabularies serialize as their French label.
macro_rules! serialize_as_label {
    ($($ty:ty),+) => {
        $(
            impl Serialize for $ty {
                fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    serializer.serialize_str(self.label())
                }
            }
        )+
    };
}

serialize_as_label!(SkinType, SkinProblem, SkinCondition);
