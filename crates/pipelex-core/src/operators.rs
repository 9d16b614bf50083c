//! Skills offered to bundle authors for operator pipes. Each skill is a `$preset` model
//! choice that the model deck resolves to a concrete model handle.

use pipelex_routing::ModelCategory;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LlmSkill {
    #[default]
    WritingFactual,
    WritingCreative,
    Retrieval,
    Reasoning,
    EngineeringCode,
    EngineeringStructured,
    VisionDescribe,
}

impl LlmSkill {
    pub const ALL: [LlmSkill; 7] = [
        Self::WritingFactual,
        Self::WritingCreative,
        Self::Retrieval,
        Self::Reasoning,
        Self::EngineeringCode,
        Self::EngineeringStructured,
        Self::VisionDescribe,
    ];

    pub fn model_choice(self) -> &'static str {
        match self {
            Self::WritingFactual => "$writing-factual",
            Self::WritingCreative => "$writing-creative",
            Self::Retrieval => "$retrieval",
            Self::Reasoning => "$reasoning",
            Self::EngineeringCode => "$engineering-code",
            Self::EngineeringStructured => "$engineering-structured",
            Self::VisionDescribe => "$vision-describe",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImgGenSkill {
    #[default]
    GenImage,
    GenImageFast,
    GenImageHighQuality,
}

impl ImgGenSkill {
    pub const ALL: [ImgGenSkill; 3] = [
        Self::GenImage,
        Self::GenImageFast,
        Self::GenImageHighQuality,
    ];

    pub fn model_choice(self) -> &'static str {
        match self {
            Self::GenImage => "$gen-image",
            Self::GenImageFast => "$gen-image-fast",
            Self::GenImageHighQuality => "$gen-image-high-quality",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractSkill {
    #[default]
    ExtractTextFromVisuals,
    ExtractTextFromPdf,
}

impl ExtractSkill {
    pub const ALL: [ExtractSkill; 2] = [Self::ExtractTextFromVisuals, Self::ExtractTextFromPdf];

    pub fn model_choice(self) -> &'static str {
        match self {
            Self::ExtractTextFromVisuals => "$extract-text-from-visuals",
            Self::ExtractTextFromPdf => "$extract-text-from-pdf",
        }
    }
}

/// The choice used when an operator of `category` does not name a model.
pub fn default_model_choice(category: ModelCategory) -> &'static str {
    match category {
        ModelCategory::Llm => LlmSkill::default().model_choice(),
        ModelCategory::ImgGen => ImgGenSkill::default().model_choice(),
        ModelCategory::Extract => ExtractSkill::default().model_choice(),
    }
}
