use crate::PipelexError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PipeCategory {
    PipeOperator,
    PipeController,
}

impl PipeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PipeOperator => "PipeOperator",
            Self::PipeController => "PipeController",
        }
    }
}

impl fmt::Display for PipeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AllowedPipeType {
    PipeFunc,
    #[serde(rename = "PipeLLM")]
    PipeLlm,
    PipeImgGen,
    PipeExtract,
    PipeSequence,
    PipeParallel,
    PipeCondition,
    PipeBatch,
}

impl AllowedPipeType {
    pub const ALL: [AllowedPipeType; 8] = [
        Self::PipeFunc,
        Self::PipeLlm,
        Self::PipeImgGen,
        Self::PipeExtract,
        Self::PipeSequence,
        Self::PipeParallel,
        Self::PipeCondition,
        Self::PipeBatch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PipeFunc => "PipeFunc",
            Self::PipeLlm => "PipeLLM",
            Self::PipeImgGen => "PipeImgGen",
            Self::PipeExtract => "PipeExtract",
            Self::PipeSequence => "PipeSequence",
            Self::PipeParallel => "PipeParallel",
            Self::PipeCondition => "PipeCondition",
            Self::PipeBatch => "PipeBatch",
        }
    }

    pub fn category(self) -> PipeCategory {
        match self {
            Self::PipeFunc | Self::PipeLlm | Self::PipeImgGen | Self::PipeExtract => {
                PipeCategory::PipeOperator
            }
            Self::PipeSequence | Self::PipeParallel | Self::PipeCondition | Self::PipeBatch => {
                PipeCategory::PipeController
            }
        }
    }

    pub fn is_controller(self) -> bool {
        self.category() == PipeCategory::PipeController
    }
}

impl FromStr for AllowedPipeType {
    type Err = PipelexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|pipe_type| pipe_type.as_str() == trimmed)
            .ok_or_else(|| {
                PipelexError::PipeBlueprint(format!("'{value}' is not a known pipe type"))
            })
    }
}

impl fmt::Display for AllowedPipeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
