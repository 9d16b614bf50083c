use crate::{
    AllowedPipeType, PipeBlueprint, PipeCategory, PipeInputs, PipelexError, is_snake_case,
    parse_concept_with_multiplicity, validate_concept_string_or_code, validate_pipe_code,
};
use serde::{Deserialize, Serialize};

/// The public contract of a pipe: what it takes, what it yields and which pipes it calls.
///
/// Output multiplicity uses bracket notation: `Text` (single), `Text[]` (variable-length
/// list), `Image[3]` (exactly three). `pipe_category` always follows from `type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PipeSignatureDraft")]
pub struct PipeSignature {
    code: String,
    #[serde(rename = "type")]
    pipe_type: AllowedPipeType,
    pipe_category: PipeCategory,
    description: String,
    inputs: PipeInputs,
    result: String,
    output: String,
    pipe_dependencies: Vec<String>,
}

/// Unchecked signature fields; `type` stays a raw string until validation.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PipeSignatureDraft {
    pub code: String,
    #[serde(rename = "type", default)]
    pub pipe_type: Option<String>,
    /// Ignored: recomputed from `type`.
    #[serde(default)]
    pub pipe_category: Option<String>,
    pub description: String,
    #[serde(default)]
    pub inputs: PipeInputs,
    pub result: String,
    pub output: String,
    #[serde(default)]
    pub pipe_dependencies: Vec<String>,
}

impl TryFrom<PipeSignatureDraft> for PipeSignature {
    type Error = PipelexError;

    fn try_from(draft: PipeSignatureDraft) -> Result<Self, Self::Error> {
        let type_name = draft.pipe_type.ok_or_else(|| {
            PipelexError::PipeBlueprint(format!(
                "signature of pipe '{}' is missing its 'type'",
                draft.code
            ))
        })?;
        let pipe_type: AllowedPipeType = type_name.parse()?;
        PipeSignature::new(
            draft.code,
            pipe_type,
            draft.description,
            draft.inputs,
            draft.result,
            draft.output,
            draft.pipe_dependencies,
        )
    }
}

impl PipeSignature {
    pub fn new(
        code: impl Into<String>,
        pipe_type: AllowedPipeType,
        description: impl Into<String>,
        inputs: PipeInputs,
        result: impl Into<String>,
        output: impl Into<String>,
        pipe_dependencies: Vec<String>,
    ) -> Result<Self, PipelexError> {
        let code = code.into();
        let result = result.into();
        let output = output.into();

        validate_pipe_code(&code)?;
        inputs.validate()?;
        if !is_snake_case(&result) {
            return Err(PipelexError::PipeBlueprint(format!(
                "result name '{result}' of pipe '{code}' must be snake_case"
            )));
        }
        let parsed_output = parse_concept_with_multiplicity(&output)?;
        validate_concept_string_or_code(&parsed_output.concept)?;

        Ok(Self {
            code,
            pipe_type,
            pipe_category: pipe_type.category(),
            description: description.into(),
            inputs,
            result,
            output,
            pipe_dependencies,
        })
    }

    /// The signature of an existing blueprint; the result variable is named after the pipe.
    pub fn from_blueprint(code: &str, blueprint: &PipeBlueprint) -> Result<Self, PipelexError> {
        Self::new(
            code,
            blueprint.pipe_type(),
            blueprint.description().unwrap_or_default(),
            blueprint.inputs().clone(),
            code,
            blueprint.output(),
            blueprint.pipe_dependencies().into_iter().collect(),
        )
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn pipe_type(&self) -> AllowedPipeType {
        self.pipe_type
    }

    pub fn pipe_category(&self) -> PipeCategory {
        self.pipe_category
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn inputs(&self) -> &PipeInputs {
        &self.inputs
    }

    pub fn result(&self) -> &str {
        &self.result
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn pipe_dependencies(&self) -> &[String] {
        &self.pipe_dependencies
    }
}
