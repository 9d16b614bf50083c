use crate::{
    AllowedPipeType, ConceptWithMultiplicity, OrderedTable, PipeCategory, PipelexError,
    parse_concept_with_multiplicity, validate_concept_string_or_code, validate_input_name,
};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// Outcomes of a condition that steer the controller instead of naming a pipe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialPipeCode {
    Continue,
    Fail,
}

impl SpecialPipeCode {
    pub const ALL: [SpecialPipeCode; 2] = [Self::Continue, Self::Fail];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Fail => "fail",
        }
    }

    pub fn is_special(code: &str) -> bool {
        Self::ALL.iter().any(|special| special.as_str() == code)
    }
}

/// Input variable name to concept reference, kept in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipeInputs {
    entries: Vec<(String, String)>,
}

impl PipeInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, concept: impl Into<String>) {
        let name = name.into();
        let concept = concept.into();
        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            entry.1 = concept;
        } else {
            self.entries.push((name, concept));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, concept)| concept.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, concept)| (name.as_str(), concept.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn validate(&self) -> Result<(), PipelexError> {
        for (name, concept) in &self.entries {
            validate_input_name(name)?;
            let parsed = parse_concept_with_multiplicity(concept)?;
            validate_concept_string_or_code(&parsed.concept)?;
        }
        Ok(())
    }
}

impl<K, V> FromIterator<(K, V)> for PipeInputs
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut inputs = PipeInputs::new();
        for (name, concept) in iter {
            inputs.insert(name, concept);
        }
        inputs
    }
}

impl Serialize for PipeInputs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, concept) in &self.entries {
            map.serialize_entry(name, concept)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PipeInputs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PipeInputsVisitor;

        impl<'de> Visitor<'de> for PipeInputsVisitor {
            type Value = PipeInputs;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a table of input name to concept")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<PipeInputs, A::Error> {
                let mut inputs = PipeInputs::new();
                while let Some((name, concept)) = access.next_entry::<String, String>()? {
                    inputs.insert(name, concept);
                }
                Ok(inputs)
            }
        }

        deserializer.deserialize_map(PipeInputsVisitor)
    }
}

/// What a step iterates over: `true` batches over the list the step receives, a string
/// names the list. `false` and `""` leave the step unbatched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchOver {
    Flag(bool),
    Source(String),
}

impl BatchOver {
    pub fn is_specified(&self) -> bool {
        match self {
            Self::Flag(flag) => *flag,
            Self::Source(source) => !source.is_empty(),
        }
    }

    /// The named list, when there is one.
    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Source(source) if !source.is_empty() => Some(source),
            _ => None,
        }
    }
}

impl Default for BatchOver {
    fn default() -> Self {
        Self::Flag(false)
    }
}

/// Raw fields of a sub-pipe step, checked when turned into a [`SubPipeBlueprint`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubPipeBlueprintFields {
    pub pipe: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub nb_output: Option<u32>,
    #[serde(default)]
    pub multiple_output: Option<bool>,
    #[serde(default)]
    pub batch_over: BatchOver,
    #[serde(default)]
    pub batch_as: Option<String>,
}

impl SubPipeBlueprintFields {
    pub fn new(pipe: impl Into<String>) -> Self {
        Self {
            pipe: pipe.into(),
            ..Self::default()
        }
    }

    pub fn build(self) -> Result<SubPipeBlueprint, PipelexError> {
        SubPipeBlueprint::try_from(self)
    }
}

/// One step inside a controller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SubPipeBlueprintFields")]
pub struct SubPipeBlueprint {
    pipe: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nb_output: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    multiple_output: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_over: Option<BatchOver>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_as: Option<String>,
}

impl SubPipeBlueprint {
    pub fn new(pipe: impl Into<String>) -> Self {
        Self {
            pipe: pipe.into(),
            result: None,
            nb_output: None,
            multiple_output: None,
            batch_over: None,
            batch_as: None,
        }
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn pipe(&self) -> &str {
        &self.pipe
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn nb_output(&self) -> Option<u32> {
        self.nb_output
    }

    pub fn multiple_output(&self) -> Option<bool> {
        self.multiple_output
    }

    pub fn batch_over(&self) -> Option<&BatchOver> {
        self.batch_over.as_ref()
    }

    pub fn batch_as(&self) -> Option<&str> {
        self.batch_as.as_deref()
    }

    /// `(batch_over, batch_as)` when the step iterates over a list.
    pub fn batch(&self) -> Option<(&BatchOver, &str)> {
        self.batch_over().zip(self.batch_as())
    }
}

impl TryFrom<SubPipeBlueprintFields> for SubPipeBlueprint {
    type Error = PipelexError;

    fn try_from(fields: SubPipeBlueprintFields) -> Result<Self, Self::Error> {
        if fields.nb_output.is_some() && fields.multiple_output.is_some() {
            return Err(PipelexError::PipeDefinition(format!(
                "In pipe '{}': a step should have no more than one of 'nb_output' or 'multiple_output'",
                fields.pipe
            )));
        }

        let batch_over = Some(fields.batch_over).filter(BatchOver::is_specified);
        let batch_as = fields.batch_as.filter(|batch_as| !batch_as.is_empty());

        match (&batch_over, &batch_as) {
            (Some(_), None) => {
                return Err(PipelexError::PipeDefinition(format!(
                    "In pipe '{}': When 'batch_over' is specified, 'batch_as' must also be provided",
                    fields.pipe
                )));
            }
            (None, Some(_)) => {
                return Err(PipelexError::PipeDefinition(format!(
                    "In pipe '{}': When 'batch_as' is specified, 'batch_over' must also be provided",
                    fields.pipe
                )));
            }
            _ => {}
        }

        Ok(Self {
            pipe: fields.pipe,
            result: fields.result,
            nb_output: fields.nb_output,
            multiple_output: fields.multiple_output,
            batch_over,
            batch_as,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipeFuncBlueprint {
    #[serde(default, alias = "definition", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "PipeInputs::is_empty")]
    pub inputs: PipeInputs,
    pub output: String,
    pub function_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipeLlmBlueprint {
    #[serde(default, alias = "definition", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "PipeInputs::is_empty")]
    pub inputs: PipeInputs,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipeImgGenBlueprint {
    #[serde(default, alias = "definition", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "PipeInputs::is_empty")]
    pub inputs: PipeInputs,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipeExtractBlueprint {
    #[serde(default, alias = "definition", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "PipeInputs::is_empty")]
    pub inputs: PipeInputs,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipeSequenceBlueprint {
    #[serde(default, alias = "definition", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "PipeInputs::is_empty")]
    pub inputs: PipeInputs,
    pub output: String,
    pub steps: Vec<SubPipeBlueprint>,
}

fn default_add_each_output() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipeParallelBlueprint {
    #[serde(default, alias = "definition", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "PipeInputs::is_empty")]
    pub inputs: PipeInputs,
    pub output: String,
    pub parallels: Vec<SubPipeBlueprint>,
    #[serde(default = "default_add_each_output", skip_serializing_if = "is_true")]
    pub add_each_output: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_output: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipeConditionBlueprint {
    #[serde(default, alias = "definition", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "PipeInputs::is_empty")]
    pub inputs: PipeInputs,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "OrderedTable::is_empty")]
    pub pipe_map: OrderedTable<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_pipe_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_alias_from_expression_to: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipeBatchBlueprint {
    #[serde(default, alias = "definition", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "PipeInputs::is_empty")]
    pub inputs: PipeInputs,
    pub output: String,
    pub branch_pipe_code: String,
    pub input_list_name: String,
    pub input_item_name: String,
}

/// Declarative specification of a pipe, one variant per allowed pipe type.
///
/// Serializes with a `type` tag. Deserialization goes through the pipe-type registry, so
/// unknown tags fail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum PipeBlueprint {
    PipeFunc(PipeFuncBlueprint),
    #[serde(rename = "PipeLLM")]
    PipeLlm(PipeLlmBlueprint),
    PipeImgGen(PipeImgGenBlueprint),
    PipeExtract(PipeExtractBlueprint),
    PipeSequence(PipeSequenceBlueprint),
    PipeParallel(PipeParallelBlueprint),
    PipeCondition(PipeConditionBlueprint),
    PipeBatch(PipeBatchBlueprint),
}

macro_rules! common_field {
    ($self:expr, $field:ident) => {
        match $self {
            PipeBlueprint::PipeFunc(blueprint) => &blueprint.$field,
            PipeBlueprint::PipeLlm(blueprint) => &blueprint.$field,
            PipeBlueprint::PipeImgGen(blueprint) => &blueprint.$field,
            PipeBlueprint::PipeExtract(blueprint) => &blueprint.$field,
            PipeBlueprint::PipeSequence(blueprint) => &blueprint.$field,
            PipeBlueprint::PipeParallel(blueprint) => &blueprint.$field,
            PipeBlueprint::PipeCondition(blueprint) => &blueprint.$field,
            PipeBlueprint::PipeBatch(blueprint) => &blueprint.$field,
        }
    };
}

impl PipeBlueprint {
    pub fn pipe_type(&self) -> AllowedPipeType {
        match self {
            Self::PipeFunc(_) => AllowedPipeType::PipeFunc,
            Self::PipeLlm(_) => AllowedPipeType::PipeLlm,
            Self::PipeImgGen(_) => AllowedPipeType::PipeImgGen,
            Self::PipeExtract(_) => AllowedPipeType::PipeExtract,
            Self::PipeSequence(_) => AllowedPipeType::PipeSequence,
            Self::PipeParallel(_) => AllowedPipeType::PipeParallel,
            Self::PipeCondition(_) => AllowedPipeType::PipeCondition,
            Self::PipeBatch(_) => AllowedPipeType::PipeBatch,
        }
    }

    pub fn category(&self) -> PipeCategory {
        self.pipe_type().category()
    }

    pub fn description(&self) -> Option<&str> {
        common_field!(self, description).as_deref()
    }

    pub fn inputs(&self) -> &PipeInputs {
        common_field!(self, inputs)
    }

    pub fn output(&self) -> &str {
        common_field!(self, output)
    }

    pub fn parsed_output(&self) -> Result<ConceptWithMultiplicity, PipelexError> {
        parse_concept_with_multiplicity(self.output())
    }

    /// Codes of the pipes a controller invokes, derived from its structural fields.
    pub fn pipe_dependencies(&self) -> BTreeSet<String> {
        match self {
            Self::PipeSequence(blueprint) => blueprint
                .steps
                .iter()
                .map(|step| step.pipe().to_string())
                .collect(),
            Self::PipeParallel(blueprint) => blueprint
                .parallels
                .iter()
                .map(|branch| branch.pipe().to_string())
                .collect(),
            Self::PipeCondition(blueprint) => blueprint
                .pipe_map
                .values()
                .chain(blueprint.default_pipe_code.iter())
                .filter(|code| !SpecialPipeCode::is_special(code))
                .cloned()
                .collect(),
            Self::PipeBatch(blueprint) => BTreeSet::from([blueprint.branch_pipe_code.clone()]),
            Self::PipeFunc(_) | Self::PipeLlm(_) | Self::PipeImgGen(_) | Self::PipeExtract(_) => {
                BTreeSet::new()
            }
        }
    }

    /// Field-level checks shared by every construction path.
    pub fn validate(&self) -> Result<(), PipelexError> {
        self.inputs().validate()?;
        let output = self.parsed_output()?;
        validate_concept_string_or_code(&output.concept)?;

        match self {
            Self::PipeFunc(blueprint) => {
                if blueprint.function_name.trim().is_empty() {
                    return Err(PipelexError::PipeDefinition(
                        "PipeFunc requires a non-empty 'function_name'".to_string(),
                    ));
                }
            }
            Self::PipeLlm(PipeLlmBlueprint { model, .. })
            | Self::PipeImgGen(PipeImgGenBlueprint { model, .. })
            | Self::PipeExtract(PipeExtractBlueprint { model, .. }) => {
                if model.as_deref().is_some_and(|model| model.trim().is_empty()) {
                    return Err(PipelexError::PipeDefinition(format!(
                        "{} 'model' cannot be empty when set",
                        self.pipe_type()
                    )));
                }
            }
            Self::PipeSequence(blueprint) => {
                if blueprint.steps.is_empty() {
                    return Err(PipelexError::PipeDefinition(
                        "PipeSequence requires at least one step".to_string(),
                    ));
                }
            }
            Self::PipeParallel(blueprint) => {
                if let Some(combined_output) = blueprint
                    .combined_output
                    .as_deref()
                    .filter(|combined| !combined.is_empty())
                {
                    validate_concept_string_or_code(combined_output)?;
                }
                if blueprint.add_each_output {
                    if let Some(branch) = blueprint.parallels.iter().find(|b| b.result().is_none()) {
                        return Err(PipelexError::PipeDefinition(format!(
                            "PipeParallel branch '{}' needs a 'result' name when 'add_each_output' is set",
                            branch.pipe()
                        )));
                    }
                }
            }
            Self::PipeCondition(blueprint) => {
                if blueprint.expression.is_some() == blueprint.expression_template.is_some() {
                    return Err(PipelexError::PipeDefinition(
                        "PipeCondition requires exactly one of 'expression' or 'expression_template'"
                            .to_string(),
                    ));
                }
            }
            Self::PipeBatch(blueprint) => {
                validate_input_name(&blueprint.input_list_name)?;
                validate_input_name(&blueprint.input_item_name)?;
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for PipeBlueprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        crate::PipeTypeRegistry::builtin()
            .make_blueprint(value)
            .map_err(serde::de::Error::custom)
    }
}

macro_rules! impl_from_blueprint {
    ($($variant:ident => $blueprint:ty),* $(,)?) => {
        $(
            impl From<$blueprint> for PipeBlueprint {
                fn from(blueprint: $blueprint) -> Self {
                    PipeBlueprint::$variant(blueprint)
                }
            }
        )*
    };
}

impl_from_blueprint!(
    PipeFunc => PipeFuncBlueprint,
    PipeLlm => PipeLlmBlueprint,
    PipeImgGen => PipeImgGenBlueprint,
    PipeExtract => PipeExtractBlueprint,
    PipeSequence => PipeSequenceBlueprint,
    PipeParallel => PipeParallelBlueprint,
    PipeCondition => PipeConditionBlueprint,
    PipeBatch => PipeBatchBlueprint,
);
