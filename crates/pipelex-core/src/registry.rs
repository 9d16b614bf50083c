use crate::{
    AllowedPipeType, PipeBatchBlueprint, PipeBlueprint, PipeConditionBlueprint,
    PipeExtractBlueprint, PipeFuncBlueprint, PipeImgGenBlueprint, PipeLlmBlueprint,
    PipeParallelBlueprint, PipeSequenceBlueprint, PipelexError,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Builds a blueprint from its fields, without the `type` tag.
pub type PipeBlueprintConstructor = fn(Value) -> Result<PipeBlueprint, PipelexError>;

static BUILTIN_REGISTRY: LazyLock<PipeTypeRegistry> =
    LazyLock::new(PipeTypeRegistry::with_builtin_types);

/// Maps each pipe type tag to the constructor of its blueprint.
#[derive(Clone, Debug, Default)]
pub struct PipeTypeRegistry {
    constructors: BTreeMap<AllowedPipeType, PipeBlueprintConstructor>,
}

impl PipeTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_types() -> Self {
        let mut registry = Self::new();
        registry.register(AllowedPipeType::PipeFunc, construct::<PipeFuncBlueprint>);
        registry.register(AllowedPipeType::PipeLlm, construct::<PipeLlmBlueprint>);
        registry.register(AllowedPipeType::PipeImgGen, construct::<PipeImgGenBlueprint>);
        registry.register(AllowedPipeType::PipeExtract, construct::<PipeExtractBlueprint>);
        registry.register(AllowedPipeType::PipeSequence, construct::<PipeSequenceBlueprint>);
        registry.register(AllowedPipeType::PipeParallel, construct::<PipeParallelBlueprint>);
        registry.register(AllowedPipeType::PipeCondition, construct::<PipeConditionBlueprint>);
        registry.register(AllowedPipeType::PipeBatch, construct::<PipeBatchBlueprint>);
        registry
    }

    /// The shared registry holding every built-in pipe type.
    pub fn builtin() -> &'static PipeTypeRegistry {
        &BUILTIN_REGISTRY
    }

    pub fn register(
        &mut self,
        pipe_type: AllowedPipeType,
        constructor: PipeBlueprintConstructor,
    ) -> Option<PipeBlueprintConstructor> {
        self.constructors.insert(pipe_type, constructor)
    }

    pub fn is_registered(&self, pipe_type: AllowedPipeType) -> bool {
        self.constructors.contains_key(&pipe_type)
    }

    /// Dispatches on the `type` field of `value`.
    ///
    /// A missing or unknown tag is a blueprint error; a type without a constructor, or a
    /// constructor producing another type, is a builder error.
    pub fn make_blueprint(&self, value: Value) -> Result<PipeBlueprint, PipelexError> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(PipelexError::PipeBlueprint(format!(
                    "a pipe blueprint must be a table, got '{other}'"
                )));
            }
        };
        let type_value = fields.remove("type").ok_or_else(|| {
            PipelexError::PipeBlueprint("pipe blueprint is missing its 'type'".to_string())
        })?;
        let type_name = match type_value {
            Value::String(type_name) => type_name,
            other => {
                return Err(PipelexError::PipeBlueprint(format!(
                    "pipe 'type' must be a string, got '{other}'"
                )));
            }
        };
        let pipe_type: AllowedPipeType = type_name.parse()?;

        let constructor = self.constructors.get(&pipe_type).ok_or_else(|| {
            PipelexError::PipeBuilder(format!("no constructor registered for pipe type '{pipe_type}'"))
        })?;
        let blueprint = constructor(Value::Object(fields))?;
        if blueprint.pipe_type() != pipe_type {
            return Err(PipelexError::PipeBuilder(format!(
                "constructor registered for '{pipe_type}' produced a '{}' blueprint",
                blueprint.pipe_type()
            )));
        }
        Ok(blueprint)
    }
}

fn construct<T>(value: Value) -> Result<PipeBlueprint, PipelexError>
where
    T: DeserializeOwned + Into<PipeBlueprint>,
{
    let blueprint: PipeBlueprint = serde_json::from_value::<T>(value)
        .map_err(|error| PipelexError::PipeBlueprint(error.to_string()))?
        .into();
    blueprint.validate()?;
    Ok(blueprint)
}
