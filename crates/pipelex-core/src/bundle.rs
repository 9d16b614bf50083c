use crate::{
    ConceptBlueprint, OrderedTable, PipeBlueprint, PipeTypeRegistry, PipelexError,
    is_snake_case, validate_concept_code, validate_pipe_code,
};
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A concept produced by the builder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ConceptSpecDraft")]
pub struct ConceptSpec {
    pub the_concept_code: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refines: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConceptSpecDraft {
    pub the_concept_code: String,
    pub description: String,
    #[serde(default)]
    pub structure: Option<String>,
    #[serde(default)]
    pub refines: Option<String>,
}

impl TryFrom<ConceptSpecDraft> for ConceptSpec {
    type Error = PipelexError;

    fn try_from(draft: ConceptSpecDraft) -> Result<Self, Self::Error> {
        let spec = Self {
            the_concept_code: draft.the_concept_code,
            description: draft.description,
            structure: draft.structure.filter(|structure| !structure.is_empty()),
            refines: draft.refines.filter(|refines| !refines.is_empty()),
        };
        validate_concept_code(&spec.the_concept_code)?;
        spec.to_blueprint().validate()?;
        Ok(spec)
    }
}

impl ConceptSpec {
    pub fn new(
        the_concept_code: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, PipelexError> {
        Self::try_from(ConceptSpecDraft {
            the_concept_code: the_concept_code.into(),
            description: description.into(),
            ..ConceptSpecDraft::default()
        })
    }

    pub fn to_blueprint(&self) -> ConceptBlueprint {
        ConceptBlueprint {
            description: self.description.clone(),
            structure: self.structure.clone(),
            refines: self.refines.clone(),
        }
    }

    /// Rebuilds the spec through its checked constructor.
    pub fn revalidated(&self) -> Result<Self, PipelexError> {
        let value = serde_json::to_value(self)
            .map_err(|error| PipelexError::ConceptString(error.to_string()))?;
        serde_json::from_value(value).map_err(|error| PipelexError::ConceptString(error.to_string()))
    }
}

/// A pipe produced by the builder: its code plus the blueprint of its declared type.
///
/// Serialized flat, as `{ "pipe_code": ..., "type": ..., <blueprint fields> }`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipeSpec {
    pipe_code: String,
    blueprint: PipeBlueprint,
}

impl PipeSpec {
    pub fn new(pipe_code: impl Into<String>, blueprint: PipeBlueprint) -> Result<Self, PipelexError> {
        let pipe_code = pipe_code.into();
        validate_pipe_code(&pipe_code)?;
        Ok(Self {
            pipe_code,
            blueprint,
        })
    }

    pub fn pipe_code(&self) -> &str {
        &self.pipe_code
    }

    pub fn blueprint(&self) -> &PipeBlueprint {
        &self.blueprint
    }

    pub fn into_blueprint(self) -> PipeBlueprint {
        self.blueprint
    }

    pub fn to_value(&self) -> Result<Value, PipelexError> {
        let blueprint = serde_json::to_value(&self.blueprint)
            .map_err(|error| PipelexError::PipeBlueprint(error.to_string()))?;
        let mut fields = Map::new();
        fields.insert("pipe_code".to_string(), Value::String(self.pipe_code.clone()));
        if let Value::Object(blueprint_fields) = blueprint {
            fields.extend(blueprint_fields);
        }
        Ok(Value::Object(fields))
    }

    /// Rebuilds the spec from `value` by dispatching on its `type` through `registry`.
    pub fn from_value(value: Value, registry: &PipeTypeRegistry) -> Result<Self, PipelexError> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(PipelexError::PipeBlueprint(format!(
                    "a pipe spec must be a table, got '{other}'"
                )));
            }
        };
        let pipe_code = match fields.remove("pipe_code") {
            Some(Value::String(pipe_code)) => pipe_code,
            _ => {
                return Err(PipelexError::PipeBlueprint(
                    "a pipe spec requires a string 'pipe_code'".to_string(),
                ));
            }
        };
        let blueprint = registry.make_blueprint(Value::Object(fields))?;
        Self::new(pipe_code, blueprint)
    }
}

impl Serialize for PipeSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipeSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        PipeSpec::from_value(value, PipeTypeRegistry::builtin()).map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleHeaderSpec {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_pipe: Option<String>,
}

/// A complete bundle produced by the builder.
///
/// Entries are only ever replaced whole, through [`PipelexBundleSpec::with_pipe_fixes`] and
/// [`PipelexBundleSpec::with_concept_fixes`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelexBundleSpec {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_pipe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<OrderedTable<ConceptSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipe: Option<OrderedTable<PipeSpec>>,
}

impl PipelexBundleSpec {
    pub fn has_pipes(&self) -> bool {
        self.pipe.as_ref().is_some_and(|pipes| !pipes.is_empty())
    }

    pub fn has_concepts(&self) -> bool {
        self.concept
            .as_ref()
            .is_some_and(|concepts| !concepts.is_empty())
    }

    /// Replaces each pipe entry whose code matches a fix, and adds the others. The caller
    /// decides what an empty pipe section means.
    pub fn with_pipe_fixes(mut self, fixed_pipes: &[PipeSpec]) -> Self {
        let pipes = self.pipe.get_or_insert_with(OrderedTable::new);
        for fixed_pipe in fixed_pipes {
            pipes.insert(fixed_pipe.pipe_code().to_string(), fixed_pipe.clone());
        }
        self
    }

    pub fn with_concept_fixes(mut self, fixed_concepts: &[ConceptSpec]) -> Self {
        let concepts = self.concept.get_or_insert_with(OrderedTable::new);
        for fixed_concept in fixed_concepts {
            concepts.insert(fixed_concept.the_concept_code.clone(), fixed_concept.clone());
        }
        self
    }

    pub fn header(&self) -> BundleHeaderSpec {
        BundleHeaderSpec {
            domain: self.domain.clone(),
            description: self.description.clone(),
            system_prompt: self.system_prompt.clone(),
            main_pipe: self.main_pipe.clone(),
        }
    }

    pub fn to_blueprint(&self) -> PipelexBundleBlueprint {
        let concept = self.concept.as_ref().map(|concepts| {
            concepts
                .iter()
                .map(|(code, spec)| {
                    let entry = if spec.structure.is_none() && spec.refines.is_none() {
                        ConceptEntry::Description(spec.description.clone())
                    } else {
                        ConceptEntry::Blueprint(spec.to_blueprint())
                    };
                    (code.clone(), entry)
                })
                .collect()
        });
        let pipe = self.pipe.as_ref().map(|pipes| {
            pipes
                .iter()
                .map(|(code, spec)| (code.clone(), spec.blueprint().clone()))
                .collect()
        });
        PipelexBundleBlueprint {
            domain: self.domain.clone(),
            description: self.description.clone(),
            system_prompt: self.system_prompt.clone(),
            main_pipe: self.main_pipe.clone(),
            concept,
            pipe,
        }
    }
}

/// A concept declaration in a bundle file: a bare description or a full blueprint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConceptEntry {
    Description(String),
    Blueprint(ConceptBlueprint),
}

impl ConceptEntry {
    pub fn to_blueprint(&self) -> ConceptBlueprint {
        match self {
            Self::Description(description) => ConceptBlueprint::new(description.clone()),
            Self::Blueprint(blueprint) => blueprint.clone(),
        }
    }
}

/// The contents of one `.plx` bundle file. Concepts and pipes keep their file order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelexBundleBlueprint {
    pub domain: String,
    #[serde(default, alias = "definition", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_pipe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<OrderedTable<ConceptEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipe: Option<OrderedTable<PipeBlueprint>>,
}

impl PipelexBundleBlueprint {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }

    pub fn pipes(&self) -> impl Iterator<Item = (&str, &PipeBlueprint)> {
        self.pipe
            .iter()
            .flatten()
            .map(|(code, blueprint)| (code.as_str(), blueprint))
    }

    pub fn concepts(&self) -> impl Iterator<Item = (&str, &ConceptEntry)> {
        self.concept
            .iter()
            .flatten()
            .map(|(code, entry)| (code.as_str(), entry))
    }

    /// Checks names across the bundle; blueprints are checked when they are built.
    pub fn validate(&self) -> Result<(), PipelexError> {
        if !is_snake_case(&self.domain) {
            return Err(PipelexError::PipeDefinition(format!(
                "bundle domain '{}' must be snake_case",
                self.domain
            )));
        }
        for (code, entry) in self.concepts() {
            validate_concept_code(code)?;
            entry.to_blueprint().validate()?;
        }
        for (code, _) in self.pipes() {
            validate_pipe_code(code)?;
        }
        if let Some(main_pipe) = &self.main_pipe {
            if !self.pipes().any(|(code, _)| code == main_pipe) {
                return Err(PipelexError::PipeDefinition(format!(
                    "main_pipe '{main_pipe}' is not declared in bundle '{}'",
                    self.domain
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PipeFuncBlueprint, PipeInputs};
    use serde_json::json;

    fn func_spec(code: &str, function_name: &str) -> PipeSpec {
        PipeSpec::new(
            code,
            PipeBlueprint::PipeFunc(PipeFuncBlueprint {
                description: None,
                inputs: PipeInputs::new(),
                output: "Text".to_string(),
                function_name: function_name.to_string(),
            }),
        )
        .expect("pipe spec should build")
    }

    #[test]
    fn pipe_spec_json_expected_flat_fields_with_code_first() {
        let value = func_spec("count_words", "count").to_value().expect("spec serializes");
        let keys: Vec<&str> = value
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["pipe_code", "type", "output", "function_name"]);
    }

    #[test]
    fn pipe_spec_deserialize_unknown_type_expected_error() {
        let error = serde_json::from_value::<PipeSpec>(json!({
            "pipe_code": "mystery",
            "type": "PipeMystery",
            "output": "Text",
        }))
        .expect_err("unknown type");
        assert!(error.to_string().contains("PipeMystery"));
    }

    #[test]
    fn concept_spec_structure_and_refines_expected_rejected() {
        let error = serde_json::from_value::<ConceptSpec>(json!({
            "the_concept_code": "Invoice",
            "description": "An invoice",
            "structure": "InvoiceContent",
            "refines": "Text",
        }))
        .expect_err("both structure and refines");
        assert!(error.to_string().contains("both"));
    }

    #[test]
    fn with_pipe_fixes_expected_whole_entry_replacement() {
        let bundle = PipelexBundleSpec {
            domain: "demo".to_string(),
            pipe: Some(OrderedTable::from([
                ("a", func_spec("a", "fa")),
                ("b", func_spec("b", "fb")),
            ])),
            ..PipelexBundleSpec::default()
        };
        let fixed = bundle.with_pipe_fixes(&[func_spec("b", "fb_fixed")]);
        let pipes = fixed.pipe.expect("pipes kept");
        assert_eq!(pipes["a"], func_spec("a", "fa"));
        assert_eq!(pipes["b"], func_spec("b", "fb_fixed"));
    }

    #[test]
    fn bundle_blueprint_validate_unknown_main_pipe_expected_definition_error() {
        let mut blueprint = PipelexBundleBlueprint::new("demo");
        blueprint.main_pipe = Some("missing".to_string());
        let error = blueprint.validate().expect_err("main pipe is undeclared");
        assert!(matches!(error, PipelexError::PipeDefinition(_)));
    }
}
