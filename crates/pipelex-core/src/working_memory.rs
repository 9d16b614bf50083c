use crate::{BundleHeaderSpec, ConceptSpec, PipeSpec, PipelexBundleSpec, PipelexError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CONCEPT_SPECS: &str = "concept_specs";
pub const PIPE_SPECS: &str = "pipe_specs";
pub const BUNDLE_HEADER_SPEC: &str = "bundle_header_spec";
pub const PIPELEX_BUNDLE_SPEC: &str = "pipelex_bundle_spec";
pub const FIXED_PIPES: &str = "fixed_pipes";
pub const FIXED_CONCEPTS: &str = "fixed_concepts";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StuffContent {
    Text(String),
    ConceptSpecs(Vec<ConceptSpec>),
    PipeSpecs(Vec<PipeSpec>),
    BundleHeader(BundleHeaderSpec),
    BundleSpec(PipelexBundleSpec),
}

impl StuffContent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::ConceptSpecs(_) => "concept_specs",
            Self::PipeSpecs(_) => "pipe_specs",
            Self::BundleHeader(_) => "bundle_header",
            Self::BundleSpec(_) => "bundle_spec",
        }
    }
}

/// Named values handed from one pipeline stage to the next.
///
/// Required entries are read with accessors returning `Result`; optional ones return
/// `Option` when absent and still fail on a wrong shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingMemory {
    stuffs: BTreeMap<String, StuffContent>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, content: StuffContent) -> Option<StuffContent> {
        self.stuffs.insert(name.into(), content)
    }

    pub fn with(mut self, name: impl Into<String>, content: StuffContent) -> Self {
        self.set(name, content);
        self
    }

    pub fn get(&self, name: &str) -> Option<&StuffContent> {
        self.stuffs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stuffs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stuffs.keys().map(String::as_str)
    }

    pub fn text(&self, name: &str) -> Result<&str, PipelexError> {
        match self.required(name)? {
            StuffContent::Text(text) => Ok(text.as_str()),
            other => Err(wrong_shape(name, "text", other)),
        }
    }

    pub fn concept_specs(&self) -> Result<&[ConceptSpec], PipelexError> {
        self.optional_concept_specs(CONCEPT_SPECS)?
            .ok_or_else(|| missing(CONCEPT_SPECS))
    }

    pub fn pipe_specs(&self) -> Result<&[PipeSpec], PipelexError> {
        self.optional_pipe_specs(PIPE_SPECS)?
            .ok_or_else(|| missing(PIPE_SPECS))
    }

    pub fn bundle_header_spec(&self) -> Result<&BundleHeaderSpec, PipelexError> {
        match self.required(BUNDLE_HEADER_SPEC)? {
            StuffContent::BundleHeader(header) => Ok(header),
            other => Err(wrong_shape(BUNDLE_HEADER_SPEC, "bundle_header", other)),
        }
    }

    pub fn pipelex_bundle_spec(&self) -> Result<&PipelexBundleSpec, PipelexError> {
        match self.required(PIPELEX_BUNDLE_SPEC)? {
            StuffContent::BundleSpec(bundle) => Ok(bundle),
            other => Err(wrong_shape(PIPELEX_BUNDLE_SPEC, "bundle_spec", other)),
        }
    }

    pub fn fixed_pipes(&self) -> Result<Option<&[PipeSpec]>, PipelexError> {
        self.optional_pipe_specs(FIXED_PIPES)
    }

    pub fn fixed_concepts(&self) -> Result<Option<&[ConceptSpec]>, PipelexError> {
        self.optional_concept_specs(FIXED_CONCEPTS)
    }

    fn required(&self, name: &str) -> Result<&StuffContent, PipelexError> {
        self.stuffs.get(name).ok_or_else(|| missing(name))
    }

    fn optional_concept_specs(&self, name: &str) -> Result<Option<&[ConceptSpec]>, PipelexError> {
        match self.stuffs.get(name) {
            None => Ok(None),
            Some(StuffContent::ConceptSpecs(specs)) => Ok(Some(specs.as_slice())),
            Some(other) => Err(wrong_shape(name, "concept_specs", other)),
        }
    }

    fn optional_pipe_specs(&self, name: &str) -> Result<Option<&[PipeSpec]>, PipelexError> {
        match self.stuffs.get(name) {
            None => Ok(None),
            Some(StuffContent::PipeSpecs(specs)) => Ok(Some(specs.as_slice())),
            Some(other) => Err(wrong_shape(name, "pipe_specs", other)),
        }
    }
}

fn missing(name: &str) -> PipelexError {
    PipelexError::WorkingMemory(format!("required stuff '{name}' is missing"))
}

fn wrong_shape(name: &str, expected: &str, found: &StuffContent) -> PipelexError {
    PipelexError::WorkingMemory(format!(
        "stuff '{name}' should hold {expected} but holds {}",
        found.kind()
    ))
}
