use crate::{PipeBlueprint, PipeSignature, PipelexBundleBlueprint, PipelexError, load_plx_path};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One pipe in a flow view: controllers keep their structure, operators keep only their
/// contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category")]
pub enum FlowElement {
    PipeController(PipeBlueprint),
    PipeSignature(PipeSignature),
}

impl FlowElement {
    pub fn category(&self) -> &'static str {
        match self {
            Self::PipeController(_) => "PipeController",
            Self::PipeSignature(_) => "PipeSignature",
        }
    }

    pub fn pipe_type(&self) -> crate::AllowedPipeType {
        match self {
            Self::PipeController(blueprint) => blueprint.pipe_type(),
            Self::PipeSignature(signature) => signature.pipe_type(),
        }
    }

    pub fn as_controller(&self) -> Option<&PipeBlueprint> {
        match self {
            Self::PipeController(blueprint) => Some(blueprint),
            Self::PipeSignature(_) => None,
        }
    }

    pub fn as_signature(&self) -> Option<&PipeSignature> {
        match self {
            Self::PipeSignature(signature) => Some(signature),
            Self::PipeController(_) => None,
        }
    }
}

/// A bundle reduced to the shape of its pipeline, for display and planning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineFlow {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_pipe: Option<String>,
    pub flow_elements: BTreeMap<String, FlowElement>,
}

impl PipelineFlow {
    pub fn from_bundle(bundle: &PipelexBundleBlueprint) -> Result<Self, PipelexError> {
        let mut flow_elements = BTreeMap::new();
        for (code, blueprint) in bundle.pipes() {
            let element = if blueprint.pipe_type().is_controller() {
                FlowElement::PipeController(blueprint.clone())
            } else {
                FlowElement::PipeSignature(PipeSignature::from_blueprint(code, blueprint)?)
            };
            flow_elements.insert(code.to_string(), element);
        }
        Ok(Self {
            domain: bundle.domain.clone(),
            description: bundle.description.clone(),
            main_pipe: bundle.main_pipe.clone(),
            flow_elements,
        })
    }

    pub fn from_plx_path(path: &Path) -> Result<Self, PipelexError> {
        Self::from_bundle(&load_plx_path(path)?)
    }

    pub fn controllers(&self) -> impl Iterator<Item = (&str, &PipeBlueprint)> {
        self.flow_elements
            .iter()
            .filter_map(|(code, element)| Some((code.as_str(), element.as_controller()?)))
    }

    pub fn signatures(&self) -> impl Iterator<Item = &PipeSignature> {
        self.flow_elements
            .values()
            .filter_map(FlowElement::as_signature)
    }
}
