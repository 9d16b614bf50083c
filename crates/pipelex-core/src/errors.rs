use pipelex_routing::RoutingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelexError {
    #[error("concept string error: {0}")]
    ConceptString(String),
    #[error("pipe blueprint error: {0}")]
    PipeBlueprint(String),
    #[error("pipe definition error: {0}")]
    PipeDefinition(String),
    #[error("pipe builder error: {0}")]
    PipeBuilder(String),
    #[error(transparent)]
    Bundle(#[from] PipelexBundleError),
    #[error("unexpected bundle state: {0}")]
    BundleUnexpected(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("PLX parse error in '{origin}': {message}")]
    PlxParse { origin: String, message: String },
    #[error("working memory error: {0}")]
    WorkingMemory(String),
    #[error("dry run failed for pipe '{pipe_code}': {message}")]
    DryRun { pipe_code: String, message: String },
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error("I/O error on '{path}': {message}")]
    Io { path: String, message: String },
}

impl PipelexError {
    pub(crate) fn io(path: impl std::fmt::Display, error: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeFailure {
    pub pipe_code: String,
    pub error_message: String,
}

/// A bundle that cannot be used as-is; `pipe_failures` lists the pipes to repair.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}{}", render_pipe_failures(.pipe_failures))]
pub struct PipelexBundleError {
    pub message: String,
    pub pipe_failures: Vec<PipeFailure>,
}

impl PipelexBundleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            pipe_failures: Vec::new(),
        }
    }

    pub fn with_pipe_failures(mut self, pipe_failures: Vec<PipeFailure>) -> Self {
        self.pipe_failures = pipe_failures;
        self
    }

    pub fn failing_pipe_codes(&self) -> Vec<&str> {
        self.pipe_failures
            .iter()
            .map(|failure| failure.pipe_code.as_str())
            .collect()
    }
}

fn render_pipe_failures(pipe_failures: &[PipeFailure]) -> String {
    pipe_failures
        .iter()
        .map(|failure| format!("\n  - {}: {}", failure.pipe_code, failure.error_message))
        .collect()
}
