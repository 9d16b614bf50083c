use crate::{
    ConceptSpec, FIXED_CONCEPTS, FIXED_PIPES, PIPELEX_BUNDLE_SPEC, PipeFailure, PipeSpec,
    PipelexBundleSpec, PipelexError, StuffContent, WorkingMemory, assemble_pipelex_bundle_spec,
    make_plx_content, reconstruct_bundle_with_all_fixes, validate_bundle_spec,
};
use pipelex_routing::ModelResolver;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Replacement entries proposed for a failing bundle. `None` leaves a section untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BundleFixes {
    pub fixed_pipes: Option<Vec<PipeSpec>>,
    pub fixed_concepts: Option<Vec<ConceptSpec>>,
}

/// Produces fixes for the pipes that failed validation, typically by asking a model.
#[async_trait::async_trait]
pub trait BundleRepairer: Send + Sync {
    async fn repair(
        &self,
        bundle: &PipelexBundleSpec,
        pipe_failures: &[PipeFailure],
    ) -> Result<BundleFixes, PipelexError>;
}

/// Validate, repair and reconstruct until the bundle passes or attempts run out.
pub struct BuilderLoop {
    repairer: Arc<dyn BundleRepairer>,
    max_attempts: usize,
    resolver: Option<ModelResolver>,
    output_dir: Option<PathBuf>,
}

impl BuilderLoop {
    pub fn new(repairer: Arc<dyn BundleRepairer>) -> Self {
        Self {
            repairer,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            resolver: None,
            output_dir: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_resolver(mut self, resolver: ModelResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Each attempt's bundle is written there as `generated_pipeline_<n>.plx`.
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    /// Starts from the `pipelex_bundle_spec` entry of `memory`, or assembles one from its
    /// parts, and returns the first version that validates.
    ///
    /// Errors other than pipe failures, and pipe failures on the last attempt, are
    /// returned as-is.
    pub async fn build_and_fix(
        &self,
        memory: &WorkingMemory,
    ) -> Result<PipelexBundleSpec, PipelexError> {
        let mut bundle = if memory.contains(PIPELEX_BUNDLE_SPEC) {
            memory.pipelex_bundle_spec()?.clone()
        } else {
            assemble_pipelex_bundle_spec(memory)?
        };

        let mut attempt = 1;
        loop {
            self.save_attempt(&bundle, attempt).await?;
            let error = match validate_bundle_spec(&bundle, self.resolver.as_ref()).await {
                Ok(()) => {
                    info!(domain = bundle.domain.as_str(), attempt, "bundle validated");
                    return Ok(bundle);
                }
                Err(PipelexError::Bundle(error))
                    if attempt < self.max_attempts && !error.pipe_failures.is_empty() =>
                {
                    error
                }
                Err(error) => return Err(error),
            };

            warn!(
                attempt,
                failing = ?error.failing_pipe_codes(),
                "bundle failed validation, asking for repairs"
            );
            let fixes = self.repairer.repair(&bundle, &error.pipe_failures).await?;
            bundle = apply_fixes(bundle, fixes)?;
            attempt += 1;
        }
    }

    async fn save_attempt(
        &self,
        bundle: &PipelexBundleSpec,
        attempt: usize,
    ) -> Result<(), PipelexError> {
        let Some(output_dir) = &self.output_dir else {
            return Ok(());
        };
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|error| PipelexError::io(output_dir.display(), error))?;
        let path = output_dir.join(format!("generated_pipeline_{attempt}.plx"));
        let content = make_plx_content(&bundle.to_blueprint());
        tokio::fs::write(&path, content)
            .await
            .map_err(|error| PipelexError::io(path.display(), error))
    }
}

fn apply_fixes(
    bundle: PipelexBundleSpec,
    fixes: BundleFixes,
) -> Result<PipelexBundleSpec, PipelexError> {
    let mut memory =
        WorkingMemory::new().with(PIPELEX_BUNDLE_SPEC, StuffContent::BundleSpec(bundle));
    if let Some(fixed_pipes) = fixes.fixed_pipes {
        memory.set(FIXED_PIPES, StuffContent::PipeSpecs(fixed_pipes));
    }
    if let Some(fixed_concepts) = fixes.fixed_concepts {
        memory.set(FIXED_CONCEPTS, StuffContent::ConceptSpecs(fixed_concepts));
    }
    reconstruct_bundle_with_all_fixes(&memory)
}
