//! Bundle assembly from working memory, repair by whole-entry replacement, and bundle
//! loading gated by a dry run.

use crate::{
    ConceptSpec, DryRunOutput, DryRunner, OrderedTable, PipeFailure, PipeLibrary, PipeSpec,
    PipeTypeRegistry, PipelexBundleBlueprint, PipelexBundleError, PipelexBundleSpec,
    PipelexError, WorkingMemory, parse_plx,
};
use pipelex_routing::ModelResolver;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Builds a bundle spec from the `concept_specs`, `pipe_specs` and `bundle_header_spec`
/// entries of `memory`, revalidating every concept and pipe on the way.
pub fn assemble_pipelex_bundle_spec(
    memory: &WorkingMemory,
) -> Result<PipelexBundleSpec, PipelexError> {
    let concept_specs = memory.concept_specs()?;
    let pipe_specs = memory.pipe_specs()?;
    let header = memory.bundle_header_spec()?;

    let mut concepts = OrderedTable::new();
    for concept_spec in concept_specs {
        let concept = concept_spec.revalidated().map_err(|error| {
            PipelexError::PipeBuilder(format!(
                "Failed to validate concept spec {}: {error}",
                concept_spec.the_concept_code
            ))
        })?;
        concepts.insert(concept.the_concept_code.clone(), concept);
    }

    let registry = PipeTypeRegistry::builtin();
    let mut pipes = OrderedTable::new();
    for pipe_spec in pipe_specs {
        let pipe = convert_pipe_spec(pipe_spec, registry)?;
        pipes.insert(pipe.pipe_code().to_string(), pipe);
    }

    info!(
        domain = header.domain.as_str(),
        concepts = concepts.len(),
        pipes = pipes.len(),
        "bundle spec assembled"
    );
    Ok(PipelexBundleSpec {
        domain: header.domain.clone(),
        description: header.description.clone(),
        system_prompt: header.system_prompt.clone(),
        main_pipe: header.main_pipe.clone(),
        concept: Some(concepts),
        pipe: Some(pipes),
    })
}

fn convert_pipe_spec(
    pipe_spec: &PipeSpec,
    registry: &PipeTypeRegistry,
) -> Result<PipeSpec, PipelexError> {
    let pipe_type = pipe_spec.blueprint().pipe_type();
    if !registry.is_registered(pipe_type) {
        return Err(PipelexError::PipeBuilder(format!(
            "Unknown pipe type: {pipe_type}"
        )));
    }
    let value = pipe_spec.to_value()?;
    PipeSpec::from_value(value, registry).map_err(|error| match error {
        PipelexError::PipeBuilder(message) => PipelexError::PipeBuilder(message),
        other => PipelexError::PipeBuilder(format!(
            "Failed to validate pipe spec {}: {other}",
            pipe_spec.pipe_code()
        )),
    })
}

/// Overwrites the bundle's pipe entries with `fixed_pipes`, by pipe code.
pub fn reconstruct_bundle_with_pipe_fixes(
    bundle: PipelexBundleSpec,
    fixed_pipes: &[PipeSpec],
) -> Result<PipelexBundleSpec, PipelexError> {
    if !bundle.has_pipes() {
        return Err(PipelexError::BundleUnexpected(
            "No pipes section found in bundle spec".to_string(),
        ));
    }
    debug!(fixes = fixed_pipes.len(), "applying pipe fixes");
    Ok(bundle.with_pipe_fixes(fixed_pipes))
}

/// Reads `pipelex_bundle_spec` and `fixed_pipes` from `memory`; both are required.
pub fn reconstruct_bundle_with_pipe_fixes_from_memory(
    memory: &WorkingMemory,
) -> Result<PipelexBundleSpec, PipelexError> {
    let bundle = memory.pipelex_bundle_spec()?.clone();
    let fixed_pipes = memory.fixed_pipes()?.ok_or_else(|| {
        PipelexError::WorkingMemory(format!(
            "required stuff '{}' is missing",
            crate::FIXED_PIPES
        ))
    })?;
    reconstruct_bundle_with_pipe_fixes(bundle, fixed_pipes)
}

/// Applies the optional `fixed_pipes` and `fixed_concepts` entries of `memory` to its
/// `pipelex_bundle_spec`.
///
/// Absent or empty fix lists change nothing. Fixes aimed at a section the bundle does not
/// have are a builder error.
pub fn reconstruct_bundle_with_all_fixes(
    memory: &WorkingMemory,
) -> Result<PipelexBundleSpec, PipelexError> {
    let mut bundle = memory.pipelex_bundle_spec()?.clone();

    if let Some(fixed_pipes) = memory.fixed_pipes()?.filter(|fixes| !fixes.is_empty()) {
        if !bundle.has_pipes() {
            return Err(PipelexError::PipeBuilder(
                "No pipes section found in bundle spec".to_string(),
            ));
        }
        bundle = bundle.with_pipe_fixes(fixed_pipes);
    }

    if let Some(fixed_concepts) = memory.fixed_concepts()?.filter(|fixes| !fixes.is_empty()) {
        if !bundle.has_concepts() {
            return Err(PipelexError::PipeBuilder(
                "No concepts section found in bundle spec".to_string(),
            ));
        }
        bundle = bundle.with_concept_fixes(fixed_concepts);
    }

    Ok(bundle)
}

/// Concept fixes applied without working memory. Same rules as the pipe variant.
pub fn reconstruct_bundle_with_concept_fixes(
    bundle: PipelexBundleSpec,
    fixed_concepts: &[ConceptSpec],
) -> Result<PipelexBundleSpec, PipelexError> {
    if !bundle.has_concepts() {
        return Err(PipelexError::BundleUnexpected(
            "No concepts section found in bundle spec".to_string(),
        ));
    }
    Ok(bundle.with_concept_fixes(fixed_concepts))
}

/// Dry-runs every pipe of `bundle` and returns all outcomes.
pub async fn dry_run_bundle_blueprint(
    bundle: &PipelexBundleBlueprint,
    resolver: Option<&ModelResolver>,
) -> Result<BTreeMap<String, DryRunOutput>, PipelexError> {
    let library = PipeLibrary::from_bundle(bundle)?;
    let mut runner = DryRunner::new(&library);
    if let Some(resolver) = resolver {
        runner = runner.with_resolver(resolver);
    }
    runner.dry_run_library(false).await
}

/// The failed outcomes that belong to pipes of `bundle`.
pub fn document_pipe_failures_from_dry_run(
    bundle: &PipelexBundleBlueprint,
    results: &BTreeMap<String, DryRunOutput>,
) -> Vec<PipeFailure> {
    bundle
        .pipes()
        .filter_map(|(code, _)| results.get(code))
        .filter(|output| output.status.is_failure())
        .map(|output| PipeFailure {
            pipe_code: output.pipe_code.clone(),
            error_message: output
                .error_message
                .clone()
                .unwrap_or_else(|| "dry run failed".to_string()),
        })
        .collect()
}

async fn ensure_bundle_passes_dry_run(
    bundle: &PipelexBundleBlueprint,
    origin: &str,
    resolver: Option<&ModelResolver>,
) -> Result<(), PipelexError> {
    let results = dry_run_bundle_blueprint(bundle, resolver).await?;
    let pipe_failures = document_pipe_failures_from_dry_run(bundle, &results);
    if pipe_failures.is_empty() {
        return Ok(());
    }
    warn!(
        bundle = origin,
        failures = pipe_failures.len(),
        "pipes failed during dry run"
    );
    Err(PipelexBundleError::new(format!("Pipes failed during dry run in bundle '{origin}'"))
        .with_pipe_failures(pipe_failures)
        .into())
}

/// Validates an assembled spec: bundle-level names, then a dry run of every pipe.
pub async fn validate_bundle_spec(
    bundle: &PipelexBundleSpec,
    resolver: Option<&ModelResolver>,
) -> Result<(), PipelexError> {
    let blueprint = bundle.to_blueprint();
    blueprint.validate()?;
    ensure_bundle_passes_dry_run(&blueprint, &bundle.domain, resolver).await
}

async fn read_bundle(path: &Path) -> Result<PipelexBundleBlueprint, PipelexError> {
    let is_file = tokio::fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_file());
    if !is_file {
        return Err(PipelexError::NotFound(format!(
            "Bundle file not found: {}",
            path.display()
        )));
    }
    let source = tokio::fs::read_to_string(path)
        .await
        .map_err(|error| PipelexError::io(path.display(), error))?;
    parse_plx(&source, &path.display().to_string())
}

/// Loads the bundle at `path` and returns its `main_pipe` once every pipe passes a dry run.
pub async fn load_pipe_from_bundle(
    path: &Path,
    resolver: Option<&ModelResolver>,
) -> Result<String, PipelexError> {
    let bundle = read_bundle(path).await?;
    let Some(main_pipe) = bundle.main_pipe.clone() else {
        return Err(PipelexBundleError::new(format!(
            "Bundle '{}' does not declare a main_pipe",
            path.display()
        ))
        .into());
    };
    ensure_bundle_passes_dry_run(&bundle, &path.display().to_string(), resolver).await?;
    info!(bundle = %path.display(), main_pipe = main_pipe.as_str(), "bundle loaded");
    Ok(main_pipe)
}

/// Loads the bundle at `path` and returns it once every pipe passes a dry run. A
/// `main_pipe` is not required.
pub async fn load_and_validate_bundle(
    path: &Path,
    resolver: Option<&ModelResolver>,
) -> Result<PipelexBundleBlueprint, PipelexError> {
    let bundle = read_bundle(path).await?;
    ensure_bundle_passes_dry_run(&bundle, &path.display().to_string(), resolver).await?;
    Ok(bundle)
}
