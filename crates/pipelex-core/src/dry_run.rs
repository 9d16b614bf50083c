//! Structural execution of pipes without inference calls.
//!
//! Controllers are simulated over a symbolic working memory mapping variable names to
//! concepts; operators are checked against their declared inputs and, when a resolver is
//! available, against model routing.

use crate::{
    BatchOver, ConceptRef, Multiplicity, NativeConceptCode, Pipe, PipeBatchBlueprint,
    PipeBlueprint, PipeConditionBlueprint, PipeLibrary, PipeParallelBlueprint,
    PipeSequenceBlueprint, PipelexError, SubPipeBlueprint, default_model_choice, input_name_root,
    is_valid_input_name,
};
use futures::future::join_all;
use pipelex_routing::{ModelCategory, ModelResolver};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static PROMPT_VARIABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\w])[$@]([a-z][a-z0-9_]*(?:\.[a-z][a-z0-9_]*)*)")
        .expect("Invalid prompt variable regex")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DryRunStatus {
    Success,
    Failure,
}

impl DryRunStatus {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn is_failure(self) -> bool {
        self == Self::Failure
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunOutput {
    pub pipe_code: String,
    pub status: DryRunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl DryRunOutput {
    fn from_problems(pipe_code: &str, problems: Vec<String>) -> Self {
        if problems.is_empty() {
            return Self {
                pipe_code: pipe_code.to_string(),
                status: DryRunStatus::Success,
                error_message: None,
            };
        }
        Self {
            pipe_code: pipe_code.to_string(),
            status: DryRunStatus::Failure,
            error_message: Some(problems.join("; ")),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunConfig {
    /// Pipes whose failures are tolerated.
    #[serde(default)]
    pub allowed_to_fail_pipes: BTreeSet<String>,
    #[serde(default)]
    pub raise_on_failure: bool,
}

impl DryRunConfig {
    pub fn with_allowed_to_fail<I, S>(mut self, pipe_codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_to_fail_pipes
            .extend(pipe_codes.into_iter().map(Into::into));
        self
    }

    pub fn with_raise_on_failure(mut self, raise_on_failure: bool) -> Self {
        self.raise_on_failure = raise_on_failure;
        self
    }

    /// Failed outputs, minus the pipes that are allowed to fail.
    pub fn unexpected_failures<'a>(
        &self,
        results: &'a BTreeMap<String, DryRunOutput>,
    ) -> Vec<&'a DryRunOutput> {
        results
            .values()
            .filter(|output| output.status.is_failure())
            .filter(|output| !self.allowed_to_fail_pipes.contains(&output.pipe_code))
            .collect()
    }
}

type Available = BTreeMap<String, ConceptRef>;

/// Dry-runs pipes of one library.
pub struct DryRunner<'a> {
    library: &'a PipeLibrary,
    resolver: Option<&'a ModelResolver>,
}

impl<'a> DryRunner<'a> {
    pub fn new(library: &'a PipeLibrary) -> Self {
        Self {
            library,
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: &'a ModelResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub async fn dry_run_pipe(
        &self,
        pipe: &Pipe,
        raise_on_failure: bool,
    ) -> Result<DryRunOutput, PipelexError> {
        tokio::task::yield_now().await;
        let output = DryRunOutput::from_problems(&pipe.code, self.check_pipe(pipe));
        match &output.error_message {
            None => debug!(pipe = pipe.code.as_str(), "dry run passed"),
            Some(message) => {
                warn!(pipe = pipe.code.as_str(), error = message.as_str(), "dry run failed");
                if raise_on_failure {
                    return Err(PipelexError::DryRun {
                        pipe_code: pipe.code.clone(),
                        message: message.clone(),
                    });
                }
            }
        }
        Ok(output)
    }

    /// Dry-runs `pipes`. With `raise_on_failure` the run stops at the first failing pipe;
    /// otherwise every pipe runs and all outcomes are returned by pipe code.
    pub async fn dry_run_pipes<'p>(
        &self,
        pipes: impl IntoIterator<Item = &'p Pipe>,
        raise_on_failure: bool,
    ) -> Result<BTreeMap<String, DryRunOutput>, PipelexError> {
        let mut results = BTreeMap::new();
        if raise_on_failure {
            for pipe in pipes {
                let output = self.dry_run_pipe(pipe, true).await?;
                results.insert(output.pipe_code.clone(), output);
            }
        } else {
            let outputs = join_all(pipes.into_iter().map(|pipe| self.dry_run_pipe(pipe, false)))
                .await
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            for output in outputs {
                results.insert(output.pipe_code.clone(), output);
            }
        }
        let failures = results
            .values()
            .filter(|output| output.status.is_failure())
            .count();
        info!(pipes = results.len(), failures, "dry run completed");
        Ok(results)
    }

    pub async fn dry_run_library(
        &self,
        raise_on_failure: bool,
    ) -> Result<BTreeMap<String, DryRunOutput>, PipelexError> {
        self.dry_run_pipes(self.library.pipes(), raise_on_failure)
            .await
    }

    /// Dry-runs the whole library under `config`. Pipes in the allow-list never raise.
    pub async fn dry_run_with_config(
        &self,
        config: &DryRunConfig,
    ) -> Result<BTreeMap<String, DryRunOutput>, PipelexError> {
        if !config.raise_on_failure {
            return self.dry_run_library(false).await;
        }
        let (tolerated, strict): (Vec<&Pipe>, Vec<&Pipe>) = self
            .library
            .pipes()
            .partition(|pipe| config.allowed_to_fail_pipes.contains(&pipe.code));
        let mut results = self.dry_run_pipes(strict, true).await?;
        results.extend(self.dry_run_pipes(tolerated, false).await?);
        Ok(results)
    }

    /// Every problem found in `pipe`, in discovery order.
    pub fn check_pipe(&self, pipe: &Pipe) -> Vec<String> {
        let mut problems = Vec::new();
        problems.extend(self.rule_concepts_resolve(pipe));
        problems.extend(self.rule_dependencies_exist(pipe));
        if !problems.is_empty() {
            return problems;
        }

        match &pipe.blueprint {
            PipeBlueprint::PipeFunc(_) => {}
            PipeBlueprint::PipeLlm(llm) => {
                for prompt in [&llm.system_prompt, &llm.prompt].into_iter().flatten() {
                    problems.extend(rule_prompt_variables_declared(pipe, prompt));
                }
                problems.extend(self.rule_model_routes(ModelCategory::Llm, llm.model.as_deref()));
            }
            PipeBlueprint::PipeImgGen(img_gen) => {
                if let Some(prompt) = &img_gen.prompt {
                    problems.extend(rule_prompt_variables_declared(pipe, prompt));
                }
                problems.extend(self.rule_output_is(pipe, NativeConceptCode::Image));
                problems.extend(
                    self.rule_model_routes(ModelCategory::ImgGen, img_gen.model.as_deref()),
                );
            }
            PipeBlueprint::PipeExtract(extract) => {
                problems.extend(self.rule_extract_input(pipe));
                problems.extend(self.rule_output_is(pipe, NativeConceptCode::Page));
                problems.extend(
                    self.rule_model_routes(ModelCategory::Extract, extract.model.as_deref()),
                );
            }
            PipeBlueprint::PipeSequence(sequence) => {
                problems.extend(self.simulate_sequence(pipe, sequence));
            }
            PipeBlueprint::PipeParallel(parallel) => {
                problems.extend(self.simulate_parallel(pipe, parallel));
            }
            PipeBlueprint::PipeCondition(condition) => {
                problems.extend(self.simulate_condition(pipe, condition));
            }
            PipeBlueprint::PipeBatch(batch) => {
                problems.extend(self.simulate_batch(pipe, batch));
            }
        }
        problems
    }

    fn rule_concepts_resolve(&self, pipe: &Pipe) -> Vec<String> {
        let concepts = self.library.concept_library();
        let mut problems = Vec::new();
        for input in &pipe.inputs {
            if let Err(error) = concepts.check_concept(&input.concept.concept_string) {
                problems.push(format!("input '{}': {error}", input.name));
            }
        }
        if let Err(error) = concepts.check_concept(&pipe.output.concept_string) {
            problems.push(format!("output: {error}"));
        }
        problems
    }

    fn rule_dependencies_exist(&self, pipe: &Pipe) -> Vec<String> {
        pipe.blueprint
            .pipe_dependencies()
            .into_iter()
            .filter(|dependency| self.library.get_pipe(dependency).is_none())
            .map(|dependency| format!("depends on pipe '{dependency}' which is not declared"))
            .collect()
    }

    fn rule_output_is(&self, pipe: &Pipe, native: NativeConceptCode) -> Vec<String> {
        let wanted = native.concept_string();
        if self
            .library
            .concept_library()
            .is_compatible(&pipe.output.concept_string, &wanted, true)
        {
            return Vec::new();
        }
        vec![format!(
            "{} output '{}' must be compatible with '{wanted}'",
            pipe.blueprint.pipe_type(),
            pipe.output.concept_string
        )]
    }

    fn rule_extract_input(&self, pipe: &Pipe) -> Vec<String> {
        let [input] = pipe.inputs.as_slice() else {
            return vec![format!(
                "PipeExtract takes exactly one input, found {}",
                pipe.inputs.len()
            )];
        };
        let concepts = self.library.concept_library();
        let readable = [NativeConceptCode::Image, NativeConceptCode::Pdf]
            .into_iter()
            .any(|native| {
                concepts.is_compatible(&input.concept.concept_string, &native.concept_string(), true)
            });
        if readable {
            return Vec::new();
        }
        vec![format!(
            "PipeExtract input '{}' of concept '{}' must be an image or a PDF",
            input.name, input.concept.concept_string
        )]
    }

    fn rule_model_routes(&self, category: ModelCategory, model: Option<&str>) -> Vec<String> {
        let Some(resolver) = self.resolver else {
            return Vec::new();
        };
        let choice = model.unwrap_or_else(|| default_model_choice(category));
        match resolver.resolve(category, choice) {
            Ok(_) => Vec::new(),
            Err(error) => vec![format!("model '{choice}' cannot be routed: {error}")],
        }
    }

    fn simulate_sequence(&self, pipe: &Pipe, sequence: &PipeSequenceBlueprint) -> Vec<String> {
        let mut problems = Vec::new();
        let mut available = declared_inputs(pipe);
        let mut last_output: Option<ConceptRef> = None;

        for (index, step) in sequence.steps.iter().enumerate() {
            let Some(step_pipe) = self.library.get_pipe(step.pipe()) else {
                continue;
            };
            let context = format!("step {} ('{}')", index + 1, step.pipe());

            let mut step_available = available.clone();
            match step.batch() {
                Some((BatchOver::Source(batch_over), batch_as)) => {
                    match available.get(input_name_root(batch_over)) {
                        Some(list) => {
                            step_available.insert(
                                batch_as.to_string(),
                                ConceptRef {
                                    concept_string: list.concept_string.clone(),
                                    multiplicity: Multiplicity::Single,
                                },
                            );
                        }
                        None => problems.push(format!(
                            "{context} batches over '{batch_over}' which is not available"
                        )),
                    }
                }
                // An unnamed list hands each item to the step as `batch_as`.
                Some((BatchOver::Flag(_), batch_as)) => {
                    if let Some(item) = step_pipe.input(batch_as) {
                        step_available.insert(batch_as.to_string(), item.concept.clone());
                    }
                }
                None => {}
            }
            problems.extend(self.rule_inputs_satisfied(step_pipe, &step_available, &context));

            let produced = ConceptRef {
                concept_string: step_pipe.output.concept_string.clone(),
                multiplicity: step_multiplicity(step, step_pipe),
            };
            if let Some(result) = step.result() {
                available.insert(result.to_string(), produced.clone());
            }
            last_output = Some(produced);
        }

        if let Some(last_output) = last_output {
            if !self.library.concept_library().is_compatible(
                &last_output.concept_string,
                &pipe.output.concept_string,
                false,
            ) {
                problems.push(format!(
                    "last step produces '{}' but the sequence outputs '{}'",
                    last_output.concept_string, pipe.output.concept_string
                ));
            }
        }
        problems
    }

    fn simulate_parallel(&self, pipe: &Pipe, parallel: &PipeParallelBlueprint) -> Vec<String> {
        let available = declared_inputs(pipe);
        let mut problems = Vec::new();
        for branch in &parallel.parallels {
            if let Some(branch_pipe) = self.library.get_pipe(branch.pipe()) {
                let context = format!("branch '{}'", branch.pipe());
                problems.extend(self.rule_inputs_satisfied(branch_pipe, &available, &context));
            }
        }
        if let Some(combined_output) = parallel
            .combined_output
            .as_deref()
            .filter(|combined| !combined.is_empty())
        {
            let combined = crate::resolve_concept_string(&pipe.domain, combined_output);
            if let Err(error) = self.library.concept_library().check_concept(&combined) {
                problems.push(format!("combined_output: {error}"));
            }
        }
        problems
    }

    fn simulate_condition(&self, pipe: &Pipe, condition: &PipeConditionBlueprint) -> Vec<String> {
        let available = declared_inputs(pipe);
        let mut problems = Vec::new();
        if let Some(expression) = condition.expression.as_deref().map(str::trim) {
            if is_valid_input_name(expression)
                && !available.contains_key(input_name_root(expression))
            {
                problems.push(format!(
                    "expression '{expression}' does not refer to a declared input"
                ));
            }
        }
        for code in pipe.blueprint.pipe_dependencies() {
            if let Some(branch_pipe) = self.library.get_pipe(&code) {
                let context = format!("outcome pipe '{code}'");
                problems.extend(self.rule_inputs_satisfied(branch_pipe, &available, &context));
            }
        }
        problems
    }

    fn simulate_batch(&self, pipe: &Pipe, batch: &PipeBatchBlueprint) -> Vec<String> {
        let mut available = declared_inputs(pipe);
        let mut problems = Vec::new();
        match available.get(input_name_root(&batch.input_list_name)).cloned() {
            Some(list) => {
                available.insert(
                    batch.input_item_name.clone(),
                    ConceptRef {
                        concept_string: list.concept_string,
                        multiplicity: Multiplicity::Single,
                    },
                );
            }
            None => problems.push(format!(
                "input_list_name '{}' is not a declared input",
                batch.input_list_name
            )),
        }
        if let Some(branch_pipe) = self.library.get_pipe(&batch.branch_pipe_code) {
            let context = format!("branch '{}'", batch.branch_pipe_code);
            problems.extend(self.rule_inputs_satisfied(branch_pipe, &available, &context));
        }
        problems
    }

    /// Every input of `consumer` must be available, with a compatible concept.
    fn rule_inputs_satisfied(
        &self,
        consumer: &Pipe,
        available: &Available,
        context: &str,
    ) -> Vec<String> {
        let concepts = self.library.concept_library();
        let mut problems = Vec::new();
        for input in &consumer.inputs {
            let Some(provided) = available.get(input_name_root(&input.name)) else {
                problems.push(format!(
                    "{context}: input '{}' is not available",
                    input.name
                ));
                continue;
            };
            // Nested field access cannot be typed without structures.
            if input.name.contains('.') {
                continue;
            }
            if !concepts.is_compatible(
                &provided.concept_string,
                &input.concept.concept_string,
                false,
            ) {
                problems.push(format!(
                    "{context}: input '{}' expects '{}' but '{}' is provided",
                    input.name, input.concept.concept_string, provided.concept_string
                ));
            }
        }
        problems
    }
}

fn declared_inputs(pipe: &Pipe) -> Available {
    pipe.inputs
        .iter()
        .map(|input| {
            (
                input_name_root(&input.name).to_string(),
                input.concept.clone(),
            )
        })
        .collect()
}

fn step_multiplicity(step: &SubPipeBlueprint, step_pipe: &Pipe) -> Multiplicity {
    if step.batch().is_some() || step.multiple_output() == Some(true) {
        return Multiplicity::Variable;
    }
    match step.nb_output().and_then(std::num::NonZeroU32::new) {
        Some(count) => Multiplicity::Exact(count),
        None => step_pipe.output.multiplicity,
    }
}

fn rule_prompt_variables_declared(pipe: &Pipe, prompt: &str) -> Vec<String> {
    let declared: BTreeSet<&str> = pipe
        .inputs
        .iter()
        .map(|input| input_name_root(&input.name))
        .collect();
    let mut reported = BTreeSet::new();
    PROMPT_VARIABLE_RE
        .captures_iter(prompt)
        .filter_map(|captures| captures.get(1))
        .map(|variable| variable.as_str())
        .filter(|variable| !declared.contains(input_name_root(variable)))
        .filter(|variable| reported.insert(input_name_root(variable).to_string()))
        .map(|variable| format!("prompt variable '{variable}' is not a declared input"))
        .collect()
}
