use pipelex_core::{
    BuilderLoop, BundleFixes, BundleRepairer, OrderedTable, PIPELEX_BUNDLE_SPEC, PipeBlueprint,
    PipeFailure, PipeInputs, PipeLlmBlueprint, PipeSpec, PipelexBundleSpec, PipelexError,
    StuffContent, WorkingMemory, parse_plx,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

fn llm_spec(code: &str, inputs: &[(&str, &str)], prompt: &str) -> PipeSpec {
    let blueprint: PipeBlueprint = PipeLlmBlueprint {
        description: None,
        inputs: inputs.iter().copied().collect::<PipeInputs>(),
        output: "Text".to_string(),
        system_prompt: None,
        prompt: Some(prompt.to_string()),
        model: None,
    }
    .into();
    PipeSpec::new(code, blueprint).expect("pipe spec should build")
}

fn broken_bundle() -> PipelexBundleSpec {
    PipelexBundleSpec {
        domain: "stories".to_string(),
        pipe: Some(OrderedTable::from([
            (
                "outline".to_string(),
                llm_spec("outline", &[("topic", "Text")], "Outline a story about $topic"),
            ),
            (
                "draft".to_string(),
                llm_spec("draft", &[("outline", "Text")], "Draft $outline in a $tone tone"),
            ),
        ])),
        ..PipelexBundleSpec::default()
    }
}

/// Declares every prompt variable it was told about as a `Text` input of the failing pipe.
struct DeclareMissingInputs {
    calls: AtomicUsize,
    give_up: bool,
}

impl DeclareMissingInputs {
    fn new(give_up: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            give_up,
        }
    }
}

#[async_trait::async_trait]
impl BundleRepairer for DeclareMissingInputs {
    async fn repair(
        &self,
        _bundle: &PipelexBundleSpec,
        pipe_failures: &[PipeFailure],
    ) -> Result<BundleFixes, PipelexError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.give_up {
            return Ok(BundleFixes::default());
        }
        let fixed_pipes = pipe_failures
            .iter()
            .map(|failure| {
                assert_eq!(failure.pipe_code, "draft");
                assert!(failure.error_message.contains("'tone'"));
                llm_spec(
                    "draft",
                    &[("outline", "Text"), ("tone", "Text")],
                    "Draft $outline in a $tone tone",
                )
            })
            .collect();
        Ok(BundleFixes {
            fixed_pipes: Some(fixed_pipes),
            fixed_concepts: None,
        })
    }
}

#[tokio::test(flavor = "current_thread")]
async fn build_and_fix_repairable_bundle_expected_fixed_on_second_attempt() {
    let output_dir = TempDir::new().expect("temp dir should be created");
    let repairer = Arc::new(DeclareMissingInputs::new(false));
    let memory =
        WorkingMemory::new().with(PIPELEX_BUNDLE_SPEC, StuffContent::BundleSpec(broken_bundle()));

    let fixed = BuilderLoop::new(repairer.clone())
        .with_output_dir(output_dir.path())
        .build_and_fix(&memory)
        .await
        .expect("second attempt should validate");

    assert_eq!(repairer.calls.load(Ordering::SeqCst), 1);
    let draft = &fixed.pipe.as_ref().expect("pipe section")["draft"];
    assert!(draft.blueprint().inputs().contains("tone"));

    let first = std::fs::read_to_string(output_dir.path().join("generated_pipeline_1.plx"))
        .expect("first attempt is saved");
    let second = std::fs::read_to_string(output_dir.path().join("generated_pipeline_2.plx"))
        .expect("second attempt is saved");
    assert!(!first.contains("tone = \"Text\""));
    assert!(second.contains("tone = \"Text\""));
    assert_eq!(
        parse_plx(&second, "generated_pipeline_2.plx").expect("saved bundle parses"),
        fixed.to_blueprint()
    );
    assert!(!output_dir.path().join("generated_pipeline_3.plx").exists());
}

#[tokio::test(flavor = "current_thread")]
async fn build_and_fix_unrepaired_bundle_expected_bundle_error_after_max_attempts() {
    let repairer = Arc::new(DeclareMissingInputs::new(true));
    let memory =
        WorkingMemory::new().with(PIPELEX_BUNDLE_SPEC, StuffContent::BundleSpec(broken_bundle()));

    let error = BuilderLoop::new(repairer.clone())
        .with_max_attempts(2)
        .build_and_fix(&memory)
        .await
        .expect_err("no fix is ever proposed");

    assert_eq!(repairer.calls.load(Ordering::SeqCst), 1);
    match error {
        PipelexError::Bundle(error) => assert_eq!(error.failing_pipe_codes(), vec!["draft"]),
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn build_and_fix_zero_attempts_expected_single_validation() {
    let repairer = Arc::new(DeclareMissingInputs::new(false));
    let memory =
        WorkingMemory::new().with(PIPELEX_BUNDLE_SPEC, StuffContent::BundleSpec(broken_bundle()));

    let error = BuilderLoop::new(repairer.clone())
        .with_max_attempts(0)
        .build_and_fix(&memory)
        .await
        .expect_err("one attempt leaves no room for repair");

    assert!(matches!(error, PipelexError::Bundle(_)));
    assert_eq!(repairer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn build_and_fix_missing_parts_expected_working_memory_error() {
    let repairer = Arc::new(DeclareMissingInputs::new(false));
    let error = BuilderLoop::new(repairer)
        .build_and_fix(&WorkingMemory::new())
        .await
        .expect_err("nothing to assemble");
    assert!(matches!(error, PipelexError::WorkingMemory(_)));
}
