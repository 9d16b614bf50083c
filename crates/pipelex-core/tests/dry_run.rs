use pipelex_core::{
    DryRunConfig, DryRunStatus, DryRunner, PipeLibrary, PipelexError, parse_plx,
};
use pipelex_routing::{ModelDeck, ModelResolver, RoutingProfile};

fn library(source: &str) -> PipeLibrary {
    let bundle = parse_plx(source, "test.plx").expect("bundle should parse");
    PipeLibrary::from_bundle(&bundle).expect("library should build")
}

fn error_of(results: &std::collections::BTreeMap<String, pipelex_core::DryRunOutput>, code: &str) -> String {
    let output = results.get(code).expect("pipe was dry-run");
    assert_eq!(output.status, DryRunStatus::Failure, "{code} should fail");
    output.error_message.clone().expect("failures carry a message")
}

const REVIEW_BUNDLE: &str = r#"domain = "review"
main_pipe = "review_document"

[concept]
Feedback = "Feedback on a document"

[pipe.review_document]
type = "PipeSequence"
inputs = { document = "Text" }
output = "Feedback"
steps = [
    { pipe = "summarize", result = "summary" },
    { pipe = "critique", result = "feedback" },
]

[pipe.summarize]
type = "PipeLLM"
inputs = { document = "Text" }
output = "Text"
prompt = "Summarize $document"

[pipe.critique]
type = "PipeLLM"
inputs = { summary = "Text" }
output = "Feedback"
prompt = "Critique @summary"
"#;

#[tokio::test(flavor = "current_thread")]
async fn dry_run_library_consistent_bundle_expected_all_success() {
    let library = library(REVIEW_BUNDLE);
    let results = DryRunner::new(&library)
        .dry_run_library(false)
        .await
        .expect("dry run should complete");

    assert_eq!(results.len(), 3);
    assert!(results.values().all(|output| output.status.is_success()));
}

#[tokio::test(flavor = "current_thread")]
async fn dry_run_sequence_missing_step_input_expected_failure_names_input() {
    let source = REVIEW_BUNDLE.replace(
        "{ pipe = \"summarize\", result = \"summary\" }",
        "{ pipe = \"summarize\", result = \"abstract\" }",
    );
    let library = library(&source);
    let results = DryRunner::new(&library)
        .dry_run_library(false)
        .await
        .expect("dry run should complete");

    let message = error_of(&results, "review_document");
    assert!(message.contains("step 2 ('critique')"), "{message}");
    assert!(message.contains("input 'summary' is not available"), "{message}");
    assert!(results["summarize"].status.is_success());
}

#[tokio::test(flavor = "current_thread")]
async fn dry_run_llm_undeclared_prompt_variable_expected_failure() {
    let library = library(
        r#"domain = "demo"

[pipe.greet]
type = "PipeLLM"
inputs = { name = "Text" }
output = "Text"
prompt = "Greet $name in $language"
"#,
    );
    let pipe = library.get_required_pipe("greet").expect("pipe is declared");
    let output = DryRunner::new(&library)
        .dry_run_pipe(pipe, false)
        .await
        .expect("dry run should complete");

    assert!(output.status.is_failure());
    assert_eq!(
        output.error_message.as_deref(),
        Some("prompt variable 'language' is not a declared input")
    );
}

#[tokio::test(flavor = "current_thread")]
async fn dry_run_missing_dependency_and_concept_expected_failures() {
    let library = library(
        r#"domain = "demo"

[pipe.run]
type = "PipeSequence"
output = "Text"
steps = [{ pipe = "ghost", result = "text" }]

[pipe.describe]
type = "PipeFunc"
inputs = { thing = "Gadget" }
output = "Text"
function_name = "describe"
"#,
    );
    let results = DryRunner::new(&library)
        .dry_run_library(false)
        .await
        .expect("dry run should complete");

    assert!(error_of(&results, "run").contains("depends on pipe 'ghost' which is not declared"));
    assert!(error_of(&results, "describe").contains("demo.Gadget"));
}

#[tokio::test(flavor = "current_thread")]
async fn dry_run_pipes_raise_on_failure_expected_dry_run_error() {
    let library = library(
        r#"domain = "demo"

[pipe.broken]
type = "PipeLLM"
output = "Text"
prompt = "Use $missing"
"#,
    );
    let error = DryRunner::new(&library)
        .dry_run_library(true)
        .await
        .expect_err("failure should raise");

    match error {
        PipelexError::DryRun { pipe_code, message } => {
            assert_eq!(pipe_code, "broken");
            assert!(message.contains("missing"));
        }
        other => panic!("unexpected error {other}"),
    }
}

const FLAKY_BUNDLE: &str = r#"domain = "demo"

[pipe.flaky]
type = "PipeLLM"
output = "Text"
prompt = "Use $missing"

[pipe.steady]
type = "PipeLLM"
inputs = { text = "Text" }
output = "Text"
prompt = "Rewrite $text"
"#;

#[tokio::test(flavor = "current_thread")]
async fn dry_run_with_config_allowed_to_fail_expected_no_raise() {
    let library = library(FLAKY_BUNDLE);
    let config = DryRunConfig::default()
        .with_allowed_to_fail(["flaky"])
        .with_raise_on_failure(true);
    let results = DryRunner::new(&library)
        .dry_run_with_config(&config)
        .await
        .expect("the only failure is tolerated");

    assert!(results["flaky"].status.is_failure());
    assert!(results["steady"].status.is_success());
    assert!(config.unexpected_failures(&results).is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn dry_run_with_config_no_allow_list_expected_failures_reported() {
    let library = library(FLAKY_BUNDLE);
    let config = DryRunConfig::default();
    let results = DryRunner::new(&library)
        .dry_run_with_config(&config)
        .await
        .expect("no raise without raise_on_failure");

    let failures = config.unexpected_failures(&results);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].pipe_code, "flaky");
}

const OPERATORS_BUNDLE: &str = r#"domain = "media"

[concept.Photo]
description = "A photo"
refines = "Image"

[pipe.draw]
type = "PipeImgGen"
inputs = { idea = "Text" }
output = "Photo"
prompt = "Draw $idea"

[pipe.draw_text]
type = "PipeImgGen"
inputs = { idea = "Text" }
output = "Text"
prompt = "Draw $idea"

[pipe.read_pdf]
type = "PipeExtract"
inputs = { document = "Pdf" }
output = "Page[]"

[pipe.read_text]
type = "PipeExtract"
inputs = { document = "Text" }
output = "Page"
"#;

#[tokio::test(flavor = "current_thread")]
async fn dry_run_operator_outputs_expected_native_contracts() {
    let library = library(OPERATORS_BUNDLE);
    let results = DryRunner::new(&library)
        .dry_run_library(false)
        .await
        .expect("dry run should complete");

    assert!(results["draw"].status.is_success());
    assert!(results["read_pdf"].status.is_success());
    assert!(error_of(&results, "draw_text").contains("must be compatible with 'native.Image'"));
    assert!(error_of(&results, "read_text").contains("must be an image or a PDF"));
}

#[tokio::test(flavor = "current_thread")]
async fn dry_run_with_resolver_unroutable_model_expected_failure() {
    let library = library(FLAKY_BUNDLE);
    let steady = library.get_required_pipe("steady").expect("pipe is declared");

    let routed = ModelResolver::new(
        ModelDeck::builtin(),
        RoutingProfile::new("test").with_default("openai"),
        vec!["openai".to_string()],
    );
    let output = DryRunner::new(&library)
        .with_resolver(&routed)
        .dry_run_pipe(steady, false)
        .await
        .expect("dry run should complete");
    assert!(output.status.is_success(), "{:?}", output.error_message);

    let unrouted = ModelResolver::new(
        ModelDeck::builtin(),
        RoutingProfile::new("empty"),
        vec!["openai".to_string()],
    );
    let output = DryRunner::new(&library)
        .with_resolver(&unrouted)
        .dry_run_pipe(steady, false)
        .await
        .expect("dry run should complete");
    let message = output.error_message.expect("routing should fail");
    assert!(message.contains("model '$writing-factual' cannot be routed"), "{message}");
}

#[tokio::test(flavor = "current_thread")]
async fn dry_run_batch_and_condition_controllers_expected_input_checks() {
    let library = library(
        r#"domain = "sorting"

[concept]
Ticket = "A support ticket"

[pipe.triage_all]
type = "PipeBatch"
inputs = { tickets = "Ticket[]" }
output = "Text[]"
branch_pipe_code = "triage"
input_list_name = "tickets"
input_item_name = "ticket"

[pipe.triage_wrong_list]
type = "PipeBatch"
inputs = { tickets = "Ticket[]" }
output = "Text[]"
branch_pipe_code = "triage"
input_list_name = "issues"
input_item_name = "ticket"

[pipe.triage]
type = "PipeLLM"
inputs = { ticket = "Ticket" }
output = "Text"
prompt = "Triage $ticket"

[pipe.route]
type = "PipeCondition"
inputs = { ticket = "Ticket" }
output = "Text"
expression = "priority.level"
pipe_map = { high = "triage" }
default_pipe_code = "continue"
"#,
    );
    let results = DryRunner::new(&library)
        .dry_run_library(false)
        .await
        .expect("dry run should complete");

    assert!(results["triage_all"].status.is_success(), "{:?}", results["triage_all"]);
    assert!(error_of(&results, "triage_wrong_list").contains("input_list_name 'issues'"));
    assert!(error_of(&results, "route").contains("expression 'priority.level'"));
}

#[tokio::test(flavor = "current_thread")]
async fn dry_run_llm_prompt_with_email_address_expected_success() {
    let library = library(
        r#"domain = "support"

[pipe.answer]
type = "PipeLLM"
inputs = { question = "Text" }
output = "Text"
prompt = "Answer $question, then tell the user to write to support@example.com"
"#,
    );
    let pipe = library.get_required_pipe("answer").expect("pipe is declared");
    let output = DryRunner::new(&library)
        .dry_run_pipe(pipe, false)
        .await
        .expect("dry run should complete");

    assert!(output.status.is_success(), "{:?}", output.error_message);
}

#[tokio::test(flavor = "current_thread")]
async fn dry_run_sequence_step_batched_over_flag_expected_success() {
    let library = library(
        r#"domain = "sorting"

[concept]
Ticket = "A support ticket"

[pipe.triage_sequence]
type = "PipeSequence"
inputs = { tickets = "Ticket[]" }
output = "Text[]"
steps = [
    { pipe = "triage", result = "notes", batch_over = true, batch_as = "ticket" },
]

[pipe.triage]
type = "PipeLLM"
inputs = { ticket = "Ticket" }
output = "Text"
prompt = "Triage $ticket"
"#,
    );
    let results = DryRunner::new(&library)
        .dry_run_library(false)
        .await
        .expect("dry run should complete");

    assert!(
        results["triage_sequence"].status.is_success(),
        "{:?}",
        results["triage_sequence"]
    );
}
