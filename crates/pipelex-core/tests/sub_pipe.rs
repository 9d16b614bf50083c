use pipelex_core::{BatchOver, PipelexError, SubPipeBlueprint, SubPipeBlueprintFields, parse_plx};

fn definition_message(error: PipelexError) -> String {
    match error {
        PipelexError::PipeDefinition(message) => message,
        other => panic!("expected a definition error, got {other}"),
    }
}

#[test]
fn build_nb_output_and_multiple_output_expected_definition_error() {
    let fields = SubPipeBlueprintFields {
        nb_output: Some(2),
        multiple_output: Some(true),
        ..SubPipeBlueprintFields::new("draw")
    };
    let message = definition_message(fields.build().expect_err("both set"));
    assert!(message.contains("nb_output"));
    assert!(message.contains("multiple_output"));
}

#[test]
fn build_batch_over_without_batch_as_expected_definition_error() {
    let fields = SubPipeBlueprintFields {
        batch_over: BatchOver::Source("items".to_string()),
        ..SubPipeBlueprintFields::new("summarize")
    };
    assert_eq!(
        definition_message(fields.build().expect_err("batch_as missing")),
        "In pipe 'summarize': When 'batch_over' is specified, 'batch_as' must also be provided"
    );
}

#[test]
fn build_batch_as_without_batch_over_expected_definition_error() {
    let fields = SubPipeBlueprintFields {
        batch_as: Some("item".to_string()),
        ..SubPipeBlueprintFields::new("summarize")
    };
    assert_eq!(
        definition_message(fields.build().expect_err("batch_over missing")),
        "In pipe 'summarize': When 'batch_as' is specified, 'batch_over' must also be provided"
    );
}

#[test]
fn build_empty_batch_values_expected_not_batched() {
    let step = SubPipeBlueprintFields {
        batch_over: BatchOver::Source(String::new()),
        batch_as: Some(String::new()),
        ..SubPipeBlueprintFields::new("summarize")
    }
    .build()
    .expect("empty values count as unset");
    assert_eq!(step, SubPipeBlueprint::new("summarize"));
    assert_eq!(step.batch(), None);
}

#[test]
fn build_batch_over_flag_true_with_batch_as_expected_batched_step() {
    let step = SubPipeBlueprintFields {
        batch_over: BatchOver::Flag(true),
        batch_as: Some("item".to_string()),
        ..SubPipeBlueprintFields::new("summarize")
    }
    .build()
    .expect("true counts as a batch source");
    assert_eq!(step.batch(), Some((&BatchOver::Flag(true), "item")));
    assert_eq!(step.batch_over().and_then(BatchOver::source), None);
}

#[test]
fn build_batch_over_flag_true_without_batch_as_expected_definition_error() {
    let fields = SubPipeBlueprintFields {
        batch_over: BatchOver::Flag(true),
        ..SubPipeBlueprintFields::new("summarize")
    };
    assert_eq!(
        definition_message(fields.build().expect_err("batch_as missing")),
        "In pipe 'summarize': When 'batch_over' is specified, 'batch_as' must also be provided"
    );
}

#[test]
fn build_batch_pair_expected_exposed_names() {
    let step = SubPipeBlueprintFields {
        result: Some("summaries".to_string()),
        batch_over: BatchOver::Source("documents".to_string()),
        batch_as: Some("document".to_string()),
        ..SubPipeBlueprintFields::new("summarize")
    }
    .build()
    .expect("batch pair is complete");
    assert_eq!(
        step.batch(),
        Some((&BatchOver::Source("documents".to_string()), "document"))
    );
    assert_eq!(step.result(), Some("summaries"));
}

#[test]
fn parse_plx_step_with_batch_over_false_expected_not_batched() {
    let source = r#"domain = "demo"

[pipe.run]
type = "PipeSequence"
output = "Text"
steps = [{ pipe = "write", result = "text", batch_over = false }]

[pipe.write]
type = "PipeFunc"
output = "Text"
function_name = "write"
"#;
    let bundle = parse_plx(source, "demo.plx").expect("false means not batched");
    assert_eq!(bundle.pipes().count(), 2);
}

#[test]
fn parse_plx_step_with_unknown_key_expected_parse_error() {
    let source = r#"domain = "demo"

[pipe.run]
type = "PipeSequence"
output = "Text"
steps = [{ pipe = "write", outcome = "text" }]
"#;
    let error = parse_plx(source, "demo.plx").expect_err("unknown step key");
    assert!(matches!(error, PipelexError::PlxParse { .. }));
}
