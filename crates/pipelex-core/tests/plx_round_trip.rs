use pipelex_core::{
    AllowedPipeType, ConceptEntry, OrderedTable, PipeBlueprint, PipeFuncBlueprint, PipeInputs,
    PipeParallelBlueprint, PipelexBundleBlueprint, PipelexError, SubPipeBlueprint,
    make_plx_content, parse_plx, pipe_to_plx_string,
};

const PARALLEL_BUNDLE: &str = r#"domain = "test_pipes"
description = "Domain with parallel pipe"

[pipe.parallel_process]
type = "PipeParallel"
description = "Process data in parallel"
output = "ProcessedData"
parallels = [
    { pipe = "process_a", result = "result_a" },
    { pipe = "process_b", result = "result_b" },
]
"#;

fn parallel_bundle_blueprint() -> PipelexBundleBlueprint {
    let parallel = PipeParallelBlueprint {
        description: Some("Process data in parallel".to_string()),
        inputs: PipeInputs::new(),
        output: "ProcessedData".to_string(),
        parallels: vec![
            SubPipeBlueprint::new("process_a").with_result("result_a"),
            SubPipeBlueprint::new("process_b").with_result("result_b"),
        ],
        add_each_output: true,
        combined_output: None,
    };
    PipelexBundleBlueprint {
        description: Some("Domain with parallel pipe".to_string()),
        pipe: Some(OrderedTable::from([(
            "parallel_process".to_string(),
            PipeBlueprint::from(parallel),
        )])),
        ..PipelexBundleBlueprint::new("test_pipes")
    }
}

#[test]
fn pipe_to_plx_string_func_without_inputs_expected_exact_text() {
    let blueprint = PipeFuncBlueprint {
        description: Some("Process data with function".to_string()),
        inputs: PipeInputs::new(),
        output: "ProcessedData".to_string(),
        function_name: "process_data_function".to_string(),
    };

    let blueprint = PipeBlueprint::from(blueprint);
    let section = pipe_to_plx_string("process_data", &blueprint);
    assert_eq!(
        section,
        "[pipe.process_data]\n\
         type = \"PipeFunc\"\n\
         description = \"Process data with function\"\n\
         output = \"ProcessedData\"\n\
         function_name = \"process_data_function\""
    );

    let parsed = parse_plx(&format!("domain = \"test_pipes\"\n\n{section}\n"), "func.plx")
        .expect("rendered section should parse");
    let pipes: Vec<(&str, &PipeBlueprint)> = parsed.pipes().collect();
    assert_eq!(pipes, vec![("process_data", &blueprint)]);
}

#[test]
fn pipe_to_plx_string_func_with_inputs_expected_inline_table_in_order() {
    let blueprint = PipeFuncBlueprint {
        description: Some("Transform input data".to_string()),
        inputs: PipeInputs::from_iter([("data", "Text"), ("config", "Text")]),
        output: "TransformedData".to_string(),
        function_name: "transform_function".to_string(),
    };

    assert_eq!(
        pipe_to_plx_string("transform_data", &blueprint.into()),
        "[pipe.transform_data]\n\
         type = \"PipeFunc\"\n\
         description = \"Transform input data\"\n\
         inputs = { data = \"Text\", config = \"Text\" }\n\
         output = \"TransformedData\"\n\
         function_name = \"transform_function\""
    );
}

#[test]
fn make_plx_content_parallel_bundle_expected_exact_text() {
    assert_eq!(make_plx_content(&parallel_bundle_blueprint()), PARALLEL_BUNDLE);
}

#[test]
fn parse_plx_parallel_bundle_expected_equal_blueprint() {
    let parsed = parse_plx(PARALLEL_BUNDLE, "parallel.plx").expect("bundle should parse");
    assert_eq!(parsed, parallel_bundle_blueprint());
}

#[test]
fn parse_plx_definition_alias_expected_description() {
    let source = PARALLEL_BUNDLE.replace("description =", "definition =");
    let parsed = parse_plx(&source, "legacy.plx").expect("legacy keys should parse");
    assert_eq!(parsed, parallel_bundle_blueprint());
}

#[test]
fn make_plx_content_full_bundle_expected_stable_round_trip() {
    let source = r#"domain = "newsletter"
description = "Writes a newsletter"
main_pipe = "write_newsletter"

[concept]
Topic = "A topic to cover"

[concept.Headline]
description = "A short headline"
refines = "Text"

[pipe.write_newsletter]
type = "PipeSequence"
description = "Write the newsletter"
inputs = { topics = "Topic[]" }
output = "Text"
steps = [
    { pipe = "write_headline", batch_over = "topics", batch_as = "topic", result = "headlines" },
    { pipe = "assemble", result = "newsletter" },
]

[pipe.write_headline]
type = "PipeLLM"
description = "Write one headline"
inputs = { topic = "Topic" }
output = "Headline"
prompt = """
Write a headline about $topic.
Keep it "short".
"""
model = "$writing-creative"

[pipe.assemble]
type = "PipeFunc"
inputs = { headlines = "Headline[]" }
output = "Text"
function_name = "join_headlines"

[pipe.route_topic]
type = "PipeCondition"
inputs = { topic = "Topic" }
output = "Headline"
expression = "topic.category"
pipe_map = { tech = "write_headline", other = "continue" }

[pipe.headlines_for_all]
type = "PipeBatch"
inputs = { topics = "Topic[]" }
output = "Headline[]"
branch_pipe_code = "write_headline"
input_list_name = "topics"
input_item_name = "topic"
"#;

    let parsed = parse_plx(source, "newsletter.plx").expect("bundle should parse");
    assert!(matches!(
        parsed.concept.as_ref().and_then(|concepts| concepts.get("Topic")),
        Some(ConceptEntry::Description(_))
    ));

    let rendered = make_plx_content(&parsed);
    let reparsed = parse_plx(&rendered, "rendered.plx").expect("rendered bundle should parse");
    assert_eq!(reparsed, parsed);
    assert_eq!(make_plx_content(&reparsed), rendered);

    let headline = parsed
        .pipes()
        .find(|(code, _)| *code == "write_headline")
        .map(|(_, blueprint)| blueprint)
        .expect("headline pipe is declared");
    assert_eq!(headline.pipe_type(), AllowedPipeType::PipeLlm);
    match headline {
        PipeBlueprint::PipeLlm(llm) => assert_eq!(
            llm.prompt.as_deref(),
            Some("Write a headline about $topic.\nKeep it \"short\".\n")
        ),
        other => panic!("unexpected blueprint {other:?}"),
    }
}

#[test]
fn make_plx_content_keeps_declaration_order_expected_exact_text() {
    let source = r#"domain = "routes"

[pipe.zeta_route]
type = "PipeCondition"
inputs = { topic = "Text" }
output = "Text"
expression = "topic.category"
pipe_map = { tech = "alpha_write", other = "continue" }

[pipe.alpha_write]
type = "PipeLLM"
inputs = { topic = "Text" }
output = "Text"
prompt = "Write about $topic"
"#;

    let parsed = parse_plx(source, "routes.plx").expect("bundle should parse");
    let codes: Vec<&str> = parsed.pipes().map(|(code, _)| code).collect();
    assert_eq!(codes, vec!["zeta_route", "alpha_write"]);
    assert_eq!(make_plx_content(&parsed), source);
}

#[test]
fn make_plx_content_batch_over_flag_expected_rendered_as_bool() {
    let source = r#"domain = "docs"

[pipe.summarize_all]
type = "PipeSequence"
inputs = { documents = "Text[]" }
output = "Text"
steps = [
    { pipe = "summarize", result = "summaries", batch_over = true, batch_as = "document" },
]
"#;

    let parsed = parse_plx(source, "docs.plx").expect("bundle should parse");
    assert_eq!(make_plx_content(&parsed), source);
}

#[test]
fn parse_plx_undeclared_main_pipe_expected_definition_error() {
    let source = "domain = \"demo\"\nmain_pipe = \"missing\"\n";
    let error = parse_plx(source, "demo.plx").expect_err("main pipe is not declared");
    assert!(matches!(error, PipelexError::PipeDefinition(message) if message.contains("missing")));
}

#[test]
fn parse_plx_invalid_input_name_expected_error_names_input() {
    let source = r#"domain = "demo"

[pipe.bad]
type = "PipeFunc"
inputs = { myInput = "Text" }
output = "Text"
function_name = "f"
"#;
    let error = parse_plx(source, "demo.plx").expect_err("camelCase input name");
    assert!(error.to_string().contains("Invalid input name syntax 'myInput'"));
}
