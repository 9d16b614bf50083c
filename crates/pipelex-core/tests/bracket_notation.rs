use pipelex_core::{
    ConceptRef, Multiplicity, OrderedTable, Pipe, PipeBatchBlueprint, PipeConditionBlueprint,
    PipeInputs, PipeParallelBlueprint, PipelexError,
};
use std::num::NonZeroU32;

#[test]
fn pipe_parallel_exact_count_input_expected_exact_multiplicity() {
    let blueprint = PipeParallelBlueprint {
        description: Some("Process items in parallel".to_string()),
        inputs: PipeInputs::from_iter([("data", "DataItem[2]")]),
        output: "ProcessedData".to_string(),
        parallels: Vec::new(),
        add_each_output: true,
        combined_output: None,
    };
    let pipe = Pipe::from_blueprint("test", "test_parallel", blueprint.into())
        .expect("pipe should build");

    let data = pipe.input("data").expect("data input is declared");
    assert_eq!(
        data.concept,
        ConceptRef {
            concept_string: "test.DataItem".to_string(),
            multiplicity: Multiplicity::Exact(NonZeroU32::new(2).expect("non-zero")),
        }
    );
    assert_eq!(pipe.output.code(), "ProcessedData");
    assert_eq!(pipe.output.multiplicity, Multiplicity::Single);
}

#[test]
fn pipe_condition_variable_list_input_expected_variable_multiplicity() {
    let blueprint = PipeConditionBlueprint {
        description: Some("Route based on category".to_string()),
        inputs: PipeInputs::from_iter([("items", "Category[]")]),
        output: "Result".to_string(),
        expression_template: None,
        expression: Some("items".to_string()),
        pipe_map: OrderedTable::from([("A".to_string(), "pipe_a".to_string())]),
        default_pipe_code: Some("continue".to_string()),
        add_alias_from_expression_to: None,
    };
    let pipe = Pipe::from_blueprint("test", "test_condition", blueprint.into())
        .expect("pipe should build");

    let items = pipe.input("items").expect("items input is declared");
    assert_eq!(items.concept.multiplicity, Multiplicity::Variable);
    assert!(items.concept.multiplicity.is_list());
    assert_eq!(pipe.output.code(), "Result");
}

#[test]
fn pipe_batch_list_output_expected_code_without_brackets() {
    let blueprint = PipeBatchBlueprint {
        description: Some("Batch process items".to_string()),
        inputs: PipeInputs::from_iter([("items", "Item[]")]),
        output: "ProcessedItem[]".to_string(),
        branch_pipe_code: "process_single".to_string(),
        input_list_name: "items".to_string(),
        input_item_name: "item".to_string(),
    };
    let pipe = Pipe::from_blueprint("test", "test_batch", blueprint.into())
        .expect("pipe should build");

    assert_eq!(
        pipe.input("items").map(|input| input.concept.multiplicity),
        Some(Multiplicity::Variable)
    );
    assert_eq!(pipe.output.code(), "ProcessedItem");
    assert_eq!(pipe.output.concept_string, "test.ProcessedItem");
    assert_eq!(pipe.output.multiplicity, Multiplicity::Variable);
}

#[test]
fn pipe_zero_count_output_expected_blueprint_error() {
    let blueprint = PipeBatchBlueprint {
        description: None,
        inputs: PipeInputs::from_iter([("items", "Item[]")]),
        output: "ProcessedItem[0]".to_string(),
        branch_pipe_code: "process_single".to_string(),
        input_list_name: "items".to_string(),
        input_item_name: "item".to_string(),
    };
    let error = Pipe::from_blueprint("test", "test_batch", blueprint.into())
        .expect_err("zero is not a positive count");
    assert!(matches!(error, PipelexError::PipeBlueprint(_)));
}

#[test]
fn concept_ref_native_bare_code_expected_native_domain() {
    let reference = ConceptRef::resolve("test", "Image[3]").expect("reference should parse");
    assert_eq!(reference.concept_string, "native.Image");
    assert_eq!(reference.multiplicity.exact_count(), Some(3));
}
