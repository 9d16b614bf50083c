//! `.plx` bundle files: parsing into [`PipelexBundleBlueprint`] and canonical rendering.
//!
//! Rendering uses a fixed field order per pipe type: `type`, `description`, `inputs`,
//! `output`, then the type-specific fields. Unset optional fields are omitted.

use crate::{
    BatchOver, ConceptBlueprint, ConceptEntry, PipeBlueprint, PipeInputs,
    PipelexBundleBlueprint, PipelexError, SubPipeBlueprint,
};
use std::path::Path;

pub fn parse_plx(source: &str, origin: &str) -> Result<PipelexBundleBlueprint, PipelexError> {
    let blueprint: PipelexBundleBlueprint =
        toml::from_str(source).map_err(|error| PipelexError::PlxParse {
            origin: origin.to_string(),
            message: error.to_string(),
        })?;
    blueprint.validate()?;
    Ok(blueprint)
}

pub fn load_plx_path(path: &Path) -> Result<PipelexBundleBlueprint, PipelexError> {
    if !path.is_file() {
        return Err(PipelexError::NotFound(format!(
            "Bundle file not found: {}",
            path.display()
        )));
    }
    let source =
        std::fs::read_to_string(path).map_err(|error| PipelexError::io(path.display(), error))?;
    parse_plx(&source, &path.display().to_string())
}

/// Renders one `[pipe.<code>]` section, without a trailing newline.
pub fn pipe_to_plx_string(pipe_code: &str, blueprint: &PipeBlueprint) -> String {
    let mut section = PlxSection::new(format!("pipe.{}", render_key(pipe_code)));
    section.string("type", blueprint.pipe_type().as_str());
    section.optional_string("description", blueprint.description());
    if !blueprint.inputs().is_empty() {
        section.raw("inputs", render_inputs(blueprint.inputs()));
    }
    section.string("output", blueprint.output());

    match blueprint {
        PipeBlueprint::PipeFunc(func) => {
            section.string("function_name", &func.function_name);
        }
        PipeBlueprint::PipeLlm(llm) => {
            section.optional_string("system_prompt", llm.system_prompt.as_deref());
            section.optional_string("prompt", llm.prompt.as_deref());
            section.optional_string("model", llm.model.as_deref());
        }
        PipeBlueprint::PipeImgGen(img_gen) => {
            section.optional_string("prompt", img_gen.prompt.as_deref());
            section.optional_string("model", img_gen.model.as_deref());
        }
        PipeBlueprint::PipeExtract(extract) => {
            section.optional_string("model", extract.model.as_deref());
        }
        PipeBlueprint::PipeSequence(sequence) => {
            section.raw("steps", render_sub_pipes(&sequence.steps));
        }
        PipeBlueprint::PipeParallel(parallel) => {
            section.raw("parallels", render_sub_pipes(&parallel.parallels));
            if !parallel.add_each_output {
                section.raw("add_each_output", "false".to_string());
            }
            section.optional_string("combined_output", parallel.combined_output.as_deref());
        }
        PipeBlueprint::PipeCondition(condition) => {
            section.optional_string("expression_template", condition.expression_template.as_deref());
            section.optional_string("expression", condition.expression.as_deref());
            if !condition.pipe_map.is_empty() {
                section.raw(
                    "pipe_map",
                    render_inline_table(
                        condition
                            .pipe_map
                            .iter()
                            .map(|(outcome, pipe)| (outcome.as_str(), render_string(pipe))),
                    ),
                );
            }
            section.optional_string("default_pipe_code", condition.default_pipe_code.as_deref());
            section.optional_string(
                "add_alias_from_expression_to",
                condition.add_alias_from_expression_to.as_deref(),
            );
        }
        PipeBlueprint::PipeBatch(batch) => {
            section.string("branch_pipe_code", &batch.branch_pipe_code);
            section.string("input_list_name", &batch.input_list_name);
            section.string("input_item_name", &batch.input_item_name);
        }
    }

    section.finish()
}

/// Renders a whole bundle file, ending with a newline.
pub fn make_plx_content(blueprint: &PipelexBundleBlueprint) -> String {
    let mut header = vec![format!("domain = {}", render_string(&blueprint.domain))];
    if let Some(description) = &blueprint.description {
        header.push(format!("description = {}", render_string(description)));
    }
    if let Some(system_prompt) = &blueprint.system_prompt {
        header.push(format!("system_prompt = {}", render_string(system_prompt)));
    }
    if let Some(main_pipe) = &blueprint.main_pipe {
        header.push(format!("main_pipe = {}", render_string(main_pipe)));
    }

    let mut sections = Vec::new();

    let simple_concepts: Vec<(&str, &str)> = blueprint
        .concepts()
        .filter_map(|(code, entry)| match entry {
            ConceptEntry::Description(description) => Some((code, description.as_str())),
            ConceptEntry::Blueprint(_) => None,
        })
        .collect();
    if !simple_concepts.is_empty() {
        let mut section = PlxSection::new("concept".to_string());
        for (code, description) in simple_concepts {
            section.string(code, description);
        }
        sections.push(section.finish());
    }
    for (code, entry) in blueprint.concepts() {
        if let ConceptEntry::Blueprint(concept) = entry {
            sections.push(concept_to_plx_string(code, concept));
        }
    }

    for (code, pipe) in blueprint.pipes() {
        sections.push(pipe_to_plx_string(code, pipe));
    }

    let mut content = header.join("\n");
    content.push('\n');
    for section in sections {
        content.push('\n');
        content.push_str(&section);
        content.push('\n');
    }
    content
}

fn concept_to_plx_string(code: &str, concept: &ConceptBlueprint) -> String {
    let mut section = PlxSection::new(format!("concept.{}", render_key(code)));
    section.string("description", &concept.description);
    section.optional_string("structure", concept.structure.as_deref());
    section.optional_string("refines", concept.refines.as_deref());
    section.finish()
}

struct PlxSection {
    lines: Vec<String>,
}

impl PlxSection {
    fn new(header: String) -> Self {
        Self {
            lines: vec![format!("[{header}]")],
        }
    }

    fn raw(&mut self, key: &str, rendered: String) {
        self.lines.push(format!("{} = {rendered}", render_key(key)));
    }

    fn string(&mut self, key: &str, value: &str) {
        self.raw(key, render_string(value));
    }

    fn optional_string(&mut self, key: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.string(key, value);
        }
    }

    fn finish(self) -> String {
        self.lines.join("\n")
    }
}

fn render_inputs(inputs: &PipeInputs) -> String {
    render_inline_table(
        inputs
            .iter()
            .map(|(name, concept)| (name, render_string(concept))),
    )
}

fn render_inline_table<'a>(entries: impl Iterator<Item = (&'a str, String)>) -> String {
    let fields: Vec<String> = entries
        .map(|(key, value)| format!("{} = {value}", render_key(key)))
        .collect();
    if fields.is_empty() {
        "{}".to_string()
    } else {
        format!("{{ {} }}", fields.join(", "))
    }
}

fn render_sub_pipe(sub_pipe: &SubPipeBlueprint) -> String {
    let mut fields = vec![("pipe", render_string(sub_pipe.pipe()))];
    if let Some(result) = sub_pipe.result() {
        fields.push(("result", render_string(result)));
    }
    if let Some(nb_output) = sub_pipe.nb_output() {
        fields.push(("nb_output", nb_output.to_string()));
    }
    if let Some(multiple_output) = sub_pipe.multiple_output() {
        fields.push(("multiple_output", multiple_output.to_string()));
    }
    if let Some((batch_over, batch_as)) = sub_pipe.batch() {
        let batch_over = match batch_over {
            BatchOver::Flag(flag) => flag.to_string(),
            BatchOver::Source(source) => render_string(source),
        };
        fields.push(("batch_over", batch_over));
        fields.push(("batch_as", render_string(batch_as)));
    }
    render_inline_table(fields.into_iter())
}

fn render_sub_pipes(sub_pipes: &[SubPipeBlueprint]) -> String {
    if sub_pipes.is_empty() {
        return "[]".to_string();
    }
    let mut rendered = String::from("[\n");
    for sub_pipe in sub_pipes {
        rendered.push_str("    ");
        rendered.push_str(&render_sub_pipe(sub_pipe));
        rendered.push_str(",\n");
    }
    rendered.push(']');
    rendered
}

fn render_key(key: &str) -> String {
    let is_bare = !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if is_bare {
        key.to_string()
    } else {
        render_basic_string(key)
    }
}

fn render_string(value: &str) -> String {
    if value.contains('\n') {
        render_multiline_string(value)
    } else {
        render_basic_string(value)
    }
}

fn render_basic_string(value: &str) -> String {
    let mut rendered = String::with_capacity(value.len() + 2);
    rendered.push('"');
    for ch in value.chars() {
        push_escaped(&mut rendered, ch, false);
    }
    rendered.push('"');
    rendered
}

/// `"""` string whose content starts on the next line.
fn render_multiline_string(value: &str) -> String {
    let mut rendered = String::with_capacity(value.len() + 8);
    rendered.push_str("\"\"\"\n");
    for ch in value.chars() {
        push_escaped(&mut rendered, ch, true);
    }
    rendered.push_str("\"\"\"");
    rendered
}

fn push_escaped(rendered: &mut String, ch: char, multiline: bool) {
    match ch {
        '\\' => rendered.push_str("\\\\"),
        '"' => rendered.push_str("\\\""),
        '\n' if multiline => rendered.push('\n'),
        '\n' => rendered.push_str("\\n"),
        '\t' => rendered.push_str("\\t"),
        '\r' => rendered.push_str("\\r"),
        ch if ch.is_control() => rendered.push_str(&format!("\\u{:04X}", ch as u32)),
        ch => rendered.push(ch),
    }
}
