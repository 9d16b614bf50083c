use crate::PipelexError;
use regex::Regex;
use std::sync::LazyLock;

static INPUT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z][a-z0-9_]*)*$").expect("Invalid input name regex")
});
static SNAKE_CASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("Invalid snake_case regex"));
static PASCAL_CASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Za-z0-9]*$").expect("Invalid PascalCase regex"));

/// `my_input`, `my_input.field_name`, `a.b.c`: snake_case segments joined by single dots.
pub fn is_valid_input_name(name: &str) -> bool {
    INPUT_NAME_RE.is_match(name)
}

pub fn validate_input_name(name: &str) -> Result<(), PipelexError> {
    if is_valid_input_name(name) {
        return Ok(());
    }
    Err(PipelexError::PipeBlueprint(format!(
        "Invalid input name syntax '{name}'. An input name is a snake_case identifier \
         (lowercase letters, digits and underscores, starting with a letter), optionally \
         followed by snake_case segments joined with single dots for nested field access, \
         e.g. 'my_input' or 'my_input.field_name'."
    )))
}

/// The variable part of an input name, before any nested field access.
pub fn input_name_root(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

pub fn is_snake_case(value: &str) -> bool {
    SNAKE_CASE_RE.is_match(value)
}

pub fn is_pascal_case(value: &str) -> bool {
    PASCAL_CASE_RE.is_match(value)
}

pub fn validate_pipe_code(code: &str) -> Result<(), PipelexError> {
    if is_snake_case(code) {
        return Ok(());
    }
    Err(PipelexError::PipeBlueprint(format!(
        "invalid pipe code '{code}': pipe codes must be snake_case"
    )))
}
