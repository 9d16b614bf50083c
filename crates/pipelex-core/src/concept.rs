use crate::{PipelexError, is_pascal_case, is_snake_case};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const NATIVE_DOMAIN: &str = "native";
pub const DEFAULT_STRUCTURE_CLASS_NAME: &str = "TextContent";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NativeConceptCode {
    Text,
    Image,
    Pdf,
    Number,
    TextAndImages,
    Anything,
    Dynamic,
    Page,
}

impl NativeConceptCode {
    pub const ALL: [NativeConceptCode; 8] = [
        Self::Text,
        Self::Image,
        Self::Pdf,
        Self::Number,
        Self::TextAndImages,
        Self::Anything,
        Self::Dynamic,
        Self::Page,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Image => "Image",
            Self::Pdf => "Pdf",
            Self::Number => "Number",
            Self::TextAndImages => "TextAndImages",
            Self::Anything => "Anything",
            Self::Dynamic => "Dynamic",
            Self::Page => "Page",
        }
    }

    pub fn structure_class_name(self) -> &'static str {
        match self {
            Self::Text => "TextContent",
            Self::Image => "ImageContent",
            Self::Pdf => "PDFContent",
            Self::Number => "NumberContent",
            Self::TextAndImages => "TextAndImagesContent",
            Self::Anything => "StuffContent",
            Self::Dynamic => "DynamicContent",
            Self::Page => "PageContent",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Text => "A text",
            Self::Image => "An image",
            Self::Pdf => "A PDF document",
            Self::Number => "A number",
            Self::TextAndImages => "Some text and images",
            Self::Anything => "Anything",
            Self::Dynamic => "A dynamically typed value",
            Self::Page => "A page of a document, with its text, images and a rendered view",
        }
    }

    pub fn concept_string(self) -> String {
        format!("{NATIVE_DOMAIN}.{}", self.as_str())
    }

    /// Concepts of these codes accept any other concept.
    pub fn accepts_anything(self) -> bool {
        matches!(self, Self::Anything | Self::Dynamic)
    }

    /// Accepts `Text` or `native.Text` and returns `native.Text`; `None` for anything else.
    pub fn get_validated_native_concept_string(value: &str) -> Option<String> {
        let code = match value.split_once('.') {
            Some((NATIVE_DOMAIN, code)) => code,
            Some(_) => return None,
            None => value,
        };
        code.parse::<NativeConceptCode>()
            .ok()
            .map(NativeConceptCode::concept_string)
    }
}

impl FromStr for NativeConceptCode {
    type Err = PipelexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == value)
            .ok_or_else(|| {
                PipelexError::ConceptString(format!("'{value}' is not a native concept code"))
            })
    }
}

impl fmt::Display for NativeConceptCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fails unless `value` is `domain.ConceptCode` with a snake_case domain and a PascalCase
/// code. Codes in the native domain must be native concept codes.
pub fn validate_concept_string(value: &str) -> Result<(), PipelexError> {
    let grammar = "expected 'domain.ConceptCode' with a snake_case domain and a PascalCase code";
    let Some((domain, code)) = value.split_once('.') else {
        return Err(PipelexError::ConceptString(format!(
            "concept string '{value}' has no domain: {grammar}"
        )));
    };
    if code.contains('.') {
        return Err(PipelexError::ConceptString(format!(
            "concept string '{value}' must contain exactly one dot: {grammar}"
        )));
    }
    if !is_snake_case(domain) {
        return Err(PipelexError::ConceptString(format!(
            "concept string '{value}' has an invalid domain '{domain}': {grammar}"
        )));
    }
    if !is_pascal_case(code) {
        return Err(PipelexError::ConceptString(format!(
            "concept string '{value}' has an invalid concept code '{code}': {grammar}"
        )));
    }
    if domain == NATIVE_DOMAIN && code.parse::<NativeConceptCode>().is_err() {
        return Err(PipelexError::ConceptString(format!(
            "concept string '{value}' is in the native domain but '{code}' is not a native concept"
        )));
    }
    Ok(())
}

pub fn validate_concept_code(code: &str) -> Result<(), PipelexError> {
    if is_pascal_case(code) {
        return Ok(());
    }
    Err(PipelexError::ConceptString(format!(
        "concept code '{code}' must be PascalCase"
    )))
}

/// Accepts either a full concept string or a bare PascalCase concept code.
pub fn validate_concept_string_or_code(value: &str) -> Result<(), PipelexError> {
    if value.contains('.') {
        validate_concept_string(value)
    } else {
        validate_concept_code(value)
    }
}

pub fn make_concept_string_with_domain(domain: &str, concept_code: &str) -> String {
    format!("{domain}.{concept_code}")
}

/// Turns a concept reference found in `domain` into a full concept string. Bare native codes
/// belong to the native domain; other bare codes belong to `domain`.
pub fn resolve_concept_string(domain: &str, concept_string_or_code: &str) -> String {
    if concept_string_or_code.contains('.') {
        return concept_string_or_code.to_string();
    }
    if concept_string_or_code.parse::<NativeConceptCode>().is_ok() {
        return make_concept_string_with_domain(NATIVE_DOMAIN, concept_string_or_code);
    }
    make_concept_string_with_domain(domain, concept_string_or_code)
}

pub fn is_native_concept_string(concept_string: &str) -> bool {
    concept_string
        .split_once('.')
        .is_some_and(|(domain, _)| domain == NATIVE_DOMAIN)
}

/// A concept as declared in a bundle, before it is bound to a domain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConceptBlueprint {
    #[serde(alias = "definition")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refines: Option<String>,
}

impl ConceptBlueprint {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_structure(mut self, structure: impl Into<String>) -> Self {
        self.structure = Some(structure.into());
        self
    }

    pub fn with_refines(mut self, refines: impl Into<String>) -> Self {
        self.refines = Some(refines.into());
        self
    }

    pub fn validate(&self) -> Result<(), PipelexError> {
        if self.structure.is_some() && self.refines.is_some() {
            return Err(PipelexError::ConceptString(format!(
                "concept '{}' cannot declare both 'structure' and 'refines'",
                self.description
            )));
        }
        if let Some(refines) = &self.refines {
            validate_concept_string_or_code(refines)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub code: String,
    pub domain: String,
    pub description: String,
    pub structure_class_name: String,
    /// Full concept string of the refined concept.
    pub refines: Option<String>,
}

impl Concept {
    pub fn native(code: NativeConceptCode) -> Self {
        Self {
            code: code.as_str().to_string(),
            domain: NATIVE_DOMAIN.to_string(),
            description: code.description().to_string(),
            structure_class_name: code.structure_class_name().to_string(),
            refines: None,
        }
    }

    pub fn from_blueprint(
        domain: &str,
        code: &str,
        blueprint: &ConceptBlueprint,
    ) -> Result<Self, PipelexError> {
        if !is_snake_case(domain) {
            return Err(PipelexError::ConceptString(format!(
                "domain '{domain}' of concept '{code}' must be snake_case"
            )));
        }
        validate_concept_code(code)?;
        blueprint.validate()?;
        if let Ok(native) = code.parse::<NativeConceptCode>() {
            return Ok(Self::native(native));
        }

        let refines = blueprint
            .refines
            .as_deref()
            .map(|refines| resolve_concept_string(domain, refines));
        let structure_class_name = match (&blueprint.structure, &refines) {
            (Some(structure), _) => structure.clone(),
            (None, Some(refines)) => native_code_of(refines)
                .map(|native| native.structure_class_name().to_string())
                .unwrap_or_else(|| DEFAULT_STRUCTURE_CLASS_NAME.to_string()),
            (None, None) => DEFAULT_STRUCTURE_CLASS_NAME.to_string(),
        };

        Ok(Self {
            code: code.to_string(),
            domain: domain.to_string(),
            description: blueprint.description.clone(),
            structure_class_name,
            refines,
        })
    }

    pub fn concept_string(&self) -> String {
        make_concept_string_with_domain(&self.domain, &self.code)
    }

    pub fn is_native(&self) -> bool {
        self.domain == NATIVE_DOMAIN
    }

    pub fn native_code(&self) -> Option<NativeConceptCode> {
        if !self.is_native() {
            return None;
        }
        self.code.parse().ok()
    }

    /// Compatibility of `a` as a provider for `b`.
    ///
    /// Identical concepts are always compatible. Relaxed matching also accepts a shared
    /// `refines` target or a shared structure. Strict matching only follows `a`'s direct
    /// refinement; see `ConceptLibrary::is_compatible` for the transitive form.
    pub fn are_concept_compatible(a: &Concept, b: &Concept, strict: bool) -> bool {
        if a.domain == b.domain && a.code == b.code {
            return true;
        }
        let b_string = b.concept_string();
        if a.refines.as_deref() == Some(b_string.as_str()) {
            return true;
        }
        if strict {
            return false;
        }
        if a.refines.is_some() && a.refines == b.refines {
            return true;
        }
        a.structure_class_name == b.structure_class_name
    }
}

pub(crate) fn native_code_of(concept_string: &str) -> Option<NativeConceptCode> {
    match concept_string.split_once('.') {
        Some((NATIVE_DOMAIN, code)) => code.parse().ok(),
        _ => None,
    }
}
