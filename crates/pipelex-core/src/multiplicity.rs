use crate::PipelexError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

/// How many stuffs a concept reference stands for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    #[default]
    Single,
    /// `Concept[]`
    Variable,
    /// `Concept[N]`
    Exact(NonZeroU32),
}

impl Multiplicity {
    pub fn is_list(self) -> bool {
        !matches!(self, Self::Single)
    }

    pub fn exact_count(self) -> Option<u32> {
        match self {
            Self::Exact(count) => Some(count.get()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConceptWithMultiplicity {
    /// Concept string or bare concept code, without brackets.
    pub concept: String,
    pub multiplicity: Multiplicity,
}

impl ConceptWithMultiplicity {
    pub fn single(concept: impl Into<String>) -> Self {
        Self {
            concept: concept.into(),
            multiplicity: Multiplicity::Single,
        }
    }
}

impl fmt::Display for ConceptWithMultiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.multiplicity {
            Multiplicity::Single => write!(f, "{}", self.concept),
            Multiplicity::Variable => write!(f, "{}[]", self.concept),
            Multiplicity::Exact(count) => write!(f, "{}[{count}]", self.concept),
        }
    }
}

/// Parses `Concept`, `Concept[]` or `Concept[N]` with N a positive integer.
pub fn parse_concept_with_multiplicity(value: &str) -> Result<ConceptWithMultiplicity, PipelexError> {
    let value = value.trim();
    let malformed = |reason: &str| {
        PipelexError::PipeBlueprint(format!(
            "invalid multiplicity notation '{value}': {reason}; expected 'Concept', 'Concept[]' or 'Concept[N]'"
        ))
    };

    let Some(open) = value.find('[') else {
        if value.contains(']') {
            return Err(malformed("unmatched ']'"));
        }
        if value.is_empty() {
            return Err(malformed("missing concept"));
        }
        return Ok(ConceptWithMultiplicity::single(value));
    };

    let concept = value[..open].trim_end();
    if concept.is_empty() {
        return Err(malformed("missing concept before '['"));
    }
    if concept.contains(']') {
        return Err(malformed("unmatched ']'"));
    }
    let rest = &value[open + 1..];
    let Some(close) = rest.find(']') else {
        return Err(malformed("unmatched '['"));
    };
    if !rest[close + 1..].is_empty() {
        return Err(malformed("unexpected characters after ']'"));
    }

    let count = rest[..close].trim();
    let multiplicity = if count.is_empty() {
        Multiplicity::Variable
    } else {
        if !count.chars().all(|c| c.is_ascii_digit()) {
            return Err(malformed("the count must be a positive integer"));
        }
        let parsed = count
            .parse::<u32>()
            .map_err(|_| malformed("the count must be a positive integer"))?;
        let count =
            NonZeroU32::new(parsed).ok_or_else(|| malformed("the count must be a positive integer"))?;
        Multiplicity::Exact(count)
    };

    Ok(ConceptWithMultiplicity {
        concept: concept.to_string(),
        multiplicity,
    })
}
