use crate::RoutingError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCategory {
    Llm,
    ImgGen,
    Extract,
}

impl ModelCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::ImgGen => "img_gen",
            Self::Extract => "extract",
        }
    }
}

/// Named model choices: `$preset` entries per category, aliases and known model handles.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDeck {
    #[serde(default)]
    pub llm_presets: BTreeMap<String, String>,
    #[serde(default)]
    pub img_gen_presets: BTreeMap<String, String>,
    #[serde(default)]
    pub extract_presets: BTreeMap<String, String>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub models: BTreeSet<String>,
}

impl ModelDeck {
    pub fn parse(source: &str, origin: &str) -> Result<Self, RoutingError> {
        toml::from_str(source).map_err(|error| RoutingError::ConfigParse {
            path: origin.to_string(),
            message: error.to_string(),
        })
    }

    pub fn load_from_path(path: &Path) -> Result<Self, RoutingError> {
        let source = std::fs::read_to_string(path).map_err(|error| RoutingError::Io {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
        Self::parse(&source, &path.display().to_string())
    }

    /// The deck shipped with the library; covers every operator skill.
    pub fn builtin() -> Self {
        let llm_presets = [
            ("writing-factual", "gpt-4o"),
            ("writing-creative", "claude-4-sonnet"),
            ("retrieval", "gpt-4o-mini"),
            ("reasoning", "claude-4-opus"),
            ("engineering-code", "claude-4-sonnet"),
            ("engineering-structured", "gpt-4o"),
            ("vision-describe", "gemini-2.5-pro"),
        ];
        let img_gen_presets = [
            ("gen-image", "flux-pro"),
            ("gen-image-fast", "flux-schnell"),
            ("gen-image-high-quality", "gpt-image-1"),
        ];
        let extract_presets = [
            ("extract-text-from-visuals", "mistral-ocr"),
            ("extract-text-from-pdf", "pypdfium2-extract-text"),
        ];
        let aliases = [("best-claude", "claude-4-opus"), ("base-gpt", "gpt-4o")];

        let to_map = |entries: &[(&str, &str)]| -> BTreeMap<String, String> {
            entries
                .iter()
                .map(|(name, handle)| (name.to_string(), handle.to_string()))
                .collect()
        };

        let mut deck = Self {
            llm_presets: to_map(&llm_presets),
            img_gen_presets: to_map(&img_gen_presets),
            extract_presets: to_map(&extract_presets),
            aliases: to_map(&aliases),
            models: BTreeSet::new(),
        };
        let handles: Vec<String> = deck
            .llm_presets
            .values()
            .chain(deck.img_gen_presets.values())
            .chain(deck.extract_presets.values())
            .chain(deck.aliases.values())
            .cloned()
            .collect();
        deck.models.extend(handles);
        deck
    }

    pub fn presets(&self, category: ModelCategory) -> &BTreeMap<String, String> {
        match category {
            ModelCategory::Llm => &self.llm_presets,
            ModelCategory::ImgGen => &self.img_gen_presets,
            ModelCategory::Extract => &self.extract_presets,
        }
    }

    /// Resolves a model choice to a model handle.
    ///
    /// `$name` looks up the category presets; anything else is tried as an alias and then as
    /// a known model handle.
    pub fn resolve_choice(
        &self,
        category: ModelCategory,
        choice: &str,
    ) -> Result<String, RoutingError> {
        let choice = choice.trim();
        if let Some(preset) = choice.strip_prefix('$') {
            return self
                .presets(category)
                .get(preset)
                .cloned()
                .ok_or_else(|| RoutingError::ModelChoiceNotFound(choice.to_string()));
        }
        if let Some(handle) = self.aliases.get(choice) {
            return Ok(handle.clone());
        }
        if self.models.contains(choice) {
            return Ok(choice.to_string());
        }
        Err(RoutingError::ModelChoiceNotFound(choice.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_choice_preset_expected_handle() {
        let deck = ModelDeck::builtin();
        assert_eq!(
            deck.resolve_choice(ModelCategory::Llm, "$writing-factual")
                .expect("preset resolves"),
            "gpt-4o"
        );
    }

    #[test]
    fn resolve_choice_preset_from_other_category_expected_not_found() {
        let deck = ModelDeck::builtin();
        let error = deck
            .resolve_choice(ModelCategory::ImgGen, "$writing-factual")
            .expect_err("llm preset is not an img_gen preset");
        assert!(matches!(error, RoutingError::ModelChoiceNotFound(_)));
    }

    #[test]
    fn resolve_choice_alias_and_handle_expected_handle() {
        let deck = ModelDeck::builtin();
        assert_eq!(
            deck.resolve_choice(ModelCategory::Llm, "best-claude")
                .expect("alias resolves"),
            "claude-4-opus"
        );
        assert_eq!(
            deck.resolve_choice(ModelCategory::Llm, "gpt-4o-mini")
                .expect("handle resolves"),
            "gpt-4o-mini"
        );
    }

    #[test]
    fn parse_deck_toml_expected_presets_loaded() {
        let deck = ModelDeck::parse(
            r#"
            models = ["local-llama"]

            [llm_presets]
            cheap = "local-llama"
            "#,
            "inline",
        )
        .expect("deck should parse");
        assert_eq!(
            deck.resolve_choice(ModelCategory::Llm, "$cheap")
                .expect("preset resolves"),
            "local-llama"
        );
    }
}
