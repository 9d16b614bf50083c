use crate::{BackendMatch, InferenceConfig, ModelCategory, ModelDeck, RoutingError, RoutingProfile};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutedModel {
    pub model_choice: String,
    pub model_handle: String,
    pub backend: BackendMatch,
}

/// Turns an operator's model choice into a concrete model handle and backend.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelResolver {
    pub deck: ModelDeck,
    pub profile: RoutingProfile,
    pub enabled_backends: Vec<String>,
}

impl ModelResolver {
    pub fn new(deck: ModelDeck, profile: RoutingProfile, enabled_backends: Vec<String>) -> Self {
        Self {
            deck,
            profile,
            enabled_backends,
        }
    }

    pub fn from_config(deck: ModelDeck, config: &InferenceConfig) -> Result<Self, RoutingError> {
        Ok(Self::new(
            deck,
            config.active_profile()?.clone(),
            config.enabled_backends(),
        ))
    }

    pub fn resolve(
        &self,
        category: ModelCategory,
        model_choice: &str,
    ) -> Result<RoutedModel, RoutingError> {
        let model_handle = self.deck.resolve_choice(category, model_choice)?;
        let backend = self
            .profile
            .get_backend_match_for_model(&self.enabled_backends, &model_handle)
            .ok_or_else(|| RoutingError::NoBackendForModel {
                model: model_handle.clone(),
                profile: self.profile.name.clone(),
            })?;
        debug!(
            category = category.as_str(),
            choice = model_choice,
            model = model_handle.as_str(),
            backend = backend.backend_name.as_str(),
            method = backend.matching_method.as_str(),
            "model choice resolved"
        );
        Ok(RoutedModel {
            model_choice: model_choice.to_string(),
            model_handle,
            backend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackendMatchingMethod;

    fn resolver(profile: RoutingProfile, enabled: &[&str]) -> ModelResolver {
        ModelResolver::new(
            ModelDeck::builtin(),
            profile,
            enabled.iter().map(|name| name.to_string()).collect(),
        )
    }

    #[test]
    fn resolve_preset_with_pattern_route_expected_pattern_backend() {
        let profile = RoutingProfile::new("test")
            .with_route("claude-*", "anthropic")
            .with_default("openai");
        let routed = resolver(profile, &["openai", "anthropic"])
            .resolve(ModelCategory::Llm, "$writing-creative")
            .expect("choice should route");

        assert_eq!(routed.model_handle, "claude-4-sonnet");
        assert_eq!(routed.backend.backend_name, "anthropic");
        assert_eq!(
            routed.backend.matching_method,
            BackendMatchingMethod::PatternMatch
        );
    }

    #[test]
    fn resolve_without_any_backend_expected_no_backend_error() {
        let profile = RoutingProfile::new("empty");
        let error = resolver(profile, &["openai"])
            .resolve(ModelCategory::Llm, "gpt-4o")
            .expect_err("nothing routes");
        assert!(matches!(error, RoutingError::NoBackendForModel { .. }));
    }

    #[test]
    fn resolve_unknown_choice_expected_model_choice_not_found() {
        let profile = RoutingProfile::new("test").with_default("openai");
        let error = resolver(profile, &["openai"])
            .resolve(ModelCategory::Extract, "$nope")
            .expect_err("unknown preset");
        assert!(matches!(error, RoutingError::ModelChoiceNotFound(_)));
    }
}
