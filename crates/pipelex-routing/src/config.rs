use crate::{RoutingError, RoutingProfile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const BACKENDS_FILE_NAME: &str = "backends.toml";
pub const ROUTING_PROFILES_FILE_NAME: &str = "routing_profiles.toml";
pub const ROUTING_PROFILE_ENV_VAR: &str = "PIPELEX_ROUTING_PROFILE";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,
}

impl BackendsConfig {
    pub fn parse(source: &str, origin: &str) -> Result<Self, RoutingError> {
        toml::from_str(source).map_err(|error| RoutingError::ConfigParse {
            path: origin.to_string(),
            message: error.to_string(),
        })
    }

    pub fn load_from_path(path: &Path) -> Result<Self, RoutingError> {
        let source = read_config(path)?;
        Self::parse(&source, &path.display().to_string())
    }

    pub fn enabled_backends(&self) -> Vec<String> {
        self.backends
            .iter()
            .filter(|(_, backend)| backend.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingProfilesConfig {
    pub active: String,
    #[serde(default)]
    pub profiles: BTreeMap<String, RoutingProfile>,
}

impl RoutingProfilesConfig {
    pub fn parse(source: &str, origin: &str) -> Result<Self, RoutingError> {
        let mut config: Self = toml::from_str(source).map_err(|error| RoutingError::ConfigParse {
            path: origin.to_string(),
            message: error.to_string(),
        })?;
        for (name, profile) in &mut config.profiles {
            profile.name = name.clone();
            profile.check_patterns()?;
        }
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, RoutingError> {
        let source = read_config(path)?;
        Self::parse(&source, &path.display().to_string())
    }

    pub fn profile(&self, name: &str) -> Result<&RoutingProfile, RoutingError> {
        self.profiles
            .get(name)
            .ok_or_else(|| RoutingError::ProfileNotFound(name.to_string()))
    }

    pub fn active_profile(&self) -> Result<&RoutingProfile, RoutingError> {
        self.profile(&self.active)
    }
}

/// Backends and routing profiles loaded from one inference directory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InferenceConfig {
    pub backends: BackendsConfig,
    pub routing: RoutingProfilesConfig,
}

impl InferenceConfig {
    pub fn load_from_dir(dir: &Path) -> Result<Self, RoutingError> {
        let backends = BackendsConfig::load_from_path(&dir.join(BACKENDS_FILE_NAME))?;
        let mut routing =
            RoutingProfilesConfig::load_from_path(&dir.join(ROUTING_PROFILES_FILE_NAME))?;

        if let Ok(profile_override) = std::env::var(ROUTING_PROFILE_ENV_VAR) {
            let profile_override = profile_override.trim();
            if !profile_override.is_empty() {
                debug!(profile = profile_override, "routing profile overridden from env");
                routing.active = profile_override.to_string();
            }
        }

        routing.active_profile()?;
        Ok(Self { backends, routing })
    }

    pub fn enabled_backends(&self) -> Vec<String> {
        self.backends.enabled_backends()
    }

    pub fn active_profile(&self) -> Result<&RoutingProfile, RoutingError> {
        self.routing.active_profile()
    }
}

pub fn backends_file_path(dir: &Path) -> PathBuf {
    dir.join(BACKENDS_FILE_NAME)
}

pub fn routing_profiles_file_path(dir: &Path) -> PathBuf {
    dir.join(ROUTING_PROFILES_FILE_NAME)
}

/// True when both inference config files exist in `dir`.
pub fn check_is_initialized(dir: &Path) -> bool {
    let mut initialized = true;
    for path in [backends_file_path(dir), routing_profiles_file_path(dir)] {
        if !path.is_file() {
            warn!(path = %path.display(), "inference config file is missing");
            initialized = false;
        }
    }
    initialized
}

fn read_config(path: &Path) -> Result<String, RoutingError> {
    std::fs::read_to_string(path).map_err(|error| RoutingError::Io {
        path: path.display().to_string(),
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backends_config_enabled_flags_expected_sorted_enabled_names() {
        let config = BackendsConfig::parse(
            r#"
            [backends.openai]
            enabled = true
            api_key = "${OPENAI_API_KEY}"

            [backends.anthropic]
            enabled = false

            [backends.google]
            enabled = true
            "#,
            "inline",
        )
        .expect("backends should parse");

        assert_eq!(config.enabled_backends(), vec!["google", "openai"]);
        assert!(config.backends["openai"].extra.contains_key("api_key"));
    }

    #[test]
    fn routing_profiles_config_routes_expected_declared_order() {
        let config = RoutingProfilesConfig::parse(
            r#"
            active = "custom"

            [profiles.custom]
            default = "openai"

            [profiles.custom.routes]
            "gpt-*" = "openai"
            "claude-*" = "anthropic"
            "gemini-2.0-flash" = "google"
            "#,
            "inline",
        )
        .expect("routing should parse");

        let profile = config.active_profile().expect("active profile exists");
        assert_eq!(profile.name, "custom");
        let keys: Vec<&str> = profile
            .routes
            .as_ref()
            .expect("routes present")
            .iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec!["gpt-*", "claude-*", "gemini-2.0-flash"]);
    }

    #[test]
    fn routing_profiles_config_unknown_active_expected_profile_not_found() {
        let config = RoutingProfilesConfig::parse("active = \"missing\"\n", "inline")
            .expect("routing should parse");
        let error = config.active_profile().expect_err("profile should be missing");
        assert!(matches!(error, RoutingError::ProfileNotFound(name) if name == "missing"));
    }

    #[test]
    fn routing_profiles_config_bad_pattern_expected_invalid_pattern() {
        let error = RoutingProfilesConfig::parse(
            r#"
            active = "broken"
            [profiles.broken.routes]
            "gpt-[" = "openai"
            "#,
            "inline",
        )
        .expect_err("pattern should be rejected");
        assert!(matches!(error, RoutingError::InvalidPattern { .. }));
    }
}
