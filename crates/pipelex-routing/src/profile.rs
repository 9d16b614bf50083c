use crate::RoutingError;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMatchingMethod {
    ExactMatch,
    PatternMatch,
    Default,
}

impl BackendMatchingMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExactMatch => "exact_match",
            Self::PatternMatch => "pattern_match",
            Self::Default => "default",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendMatch {
    pub model_name: String,
    pub backend_name: String,
    pub routing_profile_name: String,
    pub matching_method: BackendMatchingMethod,
    pub matched_pattern: Option<String>,
    /// Only populated for `Default` matches: the enabled candidates in preference order.
    pub fallback_order: Option<Vec<String>>,
}

/// Model-name to backend-name routes, kept in declaration order.
///
/// Keys are either literal model names or glob patterns (`gpt-*`, `claude-?-*`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteTable {
    entries: Vec<(String, String)>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, backend: impl Into<String>) {
        let key = key.into();
        let backend = backend.into();
        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            entry.1 = backend;
        } else {
            self.entries.push((key, backend));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, backend)| backend.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, backend)| (key.as_str(), backend.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<K, V> FromIterator<(K, V)> for RouteTable
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = RouteTable::new();
        for (key, backend) in iter {
            table.insert(key, backend);
        }
        table
    }
}

impl Serialize for RouteTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, backend) in &self.entries {
            map.serialize_entry(key, backend)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RouteTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RouteTableVisitor;

        impl<'de> Visitor<'de> for RouteTableVisitor {
            type Value = RouteTable;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a table of model name or pattern to backend name")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RouteTable, A::Error> {
                let mut table = RouteTable::new();
                while let Some((key, backend)) = access.next_entry::<String, String>()? {
                    table.insert(key, backend);
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(RouteTableVisitor)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_order: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<RouteTable>,
}

impl RoutingProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_default(mut self, backend: impl Into<String>) -> Self {
        self.default = Some(backend.into());
        self
    }

    pub fn with_fallback_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_order = Some(order.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_route(mut self, key: impl Into<String>, backend: impl Into<String>) -> Self {
        self.routes
            .get_or_insert_with(RouteTable::new)
            .insert(key, backend);
        self
    }

    /// Fails on the first route key that looks like a pattern but does not compile.
    pub fn check_patterns(&self) -> Result<(), RoutingError> {
        let Some(routes) = &self.routes else {
            return Ok(());
        };
        for (key, _) in routes.iter() {
            if is_pattern(key) {
                glob::Pattern::new(key).map_err(|error| RoutingError::InvalidPattern {
                    pattern: key.to_string(),
                    message: error.to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Resolves the backend for `model_name` among `enabled_backends`.
    ///
    /// Order: exact route, first matching pattern route, then `default` followed by
    /// `fallback_order` filtered to enabled backends. `None` when nothing applies.
    pub fn get_backend_match_for_model<S: AsRef<str>>(
        &self,
        enabled_backends: &[S],
        model_name: &str,
    ) -> Option<BackendMatch> {
        let is_enabled =
            |backend: &str| enabled_backends.iter().any(|enabled| enabled.as_ref() == backend);

        if let Some(routes) = &self.routes {
            if let Some(backend) = routes.get(model_name).filter(|backend| is_enabled(backend)) {
                debug!(
                    profile = self.name.as_str(),
                    model = model_name,
                    backend,
                    "exact route match"
                );
                return Some(self.make_match(
                    model_name,
                    backend,
                    BackendMatchingMethod::ExactMatch,
                    None,
                    None,
                ));
            }

            for (pattern, backend) in routes.iter() {
                if !is_pattern(pattern) || !is_enabled(backend) {
                    continue;
                }
                let Ok(compiled) = glob::Pattern::new(pattern) else {
                    continue;
                };
                if compiled.matches(model_name) {
                    debug!(
                        profile = self.name.as_str(),
                        model = model_name,
                        pattern,
                        backend,
                        "pattern route match"
                    );
                    return Some(self.make_match(
                        model_name,
                        backend,
                        BackendMatchingMethod::PatternMatch,
                        Some(pattern.to_string()),
                        None,
                    ));
                }
            }
        }

        let fallback_order = self
            .fallback_order
            .as_deref()
            .filter(|order| !order.is_empty());

        let mut candidates: Vec<&str> = Vec::new();
        if let Some(default) = self.default.as_deref() {
            candidates.push(default);
        }
        if let Some(order) = fallback_order {
            candidates.extend(order.iter().map(String::as_str));
        }

        let mut enabled_candidates: Vec<String> = Vec::new();
        for candidate in candidates {
            if is_enabled(candidate) && !enabled_candidates.iter().any(|seen| seen == candidate) {
                enabled_candidates.push(candidate.to_string());
            }
        }

        let primary = enabled_candidates.first()?.clone();
        let reported_order = match (self.default.as_deref(), fallback_order) {
            // The default is reported as the primary; the fallback list stays as declared.
            (Some(default), Some(order)) if default == primary => order
                .iter()
                .filter(|backend| is_enabled(backend))
                .fold(Vec::new(), |mut acc: Vec<String>, backend| {
                    if !acc.contains(backend) {
                        acc.push(backend.clone());
                    }
                    acc
                }),
            _ => enabled_candidates,
        };

        debug!(
            profile = self.name.as_str(),
            model = model_name,
            backend = primary.as_str(),
            "default routing"
        );
        Some(self.make_match(
            model_name,
            &primary,
            BackendMatchingMethod::Default,
            None,
            Some(reported_order),
        ))
    }

    fn make_match(
        &self,
        model_name: &str,
        backend_name: &str,
        matching_method: BackendMatchingMethod,
        matched_pattern: Option<String>,
        fallback_order: Option<Vec<String>>,
    ) -> BackendMatch {
        BackendMatch {
            model_name: model_name.to_string(),
            backend_name: backend_name.to_string(),
            routing_profile_name: self.name.clone(),
            matching_method,
            matched_pattern,
            fallback_order,
        }
    }
}

fn is_pattern(key: &str) -> bool {
    key.contains(['*', '?', '['])
}
