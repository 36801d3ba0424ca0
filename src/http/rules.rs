//! Per-request override rules.
//!
//! Rules let one limiter serve request classes with different limits or
//! weights. Each rule matches a path prefix and optionally a set of methods;
//! the most specific (longest) matching prefix wins.

use std::path::Path;

use http::request::Parts;
use http::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SlidegateError};
use crate::ratelimit::RequestOverrides;

/// A single override rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRule {
    /// Path prefix to match, on segment boundaries
    pub path_prefix: String,
    /// Methods to match (if empty, matches any method)
    #[serde(default)]
    pub methods: Vec<String>,
    /// Limit to apply instead of the limiter's default
    #[serde(default)]
    pub requests_limit: Option<u64>,
    /// Weight of each matching request
    #[serde(default)]
    pub increment: Option<u64>,
    /// Exempt matching requests from the limiter
    #[serde(default)]
    pub no_limit: bool,
}

impl OverrideRule {
    fn matches(&self, method: &Method, path: &str) -> bool {
        let method_matches = self.methods.is_empty()
            || self
                .methods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(method.as_str()));

        method_matches && path_matches(&self.path_prefix, path)
    }

    /// The overrides this rule applies.
    pub fn overrides(&self) -> RequestOverrides {
        let mut overrides = RequestOverrides::default();
        if self.no_limit {
            overrides = overrides.no_limit();
        } else if let Some(limit) = self.requests_limit {
            overrides = overrides.with_limit(limit);
        }
        if let Some(increment) = self.increment {
            overrides = overrides.with_increment(increment);
        }
        overrides
    }
}

/// An ordered set of override rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverrideRules {
    pub rules: Vec<OverrideRule>,
}

impl OverrideRules {
    pub fn new(rules: Vec<OverrideRule>) -> Self {
        Self { rules }
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading override rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML sequence.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| SlidegateError::Config(format!("Failed to parse override rules: {}", e)))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find the most specific rule matching a request.
    ///
    /// Among rules of equal prefix length the first listed wins.
    pub fn find_rule(&self, method: &Method, path: &str) -> Option<&OverrideRule> {
        let mut best_match: Option<&OverrideRule> = None;

        for rule in &self.rules {
            if !rule.matches(method, path) {
                continue;
            }
            match best_match {
                Some(best) if best.path_prefix.len() >= rule.path_prefix.len() => {}
                _ => best_match = Some(rule),
            }
        }

        best_match
    }

    /// Overrides for a request; defaults when no rule matches.
    pub fn resolve(&self, parts: &Parts) -> RequestOverrides {
        self.find_rule(&parts.method, parts.uri.path())
            .map(OverrideRule::overrides)
            .unwrap_or_default()
    }
}

/// Whether `path` lies under `prefix`, matching whole segments only.
pub(crate) fn path_matches(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() || prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}
