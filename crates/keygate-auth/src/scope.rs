//! Scope registry.
//!
//! Scopes are configured as definitions that carry the attribute names they
//! release. A definition is either an exact name or a pattern: a regular
//! expression whose concrete matches may be requested. Tokens always record
//! the concrete string that was requested, never the pattern itself.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// The OpenID Connect scope.
pub const OPENID_SCOPE: &str = "openid";

/// Scope requesting a refresh token.
pub const OFFLINE_ACCESS_SCOPE: &str = "offline_access";

/// How a definition's name is matched against requested scopes.
#[derive(Debug, Clone)]
pub enum ScopeKind {
    /// The name must be requested verbatim.
    Exact,
    /// The name is a regex; any fully matching string may be requested.
    Pattern(Regex),
}

impl ScopeKind {
    /// Returns `true` for pattern scopes.
    #[must_use]
    pub fn is_pattern(&self) -> bool {
        matches!(self, Self::Pattern(_))
    }
}

/// Scope definition as it appears in configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScopeConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub pattern: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Errors raised while building the registry.
#[derive(Debug, thiserror::Error)]
pub enum ScopeDefinitionError {
    #[error("scope name cannot be empty")]
    EmptyName,

    #[error("scope '{name}' has an invalid pattern: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled scope definition.
#[derive(Debug, Clone)]
pub struct ScopeDefinition {
    pub name: String,
    pub description: String,
    pub attributes: Vec<String>,
    pub kind: ScopeKind,
    pub enabled: bool,
}

impl ScopeDefinition {
    /// Creates an enabled exact scope.
    pub fn exact(name: impl Into<String>, attributes: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            attributes: attributes.iter().map(|a| (*a).to_string()).collect(),
            kind: ScopeKind::Exact,
            enabled: true,
        }
    }

    /// Creates an enabled pattern scope.
    pub fn pattern(
        name: impl Into<String>,
        attributes: &[&str],
    ) -> Result<Self, ScopeDefinitionError> {
        let name = name.into();
        let regex = compile_full_match(&name).map_err(|source| {
            ScopeDefinitionError::InvalidPattern {
                name: name.clone(),
                source,
            }
        })?;
        Ok(Self {
            name,
            description: String::new(),
            attributes: attributes.iter().map(|a| (*a).to_string()).collect(),
            kind: ScopeKind::Pattern(regex),
            enabled: true,
        })
    }

    /// Returns `true` if `requested` is granted by this definition.
    #[must_use]
    pub fn matches(&self, requested: &str) -> bool {
        match &self.kind {
            ScopeKind::Exact => self.name == requested,
            ScopeKind::Pattern(regex) => regex.is_match(requested),
        }
    }
}

impl TryFrom<ScopeConfig> for ScopeDefinition {
    type Error = ScopeDefinitionError;

    fn try_from(config: ScopeConfig) -> Result<Self, Self::Error> {
        if config.name.trim().is_empty() {
            return Err(ScopeDefinitionError::EmptyName);
        }
        let kind = if config.pattern {
            let regex = compile_full_match(&config.name).map_err(|source| {
                ScopeDefinitionError::InvalidPattern {
                    name: config.name.clone(),
                    source,
                }
            })?;
            ScopeKind::Pattern(regex)
        } else {
            ScopeKind::Exact
        };
        Ok(Self {
            name: config.name,
            description: config.description,
            attributes: config.attributes,
            kind,
            enabled: config.enabled,
        })
    }
}

/// A scope as validated for a particular request or token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveScope {
    /// Concrete scope string.
    pub name: String,
    /// Name of the definition it was resolved against.
    pub definition: String,
    /// Attribute names released by the scope.
    pub attributes: Vec<String>,
    /// Whether the scope was derived from a pattern definition.
    pub pattern: bool,
}

/// Ordered collection of scope definitions.
#[derive(Debug, Clone, Default)]
pub struct ScopeRegistry {
    definitions: Vec<ScopeDefinition>,
}

impl ScopeRegistry {
    pub fn new(definitions: Vec<ScopeDefinition>) -> Self {
        Self { definitions }
    }

    /// Compiles configured definitions, preserving their order.
    pub fn from_configs(configs: Vec<ScopeConfig>) -> Result<Self, ScopeDefinitionError> {
        let definitions = configs
            .into_iter()
            .map(ScopeDefinition::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(definitions))
    }

    /// Looks up an enabled definition by its declared name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ScopeDefinition> {
        self.definitions
            .iter()
            .find(|d| d.enabled && d.name == name)
    }

    pub fn definitions(&self) -> &[ScopeDefinition] {
        &self.definitions
    }

    /// Resolves a requested scope string.
    ///
    /// Exact definitions win over patterns; among patterns the first match
    /// in registry order is used.
    #[must_use]
    pub fn resolve(&self, requested: &str) -> Option<EffectiveScope> {
        let enabled = || self.definitions.iter().filter(|d| d.enabled);

        if let Some(def) = enabled().find(|d| !d.kind.is_pattern() && d.name == requested) {
            return Some(EffectiveScope {
                name: requested.to_string(),
                definition: def.name.clone(),
                attributes: def.attributes.clone(),
                pattern: false,
            });
        }

        enabled()
            .find(|d| d.kind.is_pattern() && d.matches(requested))
            .map(|def| EffectiveScope {
                name: requested.to_string(),
                definition: def.name.clone(),
                attributes: def.attributes.clone(),
                pattern: true,
            })
    }

    /// Resolves every requested scope, silently dropping unknown ones and
    /// duplicates.
    pub fn resolve_all<'a, I>(&self, requested: I) -> Vec<EffectiveScope>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut resolved: Vec<EffectiveScope> = Vec::new();
        for scope in requested {
            if resolved.iter().any(|s| &s.name == scope) {
                continue;
            }
            match self.resolve(scope) {
                Some(effective) => resolved.push(effective),
                None => tracing::debug!(scope = %scope, "Dropping unknown scope"),
            }
        }
        resolved
    }
}

/// Returns `true` if `requested` fully matches `pattern` read as a regex.
///
/// An invalid pattern matches nothing.
#[must_use]
pub fn is_subset_of_pattern(requested: &str, pattern: &str) -> bool {
    compile_full_match(pattern)
        .map(|regex| regex.is_match(requested))
        .unwrap_or(false)
}

/// Splits a space-delimited scope parameter.
#[must_use]
pub fn parse_scope_param(scope: Option<&str>) -> Vec<String> {
    scope
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Joins effective scope names into a scope parameter value.
#[must_use]
pub fn join_scopes(scopes: &[EffectiveScope]) -> String {
    scopes
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn compile_full_match(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}
