//! User attributes, claim filters and their conversion into token claims.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::scope::EffectiveScope;

/// Multi-valued user attributes keyed by attribute name.
pub type Attributes = BTreeMap<String, Vec<String>>;

/// Prefix of the pseudo-scopes carrying claim filters.
pub const CLAIM_FILTER_PREFIX: &str = "claim_filter:";

/// Name of the authentication context class attribute.
pub const ACR_ATTRIBUTE: &str = "acr";

/// Restrictions on the values released for individual attributes.
///
/// Requested as `claim_filter:<attribute>:<value>` scope strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimFilters(BTreeMap<String, BTreeSet<String>>);

impl ClaimFilters {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, attribute: impl Into<String>, value: impl Into<String>) {
        self.0
            .entry(attribute.into())
            .or_default()
            .insert(value.into());
    }

    #[must_use]
    pub fn allowed(&self, attribute: &str) -> Option<&BTreeSet<String>> {
        self.0.get(attribute)
    }

    /// Combines filters; filters in `newer` replace those for the same
    /// attribute in `self`.
    #[must_use]
    pub fn merge(&self, newer: &ClaimFilters) -> ClaimFilters {
        let mut merged = self.0.clone();
        for (attribute, values) in &newer.0 {
            merged.insert(attribute.clone(), values.clone());
        }
        ClaimFilters(merged)
    }

    /// Drops attribute values not allowed by a filter.
    pub fn apply(&self, attributes: &mut Attributes) {
        for (name, values) in attributes.iter_mut() {
            if let Some(allowed) = self.0.get(name) {
                values.retain(|v| allowed.contains(v));
            }
        }
        attributes.retain(|_, values| !values.is_empty());
    }

    /// Drops JSON claim values not allowed by a filter.
    pub fn apply_to_claims(&self, claims: &mut Map<String, Value>) {
        for (name, allowed) in &self.0 {
            let Some(value) = claims.get_mut(name) else {
                continue;
            };
            let keep = match value {
                Value::Array(items) => {
                    items.retain(|item| item.as_str().is_some_and(|s| allowed.contains(s)));
                    !items.is_empty()
                }
                Value::String(s) => allowed.contains(s.as_str()),
                _ => false,
            };
            if !keep {
                claims.remove(name);
            }
        }
    }
}

/// Separates claim filter pseudo-scopes from real scopes.
///
/// Malformed filters (missing attribute or value) are dropped.
#[must_use]
pub fn split_claim_filters(requested: &[String]) -> (Vec<String>, ClaimFilters) {
    let mut scopes = Vec::new();
    let mut filters = ClaimFilters::default();
    for scope in requested {
        match scope.strip_prefix(CLAIM_FILTER_PREFIX) {
            Some(rest) => match rest.split_once(':') {
                Some((attribute, value)) if !attribute.is_empty() && !value.is_empty() => {
                    filters.insert(attribute, value);
                }
                _ => tracing::debug!(scope = %scope, "Ignoring malformed claim filter"),
            },
            None => scopes.push(scope.clone()),
        }
    }
    (scopes, filters)
}

/// Keeps only attributes released by the effective scopes, then applies the
/// claim filters.
#[must_use]
pub fn filter_attributes(
    attributes: &Attributes,
    scopes: &[EffectiveScope],
    filters: &ClaimFilters,
) -> Attributes {
    let released: BTreeSet<&str> = scopes
        .iter()
        .flat_map(|s| s.attributes.iter().map(String::as_str))
        .collect();
    let mut filtered: Attributes = attributes
        .iter()
        .filter(|(name, _)| released.contains(name.as_str()))
        .map(|(name, values)| (name.clone(), values.clone()))
        .collect();
    filters.apply(&mut filtered);
    filtered
}

/// Renders attributes as JSON claims: single values become strings,
/// multiple values become arrays.
#[must_use]
pub fn attributes_to_claims(attributes: &Attributes) -> Map<String, Value> {
    attributes
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(name, values)| {
            let value = match values.as_slice() {
                [single] => Value::String(single.clone()),
                many => Value::Array(many.iter().cloned().map(Value::String).collect()),
            };
            (name.clone(), value)
        })
        .collect()
}
