//! Query inputs: condition sets and search requests.

use std::collections::BTreeMap;
use std::str::FromStr;

use quarry_core::ALL_NAMESPACES;
use serde::{Deserialize, Serialize};

use crate::compare::ORDER_CREATE_TIME;

/// Exact (`matches`) and substring (`fuzzy`) conditions, AND-ed together.
///
/// Parses from `key=value,key~substring` lists, e.g. `status=paused,name~night`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(default)]
    pub matches: BTreeMap<String, String>,
    #[serde(default)]
    pub fuzzy: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid condition `{term}`: {reason}")]
pub struct ConditionParseError {
    pub term: String,
    pub reason: &'static str,
}

impl Conditions {
    pub fn new() -> Self { Self::default() }

    pub fn with_match(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.matches.insert(field.into(), value.into());
        self
    }

    pub fn with_fuzzy(mut self, field: impl Into<String>, substring: impl Into<String>) -> Self {
        self.fuzzy.insert(field.into(), substring.into());
        self
    }

    pub fn is_empty(&self) -> bool { self.matches.is_empty() && self.fuzzy.is_empty() }

    /// Union of both condition sets; on a shared key `other` wins.
    pub fn merged(&self, other: &Conditions) -> Conditions {
        let mut out = self.clone();
        out.matches.extend(other.matches.iter().map(|(k, v)| (k.clone(), v.clone())));
        out.fuzzy.extend(other.fuzzy.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }
}

impl FromStr for Conditions {
    type Err = ConditionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = Conditions::default();
        for term in s.split(',') {
            let term = term.trim();
            if term.is_empty() { continue; }
            let Some(at) = term.find(['=', '~']) else {
                return Err(ConditionParseError { term: term.to_string(), reason: "expected key=value or key~value" });
            };
            let key = term[..at].trim();
            if key.is_empty() {
                return Err(ConditionParseError { term: term.to_string(), reason: "empty field name" });
            }
            let value = term[at + 1..].to_string();
            if term.as_bytes()[at] == b'~' {
                out.fuzzy.insert(key.to_string(), value);
            } else {
                out.matches.insert(key.to_string(), value);
            }
        }
        Ok(out)
    }
}

fn default_order_by() -> String { ORDER_CREATE_TIME.to_string() }

/// One query: namespace (empty for all), conditions, order key and direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub conditions: Conditions,
    #[serde(default = "default_order_by")]
    pub order_by: String,
    #[serde(default)]
    pub reverse: bool,
}

impl Default for SearchRequest {
    fn default() -> Self { Self::new(ALL_NAMESPACES) }
}

impl SearchRequest {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), conditions: Conditions::default(), order_by: default_order_by(), reverse: false }
    }

    pub fn all_namespaces() -> Self { Self::new(ALL_NAMESPACES) }

    pub fn with_conditions(mut self, conditions: Conditions) -> Self { self.conditions = conditions; self }
    pub fn order_by(mut self, key: impl Into<String>) -> Self { self.order_by = key.into(); self }
    pub fn reverse(mut self, reverse: bool) -> Self { self.reverse = reverse; self }
}
