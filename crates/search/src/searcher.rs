//! The per-kind capability contract.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::Metadata;
use quarry_core::ObjectSource;

use crate::compare::less_by_metadata;
use crate::fields::MetaField;
use crate::predicate::{matches_exact, matches_fuzzy};
use crate::query::{Conditions, SearchRequest};
use crate::SearchError;

/// A kind adapter: point lookup, exact and fuzzy predicates, a strict less-than and the
/// composed search.
///
/// Field resolution is a chain: names listed in [`derived_match_fields`] /
/// [`derived_fuzzy_fields`] are resolved by the adapter itself, everything else goes to the
/// shared metadata predicates. The provided methods cover kinds with no derived fields or
/// order keys; adapters override only what they add.
///
/// [`derived_match_fields`]: Searcher::derived_match_fields
/// [`derived_fuzzy_fields`]: Searcher::derived_fuzzy_fields
pub trait Searcher: Send + Sync {
    type Object: Metadata<Ty = ObjectMeta> + Send + Sync;

    fn source(&self) -> &dyn ObjectSource<Self::Object>;

    /// Short kind name used in logs.
    fn kind(&self) -> &str { std::any::type_name::<Self::Object>() }

    fn derived_match_fields(&self) -> &[&str] { &[] }
    fn derived_fuzzy_fields(&self) -> &[&str] { &[] }

    fn get(&self, namespace: &str, name: &str) -> Result<Arc<Self::Object>, SearchError> {
        self.source()
            .get(namespace, name)?
            .ok_or_else(|| SearchError::NotFound { namespace: namespace.to_string(), name: name.to_string() })
    }

    /// Every exact condition holds (short-circuits on the first miss).
    fn matches(&self, conditions: &BTreeMap<String, String>, item: &Self::Object) -> Result<bool, SearchError> {
        for (k, v) in conditions {
            if !matches_exact(k, v, item.metadata())? { return Ok(false); }
        }
        Ok(true)
    }

    /// Every fuzzy condition holds (short-circuits on the first miss).
    fn fuzzy(&self, conditions: &BTreeMap<String, String>, item: &Self::Object) -> Result<bool, SearchError> {
        for (k, v) in conditions {
            if !matches_fuzzy(k, v, item.metadata())? { return Ok(false); }
        }
        Ok(true)
    }

    /// Strict less-than for `order_by`.
    fn compare(&self, a: &Self::Object, b: &Self::Object, order_by: &str) -> bool {
        less_by_metadata(a.metadata(), b.metadata(), order_by)
    }

    /// Check every condition key resolves before any object is looked at, so a miss on an
    /// earlier condition can never hide a bad field name.
    fn validate(&self, conditions: &Conditions) -> Result<(), SearchError> {
        for k in conditions.matches.keys() {
            if !self.derived_match_fields().contains(&k.as_str()) { MetaField::parse(k)?; }
        }
        for k in conditions.fuzzy.keys() {
            if !self.derived_fuzzy_fields().contains(&k.as_str()) { MetaField::parse(k)?; }
        }
        Ok(())
    }

    fn search(&self, request: &SearchRequest) -> Result<Vec<Arc<Self::Object>>, SearchError>
    where
        Self: Sized,
    {
        crate::engine::search(self, request)
    }
}
