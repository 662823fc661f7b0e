//! Shared single-condition predicates over object metadata.
//!
//! Both predicates are case-sensitive and false for absent fields. Multi-valued fields
//! (owner references, `keyword`) hold when any candidate value satisfies the condition.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::fields::MetaField;
use crate::SearchError;

/// `field` equals `value` exactly.
pub fn matches_exact(field: &str, value: &str, meta: &ObjectMeta) -> Result<bool, SearchError> {
    let f = MetaField::parse(field)?;
    Ok(f.values(meta).iter().any(|v| v == value))
}

/// `field` contains `substring`.
pub fn matches_fuzzy(field: &str, substring: &str, meta: &ObjectMeta) -> Result<bool, SearchError> {
    let f = MetaField::parse(field)?;
    Ok(f.values(meta).iter().any(|v| v.contains(substring)))
}
