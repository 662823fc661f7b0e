//! Shared strict-weak ordering over object metadata.

use std::cmp::Ordering;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

pub const ORDER_NAME: &str = "name";
pub const ORDER_NAMESPACE: &str = "namespace";
pub const ORDER_CREATE_TIME: &str = "createTime";
pub const ORDER_CREATION_TIMESTAMP: &str = "creationTimestamp";

/// Order key used for any key no comparator recognizes.
pub const FALLBACK_ORDER: &str = ORDER_NAME;

/// Strict less-than for `order_by`. Unrecognized keys order by name.
pub fn less_by_metadata(a: &ObjectMeta, b: &ObjectMeta, order_by: &str) -> bool {
    metadata_ordering(a, b, order_by) == Ordering::Less
}

/// Three-way form of [`less_by_metadata`]; `Equal` means order-equivalent for the key.
pub fn metadata_ordering(a: &ObjectMeta, b: &ObjectMeta, order_by: &str) -> Ordering {
    match order_by {
        ORDER_CREATE_TIME | ORDER_CREATION_TIMESTAMP => absent_last(a.creation_timestamp.as_ref(), b.creation_timestamp.as_ref())
            .then_with(|| by_name(a, b)),
        ORDER_NAMESPACE => ns_of(a).cmp(ns_of(b)).then_with(|| by_name(a, b)),
        _ => by_name(a, b),
    }
}

pub fn by_name(a: &ObjectMeta, b: &ObjectMeta) -> Ordering {
    name_of(a).as_bytes().cmp(name_of(b).as_bytes())
}

/// Absent instants sort after every present one (not yet initialized objects go last).
pub fn absent_last(a: Option<&Time>, b: Option<&Time>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.0.cmp(&b.0),
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Absent instants sort before every present one (never happened goes first).
pub fn absent_first(a: Option<&Time>, b: Option<&Time>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.0.cmp(&b.0),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn name_of(m: &ObjectMeta) -> &str { m.name.as_deref().unwrap_or("") }
fn ns_of(m: &ObjectMeta) -> &str { m.namespace.as_deref().unwrap_or("") }
