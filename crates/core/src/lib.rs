//! Quarry core types: typed watch deltas, frozen snapshots and the list/get contract
//! every query adapter reads from.

#![forbid(unsafe_code)]

use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::Metadata;
use serde::{Deserialize, Serialize};

pub type Uid = [u8; 16];

/// Namespace sentinel meaning "every namespace" (and cluster-scoped objects).
pub const ALL_NAMESPACES: &str = "";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeltaKind {
    Applied,
    Deleted,
}

/// One watch event for a typed object, keyed by `metadata.uid`.
#[derive(Debug, Clone)]
pub struct Delta<K> {
    pub uid: Uid,
    pub kind: DeltaKind,
    pub object: K,
}

/// One message into the cache.
///
/// A `Relist` carries the complete state after a watch restart: anything it does not
/// mention is gone.
#[derive(Debug, Clone)]
pub enum Update<K> {
    Delta(Delta<K>),
    Relist(Vec<Delta<K>>),
}

impl<K> From<Delta<K>> for Update<K> {
    fn from(d: Delta<K>) -> Self { Update::Delta(d) }
}

/// Immutable view of the objects of one kind at a given epoch.
#[derive(Debug)]
pub struct WorldSnapshot<K> {
    pub epoch: u64,
    pub items: Vec<Arc<K>>,
}

impl<K> Default for WorldSnapshot<K> {
    fn default() -> Self { Self { epoch: 0, items: Vec::new() } }
}

impl<K> Clone for WorldSnapshot<K> {
    fn clone(&self) -> Self { Self { epoch: self.epoch, items: self.items.clone() } }
}

impl<K> WorldSnapshot<K> {
    pub fn new(epoch: u64, items: Vec<K>) -> Self {
        Self { epoch, items: items.into_iter().map(Arc::new).collect() }
    }

    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
}

/// Read side of a watch-synchronized cache.
///
/// `list` returns every object visible in `namespace` ([`ALL_NAMESPACES`] for all of them);
/// `get` is a point lookup returning `Ok(None)` when the object does not exist. Errors are
/// the cache's own and are passed through untouched by callers.
pub trait ObjectSource<K>: Send + Sync {
    fn list(&self, namespace: &str) -> anyhow::Result<Vec<Arc<K>>>;
    fn get(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Arc<K>>>;
}

/// True when `meta` belongs to `namespace`, honouring the [`ALL_NAMESPACES`] sentinel.
pub fn in_namespace(meta: &ObjectMeta, namespace: &str) -> bool {
    namespace == ALL_NAMESPACES || meta.namespace.as_deref().unwrap_or("") == namespace
}

impl<K> ObjectSource<K> for WorldSnapshot<K>
where
    K: Metadata<Ty = ObjectMeta> + Send + Sync,
{
    fn list(&self, namespace: &str) -> anyhow::Result<Vec<Arc<K>>> {
        Ok(self.items.iter().filter(|o| in_namespace(o.metadata(), namespace)).cloned().collect())
    }

    fn get(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Arc<K>>> {
        Ok(self
            .items
            .iter()
            .find(|o| {
                let meta = o.metadata();
                meta.name.as_deref() == Some(name) && meta.namespace.as_deref().unwrap_or("") == namespace
            })
            .cloned())
    }
}

impl<K, S> ObjectSource<K> for Arc<S>
where
    S: ObjectSource<K> + ?Sized,
{
    fn list(&self, namespace: &str) -> anyhow::Result<Vec<Arc<K>>> { (**self).list(namespace) }
    fn get(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Arc<K>>> { (**self).get(namespace, name) }
}

pub mod prelude {
    pub use super::{in_namespace, Delta, DeltaKind, ObjectSource, Uid, Update, WorldSnapshot, ALL_NAMESPACES};
}
