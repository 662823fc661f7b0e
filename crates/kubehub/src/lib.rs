//! Quarry kubehub: typed list+watch wiring that turns cluster events into store deltas.

#![forbid(unsafe_code)]

use std::fmt::Debug;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use futures::TryStreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, ListParams},
    runtime::watcher::{self, Event},
    Client, Resource, ResourceExt,
};
use quarry_core::{Delta, DeltaKind, Uid, Update};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bounds shared by every kind this crate can list and watch.
pub trait WatchedKind:
    Resource<DynamicType = (), Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug + Send + Sync + 'static
{
}

impl<K> WatchedKind for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug + Send + Sync + 'static
{
}

fn kind_api<K: WatchedKind>(client: Client, namespace: Option<&str>) -> Api<K> {
    match namespace {
        Some(ns) if !ns.is_empty() => Api::namespaced(client, ns),
        _ => Api::all(client),
    }
}

pub fn to_uid(uid_str: &str) -> Result<Uid> {
    let u = Uuid::parse_str(uid_str).context("parsing metadata.uid as uuid")?;
    Ok(*u.as_bytes())
}

/// Build a delta for `obj`, dropping `managedFields` which queries never look at.
pub fn delta_from<K: Resource + Clone>(obj: &K, kind: DeltaKind) -> Result<Delta<K>> {
    let uid_str = obj.meta().uid.as_deref().ok_or_else(|| anyhow!("object missing metadata.uid"))?;
    let uid = to_uid(uid_str)?;
    let mut object = obj.clone();
    object.meta_mut().managed_fields = None;
    Ok(Delta { uid, kind, object })
}

/// One-shot list used to prime the store before the watch stream catches up.
/// Returns the number of deltas sent.
pub async fn prime_list<K: WatchedKind>(namespace: Option<&str>, delta_tx: &mpsc::Sender<Update<K>>) -> Result<usize> {
    let client = Client::try_default().await?;
    let api = kind_api::<K>(client, namespace);
    let list = api.list(&ListParams::default()).await.with_context(|| format!("listing {}", K::kind(&())))?;
    let mut sent = 0usize;
    for o in list.items.iter() {
        let d = delta_from(o, DeltaKind::Applied)?;
        if delta_tx.send(Update::Delta(d)).await.is_err() {
            debug!("delta channel closed during prime");
            break;
        }
        sent += 1;
    }
    metrics::counter!("kubehub_primed_objects_total", sent as u64);
    info!(kind = %K::kind(&()), ns = ?namespace, sent, "prime list done");
    Ok(sent)
}

/// Start list+watch for kind `K` and send updates into the provided channel until the
/// stream ends or the receiver goes away. A watch restart is forwarded as one
/// [`Update::Relist`] so objects deleted while disconnected leave the cache.
pub async fn start_watcher<K: WatchedKind>(namespace: Option<&str>, delta_tx: mpsc::Sender<Update<K>>) -> Result<()> {
    let client = Client::try_default().await?;
    let api = kind_api::<K>(client, namespace);
    let stream = watcher::watcher(api, watcher::Config::default());
    futures::pin_mut!(stream);
    info!(kind = %K::kind(&()), ns = ?namespace, "watcher started");
    while let Some(ev) = stream.try_next().await? {
        let update = update_from_event(ev)?;
        let n = match &update {
            Update::Delta(_) => 1,
            Update::Relist(batch) => batch.len(),
        };
        metrics::counter!("kubehub_watch_events_total", n as u64);
        if delta_tx.send(update).await.is_err() {
            info!("delta receiver dropped; stopping watcher");
            return Ok(());
        }
    }
    warn!("watcher stream ended");
    Ok(())
}

/// Translate one watcher event into a cache update.
pub fn update_from_event<K: Resource + Clone>(ev: Event<K>) -> Result<Update<K>> {
    Ok(match ev {
        Event::Applied(o) => Update::Delta(delta_from(&o, DeltaKind::Applied)?),
        Event::Deleted(o) => Update::Delta(delta_from(&o, DeltaKind::Deleted)?),
        Event::Restarted(list) => {
            debug!(count = list.len(), "watch restart");
            Update::Relist(list.iter().map(|o| delta_from(o, DeltaKind::Applied)).collect::<Result<Vec<_>>>()?)
        }
    })
}

/// Read objects of kind `K` from a JSON file holding either a `List` document
/// (`{"items": [...]}`) or a bare array.
pub fn load_list_file<K: DeserializeOwned>(path: &Path) -> Result<Vec<K>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let doc: serde_json::Value = serde_json::from_slice(&bytes).with_context(|| format!("parsing {} as JSON", path.display()))?;
    let items = match doc {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("items") {
            Some(serde_json::Value::Array(items)) => items,
            _ => return Err(anyhow!("{}: expected a List document with an `items` array", path.display())),
        },
        _ => return Err(anyhow!("{}: expected a JSON array or List document", path.display())),
    };
    let out = items
        .into_iter()
        .enumerate()
        .map(|(i, v)| serde_json::from_value::<K>(v).with_context(|| format!("{}: decoding item {}", path.display(), i)))
        .collect::<Result<Vec<_>>>()?;
    debug!(path = %path.display(), count = out.len(), "loaded list file");
    Ok(out)
}

/// Short display name (`ns/name` or `name`) used in logs and CLI output.
pub fn display_name<K: Resource>(obj: &K) -> String {
    match obj.namespace() {
        Some(ns) => format!("{}/{}", ns, obj.name_any()),
        None => obj.name_any(),
    }
}
