//! Quarry store: coalescing ingest of typed watch deltas and swap-published snapshots.
//!
//! This is the reference list/get cache the query adapters read from. Writers feed
//! [`Update`]s through a channel; readers grab the latest [`WorldSnapshot`] without locking.

#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::Metadata;
use quarry_core::{Delta, DeltaKind, ObjectSource, Uid, Update, WorldSnapshot};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Coalescing queue keyed by UID with FIFO order and fixed capacity.
///
/// A newer delta for a queued UID replaces the older one in place. The ingest loop commits
/// before the queue fills; a direct caller pushing past capacity evicts the oldest UID.
pub struct Coalescer<K> {
    map: FxHashMap<Uid, Delta<K>>,
    order: VecDeque<Uid>,
    cap: usize,
    dropped: u64,
}

impl<K> Coalescer<K> {
    pub fn with_capacity(cap: usize) -> Self {
        Self { map: FxHashMap::default(), order: VecDeque::new(), cap: cap.max(1), dropped: 0 }
    }

    pub fn len(&self) -> usize { self.map.len() }
    pub fn is_empty(&self) -> bool { self.map.is_empty() }
    pub fn is_full(&self) -> bool { self.order.len() >= self.cap }
    pub fn dropped(&self) -> u64 { self.dropped }

    pub fn push(&mut self, d: Delta<K>) {
        let uid = d.uid;
        if !self.map.contains_key(&uid) {
            if self.is_full() {
                if let Some(old) = self.order.pop_front() {
                    self.map.remove(&old);
                    self.dropped += 1;
                    metrics::counter!("store_coalesce_dropped_total", 1);
                    // one warning per queue; the counter tracks the rest
                    if self.dropped == 1 {
                        warn!(cap = self.cap, "coalescer full; evicting oldest deltas");
                    } else {
                        debug!(dropped = self.dropped, "coalescer evicted delta");
                    }
                }
            }
            self.order.push_back(uid);
        }
        self.map.insert(uid, d);
    }

    /// Drain every coalesced delta in arrival order.
    pub fn drain_ready(&mut self) -> Vec<Delta<K>> {
        let mut out = Vec::with_capacity(self.order.len());
        while let Some(uid) = self.order.pop_front() {
            if let Some(d) = self.map.remove(&uid) {
                out.push(d);
            }
        }
        out
    }
}

/// Builds [`WorldSnapshot`]s from batches of deltas.
pub struct WorldBuilder<K> {
    epoch: u64,
    items: Vec<Arc<K>>,
    uids: Vec<Uid>,
    slots: FxHashMap<Uid, usize>,
}

impl<K> Default for WorldBuilder<K> {
    fn default() -> Self { Self::new() }
}

impl<K> WorldBuilder<K> {
    pub fn new() -> Self { Self { epoch: 0, items: Vec::new(), uids: Vec::new(), slots: FxHashMap::default() } }

    pub fn epoch(&self) -> u64 { self.epoch }
    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Apply one batch; every batch advances the epoch by one.
    pub fn apply(&mut self, batch: Vec<Delta<K>>) {
        for d in batch {
            self.apply_one(d);
        }
        self.epoch = self.epoch.saturating_add(1);
    }

    /// Apply a relist: every uid the batch does not apply is removed, then the batch is
    /// applied as usual. Advances the epoch by one.
    pub fn replace(&mut self, batch: Vec<Delta<K>>) {
        let keep: FxHashSet<Uid> = batch.iter().filter(|d| d.kind == DeltaKind::Applied).map(|d| d.uid).collect();
        let stale: Vec<Uid> = self.uids.iter().copied().filter(|u| !keep.contains(u)).collect();
        for uid in &stale {
            self.remove(uid);
        }
        if !stale.is_empty() {
            debug!(removed = stale.len(), "relist dropped stale objects");
        }
        self.apply(batch);
    }

    fn apply_one(&mut self, d: Delta<K>) {
        match d.kind {
            DeltaKind::Applied => {
                let obj = Arc::new(d.object);
                match self.slots.get(&d.uid) {
                    Some(&idx) => self.items[idx] = obj,
                    None => {
                        self.slots.insert(d.uid, self.items.len());
                        self.items.push(obj);
                        self.uids.push(d.uid);
                    }
                }
            }
            DeltaKind::Deleted => self.remove(&d.uid),
        }
    }

    fn remove(&mut self, uid: &Uid) {
        if let Some(idx) = self.slots.remove(uid) {
            self.items.swap_remove(idx);
            self.uids.swap_remove(idx);
            // the former tail now sits at idx
            if let Some(moved) = self.uids.get(idx) {
                self.slots.insert(*moved, idx);
            }
        }
    }

    pub fn freeze(&self) -> Arc<WorldSnapshot<K>> {
        Arc::new(WorldSnapshot { epoch: self.epoch, items: self.items.clone() })
    }
}

/// Handle for readers to access the current snapshot and subscribe to swaps.
pub struct BackendHandle<K> {
    snap: Arc<ArcSwap<WorldSnapshot<K>>>,
    epoch_rx: watch::Receiver<u64>,
    flush_tx: mpsc::Sender<oneshot::Sender<u64>>,
}

impl<K> Clone for BackendHandle<K> {
    fn clone(&self) -> Self {
        Self { snap: Arc::clone(&self.snap), epoch_rx: self.epoch_rx.clone(), flush_tx: self.flush_tx.clone() }
    }
}

impl<K> BackendHandle<K> {
    pub fn current(&self) -> Arc<WorldSnapshot<K>> { self.snap.load_full() }
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_rx.clone() }

    /// Wait until the first non-empty batch has been published or `timeout` elapses.
    /// Returns whether an epoch was observed.
    pub async fn wait_first_epoch(&self, timeout: Duration) -> bool {
        let mut rx = self.subscribe_epoch();
        let deadline = tokio::time::Instant::now() + timeout;
        while *rx.borrow() == 0 {
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => continue,
                // ingest loop gone or deadline hit
                Ok(Err(_)) | Err(_) => return *rx.borrow() > 0,
            }
        }
        true
    }

    /// Publish every update whose send completed before this call, then return the
    /// published epoch. `None` once the ingest loop has stopped (it publishes on exit).
    pub async fn flush(&self) -> Option<u64> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.flush_tx.send(reply_tx).await.ok()?;
        reply_rx.await.ok()
    }
}

impl<K> ObjectSource<K> for BackendHandle<K>
where
    K: Metadata<Ty = ObjectMeta> + Send + Sync,
{
    fn list(&self, namespace: &str) -> anyhow::Result<Vec<Arc<K>>> { self.current().list(namespace) }
    fn get(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Arc<K>>> { self.current().get(namespace, name) }
}

/// State owned by the ingest task.
struct Ingest<K> {
    coalescer: Coalescer<K>,
    builder: WorldBuilder<K>,
    snap: Arc<ArcSwap<WorldSnapshot<K>>>,
    epoch_tx: watch::Sender<u64>,
}

impl<K> Ingest<K> {
    fn accept(&mut self, update: Update<K>) {
        match update {
            Update::Delta(d) => {
                // commit early rather than evict
                if self.coalescer.is_full() {
                    self.commit();
                }
                self.coalescer.push(d);
            }
            Update::Relist(batch) => {
                // queued deltas arrived first, so they land first
                self.commit();
                let n = batch.len();
                self.builder.replace(batch);
                self.publish(n);
            }
        }
    }

    fn commit(&mut self) {
        let batch = self.coalescer.drain_ready();
        if !batch.is_empty() {
            let n = batch.len();
            self.builder.apply(batch);
            self.publish(n);
        }
    }

    fn publish(&self, applied: usize) {
        let next = self.builder.freeze();
        let epoch = next.epoch;
        metrics::gauge!("store_items", next.items.len() as f64);
        metrics::gauge!("store_epoch", epoch as f64);
        debug!(epoch, applied, items = next.items.len(), "snapshot published");
        self.snap.store(next);
        let _ = self.epoch_tx.send(epoch);
    }
}

/// Spawn an ingest loop consuming updates and swapping snapshots. Returns a sender for updates and a handle for reads.
pub fn spawn_ingest<K>(cap: usize) -> (mpsc::Sender<Update<K>>, BackendHandle<K>)
where
    K: Send + Sync + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Update<K>>(cap.max(1));
    let (flush_tx, mut flush_rx) = mpsc::channel::<oneshot::Sender<u64>>(16);
    let snap = Arc::new(ArcSwap::from_pointee(WorldSnapshot::default()));
    let (epoch_tx, epoch_rx) = watch::channel(0u64);

    let mut ingest = Ingest { coalescer: Coalescer::with_capacity(cap), builder: WorldBuilder::new(), snap: Arc::clone(&snap), epoch_tx };
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(8));
        loop {
            tokio::select! {
                maybe = rx.recv() => {
                    match maybe {
                        Some(u) => ingest.accept(u),
                        None => {
                            debug!("update channel closed; draining and exiting ingest loop");
                            ingest.commit();
                            break;
                        }
                    }
                }
                Some(reply) = flush_rx.recv() => {
                    // sends that completed before the flush request are already queued
                    while let Ok(u) = rx.try_recv() {
                        ingest.accept(u);
                    }
                    ingest.commit();
                    let _ = reply.send(ingest.builder.epoch());
                }
                _ = ticker.tick() => ingest.commit(),
            }
        }
        info!(epoch = ingest.builder.epoch(), items = ingest.builder.len(), "ingest loop stopped");
    });

    (tx, BackendHandle { snap, epoch_rx, flush_tx })
}
