#![forbid(unsafe_code)]

use std::time::Duration;

use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use quarry_core::{Delta, DeltaKind, ObjectSource, Uid, Update, ALL_NAMESPACES};
use quarry_store::{spawn_ingest, WorldBuilder};

fn uid(n: u8) -> Uid { wide_uid(n as u16) }

fn wide_uid(n: u16) -> Uid {
    let mut u = [0u8; 16];
    u[..2].copy_from_slice(&n.to_le_bytes());
    u
}

fn applied(n: u16, name: &str, ns: &str) -> Delta<CronJob> {
    Delta { uid: wide_uid(n), kind: DeltaKind::Applied, object: cj(name, ns) }
}

fn cj(name: &str, ns: &str) -> CronJob {
    CronJob {
        metadata: ObjectMeta { name: Some(name.to_string()), namespace: Some(ns.to_string()), ..Default::default() },
        ..Default::default()
    }
}

fn names(v: &[std::sync::Arc<CronJob>]) -> Vec<String> {
    let mut out: Vec<String> = v.iter().map(|o| o.metadata.name.clone().unwrap_or_default()).collect();
    out.sort();
    out
}

#[test]
fn replay_basic_sequence() {
    let mut wb = WorldBuilder::new();

    let deltas = vec![
        Delta { uid: uid(1), kind: DeltaKind::Applied, object: cj("a", "ns") },
        // duplicate add should coalesce at queue normally; here builder just replaces
        Delta { uid: uid(1), kind: DeltaKind::Applied, object: cj("a", "ns") },
        Delta { uid: uid(2), kind: DeltaKind::Applied, object: cj("b", "other") },
        // rename a -> a2
        Delta { uid: uid(1), kind: DeltaKind::Applied, object: cj("a2", "ns") },
        Delta { uid: uid(2), kind: DeltaKind::Deleted, object: cj("b", "other") },
    ];

    // Apply in two batches like ingest would
    wb.apply(deltas[..2].to_vec());
    let snap1 = wb.freeze();
    assert_eq!(snap1.epoch, 1);
    assert_eq!(names(&snap1.list(ALL_NAMESPACES).unwrap()), vec!["a"]);

    wb.apply(deltas[2..].to_vec());
    let snap2 = wb.freeze();
    assert_eq!(snap2.epoch, 2);
    assert_eq!(names(&snap2.list(ALL_NAMESPACES).unwrap()), vec!["a2"]);
    assert!(snap2.get("other", "b").unwrap().is_none());
    assert!(snap2.get("ns", "a2").unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ingest_loop_publishes_snapshots_readable_as_source() {
    let (tx, backend) = spawn_ingest::<CronJob>(64);
    assert!(backend.list(ALL_NAMESPACES).unwrap().is_empty());

    for (i, (name, ns)) in [("backup", "ops"), ("report", "ops"), ("cleanup", "tools")].iter().enumerate() {
        tx.send(Delta { uid: uid(i as u8 + 1), kind: DeltaKind::Applied, object: cj(name, ns) }.into()).await.unwrap();
    }
    assert!(backend.wait_first_epoch(Duration::from_secs(2)).await);
    drop(tx);
    // Allow ingest loop to flush
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(names(&backend.list("ops").unwrap()), vec!["backup", "report"]);
    assert_eq!(names(&backend.list(ALL_NAMESPACES).unwrap()), vec!["backup", "cleanup", "report"]);
    assert!(backend.get("tools", "cleanup").unwrap().is_some());
    assert!(backend.get("ops", "cleanup").unwrap().is_none());
}

#[tokio::test]
async fn wait_first_epoch_times_out_without_deltas() {
    let (_tx, backend) = spawn_ingest::<CronJob>(8);
    assert!(!backend.wait_first_epoch(Duration::from_millis(40)).await);
    assert_eq!(backend.current().epoch, 0);
}

#[test]
fn relist_replaces_objects_missing_from_it() {
    let mut wb = WorldBuilder::new();
    wb.apply(vec![applied(1, "x", "ops"), applied(2, "y", "ops")]);
    wb.replace(vec![applied(2, "y", "ops")]);
    let snap = wb.freeze();
    assert_eq!(names(&snap.list(ALL_NAMESPACES).unwrap()), vec!["y"]);
    assert!(snap.get("ops", "x").unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn flush_waits_for_everything_already_sent() {
    let (tx, backend) = spawn_ingest::<CronJob>(2048);
    tx.send(applied(0, "job-000", "ops").into()).await.unwrap();
    // let the ticker publish a partial snapshot first
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(backend.wait_first_epoch(Duration::from_secs(2)).await);
    for i in 1..500u16 {
        tx.send(applied(i, &format!("job-{i:03}"), "ops").into()).await.unwrap();
    }
    let epoch = backend.flush().await.expect("ingest loop running");
    assert!(epoch >= 1);
    assert_eq!(backend.list(ALL_NAMESPACES).unwrap().len(), 500);
    assert_eq!(backend.current().epoch, epoch);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bursts_beyond_capacity_lose_nothing() {
    let (tx, backend) = spawn_ingest::<CronJob>(4);
    for i in 0..50u16 {
        tx.send(applied(i, &format!("job-{i:02}"), "ops").into()).await.unwrap();
    }
    backend.flush().await.expect("ingest loop running");
    assert_eq!(backend.list("ops").unwrap().len(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watch_restart_relist_evicts_vanished_objects() {
    let (tx, backend) = spawn_ingest::<CronJob>(64);
    tx.send(applied(1, "x", "ops").into()).await.unwrap();
    tx.send(applied(2, "y", "ops").into()).await.unwrap();
    backend.flush().await.expect("ingest loop running");
    assert_eq!(names(&backend.list("ops").unwrap()), vec!["x", "y"]);

    // x was deleted while the watch was down
    tx.send(Update::Relist(vec![applied(2, "y", "ops")])).await.unwrap();
    backend.flush().await.expect("ingest loop running");
    assert_eq!(names(&backend.list("ops").unwrap()), vec!["y"]);
}

#[tokio::test]
async fn flush_after_shutdown_returns_none() {
    let (tx, backend) = spawn_ingest::<CronJob>(8);
    tx.send(applied(1, "x", "ops").into()).await.unwrap();
    drop(tx);
    // the loop publishes on exit, so the data is still visible
    assert!(backend.wait_first_epoch(Duration::from_secs(2)).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(backend.flush().await.is_none());
    assert_eq!(names(&backend.list("ops").unwrap()), vec!["x"]);
}
