use std::time::Instant;

use chrono::{TimeZone, Utc};
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, CronJobStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use quarry_core::WorldSnapshot;
use quarry_search::{CronJobSearcher, SearchRequest, Searcher, LAST_SCHEDULE_TIME};

fn gen_job(i: usize) -> CronJob {
    let app = match i % 3 {
        0 => "web",
        1 => "api",
        _ => "batch",
    };
    let base = Utc.timestamp_opt(1_577_836_800, 0).single().unwrap_or_default(); // 2020-01-01
    CronJob {
        metadata: ObjectMeta {
            name: Some(format!("job-{i:06}")),
            namespace: Some(format!("ns{}", i % 10)),
            labels: Some([("app".to_string(), app.to_string()), (format!("team{}", i % 20), "1".to_string())].into_iter().collect()),
            creation_timestamp: Some(Time(base + chrono::Duration::seconds((i % 5_000) as i64))),
            ..Default::default()
        },
        spec: Some(CronJobSpec { schedule: "*/15 * * * *".to_string(), suspend: Some(i % 7 == 0), ..Default::default() }),
        // every 11th job has never run
        status: Some(CronJobStatus {
            last_schedule_time: (i % 11 != 0).then(|| Time(base + chrono::Duration::minutes((i % 1_000) as i64))),
            ..Default::default()
        }),
    }
}

fn percentile_us(xs: &mut [u128], p: f64) -> u128 {
    if xs.is_empty() {
        return 0;
    }
    xs.sort_unstable();
    let idx = ((xs.len() as f64 - 1.0) * p).round() as usize;
    xs[idx]
}

fn main() -> anyhow::Result<()> {
    let n: usize = std::env::var("QUARRY_BENCH_DOCS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(100_000);

    eprintln!("building snapshot: {} cronjobs", n);
    let t0 = Instant::now();
    let snap = WorldSnapshot::new(1, (0..n).map(gen_job).collect());
    let build_snap_ms = t0.elapsed().as_secs_f64() * 1_000.0;
    let jobs = CronJobSearcher::new(snap);

    let mut exact: Vec<SearchRequest> = Vec::new();
    for ns in 0..10 {
        exact.push(SearchRequest::new(format!("ns{ns}")).with_conditions("label:app=web,status=running".parse()?));
    }
    let mut fuzzy: Vec<SearchRequest> = Vec::new();
    for step in (0..n).step_by(n.saturating_div(200).max(1)) {
        fuzzy.push(SearchRequest::all_namespaces().with_conditions(format!("name~job-{:04}", step / 100).parse()?));
    }
    let mut ordered: Vec<SearchRequest> = Vec::new();
    for ns in 0..10 {
        ordered.push(SearchRequest::new(format!("ns{ns}")).order_by(LAST_SCHEDULE_TIME).reverse(ns % 2 == 0));
        ordered.push(SearchRequest::new(format!("ns{ns}")).order_by("createTime"));
    }

    let run = |label: &str, reqs: &[SearchRequest]| -> anyhow::Result<()> {
        let mut times: Vec<u128> = Vec::with_capacity(reqs.len());
        let mut hits = 0usize;
        for req in reqs {
            let t = Instant::now();
            hits += jobs.search(req)?.len();
            times.push(t.elapsed().as_micros());
        }
        let p50 = percentile_us(&mut times.clone(), 0.50) as f64 / 1000.0;
        let p99 = percentile_us(&mut times, 0.99) as f64 / 1000.0;
        println!("{}: p50={:.3}ms p99={:.3}ms ({} queries, {} hits)", label, p50, p99, reqs.len(), hits);
        Ok(())
    };

    println!("snapshot_build: {:.1}ms docs={}", build_snap_ms, n);
    run("exact", &exact)?;
    run("fuzzy", &fuzzy)?;
    run("ordered", &ordered)?;
    Ok(())
}
