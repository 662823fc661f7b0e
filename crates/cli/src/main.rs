use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use quarry_core::{ObjectSource, WorldSnapshot, ALL_NAMESPACES};
use quarry_search::cronjob::{cronjob_status, last_schedule_time};
use quarry_search::{Conditions, CronJobSearcher, SearchRequest, Searcher};
use quarry_store::{spawn_ingest, BackendHandle};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "quarryctl", version, about = "Query cached Kubernetes objects")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace (default: all namespaces for search, `default` for get)
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json, Yaml }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Query CronJobs
    #[command(subcommand)]
    Cronjobs(CronJobCmd),
}

#[derive(Subcommand, Debug)]
enum CronJobCmd {
    /// Filter and order CronJobs
    Search {
        /// Condition list, e.g. "status=paused,name~nightly"
        #[arg(long = "where")]
        conditions: Option<String>,
        /// Exact condition KEY=VALUE (repeatable)
        #[arg(long = "match", value_name = "KEY=VALUE")]
        matches: Vec<String>,
        /// Substring condition KEY=VALUE (repeatable)
        #[arg(long = "fuzzy", value_name = "KEY=VALUE")]
        fuzzy: Vec<String>,
        /// Order key: name, namespace, createTime, lastScheduleTime
        #[arg(long = "order-by", default_value = "createTime")]
        order_by: String,
        #[arg(long = "reverse", action = ArgAction::SetTrue)]
        reverse: bool,
        /// Read a JSON List of CronJobs instead of watching the cluster
        #[arg(long = "file")]
        file: Option<PathBuf>,
    },
    /// Fetch one CronJob by name
    Get {
        name: String,
        #[arg(long = "file")]
        file: Option<PathBuf>,
    },
}

impl CronJobCmd {
    fn file(&self) -> Option<&Path> {
        match self {
            CronJobCmd::Search { file, .. } | CronJobCmd::Get { file, .. } => file.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    queue_cap: usize,
    wait_secs: u64,
}

impl Settings {
    fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            queue_cap: get("QUARRY_QUEUE_CAP").and_then(|s| s.parse::<usize>().ok()).unwrap_or(2048),
            wait_secs: get("QUARRY_WAIT_SECS").and_then(|s| s.parse::<u64>().ok()).unwrap_or(8),
        }
    }
}

fn init_tracing() {
    let env = std::env::var("QUARRY_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("QUARRY_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid QUARRY_METRICS_ADDR; expected host:port");
        }
    }
}

/// Fold `--where`, `--match` and `--fuzzy` into one condition set; flags win over `--where`.
fn build_conditions(conditions: Option<&str>, matches: &[String], fuzzy: &[String]) -> Result<Conditions> {
    let mut out = match conditions {
        Some(s) => s.parse::<Conditions>()?,
        None => Conditions::new(),
    };
    for kv in matches {
        let (k, v) = split_pair(kv)?;
        out = out.with_match(k, v);
    }
    for kv in fuzzy {
        let (k, v) = split_pair(kv)?;
        out = out.with_fuzzy(k, v);
    }
    Ok(out)
}

fn split_pair(kv: &str) -> Result<(&str, &str)> {
    match kv.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim(), v)),
        _ => Err(anyhow!("invalid condition `{}`: expected KEY=VALUE", kv)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::Cronjobs(cmd) => {
            let ns = cli.namespace.as_deref();
            match cmd.file() {
                Some(path) => {
                    let items = quarry_kubehub::load_list_file::<CronJob>(path)?;
                    info!(path = %path.display(), count = items.len(), "loaded offline snapshot");
                    let jobs = CronJobSearcher::new(WorldSnapshot::new(1, items));
                    run_cronjobs(&jobs, &cmd, ns, cli.output)?;
                }
                None => {
                    // get without --ns looks in `default`, so only watch that namespace
                    let watch_ns = match &cmd {
                        CronJobCmd::Get { .. } => Some(ns.unwrap_or("default")),
                        CronJobCmd::Search { .. } => ns,
                    };
                    info!(ns = ?watch_ns, "starting cronjob watch");
                    let (ingest_tx, backend) = spawn_ingest::<CronJob>(settings.queue_cap);
                    let watcher_handle = tokio::spawn({
                        let ns = watch_ns.map(|s| s.to_string());
                        let tx = ingest_tx.clone();
                        async move {
                            if let Err(e) = quarry_kubehub::start_watcher::<CronJob>(ns.as_deref(), tx).await {
                                error!(error = ?e, "watcher failed");
                            }
                        }
                    });
                    let primed = quarry_kubehub::prime_list::<CronJob>(watch_ns, &ingest_tx).await;
                    if !await_snapshot(&backend, primed, Duration::from_secs(settings.wait_secs)).await {
                        warn!(wait_secs = settings.wait_secs, "no snapshot published before deadline; results may be empty");
                    }
                    let jobs = CronJobSearcher::new(backend.clone());
                    let out = run_cronjobs(&jobs, &cmd, ns, cli.output);
                    // Graceful shutdown: drop last sender and abort watcher
                    drop(ingest_tx);
                    watcher_handle.abort();
                    out?;
                }
            }
        }
    }

    Ok(())
}

/// Wait until `backend` can answer queries. A finished prime followed by a flush means the
/// snapshot holds the whole list; otherwise fall back to the first epoch the watch produces.
async fn await_snapshot<K>(backend: &BackendHandle<K>, primed: Result<usize>, wait: Duration) -> bool {
    match primed {
        Ok(primed) => {
            if let Some(epoch) = backend.flush().await {
                info!(primed, epoch, "snapshot ready");
                return true;
            }
        }
        Err(e) => warn!(error = %e, "initial list failed; relying on watch stream"),
    }
    backend.wait_first_epoch(wait).await
}

fn run_cronjobs<S: ObjectSource<CronJob>>(jobs: &CronJobSearcher<S>, cmd: &CronJobCmd, ns: Option<&str>, output: Output) -> Result<()> {
    let now = Utc::now();
    match cmd {
        CronJobCmd::Search { conditions, matches, fuzzy, order_by, reverse, .. } => {
            let request = SearchRequest::new(ns.unwrap_or(ALL_NAMESPACES))
                .with_conditions(build_conditions(conditions.as_deref(), matches, fuzzy)?)
                .order_by(order_by.as_str())
                .reverse(*reverse);
            let hits = jobs.search(&request)?;
            info!(hits = hits.len(), "search done");
            let items: Vec<&CronJob> = hits.iter().map(|o| &**o).collect();
            match output {
                Output::Human => print!("{}", render_table(&items, now)),
                Output::Json => println!("{}", serde_json::to_string_pretty(&items)?),
                Output::Yaml => print!("{}", serde_yaml::to_string(&items)?),
            }
        }
        CronJobCmd::Get { name, .. } => {
            let job = jobs.get(ns.unwrap_or("default"), name)?;
            match output {
                Output::Human => print!("{}", render_table(&[&*job], now)),
                Output::Json => println!("{}", serde_json::to_string_pretty(&*job)?),
                Output::Yaml => print!("{}", serde_yaml::to_string(&*job)?),
            }
        }
    }
    Ok(())
}

fn render_table(items: &[&CronJob], now: DateTime<Utc>) -> String {
    let mut out = format!("{:<16} {:<32} {:<8} {:<14} {}\n", "NAMESPACE", "NAME", "STATUS", "LAST SCHEDULE", "AGE");
    for item in items {
        let ns_col = item.metadata.namespace.as_deref().unwrap_or("-");
        let name = item.metadata.name.as_deref().unwrap_or("");
        let last = last_schedule_time(item).map(|t| render_age(t, now)).unwrap_or_else(|| "<none>".to_string());
        let age = item.metadata.creation_timestamp.as_ref().map(|t| render_age(t, now)).unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("{:<16} {:<32} {:<8} {:<14} {}\n", ns_col, name, cronjob_status(item), last, age));
    }
    out
}

fn render_age(ts: &Time, now: DateTime<Utc>) -> String {
    let mut secs = (now - ts.0).num_seconds().max(0) as u64;
    let days = secs / 86_400;
    secs %= 86_400;
    let hours = secs / 3600;
    secs %= 3600;
    let mins = secs / 60;
    secs %= 60;
    if days > 0 {
        format!("{}d{}h", days, hours)
    } else if hours > 0 {
        format!("{}h{}m", hours, mins)
    } else if mins > 0 {
        format!("{}m", mins)
    } else {
        format!("{}s", secs)
    }
}
