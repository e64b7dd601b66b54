//! The crawler CLI (spec.md §6): reads the database config file for the
//! given environment, opens the task store, and drives every runnable task
//! concurrently across the configured worker thread pool. Generalizes the
//! teacher's `migux` binary (load config, construct `Master`, run it) to
//! task-executor orchestration instead of listener binding.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;

use wudi_config::{CrawlerConfig, ProxyConfig, parse_database_file, validate_proxy_config};
use wudi_core::TaskExecutor;
use wudi_proxy::broadcast_channel;
use wudi_store::{FileTaskStore, TaskStatus, TaskStore};

#[derive(Debug, Parser)]
#[command(name = "wudi", about = "Distributed phone-number registration crawler")]
struct Cli {
    #[arg(short = 'p', long = "port", default_value_t = 8080)]
    port: u16,

    #[arg(short = 'a', long = "address", default_value = "0.0.0.0")]
    address: String,

    #[arg(short = 't', long = "threads", default_value_t = 15)]
    threads: u8,

    #[arg(short = 'd', long = "db-config", default_value = "database.ini")]
    db_config: PathBuf,

    #[arg(short = 'y', long = "env", default_value = "development")]
    env: String,

    /// Ambient addition: where task records are persisted (stands in for
    /// the external database collaborator per spec.md's Non-goals).
    #[arg(long = "tasks", default_value = "tasks.ndjson")]
    tasks: PathBuf,

    /// Ambient addition: the proxy vendor configuration shared by every
    /// task this process runs.
    #[arg(long = "proxy-config", default_value = "proxy_config.json")]
    proxy_config: PathBuf,

    /// Ambient addition: an optional ini overlay supplying
    /// `checkpoint_every`/`processed_overrun_limit`/`worker_threads`; a
    /// missing file just falls back to the struct defaults.
    #[arg(long = "config", default_value = "wudi.ini")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    utils::init_tracing();
    let cli = Cli::parse();

    let crawler_cfg = CrawlerConfig::from_file_or_default(cli.config.to_str().unwrap_or("wudi.ini")).with_cli_overrides(
        cli.port,
        cli.address,
        cli.threads,
        cli.env.clone(),
        cli.db_config.to_string_lossy().into_owned(),
    );

    // spec.md §5 "a fixed pool of OS threads (default 15)" -> the `-t`
    // flag sizes the multi-threaded runtime directly, rather than relying
    // on `#[tokio::main]`'s CPU-count default.
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(crawler_cfg.worker_threads.max(1) as usize)
        .enable_all()
        .build()?
        .block_on(run(cli, crawler_cfg))
}

async fn run(cli: Cli, crawler_cfg: CrawlerConfig) -> anyhow::Result<()> {
    let db_cfg = parse_database_file(&crawler_cfg.db_config_path, &crawler_cfg.environment)?;
    tracing::info!(environment = %crawler_cfg.environment, db_dns = %db_cfg.db_dns, "loaded database config");

    let proxy_cfg = ProxyConfig::from_file(cli.proxy_config.to_str().unwrap_or("proxy_config.json"))?;

    let report = validate_proxy_config(&proxy_cfg);
    for warning in report.warnings() {
        tracing::warn!(%warning, "proxy config warning");
    }
    if report.has_errors() {
        anyhow::bail!("invalid proxy config:\n{}", report.format());
    }

    let store: Arc<dyn TaskStore> = Arc::new(FileTaskStore::open(&cli.tasks)?);

    let runnable_ids: Vec<u64> = store
        .all_ids()?
        .into_iter()
        .filter(|id| {
            store
                .load(*id)
                .map(|r| matches!(r.status, TaskStatus::NotStarted | TaskStatus::Stopped))
                .unwrap_or(false)
        })
        .collect();

    if runnable_ids.is_empty() {
        tracing::info!("no runnable tasks found in {:?}", cli.tasks);
        return Ok(());
    }

    // One process-wide sender (spec.md §4.2's "global broadcast signal"):
    // every task clones it and subscribes its own receiver, so a proxy
    // batch fetched by one task's repository actually reaches its siblings'
    // instead of being scoped to a single task.
    let (broadcast_tx, _broadcast_rx) = broadcast_channel(64);

    let mut handles = Vec::with_capacity(runnable_ids.len());
    for (worker_id, task_id) in runnable_ids.into_iter().enumerate() {
        let store = Arc::clone(&store);
        let proxy_cfg = proxy_cfg.clone();
        let crawler_cfg = crawler_cfg.clone();
        let stopped = Arc::new(AtomicBool::new(false));
        let broadcast_tx = broadcast_tx.clone();
        handles.push(tokio::spawn(async move {
            let executor = TaskExecutor::new(store, task_id, crawler_cfg)?;
            executor.run(proxy_cfg, worker_id as u64, stopped, broadcast_tx).await
        }));
    }

    for handle in handles {
        match handle.await {
            Ok(Ok(record)) => tracing::info!(task = record.id, status = ?record.status, "task finished"),
            Ok(Err(e)) => tracing::error!(error = %e, "task failed"),
            Err(e) => tracing::error!(error = %e, "task panicked"),
        }
    }

    Ok(())
}
