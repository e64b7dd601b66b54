//! The task executor (spec.md §4.5): owns one task's input/output files and
//! a `ProxyRepository`, spawns `socket_count` socket sessions against them,
//! and drains their results into the four bin files and the task store.
//! Generalizes the teacher's `master::Master` (binds listeners, spawns one
//! `handle_connection` per accepted socket) from serving inbound
//! connections to driving outbound crawl sessions.

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use wudi_config::{CrawlerConfig, ProxyConfig};
use wudi_proxy::{ProxyBatch, ProxyRepository, WorkerId};
use wudi_sites::{Classification, registry};
use wudi_store::{TaskRecord, TaskStatus, TaskStore};

use crate::error::TaskError;
use crate::session::{SessionResult, build_session};
use crate::stream::NumberStream;

/// The process-wide new-proxy broadcast sender every task shares (spec.md
/// §4.2); callers get one from [`wudi_proxy::broadcast_channel`] and clone it
/// per task, so every task's repository subscribes its own receiver off the
/// same sender instead of each task wiring up an isolated channel.
pub type BroadcastSender = broadcast::Sender<ProxyBatch>;

/// The four result bin files a task writes classifications into, opened in
/// append mode with parent directories created up front (spec.md §4.5 step 2).
struct BinFiles {
    ok: File,
    ok2: File,
    not_ok: File,
    unknown: File,
}

impl BinFiles {
    fn open(record: &TaskRecord) -> std::io::Result<Self> {
        Ok(Self {
            ok: open_append(&record.ok_path)?,
            ok2: open_append(&record.ok2_path)?,
            not_ok: open_append(&record.not_ok_path)?,
            unknown: open_append(&record.unknown_path)?,
        })
    }

    fn route(&mut self, classification: Classification, number: &str) -> std::io::Result<()> {
        let file = match classification {
            Classification::Registered => &mut self.ok,
            Classification::Registered2 => &mut self.ok2,
            Classification::NotRegistered => &mut self.not_ok,
            Classification::Unknown => &mut self.unknown,
            Classification::RequestStop => return Ok(()),
        };
        writeln!(file, "{number}")?;
        file.flush()
    }
}

fn open_append(path: &str) -> std::io::Result<File> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Runs one task (spec.md §4.5) to `Completed`, `AutoStopped`, or `Stopped`.
pub struct TaskExecutor {
    store: Arc<dyn TaskStore>,
    record: TaskRecord,
    crawler_cfg: CrawlerConfig,
}

impl TaskExecutor {
    pub fn new(store: Arc<dyn TaskStore>, task_id: u64, crawler_cfg: CrawlerConfig) -> Result<Self, TaskError> {
        let record = store.load(task_id)?;
        Ok(Self { store, record, crawler_cfg })
    }

    /// Runs the task to completion. `stopped` is shared with the caller so
    /// an external request can end the task early (spec.md §5
    /// cancellation); this function also sets it once its own corruption
    /// heuristic or a `RequestStop` classification fires.
    pub async fn run(
        mut self,
        proxy_cfg: ProxyConfig,
        worker_id: WorkerId,
        stopped: Arc<AtomicBool>,
        broadcast_tx: BroadcastSender,
    ) -> Result<TaskRecord, TaskError> {
        let adapter = registry::adapter_for(self.record.site_id).ok_or(TaskError::CorruptInput)?;

        let (number_stream, total) = NumberStream::open(&self.record.input_path)?;
        if total == 0 {
            return Err(TaskError::ZeroTotal);
        }
        self.record.total = total;
        self.store.set_status(self.record.id, TaskStatus::Ongoing)?;

        let number_stream = Arc::new(number_stream);
        let mut bin_files = BinFiles::open(&self.record)?;

        // `broadcast_tx` is the one process-wide sender the caller threads
        // through every task (spec.md §4.2's "global broadcast signal"); a
        // fresh receiver is subscribed here so every task's repository gets
        // every sibling's batches, not just its own.
        let broadcast_rx = broadcast_tx.subscribe();
        let repository = Arc::new(ProxyRepository::new(
            worker_id,
            self.record.site_id,
            proxy_cfg.protocol,
            broadcast_tx,
        ));
        if proxy_cfg.share {
            repository.spawn_broadcast_listener(broadcast_rx);
        } else {
            drop(broadcast_rx);
        }

        let (results_tx, mut results_rx) = mpsc::unbounded_channel::<SessionResult>();
        let mut handles = Vec::with_capacity(proxy_cfg.socket_count as usize);
        for _ in 0..proxy_cfg.socket_count {
            let session = build_session(
                adapter.is_tls(),
                proxy_cfg.protocol,
                Arc::clone(&adapter),
                Arc::clone(&repository),
                Arc::clone(&number_stream),
                proxy_cfg.clone(),
                adapter.port(),
                results_tx.clone(),
                Arc::clone(&stopped),
            );
            handles.push(tokio::spawn(session.run()));
        }
        drop(results_tx);

        let checkpoint_every = if self.crawler_cfg.checkpoint_every > 0 {
            self.crawler_cfg.checkpoint_every as u64
        } else {
            proxy_cfg.socket_count as u64
        }
        .max(1);
        let overrun_limit = self.crawler_cfg.processed_overrun_limit as u64;

        let mut processed = 0u64;
        let mut ok_count = 0u64;
        let mut ok2_count = 0u64;
        let mut not_ok_count = 0u64;
        let mut unknown_count = 0u64;
        let mut auto_stopped = false;

        while let Some(result) = results_rx.recv().await {
            if matches!(result.classification, Classification::RequestStop) {
                warn!(task = self.record.id, "proxy pool exhausted, auto-stopping task");
                auto_stopped = true;
                stopped.store(true, Ordering::SeqCst);
                continue;
            }

            processed += 1;
            match result.classification {
                Classification::Registered => ok_count += 1,
                Classification::Registered2 => ok2_count += 1,
                Classification::NotRegistered => not_ok_count += 1,
                Classification::Unknown => unknown_count += 1,
                Classification::RequestStop => unreachable!("handled above"),
            }
            if let Err(e) = bin_files.route(result.classification, &result.number) {
                warn!(task = self.record.id, error = %e, "failed to write result bin file");
            }

            if processed % checkpoint_every == 0 {
                self.checkpoint(processed, ok_count, ok2_count, not_ok_count, unknown_count)?;
            }

            if processed > total + overrun_limit {
                warn!(task = self.record.id, processed, total, "processed exceeds total + slack, auto-stopping");
                auto_stopped = true;
                stopped.store(true, Ordering::SeqCst);
            } else if processed >= total {
                number_stream.close();
            }
        }

        for handle in handles {
            let _ = handle.await;
        }

        self.checkpoint(processed, ok_count, ok2_count, not_ok_count, unknown_count)?;

        let final_status = if auto_stopped {
            TaskStatus::AutoStopped
        } else if stopped.load(Ordering::SeqCst) {
            TaskStatus::Stopped
        } else {
            TaskStatus::Completed
        };
        self.store.set_status(self.record.id, final_status)?;
        if final_status == TaskStatus::Completed {
            if let Err(e) = fs::remove_file(&self.record.input_path) {
                warn!(task = self.record.id, error = %e, "failed to delete completed input file");
            }
        }
        info!(task = self.record.id, ?final_status, processed, total, "task run finished");

        self.record.processed = processed;
        self.record.ok_count = ok_count + ok2_count;
        self.record.not_ok_count = not_ok_count;
        self.record.unknown_count = unknown_count;
        self.record.status = final_status;
        Ok(self.record)
    }

    fn checkpoint(
        &self,
        processed: u64,
        ok_count: u64,
        ok2_count: u64,
        not_ok_count: u64,
        unknown_count: u64,
    ) -> Result<(), TaskError> {
        self.store
            .save_progress(
                self.record.id,
                processed,
                ok_count,
                ok2_count,
                not_ok_count,
                unknown_count,
                &self.record.ip_used,
            )
            .map_err(TaskError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    use wudi_config::ProxyProtocol;
    use wudi_store::FileTaskStore;

    fn tempdir() -> std::path::PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let mut dir = std::env::temp_dir();
        let unique = format!(
            "wudi_core_executor_test_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        dir.push(unique);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Never dialable: `run` should fail on an empty input before it ever
    /// reaches a proxy, so this config's addresses are never touched.
    fn unreachable_proxy_config() -> ProxyConfig {
        ProxyConfig {
            host: "http://127.0.0.1:1/extract".into(),
            target: "http://127.0.0.1:1/quota".into(),
            count_target: "http://127.0.0.1:1/count".into(),
            username: "user".into(),
            password: "pass".into(),
            share: false,
            socket_count: 1,
            per_fetch: 1,
            protocol: ProxyProtocol::Http,
            fetch_interval: 120,
        }
    }

    fn sample_record(dir: &Path, id: u64) -> TaskRecord {
        TaskRecord {
            id,
            site_id: 1,
            site_address: "api.passport.pptv.com".into(),
            per_proxy_scan_quota: 0,
            total: 0,
            processed: 0,
            ok_count: 0,
            not_ok_count: 0,
            unknown_count: 0,
            input_path: dir.join(format!("task-{id}-in.txt")).to_string_lossy().into_owned(),
            ok_path: dir.join(format!("task-{id}-ok.txt")).to_string_lossy().into_owned(),
            ok2_path: dir.join(format!("task-{id}-ok2.txt")).to_string_lossy().into_owned(),
            not_ok_path: dir.join(format!("task-{id}-not_ok.txt")).to_string_lossy().into_owned(),
            unknown_path: dir.join(format!("task-{id}-unknown.txt")).to_string_lossy().into_owned(),
            ip_used: String::new(),
            status: TaskStatus::NotStarted,
        }
    }

    #[tokio::test]
    async fn empty_input_fails_fast_without_starting_any_session() {
        let dir = tempdir();
        let record = sample_record(&dir, 1);
        fs::write(&record.input_path, "").unwrap();

        let store: Arc<dyn TaskStore> = Arc::new(FileTaskStore::open(dir.join("tasks.ndjson")).unwrap());
        store.insert(record).unwrap();

        let executor = TaskExecutor::new(Arc::clone(&store), 1, CrawlerConfig::default()).unwrap();
        let stopped = Arc::new(AtomicBool::new(false));
        let (broadcast_tx, _rx) = broadcast::channel(8);
        let result = executor.run(unreachable_proxy_config(), 0, stopped, broadcast_tx).await;

        assert!(matches!(result, Err(TaskError::ZeroTotal)));
        // `run` bails before flipping the status, so a caller can retry once
        // the input file is fixed up.
        assert_eq!(store.load(1).unwrap().status, TaskStatus::NotStarted);
    }

    #[tokio::test]
    async fn checkpoint_writes_counts_through_to_the_store() {
        let dir = tempdir();
        let record = sample_record(&dir, 2);
        let store: Arc<dyn TaskStore> = Arc::new(FileTaskStore::open(dir.join("tasks.ndjson")).unwrap());
        store.insert(record).unwrap();

        let executor = TaskExecutor::new(Arc::clone(&store), 2, CrawlerConfig::default()).unwrap();
        executor.checkpoint(10, 4, 1, 3, 2).unwrap();

        let loaded = store.load(2).unwrap();
        assert_eq!(loaded.processed, 10);
        assert_eq!(loaded.ok_count, 5);
        assert_eq!(loaded.not_ok_count, 3);
        assert_eq!(loaded.unknown_count, 2);
    }
}
