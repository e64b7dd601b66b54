//! Offline resume-repair utility (spec.md §6): for each `Stopped` task,
//! sort-and-deduplicate its four result bin files, recount them into
//! `processed`, and trim the task's input file down to the untried tail so
//! the crawler can resume it. Grounded in
//! `original_source/healer/healer.cpp`'s `fix_database_problem`, with the
//! external `sort -u` / `tail -n` subprocess calls replaced by in-process
//! file rewrites.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use clap::Parser;

use wudi_config::parse_database_file;
use wudi_store::{FileTaskStore, TaskRecord, TaskStatus, TaskStore};

#[derive(Debug, Parser)]
#[command(name = "wudi_healer", about = "Repairs a stopped task's result files so it can be resumed")]
struct Cli {
    #[arg(short = 'd', long = "db-config", default_value = "database.ini")]
    db_config: String,

    #[arg(short = 'l', long = "env", default_value = "development")]
    env: String,

    /// Comma-separated list ("1,2,3") or inclusive range ("5-9").
    #[arg(short = 't', long = "task-ids")]
    task_ids: String,

    #[arg(long = "tasks", default_value = "tasks.ndjson")]
    tasks: String,
}

fn parse_task_ids(spec: &str) -> anyhow::Result<Vec<u64>> {
    let spec = spec.trim();
    if spec.is_empty() {
        anyhow::bail!("task id is empty");
    }
    if spec.contains(',') {
        spec.split(',').map(|s| s.trim().parse::<u64>().map_err(Into::into)).collect()
    } else if spec.contains('-') {
        let parts: Vec<&str> = spec.split('-').collect();
        if parts.len() != 2 {
            anyhow::bail!("improperly formed range sequence");
        }
        let start: u64 = parts[0].trim().parse()?;
        let end: u64 = parts[1].trim().parse()?;
        Ok(if end >= start {
            (start..=end).collect()
        } else {
            (end..=start).rev().collect()
        })
    } else {
        Ok(vec![spec.parse()?])
    }
}

/// Sorts and deduplicates the lines of `path` in place, returning the
/// deduplicated line count. A missing file counts as zero lines, matching
/// the original's tolerance for a bin file that was never created.
fn dedupe_sort_file(path: &str) -> anyhow::Result<u64> {
    if !Path::new(path).exists() {
        return Ok(0);
    }
    let contents = fs::read_to_string(path)?;
    let lines: BTreeSet<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
    let count = lines.len() as u64;

    let tmp_path = format!("{path}.tmp");
    let mut out = String::with_capacity(contents.len());
    for line in &lines {
        out.push_str(line);
        out.push('\n');
    }
    fs::write(&tmp_path, out)?;
    fs::rename(&tmp_path, path)?;
    Ok(count)
}

/// Rewrites `path` to keep only its last `keep` lines.
fn truncate_to_tail(path: &str, keep: u64) -> anyhow::Result<()> {
    let contents = fs::read_to_string(path)?;
    let all: Vec<&str> = contents.lines().collect();
    let start = all.len().saturating_sub(keep as usize);

    let mut out = all[start..].join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    let tmp_path = format!("{path}.tmp");
    fs::write(&tmp_path, out)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn fix_task(store: &dyn TaskStore, record: &TaskRecord) -> anyhow::Result<()> {
    let ok = dedupe_sort_file(&record.ok_path)?;
    let ok2 = dedupe_sort_file(&record.ok2_path)?;
    let not_ok = dedupe_sort_file(&record.not_ok_path)?;
    let unknown = dedupe_sort_file(&record.unknown_path)?;
    let processed = ok + ok2 + not_ok + unknown;
    tracing::info!(task = record.id, processed, "recounted processed numbers");

    let needed = record.total.saturating_sub(processed);
    truncate_to_tail(&record.input_path, needed)?;

    store.save_progress(record.id, processed, ok, ok2, not_ok, unknown, &record.ip_used)?;
    store.set_status(record.id, TaskStatus::Stopped)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    utils::init_tracing();
    let cli = Cli::parse();

    let db_cfg = parse_database_file(&cli.db_config, &cli.env)?;
    tracing::info!(environment = %cli.env, db_dns = %db_cfg.db_dns, "loaded database config");

    let ids = parse_task_ids(&cli.task_ids)?;
    if ids.is_empty() {
        tracing::warn!("no task is specified, exiting");
        return Ok(());
    }

    let store = FileTaskStore::open(&cli.tasks)?;
    let stopped = store.get_stopped_tasks(&ids)?;
    if stopped.is_empty() {
        tracing::warn!("none of the given task ids are currently Stopped");
        return Ok(());
    }

    for record in &stopped {
        if let Err(e) = fix_task(&store, record) {
            tracing::error!(task = record.id, error = %e, "failed to heal task");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_list() {
        assert_eq!(parse_task_ids("3,1,2").unwrap(), vec![3, 1, 2]);
    }

    #[test]
    fn parses_ascending_range() {
        assert_eq!(parse_task_ids("5-8").unwrap(), vec![5, 6, 7, 8]);
    }

    #[test]
    fn parses_descending_range() {
        assert_eq!(parse_task_ids("8-5").unwrap(), vec![8, 7, 6, 5]);
    }

    #[test]
    fn parses_single_id() {
        assert_eq!(parse_task_ids("42").unwrap(), vec![42]);
    }

    #[test]
    fn rejects_empty_spec() {
        assert!(parse_task_ids("  ").is_err());
    }

    #[test]
    fn dedupe_sort_file_removes_duplicates_and_sorts() {
        let mut path = std::env::temp_dir();
        path.push(format!("wudi_healer_test_{}.txt", std::process::id()));
        fs::write(&path, "b\na\nb\n\na\n").unwrap();
        let count = dedupe_sort_file(path.to_str().unwrap()).unwrap();
        assert_eq!(count, 2);
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "a\nb\n");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn truncate_to_tail_keeps_last_n_lines() {
        let mut path = std::env::temp_dir();
        path.push(format!("wudi_healer_test_tail_{}.txt", std::process::id()));
        fs::write(&path, "1\n2\n3\n4\n5\n").unwrap();
        truncate_to_tail(path.to_str().unwrap(), 2).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "4\n5\n");
        let _ = fs::remove_file(&path);
    }
}
