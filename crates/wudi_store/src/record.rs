//! The task record (spec.md §3): everything the task executor, the healer,
//! and the (out-of-scope) admin server need to know about one crawl job.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a task, per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    NotStarted,
    Ongoing,
    Stopped,
    Erred,
    Completed,
    AutoStopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: u64,
    pub site_id: u32,
    pub site_address: String,
    pub per_proxy_scan_quota: u32,
    pub total: u64,
    pub processed: u64,
    pub ok_count: u64,
    pub not_ok_count: u64,
    pub unknown_count: u64,
    pub input_path: String,
    pub ok_path: String,
    pub ok2_path: String,
    pub not_ok_path: String,
    pub unknown_path: String,
    pub ip_used: String,
    pub status: TaskStatus,
}

impl TaskRecord {
    /// `processed = ok + not_ok + ok2 + unknown` (spec.md §8 no-loss
    /// invariant), checked at every checkpoint.
    pub fn counts_are_consistent(&self) -> bool {
        self.processed == self.ok_count + self.not_ok_count + self.unknown_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TaskRecord {
        TaskRecord {
            id: 1,
            site_id: 1,
            site_address: "api.passport.pptv.com".into(),
            per_proxy_scan_quota: 0,
            total: 10,
            processed: 3,
            ok_count: 1,
            not_ok_count: 1,
            unknown_count: 1,
            input_path: "in.txt".into(),
            ok_path: "ok.txt".into(),
            ok2_path: "ok2.txt".into(),
            not_ok_path: "not_ok.txt".into(),
            unknown_path: "unknown.txt".into(),
            ip_used: String::new(),
            status: TaskStatus::Ongoing,
        }
    }

    #[test]
    fn consistent_counts_pass() {
        assert!(sample().counts_are_consistent());
    }

    #[test]
    fn inconsistent_counts_fail() {
        let mut record = sample();
        record.processed = 99;
        assert!(!record.counts_are_consistent());
    }
}
