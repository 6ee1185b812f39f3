//! Stats and log aggregator
//!
//! Counts resolved targets for the current campaign and keeps a bounded log of
//! them. Counters reset on every start; the log survives across campaigns and
//! only `restart` clears it. Oldest log entries are evicted first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use provider::TargetId;
use serde::Serialize;
use tracing::warn;

use crate::cooldown::CooldownView;
use crate::queue::{Target, TargetStatus};

/// Per-campaign counters. Skipped targets (permanent rejections) are counted
/// apart from failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub success: u64,
    pub fail: u64,
    pub skipped: u64,
}

impl Stats {
    /// Targets resolved so far, whatever the outcome.
    pub fn resolved(&self) -> u64 {
        self.success + self.fail + self.skipped
    }
}

/// Immutable record of a resolved target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub username: TargetId,
    pub status: TargetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view of the aggregator plus live cooldowns.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub stats: Stats,
    pub logs: Vec<LogEntry>,
    pub cooldowns: Vec<CooldownView>,
}

#[derive(Debug)]
pub struct Journal {
    stats: Stats,
    log: VecDeque<LogEntry>,
    capacity: usize,
}

impl Journal {
    pub fn new(capacity: usize) -> Self {
        Self {
            stats: Stats::default(),
            log: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Count a resolved target and append its log entry.
    ///
    /// Pending targets are not resolutions; they are refused and `None` is
    /// returned.
    pub fn record(&mut self, target: Target) -> Option<&LogEntry> {
        match target.status {
            TargetStatus::Success => self.stats.success += 1,
            TargetStatus::Failed => self.stats.fail += 1,
            TargetStatus::Skipped => self.stats.skipped += 1,
            TargetStatus::Pending => {
                warn!(target = %target.id, "refusing to log a pending target");
                return None;
            }
        }
        if self.log.len() == self.capacity {
            self.log.pop_front();
        }
        self.log.push_back(LogEntry {
            username: target.id,
            status: target.status,
            error: target.reason,
            account: target.account,
            timestamp: Utc::now(),
        });
        self.log.back()
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Log entries in resolution order.
    pub fn logs(&self) -> Vec<LogEntry> {
        self.log.iter().cloned().collect()
    }

    pub fn reset_stats(&mut self) {
        self.stats = Stats::default();
    }

    /// Reset counters and drop every log entry.
    pub fn clear(&mut self) {
        self.stats = Stats::default();
        self.log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(name: &str, status: TargetStatus, reason: Option<&str>) -> Target {
        let mut t = Target::new(TargetId::Username(name.into()));
        t.account = Some("account1".into());
        t.resolve(status, reason.map(str::to_string))
    }

    #[test]
    fn counts_by_status() {
        let mut j = Journal::new(10);
        j.record(resolved("a", TargetStatus::Success, None));
        j.record(resolved("b", TargetStatus::Failed, Some("RPC_CALL_FAIL")));
        j.record(resolved("c", TargetStatus::Skipped, Some("USER_PRIVACY_RESTRICTED")));
        j.record(resolved("d", TargetStatus::Success, None));

        assert_eq!(
            j.stats(),
            Stats {
                success: 2,
                fail: 1,
                skipped: 1
            }
        );
        assert_eq!(j.stats().resolved(), 4);
    }

    #[test]
    fn pending_target_is_refused() {
        let mut j = Journal::new(10);
        assert!(j.record(Target::new(TargetId::Id(1))).is_none());
        assert_eq!(j.stats(), Stats::default());
        assert!(j.logs().is_empty());
    }

    #[test]
    fn log_entry_carries_reason_and_account() {
        let mut j = Journal::new(10);
        let entry = j
            .record(resolved("x", TargetStatus::Skipped, Some("USER_PRIVACY")))
            .unwrap()
            .clone();
        assert_eq!(entry.status, TargetStatus::Skipped);
        assert_eq!(entry.error.as_deref(), Some("USER_PRIVACY"));
        assert_eq!(entry.account.as_deref(), Some("account1"));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["username"], "x");
        assert_eq!(json["status"], "skipped");
    }

    #[test]
    fn success_entry_omits_error() {
        let mut j = Journal::new(10);
        let entry = j.record(resolved("x", TargetStatus::Success, None)).unwrap();
        let json = serde_json::to_value(entry).unwrap();
        assert!(json.get("error").is_none());
    }

    #[test]
    fn oldest_entries_evicted_at_capacity() {
        let mut j = Journal::new(2);
        for name in ["a", "b", "c"] {
            j.record(resolved(name, TargetStatus::Success, None));
        }
        let names: Vec<String> = j.logs().iter().map(|e| e.username.to_string()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(j.stats().success, 3);
    }

    #[test]
    fn reset_stats_keeps_logs() {
        let mut j = Journal::new(10);
        j.record(resolved("a", TargetStatus::Failed, Some("x")));
        j.reset_stats();
        assert_eq!(j.stats(), Stats::default());
        assert_eq!(j.logs().len(), 1);

        j.clear();
        assert!(j.logs().is_empty());
    }
}
