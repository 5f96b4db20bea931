use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::sync::CycleReport;

/// Counters shared between the sync engine and the metrics endpoint.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    cycles_total: AtomicU64,
    cycles_failed: AtomicU64,
    posts_published: AtomicU64,
    groups_duplicate: AtomicU64,
    groups_rejected: AtomicU64,
    messages_recorded: AtomicU64,
    last_cycle_ran: AtomicBool,
    last_cycle_success: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub cycles_total: u64,
    pub cycles_failed: u64,
    pub posts_published: u64,
    pub groups_duplicate: u64,
    pub groups_rejected: u64,
    pub messages_recorded: u64,
    /// `None` until the first cycle has finished.
    pub last_cycle_success: Option<bool>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, report: &CycleReport) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        self.posts_published
            .fetch_add(report.published as u64, Ordering::Relaxed);
        self.groups_duplicate
            .fetch_add(report.duplicates as u64, Ordering::Relaxed);
        self.groups_rejected
            .fetch_add(report.rejected as u64, Ordering::Relaxed);
        self.messages_recorded
            .fetch_add(report.messages_recorded as u64, Ordering::Relaxed);
        self.last_cycle_success.store(true, Ordering::Relaxed);
        self.last_cycle_ran.store(true, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_success.store(false, Ordering::Relaxed);
        self.last_cycle_ran.store(true, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            posts_published: self.posts_published.load(Ordering::Relaxed),
            groups_duplicate: self.groups_duplicate.load(Ordering::Relaxed),
            groups_rejected: self.groups_rejected.load(Ordering::Relaxed),
            messages_recorded: self.messages_recorded.load(Ordering::Relaxed),
            last_cycle_success: self
                .last_cycle_ran
                .load(Ordering::Relaxed)
                .then(|| self.last_cycle_success.load(Ordering::Relaxed)),
        }
    }
}

pub fn format_prometheus(metrics: &SyncMetrics, uptime: Duration) -> String {
    let snapshot = metrics.snapshot();
    let last_success = match snapshot.last_cycle_success {
        Some(true) => 1,
        Some(false) => 0,
        None => -1,
    };

    let series: [(&str, &str, &str, String); 8] = [
        (
            "reposter_uptime_seconds",
            "gauge",
            "Number of seconds the reposter has been running",
            uptime.as_secs().to_string(),
        ),
        (
            "reposter_cycles_total",
            "counter",
            "Sync cycles attempted",
            snapshot.cycles_total.to_string(),
        ),
        (
            "reposter_cycles_failed_total",
            "counter",
            "Sync cycles that ended in an error and were rolled back",
            snapshot.cycles_failed.to_string(),
        ),
        (
            "reposter_posts_published_total",
            "counter",
            "Albums published to the destination channel",
            snapshot.posts_published.to_string(),
        ),
        (
            "reposter_groups_duplicate_total",
            "counter",
            "Fetched groups skipped because their content was already posted",
            snapshot.groups_duplicate.to_string(),
        ),
        (
            "reposter_groups_rejected_total",
            "counter",
            "Fetched groups rejected by the caption filter",
            snapshot.groups_rejected.to_string(),
        ),
        (
            "reposter_messages_recorded_total",
            "counter",
            "Message rows written to the store",
            snapshot.messages_recorded.to_string(),
        ),
        (
            "reposter_last_cycle_success",
            "gauge",
            "1 if the last cycle committed, 0 if it failed, -1 before the first cycle",
            last_success.to_string(),
        ),
    ];

    let mut out = String::new();
    for (name, kind, help, value) in series {
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} {kind}");
        let _ = writeln!(out, "{name} {value}\n");
    }
    out
}
