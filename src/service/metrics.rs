use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between the engine, the dispatcher and the cleanup timer.
#[derive(Debug)]
pub struct EngineMetrics {
    started_at: DateTime<Utc>,
    quotes_ingested: AtomicU64,
    quotes_rejected: AtomicU64,
    comparisons: AtomicU64,
    opportunities_detected: AtomicU64,
    opportunities_dropped: AtomicU64,
    opportunities_published: AtomicU64,
    publish_failures: AtomicU64,
    persist_failures: AtomicU64,
    entries_purged: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub quotes_ingested: u64,
    pub quotes_rejected: u64,
    pub comparisons: u64,
    pub opportunities_detected: u64,
    pub opportunities_dropped: u64,
    pub opportunities_published: u64,
    pub publish_failures: u64,
    pub persist_failures: u64,
    pub entries_purged: u64,
    pub taken_at: DateTime<Utc>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            quotes_ingested: AtomicU64::new(0),
            quotes_rejected: AtomicU64::new(0),
            comparisons: AtomicU64::new(0),
            opportunities_detected: AtomicU64::new(0),
            opportunities_dropped: AtomicU64::new(0),
            opportunities_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            entries_purged: AtomicU64::new(0),
        }
    }

    pub fn record_ingested(&self) {
        self.quotes_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.quotes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_comparisons(&self, count: u64) {
        self.comparisons.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_detected(&self) {
        self.opportunities_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.opportunities_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.opportunities_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_purged(&self, count: u64) {
        self.entries_purged.fetch_add(count, Ordering::Relaxed);
    }

    pub fn opportunities_dropped(&self) -> u64 {
        self.opportunities_dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = Utc::now();
        MetricsSnapshot {
            uptime_seconds: now.signed_duration_since(self.started_at).num_seconds().max(0) as u64,
            quotes_ingested: self.quotes_ingested.load(Ordering::Relaxed),
            quotes_rejected: self.quotes_rejected.load(Ordering::Relaxed),
            comparisons: self.comparisons.load(Ordering::Relaxed),
            opportunities_detected: self.opportunities_detected.load(Ordering::Relaxed),
            opportunities_dropped: self.opportunities_dropped.load(Ordering::Relaxed),
            opportunities_published: self.opportunities_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            entries_purged: self.entries_purged.load(Ordering::Relaxed),
            taken_at: now,
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSnapshot {
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Arbitrage Detector Metrics ===\n");
        report.push_str(&format!("Uptime: {} seconds\n", self.uptime_seconds));
        report.push_str(&format!(
            "Quotes: {} ingested, {} rejected\n",
            self.quotes_ingested, self.quotes_rejected
        ));
        report.push_str(&format!("Pair comparisons: {}\n", self.comparisons));
        report.push_str(&format!(
            "Opportunities: {} detected, {} published, {} dropped\n",
            self.opportunities_detected, self.opportunities_published, self.opportunities_dropped
        ));
        report.push_str(&format!(
            "Failures: {} publish, {} persist\n",
            self.publish_failures, self.persist_failures
        ));
        report.push_str(&format!("Cache entries purged: {}\n", self.entries_purged));
        report.push_str(&format!("Taken at: {}\n", self.taken_at));

        report
    }

    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize metrics: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = EngineMetrics::new();
        metrics.record_ingested();
        metrics.record_ingested();
        metrics.record_rejected();
        metrics.record_comparisons(3);
        metrics.record_detected();
        metrics.record_dropped();
        metrics.record_purged(4);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.quotes_ingested, 2);
        assert_eq!(snapshot.quotes_rejected, 1);
        assert_eq!(snapshot.comparisons, 3);
        assert_eq!(snapshot.opportunities_detected, 1);
        assert_eq!(snapshot.opportunities_dropped, 1);
        assert_eq!(snapshot.entries_purged, 4);
        assert_eq!(metrics.opportunities_dropped(), 1);
    }

    #[test]
    fn test_report_and_json() {
        let metrics = EngineMetrics::new();
        metrics.record_publish_failure();
        let snapshot = metrics.snapshot();

        assert!(snapshot.generate_report().contains("Failures: 1 publish, 0 persist"));
        let json = snapshot.export_json().unwrap();
        let parsed: MetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
