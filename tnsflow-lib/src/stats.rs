use crate::conversation::ConversationKey;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Aggregate statistics for one statement fingerprint, whole-run lifetime.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SqlStats {
    /// Canonical text, first seen wins
    pub sql_text: String,
    /// Per-execution network-elapsed samples (ms) and their running sum
    pub net_ms: Vec<f64>,
    pub net_ms_sum: f64,
    pub executions: u64,
    /// Cumulative packets across all flows of this fingerprint
    pub packets: u64,
    /// Conversations that executed this statement; cardinality is the
    /// session count
    pub sessions: BTreeSet<ConversationKey>,
    pub reused_cursors: u64,
    /// Per-execution application-elapsed samples (ms) and their running sum
    pub app_ms: Vec<f64>,
    pub app_ms_sum: f64,
}

impl SqlStats {
    fn record(
        &mut self,
        sql_text: &str,
        net_ns: i64,
        conversation: &ConversationKey,
        packets: u64,
        reused_cursors: u64,
        app_ns: i64,
    ) {
        if self.sql_text.is_empty() {
            self.sql_text = sql_text.to_string();
        }
        let net_ms = net_ns as f64 / 1e6;
        let app_ms = app_ns as f64 / 1e6;
        self.net_ms.push(net_ms);
        self.net_ms_sum += net_ms;
        self.app_ms.push(app_ms);
        self.app_ms_sum += app_ms;
        self.executions += 1;
        self.packets += packets;
        self.reused_cursors += reused_cursors;
        self.sessions.insert(conversation.clone());
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn net_ms_per_exec(&self) -> f64 {
        self.net_ms_sum / self.executions as f64
    }

    pub fn app_ms_per_exec(&self) -> f64 {
        self.app_ms_sum / self.executions as f64
    }
}

/// Write-once-per-flow, read-many-at-report aggregator keyed by
/// statement fingerprint.
#[derive(Debug, Default)]
pub struct StatsTable {
    by_fingerprint: HashMap<String, SqlStats>,
}

impl StatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit one completed flow.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &mut self,
        fingerprint: &str,
        sql_text: &str,
        net_ns: i64,
        conversation: &ConversationKey,
        packets: u64,
        reused_cursors: u64,
        app_ns: i64,
    ) {
        self.by_fingerprint
            .entry(fingerprint.to_string())
            .or_default()
            .record(sql_text, net_ns, conversation, packets, reused_cursors, app_ns);
    }

    pub fn get(&self, fingerprint: &str) -> Option<&SqlStats> {
        self.by_fingerprint.get(fingerprint)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlStats)> {
        self.by_fingerprint.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.by_fingerprint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fingerprint.is_empty()
    }
}

/// Population standard deviation (squared deviations divided by n).
pub fn std_dev(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / samples.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(app_port: u16) -> ConversationKey {
        ConversationKey::new([10, 0, 0, 5].into(), 1521, [192, 168, 0, 1].into(), app_port)
    }

    #[test]
    fn recording_twice_doubles_counts_but_not_the_mean() {
        let mut table = StatsTable::new();
        let conv = key(40001);
        table.record("f1", "SELECT 1", 4_000_000, &conv, 3, 1, 8_000_000);
        table.record("f1", "SELECT 1", 4_000_000, &conv, 3, 1, 8_000_000);

        let stats = table.get("f1").expect("entry exists");
        assert_eq!(stats.executions, 2);
        assert_eq!(stats.packets, 6);
        assert_eq!(stats.reused_cursors, 2);
        assert_eq!(stats.net_ms.len(), 2);
        assert_eq!(stats.app_ms.len(), 2);
        assert!((stats.net_ms_per_exec() - 4.0).abs() < 1e-9);
        assert!((stats.app_ms_per_exec() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn sums_match_sample_arrays() {
        let mut table = StatsTable::new();
        let conv = key(40001);
        table.record("f1", "SELECT 1", 1_500_000, &conv, 1, 0, 2_500_000);
        table.record("f1", "SELECT 1", 3_500_000, &conv, 1, 0, 4_500_000);

        let stats = table.get("f1").expect("entry exists");
        assert!((stats.net_ms_sum - stats.net_ms.iter().sum::<f64>()).abs() < 1e-9);
        assert!((stats.app_ms_sum - stats.app_ms.iter().sum::<f64>()).abs() < 1e-9);
        assert_eq!(stats.net_ms.len() as u64, stats.executions);
    }

    #[test]
    fn session_cardinality_counts_conversations_not_executions() {
        let mut table = StatsTable::new();
        let first = key(40001);
        let second = key(40002);
        table.record("f1", "SELECT 1", 1, &first, 1, 0, 1);
        table.record("f1", "SELECT 1", 1, &first, 1, 0, 1);
        table.record("f1", "SELECT 1", 1, &first, 1, 0, 1);
        table.record("f1", "SELECT 1", 1, &second, 1, 0, 1);

        let stats = table.get("f1").expect("entry exists");
        assert_eq!(stats.executions, 4);
        assert_eq!(stats.session_count(), 2);
    }

    #[test]
    fn first_seen_text_is_canonical() {
        let mut table = StatsTable::new();
        let conv = key(40001);
        table.record("f1", "SELECT 1", 1, &conv, 1, 0, 1);
        table.record("f1", "select 1", 1, &conv, 1, 0, 1);
        assert_eq!(table.get("f1").expect("entry exists").sql_text, "SELECT 1");
    }

    #[test]
    fn population_std_dev() {
        assert_eq!(std_dev(&[]), 0.0);
        assert_eq!(std_dev(&[5.0]), 0.0);
        // population stddev of [2, 4, 4, 4, 5, 5, 7, 9] is exactly 2
        let samples = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_dev(&samples) - 2.0).abs() < 1e-12);
    }
}
