use crate::session::AnalysisSession;
use crate::stats::std_dev;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;
use std::net::Ipv4Addr;

/// One report row per statement fingerprint.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub sql_id: String,
    pub sql_text: String,
    pub app_ms_total: f64,
    pub net_ms_total: f64,
    pub executions: u64,
    pub app_ms_std_dev: f64,
    pub app_ms_per_exec: f64,
    pub net_ms_std_dev: f64,
    pub net_ms_per_exec: f64,
    pub packets: u64,
    pub sessions: usize,
    pub reused_cursors: u64,
    /// Per-execution samples, the interface chart renderers consume
    pub app_ms_samples: Vec<f64>,
    pub net_ms_samples: Vec<f64>,
}

/// Whole-run report: per-fingerprint rows plus capture-wide totals.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub rows: Vec<ReportRow>,
    pub sum_app_ms: f64,
    pub sum_net_ms: f64,
    /// Cumulative TNS payload bytes per database IP
    pub db_bytes: Vec<(Ipv4Addr, u64)>,
    pub capture_start: Option<DateTime<Utc>>,
    pub capture_end: Option<DateTime<Utc>>,
    pub classification_failures: u64,
    pub ordering_violations: u64,
    pub counting_errors: u64,
}

impl Report {
    /// Snapshot a finished session. Rows come out sorted by application
    /// elapsed time, heaviest statements first.
    pub fn build(session: &AnalysisSession) -> Self {
        let mut rows: Vec<ReportRow> = session
            .stats()
            .iter()
            .map(|(sql_id, stats)| ReportRow {
                sql_id: sql_id.to_string(),
                sql_text: stats.sql_text.clone(),
                app_ms_total: stats.app_ms_sum,
                net_ms_total: stats.net_ms_sum,
                executions: stats.executions,
                app_ms_std_dev: std_dev(&stats.app_ms),
                app_ms_per_exec: stats.app_ms_per_exec(),
                net_ms_std_dev: std_dev(&stats.net_ms),
                net_ms_per_exec: stats.net_ms_per_exec(),
                packets: stats.packets,
                sessions: stats.session_count(),
                reused_cursors: stats.reused_cursors,
                app_ms_samples: stats.app_ms.clone(),
                net_ms_samples: stats.net_ms.clone(),
            })
            .collect();
        rows.sort_by(|a, b| b.app_ms_total.total_cmp(&a.app_ms_total));

        let mut db_bytes: Vec<(Ipv4Addr, u64)> =
            session.db_bytes().iter().map(|(ip, bytes)| (*ip, *bytes)).collect();
        db_bytes.sort();

        let span = session.time_span_ns();
        Report {
            sum_app_ms: rows.iter().map(|r| r.app_ms_total).sum(),
            sum_net_ms: rows.iter().map(|r| r.net_ms_total).sum(),
            rows,
            db_bytes,
            capture_start: span.map(|(first, _)| DateTime::from_timestamp_nanos(first)),
            capture_end: span.map(|(_, last)| DateTime::from_timestamp_nanos(last)),
            classification_failures: session.classification_failures(),
            ordering_violations: session.ordering_violations(),
            counting_errors: session.counting_errors(),
        }
    }

    /// Render as an aligned text table with the capture-wide summary.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<16}{:>14}{:>14}{:>7}{:>16}{:>14}{:>16}{:>14}{:>8}{:>5}{:>5}",
            "SQL ID",
            "Ela App (ms)",
            "Ela Net (ms)",
            "Exec",
            "Stddev App",
            "App/Exec",
            "Stddev Net",
            "Net/Exec",
            "P",
            "S",
            "RC"
        );
        let _ = writeln!(out, "{}", "-".repeat(129));
        for row in &self.rows {
            let _ = writeln!(
                out,
                "{:<16}{:>14.3}{:>14.3}{:>7}{:>16.3}{:>14.3}{:>16.3}{:>14.3}{:>8}{:>5}{:>5}",
                row.sql_id,
                row.app_ms_total,
                row.net_ms_total,
                row.executions,
                row.app_ms_std_dev,
                row.app_ms_per_exec,
                row.net_ms_std_dev,
                row.net_ms_per_exec,
                row.packets,
                row.sessions,
                row.reused_cursors
            );
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Sum App Time (s): {:.3}", self.sum_app_ms / 1000.0);
        let _ = writeln!(out, "Sum Net Time (s): {:.3}", self.sum_net_ms / 1000.0);

        let _ = writeln!(out);
        for (ip, bytes) in &self.db_bytes {
            let _ = writeln!(out, "{ip}: {} kb of TNS payload", bytes / 1024);
        }

        if let (Some(start), Some(end)) = (self.capture_start, self.capture_end) {
            let duration = (end - start).as_seconds_f64();
            let _ = writeln!(out);
            let _ = writeln!(out, "Time frame: {start} <=> {end}");
            let _ = writeln!(out, "Time frame duration (s): {duration:.3}");
        }

        if self.classification_failures > 0 || self.ordering_violations > 0 || self.counting_errors > 0
        {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "Dissection issues: {} unclassified frames, {} ordering violations, {} dropped flows",
                self.classification_failures, self.ordering_violations, self.counting_errors
            );
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;

    fn empty_session() -> AnalysisSession {
        AnalysisSession::new(SessionConfig {
            db_ips: vec![Ipv4Addr::new(10, 0, 0, 5)],
            db_port: 1521,
            classification_failure_limit: None,
        })
    }

    #[test]
    fn empty_session_renders_without_time_frame() {
        let report = Report::build(&empty_session());
        assert!(report.rows.is_empty());
        assert_eq!(report.sum_app_ms, 0.0);
        let text = report.render();
        assert!(text.contains("SQL ID"));
        assert!(!text.contains("Time frame"));
    }

    #[test]
    fn report_serializes_to_json() {
        let report = Report::build(&empty_session());
        let json = serde_json::to_string(&report).expect("serializes");
        assert!(json.contains("\"rows\":[]"));
    }
}
