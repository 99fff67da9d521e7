// =============================================================================
// Explain/Audit Writer — per-scan JSON explain report + JSONL progress trace
// =============================================================================
//
// Grounded on `decision_envelope.rs`'s auditable-record shape (serde
// `Serialize`, a uuid identity, an ISO 8601 timestamp) but restructured
// around a whole scan instead of a single trade decision: one explain
// envelope per scan, one candidate entry per symbol.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::CryptoRunConfig;
use crate::scan::{ProgressEvent, ScanCandidate, ScanFailure, ScanResult};

#[derive(Debug, Clone, Serialize)]
pub struct ScanMetadata {
    pub scan_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub universe_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub candidates_analyzed: usize,
    pub candidates_selected: usize,
    pub symbols_failed: usize,
    pub top_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExplainReport {
    pub scan_metadata: ScanMetadata,
    pub configuration: CryptoRunConfig,
    pub candidates: Vec<ScanCandidate>,
    pub failures: Vec<ScanFailure>,
    pub summary: ScanSummary,
}

fn iso8601(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Build the explain report for one completed scan. `started_at`/`finished_at`
/// are passed in (not read from a clock here) so this stays a pure function
/// of its inputs, consistent with the rest of the pipeline.
pub fn build_explain_report(
    scan_id: impl Into<String>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    universe_size: usize,
    config: &CryptoRunConfig,
    result: &ScanResult,
) -> ExplainReport {
    let candidates_selected = result.candidates.iter().filter(|c| c.scored.selected && c.gate_pass).count();
    let top_score = result
        .candidates
        .iter()
        .map(|c| c.scored.score.final_score_with_social)
        .fold(None, |acc: Option<f64>, v| match acc {
            Some(max) if max >= v => Some(max),
            _ => Some(v),
        });

    ExplainReport {
        scan_metadata: ScanMetadata {
            scan_id: scan_id.into(),
            started_at: iso8601(started_at),
            finished_at: iso8601(finished_at),
            universe_size,
        },
        configuration: config.clone(),
        candidates: result.candidates.clone(),
        failures: result.failures.clone(),
        summary: ScanSummary {
            candidates_analyzed: result.candidates.len(),
            candidates_selected,
            symbols_failed: result.failures.len(),
            top_score,
        },
    }
}

/// One line of the always-on JSONL progress trace.
#[derive(Debug, Clone, Serialize)]
pub struct TraceLine {
    pub ts: i64,
    pub phase: String,
    pub status: String,
    pub payload: serde_json::Value,
}

/// Render a progress event as a trace line's JSON payload; the caller is
/// responsible for appending the serialized line to the JSONL file (or
/// stdout) regardless of which progress UX mode is active.
pub fn trace_line(event: &ProgressEvent) -> TraceLine {
    TraceLine {
        ts: event.ts,
        phase: format!("{:?}", event.phase).to_lowercase(),
        status: "ok".to_string(),
        payload: serde_json::json!({ "event": event.event, "counters": event.counters }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::Phase;
    use std::collections::HashMap;

    #[test]
    fn summary_counts_selected_and_failed() {
        let config = CryptoRunConfig::default();
        let result = ScanResult { candidates: Vec::new(), failures: vec![ScanFailure { symbol: "BTCUSD".into(), reason_code: "fetch_failed".into(), detail: "timeout".into() }] };
        let now = Utc::now();
        let report = build_explain_report("scan-1", now, now, 1, &config, &result);
        assert_eq!(report.summary.symbols_failed, 1);
        assert_eq!(report.summary.candidates_analyzed, 0);
    }

    #[test]
    fn trace_line_lowercases_phase() {
        let event = ProgressEvent { event: "scan_start".to_string(), phase: Phase::Init, ts: 0, counters: HashMap::new() };
        let line = trace_line(&event);
        assert_eq!(line.phase, "init");
    }
}
