// ============================================================
// Layer 6 — Audit Trail
// ============================================================
// Append-only record of what the analyzer decided and when.
//
// Why a separate audit file when we already have tracing?
//   - Tracing output is for operators and goes wherever the
//     subscriber points it; the audit trail is a durable
//     per-deployment record of medical-adjacent decisions
//   - One JSON object per line (JSONL) — greppable, and
//     trivially ingested by any log pipeline
//
// Events recorded:
//   - ANALYSIS_COMPLETED: predicted label and confidence of a
//     successful classification (no image data, no file names)
//   - RESOURCE_EXHAUSTED:  an accelerator capacity incident —
//     these need operator attention even when the caller
//     silently retries
//
// Example output:
//   {"timestamp":"2026-08-25T10:02:11Z","severity":"INFO","event":"ANALYSIS_COMPLETED","label":"PNEUMONIA","confidence":87.12}
//   {"timestamp":"2026-08-25T10:02:40Z","severity":"WARNING","event":"RESOURCE_EXHAUSTED","detail":"buffer allocation failed"}
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// One auditable event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum AuditEvent {
    #[serde(rename = "ANALYSIS_COMPLETED")]
    AnalysisCompleted { label: String, confidence: f64 },

    #[serde(rename = "RESOURCE_EXHAUSTED")]
    ResourceExhausted { detail: String },
}

impl AuditEvent {
    /// Completed analyses are routine; capacity incidents are not.
    pub fn severity(&self) -> &'static str {
        match self {
            Self::AnalysisCompleted { .. } => "INFO",
            Self::ResourceExhausted { .. } => "WARNING",
        }
    }
}

/// The on-disk JSONL row: event payload plus timestamp and severity.
#[derive(Debug, Serialize)]
struct AuditRecord<'a> {
    timestamp: String,
    severity: &'static str,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

/// Appends audit events to a JSONL file, one record per line.
pub struct AuditLogger {
    log_path: PathBuf,
}

impl AuditLogger {
    /// Create the logger, making the directory if needed. The
    /// file itself is created on the first event.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { log_path: dir.join("audit.jsonl") })
    }

    /// Append one event. An audit write failure is reported to
    /// the caller; whether it aborts the analysis is the
    /// caller's decision, not this layer's.
    pub fn record(&self, event: &AuditEvent) -> Result<()> {
        let record = AuditRecord {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            severity: event.severity(),
            event,
        };
        let line = serde_json::to_string(&record)?;

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(f, "{line}")?;

        tracing::debug!("Audit event appended to '{}'", self.log_path.display());
        Ok(())
    }

    /// Return the path to the audit JSONL file
    pub fn log_path(&self) -> &PathBuf {
        &self.log_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("pneumo-detect-tests")
            .join(format!("{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_records_are_one_json_object_per_line() {
        let logger = AuditLogger::new(scratch_dir("audit-lines")).unwrap();
        logger
            .record(&AuditEvent::AnalysisCompleted {
                label:      "PNEUMONIA".into(),
                confidence: 87.12,
            })
            .unwrap();
        logger
            .record(&AuditEvent::ResourceExhausted {
                detail: "buffer allocation failed".into(),
            })
            .unwrap();

        let text = fs::read_to_string(logger.log_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines.len() >= 2);

        // Every line parses back as standalone JSON
        for line in &lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("timestamp").is_some());
            assert!(value.get("severity").is_some());
            assert!(value.get("event").is_some());
        }
    }

    #[test]
    fn test_event_payload_shape() {
        let event = AuditEvent::AnalysisCompleted {
            label:      "NORMAL".into(),
            confidence: 95.0,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "ANALYSIS_COMPLETED");
        assert_eq!(value["label"], "NORMAL");
        assert_eq!(value["confidence"], 95.0);
        assert_eq!(event.severity(), "INFO");
    }
}
