//! Append-only structured audit trail, scoped by session.
//!
//! Every agent execution is appended to an in-memory buffer and, best
//! effort, to a per-session JSONL file under `audit_log_dir`. A failed file
//! write is logged and swallowed — it must never fail the agent step that
//! triggered it.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use crate::types::AuditRecord;

pub struct AuditLogger {
    log_dir: PathBuf,
    session_id: String,
    entries: Mutex<Vec<AuditRecord>>,
}

impl AuditLogger {
    /// Creates a new logger with a fresh, timestamp-derived session id.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let log_dir = log_dir.into();
        let _ = std::fs::create_dir_all(&log_dir);
        Self {
            log_dir,
            session_id: Utc::now().format("%Y%m%d_%H%M%S%.f").to_string(),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Reopens an existing session, appending to its buffer and file.
    pub fn for_session(log_dir: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        let log_dir = log_dir.into();
        let _ = std::fs::create_dir_all(&log_dir);
        Self { log_dir, session_id: session_id.into(), entries: Mutex::new(Vec::new()) }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn session_log_path(&self) -> PathBuf {
        self.log_dir.join(format!("session_{}.jsonl", self.session_id))
    }

    pub fn export_path(&self) -> PathBuf {
        self.log_dir.join(format!("export_{}.json", self.session_id))
    }

    pub fn report_path(&self) -> PathBuf {
        self.log_dir.join(format!("report_{}.md", self.session_id))
    }

    pub fn log_step(
        &self,
        agent_name: impl Into<String>,
        input_snapshot: Value,
        output_snapshot: Value,
        duration_ms: f64,
        metadata: Value,
    ) -> AuditRecord {
        let record = AuditRecord {
            timestamp: Utc::now(),
            session_id: self.session_id.clone(),
            agent_name: agent_name.into(),
            input_snapshot,
            output_snapshot,
            duration_ms,
            metadata,
        };

        self.entries.lock().unwrap_or_else(|e| e.into_inner()).push(record.clone());
        self.append_to_file(&record);
        record
    }

    fn append_to_file(&self, record: &AuditRecord) {
        let line = match serde_json::to_string(record) {
            Ok(l) => l,
            Err(e) => {
                warn!(session_id = %self.session_id, "failed to serialize audit record: {e}");
                return;
            }
        };

        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.session_log_path())
            .and_then(|mut f| writeln!(f, "{line}"));

        if let Err(e) = result {
            warn!(session_id = %self.session_id, "failed to append audit log: {e}");
        }
    }

    pub fn session_logs(&self) -> Vec<AuditRecord> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn export_json(&self) -> std::io::Result<PathBuf> {
        let entries = self.session_logs();
        let path = self.export_path();
        let json = serde_json::to_vec_pretty(&entries).unwrap_or_default();
        std::fs::write(&path, json)?;
        Ok(path)
    }

    pub fn export_markdown(&self) -> std::io::Result<PathBuf> {
        let entries = self.session_logs();
        let path = self.report_path();
        std::fs::write(&path, render_markdown(&self.session_id, &entries))?;
        Ok(path)
    }
}

/// Renders a session's records as a Markdown report. Standalone so a
/// session can be reported on after the process that produced it has
/// exited, from its JSONL file alone.
pub fn render_markdown(session_id: &str, entries: &[AuditRecord]) -> String {
    let mut out = String::new();
    out.push_str("# Legal Reasoning Core Audit Report\n");
    out.push_str(&format!("\n**Session ID:** {session_id}\n"));
    out.push_str(&format!("\n**Generated:** {}\n", Utc::now().to_rfc3339()));
    out.push_str(&format!("\n**Total Agent Executions:** {}\n", entries.len()));
    out.push_str("\n---\n\n## Execution Timeline\n");

    for (idx, entry) in entries.iter().enumerate() {
        out.push_str(&format!("\n### {}. Agent: {}\n", idx + 1, entry.agent_name));
        out.push_str(&format!("\n**Timestamp:** {}\n", entry.timestamp.to_rfc3339()));
        out.push_str(&format!("\n**Execution Time:** {:.2}ms\n", entry.duration_ms));
        out.push_str("\n**Input:**\n");
        out.push_str(&format!(
            "\n```json\n{}\n```\n",
            serde_json::to_string_pretty(&entry.input_snapshot).unwrap_or_default()
        ));
        out.push_str("\n**Output:**\n");
        out.push_str(&format!(
            "\n```json\n{}\n```\n",
            serde_json::to_string_pretty(&entry.output_snapshot).unwrap_or_default()
        ));
        out.push_str("\n---\n");
    }

    out
}

/// Reads a historical session's records straight from its JSONL file,
/// for sessions no longer held in any in-process buffer.
pub fn read_session_file(log_dir: &Path, session_id: &str) -> std::io::Result<Vec<AuditRecord>> {
    let path = log_dir.join(format!("session_{session_id}.jsonl"));
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_step_appends_and_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(dir.path());

        logger.log_step("planner", serde_json::json!({}), serde_json::json!({}), 1.0, serde_json::json!({}));
        assert_eq!(logger.session_logs().len(), 1);

        logger.log_step("retriever", serde_json::json!({}), serde_json::json!({}), 2.0, serde_json::json!({}));
        assert_eq!(logger.session_logs().len(), 2);
    }

    #[test]
    fn export_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(dir.path());
        logger.log_step("planner", serde_json::json!({"q": "x"}), serde_json::json!({"steps": []}), 5.0, serde_json::json!({}));

        let path = logger.export_json().unwrap();
        let raw = std::fs::read_to_string(path).unwrap();
        let parsed: Vec<AuditRecord> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].agent_name, "planner");
    }

    #[test]
    fn session_file_readable_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = {
            let logger = AuditLogger::new(dir.path());
            logger.log_step("validator", serde_json::json!({}), serde_json::json!({}), 1.0, serde_json::json!({}));
            logger.session_id().to_string()
        };

        let records = read_session_file(dir.path(), &session_id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].agent_name, "validator");
    }
}
