//! Per-incident thread memory and per-user global pattern memory.
//!
//! Backed by a single `case_messages` table — the original system kept two
//! parallel tables with slightly different role typing; this collapses
//! them to one `CaseRole` enum (see DESIGN.md, Open Question 4).

use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::types::{CaseMessage, CaseRole};

const SCHEMA_SQL: &str = include_str!("../../../schema.sql");

pub struct CaseMemoryStore {
    conn: Mutex<Connection>,
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map(|ndt| ndt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

fn now_str() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.f").to_string()
}

fn role_to_str(role: CaseRole) -> &'static str {
    match role {
        CaseRole::User => "user",
        CaseRole::Assistant => "assistant",
        CaseRole::System => "system",
    }
}

fn role_from_str(s: &str) -> CaseRole {
    match s {
        "assistant" => CaseRole::Assistant,
        "system" => CaseRole::System,
        _ => CaseRole::User,
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<CaseMessage> {
    let created_at_str: String = row.get(5)?;
    let role_str: String = row.get(3)?;
    Ok(CaseMessage {
        id: row.get(0)?,
        incident_id: row.get(1)?,
        user_id: row.get(2)?,
        role: role_from_str(&role_str),
        content: row.get(4)?,
        created_at: parse_ts(&created_at_str),
    })
}

impl CaseMemoryStore {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open SQLite database at {path:?}"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .context("failed to set PRAGMAs")?;
        conn.execute_batch(SCHEMA_SQL).context("failed to apply schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        conn.execute_batch(SCHEMA_SQL).context("failed to apply schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Loads `(incident_history, global_history)`, each ascending by
    /// `created_at`, each truncated to the most recent `tail_n` rows.
    pub fn load_context(
        &self,
        incident_id: &str,
        user_id: &str,
        tail_n: usize,
    ) -> Result<(Vec<CaseMessage>, Vec<CaseMessage>)> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());

        let mut incident_stmt = conn.prepare(
            "SELECT id, incident_id, user_id, role, content, created_at FROM case_messages \
             WHERE incident_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let mut incident_history: Vec<CaseMessage> = incident_stmt
            .query_map(params![incident_id, tail_n as i64], row_to_message)?
            .filter_map(|r| r.ok())
            .collect();
        incident_history.reverse();

        let mut global_stmt = conn.prepare(
            "SELECT id, incident_id, user_id, role, content, created_at FROM case_messages \
             WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let mut global_history: Vec<CaseMessage> = global_stmt
            .query_map(params![user_id, tail_n as i64], row_to_message)?
            .filter_map(|r| r.ok())
            .collect();
        global_history.reverse();

        Ok((incident_history, global_history))
    }

    /// Writes the user message then the assistant message inside one
    /// transaction — both rows land, or neither does.
    pub fn persist_turn(
        &self,
        incident_id: &str,
        user_id: &str,
        user_msg: &str,
        assistant_msg: &str,
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction().context("starting case memory transaction")?;

        let now = now_str();
        tx.execute(
            "INSERT INTO case_messages (incident_id, user_id, role, content, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![incident_id, user_id, role_to_str(CaseRole::User), user_msg, now],
        )
        .context("inserting user turn")?;

        let now = now_str();
        tx.execute(
            "INSERT INTO case_messages (incident_id, user_id, role, content, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![incident_id, user_id, role_to_str(CaseRole::Assistant), assistant_msg, now],
        )
        .context("inserting assistant turn")?;

        tx.commit().context("committing case memory transaction")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_and_load_round_trips_in_order() {
        let store = CaseMemoryStore::open_in_memory().unwrap();
        store.persist_turn("inc-1", "user-1", "What is Section 299?", "Culpable homicide...").unwrap();
        store.persist_turn("inc-1", "user-1", "What are its penalties?", "Up to 20 years...").unwrap();

        let (incident_history, global_history) = store.load_context("inc-1", "user-1", 20).unwrap();
        assert_eq!(incident_history.len(), 4);
        assert_eq!(incident_history[0].content, "What is Section 299?");
        assert_eq!(incident_history[0].role, CaseRole::User);
        assert_eq!(global_history.len(), 4);
    }

    #[test]
    fn tail_n_truncates_to_most_recent() {
        let store = CaseMemoryStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.persist_turn("inc-1", "user-1", &format!("q{i}"), &format!("a{i}")).unwrap();
        }
        let (incident_history, _) = store.load_context("inc-1", "user-1", 4).unwrap();
        assert_eq!(incident_history.len(), 4);
        assert_eq!(incident_history[0].content, "a3");
    }

    #[test]
    fn incidents_are_isolated_but_user_global_spans_them() {
        let store = CaseMemoryStore::open_in_memory().unwrap();
        store.persist_turn("inc-1", "user-1", "q1", "a1").unwrap();
        store.persist_turn("inc-2", "user-1", "q2", "a2").unwrap();

        let (incident_history, global_history) = store.load_context("inc-1", "user-1", 20).unwrap();
        assert_eq!(incident_history.len(), 2);
        assert_eq!(global_history.len(), 4);
    }
}
