//! # Agent memory records
//!
//! A persistent agent leaves a small text record behind after each session
//! so a later `resume:` can find the session to continue, even when the
//! in-memory map of the current process no longer knows it. The record
//! lives at a deterministic key per (run, principal, agent):
//!
//! ```text
//! session_id: 3f2a…
//! principal: user-17
//! agent: captain
//! last_task: Draft the notes
//! updated_at: 2026-10-19T08:00:00+00:00
//! ```
//!
//! Only the `session_id:` line is required when reading.

use crate::error::Result;
use crate::storage::{ContentStore, StoredContent};
use chrono::{DateTime, Utc};

const SESSION_MARKER: &str = "session_id:";

/// Storage key of the memory record for one agent in one run
pub fn memory_key(run_id: &str, principal_id: &str, agent: &str) -> String {
    format!("memory/{}/{}/{}.md", run_id, principal_id, agent)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub session_id: String,
    pub principal_id: String,
    pub agent: String,
    pub last_task: String,
    pub updated_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(
        session_id: impl Into<String>,
        principal_id: impl Into<String>,
        agent: impl Into<String>,
        last_task: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            principal_id: principal_id.into(),
            agent: agent.into(),
            last_task: last_task.into(),
            updated_at: Utc::now(),
        }
    }

    pub fn to_text(&self) -> String {
        format!(
            "{} {}\nprincipal: {}\nagent: {}\nlast_task: {}\nupdated_at: {}\n",
            SESSION_MARKER,
            self.session_id,
            self.principal_id,
            self.agent,
            self.last_task.replace('\n', " "),
            self.updated_at.to_rfc3339(),
        )
    }
}

/// Pull the session id out of a record's text
pub fn parse_session_id(text: &str) -> Option<String> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix(SESSION_MARKER))
        .map(str::trim)
        .find(|id| !id.is_empty())
        .map(str::to_string)
}

/// Read the last known session id for an agent, if a record exists
pub async fn load_session_id(
    store: &dyn ContentStore,
    run_id: &str,
    principal_id: &str,
    agent: &str,
) -> Result<Option<String>> {
    let key = memory_key(run_id, principal_id, agent);
    let Some(bytes) = store.get(&key).await? else {
        return Ok(None);
    };
    Ok(parse_session_id(&String::from_utf8_lossy(&bytes)))
}

/// Write a fresh record for `record.agent`
pub async fn save_record(
    store: &dyn ContentStore,
    run_id: &str,
    record: &MemoryRecord,
) -> Result<StoredContent> {
    let key = memory_key(run_id, &record.principal_id, &record.agent);
    store
        .put(&key, record.to_text().into_bytes(), "text/markdown")
        .await
}
