//! # Agent events
//!
//! The closed vocabulary every session adapter translates its backend's
//! activity into, plus the envelope the event buffer ships to the
//! collector. Backend-specific payload shapes never leave the adapter.

use serde::{Deserialize, Serialize};

/// Wire version of envelopes and batches
pub const EVENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoAction {
    Add,
    Update,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOp {
    Opened,
    Read,
    Created,
    Edited,
    Deleted,
    Moved,
    Copied,
    Mkdir,
    Rmdir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointAction {
    Create,
    Restore,
    Drop,
}

/// Structured agent activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    SessionStarted {
        session_id: String,
    },
    SessionResumed {
        session_id: String,
    },
    Log {
        level: LogLevel,
        message: String,
    },
    Step {
        status: StepStatus,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Todo {
        action: TodoAction,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Artifact {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, rename = "contentRef", skip_serializing_if = "Option::is_none")]
        content_ref: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime: Option<String>,
    },
    File {
        op: FileOp,
        path: String,
        /// Destination for moves and copies
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
    },
    Checkpoint {
        action: CheckpointAction,
        name: String,
    },
    ResultText {
        text: String,
    },
    Thinking {
        text: String,
    },
    Raw {
        data: serde_json::Value,
    },
}

impl AgentEvent {
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        AgentEvent::Log {
            level,
            message: message.into(),
        }
    }

    pub fn raw(data: impl Into<serde_json::Value>) -> Self {
        AgentEvent::Raw { data: data.into() }
    }

    /// Discriminant as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::SessionStarted { .. } => "session_started",
            AgentEvent::SessionResumed { .. } => "session_resumed",
            AgentEvent::Log { .. } => "log",
            AgentEvent::Step { .. } => "step",
            AgentEvent::Todo { .. } => "todo",
            AgentEvent::Artifact { .. } => "artifact",
            AgentEvent::File { .. } => "file",
            AgentEvent::Checkpoint { .. } => "checkpoint",
            AgentEvent::ResultText { .. } => "result_text",
            AgentEvent::Thinking { .. } => "thinking",
            AgentEvent::Raw { .. } => "raw",
        }
    }

    /// Deduplication key for artifacts: content ref, else path, else name
    pub fn artifact_key(&self) -> Option<&str> {
        match self {
            AgentEvent::Artifact {
                name,
                path,
                content_ref,
                ..
            } => content_ref
                .as_deref()
                .or(path.as_deref())
                .or(name.as_deref()),
            _ => None,
        }
    }
}

/// Token usage reported by a provider for one message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Provider-assigned message id; usage is counted once per id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            ..Default::default()
        }
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Add another usage record into this running total
    pub fn accumulate(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
    }
}

/// One event as shipped to the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEventEnvelope {
    pub v: u32,
    pub run_id: String,
    pub program_hash: String,
    pub principal_id: String,
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub seq: u64,
    /// RFC 3339 timestamp
    pub ts: String,
    pub event: AgentEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let event = AgentEvent::File {
            op: FileOp::Moved,
            path: "a.txt".into(),
            to: Some("b.txt".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, json!({"type": "file", "op": "moved", "path": "a.txt", "to": "b.txt"}));
        assert_eq!(event.kind(), "file");
    }

    #[test]
    fn test_event_from_marker_json() {
        let event: AgentEvent = serde_json::from_value(json!({
            "type": "todo", "action": "complete", "id": "t1"
        }))
        .unwrap();
        assert_eq!(
            event,
            AgentEvent::Todo {
                action: TodoAction::Complete,
                id: "t1".into(),
                text: None
            }
        );
    }

    #[test]
    fn test_artifact_key_precedence() {
        let full = AgentEvent::Artifact {
            name: Some("report".into()),
            path: Some("out/report.md".into()),
            content_ref: Some("mem://r1".into()),
            mime: None,
        };
        assert_eq!(full.artifact_key(), Some("mem://r1"));

        let named = AgentEvent::Artifact {
            name: Some("report".into()),
            path: None,
            content_ref: None,
            mime: None,
        };
        assert_eq!(named.artifact_key(), Some("report"));
        assert_eq!(AgentEvent::log(LogLevel::Info, "x").artifact_key(), None);
    }

    #[test]
    fn test_usage_accumulate() {
        let mut total = Usage::default();
        total.accumulate(&Usage::new(10, 5));
        total.accumulate(&Usage::new(1, 2).with_message_id("m"));
        assert_eq!(total.total_tokens(), 18);
        assert_eq!(total.message_id, None);
    }
}
