//! Explicit configuration values threaded into the interpreter, the event
//! buffer and the manifest verifier. Nothing in the core reads ambient
//! process state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity of one run, stamped on every event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunContext {
    pub run_id: String,
    pub program_hash: String,
    pub principal_id: String,
}

impl RunContext {
    pub fn new(
        run_id: impl Into<String>,
        program_hash: impl Into<String>,
        principal_id: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            program_hash: program_hash.into(),
            principal_id: principal_id.into(),
        }
    }
}

/// Shared secret material
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Key for manifest and event-batch HMAC signatures
    pub shared_secret: String,
    /// Token sent alongside every event batch
    #[serde(default)]
    pub ingest_token: String,
}

impl SecurityConfig {
    pub fn new(shared_secret: impl Into<String>) -> Self {
        Self {
            shared_secret: shared_secret.into(),
            ingest_token: String::new(),
        }
    }

    pub fn with_ingest_token(mut self, token: impl Into<String>) -> Self {
        self.ingest_token = token.into();
        self
    }
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("shared_secret", &"<redacted>")
            .field("ingest_token", &"<redacted>")
            .finish()
    }
}

/// Event buffer tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub flush_interval_ms: u64,
    pub max_batch: usize,
    pub max_queue: usize,
    /// Value of the batch `source` field
    pub source: String,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 500,
            max_batch: 50,
            max_queue: 2000,
            source: "procflow".to_string(),
        }
    }
}

impl BufferConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_max_batch(mut self, max: usize) -> Self {
        self.max_batch = max;
        self
    }

    pub fn with_max_queue(mut self, max: usize) -> Self {
        self.max_queue = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_defaults() {
        let config = BufferConfig::default();
        assert_eq!(config.flush_interval(), Duration::from_millis(500));
        assert_eq!(config.max_batch, 50);
        assert_eq!(config.max_queue, 2000);
    }

    #[test]
    fn test_buffer_partial_override() {
        let config: BufferConfig = serde_json::from_str(r#"{"max_batch": 10}"#).unwrap();
        assert_eq!(config.max_batch, 10);
        assert_eq!(config.max_queue, 2000);
    }

    #[test]
    fn test_secret_is_redacted() {
        let security = SecurityConfig::new("s3cret").with_ingest_token("tok");
        let debug = format!("{:?}", security);
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("\"tok\""));
    }
}
