//! `procflow.toml` settings
//!
//! ```toml
//! principal_id = "user-17"
//! collector_url = "https://collector.example/api"
//! store_dir = ".procflow"
//!
//! [security]
//! shared_secret = "…"
//! ingest_token = "…"
//!
//! [buffer]
//! flush_interval_ms = 250
//!
//! [messages]
//! default_model = "claude-sonnet-4-20250514"
//! ```
//!
//! Command-line flags and their environment variables override the file.

use anyhow::{Context, Result};
use procflow_core::{BufferConfig, MessagesConfig, SecurityConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub principal_id: String,
    pub collector_url: Option<String>,
    pub store_dir: PathBuf,
    pub security: SecurityConfig,
    pub buffer: BufferConfig,
    pub messages: MessagesConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            principal_id: "local".to_string(),
            collector_url: None,
            store_dir: PathBuf::from(".procflow"),
            security: SecurityConfig::default(),
            buffer: BufferConfig::default(),
            messages: MessagesConfig::default(),
        }
    }
}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid settings")
    }

    /// Load `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Self::from_toml(&text)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn require_secret(&self) -> Result<&str> {
        if self.security.shared_secret.is_empty() {
            anyhow::bail!("no shared secret: pass --secret, set PROCFLOW_SECRET or [security] shared_secret");
        }
        Ok(&self.security.shared_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.principal_id, "local");
        assert_eq!(settings.buffer.max_batch, 50);
        assert!(settings.require_secret().is_err());
    }

    #[test]
    fn test_partial_file() {
        let settings = Settings::from_toml(
            r#"
principal_id = "user-17"
collector_url = "http://collector.local"

[security]
shared_secret = "s3"

[buffer]
flush_interval_ms = 250

[messages]
default_model = "claude-3-5-haiku-20241022"
"#,
        )
        .unwrap();

        assert_eq!(settings.principal_id, "user-17");
        assert_eq!(settings.collector_url.as_deref(), Some("http://collector.local"));
        assert_eq!(settings.require_secret().unwrap(), "s3");
        assert_eq!(settings.buffer.flush_interval_ms, 250);
        assert_eq!(settings.buffer.max_queue, 2000);
        assert_eq!(settings.messages.default_model, "claude-3-5-haiku-20241022");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "store_dir = \"/tmp/pf\"").unwrap();
        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.store_dir, PathBuf::from("/tmp/pf"));
        assert!(Settings::load(Some(Path::new("/nonexistent/procflow.toml"))).is_err());
    }
}
