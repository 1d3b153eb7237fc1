//! # Content storage
//!
//! Binding content and per-agent memory records are written through a
//! [`ContentStore`]: `put(key, bytes, mime)` returns an opaque content
//! reference together with the sha256 and size of what was written. The
//! interpreter never looks behind the reference.
//!
//! Two backends ship with the core: [`MemoryContentStore`] (volatile, used
//! by tests and dry runs) and [`FileContentStore`] (a directory tree).

use crate::canonical::sha256_hex;
use crate::error::{self, Result};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Receipt for one write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredContent {
    pub content_ref: String,
    pub sha256: String,
    pub size: u64,
    pub mime: String,
}

impl StoredContent {
    fn describe(content_ref: String, bytes: &[u8], mime: &str) -> Self {
        Self {
            content_ref,
            sha256: sha256_hex(bytes),
            size: bytes.len() as u64,
            mime: mime.to_string(),
        }
    }
}

/// Storage backend trait
pub trait ContentStore: Send + Sync {
    /// Write `bytes` under `key`, replacing anything stored there
    fn put<'a>(
        &'a self,
        key: &'a str,
        bytes: Vec<u8>,
        mime: &'a str,
    ) -> BoxFuture<'a, Result<StoredContent>>;

    /// Read the bytes stored under `key`
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>>;
}

/// In-memory storage (volatile, but useful for testing)
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = data.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Resolve a `mem://` reference back to its key
    pub fn key_for_ref(content_ref: &str) -> Option<&str> {
        content_ref.strip_prefix("mem://")
    }
}

impl ContentStore for MemoryContentStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        bytes: Vec<u8>,
        mime: &'a str,
    ) -> BoxFuture<'a, Result<StoredContent>> {
        Box::pin(async move {
            let stored = StoredContent::describe(format!("mem://{}", key), &bytes, mime);
            self.data
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key.to_string(), bytes);
            Ok(stored)
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        Box::pin(async move {
            Ok(self
                .data
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(key)
                .cloned())
        })
    }
}

/// File-based storage (persistent)
#[derive(Debug, Clone)]
pub struct FileContentStore {
    base_path: PathBuf,
}

impl FileContentStore {
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)
            .map_err(|e| error::io_error(format!("Failed to create storage dir: {}", e)))?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Map a `/`-separated key onto a path below the base directory
    fn key_to_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.base_path.clone();
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            let safe = segment.replace(['\\', ':', '*', '?', '"', '<', '>', '|'], "_");
            if !matches!(Path::new(&safe).components().next(), Some(Component::Normal(_))) {
                return Err(error::storage_failed(format!("invalid storage key '{}'", key))
                    .with_context("key", key.to_string()));
            }
            path.push(safe);
        }
        if path == self.base_path {
            return Err(error::storage_failed("empty storage key"));
        }
        Ok(path)
    }
}

impl ContentStore for FileContentStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        bytes: Vec<u8>,
        mime: &'a str,
    ) -> BoxFuture<'a, Result<StoredContent>> {
        Box::pin(async move {
            let path = self.key_to_path(key)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| error::io_error(format!("Failed to create {}: {}", parent.display(), e)))?;
            }
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|e| error::io_error(format!("Failed to write {}: {}", path.display(), e)))?;
            Ok(StoredContent::describe(
                format!("file://{}", path.display()),
                &bytes,
                mime,
            ))
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        Box::pin(async move {
            let path = self.key_to_path(key)?;
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(error::io_error(format!("Failed to read {}: {}", path.display(), e))),
            }
        })
    }
}
