//! # Manifest Verifier
//!
//! A manifest pins everything a run is allowed to use. Before any session
//! is created the manifest is checked in this order:
//!
//! 1. `manifestHash` and `manifestSig` are present
//! 2. `manifestHash` equals the SHA-256 of the canonical JSON of the
//!    security-relevant fields
//! 3. `manifestSig` is the HMAC-SHA256 of `manifestHash` under the shared
//!    secret (constant-time comparison)
//! 4. `programHash` is the SHA-256 of `programText`
//!
//! Each failure is its own error kind and none of them can be caught by a
//! program's `try`.

use crate::canonical::{canonical_json, hmac_sha256_hex, sha256_hex, verify_hmac_sha256_hex};
use crate::config::SecurityConfig;
use crate::error::{self, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// A file the run may read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFile {
    pub path: String,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub run_id: String,
    pub program_hash: String,
    pub program_text: String,
    #[serde(default)]
    pub tool_allowlist: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub files: Vec<ManifestFile>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_servers: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_sig: Option<String>,
}

/// The hashed subset of a manifest
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SecuredFields<'a> {
    run_id: &'a str,
    program_hash: &'a str,
    program_text: &'a str,
    tool_allowlist: &'a [String],
    capabilities: &'a [String],
    files: &'a [ManifestFile],
    env: &'a BTreeMap<String, String>,
    limits: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mcp_servers: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    permission_mode: Option<&'a str>,
}

impl Manifest {
    /// Unsealed manifest for `program_text`
    pub fn new(run_id: impl Into<String>, program_text: impl Into<String>) -> Self {
        let program_text = program_text.into();
        Self {
            run_id: run_id.into(),
            program_hash: sha256_hex(&program_text),
            program_text,
            ..Default::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| error::serialization_error(format!("invalid manifest: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| error::serialization_error(format!("manifest: {}", e)))
    }

    /// Hash of the security-relevant fields
    pub fn compute_hash(&self) -> Result<String> {
        let fields = SecuredFields {
            run_id: &self.run_id,
            program_hash: &self.program_hash,
            program_text: &self.program_text,
            tool_allowlist: &self.tool_allowlist,
            capabilities: &self.capabilities,
            files: &self.files,
            env: &self.env,
            limits: &self.limits,
            tools: self.tools.as_ref(),
            mcp_servers: self.mcp_servers.as_ref(),
            permission_mode: self.permission_mode.as_deref(),
        };
        let value = serde_json::to_value(&fields)
            .map_err(|e| error::serialization_error(format!("manifest fields: {}", e)))?;
        Ok(sha256_hex(canonical_json(&value)))
    }

    /// Fill in `manifestHash` and `manifestSig`
    pub fn seal(&mut self, secret: &str) -> Result<()> {
        let hash = self.compute_hash()?;
        self.manifest_sig = Some(hmac_sha256_hex(secret, &hash));
        self.manifest_hash = Some(hash);
        Ok(())
    }

    pub fn sealed(mut self, secret: &str) -> Result<Self> {
        self.seal(secret)?;
        Ok(self)
    }

    pub fn verify(&self, security: &SecurityConfig) -> Result<()> {
        let run_id = self.run_id.as_str();
        let carried_hash = self
            .manifest_hash
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| error::manifest_hash_missing(run_id))?;
        let signature = self
            .manifest_sig
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| error::manifest_signature_missing(run_id))?;

        let computed = self.compute_hash()?;
        if computed != carried_hash {
            return Err(error::manifest_hash_mismatch(run_id, carried_hash, &computed));
        }

        if !verify_hmac_sha256_hex(&security.shared_secret, carried_hash, signature) {
            return Err(error::manifest_signature_mismatch(run_id));
        }

        let program_hash = sha256_hex(&self.program_text);
        if program_hash != self.program_hash {
            return Err(error::program_hash_mismatch(run_id, &self.program_hash, &program_hash));
        }

        debug!(run_id = %run_id, "manifest verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    const SECRET: &str = "manifest-secret";

    fn manifest() -> Manifest {
        let mut m = Manifest::new("run-1", "session \"Hello\"\n");
        m.tool_allowlist = vec!["Read".into(), "Edit".into()];
        m.capabilities = vec!["fs.read".into()];
        m.files = vec![ManifestFile {
            path: "notes.md".into(),
            sha256: sha256_hex("notes"),
            size: Some(5),
            content_ref: None,
        }];
        m.env.insert("TZ".into(), "UTC".into());
        m.limits = json!({"maxTurns": 20});
        m.permission_mode = Some("plan".into());
        m.sealed(SECRET).unwrap()
    }

    fn kind(m: &Manifest) -> ErrorKind {
        m.verify(&SecurityConfig::new(SECRET)).unwrap_err().kind()
    }

    #[test]
    fn test_sealed_manifest_verifies() {
        assert!(manifest().verify(&SecurityConfig::new(SECRET)).is_ok());
    }

    #[test]
    fn test_tampered_file_hash() {
        let mut m = manifest();
        m.files[0].sha256 = sha256_hex("evil");
        assert_eq!(kind(&m), ErrorKind::ManifestHashMismatch);
    }

    #[test]
    fn test_missing_fields() {
        let mut m = manifest();
        m.manifest_sig = None;
        assert_eq!(kind(&m), ErrorKind::ManifestSignatureMissing);
        m.manifest_hash = Some(String::new());
        assert_eq!(kind(&m), ErrorKind::ManifestHashMissing);
    }

    #[test]
    fn test_wrong_secret() {
        let m = manifest();
        let err = m.verify(&SecurityConfig::new("other")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ManifestSignatureMismatch);
        assert!(!err.is_catchable());
    }

    #[test]
    fn test_program_text_must_match_hash() {
        let mut m = manifest();
        m.program_text = "session \"Other\"\n".into();
        m.seal(SECRET).unwrap();
        assert_eq!(kind(&m), ErrorKind::ProgramHashMismatch);
    }

    #[test]
    fn test_json_round_trip_keeps_seal() {
        let m = manifest();
        let text = m.to_json().unwrap();
        assert!(text.contains("\"manifestHash\""));
        assert!(text.contains("\"permissionMode\""));
        let back = Manifest::from_json(&text).unwrap();
        assert!(back.verify(&SecurityConfig::new(SECRET)).is_ok());
    }
}
