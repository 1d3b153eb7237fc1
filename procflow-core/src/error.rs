//! procflow-core error types
//!
//! Re-exports procflow-error and provides core-specific constructors.

pub use procflow_error::{Error, ErrorKind, ErrorStatus, Result};

// =============================================================================
// Program errors
// =============================================================================

/// Create a ParseFailed error for a source line
pub fn parse_error(line: usize, message: impl Into<String>) -> Error {
    Error::parse_failed(line, message).with_operation("parser::parse")
}

/// Create a bad-indent ParseFailed error
pub fn bad_indent(line: usize, expected: usize, found: usize) -> Error {
    parse_error(
        line,
        format!("bad indent: expected {} spaces, found {}", expected, found),
    )
    .with_context("expected", expected.to_string())
    .with_context("found", found.to_string())
}

/// Create an UnknownVariable error
pub fn unknown_variable(name: impl Into<String>) -> Error {
    Error::unknown_variable(name).with_operation("interpreter::eval")
}

/// Create an UnknownAgent error
pub fn unknown_agent(name: impl Into<String>) -> Error {
    let name = name.into();
    Error::new(ErrorKind::UnknownAgent, format!("agent '{}' is not defined", name))
        .with_operation("interpreter::session")
        .with_context("agent", name)
}

// =============================================================================
// Session errors
// =============================================================================

/// Create an AdapterFailed error
pub fn adapter_failed(adapter: &str, reason: impl Into<String>) -> Error {
    Error::adapter_failed(reason).with_context("adapter", adapter.to_string())
}

/// Create a StreamConsumed error
pub fn stream_consumed(session_id: Option<&str>) -> Error {
    Error::new(ErrorKind::StreamConsumed, "turn stream already taken")
        .with_context("session_id", session_id.unwrap_or("-").to_string())
}

// =============================================================================
// Manifest errors
// =============================================================================

pub fn manifest_hash_missing(run_id: &str) -> Error {
    Error::new(ErrorKind::ManifestHashMissing, "manifest has no manifestHash")
        .with_operation("manifest::verify")
        .with_context("run_id", run_id.to_string())
}

pub fn manifest_signature_missing(run_id: &str) -> Error {
    Error::new(ErrorKind::ManifestSignatureMissing, "manifest has no manifestSig")
        .with_operation("manifest::verify")
        .with_context("run_id", run_id.to_string())
}

pub fn manifest_hash_mismatch(run_id: &str, expected: &str, found: &str) -> Error {
    Error::new(ErrorKind::ManifestHashMismatch, "manifest hash does not match its contents")
        .with_operation("manifest::verify")
        .with_context("run_id", run_id.to_string())
        .with_context("expected", expected.to_string())
        .with_context("found", found.to_string())
}

pub fn manifest_signature_mismatch(run_id: &str) -> Error {
    Error::new(ErrorKind::ManifestSignatureMismatch, "manifest signature is invalid")
        .with_operation("manifest::verify")
        .with_context("run_id", run_id.to_string())
}

pub fn program_hash_mismatch(run_id: &str, expected: &str, found: &str) -> Error {
    Error::new(ErrorKind::ProgramHashMismatch, "program hash does not match program text")
        .with_operation("manifest::verify")
        .with_context("run_id", run_id.to_string())
        .with_context("expected", expected.to_string())
        .with_context("found", found.to_string())
}

// =============================================================================
// Storage / IO errors
// =============================================================================

pub fn io_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::IoFailed, message)
}

pub fn serialization_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::SerializationFailed, message)
}

pub fn storage_failed(reason: impl Into<String>) -> Error {
    Error::new(ErrorKind::StorageFailed, reason)
}

pub fn network_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::NetworkFailed, message)
}

pub fn config_invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::ConfigInvalid, message)
}
