//! Error kinds for procflow operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on `ErrorKind` to decide how to react: program-level `try`
/// blocks catch runtime kinds, while manifest integrity kinds abort a run
/// before any session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration or parameters
    ConfigInvalid,

    /// Invalid argument passed to function
    InvalidArgument,

    // =========================================================================
    // Program errors
    // =========================================================================
    /// Program source could not be parsed
    ParseFailed,

    /// A variable was referenced before it was bound
    UnknownVariable,

    /// An agent name was referenced that the program never defined
    UnknownAgent,

    // =========================================================================
    // Session errors
    // =========================================================================
    /// Session creation, prompt delivery or a turn failed
    AdapterFailed,

    /// The session stream was consumed twice
    StreamConsumed,

    // =========================================================================
    // Manifest integrity errors
    // =========================================================================
    /// The manifest carries no hash
    ManifestHashMissing,

    /// The manifest carries no signature
    ManifestSignatureMissing,

    /// The recomputed manifest hash differs from the carried one
    ManifestHashMismatch,

    /// The manifest signature does not match its hash
    ManifestSignatureMismatch,

    /// The program hash does not match the program text
    ProgramHashMismatch,

    // =========================================================================
    // Event delivery errors
    // =========================================================================
    /// An event batch could not be delivered to the collector
    EventDeliveryFailed,

    // =========================================================================
    // Storage errors
    // =========================================================================
    /// Storage operation failed
    StorageFailed,

    /// Serialization/deserialization failed
    SerializationFailed,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    /// Network error
    NetworkFailed,

    /// Rate limit exceeded
    RateLimited,

    /// The run was canceled by its caller
    Canceled,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // Program
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::UnknownVariable => "UnknownVariable",
            ErrorKind::UnknownAgent => "UnknownAgent",

            // Session
            ErrorKind::AdapterFailed => "AdapterFailed",
            ErrorKind::StreamConsumed => "StreamConsumed",

            // Manifest
            ErrorKind::ManifestHashMissing => "ManifestHashMissing",
            ErrorKind::ManifestSignatureMissing => "ManifestSignatureMissing",
            ErrorKind::ManifestHashMismatch => "ManifestHashMismatch",
            ErrorKind::ManifestSignatureMismatch => "ManifestSignatureMismatch",
            ErrorKind::ProgramHashMismatch => "ProgramHashMismatch",

            // Events
            ErrorKind::EventDeliveryFailed => "EventDeliveryFailed",

            // Storage
            ErrorKind::StorageFailed => "StorageFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::Canceled => "Canceled",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::AdapterFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::EventDeliveryFailed
        )
    }

    /// Manifest integrity failures; these are fatal before execution starts
    /// and are never handed to a program-level `try`.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            ErrorKind::ManifestHashMissing
                | ErrorKind::ManifestSignatureMissing
                | ErrorKind::ManifestHashMismatch
                | ErrorKind::ManifestSignatureMismatch
                | ErrorKind::ProgramHashMismatch
        )
    }

    /// Whether a program-level `try` may catch this kind
    pub fn is_catchable(&self) -> bool {
        !self.is_integrity() && *self != ErrorKind::Canceled
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::ParseFailed.to_string(), "ParseFailed");
        assert_eq!(ErrorKind::ManifestHashMismatch.to_string(), "ManifestHashMismatch");
    }

    #[test]
    fn test_is_retryable() {
        assert!(ErrorKind::NetworkFailed.is_retryable());
        assert!(ErrorKind::AdapterFailed.is_retryable());
        assert!(!ErrorKind::ParseFailed.is_retryable());
        assert!(!ErrorKind::UnknownVariable.is_retryable());
    }

    #[test]
    fn test_integrity_kinds_are_not_catchable() {
        assert!(ErrorKind::ManifestSignatureMismatch.is_integrity());
        assert!(!ErrorKind::ManifestSignatureMismatch.is_catchable());
        assert!(!ErrorKind::Canceled.is_catchable());
        assert!(ErrorKind::AdapterFailed.is_catchable());
        assert!(ErrorKind::UnknownVariable.is_catchable());
    }
}
