//! # procflow-error
//!
//! Unified error handling for procflow.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., ParseFailed, AdapterFailed)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use procflow_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::UnknownVariable, "variable 'draft' is not bound")
//!         .with_operation("interpreter::eval")
//!         .with_context("name", "draft")
//!         .with_context("run_id", "run-42"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, procflow_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using procflow Error
pub type Result<T> = std::result::Result<T, Error>;
