//! # procflow core
//!
//! Runs process programs: small indentation-based scripts that sequence
//! conversational agent sessions into durable, auditable work.
//!
//! ## Core Concepts
//! - **Program**: parsed agent definitions and statements ([`parse`])
//! - **Interpreter**: walks statements, runs sessions, writes bindings
//! - **Session adapter**: pluggable agent backend streaming turns and events
//! - **Event buffer**: bounded, signed, batched delivery to a collector
//! - **Manifest**: signed, hash-pinned inputs verified before a run starts
//! - **Content store**: where binding contents and memory records live

pub mod adapter;
pub mod ast;
pub mod buffer;
pub mod canonical;
pub mod config;
pub mod error;
pub mod event;
pub mod interpreter;
pub mod manifest;
pub mod memory;
pub mod parser;
pub mod storage;

pub use adapter::{
    EchoAdapter, MessagesAdapter, MessagesConfig, SessionAdapter, SessionArgs, SessionHandle, Turn, TurnStream,
};
pub use ast::{AgentDef, Branch, Expr, FailurePolicy, Program, SessionCall, Stmt};
pub use buffer::{EventBatch, EventBuffer, EventSink, HttpEventSink, MemorySink, SignedBatch};
pub use config::{BufferConfig, RunContext, SecurityConfig};
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use event::{AgentEvent, AgentEventEnvelope, Usage};
pub use interpreter::{Binding, BindingKind, Counters, Interpreter, RunInputs, RunOutcome};
pub use manifest::{Manifest, ManifestFile};
pub use parser::parse;
pub use storage::{ContentStore, FileContentStore, MemoryContentStore, StoredContent};
