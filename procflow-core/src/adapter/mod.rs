//! # Session Adapter Protocol
//!
//! The contract between the interpreter and a conversational agent backend.
//!
//! ## Design
//! - `SessionAdapter` creates or resumes sessions and hands out a `SessionHandle`
//! - `SessionHandle::send` delivers the rendered prompt
//! - `SessionHandle::stream` yields the turns the backend produces, once
//! - Every backend-specific payload is translated into [`AgentEvent`]s
//!   before it leaves the adapter
//!
//! Adapters shipped with the core:
//! - [`EchoAdapter`]: deterministic, echoes the prompt inside `<result>` markers
//! - [`MessagesAdapter`]: streams the Anthropic Messages API

pub mod echo;
pub mod messages;
pub mod translate;

pub use echo::{EchoAdapter, EchoSession};
pub use messages::{MessagesAdapter, MessagesConfig, MessagesSession};

use crate::error::Result;
use crate::event::{AgentEvent, Usage};
use futures_core::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Everything an adapter needs to open a session
#[derive(Debug, Clone, Default)]
pub struct SessionArgs {
    pub run_id: String,
    pub principal_id: String,
    pub agent_name: String,
    pub model: Option<String>,
    /// The agent's system prompt
    pub system_prompt: Option<String>,
    /// Task title of the statement that opened the session
    pub title: String,
}

/// One unit of output from a session stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Turn {
    pub session_id: Option<String>,
    pub usage: Option<Usage>,
    pub event: Option<AgentEvent>,
    pub text: Option<String>,
}

impl Turn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn event(event: AgentEvent) -> Self {
        Self {
            event: Some(event),
            ..Default::default()
        }
    }

    pub fn usage(usage: Usage) -> Self {
        Self {
            usage: Some(usage),
            ..Default::default()
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Forward-only stream of turns.
///
/// Dropping the stream cancels it. It has to be drained to the end for
/// usage totals to be complete and for the backend to shut down cleanly.
pub struct TurnStream {
    inner: Pin<Box<dyn Stream<Item = Result<Turn>> + Send>>,
}

impl TurnStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Turn>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// A stream over turns that are already known
    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self::new(futures_util::stream::iter(turns.into_iter().map(Ok)))
    }

    /// Stop consuming; the backend sees the stream dropped
    pub fn cancel(self) {}
}

impl Stream for TurnStream {
    type Item = Result<Turn>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// A conversational agent backend
#[allow(async_fn_in_trait)]
pub trait SessionAdapter: Send + Sync {
    type Handle: SessionHandle;

    /// Adapter name for logs and error context
    fn name(&self) -> &str;

    /// Open a new session
    async fn create_session(&self, args: &SessionArgs) -> Result<Self::Handle>;

    /// Continue an existing session
    async fn resume_session(&self, args: &SessionArgs, session_id: &str) -> Result<Self::Handle>;
}

/// An open session
#[allow(async_fn_in_trait)]
pub trait SessionHandle {
    /// Session id, once the backend has assigned one
    fn session_id(&self) -> Option<&str>;

    /// Deliver the prompt for the next exchange
    async fn send(&mut self, text: &str) -> Result<()>;

    /// Take the turn stream; a second call fails with `StreamConsumed`
    fn stream(&mut self) -> Result<TurnStream>;

    /// Release backend resources
    async fn close(&mut self) -> Result<()>;
}
