//! Deterministic adapter that needs no backend.
//!
//! Every session answers with the prompt it was sent, wrapped in
//! `<result>` markers, and reports nominal usage. Session ids are
//! sequential (`echo-1`, `echo-2`, …) so runs are reproducible.

use super::{SessionAdapter, SessionArgs, SessionHandle, Turn, TurnStream};
use crate::error::{self, Result};
use crate::event::{AgentEvent, Usage};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EchoAdapter {
    next_id: AtomicU64,
}

impl EchoAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn open(&self, session_id: String, resumed: bool) -> EchoSession {
        EchoSession {
            session_id,
            resumed,
            prompt: None,
            streamed: false,
            closed: false,
        }
    }
}

impl SessionAdapter for EchoAdapter {
    type Handle = EchoSession;

    fn name(&self) -> &str {
        "echo"
    }

    async fn create_session(&self, _args: &SessionArgs) -> Result<EchoSession> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(self.open(format!("echo-{}", n), false))
    }

    async fn resume_session(&self, _args: &SessionArgs, session_id: &str) -> Result<EchoSession> {
        Ok(self.open(session_id.to_string(), true))
    }
}

#[derive(Debug)]
pub struct EchoSession {
    session_id: String,
    resumed: bool,
    prompt: Option<String>,
    streamed: bool,
    closed: bool,
}

impl EchoSession {
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl SessionHandle for EchoSession {
    fn session_id(&self) -> Option<&str> {
        Some(&self.session_id)
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        if self.closed {
            return Err(error::adapter_failed("echo", "session is closed"));
        }
        self.prompt = Some(text.to_string());
        Ok(())
    }

    fn stream(&mut self) -> Result<TurnStream> {
        if self.streamed {
            return Err(error::stream_consumed(Some(&self.session_id)));
        }
        self.streamed = true;

        let prompt = self.prompt.take().unwrap_or_default();
        let words = prompt.split_whitespace().count() as u64;
        let started = if self.resumed {
            AgentEvent::SessionResumed {
                session_id: self.session_id.clone(),
            }
        } else {
            AgentEvent::SessionStarted {
                session_id: self.session_id.clone(),
            }
        };

        Ok(TurnStream::from_turns(vec![
            Turn::event(started).with_session_id(&self.session_id),
            Turn::text(format!("<result>\n{}\n</result>", prompt))
                .with_usage(Usage::new(words, words).with_message_id(format!("{}-reply", self.session_id))),
        ]))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
