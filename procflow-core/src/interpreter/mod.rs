//! # Interpreter
//!
//! Walks a [`Program`] depth-first, running sessions through a
//! [`SessionAdapter`] and recording results as bindings.
//!
//! ## Design
//! - One interpreter per run. All mutable state lives in `RefCell`s that
//!   are never borrowed across an `.await`
//! - `parallel` branches are polled together on the caller's task via
//!   `FuturesUnordered`; siblings are never aborted
//! - Every binding write goes through the [`ContentStore`] and gets a fresh
//!   content reference
//! - [`Interpreter::run`] flushes and stops the [`EventBuffer`] exactly once,
//!   whatever the outcome

mod session;
mod state;

pub use session::{extract_result, render_prompt, StreamTally, EVENT_PROTOCOL};
pub use state::{preview, Binding, BindingKind, Counters, RuntimeState, PREVIEW_CHARS};

use crate::adapter::{SessionAdapter, SessionArgs, SessionHandle};
use crate::ast::{AgentDef, Branch, Expr, FailurePolicy, Program, SessionCall, Stmt, DEFAULT_AGENT};
use crate::buffer::EventBuffer;
use crate::error::{self, Error, Result};
use crate::event::{AgentEvent, Usage};
use crate::memory::{self, MemoryRecord};
use crate::storage::ContentStore;
use futures_util::future::{FutureExt, LocalBoxFuture};
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Values bound as `input` bindings before the first statement
pub type RunInputs = BTreeMap<String, String>;

/// What a successful run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub run_id: String,
    pub bindings: Vec<Binding>,
    pub outputs: Vec<Binding>,
    pub counters: Counters,
    pub usage: Usage,
}

pub struct Interpreter<A: SessionAdapter> {
    adapter: A,
    store: Arc<dyn ContentStore>,
    buffer: Arc<EventBuffer>,
    inputs: RunInputs,
    state: RefCell<RuntimeState>,
    sessions: RefCell<HashMap<(String, String), String>>,
    counters: RefCell<Counters>,
    usage: RefCell<Usage>,
}

impl<A: SessionAdapter> Interpreter<A> {
    pub fn new(adapter: A, store: Arc<dyn ContentStore>, buffer: Arc<EventBuffer>) -> Self {
        let ctx = buffer.context();
        let state = RuntimeState::new(&ctx.run_id, &ctx.program_hash);
        Self {
            adapter,
            store,
            buffer,
            inputs: RunInputs::new(),
            state: RefCell::new(state),
            sessions: RefCell::new(HashMap::new()),
            counters: RefCell::new(Counters::default()),
            usage: RefCell::new(Usage::default()),
        }
    }

    pub fn with_inputs(mut self, inputs: RunInputs) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn binding(&self, name: &str) -> Option<Binding> {
        self.state.borrow().binding(name).cloned()
    }

    /// Text of a binding
    pub fn value(&self, name: &str) -> Option<String> {
        self.state.borrow().value(name).map(str::to_string)
    }

    pub fn outputs(&self) -> Vec<Binding> {
        self.state.borrow().outputs()
    }

    pub fn counters(&self) -> Counters {
        *self.counters.borrow()
    }

    /// Execute `program` to completion.
    ///
    /// The event buffer is started here and flushed/stopped before this
    /// returns, on success and on failure.
    pub async fn run(&self, program: &Program) -> Result<RunOutcome> {
        let run_id = self.buffer.context().run_id.clone();
        info!(run_id = %run_id, statements = program.statements.len(), adapter = self.adapter.name(), "run started");
        self.buffer.start();

        let result = self.run_inner(program).await;
        self.buffer.flush_all_and_stop().await;

        match result {
            Ok(()) => {
                let state = self.state.borrow();
                let outcome = RunOutcome {
                    run_id: run_id.clone(),
                    bindings: state.bindings().to_vec(),
                    outputs: state.outputs(),
                    counters: self.counters(),
                    usage: self.usage.borrow().clone(),
                };
                info!(run_id = %run_id, outputs = outcome.outputs.len(), tokens = outcome.usage.total_tokens(), "run succeeded");
                Ok(outcome)
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "run failed");
                Err(e)
            }
        }
    }

    async fn run_inner(&self, program: &Program) -> Result<()> {
        for (name, text) in &self.inputs {
            self.write_binding(name, BindingKind::Input, text.clone()).await?;
        }
        self.exec_block(program, &program.statements).await
    }

    fn exec_block<'a>(&'a self, program: &'a Program, block: &'a [Stmt]) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            for stmt in block {
                self.exec(program, stmt).await?;
            }
            Ok(())
        }
        .boxed_local()
    }

    fn exec<'a>(&'a self, program: &'a Program, stmt: &'a Stmt) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            self.counters.borrow_mut().statements += 1;
            debug!(stmt = stmt.label(), "exec");

            match stmt {
                Stmt::Comment { .. } => Ok(()),
                Stmt::Session(call) => self.call_session(program, call, false).await.map(|_| ()),
                Stmt::Resume(call) => self.call_session(program, call, true).await.map(|_| ()),
                Stmt::Let { name, value } => {
                    let text = self.eval(program, value).await?;
                    self.write_binding(name, BindingKind::Let, text).await.map(|_| ())
                }
                Stmt::Output { name, value } => {
                    let text = self.eval(program, value).await?;
                    self.write_binding(name, BindingKind::Output, text).await.map(|_| ())
                }
                Stmt::Try {
                    body,
                    catch_name,
                    catch_body,
                    finally_body,
                } => {
                    self.exec_try(program, body, catch_name.as_deref(), catch_body.as_deref(), finally_body.as_deref())
                        .await
                }
                Stmt::Parallel { policy, branches } => self.exec_parallel(program, *policy, branches).await,
                Stmt::Repeat { count, body } => {
                    for i in 0..*count {
                        debug!(iteration = i + 1, count, "repeat");
                        self.exec_block(program, body).await?;
                    }
                    Ok(())
                }
            }
        }
        .boxed_local()
    }

    async fn exec_try(
        &self,
        program: &Program,
        body: &[Stmt],
        catch_name: Option<&str>,
        catch_body: Option<&[Stmt]>,
        finally_body: Option<&[Stmt]>,
    ) -> Result<()> {
        let mut result = self.exec_block(program, body).await;

        let caught = match (&result, catch_body) {
            (Err(e), Some(handler)) if e.is_catchable() => {
                debug!(error = %e, "caught");
                Some((e.message().to_string(), handler))
            }
            _ => None,
        };
        if let Some((message, handler)) = caught {
            result = match catch_name {
                Some(name) => self.write_binding(name, BindingKind::Let, message).await.map(|_| ()),
                None => Ok(()),
            };
            if result.is_ok() {
                result = self.exec_block(program, handler).await;
            }
        }

        if let Some(finally) = finally_body {
            self.exec_block(program, finally).await?;
        }
        result
    }

    async fn exec_parallel(&self, program: &Program, policy: FailurePolicy, branches: &[Branch]) -> Result<()> {
        debug!(branches = branches.len(), policy = policy.as_str(), "parallel");
        let mut pending: FuturesUnordered<_> = branches
            .iter()
            .map(|branch| self.exec_branch(program, branch))
            .collect();

        let mut first: Option<Error> = None;
        while let Some(result) = pending.next().await {
            if let Err(e) = result {
                warn!(policy = policy.as_str(), error = %e, "parallel branch failed");
                if first.is_none() {
                    first = Some(e);
                }
            }
        }

        match (policy, first) {
            (FailurePolicy::Ignore, _) | (_, None) => Ok(()),
            (_, Some(e)) => Err(e),
        }
    }

    fn exec_branch<'a>(&'a self, program: &'a Program, branch: &'a Branch) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            let (name, call, resume) = match (&branch.name, &branch.stmt) {
                (Some(name), Stmt::Session(call)) => (name, call, false),
                (Some(name), Stmt::Resume(call)) => (name, call, true),
                _ => return self.exec(program, &branch.stmt).await,
            };
            self.counters.borrow_mut().statements += 1;
            let text = self.call_session(program, call, resume).await?;
            self.write_binding(name, BindingKind::Let, text).await.map(|_| ())
        }
        .boxed_local()
    }

    fn eval<'a>(&'a self, program: &'a Program, expr: &'a Expr) -> LocalBoxFuture<'a, Result<String>> {
        async move {
            match expr {
                Expr::Str { value } => Ok(value.clone()),
                Expr::Var { name } => {
                    let value = self.state.borrow().value(name).map(str::to_string);
                    value.ok_or_else(|| error::unknown_variable(name.as_str()))
                }
                Expr::Session(call) => self.call_session(program, call, false).await,
                Expr::Resume(call) => self.call_session(program, call, true).await,
            }
        }
        .boxed_local()
    }

    async fn write_binding(&self, name: &str, kind: BindingKind, text: String) -> Result<Binding> {
        let n = {
            let mut counters = self.counters.borrow_mut();
            counters.bindings_written += 1;
            counters.bindings_written
        };
        let run_id = self.buffer.context().run_id.clone();
        let key = format!("runs/{}/bindings/{}/{}.txt", run_id, name, n);
        let stored = self.store.put(&key, text.as_bytes().to_vec(), "text/plain").await?;

        let binding = Binding {
            name: name.to_string(),
            kind,
            content_ref: stored.content_ref,
            preview: preview(&text),
            summary: None,
            sha256: Some(stored.sha256),
            size: Some(stored.size),
            mime: Some(stored.mime),
        };
        debug!(run_id = %run_id, name, kind = kind.as_str(), content_ref = %binding.content_ref, "binding written");
        self.state.borrow_mut().bind(binding.clone(), text);
        Ok(binding)
    }

    fn resolve_agent(&self, program: &Program, call: &SessionCall) -> Result<AgentDef> {
        match call.agent.as_deref() {
            None => Ok(program
                .agent(DEFAULT_AGENT)
                .cloned()
                .unwrap_or_else(AgentDef::default_agent)),
            Some(name) => program
                .agent(name)
                .cloned()
                .ok_or_else(|| error::unknown_agent(name)),
        }
    }

    /// Run one session and return its result text
    async fn call_session(&self, program: &Program, call: &SessionCall, resume: bool) -> Result<String> {
        let agent = self.resolve_agent(program, call)?;
        let ctx = self.buffer.context().clone();
        let persists = agent.persists();
        let key = (ctx.principal_id.clone(), agent.name.clone());

        let prior = if resume && persists {
            let known = self.sessions.borrow().get(&key).cloned();
            match known {
                Some(id) => Some(id),
                None => memory::load_session_id(self.store.as_ref(), &ctx.run_id, &ctx.principal_id, &agent.name).await?,
            }
        } else {
            None
        };

        let prompt = {
            let state = self.state.borrow();
            render_prompt(&call.title, &agent, state.bindings())
        };
        let args = SessionArgs {
            run_id: ctx.run_id.clone(),
            principal_id: ctx.principal_id.clone(),
            agent_name: agent.name.clone(),
            model: agent.model.clone(),
            system_prompt: agent.prompt.clone(),
            title: call.title.clone(),
        };

        let mut handle = match &prior {
            Some(id) => {
                info!(agent = %agent.name, session_id = %id, title = %call.title, "resuming session");
                self.counters.borrow_mut().sessions_resumed += 1;
                self.adapter.resume_session(&args, id).await
            }
            None => {
                info!(agent = %agent.name, title = %call.title, "creating session");
                self.counters.borrow_mut().sessions_created += 1;
                self.adapter.create_session(&args).await
            }
        }
        .map_err(|e| e.with_context("agent", agent.name.clone()))?;

        let mut session_id = handle.session_id().map(str::to_string).or(prior);
        let drained = self.drive(&mut handle, &agent.name, &key, &prompt, &mut session_id).await;
        if let Err(e) = handle.close().await {
            warn!(agent = %agent.name, error = %e, "failed to close session");
        }
        let tally = drained.map_err(|e| e.with_context("agent", agent.name.clone()).with_context("title", call.title.clone()))?;

        self.usage.borrow_mut().accumulate(&tally.usage);
        let result = tally.final_result();

        if persists {
            if let Some(id) = &session_id {
                let record = MemoryRecord::new(id.as_str(), ctx.principal_id.as_str(), agent.name.as_str(), call.title.as_str());
                memory::save_record(self.store.as_ref(), &ctx.run_id, &record).await?;
            }
        }

        debug!(agent = %agent.name, session_id = ?session_id, chars = result.len(), "session finished");
        Ok(result)
    }

    /// Send the prompt and drain the turn stream
    async fn drive(
        &self,
        handle: &mut A::Handle,
        agent: &str,
        key: &(String, String),
        prompt: &str,
        session_id: &mut Option<String>,
    ) -> Result<StreamTally> {
        if let Some(id) = session_id.as_deref() {
            self.remember_session(key, id);
        }
        handle.send(prompt).await?;
        let mut stream = handle.stream()?;
        let mut tally = StreamTally::default();

        while let Some(turn) = stream.next().await {
            let turn = turn?;

            let announced = match &turn.event {
                Some(AgentEvent::SessionStarted { session_id }) | Some(AgentEvent::SessionResumed { session_id }) => {
                    Some(session_id.clone())
                }
                _ => None,
            };
            if let Some(id) = turn.session_id.clone().or(announced) {
                if session_id.as_deref() != Some(id.as_str()) {
                    self.remember_session(key, &id);
                    *session_id = Some(id);
                }
            }

            if let Some(text) = &turn.text {
                tally.text.push_str(text);
            }
            let usage = turn.usage.filter(|u| tally.record_usage(u));
            if let Some(event) = turn.event {
                if tally.admit(&event) && self.buffer.enqueue(agent, session_id.as_deref(), event, usage).is_some() {
                    self.counters.borrow_mut().events_forwarded += 1;
                }
            }
        }

        Ok(tally)
    }

    fn remember_session(&self, key: &(String, String), session_id: &str) {
        self.sessions.borrow_mut().insert(key.clone(), session_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{EchoAdapter, Turn, TurnStream};
    use crate::buffer::MemorySink;
    use crate::config::{BufferConfig, RunContext, SecurityConfig};
    use crate::error::ErrorKind;
    use crate::parser::parse;
    use crate::storage::MemoryContentStore;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Answers with its title; titles starting with "fail" error mid-stream
    #[derive(Default)]
    struct ScriptedAdapter {
        log: Mutex<Vec<String>>,
        next_id: AtomicU64,
    }

    impl ScriptedAdapter {
        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    struct ScriptedSession {
        id: String,
        title: String,
    }

    impl SessionAdapter for ScriptedAdapter {
        type Handle = ScriptedSession;

        fn name(&self) -> &str {
            "scripted"
        }

        async fn create_session(&self, args: &SessionArgs) -> Result<ScriptedSession> {
            let id = format!("s-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            self.log.lock().unwrap().push(format!("create {}", args.title));
            Ok(ScriptedSession { id, title: args.title.clone() })
        }

        async fn resume_session(&self, args: &SessionArgs, session_id: &str) -> Result<ScriptedSession> {
            self.log.lock().unwrap().push(format!("resume {} {}", session_id, args.title));
            Ok(ScriptedSession { id: session_id.to_string(), title: args.title.clone() })
        }
    }

    impl SessionHandle for ScriptedSession {
        fn session_id(&self) -> Option<&str> {
            Some(&self.id)
        }

        async fn send(&mut self, _text: &str) -> Result<()> {
            Ok(())
        }

        fn stream(&mut self) -> Result<TurnStream> {
            if self.title.starts_with("fail") {
                let err = error::adapter_failed("scripted", format!("{} broke", self.title));
                return Ok(TurnStream::new(futures_util::stream::iter(vec![Err(err)])));
            }
            Ok(TurnStream::from_turns(vec![
                Turn::event(AgentEvent::SessionStarted { session_id: self.id.clone() }),
                Turn::text(format!("<result>{}</result>", self.title)).with_session_id(&self.id),
            ]))
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryContentStore>,
        sink: Arc<MemorySink>,
        buffer: Arc<EventBuffer>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryContentStore::new());
        let sink = Arc::new(MemorySink::new());
        let buffer = Arc::new(EventBuffer::new(
            RunContext::new("run-1", "hash-1", "user-1"),
            BufferConfig::default(),
            Some(SecurityConfig::new("secret")),
            sink.clone(),
        ));
        Fixture { store, sink, buffer }
    }

    fn scripted(f: &Fixture) -> Interpreter<ScriptedAdapter> {
        Interpreter::new(ScriptedAdapter::default(), f.store.clone(), f.buffer.clone())
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let f = fixture();
        let interp = scripted(&f);
        let program = parse("output x = \"a\"\noutput x = \"b\"\n").unwrap();

        let outcome = interp.run(&program).await.unwrap();
        assert_eq!(outcome.outputs.len(), 1);
        assert_eq!(outcome.bindings.len(), 1);
        assert_eq!(interp.value("x").as_deref(), Some("b"));

        let first = f.store.keys().into_iter().filter(|k| k.contains("/bindings/x/")).count();
        assert_eq!(first, 2);
    }

    #[tokio::test]
    async fn test_let_rebinding_withdraws_output() {
        let f = fixture();
        let interp = scripted(&f);
        let program = parse("output x = \"a\"\nlet x = \"b\"\n").unwrap();

        let outcome = interp.run(&program).await.unwrap();
        assert!(outcome.outputs.is_empty());
        assert!(interp.outputs().is_empty());
        assert_eq!(interp.value("x").as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_parallel_fail_fast_runs_every_branch() {
        let f = fixture();
        let interp = scripted(&f);
        let program = parse("parallel:\n  a = session \"A\"\n  b = session \"fail B\"\n  c = session \"C\"\n").unwrap();

        let err = interp.run(&program).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterFailed);
        assert!(err.message().contains("fail B broke"));
        assert_eq!(interp.value("a").as_deref(), Some("A"));
        assert_eq!(interp.value("c").as_deref(), Some("C"));
        assert!(interp.binding("b").is_none());
        assert!(f.buffer.is_stopped());
    }

    #[tokio::test]
    async fn test_parallel_ignore() {
        let f = fixture();
        let interp = scripted(&f);
        let program = parse("parallel(on-fail: ignore):\n  a = session \"A\"\n  b = session \"fail B\"\n").unwrap();

        interp.run(&program).await.unwrap();
        assert_eq!(interp.value("a").as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_parallel_continue_raises_after_all() {
        let f = fixture();
        let interp = scripted(&f);
        let program = parse("parallel(on-fail: continue):\n  session \"fail A\"\n  b = session \"B\"\n").unwrap();

        assert!(interp.run(&program).await.is_err());
        assert_eq!(interp.value("b").as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_try_catch_finally_order() {
        let f = fixture();
        let interp = scripted(&f);
        let source = "\
try:
  session \"fail first\"
  session \"never\"
catch as err:
  let failure = err
finally:
  session \"cleanup\"
session \"after\"
";
        interp.run(&parse(source).unwrap()).await.unwrap();
        assert_eq!(interp.adapter().log(), vec!["create fail first", "create cleanup", "create after"]);
        assert!(interp.value("failure").unwrap().contains("fail first broke"));
        assert!(interp.value("err").unwrap().contains("fail first broke"));
    }

    #[tokio::test]
    async fn test_try_without_catch_reraises_after_finally() {
        let f = fixture();
        let interp = scripted(&f);
        let source = "try:\n  let x = missing\nfinally:\n  session \"cleanup\"\nsession \"never\"\n";

        let err = interp.run(&parse(source).unwrap()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownVariable);
        assert_eq!(interp.adapter().log(), vec!["create cleanup"]);
    }

    #[tokio::test]
    async fn test_repeat_runs_body_count_times() {
        let f = fixture();
        let interp = scripted(&f);
        interp.run(&parse("repeat 3:\n  session \"Loop\"\n").unwrap()).await.unwrap();
        assert_eq!(interp.adapter().log().len(), 3);
        assert_eq!(interp.counters().sessions_created, 3);
    }

    #[tokio::test]
    async fn test_resume_continuity() {
        let f = fixture();
        let interp = scripted(&f);
        let source = "\
agent captain:
  persist: true
session: captain \"First\"
resume: captain \"Second\"
";
        interp.run(&parse(source).unwrap()).await.unwrap();
        assert_eq!(interp.adapter().log(), vec!["create First", "resume s-1 Second"]);
        assert_eq!(interp.counters().sessions_resumed, 1);
    }

    #[tokio::test]
    async fn test_resume_without_persistence_starts_fresh() {
        let f = fixture();
        let interp = scripted(&f);
        let source = "agent captain:\n  model: sonnet\nsession: captain \"First\"\nresume: captain \"Second\"\n";
        interp.run(&parse(source).unwrap()).await.unwrap();
        assert_eq!(interp.adapter().log(), vec!["create First", "create Second"]);
    }

    #[tokio::test]
    async fn test_resume_falls_back_to_memory_record() {
        let f = fixture();
        let record = MemoryRecord::new("old-7", "user-1", "captain", "Earlier");
        memory::save_record(f.store.as_ref(), "run-1", &record).await.unwrap();

        let interp = scripted(&f);
        let source = "agent captain:\n  persist: project\nresume: captain \"Pick up\"\n";
        interp.run(&parse(source).unwrap()).await.unwrap();

        assert_eq!(interp.adapter().log(), vec!["resume old-7 Pick up"]);
        let stored = memory::load_session_id(f.store.as_ref(), "run-1", "user-1", "captain").await.unwrap();
        assert_eq!(stored.as_deref(), Some("old-7"));
    }

    #[tokio::test]
    async fn test_unknown_agent_is_catchable() {
        let f = fixture();
        let interp = scripted(&f);
        let source = "try:\n  session: ghost \"Boo\"\ncatch as err:\n  output why = err\n";
        interp.run(&parse(source).unwrap()).await.unwrap();
        assert!(interp.value("why").unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_echo_run_forwards_events_and_inputs() {
        let f = fixture();
        let mut inputs = RunInputs::new();
        inputs.insert("brief".into(), "the brief".into());
        let interp = Interpreter::new(EchoAdapter::new(), f.store.clone(), f.buffer.clone()).with_inputs(inputs);
        let source = "agent writer:\n  prompt: \"Write well\"\noutput draft = session: writer \"Draft\"\n";

        let outcome = interp.run(&parse(source).unwrap()).await.unwrap();
        let draft = interp.value("draft").unwrap();
        assert!(draft.starts_with("# Task\nDraft\n"));
        assert!(draft.contains("- brief (input): mem://runs/run-1/bindings/brief/1.txt"));
        assert!(!draft.contains("the brief"));
        assert!(draft.ends_with(&format!("# Event protocol\n{}", EVENT_PROTOCOL)));
        assert_eq!(outcome.outputs[0].name, "draft");
        assert!(outcome.usage.total_tokens() > 0);

        let envelopes = f.sink.envelopes();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].agent_name, "writer");
        assert_eq!(envelopes[0].session_id.as_deref(), Some("echo-1"));
        assert!(f.buffer.is_stopped());
    }

    #[tokio::test]
    async fn test_buffer_stopped_once_on_failure() {
        let f = fixture();
        let interp = scripted(&f);
        assert!(interp.run(&parse("let x = nope\n").unwrap()).await.is_err());
        assert!(f.buffer.is_stopped());
        assert_eq!(f.buffer.flush_all_and_stop().await, 0);
    }
}
