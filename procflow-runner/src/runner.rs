//! Runner implementation - manifest gate, buffer wiring, terminal status

use futures_util::future::BoxFuture;
use procflow_core::{
    parse, Binding, BufferConfig, ContentStore, Error, ErrorKind, EventBuffer, EventSink,
    HttpEventSink, Interpreter, Manifest, Program, Result, RunContext, RunInputs, RunOutcome,
    SecurityConfig, SessionAdapter, SignedBatch,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for the runner
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    pub security: SecurityConfig,
    pub buffer: BufferConfig,
    /// Principal the run acts for
    pub principal_id: String,
    /// Collector base URL; events are only logged when unset
    pub collector_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Canceled,
}

/// Terminal state of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub outputs: Vec<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
}

impl RunReport {
    fn succeeded(outcome: RunOutcome) -> Self {
        Self {
            run_id: outcome.run_id.clone(),
            status: RunStatus::Succeeded,
            error: None,
            error_kind: None,
            outputs: outcome.outputs.clone(),
            outcome: Some(outcome),
        }
    }

    fn failed(run_id: &str, error: &Error) -> Self {
        Self {
            run_id: run_id.to_string(),
            status: RunStatus::Failed,
            error: Some(error.message().to_string()),
            error_kind: Some(error.kind().as_str().to_string()),
            outputs: Vec::new(),
            outcome: None,
        }
    }

    fn canceled(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            status: RunStatus::Canceled,
            error: Some("run canceled".to_string()),
            error_kind: Some(ErrorKind::Canceled.as_str().to_string()),
            outputs: Vec::new(),
            outcome: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// Sink used when no collector is configured: batches go to the log
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn deliver<'a>(&'a self, batch: &'a SignedBatch) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            debug!(run_id = %batch.run_id, count = batch.len, body = %batch.body, "event batch");
            Ok(())
        })
    }
}

/// Runs programs pinned by signed manifests
pub struct Runner {
    config: RunnerConfig,
    store: Arc<dyn ContentStore>,
    sink: Option<Arc<dyn EventSink>>,
}

impl Runner {
    pub fn new(config: RunnerConfig, store: Arc<dyn ContentStore>) -> Self {
        Self {
            config,
            store,
            sink: None,
        }
    }

    /// Deliver events to `sink` instead of the configured collector
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Verify the manifest and parse its program
    pub fn prepare(&self, manifest: &Manifest) -> Result<Program> {
        manifest.verify(&self.config.security)?;
        parse(&manifest.program_text)
    }

    fn event_sink(&self) -> Result<Arc<dyn EventSink>> {
        if let Some(sink) = &self.sink {
            return Ok(sink.clone());
        }
        let sink: Arc<dyn EventSink> = match &self.config.collector_url {
            Some(url) => Arc::new(HttpEventSink::new(url.as_str())?),
            None => Arc::new(LogSink),
        };
        Ok(sink)
    }

    /// Run to completion
    pub async fn run<A: SessionAdapter>(&self, adapter: A, manifest: &Manifest, inputs: RunInputs) -> RunReport {
        self.run_until(adapter, manifest, inputs, std::future::pending::<()>()).await
    }

    /// Run until the program finishes or `cancel` resolves, whichever
    /// comes first. Events already queued are still delivered on cancel.
    pub async fn run_until<A, F>(&self, adapter: A, manifest: &Manifest, inputs: RunInputs, cancel: F) -> RunReport
    where
        A: SessionAdapter,
        F: Future<Output = ()>,
    {
        let run_id = manifest.run_id.as_str();

        let program = match self.prepare(manifest) {
            Ok(program) => program,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "run rejected before start");
                return RunReport::failed(run_id, &e);
            }
        };
        let sink = match self.event_sink() {
            Ok(sink) => sink,
            Err(e) => return RunReport::failed(run_id, &e),
        };

        let ctx = RunContext::new(run_id, manifest.program_hash.as_str(), self.config.principal_id.as_str());
        let buffer = Arc::new(EventBuffer::new(
            ctx,
            self.config.buffer.clone(),
            Some(self.config.security.clone()),
            sink,
        ));
        let interpreter = Interpreter::new(adapter, self.store.clone(), buffer.clone()).with_inputs(inputs);

        tokio::select! {
            result = interpreter.run(&program) => match result {
                Ok(outcome) => RunReport::succeeded(outcome),
                Err(e) => RunReport::failed(run_id, &e),
            },
            _ = cancel => {
                info!(run_id = %run_id, "run canceled");
                buffer.flush_all_and_stop().await;
                RunReport::canceled(run_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procflow_core::adapter::{SessionArgs, SessionHandle, TurnStream};
    use procflow_core::{EchoAdapter, MemoryContentStore, MemorySink};
    use std::time::Duration;

    const SECRET: &str = "runner-secret";

    fn runner(sink: Arc<MemorySink>) -> Runner {
        let config = RunnerConfig {
            security: SecurityConfig::new(SECRET),
            principal_id: "user-1".into(),
            ..Default::default()
        };
        Runner::new(config, Arc::new(MemoryContentStore::new())).with_sink(sink)
    }

    fn manifest(source: &str) -> Manifest {
        Manifest::new("run-1", source).sealed(SECRET).unwrap()
    }

    #[tokio::test]
    async fn test_run_succeeds() {
        let sink = Arc::new(MemorySink::new());
        let report = runner(sink.clone())
            .run(EchoAdapter::new(), &manifest("output answer = session \"Hi\"\n"), RunInputs::new())
            .await;

        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(report.outputs[0].name, "answer");
        assert_eq!(sink.envelopes()[0].principal_id, "user-1");
    }

    #[test]
    fn test_tampered_manifest_fails_before_any_session() {
        let sink = Arc::new(MemorySink::new());
        let mut m = manifest("session \"Hi\"\n");
        m.env.insert("EXTRA".into(), "1".into());

        let report = tokio_test::block_on(runner(sink.clone()).run(EchoAdapter::new(), &m, RunInputs::new()));
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.error_kind.as_deref(), Some("ManifestHashMismatch"));
        assert!(sink.batches().is_empty());
    }

    #[tokio::test]
    async fn test_parse_error_fails_run() {
        let report = runner(Arc::new(MemorySink::new()))
            .run(EchoAdapter::new(), &manifest("repeat x:\n  session \"a\"\n"), RunInputs::new())
            .await;
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.error_kind.as_deref(), Some("ParseFailed"));
    }

    /// Sessions that never produce a turn
    struct StalledAdapter;
    struct StalledSession;

    impl SessionAdapter for StalledAdapter {
        type Handle = StalledSession;

        fn name(&self) -> &str {
            "stalled"
        }

        async fn create_session(&self, _args: &SessionArgs) -> Result<StalledSession> {
            Ok(StalledSession)
        }

        async fn resume_session(&self, _args: &SessionArgs, _id: &str) -> Result<StalledSession> {
            Ok(StalledSession)
        }
    }

    impl SessionHandle for StalledSession {
        fn session_id(&self) -> Option<&str> {
            Some("stalled-1")
        }

        async fn send(&mut self, _text: &str) -> Result<()> {
            Ok(())
        }

        fn stream(&mut self) -> Result<TurnStream> {
            Ok(TurnStream::new(futures_util::stream::pending()))
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancel_reports_canceled() {
        let report = runner(Arc::new(MemorySink::new()))
            .run_until(
                StalledAdapter,
                &manifest("session \"Forever\"\n"),
                RunInputs::new(),
                tokio::time::sleep(Duration::from_millis(20)),
            )
            .await;
        assert_eq!(report.status, RunStatus::Canceled);
        assert!(!report.is_success());
    }
}
