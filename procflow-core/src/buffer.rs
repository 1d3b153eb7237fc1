//! # Event Buffer
//!
//! Batches agent events and ships them to the collector.
//!
//! ## Design
//! - `enqueue` never blocks: it stamps `seq` and `ts` and appends to a bounded
//!   queue, dropping the oldest entries once `max_queue` is exceeded
//! - A timer task flushes every `flush_interval`; only one flush runs at a
//!   time and a flush that finds another in progress is skipped
//! - Each flush sends up to `max_batch` events, then at most one more batch
//!   immediately before leaving the rest to the next tick
//! - Batches are signed: HMAC-SHA256 over the canonical JSON of the body
//! - Delivery failures are logged and the batch is discarded; there are no
//!   retries
//! - `flush_all_and_stop` stops the timer and drains the queue exactly once

use crate::canonical::{canonical_json, hmac_sha256_hex};
use crate::config::{BufferConfig, RunContext, SecurityConfig};
use crate::error::{self, Error, Result};
use crate::event::{AgentEvent, AgentEventEnvelope, Usage, EVENT_VERSION};
use futures_util::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Header carrying the ingest token
pub const TOKEN_HEADER: &str = "x-procflow-token";
/// Header carrying the batch signature
pub const SIGNATURE_HEADER: &str = "x-procflow-signature";

/// Body of one delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBatch {
    pub ok: bool,
    pub v: u32,
    pub run_id: String,
    pub program_hash: String,
    pub principal_id: String,
    pub source: String,
    pub events: Vec<AgentEventEnvelope>,
}

impl EventBatch {
    pub fn new(ctx: &RunContext, source: &str, events: Vec<AgentEventEnvelope>) -> Self {
        Self {
            ok: true,
            v: EVENT_VERSION,
            run_id: ctx.run_id.clone(),
            program_hash: ctx.program_hash.clone(),
            principal_id: ctx.principal_id.clone(),
            source: source.to_string(),
            events,
        }
    }

    /// Canonical text of the batch; this is both the request body and
    /// the signed message
    pub fn canonical_body(&self) -> Result<String> {
        let value = serde_json::to_value(self)
            .map_err(|e| error::serialization_error(format!("event batch: {}", e)))?;
        Ok(canonical_json(&value))
    }
}

/// A batch ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct SignedBatch {
    pub run_id: String,
    pub body: String,
    /// Hex HMAC of `body`; empty when no secret is configured
    pub signature: String,
    pub token: String,
    pub len: usize,
}

/// Sign a batch with the shared secret
pub fn sign_batch(batch: &EventBatch, security: Option<&SecurityConfig>) -> Result<SignedBatch> {
    let body = batch.canonical_body()?;
    let (signature, token) = match security {
        Some(sec) => (
            hmac_sha256_hex(&sec.shared_secret, &body),
            sec.ingest_token.clone(),
        ),
        None => (String::new(), String::new()),
    };
    Ok(SignedBatch {
        run_id: batch.run_id.clone(),
        body,
        signature,
        token,
        len: batch.events.len(),
    })
}

/// Where batches go
pub trait EventSink: Send + Sync {
    fn deliver<'a>(&'a self, batch: &'a SignedBatch) -> BoxFuture<'a, Result<()>>;
}

/// Posts batches to `{collector}/runs/{runId}/events`
pub struct HttpEventSink {
    client: Client,
    collector_url: String,
}

impl HttpEventSink {
    pub fn new(collector_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| error::config_invalid(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            collector_url: collector_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self, run_id: &str) -> String {
        format!("{}/runs/{}/events", self.collector_url, run_id)
    }
}

impl EventSink for HttpEventSink {
    fn deliver<'a>(&'a self, batch: &'a SignedBatch) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut request = self
                .client
                .post(self.endpoint(&batch.run_id))
                .header("content-type", "application/json")
                .body(batch.body.clone());
            if !batch.token.is_empty() {
                request = request.header(TOKEN_HEADER, &batch.token);
            }
            if !batch.signature.is_empty() {
                request = request.header(SIGNATURE_HEADER, &batch.signature);
            }

            let response = request.send().await.map_err(|e| {
                error::network_error(format!("collector unreachable: {}", e))
                    .with_operation("buffer::deliver")
                    .set_source(e)
            })?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(Error::event_delivery_failed(format!(
                    "collector rejected batch ({}): {}",
                    status.as_u16(),
                    text
                ))
                .with_operation("buffer::deliver")
                .with_context("status", status.as_u16().to_string()));
            }
            Ok(())
        })
    }
}

/// Sink that keeps every batch in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<SignedBatch>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every delivery from now on
    pub fn fail_deliveries(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<SignedBatch> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Every delivered envelope, in delivery order
    pub fn envelopes(&self) -> Vec<AgentEventEnvelope> {
        self.batches()
            .iter()
            .filter_map(|b| serde_json::from_str::<EventBatch>(&b.body).ok())
            .flat_map(|b| b.events)
            .collect()
    }
}

impl EventSink for MemorySink {
    fn deliver<'a>(&'a self, batch: &'a SignedBatch) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::event_delivery_failed("memory sink is failing"));
            }
            self.batches
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(batch.clone());
            Ok(())
        })
    }
}

struct Inner {
    ctx: RunContext,
    config: BufferConfig,
    security: Option<SecurityConfig>,
    sink: Arc<dyn EventSink>,
    queue: Mutex<VecDeque<AgentEventEnvelope>>,
    seq: AtomicU64,
    dropped: AtomicU64,
    flush_lock: tokio::sync::Mutex<()>,
    stopped: AtomicBool,
}

impl Inner {
    fn take_batch(&self) -> Vec<AgentEventEnvelope> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let n = queue.len().min(self.config.max_batch.max(1));
        queue.drain(..n).collect()
    }

    fn queued(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Send one batch; returns how many events left the queue
    async fn send_batch(&self) -> usize {
        let events = self.take_batch();
        if events.is_empty() {
            return 0;
        }
        let len = events.len();
        let first_seq = events[0].seq;
        let batch = EventBatch::new(&self.ctx, &self.config.source, events);

        let result = match sign_batch(&batch, self.security.as_ref()) {
            Ok(signed) => self.sink.deliver(&signed).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => debug!(run_id = %self.ctx.run_id, seq = first_seq, count = len, "delivered event batch"),
            Err(e) => warn!(run_id = %self.ctx.run_id, seq = first_seq, count = len, error = %e, "dropping event batch"),
        }
        len
    }

    async fn flush(&self) -> usize {
        let Ok(_guard) = self.flush_lock.try_lock() else {
            return 0;
        };
        let mut sent = self.send_batch().await;
        if sent > 0 && self.queued() > 0 {
            sent += self.send_batch().await;
        }
        sent
    }

    /// Send until the queue is empty. Callers hold `flush_lock`.
    async fn drain(&self) -> usize {
        let mut sent = 0;
        loop {
            let n = self.send_batch().await;
            if n == 0 {
                return sent;
            }
            sent += n;
        }
    }
}

/// Bounded, signed, batched event delivery for one run
pub struct EventBuffer {
    inner: Arc<Inner>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl EventBuffer {
    pub fn new(
        ctx: RunContext,
        config: BufferConfig,
        security: Option<SecurityConfig>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                config,
                security,
                sink,
                queue: Mutex::new(VecDeque::new()),
                seq: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                flush_lock: tokio::sync::Mutex::new(()),
                stopped: AtomicBool::new(false),
            }),
            timer: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.inner.ctx
    }

    /// Start the flush timer. Must be called inside a tokio runtime.
    pub fn start(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if timer.is_some() || self.is_stopped() {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.flush_interval();
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.stopped.load(Ordering::SeqCst) {
                    break;
                }
                inner.flush().await;
            }
        }));
    }

    /// Queue one event; returns its sequence number, or `None` once stopped
    pub fn enqueue(
        &self,
        agent_name: &str,
        session_id: Option<&str>,
        event: AgentEvent,
        usage: Option<Usage>,
    ) -> Option<u64> {
        if self.is_stopped() {
            debug!(run_id = %self.inner.ctx.run_id, kind = event.kind(), "buffer stopped, event ignored");
            return None;
        }

        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = AgentEventEnvelope {
            v: EVENT_VERSION,
            run_id: self.inner.ctx.run_id.clone(),
            program_hash: self.inner.ctx.program_hash.clone(),
            principal_id: self.inner.ctx.principal_id.clone(),
            agent_name: agent_name.to_string(),
            session_id: session_id.map(str::to_string),
            seq,
            ts: chrono::Utc::now().to_rfc3339(),
            event,
            usage,
        };

        let mut queue = self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.push_back(envelope);
        let max = self.inner.config.max_queue.max(1);
        while queue.len() > max {
            queue.pop_front();
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
        Some(seq)
    }

    /// Snapshot of queued events, oldest first
    pub fn pending(&self) -> Vec<AgentEventEnvelope> {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Number of events dropped on overflow
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Flush now; skipped if a flush is already running
    pub async fn flush(&self) -> usize {
        self.inner.flush().await
    }

    /// Stop the timer and deliver everything still queued. Only the first
    /// call does any work.
    pub async fn flush_all_and_stop(&self) -> usize {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return 0;
        }
        // A timer flush may be mid-delivery with its batch already taken off
        // the queue; wait for it before aborting the timer.
        let _guard = self.inner.flush_lock.lock().await;
        if let Some(handle) = self.timer.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
        let sent = self.inner.drain().await;
        debug!(run_id = %self.inner.ctx.run_id, sent, dropped = self.dropped(), "event buffer stopped");
        sent
    }
}

impl Drop for EventBuffer {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}
