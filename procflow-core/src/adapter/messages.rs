//! Anthropic Messages API adapter.
//!
//! Each session keeps its transcript in the adapter, so resuming a session
//! id continues the same conversation for as long as the adapter lives.
//! Replies are streamed over SSE and translated into turns:
//! - text deltas become text turns
//! - thinking blocks become `thinking` events
//! - tool-use blocks go through [`translate_tool_use`]
//! - inline `<event>` markers in the final text become structured events
//! - message usage is reported once, tagged with the message id

use super::translate::{parse_inline_events, translate_tool_use};
use super::{SessionAdapter, SessionArgs, SessionHandle, Turn, TurnStream};
use crate::error::{self, Result};
use crate::event::{AgentEvent, Usage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

const ADAPTER: &str = "messages";

/// Configuration for the Messages API adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    pub max_tokens: usize,
    pub timeout_secs: u64,
    pub api_version: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com/v1".into(),
            default_model: "claude-sonnet-4-20250514".into(),
            max_tokens: 4096,
            timeout_secs: 300,
            api_version: "2023-06-01".into(),
        }
    }
}

impl MessagesConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Map the short model names programs use onto API model ids
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        match requested {
            None => self.default_model.clone(),
            Some("sonnet") => "claude-sonnet-4-20250514".into(),
            Some("opus") => "claude-opus-4-20250514".into(),
            Some("haiku") => "claude-3-5-haiku-20241022".into(),
            Some(other) => other.to_string(),
        }
    }
}

type Transcripts = Arc<Mutex<HashMap<String, Vec<ApiMessage>>>>;

/// Adapter for the Anthropic Messages API
pub struct MessagesAdapter {
    client: Client,
    config: MessagesConfig,
    transcripts: Transcripts,
}

impl MessagesAdapter {
    pub fn new(config: MessagesConfig) -> Result<Self> {
        if config.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(error::config_invalid("messages adapter needs an api key"));
        }
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| error::config_invalid(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            transcripts: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn open(&self, args: &SessionArgs, session_id: String, resumed: bool) -> MessagesSession {
        self.transcripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(session_id.clone())
            .or_default();

        MessagesSession {
            client: self.client.clone(),
            config: self.config.clone(),
            model: self.config.resolve_model(args.model.as_deref()),
            system: args.system_prompt.clone(),
            session_id,
            resumed,
            transcripts: self.transcripts.clone(),
            pending: None,
            streamed: false,
        }
    }
}

impl SessionAdapter for MessagesAdapter {
    type Handle = MessagesSession;

    fn name(&self) -> &str {
        ADAPTER
    }

    async fn create_session(&self, args: &SessionArgs) -> Result<MessagesSession> {
        let session_id = uuid::Uuid::new_v4().to_string();
        debug!(session_id = %session_id, agent = %args.agent_name, "opening messages session");
        Ok(self.open(args, session_id, false))
    }

    async fn resume_session(&self, args: &SessionArgs, session_id: &str) -> Result<MessagesSession> {
        debug!(session_id = %session_id, agent = %args.agent_name, "resuming messages session");
        Ok(self.open(args, session_id.to_string(), true))
    }
}

/// One conversation with the Messages API
pub struct MessagesSession {
    client: Client,
    config: MessagesConfig,
    model: String,
    system: Option<String>,
    session_id: String,
    resumed: bool,
    transcripts: Transcripts,
    pending: Option<String>,
    streamed: bool,
}

impl SessionHandle for MessagesSession {
    fn session_id(&self) -> Option<&str> {
        Some(&self.session_id)
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        self.pending = Some(text.to_string());
        Ok(())
    }

    fn stream(&mut self) -> Result<TurnStream> {
        if self.streamed {
            return Err(error::stream_consumed(Some(&self.session_id)));
        }
        let prompt = self
            .pending
            .take()
            .ok_or_else(|| error::adapter_failed(ADAPTER, "stream requested before send"))?;
        self.streamed = true;

        let messages = {
            let mut transcripts = self.transcripts.lock().unwrap_or_else(PoisonError::into_inner);
            let transcript = transcripts.entry(self.session_id.clone()).or_default();
            transcript.push(ApiMessage {
                role: "user".into(),
                content: prompt,
            });
            transcript.clone()
        };

        let request = ApiRequest {
            model: self.model.clone(),
            messages,
            system: self.system.clone(),
            max_tokens: self.config.max_tokens,
            stream: true,
        };

        let client = self.client.clone();
        let config = self.config.clone();
        let transcripts = self.transcripts.clone();
        let session_id = self.session_id.clone();
        let resumed = self.resumed;

        let stream = async_stream::stream! {
            use futures_util::StreamExt;

            let opened = if resumed {
                AgentEvent::SessionResumed { session_id: session_id.clone() }
            } else {
                AgentEvent::SessionStarted { session_id: session_id.clone() }
            };
            yield Ok(Turn::event(opened).with_session_id(&session_id));

            let response = client
                .post(format!("{}/messages", config.base_url))
                .header("x-api-key", config.api_key.clone().unwrap_or_default())
                .header("anthropic-version", &config.api_version)
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    yield Err(error::adapter_failed(ADAPTER, format!("request failed: {}", e)));
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let text = response.text().await.unwrap_or_default();
                yield Err(error::adapter_failed(ADAPTER, format!("API error ({}): {}", status, text))
                    .with_context("status", status.to_string()));
                return;
            }

            let mut byte_stream = response.bytes_stream();
            let mut frames = SseFrames::default();
            let mut reply = ReplyState::default();

            while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        yield Err(error::adapter_failed(ADAPTER, format!("stream interrupted: {}", e)));
                        return;
                    }
                };
                frames.push(&bytes);

                while let Some(frame) = frames.next_frame() {
                    let Some(data) = frame.lines().find_map(|l| l.strip_prefix("data: ")) else {
                        continue;
                    };
                    let Ok(event) = serde_json::from_str::<StreamEvent>(data) else {
                        continue;
                    };
                    for item in reply.apply(event) {
                        let failed = item.is_err();
                        yield item;
                        if failed {
                            return;
                        }
                    }
                }
            }

            for event in parse_inline_events(&reply.text) {
                yield Ok(Turn::event(event));
            }
            if let Some(usage) = reply.usage() {
                yield Ok(Turn::usage(usage));
            }

            transcripts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(session_id.clone())
                .or_default()
                .push(ApiMessage { role: "assistant".into(), content: reply.text.clone() });
        };

        Ok(TurnStream::new(stream))
    }

    async fn close(&mut self) -> Result<()> {
        self.pending = None;
        Ok(())
    }
}

/// Splits raw SSE bytes into `\n\n`-terminated frames. Decoding waits for
/// a whole frame so multi-byte characters split across chunks survive.
#[derive(Default)]
struct SseFrames {
    pending: Vec<u8>,
}

impl SseFrames {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    fn next_frame(&mut self) -> Option<String> {
        let pos = self.pending.windows(2).position(|w| w == b"\n\n")?;
        let frame: Vec<u8> = self.pending.drain(..pos + 2).take(pos).collect();
        Some(String::from_utf8_lossy(&frame).into_owned())
    }
}

/// Accumulates one streamed reply
#[derive(Default)]
struct ReplyState {
    message_id: Option<String>,
    input_tokens: u64,
    output_tokens: u64,
    cache_read_tokens: u64,
    text: String,
    blocks: HashMap<usize, OpenBlock>,
}

enum OpenBlock {
    Text,
    Thinking(String),
    ToolUse { name: String, json: String, input: serde_json::Value },
}

impl ReplyState {
    fn apply(&mut self, event: StreamEvent) -> Vec<Result<Turn>> {
        match event {
            StreamEvent::MessageStart { message } => {
                self.message_id = Some(message.id);
                if let Some(usage) = message.usage {
                    self.input_tokens = usage.input_tokens;
                    self.output_tokens = usage.output_tokens;
                    self.cache_read_tokens = usage.cache_read_input_tokens;
                }
                Vec::new()
            }
            StreamEvent::ContentBlockStart { index, content_block } => {
                let block = match content_block {
                    BlockStart::Text { text } => {
                        self.text.push_str(&text);
                        OpenBlock::Text
                    }
                    BlockStart::Thinking { thinking } => OpenBlock::Thinking(thinking),
                    BlockStart::ToolUse { name, input } => OpenBlock::ToolUse {
                        name,
                        json: String::new(),
                        input,
                    },
                    BlockStart::Other => OpenBlock::Text,
                };
                self.blocks.insert(index, block);
                Vec::new()
            }
            StreamEvent::ContentBlockDelta { index, delta } => match (delta, self.blocks.get_mut(&index)) {
                (Delta::TextDelta { text }, _) => {
                    self.text.push_str(&text);
                    vec![Ok(Turn::text(text))]
                }
                (Delta::ThinkingDelta { thinking }, Some(OpenBlock::Thinking(buf))) => {
                    buf.push_str(&thinking);
                    Vec::new()
                }
                (Delta::InputJsonDelta { partial_json }, Some(OpenBlock::ToolUse { json, .. })) => {
                    json.push_str(&partial_json);
                    Vec::new()
                }
                _ => Vec::new(),
            },
            StreamEvent::ContentBlockStop { index } => match self.blocks.remove(&index) {
                Some(OpenBlock::Thinking(text)) if !text.is_empty() => {
                    vec![Ok(Turn::event(AgentEvent::Thinking { text }))]
                }
                Some(OpenBlock::ToolUse { name, json, input }) => {
                    let input = if json.is_empty() {
                        input
                    } else {
                        serde_json::from_str(&json).unwrap_or(input)
                    };
                    translate_tool_use(&name, &input)
                        .into_iter()
                        .map(|e| Ok(Turn::event(e)))
                        .collect()
                }
                _ => Vec::new(),
            },
            StreamEvent::MessageDelta { usage } => {
                if let Some(usage) = usage {
                    self.output_tokens = usage.output_tokens;
                }
                Vec::new()
            }
            StreamEvent::Error { error: api_error } => {
                vec![Err(error::adapter_failed(ADAPTER, api_error.message)
                    .with_context("error_type", api_error.kind))]
            }
            StreamEvent::MessageStop | StreamEvent::Ping | StreamEvent::Unknown => Vec::new(),
        }
    }

    fn usage(&self) -> Option<Usage> {
        let id = self.message_id.clone()?;
        let mut usage = Usage::new(self.input_tokens, self.output_tokens).with_message_id(id);
        usage.cache_read_tokens = self.cache_read_tokens;
        Some(usage)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    stream: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: MessageStartBody,
    },
    ContentBlockStart {
        index: usize,
        content_block: BlockStart,
    },
    ContentBlockDelta {
        index: usize,
        delta: Delta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        #[serde(default)]
        usage: Option<DeltaUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageStartBody {
    id: String,
    #[serde(default)]
    usage: Option<StartUsage>,
}

#[derive(Debug, Deserialize)]
struct StartUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockStart {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FileOp;

    fn feed(state: &mut ReplyState, data: &str) -> Vec<Result<Turn>> {
        state.apply(serde_json::from_str::<StreamEvent>(data).unwrap())
    }

    #[test]
    fn test_requires_api_key() {
        assert!(MessagesAdapter::new(MessagesConfig::default()).is_err());
        assert!(MessagesAdapter::new(MessagesConfig::new("sk-test")).is_ok());
    }

    #[test]
    fn test_model_aliases() {
        let config = MessagesConfig::new("k").with_model("base-model");
        assert_eq!(config.resolve_model(None), "base-model");
        assert_eq!(config.resolve_model(Some("opus")), "claude-opus-4-20250514");
        assert_eq!(config.resolve_model(Some("custom-1")), "custom-1");
    }

    #[test]
    fn test_reply_state_translates_stream() {
        let mut state = ReplyState::default();
        feed(&mut state, r#"{"type":"message_start","message":{"id":"msg_1","usage":{"input_tokens":12,"output_tokens":1}}}"#);
        feed(&mut state, r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#);
        feed(&mut state, r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}"#);
        let thinking = feed(&mut state, r#"{"type":"content_block_stop","index":0}"#);
        assert_eq!(
            thinking[0].as_ref().unwrap().event,
            Some(AgentEvent::Thinking { text: "hmm".into() })
        );

        feed(&mut state, r#"{"type":"content_block_start","index":1,"content_block":{"type":"text","text":""}}"#);
        let text = feed(&mut state, r#"{"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"<result>ok</result>"}}"#);
        assert_eq!(text[0].as_ref().unwrap().text.as_deref(), Some("<result>ok</result>"));

        feed(&mut state, r#"{"type":"content_block_start","index":2,"content_block":{"type":"tool_use","id":"t","name":"Read","input":{}}}"#);
        feed(&mut state, r#"{"type":"content_block_delta","index":2,"delta":{"type":"input_json_delta","partial_json":"{\"file_path\":"}}"#);
        feed(&mut state, r#"{"type":"content_block_delta","index":2,"delta":{"type":"input_json_delta","partial_json":"\"a.md\"}"}}"#);
        let tool = feed(&mut state, r#"{"type":"content_block_stop","index":2}"#);
        assert_eq!(
            tool[0].as_ref().unwrap().event,
            Some(AgentEvent::File { op: FileOp::Read, path: "a.md".into(), to: None })
        );

        feed(&mut state, r#"{"type":"message_delta","delta":{},"usage":{"output_tokens":30}}"#);
        feed(&mut state, r#"{"type":"message_stop"}"#);

        let usage = state.usage().unwrap();
        assert_eq!(usage.message_id.as_deref(), Some("msg_1"));
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 30);
        assert_eq!(state.text, "<result>ok</result>");
    }

    #[test]
    fn test_frames_keep_split_characters() {
        let raw = "data: {\"text\":\"caf\u{e9}\"}\n\ndata: next";
        let bytes = raw.as_bytes();
        let split = raw.find('\u{e9}').unwrap() + 1;

        let mut frames = SseFrames::default();
        frames.push(&bytes[..split]);
        assert_eq!(frames.next_frame(), None);
        frames.push(&bytes[split..]);
        assert_eq!(frames.next_frame().as_deref(), Some("data: {\"text\":\"caf\u{e9}\"}"));
        assert_eq!(frames.next_frame(), None);

        frames.push(b"\n\n");
        assert_eq!(frames.next_frame().as_deref(), Some("data: next"));
    }

    #[test]
    fn test_error_event_fails_stream() {
        let mut state = ReplyState::default();
        let out = feed(&mut state, r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#);
        let err = out.into_iter().next().unwrap().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::AdapterFailed);
        assert_eq!(err.message(), "Overloaded");
    }

    #[tokio::test]
    async fn test_stream_requires_send() {
        let adapter = MessagesAdapter::new(MessagesConfig::new("k")).unwrap();
        let mut session = adapter.create_session(&SessionArgs::default()).await.unwrap();
        assert!(session.stream().is_err());
    }
}
