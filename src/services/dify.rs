//! Dify chat client (`POST {api_base}/chat-messages`, streaming mode).
//!
//! The response is a server-sent event stream. Every `data: {json}` line may carry an
//! `answer` fragment and the `conversation_id`; `data: [DONE]` ends the stream early.

use super::{http_client, ChatBackend, ChatReply};
use crate::config::AiConfig;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    inputs: serde_json::Map<String, serde_json::Value>,
    query: &'a str,
    response_mode: &'static str,
    conversation_id: &'a str,
    user: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    conversation_id: Option<String>,
}

/// Incremental SSE parser. Bytes may arrive split anywhere, including inside a
/// multi-byte character, so lines are only decoded once complete.
#[derive(Debug, Default)]
pub struct SseAccumulator {
    pending: Vec<u8>,
    answer: String,
    conversation_id: Option<String>,
    done: bool,
}

impl SseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the response body.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.done {
            return;
        }
        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.handle_line(&line);
            if self.done {
                self.pending.clear();
                return;
            }
        }
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) {
        if !self.done && !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.handle_line(&line);
        }
        self.done = true;
    }

    fn handle_line(&mut self, raw: &[u8]) {
        let Ok(line) = std::str::from_utf8(raw) else {
            return;
        };
        let Some(data) = line.trim().strip_prefix(DATA_PREFIX) else {
            return;
        };
        if data == DONE_SENTINEL {
            self.done = true;
            return;
        }
        match serde_json::from_str::<StreamEvent>(data) {
            Ok(event) => {
                if let Some(fragment) = event.answer {
                    self.answer.push_str(&fragment);
                }
                if let Some(id) = event.conversation_id.filter(|id| !id.is_empty()) {
                    self.conversation_id = Some(id);
                }
            }
            Err(e) => debug!("Skipping undecodable SSE line: {}", e),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn into_reply(self) -> ChatReply {
        ChatReply {
            answer: self.answer,
            conversation_id: self.conversation_id,
        }
    }
}

pub struct DifyClient {
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl DifyClient {
    pub fn new(config: &AiConfig) -> GatewayResult<Self> {
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client: http_client(config.timeout_seconds)?,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[async_trait]
impl ChatBackend for DifyClient {
    async fn send_chat(
        &self,
        query: &str,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> GatewayResult<ChatReply> {
        if !self.is_configured() {
            return Err(GatewayError::Lookup("AI API key is not configured".into()));
        }

        let body = ChatRequest {
            inputs: serde_json::Map::new(),
            query,
            response_mode: "streaming",
            conversation_id: conversation_id.unwrap_or_default(),
            user: user_id,
        };
        let mut response = self
            .client
            .post(format!("{}/chat-messages", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Lookup(format!(
                "AI request returned HTTP {}: {}",
                status,
                crate::logutil::preview(&text, 120)
            )));
        }

        let mut sse = SseAccumulator::new();
        while let Some(chunk) = response.chunk().await? {
            sse.push(&chunk);
            if sse.is_done() {
                break;
            }
        }
        sse.finish();
        info!("AI answer received ({} chars)", sse.answer().chars().count());
        Ok(sse.into_reply())
    }
}
