//! AI chat responder.
//!
//! The answer is cut into fixed-size segments. Each segment is sent as its own reply,
//! annotated with `(i/n)` and a disclaimer, chained to the previous segment's packet id,
//! with a fixed delay in between.
//!
//! The backend hands out a conversation id with every answer; it is kept per sender for
//! a while so follow-up questions continue the same conversation.

use super::handler::ReplyTarget;
use crate::config::AiConfig;
use crate::mesh::node_id_string;
use crate::services::ChatBackend;
use crate::transport::radio::{SendRequest, Transmitter};
use log::{error, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};

pub const DISCLAIMER: &str = "AI 回覆僅供參考";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantOutcome {
    Disabled,
    Usage,
    Failed,
    /// Number of segments that were sent.
    Answered(usize),
}

/// Conversation ids per sender node, forgotten after `ttl` of inactivity.
#[derive(Debug)]
pub struct ConversationMemory {
    ttl: Duration,
    entries: Mutex<HashMap<u32, (String, Instant)>>,
}

impl ConversationMemory {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, node: u32, now: Instant) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let ttl = self.ttl;
        entries.retain(|_, (_, last)| now.saturating_duration_since(*last) <= ttl);
        entries.get(&node).map(|(id, _)| id.clone())
    }

    pub fn remember(&self, node: u32, conversation_id: String, now: Instant) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(node, (conversation_id, now));
    }
}

/// Split `text` into chunks of at most `max_chars` characters.
pub fn segments(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.trim().chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

pub fn annotate(segment: &str, index: usize, total: usize) -> String {
    format!("{}\n({}/{}) {}", segment, index, total, DISCLAIMER)
}

pub struct Assistant {
    enabled: bool,
    backend: Arc<dyn ChatBackend>,
    memory: ConversationMemory,
    segment_chars: usize,
    segment_delay: Duration,
    tx: Arc<Transmitter>,
}

impl Assistant {
    pub fn new(config: &AiConfig, backend: Arc<dyn ChatBackend>, tx: Arc<Transmitter>) -> Self {
        Self {
            enabled: config.enabled,
            backend,
            memory: ConversationMemory::new(Duration::from_secs(config.conversation_ttl_secs)),
            segment_chars: config.segment_chars,
            segment_delay: Duration::from_millis(config.segment_delay_ms),
            tx,
        }
    }

    pub async fn respond(
        &self,
        target: ReplyTarget,
        tag: &str,
        query: &str,
        prefix: &str,
    ) -> AssistantOutcome {
        if !self.enabled {
            let text = format!("嗨！{}，AI 助理目前未啟用。", tag);
            self.reply(target, &text).await;
            return AssistantOutcome::Disabled;
        }
        let query = query.trim();
        if query.is_empty() {
            let text = format!(
                "嗨！{}，請在 ai 後面輸入您的問題，例如：{} ai 什麼是 Meshtastic？",
                tag, prefix
            );
            self.reply(target, &text).await;
            return AssistantOutcome::Usage;
        }

        let user = node_id_string(target.from);
        let conversation = self.memory.get(target.from, Instant::now());
        let answer = match self
            .backend
            .send_chat(query, &user, conversation.as_deref())
            .await
        {
            Ok(reply) if !reply.answer.trim().is_empty() => {
                if let Some(id) = reply.conversation_id.clone() {
                    self.memory.remember(target.from, id, Instant::now());
                }
                reply.answer
            }
            Ok(_) => {
                error!("AI backend returned an empty answer for {}", user);
                return self.apologize(target, tag).await;
            }
            Err(e) => {
                error!("AI request for {} failed: {}", user, e);
                return self.apologize(target, tag).await;
            }
        };

        let parts = segments(&answer, self.segment_chars);
        let total = parts.len();
        info!("Answering {} with {} AI segment(s)", user, total);
        let mut anchor = target.packet_id;
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                sleep(self.segment_delay).await;
            }
            let packet = target.text(&annotate(part, i + 1, total), Some(anchor));
            if let Some(sent) = self.tx.send(SendRequest::broadcast(packet, true)).await {
                anchor = sent.id;
            }
        }
        AssistantOutcome::Answered(total)
    }

    async fn apologize(&self, target: ReplyTarget, tag: &str) -> AssistantOutcome {
        let text = format!("嗨！{}，AI 助理暫時無法回應，請稍後再試。", tag);
        self.reply(target, &text).await;
        AssistantOutcome::Failed
    }

    async fn reply(&self, target: ReplyTarget, text: &str) {
        self.tx
            .send(SendRequest::broadcast(target.reply(text), true))
            .await;
    }
}
