//! HTTP collaborators used by the responders.
//!
//! Each collaborator sits behind a trait so responders can be exercised without the
//! network. Every call may fail; failures surface as [`GatewayError::Lookup`] and the
//! caller substitutes a fallback reply.
//!
//! - [`meshsight`] - node metadata and last known position
//! - [`cwa`] - township forecast lookup and summarizer
//! - [`dify`] - streaming AI chat

pub mod cwa;
pub mod dify;
pub mod meshsight;

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use cwa::LocationForecast;
pub use meshsight::{NodeInfo, NodePosition};

/// Generic `{status, message, data}` envelope returned by the MeshSight API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub status: String,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub const SUCCESS: &'static str = "success";

    /// Payload of a successful envelope; anything else is a lookup failure.
    pub fn into_data(self, what: &str) -> GatewayResult<T> {
        if self.status != Self::SUCCESS {
            return Err(GatewayError::Lookup(format!(
                "{} request failed: {}",
                what,
                if self.message.is_empty() {
                    "unknown error"
                } else {
                    &self.message
                }
            )));
        }
        self.data
            .ok_or_else(|| GatewayError::Lookup(format!("{} response has no data", what)))
    }
}

#[async_trait]
pub trait NodeDirectory: Send + Sync {
    async fn node_info(&self, node_id: u32) -> GatewayResult<NodeInfo>;
    async fn node_position(&self, node_id: u32) -> GatewayResult<NodePosition>;
}

#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn forecast(&self, city: &str, district: &str) -> GatewayResult<LocationForecast>;
}

/// Answer of the AI backend plus the conversation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatReply {
    pub answer: String,
    pub conversation_id: Option<String>,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send_chat(
        &self,
        query: &str,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> GatewayResult<ChatReply>;
}

/// Shared reqwest client with a per-request timeout.
pub fn http_client(timeout_seconds: u64) -> GatewayResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds.max(1)))
        .user_agent(concat!("meshgate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {}", e)))
}
