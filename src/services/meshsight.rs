//! MeshSight node directory client.
//!
//! `GET {api_url}/v1/node/info/{node_num}` and `GET {api_url}/v1/node/position/{node_num}`,
//! both wrapped in an [`ApiEnvelope`].

use super::{http_client, ApiEnvelope, NodeDirectory};
use crate::config::MeshSightConfig;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub item: Option<NodeItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeItem {
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub long_name: Option<String>,
}

impl NodeInfo {
    pub fn short_name(&self) -> Option<&str> {
        self.item
            .as_ref()
            .and_then(|i| i.short_name.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePosition {
    #[serde(default)]
    pub position: Option<PositionDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDetail {
    #[serde(default)]
    pub taiwan_address: Option<TaiwanAddress>,
    /// Channel the position was heard on; the API returns a name or an index.
    #[serde(default)]
    pub channel: Option<Value>,
    #[serde(default)]
    pub precision_in_meters: Option<Value>,
    /// Epoch seconds or an ISO-8601 string.
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub update_at: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaiwanAddress {
    #[serde(default)]
    pub city_or_county: Option<String>,
    #[serde(default)]
    pub district_level: Option<String>,
    #[serde(default)]
    pub emergency_address: Option<String>,
}

impl NodePosition {
    pub fn taiwan_address(&self) -> Option<&TaiwanAddress> {
        self.position.as_ref()?.taiwan_address.as_ref()
    }

    /// City and district, only when both are known.
    pub fn city_district(&self) -> Option<(&str, &str)> {
        let addr = self.taiwan_address()?;
        let city = addr.city_or_county.as_deref().filter(|s| !s.is_empty())?;
        let district = addr.district_level.as_deref().filter(|s| !s.is_empty())?;
        Some((city, district))
    }

    /// Whatever part of `<city><district>` is known.
    pub fn locality(&self) -> Option<String> {
        let addr = self.taiwan_address()?;
        let joined: String = [&addr.city_or_county, &addr.district_level]
            .into_iter()
            .flatten()
            .map(|s| s.as_str())
            .collect();
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }
}

pub struct MeshSightClient {
    base: String,
    client: reqwest::Client,
}

impl MeshSightClient {
    pub fn new(config: &MeshSightConfig) -> GatewayResult<Self> {
        Ok(Self {
            base: config.api_url.trim_end_matches('/').to_string(),
            client: http_client(config.timeout_seconds)?,
        })
    }

    async fn get_envelope<T: DeserializeOwned>(&self, path: &str, what: &str) -> GatewayResult<T> {
        let url = format!("{}{}", self.base, path);
        debug!("MeshSight GET {}", url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Lookup(format!(
                "{} returned HTTP {}: {}",
                what,
                status,
                crate::logutil::preview(&body, 120)
            )));
        }
        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::Lookup(format!("{} response is malformed: {}", what, e)))?;
        envelope.into_data(what)
    }
}

#[async_trait]
impl NodeDirectory for MeshSightClient {
    async fn node_info(&self, node_id: u32) -> GatewayResult<NodeInfo> {
        self.get_envelope(&format!("/v1/node/info/{}", node_id), "node info")
            .await
    }

    async fn node_position(&self, node_id: u32) -> GatewayResult<NodePosition> {
        self.get_envelope(&format!("/v1/node/position/{}", node_id), "node position")
            .await
    }
}
