//! Transports on both sides of the gateway.
//!
//! - [`mqtt`] - broker subscriptions feeding the ingestion pipeline
//! - [`radio`] - outbound radio links and the paced transmitter

pub mod mqtt;
pub mod radio;

use async_trait::async_trait;

/// Receiver of raw MQTT publishes.
#[async_trait]
pub trait PacketSink: Send + Sync {
    async fn deliver(&self, topic: &str, payload: &[u8]);
}
