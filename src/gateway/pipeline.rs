//! Ingestion entry point.
//!
//! One call per MQTT publish:
//! topic validity → envelope marker → envelope decode → ignore-list → decrypt (when
//! encrypted) → text port → freshness → route. Work-channel handling is spawned so the
//! broker loop never waits on lookups or radio pacing; emergency admission runs inline
//! and only its transmissions are spawned.

use super::assistant::Assistant;
use super::channels::ChannelRegistry;
use super::emergency::{EmergencyGuardian, EmergencyOutcome};
use super::filters::{self, IgnoreList};
use super::handler::{HandlerSettings, MessageHandler};
use super::router::{ChannelRouter, Target};
use super::weather::WeatherResponder;
use crate::config::Config;
use crate::error::GatewayResult;
use crate::logutil::hex_snippet;
use crate::mesh::{self, codec, crypto, node_id_string, topic};
use crate::metrics;
use crate::services::{ChatBackend, ForecastSource, NodeDirectory};
use crate::transport::radio::Transmitter;
use crate::transport::PacketSink;
use async_trait::async_trait;
use log::{debug, error, trace};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    InvalidTopic,
    /// Valid topic without a protobuf envelope (JSON, map reports, ...).
    NotEnvelope,
    ParseFailed,
    Ignored,
    /// Encrypted on a channel the gateway holds no key for (including PKI).
    NoKey,
    DecryptFailed,
    NotText,
    Stale,
    /// Handed to the work-channel handler, answered on this channel index.
    Work(u32),
    Emergency(EmergencyOutcome),
    Unroutable,
}

/// External collaborators shared by the responders.
#[derive(Clone)]
pub struct Services {
    pub directory: Arc<dyn NodeDirectory>,
    pub forecast: Arc<dyn ForecastSource>,
    pub chat: Arc<dyn ChatBackend>,
}

pub struct Pipeline {
    registry: Arc<ChannelRegistry>,
    router: ChannelRouter,
    ignore: IgnoreList,
    max_age_secs: u64,
    handler: Arc<MessageHandler>,
    emergency: Option<Arc<EmergencyGuardian>>,
}

impl Pipeline {
    pub fn from_config(
        config: &Config,
        tx: Arc<Transmitter>,
        services: Services,
    ) -> GatewayResult<Self> {
        let registry = Arc::new(ChannelRegistry::from_config(config)?);
        let weather = WeatherResponder::new(
            &config.weather,
            services.directory.clone(),
            services.forecast.clone(),
            tx.clone(),
        );
        let assistant = Assistant::new(&config.ai, services.chat.clone(), tx.clone());
        let handler = Arc::new(MessageHandler::new(
            HandlerSettings::from_config(config),
            tx.clone(),
            services.directory.clone(),
            weather,
            assistant,
        ));
        let emergency = config.emergency.as_ref().map(|e| {
            Arc::new(EmergencyGuardian::new(
                e,
                Duration::from_secs(config.gateway.dedup_window_secs),
                tx.clone(),
                services.directory.clone(),
            ))
        });
        Ok(Self {
            router: ChannelRouter::new(registry.clone()),
            registry,
            ignore: IgnoreList::from_entries(&config.gateway.ignore_ids),
            max_age_secs: config.gateway.max_packet_age_secs,
            handler,
            emergency,
        })
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn handler(&self) -> &Arc<MessageHandler> {
        &self.handler
    }

    pub fn ingest(&self, topic_str: &str, payload: &[u8]) -> IngestOutcome {
        self.ingest_at(topic_str, payload, chrono::Utc::now().timestamp())
    }

    /// [`Pipeline::ingest`] with an explicit "now" for the freshness check.
    pub fn ingest_at(&self, topic_str: &str, payload: &[u8], now_epoch: i64) -> IngestOutcome {
        metrics::inc_received();
        if !topic::is_valid(topic_str) {
            if topic_str.contains(topic::WILDCARD) {
                error!("Ignoring topic with wildcard: {}", topic_str);
            }
            return IngestOutcome::InvalidTopic;
        }
        if !topic::carries_envelope(topic_str) {
            trace!("No envelope on {}", topic_str);
            return IngestOutcome::NotEnvelope;
        }

        let envelope = match codec::decode_envelope(payload) {
            Ok(env) => env,
            Err(e) => {
                debug!(
                    "Dropping unparseable payload on {}: {} ({})",
                    topic_str,
                    e,
                    hex_snippet(payload, 16)
                );
                metrics::inc_parse_failures();
                return IngestOutcome::ParseFailed;
            }
        };
        let Some(mut packet) = envelope.packet else {
            metrics::inc_parse_failures();
            return IngestOutcome::ParseFailed;
        };

        if self.ignore.is_ignored(&packet) {
            metrics::inc_ignored();
            return IngestOutcome::Ignored;
        }

        if mesh::decoded(&packet).is_none() && mesh::encrypted(&packet).is_some() {
            let segment = topic::channel_segment(topic_str).unwrap_or_default();
            let Some(entry) = self.registry.resolve(segment) else {
                trace!("No key for channel {} (packet {})", segment, packet.id);
                return IngestOutcome::NoKey;
            };
            packet = match crypto::decrypt_packet(&packet, &entry.key) {
                Ok(p) => p,
                Err(e) => {
                    debug!(
                        "Could not decrypt packet {} from {} on {}: {}",
                        packet.id,
                        node_id_string(packet.from),
                        segment,
                        e
                    );
                    metrics::inc_decrypt_failures();
                    return IngestOutcome::DecryptFailed;
                }
            };
        }

        if !filters::is_text_message(&packet) {
            return IngestOutcome::NotText;
        }
        if !filters::is_fresh(&packet, now_epoch, self.max_age_secs) {
            metrics::inc_stale();
            return IngestOutcome::Stale;
        }

        match self.router.route(&packet, topic_str) {
            Target::Emergency => {
                metrics::inc_routed_emergency();
                let label = topic::channel_label(topic_str);
                match self.emergency {
                    Some(ref guardian) => IngestOutcome::Emergency(guardian.handle(&packet, &label)),
                    None => IngestOutcome::Unroutable,
                }
            }
            Target::Work(channel_id) => {
                metrics::inc_routed_work();
                let handler = Arc::clone(&self.handler);
                tokio::spawn(async move {
                    let outcome = handler.handle_channel_message(&packet, channel_id).await;
                    trace!("Packet {} handled: {:?}", packet.id, outcome);
                });
                IngestOutcome::Work(channel_id)
            }
            Target::Unroutable => {
                metrics::inc_unroutable();
                IngestOutcome::Unroutable
            }
        }
    }
}

#[async_trait]
impl PacketSink for Pipeline {
    async fn deliver(&self, topic: &str, payload: &[u8]) {
        self.ingest(topic, payload);
    }
}
