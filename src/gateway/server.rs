//! Gateway assembly and main loop.

use super::pipeline::{Pipeline, Services};
use crate::config::{Config, DeviceConfig};
use crate::gateway::channels::ChannelRole;
use crate::metrics;
use crate::services::cwa::CwaClient;
use crate::services::dify::DifyClient;
use crate::services::meshsight::MeshSightClient;
use crate::transport::mqtt::MqttIngestion;
use crate::transport::radio::{links_from_config, Transmitter};
use crate::transport::PacketSink;
use anyhow::{anyhow, Result};
use log::{info, warn};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

pub struct Gateway {
    config: Config,
    pipeline: Arc<Pipeline>,
    transmitter: Arc<Transmitter>,
}

impl Gateway {
    /// Validate the configuration and build every component with the real collaborators.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let services = Services {
            directory: Arc::new(MeshSightClient::new(&config.meshsight)?),
            forecast: Arc::new(CwaClient::new(&config.weather)?),
            chat: Arc::new(DifyClient::new(&config.ai)?),
        };
        Self::with_services(config, services)
    }

    /// Build with caller-supplied collaborators.
    pub fn with_services(config: Config, services: Services) -> Result<Self> {
        let links = links_from_config(&config.devices);
        if links.is_empty() {
            warn!("No usable radio devices configured; replies will be dropped");
        }
        let transmitter = Arc::new(Transmitter::new(links, config.pacing.clone()));
        let pipeline = Arc::new(Pipeline::from_config(&config, transmitter.clone(), services)?);
        Ok(Self {
            config,
            pipeline,
            transmitter,
        })
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn transmitter(&self) -> &Arc<Transmitter> {
        &self.transmitter
    }

    /// Subscribe to every broker and run until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        info!(
            "{} gateway starting: {} channel(s), radios {:?}",
            self.config.gateway.bot_name,
            self.pipeline.registry().len(),
            self.transmitter.interface_names()
        );
        let sink: Arc<dyn PacketSink> = self.pipeline.clone();
        let ingestion = MqttIngestion::new(&self.config.mqtt.clients, sink);
        let tasks = ingestion.spawn();
        if tasks.is_empty() {
            return Err(anyhow!("no MQTT endpoints to subscribe to"));
        }
        info!("Started {} MQTT connection task(s)", tasks.len());

        let stats_secs = self.config.gateway.stats_interval_secs;
        let mut stats = tokio::time::interval(Duration::from_secs(stats_secs.max(1)));
        stats.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        stats.tick().await;

        loop {
            tokio::select! {
                _ = stats.tick(), if stats_secs > 0 => {
                    info!("Pipeline stats: {}", metrics::snapshot());
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        for task in tasks {
            task.abort();
        }
        info!("Final stats: {}", metrics::snapshot());
        Ok(())
    }
}

/// Human-readable summary of the configuration, for `meshgate status`.
pub fn status_report(config: &Config) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Bot: {}", config.gateway.bot_name);
    let _ = writeln!(out, "Prefixes: {}", config.gateway.command_prefixes.join(", "));
    let _ = writeln!(out, "MQTT endpoints:");
    for ep in crate::transport::mqtt::endpoints(&config.mqtt.clients) {
        let _ = writeln!(out, "  {} topics={:?}", ep.label(), ep.config.topics);
    }
    let _ = writeln!(out, "Channels:");
    match super::channels::ChannelRegistry::from_config(config) {
        Ok(reg) => {
            for entry in reg.entries() {
                let role = match entry.role {
                    ChannelRole::Work { channel_id } => format!("work (radio channel {})", channel_id),
                    ChannelRole::Emergency => "emergency".to_string(),
                    ChannelRole::None => "decrypt only".to_string(),
                };
                let key = if entry.key.is_empty() { "missing" } else { "set" };
                let _ = writeln!(out, "  {:<16} {} key={}", entry.name, role, key);
            }
        }
        Err(e) => {
            let _ = writeln!(out, "  invalid: {}", e);
        }
    }
    let _ = writeln!(out, "Radios:");
    for device in &config.devices {
        let desc = match device {
            DeviceConfig::Tcp { name, host, port } => format!("{} tcp {}:{}", name, host, port),
            DeviceConfig::Serial {
                name,
                port,
                baud_rate,
            } => format!("{} serial {} @ {}", name, port, baud_rate),
        };
        let _ = writeln!(out, "  {}", desc);
    }
    let _ = writeln!(
        out,
        "Weather: {}  AI: {}",
        if config.weather.enabled { "on" } else { "off" },
        if config.ai.enabled { "on" } else { "off" }
    );
    out
}
