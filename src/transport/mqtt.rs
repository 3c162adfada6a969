//! MQTT ingestion.
//!
//! Every (client definition × host) pair gets its own task running
//! `Connecting → Subscribed → Streaming`, falling into `Backoff` on any error and
//! starting over after `retry_seconds`. Tasks never end on their own and never affect
//! each other. Publishes are handed to the [`PacketSink`] in arrival order.

use super::PacketSink;
use crate::config::MqttClientConfig;
use crate::error::{GatewayError, GatewayResult};
use log::{debug, error, info};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CAPACITY: usize = 64;
const MAX_PACKET_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Subscribed,
    Streaming,
    Backoff,
}

/// One broker connection: a client definition bound to a single host.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub config: MqttClientConfig,
}

impl Endpoint {
    pub fn label(&self) -> String {
        format!("{}@{}:{}", self.config.identifier, self.host, self.config.port)
    }

    pub fn options(&self) -> MqttOptions {
        let mut opts = MqttOptions::new(
            self.config.identifier.clone(),
            self.host.clone(),
            self.config.port,
        );
        opts.set_keep_alive(KEEP_ALIVE);
        opts.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
        if !self.config.username.is_empty() {
            opts.set_credentials(self.config.username.clone(), self.config.password.clone());
        }
        opts
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.config.retry_seconds)
    }
}

/// Expand client definitions into one endpoint per host.
pub fn endpoints(clients: &[MqttClientConfig]) -> Vec<Endpoint> {
    clients
        .iter()
        .flat_map(|c| {
            c.hosts.iter().map(move |h| Endpoint {
                host: h.clone(),
                config: c.clone(),
            })
        })
        .collect()
}

pub struct MqttIngestion {
    endpoints: Vec<Endpoint>,
    sink: Arc<dyn PacketSink>,
}

impl MqttIngestion {
    pub fn new(clients: &[MqttClientConfig], sink: Arc<dyn PacketSink>) -> Self {
        Self {
            endpoints: endpoints(clients),
            sink,
        }
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Start one task per endpoint.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        self.endpoints
            .iter()
            .cloned()
            .map(|endpoint| {
                let sink = Arc::clone(&self.sink);
                tokio::spawn(run_endpoint(endpoint, sink))
            })
            .collect()
    }
}

async fn run_endpoint(endpoint: Endpoint, sink: Arc<dyn PacketSink>) {
    let label = endpoint.label();
    loop {
        if let Err(e) = session(&endpoint, sink.as_ref()).await {
            if endpoint.config.show_error_log {
                error!("{}: {}; retrying in {}s", label, e, endpoint.config.retry_seconds);
            }
        }
        debug!("{}: {:?}", label, SessionState::Backoff);
        sleep(endpoint.retry_delay()).await;
    }
}

async fn session(endpoint: &Endpoint, sink: &dyn PacketSink) -> GatewayResult<()> {
    let label = endpoint.label();
    debug!("{}: {:?}", label, SessionState::Connecting);
    let (client, mut eventloop) = AsyncClient::new(endpoint.options(), REQUEST_CAPACITY);

    loop {
        let event = eventloop
            .poll()
            .await
            .map_err(|e| GatewayError::connection(&label, e))?;
        if let Event::Incoming(Packet::ConnAck(ack)) = event {
            if ack.code != ConnectReturnCode::Success {
                return Err(GatewayError::connection(
                    &label,
                    format!("broker refused connection: {:?}", ack.code),
                ));
            }
            break;
        }
    }

    for topic in &endpoint.config.topics {
        client
            .subscribe(topic.as_str(), QoS::AtMostOnce)
            .await
            .map_err(|e| GatewayError::connection(&label, e))?;
    }
    debug!("{}: {:?}", label, SessionState::Subscribed);
    info!("{}: subscribed to {:?}", label, endpoint.config.topics);

    debug!("{}: {:?}", label, SessionState::Streaming);
    loop {
        let event = eventloop
            .poll()
            .await
            .map_err(|e| GatewayError::connection(&label, e))?;
        match event {
            Event::Incoming(Packet::Publish(publish)) => {
                sink.deliver(&publish.topic, &publish.payload).await;
            }
            Event::Incoming(Packet::Disconnect) => {
                return Err(GatewayError::connection(&label, "broker sent DISCONNECT"));
            }
            _ => {}
        }
    }
}
