//! Outbound radio links and the transmission manager.
//!
//! A [`RadioLink`] writes framed `ToRadio` packets to one physical radio (TCP stream API
//! or serial). The [`Transmitter`] owns every configured link and applies the send
//! discipline:
//!
//! - a jittered courtesy delay before each attempt,
//! - interface choice through an injectable [`InterfaceSelector`] (uniform random by
//!   default) unless the caller pins a named interface,
//! - a per-interface gate held across the write *and* the post-send settle delay, so a
//!   radio is never handed a new packet before it has processed the previous one,
//! - a bounded retry loop with jittered backoff; exhaustion yields `None`, never an error.

use crate::config::{DeviceConfig, PacingConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::logutil::preview;
use crate::mesh::{self, codec, Destination, DEFAULT_HOP_LIMIT};
use crate::metrics;
use crate::protobuf::meshtastic_generated::MeshPacket;
use async_trait::async_trait;
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Duration};

/// One physical radio the gateway can transmit through.
#[async_trait]
pub trait RadioLink: Send + Sync {
    fn name(&self) -> &str;
    /// Write one fully prepared packet. Errors are per-attempt; the transmitter retries.
    async fn transmit(&self, packet: &MeshPacket) -> GatewayResult<()>;
}

/// Chooses which link carries the next attempt.
pub trait InterfaceSelector: Send + Sync {
    /// `names` is never empty; the result must be a valid index into it.
    fn select(&self, names: &[&str]) -> usize;
}

/// Uniform random choice.
#[derive(Debug, Default)]
pub struct RandomSelector;

impl InterfaceSelector for RandomSelector {
    fn select(&self, names: &[&str]) -> usize {
        use rand::Rng;
        rand::thread_rng().gen_range(0..names.len())
    }
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Radio reachable over the Meshtastic TCP stream API (port 4403).
///
/// The connection is opened lazily on first transmit and held open; any I/O error drops
/// it so the next attempt reconnects.
pub struct TcpRadio {
    name: String,
    addr: String,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl TcpRadio {
    pub fn new(name: impl Into<String>, host: &str, port: u16) -> Self {
        Self {
            name: name.into(),
            addr: format!("{}:{}", host, port),
            writer: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> GatewayResult<OwnedWriteHalf> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| GatewayError::transmission(&self.name, "connect timed out"))?
            .map_err(|e| GatewayError::transmission(&self.name, e))?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("{}: could not set TCP_NODELAY: {}", self.name, e);
        }
        let (mut reader, mut writer) = stream.into_split();

        // The radio streams FromRadio frames back at us; drain them so its send
        // buffer never fills. The task ends when the socket closes.
        let name = self.name.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => trace!("{}: discarded {} bytes from radio", name, n),
                    Err(e) => {
                        debug!("{}: radio read ended: {}", name, e);
                        break;
                    }
                }
            }
        });

        let config_id = loop {
            let id: u32 = rand::random();
            if id != 0 {
                break id;
            }
        };
        let hello = codec::frame_want_config(config_id)?;
        writer
            .write_all(&hello)
            .await
            .map_err(|e| GatewayError::transmission(&self.name, e))?;
        info!("Connected to radio {} at {}", self.name, self.addr);
        Ok(writer)
    }
}

#[async_trait]
impl RadioLink for TcpRadio {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transmit(&self, packet: &MeshPacket) -> GatewayResult<()> {
        let frame = codec::frame_packet(packet)?;
        let mut guard = self.writer.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let Some(writer) = guard.as_mut() else {
            return Err(GatewayError::transmission(&self.name, "no connection"));
        };
        let result = match timeout(WRITE_TIMEOUT, async {
            writer.write_all(&frame).await?;
            writer.flush().await
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(GatewayError::transmission(&self.name, e)),
            Err(_) => Err(GatewayError::transmission(&self.name, "write timed out")),
        };
        if result.is_err() {
            *guard = None;
        }
        result
    }
}

/// Radio attached over USB/UART.
#[cfg(feature = "serial")]
pub struct SerialRadio {
    name: String,
    port_name: String,
    baud_rate: u32,
    port: Arc<std::sync::Mutex<Option<Box<dyn serialport::SerialPort>>>>,
}

#[cfg(feature = "serial")]
impl SerialRadio {
    pub fn new(name: impl Into<String>, port_name: &str, baud_rate: u32) -> Self {
        Self {
            name: name.into(),
            port_name: port_name.to_string(),
            baud_rate,
            port: Arc::new(std::sync::Mutex::new(None)),
        }
    }
}

#[cfg(feature = "serial")]
#[async_trait]
impl RadioLink for SerialRadio {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transmit(&self, packet: &MeshPacket) -> GatewayResult<()> {
        use std::io::Write;
        let frame = codec::frame_packet(packet)?;
        let port = self.port.clone();
        let name = self.name.clone();
        let port_name = self.port_name.clone();
        let baud = self.baud_rate;
        tokio::task::spawn_blocking(move || -> GatewayResult<()> {
            let mut guard = port.lock().unwrap_or_else(|e| e.into_inner());
            if guard.is_none() {
                let opened = serialport::new(&port_name, baud)
                    .timeout(std::time::Duration::from_millis(500))
                    .open()
                    .map_err(|e| {
                        GatewayError::transmission(
                            &name,
                            format!("failed to open {}: {}", port_name, e),
                        )
                    })?;
                info!("Opened serial radio {} on {} @ {}", name, port_name, baud);
                *guard = Some(opened);
            }
            let Some(p) = guard.as_mut() else {
                return Err(GatewayError::transmission(&name, "serial port unavailable"));
            };
            let res = p.write_all(&frame).and_then(|_| p.flush());
            if let Err(e) = res {
                *guard = None;
                return Err(GatewayError::transmission(&name, e));
            }
            Ok(())
        })
        .await
        .map_err(|e| GatewayError::transmission(&self.name, e))?
    }
}

/// Build links for every configured device.
pub fn links_from_config(devices: &[DeviceConfig]) -> Vec<Arc<dyn RadioLink>> {
    let mut links: Vec<Arc<dyn RadioLink>> = Vec::new();
    for device in devices {
        match device {
            DeviceConfig::Tcp { name, host, port } => {
                links.push(Arc::new(TcpRadio::new(name.clone(), host, *port)));
            }
            #[cfg(feature = "serial")]
            DeviceConfig::Serial {
                name,
                port,
                baud_rate,
            } => {
                links.push(Arc::new(SerialRadio::new(name.clone(), port, *baud_rate)));
            }
            #[cfg(not(feature = "serial"))]
            DeviceConfig::Serial { name, .. } => {
                warn!(
                    "Serial device '{}' configured but the 'serial' feature is disabled; skipping",
                    name
                );
            }
        }
    }
    links
}

/// One outbound send.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub packet: MeshPacket,
    pub destination: Destination,
    pub want_ack: bool,
    pub hop_limit: u32,
    /// Pin the send to a named link.
    pub interface: Option<String>,
}

impl SendRequest {
    /// Broadcast with the default hop limit.
    pub fn broadcast(packet: MeshPacket, want_ack: bool) -> Self {
        Self {
            packet,
            destination: Destination::Broadcast,
            want_ack,
            hop_limit: DEFAULT_HOP_LIMIT,
            interface: None,
        }
    }

    pub fn via(mut self, interface: Option<String>) -> Self {
        self.interface = interface;
        self
    }
}

struct LinkSlot {
    link: Arc<dyn RadioLink>,
    gate: Mutex<()>,
}

pub struct Transmitter {
    slots: Vec<LinkSlot>,
    selector: Arc<dyn InterfaceSelector>,
    pacing: PacingConfig,
}

impl Transmitter {
    pub fn new(links: Vec<Arc<dyn RadioLink>>, pacing: PacingConfig) -> Self {
        Self::with_selector(links, pacing, Arc::new(RandomSelector))
    }

    pub fn with_selector(
        links: Vec<Arc<dyn RadioLink>>,
        pacing: PacingConfig,
        selector: Arc<dyn InterfaceSelector>,
    ) -> Self {
        let slots = links
            .into_iter()
            .map(|link| LinkSlot {
                link,
                gate: Mutex::new(()),
            })
            .collect();
        Self {
            slots,
            selector,
            pacing,
        }
    }

    pub fn pacing(&self) -> &PacingConfig {
        &self.pacing
    }

    pub fn interface_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.link.name()).collect()
    }

    /// Fill in addressing fields and a random non-zero id when unset.
    pub fn prepare(request: &SendRequest) -> MeshPacket {
        let mut packet = request.packet.clone();
        packet.to = request.destination.node_num();
        packet.want_ack = request.want_ack;
        packet.hop_limit = request.hop_limit;
        if packet.id == 0 {
            packet.id = loop {
                let id: u32 = rand::random();
                if id != 0 {
                    break id;
                }
            };
        }
        packet
    }

    fn pick(&self, pinned: Option<&str>) -> Option<&LinkSlot> {
        if self.slots.is_empty() {
            return None;
        }
        if let Some(name) = pinned {
            if let Some(slot) = self.slots.iter().find(|s| s.link.name() == name) {
                return Some(slot);
            }
            warn!("Pinned interface '{}' not found; selecting another", name);
        }
        let names = self.interface_names();
        let idx = self.selector.select(&names).min(self.slots.len() - 1);
        self.slots.get(idx)
    }

    /// Send with retries. Returns the packet as transmitted, or `None` once every
    /// attempt has failed.
    pub async fn send(&self, request: SendRequest) -> Option<MeshPacket> {
        let packet = Self::prepare(&request);
        let attempts = self.pacing.max_retries + 1;
        for attempt in 1..=attempts {
            sleep(self.pacing.pre_send.sample()).await;
            let Some(slot) = self.pick(request.interface.as_deref()) else {
                metrics::inc_sends_failed();
                error!("No radio interfaces configured; dropping packet id={}", packet.id);
                return None;
            };
            let result = {
                let _gate = slot.gate.lock().await;
                let r = slot.link.transmit(&packet).await;
                sleep(self.pacing.post_send.sample()).await;
                r
            };
            match result {
                Ok(()) => {
                    info!(
                        "Sent packet via {}: channel={} id={} dest={} text=\"{}\"",
                        slot.link.name(),
                        packet.channel,
                        packet.id,
                        request.destination,
                        preview(&mesh::payload_preview(&packet), 40)
                    );
                    metrics::inc_sends_ok();
                    return Some(packet);
                }
                Err(e) => {
                    error!("Send attempt {}/{} failed: {}", attempt, attempts, e);
                    if attempt < attempts {
                        metrics::inc_send_retries();
                        sleep(self.pacing.retry_backoff.sample()).await;
                    }
                }
            }
        }
        metrics::inc_sends_failed();
        warn!(
            "Giving up on packet {} after {} attempts",
            packet.id, attempts
        );
        None
    }

    /// Best-effort send that nobody waits on; the outcome is only logged.
    pub fn send_detached(self: &Arc<Self>, request: SendRequest) {
        let tx = Arc::clone(self);
        tokio::spawn(async move {
            let id = request.packet.id;
            if tx.send(request).await.is_none() {
                debug!("Detached send (packet id {}) was not delivered", id);
            }
        });
    }
}
