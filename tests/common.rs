//! Test utilities & fixtures.
//! Fake radio links and collaborators, plus helpers to build encrypted envelopes.
#![allow(dead_code)]

use async_trait::async_trait;
use meshgate::config::{Config, EmergencyConfig, PacingConfig};
use meshgate::error::{GatewayError, GatewayResult};
use meshgate::gateway::assistant::Assistant;
use meshgate::gateway::handler::{HandlerSettings, MessageHandler};
use meshgate::gateway::weather::WeatherResponder;
use meshgate::gateway::Services;
use meshgate::mesh::{self, codec, crypto};
use meshgate::protobuf::meshtastic_generated::mesh_packet::PayloadVariant;
use meshgate::protobuf::meshtastic_generated::{Data, MeshPacket, PortNum};
use meshgate::services::meshsight::{NodeItem, PositionDetail, TaiwanAddress};
use meshgate::services::{
    ChatBackend, ChatReply, ForecastSource, LocationForecast, NodeDirectory, NodeInfo,
    NodePosition,
};
use meshgate::transport::radio::{InterfaceSelector, RadioLink, Transmitter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

pub const WORK_KEY: &str = "1PG7OiApB1nwvP+rz05pAQ==";
pub const WORK_CHANNEL: &str = "SingleTest";
pub const WORK_CHANNEL_ID: u32 = 2;
pub const EMERGENCY_CHANNEL: &str = "Guardian";
pub const EMERGENCY_KEY: &str = "AAECAwQFBgcICQoLDA0ODw==";
pub const NOTIFY_CHANNEL_ID: u32 = 5;

/// Link that accepts every packet and remembers it.
pub struct RecordingLink {
    name: String,
    sent: Mutex<Vec<MeshPacket>>,
}

impl RecordingLink {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<MeshPacket> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts of sent non-reaction packets, in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter(|p| !is_reaction(p))
            .map(text_of)
            .collect()
    }

    pub fn reactions(&self) -> Vec<MeshPacket> {
        self.sent().into_iter().filter(is_reaction).collect()
    }
}

#[async_trait]
impl RadioLink for RecordingLink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transmit(&self, packet: &MeshPacket) -> GatewayResult<()> {
        self.sent.lock().unwrap().push(packet.clone());
        Ok(())
    }
}

/// Link that fails every attempt and records when each one happened.
pub struct FailingLink {
    name: String,
    attempts: Mutex<Vec<Instant>>,
}

impl FailingLink {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl RadioLink for FailingLink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transmit(&self, _packet: &MeshPacket) -> GatewayResult<()> {
        self.attempts.lock().unwrap().push(Instant::now());
        Err(GatewayError::transmission(&self.name, "radio unplugged"))
    }
}

/// Always picks the same index.
pub struct FixedSelector(pub usize);

impl InterfaceSelector for FixedSelector {
    fn select(&self, _names: &[&str]) -> usize {
        self.0
    }
}

/// Directory with canned answers; `None` means the lookup fails.
#[derive(Default)]
pub struct FakeDirectory {
    pub info: Option<NodeInfo>,
    pub position: Option<NodePosition>,
    pub position_calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(short_name: Option<&str>, position: Option<NodePosition>) -> Arc<Self> {
        Arc::new(Self {
            info: short_name.map(|s| NodeInfo {
                item: Some(NodeItem {
                    short_name: Some(s.to_string()),
                    long_name: None,
                }),
            }),
            position,
            position_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl NodeDirectory for FakeDirectory {
    async fn node_info(&self, _node_id: u32) -> GatewayResult<NodeInfo> {
        self.info
            .clone()
            .ok_or_else(|| GatewayError::Lookup("node not found".into()))
    }

    async fn node_position(&self, _node_id: u32) -> GatewayResult<NodePosition> {
        self.position_calls.fetch_add(1, Ordering::SeqCst);
        self.position
            .clone()
            .ok_or_else(|| GatewayError::Lookup("position not found".into()))
    }
}

pub fn taipei_position() -> NodePosition {
    NodePosition {
        position: Some(PositionDetail {
            taiwan_address: Some(TaiwanAddress {
                city_or_county: Some("臺北市".into()),
                district_level: Some("大安區".into()),
                emergency_address: Some("臺北市大安區羅斯福路四段1號".into()),
            }),
            channel: Some(serde_json::Value::from("LongFast")),
            precision_in_meters: Some(serde_json::Value::from(350)),
            timestamp: Some(serde_json::Value::from("2025-03-01T08:30:00")),
            update_at: None,
        }),
    }
}

pub struct FakeForecast {
    pub forecast: Option<LocationForecast>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FakeForecast {
    pub fn new(forecast: Option<LocationForecast>) -> Arc<Self> {
        Arc::new(Self {
            forecast,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ForecastSource for FakeForecast {
    async fn forecast(&self, city: &str, district: &str) -> GatewayResult<LocationForecast> {
        self.calls
            .lock()
            .unwrap()
            .push((city.to_string(), district.to_string()));
        self.forecast
            .clone()
            .ok_or_else(|| GatewayError::Lookup("HTTP 503".into()))
    }
}

pub fn two_period_forecast() -> LocationForecast {
    serde_json::from_str(
        r#"{"LocationName":"大安區","WeatherElement":[{"ElementName":"天氣預報綜合描述","Time":[
            {"StartTime":"2025-03-01T06:00:00+08:00","EndTime":"2025-03-01T18:00:00+08:00",
             "ElementValue":[{"WeatherDescription":"晴。"}]},
            {"StartTime":"2025-03-01T18:00:00+08:00","EndTime":"2025-03-02T06:00:00+08:00",
             "ElementValue":[{"WeatherDescription":"多雲。"}]}]}]}"#,
    )
    .expect("forecast json")
}

/// Chat backend with a canned answer; `None` fails every call.
pub struct FakeChat {
    pub answer: Option<String>,
    pub conversation_id: Option<String>,
    pub calls: Mutex<Vec<(String, String, Option<String>)>>,
}

impl FakeChat {
    pub fn new(answer: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.map(|s| s.to_string()),
            conversation_id: Some("conv-1".into()),
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatBackend for FakeChat {
    async fn send_chat(
        &self,
        query: &str,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> GatewayResult<ChatReply> {
        self.calls.lock().unwrap().push((
            query.to_string(),
            user_id.to_string(),
            conversation_id.map(|s| s.to_string()),
        ));
        match self.answer {
            Some(ref answer) => Ok(ChatReply {
                answer: answer.clone(),
                conversation_id: self.conversation_id.clone(),
            }),
            None => Err(GatewayError::Lookup("HTTP 500".into())),
        }
    }
}

/// Default config plus an emergency channel and both optional features on.
pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.gateway.command_prefixes = vec!["@nfs.tw".into(), "@nfstw".into(), "@nfs".into()];
    cfg.gateway.promo_messages = vec!["PROMO".into()];
    cfg.gateway.arbot_interface = None;
    cfg.emergency = Some(EmergencyConfig {
        channel_name: EMERGENCY_CHANNEL.into(),
        channel_key: EMERGENCY_KEY.into(),
        notify_channel_id: NOTIFY_CHANNEL_ID,
        silence_secs: 180,
    });
    cfg.weather.enabled = true;
    cfg.ai.enabled = true;
    cfg.pacing = PacingConfig::immediate();
    cfg
}

pub fn transmitter(links: Vec<Arc<dyn RadioLink>>) -> Arc<Transmitter> {
    Arc::new(Transmitter::new(links, PacingConfig::immediate()))
}

pub fn links(links: &[&Arc<RecordingLink>]) -> Vec<Arc<dyn RadioLink>> {
    links
        .iter()
        .map(|l| Arc::clone(*l) as Arc<dyn RadioLink>)
        .collect()
}

/// Work-channel handler wired to fakes.
pub fn handler(
    cfg: &Config,
    tx: Arc<Transmitter>,
    directory: Arc<FakeDirectory>,
    forecast: Arc<FakeForecast>,
    chat: Arc<FakeChat>,
) -> MessageHandler {
    let weather = WeatherResponder::new(&cfg.weather, directory.clone(), forecast, tx.clone());
    let assistant = Assistant::new(&cfg.ai, chat, tx.clone());
    MessageHandler::new(
        HandlerSettings::from_config(cfg),
        tx,
        directory,
        weather,
        assistant,
    )
}

pub fn services(
    directory: Arc<FakeDirectory>,
    forecast: Arc<FakeForecast>,
    chat: Arc<FakeChat>,
) -> Services {
    Services {
        directory,
        forecast,
        chat,
    }
}

pub fn text_data(text: &str) -> Data {
    Data {
        portnum: PortNum::TextMessageApp as i32,
        payload: text.as_bytes().to_vec().into(),
        ..Default::default()
    }
}

/// Decoded text packet as it looks after decryption.
pub fn text_packet(id: u32, from: u32, text: &str) -> MeshPacket {
    MeshPacket {
        id,
        from,
        to: mesh::BROADCAST_ADDR,
        payload_variant: Some(PayloadVariant::Decoded(text_data(text))),
        ..Default::default()
    }
}

/// Envelope bytes of an encrypted text packet, as an MQTT uplink publishes it.
pub fn encrypted_envelope(
    key: &str,
    channel: &str,
    id: u32,
    from: u32,
    text: &str,
    rx_time: u32,
) -> Vec<u8> {
    let ciphertext = crypto::encrypt(key, id, from, &text_data(text)).expect("encrypt");
    let packet = MeshPacket {
        id,
        from,
        to: mesh::BROADCAST_ADDR,
        rx_time,
        payload_variant: Some(PayloadVariant::Encrypted(ciphertext.into())),
        ..Default::default()
    };
    codec::encode_envelope(&codec::envelope_for(packet, channel, "!gateway1"))
}

pub fn topic_for(channel: &str) -> String {
    format!("msh/TW/2/e/{}/!abcd1234", channel)
}

pub fn text_of(packet: &MeshPacket) -> String {
    mesh::payload_preview(packet)
}

pub fn reply_id_of(packet: &MeshPacket) -> u32 {
    mesh::decoded(packet).map(|d| d.reply_id).unwrap_or(0)
}

pub fn is_reaction(packet: &MeshPacket) -> bool {
    mesh::decoded(packet).map(|d| d.emoji == 1).unwrap_or(false)
}

/// Let spawned tasks run to completion (time is paused in these tests).
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
}
