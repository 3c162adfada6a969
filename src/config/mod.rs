//! # Configuration Management Module
//!
//! All gateway settings live in one TOML file, loaded once at startup and read-only
//! afterwards. [`Config::validate`] runs before anything connects; a violation aborts
//! startup, which is the only fatal error path in the gateway.
//!
//! ## Configuration Structure
//!
//! - [`GatewayConfig`] - bot identity, command prefixes, filters, cooldowns
//! - [`LoggingConfig`] - log level and optional log file
//! - [`MqttConfig`] - broker clients, hosts, topics and retry interval
//! - [`ChannelsConfig`] - work channels and extra decrypt-only channel keys
//! - [`EmergencyConfig`] - emergency guardian channel (optional)
//! - [`DeviceConfig`] - outbound radio links (TCP or serial)
//! - [`PacingConfig`] - send delays, retry bound and backoff
//! - [`MeshSightConfig`], [`WeatherConfig`], [`AiConfig`] - HTTP collaborators
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshgate::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     config.validate()?;
//!     println!("Bot: {}", config.gateway.bot_name);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [gateway]
//! bot_name = "Meshgate"
//! command_prefixes = ["@nfs.tw", "@nfstw", "@nfs"]
//!
//! [[mqtt.clients]]
//! hosts = ["mqtt.example.org"]
//! port = 1883
//! identifier = "meshgate-1"
//! topics = ["msh/TW/2/e/#"]
//!
//! [[channels.work]]
//! name = "SingleTest"
//! id = 2
//! key = "1PG7OiApB1nwvP+rz05pAQ=="
//!
//! [[devices]]
//! type = "tcp"
//! name = "node-a"
//! host = "192.168.1.20"
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub logging: LoggingConfig,
    pub mqtt: MqttConfig,
    pub channels: ChannelsConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency: Option<EmergencyConfig>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub meshsight: MeshSightConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Name shown in help page headers.
    pub bot_name: String,
    /// Bot address prefixes, matched case-insensitively in order.
    pub command_prefixes: Vec<String>,
    /// Extra substrings that signal "testing" intent (English keywords are built in).
    #[serde(default = "default_test_keywords")]
    pub test_keywords: Vec<String>,
    /// Sender node ids to ignore, as decimal (`"3735928559"`) or `!hex`.
    #[serde(default)]
    pub ignore_ids: Vec<String>,
    /// Packets whose receive time is older than this are dropped.
    #[serde(default = "default_max_packet_age")]
    pub max_packet_age_secs: u64,
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,
    #[serde(default = "default_test_ack_silence")]
    pub test_ack_silence_secs: u64,
    /// Radio link name used for ARBot forwarding; random selection when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arbot_interface: Option<String>,
    /// Pool for the generic responder; one is picked at random per reply.
    #[serde(default = "default_promo_messages")]
    pub promo_messages: Vec<String>,
    /// Interval for the periodic pipeline stats log line (0 disables it).
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_test_keywords() -> Vec<String> {
    vec!["測試".to_string()]
}
fn default_max_packet_age() -> u64 {
    30
}
fn default_dedup_window() -> u64 {
    600
}
fn default_test_ack_silence() -> u64 {
    20
}
fn default_stats_interval() -> u64 {
    300
}

fn default_promo_messages() -> Vec<String> {
    [
        "🤖使用 @nfs.tw help 查看指令！",
        "🌦️想知道今天穿什麼？輸入 @nfs.tw weather 查詢當地天氣（記得開啟定位分享 📍）",
        "🤖想找 ARBot？輸入 @nfs.tw ab，讓我幫您呼叫 🚀",
        "🔋記得常檢查電量，訊號不中斷，探索不打烊！",
        "📡每個節點都是一個小型中繼站，讓訊息穿越山川河流！",
        "🌐離網不離線，這就是 Meshtastic 最酷的地方！",
        "🤝遇到問題別擔心，社群夥伴們都很樂意幫忙！",
        "📍發現高點或戰略節點？回報給社群一起優化節點佈局吧！",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MqttConfig {
    #[serde(default)]
    pub clients: Vec<MqttClientConfig>,
}

/// One broker client definition; every host gets its own independent connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttClientConfig {
    pub hosts: Vec<String>,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    pub identifier: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub topics: Vec<String>,
    #[serde(default = "default_retry_seconds")]
    pub retry_seconds: u64,
    #[serde(default = "default_true")]
    pub show_error_log: bool,
}

fn default_mqtt_port() -> u16 {
    1883
}
fn default_retry_seconds() -> u64 {
    5
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub work: Vec<WorkChannelConfig>,
    /// Keys for channels that are decrypted (and logged) but never answered.
    #[serde(default)]
    pub decrypt_only: Vec<DecryptOnlyChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkChannelConfig {
    /// Channel name as it appears in MQTT topics.
    pub name: String,
    /// Channel index on the outbound radios.
    pub id: u32,
    /// Base64 PSK.
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptOnlyChannelConfig {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyConfig {
    pub channel_name: String,
    pub channel_key: String,
    /// Radio channel index that receives the notification broadcast.
    pub notify_channel_id: u32,
    #[serde(default = "default_emergency_silence")]
    pub silence_secs: u64,
}

fn default_emergency_silence() -> u64 {
    180
}

/// Outbound radio link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeviceConfig {
    Tcp {
        name: String,
        host: String,
        #[serde(default = "default_tcp_port")]
        port: u16,
    },
    Serial {
        name: String,
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
}

fn default_tcp_port() -> u16 {
    4403
}
fn default_baud_rate() -> u32 {
    115200
}

impl DeviceConfig {
    pub fn name(&self) -> &str {
        match self {
            DeviceConfig::Tcp { name, .. } | DeviceConfig::Serial { name, .. } => name,
        }
    }
}

/// Inclusive millisecond range sampled uniformly for jittered delays.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MillisRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl MillisRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    pub fn sample(&self) -> Duration {
        use rand::Rng;
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }

    pub fn is_ordered(&self) -> bool {
        self.min_ms <= self.max_ms
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PacingConfig {
    /// Courtesy delay before every transmission attempt.
    pub pre_send: MillisRange,
    /// Settle time held on the interface after every attempt, successful or not.
    pub post_send: MillisRange,
    /// Backoff between failed attempts.
    pub retry_backoff: MillisRange,
    /// Gap between the messages of a reply chain.
    pub stagger: MillisRange,
    /// Retries after the first attempt.
    pub max_retries: u32,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            pre_send: MillisRange::new(1000, 3000),
            post_send: MillisRange::new(3000, 5000),
            retry_backoff: MillisRange::new(500, 1000),
            stagger: MillisRange::new(500, 1000),
            max_retries: 3,
        }
    }
}

impl PacingConfig {
    /// No delays at all; retries keep their bound.
    pub fn immediate() -> Self {
        Self {
            pre_send: MillisRange::zero(),
            post_send: MillisRange::zero(),
            retry_backoff: MillisRange::zero(),
            stagger: MillisRange::zero(),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSightConfig {
    pub api_url: String,
    pub timeout_seconds: u64,
}

impl Default for MeshSightConfig {
    fn default() -> Self {
        Self {
            api_url: "https://meshsight.nfs.tw/api".to_string(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub enabled: bool,
    /// CWA open data authorization key.
    pub api_key: String,
    pub timeout_seconds: u64,
    pub cooldown_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            timeout_seconds: 10,
            cooldown_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub enabled: bool,
    pub api_base: String,
    pub api_key: String,
    pub timeout_seconds: u64,
    /// Characters per reply segment.
    pub segment_chars: usize,
    /// Fixed gap between reply segments.
    pub segment_delay_ms: u64,
    /// How long a sender's conversation is continued before a new one starts.
    pub conversation_ttl_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: "https://api.dify.ai/v1".to_string(),
            api_key: String::new(),
            timeout_seconds: 60,
            segment_chars: 60,
            segment_delay_ms: 1000,
            conversation_ttl_secs: 1800,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Startup checks. Any error here is fatal.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.command_prefixes.iter().all(|p| p.trim().is_empty()) {
            return Err(anyhow!("gateway.command_prefixes must contain at least one prefix"));
        }
        if self.mqtt.clients.is_empty() {
            return Err(anyhow!("at least one [[mqtt.clients]] entry is required"));
        }
        for (i, client) in self.mqtt.clients.iter().enumerate() {
            if client.hosts.is_empty() {
                return Err(anyhow!("mqtt.clients[{}] has no hosts", i));
            }
            if client.topics.is_empty() {
                return Err(anyhow!("mqtt.clients[{}] has no topics", i));
            }
            if client.identifier.trim().is_empty() {
                return Err(anyhow!("mqtt.clients[{}] has an empty identifier", i));
            }
        }
        if self.channels.work.is_empty() {
            return Err(anyhow!("at least one [[channels.work]] entry is required"));
        }

        let mut names = HashSet::new();
        let configured = self
            .channels
            .work
            .iter()
            .map(|c| c.name.as_str())
            .chain(self.channels.decrypt_only.iter().map(|c| c.name.as_str()))
            .chain(self.emergency.iter().map(|e| e.channel_name.as_str()));
        for name in configured {
            if name.trim().is_empty() {
                return Err(anyhow!("channel names must not be empty"));
            }
            if !names.insert(name) {
                return Err(anyhow!("duplicate channel name '{}'", name));
            }
        }

        let mut device_names = HashSet::new();
        for device in &self.devices {
            if !device_names.insert(device.name()) {
                return Err(anyhow!("duplicate device name '{}'", device.name()));
            }
        }
        if let Some(ref pinned) = self.gateway.arbot_interface {
            if !device_names.contains(pinned.as_str()) {
                return Err(anyhow!(
                    "gateway.arbot_interface '{}' does not match any [[devices]] name",
                    pinned
                ));
            }
        }

        let p = &self.pacing;
        for (label, range) in [
            ("pre_send", p.pre_send),
            ("post_send", p.post_send),
            ("retry_backoff", p.retry_backoff),
            ("stagger", p.stagger),
        ] {
            if !range.is_ordered() {
                return Err(anyhow!("pacing.{} has min_ms > max_ms", label));
            }
        }
        if self.ai.enabled && self.ai.segment_chars == 0 {
            return Err(anyhow!("ai.segment_chars must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gateway: GatewayConfig {
                bot_name: "Meshgate".to_string(),
                command_prefixes: vec![
                    "@nfs.tw".to_string(),
                    "@nfstw".to_string(),
                    "@nfs".to_string(),
                ],
                test_keywords: default_test_keywords(),
                ignore_ids: Vec::new(),
                max_packet_age_secs: default_max_packet_age(),
                dedup_window_secs: default_dedup_window(),
                test_ack_silence_secs: default_test_ack_silence(),
                arbot_interface: None,
                promo_messages: default_promo_messages(),
                stats_interval_secs: default_stats_interval(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("meshgate.log".to_string()),
            },
            mqtt: MqttConfig {
                clients: vec![MqttClientConfig {
                    hosts: vec!["mqtt.meshtastic.org".to_string()],
                    port: default_mqtt_port(),
                    identifier: "meshgate".to_string(),
                    username: "meshdev".to_string(),
                    password: "large4cats".to_string(),
                    topics: vec!["msh/TW/2/e/#".to_string()],
                    retry_seconds: default_retry_seconds(),
                    show_error_log: true,
                }],
            },
            channels: ChannelsConfig {
                work: vec![WorkChannelConfig {
                    name: "SingleTest".to_string(),
                    id: 2,
                    key: "1PG7OiApB1nwvP+rz05pAQ==".to_string(),
                }],
                decrypt_only: Vec::new(),
            },
            emergency: None,
            devices: vec![DeviceConfig::Tcp {
                name: "local".to_string(),
                host: "127.0.0.1".to_string(),
                port: default_tcp_port(),
            }],
            pacing: PacingConfig::default(),
            meshsight: MeshSightConfig::default(),
            weather: WeatherConfig::default(),
            ai: AiConfig::default(),
        }
    }
}
