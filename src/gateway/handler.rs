//! Work-channel message handler.
//!
//! Order of checks for every routed packet: dedup → emoji drop → text extraction →
//! command prefix or test intent. Commands get an immediate 🤖 reaction (detached) and
//! are then answered by the matching responder.

use super::assistant::Assistant;
use super::commands::{self, Command};
use super::dedup::DedupRegister;
use super::silence::SilenceWindow;
use super::weather::WeatherResponder;
use crate::config::Config;
use crate::logutil::preview;
use crate::mesh::{self, node_id_string};
use crate::metrics;
use crate::protobuf::meshtastic_generated::MeshPacket;
use crate::services::NodeDirectory;
use crate::transport::radio::{SendRequest, Transmitter};
use log::{debug, error, info};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Reaction sent as soon as a command is recognised.
pub const ACK_EMOJI: &str = "🤖";
/// Reaction to a test ping.
pub const TEST_ACK_EMOJI: &str = "👌";
/// Reaction while a rate-limited feature is cooling down.
pub const COOLDOWN_EMOJI: &str = "🤐";
/// Bridged command used when `ab` has no arguments.
pub const DEFAULT_AB_COMMAND: &str = "test";

/// The inbound message a reply refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyTarget {
    pub packet_id: u32,
    pub from: u32,
    /// Radio channel index the reply goes out on.
    pub channel_id: u32,
}

impl ReplyTarget {
    pub fn text(&self, text: &str, reply_id: Option<u32>) -> MeshPacket {
        mesh::text_packet(text, self.channel_id, reply_id)
    }

    /// Reply to the inbound message itself.
    pub fn reply(&self, text: &str) -> MeshPacket {
        self.text(text, Some(self.packet_id))
    }

    pub fn reaction(&self, emoji: &str) -> MeshPacket {
        mesh::emoji_packet(emoji, self.channel_id, self.packet_id)
    }
}

/// `!hex`, replaced by the short name when known, plus ` (<city><district>)` when the
/// last position is known. Both lookups run concurrently and fail independently.
pub async fn sender_tag(directory: &dyn NodeDirectory, node: u32) -> String {
    let mut tag = node_id_string(node);
    let (info, position) = tokio::join!(directory.node_info(node), directory.node_position(node));
    match info {
        Ok(info) => {
            if let Some(short) = info.short_name() {
                tag = short.to_string();
            }
        }
        Err(e) => error!("Node info lookup for {} failed: {}", node_id_string(node), e),
    }
    match position {
        Ok(pos) => {
            if let Some(locality) = pos.locality() {
                tag.push_str(&format!(" ({})", locality));
            }
        }
        Err(e) => error!(
            "Node position lookup for {} failed: {}",
            node_id_string(node),
            e
        ),
    }
    tag
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Duplicate,
    Emoji,
    NoText,
    /// A command was dispatched; carries the responder name.
    Command(&'static str),
    TestAck,
    TestAckSilenced,
    Ignored,
}

/// Static settings of the handler, taken from `[gateway]` and `[ai]`.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub bot_name: String,
    pub command_prefixes: Vec<String>,
    pub test_keywords: Vec<String>,
    pub promo_messages: Vec<String>,
    pub arbot_interface: Option<String>,
    pub ai_enabled: bool,
    pub dedup_window: Duration,
    pub test_ack_silence: Duration,
}

impl HandlerSettings {
    pub fn from_config(config: &Config) -> Self {
        let g = &config.gateway;
        Self {
            bot_name: g.bot_name.clone(),
            command_prefixes: g.command_prefixes.clone(),
            test_keywords: g.test_keywords.clone(),
            promo_messages: g.promo_messages.clone(),
            arbot_interface: g.arbot_interface.clone(),
            ai_enabled: config.ai.enabled,
            dedup_window: Duration::from_secs(g.dedup_window_secs),
            test_ack_silence: Duration::from_secs(g.test_ack_silence_secs),
        }
    }

    /// Prefix shown in help headers and usage hints.
    pub fn display_prefix(&self) -> &str {
        self.command_prefixes
            .first()
            .map(|s| s.as_str())
            .unwrap_or_default()
    }
}

pub struct MessageHandler {
    settings: HandlerSettings,
    dedup: DedupRegister,
    test_ack: SilenceWindow,
    tx: Arc<Transmitter>,
    directory: Arc<dyn NodeDirectory>,
    weather: WeatherResponder,
    assistant: Assistant,
}

impl MessageHandler {
    pub fn new(
        settings: HandlerSettings,
        tx: Arc<Transmitter>,
        directory: Arc<dyn NodeDirectory>,
        weather: WeatherResponder,
        assistant: Assistant,
    ) -> Self {
        Self {
            dedup: DedupRegister::new(settings.dedup_window),
            test_ack: SilenceWindow::new(settings.test_ack_silence),
            settings,
            tx,
            directory,
            weather,
            assistant,
        }
    }

    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    pub async fn handle_channel_message(
        &self,
        packet: &MeshPacket,
        channel_id: u32,
    ) -> HandlerOutcome {
        if !self.dedup.see(packet.id) {
            info!("Message {} already handled; skipping", packet.id);
            metrics::inc_duplicates();
            return HandlerOutcome::Duplicate;
        }
        let Some(data) = mesh::decoded(packet) else {
            error!("Message {} has no decoded payload", packet.id);
            return HandlerOutcome::NoText;
        };
        if mesh::is_emoji(data) {
            info!(
                "Reaction on channel {} (id {}) from {}; nothing to do",
                channel_id,
                packet.id,
                node_id_string(packet.from)
            );
            return HandlerOutcome::Emoji;
        }
        let Some(text) = commands::extract_text(data) else {
            return HandlerOutcome::NoText;
        };

        let target = ReplyTarget {
            packet_id: packet.id,
            from: packet.from,
            channel_id,
        };
        if let Some(command) = commands::extract_command(&text, &self.settings.command_prefixes) {
            let name = self.dispatch(target, &command).await;
            return HandlerOutcome::Command(name);
        }
        if commands::is_test_message(&text, &self.settings.test_keywords) {
            return self.handle_test_message(target, &text).await;
        }
        debug!(
            "Not a command, ignoring: \"{}\" channel={} id={} from={}",
            preview(&text, 60),
            channel_id,
            packet.id,
            node_id_string(packet.from)
        );
        HandlerOutcome::Ignored
    }

    async fn handle_test_message(&self, target: ReplyTarget, text: &str) -> HandlerOutcome {
        if !self.test_ack.check_and_maybe_trigger(Instant::now()) {
            info!(
                "Test acknowledgement is cooling down; ignoring \"{}\" from {}",
                preview(text, 30),
                node_id_string(target.from)
            );
            return HandlerOutcome::TestAckSilenced;
        }
        info!(
            "Test ping \"{}\" on channel {} (id {}) from {}",
            preview(text, 30),
            target.channel_id,
            target.packet_id,
            node_id_string(target.from)
        );
        self.tx
            .send(SendRequest::broadcast(target.reaction(TEST_ACK_EMOJI), false))
            .await;
        HandlerOutcome::TestAck
    }

    async fn dispatch(&self, target: ReplyTarget, command: &str) -> &'static str {
        info!(
            "Command \"{}\" on channel {} (id {}) from {}",
            preview(command, 60),
            target.channel_id,
            target.packet_id,
            node_id_string(target.from)
        );
        self.tx
            .send_detached(SendRequest::broadcast(target.reaction(ACK_EMOJI), false));

        let tag = sender_tag(self.directory.as_ref(), target.from).await;
        let parsed = Command::parse(command);
        match &parsed {
            Command::Help { page } => self.handle_help(target, page).await,
            Command::Weather => {
                let outcome = self.weather.respond(target, &tag).await;
                debug!("Weather request from {} ended with {:?}", tag, outcome);
            }
            Command::Ab { args } => self.handle_ab(target, &tag, args).await,
            Command::Ai { query } => {
                let outcome = self
                    .assistant
                    .respond(target, &tag, query, self.settings.display_prefix())
                    .await;
                debug!("AI request from {} ended with {:?}", tag, outcome);
            }
            Command::Generic { text } => self.handle_generic(target, &tag, text).await,
        }
        parsed.name()
    }

    async fn handle_help(&self, target: ReplyTarget, page_arg: &str) {
        let block = commands::help_block(&commands::help_entries(self.settings.ai_enabled));
        let pages = commands::paginate(&block, commands::HELP_PAGE_CHARS);
        let total = pages.len();
        let Some(page) = commands::resolve_help_page(page_arg, total) else {
            debug!("Help page argument \"{}\" is not a number", preview(page_arg, 20));
            return;
        };
        let body = pages.get(page - 1).map(|s| s.as_str()).unwrap_or_default();
        let text = commands::help_page_text(
            &self.settings.bot_name,
            self.settings.display_prefix(),
            page,
            total,
            body,
        );
        self.tx
            .send(SendRequest::broadcast(target.reply(&text), true))
            .await;
    }

    async fn handle_ab(&self, target: ReplyTarget, tag: &str, args: &str) {
        let bridged = if args.trim().is_empty() {
            DEFAULT_AB_COMMAND
        } else {
            args.trim()
        };
        info!("Forwarding \"{}\" to ARBot for {}", preview(bridged, 40), tag);

        let pin = self.settings.arbot_interface.clone();
        let notice = format!(
            "嗨！{}，正在為您呼叫 ARBot 機器人，若未收到回應，請稍後再試。",
            tag
        );
        let anchor = self
            .tx
            .send(SendRequest::broadcast(target.reply(&notice), true).via(pin.clone()))
            .await;

        sleep(self.tx.pacing().stagger.sample()).await;

        let forward = target.text(&format!("@ab {}", bridged), anchor.map(|p| p.id));
        self.tx
            .send(SendRequest::broadcast(forward, true).via(pin))
            .await;
    }

    async fn handle_generic(&self, target: ReplyTarget, tag: &str, command: &str) {
        let promo = self
            .settings
            .promo_messages
            .choose(&mut rand::thread_rng())
            .map(|s| s.as_str())
            .unwrap_or_default();
        let text = commands::generic_reply(tag, command, promo);
        self.tx
            .send(SendRequest::broadcast(target.reply(&text), true))
            .await;
    }
}
