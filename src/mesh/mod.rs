//! Mesh packet model helpers.
//!
//! The wire types themselves are prost-generated (see [`crate::protobuf`]); this module
//! adds the small amount of domain vocabulary the gateway needs on top of them:
//! node id formatting, destinations, and builders for the text / reaction packets
//! the bot sends back onto the mesh.
//!
//! - [`crypto`] - AES-CTR channel decryption with packet-derived nonces
//! - [`codec`] - service envelope parsing and radio stream framing
//! - [`topic`] - MQTT topic validity and channel-name derivation

pub mod codec;
pub mod crypto;
pub mod topic;

use crate::protobuf::meshtastic_generated as proto;
use bytes::Bytes;
use proto::mesh_packet::{PayloadVariant, Priority};
use proto::{Data, MeshPacket, PortNum};

/// Node number used by the mesh for "everyone".
pub const BROADCAST_ADDR: u32 = 0xffff_ffff;
/// Hop limit applied to outbound packets unless a caller overrides it.
pub const DEFAULT_HOP_LIMIT: u32 = 3;

/// Format a node number the way Meshtastic clients display it (`!1a2b3c4d`).
pub fn node_id_string(num: u32) -> String {
    format!("!{:08x}", num)
}

/// Parse `!hex` or a plain decimal node number.
pub fn parse_node_id(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('!') {
        return u32::from_str_radix(hex, 16).ok();
    }
    s.parse::<u32>().ok()
}

/// Where an outbound packet is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Broadcast,
    Node(u32),
}

impl Destination {
    /// `^all` means broadcast; anything else must be a node id.
    pub fn parse(s: &str) -> Option<Self> {
        if s == "^all" {
            return Some(Destination::Broadcast);
        }
        parse_node_id(s).map(Destination::Node)
    }

    pub fn node_num(&self) -> u32 {
        match self {
            Destination::Broadcast => BROADCAST_ADDR,
            Destination::Node(n) => *n,
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Broadcast => write!(f, "^all"),
            Destination::Node(n) => write!(f, "{}", node_id_string(*n)),
        }
    }
}

/// Decoded payload of a packet, if it has one.
pub fn decoded(packet: &MeshPacket) -> Option<&Data> {
    match packet.payload_variant.as_ref() {
        Some(PayloadVariant::Decoded(data)) => Some(data),
        _ => None,
    }
}

/// Ciphertext of a packet that has not been decoded yet.
pub fn encrypted(packet: &MeshPacket) -> Option<&Bytes> {
    match packet.payload_variant.as_ref() {
        Some(PayloadVariant::Encrypted(bytes)) => Some(bytes),
        _ => None,
    }
}

/// Reaction payloads carry `emoji = 1`; they are never treated as text commands.
pub fn is_emoji(data: &Data) -> bool {
    data.emoji == 1
}

/// Lossy UTF-8 view of a decoded payload, for log lines only.
pub fn payload_preview(packet: &MeshPacket) -> String {
    decoded(packet)
        .map(|d| String::from_utf8_lossy(&d.payload).into_owned())
        .unwrap_or_default()
}

/// Build a text packet on `channel`, optionally replying to `reply_id`.
///
/// Destination, ack flag, hop limit and packet id are filled in by the transmitter.
pub fn text_packet(text: &str, channel: u32, reply_id: Option<u32>) -> MeshPacket {
    build_packet(text, channel, reply_id, false)
}

/// Build an emoji reaction to `reply_id` on `channel`.
pub fn emoji_packet(emoji: &str, channel: u32, reply_id: u32) -> MeshPacket {
    build_packet(emoji, channel, Some(reply_id), true)
}

fn build_packet(text: &str, channel: u32, reply_id: Option<u32>, emoji: bool) -> MeshPacket {
    let data = Data {
        portnum: PortNum::TextMessageApp as i32,
        payload: Bytes::copy_from_slice(text.as_bytes()),
        reply_id: reply_id.unwrap_or(0),
        emoji: u32::from(emoji),
        bitfield: emoji.then_some(1),
        ..Default::default()
    };
    let mut packet = MeshPacket {
        channel,
        payload_variant: Some(PayloadVariant::Decoded(data)),
        ..Default::default()
    };
    packet.set_priority(Priority::Background);
    packet
}
