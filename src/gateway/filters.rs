//! Identity, port and freshness filters.
//!
//! Applied in pipeline order: identity → (decrypt) → port → freshness. The port and
//! freshness checks need the decoded view, so they only run after decryption.

use crate::logutil::preview;
use crate::mesh::{self, node_id_string, parse_node_id};
use crate::protobuf::meshtastic_generated as proto;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use proto::{MeshPacket, PortNum};
use std::collections::HashSet;

/// Sender ids whose packets are dropped before any other work.
#[derive(Debug, Default, Clone)]
pub struct IgnoreList {
    ids: HashSet<u32>,
}

impl IgnoreList {
    /// Entries may be decimal node numbers or `!hex` ids; unparseable entries are skipped.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut ids = HashSet::new();
        for raw in entries {
            match parse_node_id(raw.as_ref()) {
                Some(id) => {
                    ids.insert(id);
                }
                None => warn!("Ignoring unparseable ignore_ids entry '{}'", raw.as_ref()),
            }
        }
        Self { ids }
    }

    pub fn is_ignored(&self, packet: &MeshPacket) -> bool {
        if self.ids.contains(&packet.from) {
            debug!(
                "Dropping packet {} from ignored node {}",
                packet.id,
                node_id_string(packet.from)
            );
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Only text message packets are handled.
pub fn is_text_message(packet: &MeshPacket) -> bool {
    mesh::decoded(packet)
        .map(|d| d.portnum == PortNum::TextMessageApp as i32)
        .unwrap_or(false)
}

fn utc_string(epoch: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| epoch.to_string())
}

/// Reject packets received more than `max_age_secs` before `now_epoch`.
///
/// `rx_time == 0` means the uplink did not stamp the packet; such packets pass.
pub fn is_fresh(packet: &MeshPacket, now_epoch: i64, max_age_secs: u64) -> bool {
    if packet.rx_time == 0 {
        return true;
    }
    let rx = i64::from(packet.rx_time);
    if rx < now_epoch - max_age_secs as i64 {
        info!(
            "Dropping stale packet {} rx_time={} now={} text=\"{}\"",
            packet.id,
            utc_string(rx),
            utc_string(now_epoch),
            preview(&mesh::payload_preview(packet), 60)
        );
        return false;
    }
    true
}
