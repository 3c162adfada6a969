//! Channel router: classify a decoded packet by the channel encoded in its topic.

use super::channels::ChannelRegistry;
use crate::logutil::preview;
use crate::mesh::{self, topic};
use crate::protobuf::meshtastic_generated::MeshPacket;
use log::warn;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Emergency,
    /// Work channel, answered on the given radio channel index.
    Work(u32),
    Unroutable,
}

pub struct ChannelRouter {
    registry: Arc<ChannelRegistry>,
}

impl ChannelRouter {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self { registry }
    }

    /// The emergency channel always wins; then work channels; anything else is logged
    /// with a payload preview and dropped by the caller.
    pub fn route(&self, packet: &MeshPacket, topic_str: &str) -> Target {
        let label = topic::channel_label(topic_str);
        if self.registry.emergency_channel() == Some(label.as_str()) {
            return Target::Emergency;
        }
        if let Some(channel_id) = self.registry.work_channel_id(&label) {
            return Target::Work(channel_id);
        }
        warn!(
            "Channel {} is not configured; dropping packet {} from {}: \"{}\"",
            label,
            packet.id,
            mesh::node_id_string(packet.from),
            preview(&mesh::payload_preview(packet), 40)
        );
        Target::Unroutable
    }
}
