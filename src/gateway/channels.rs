//! Channel key registry.
//!
//! Maps a channel name (as it appears in MQTT topics) to its PSK and routing role.
//! Built once from configuration; read-only afterwards.

use crate::config::Config;
use crate::error::{GatewayError, GatewayResult};
use crate::mesh::topic::PKI_CHANNEL;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// Bot commands are answered on radio channel index `channel_id`.
    Work { channel_id: u32 },
    /// Emergency guardian channel.
    Emergency,
    /// Decrypted only.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelKeyEntry {
    pub name: String,
    /// Base64 PSK.
    pub key: String,
    pub role: ChannelRole,
}

#[derive(Debug, Default)]
pub struct ChannelRegistry {
    entries: HashMap<String, ChannelKeyEntry>,
    emergency: Option<String>,
}

impl ChannelRegistry {
    pub fn new(entries: Vec<ChannelKeyEntry>) -> GatewayResult<Self> {
        let mut map = HashMap::with_capacity(entries.len());
        let mut emergency = None;
        for entry in entries {
            if entry.role == ChannelRole::Emergency {
                if emergency.is_some() {
                    return Err(GatewayError::Config(
                        "only one emergency channel may be configured".into(),
                    ));
                }
                emergency = Some(entry.name.clone());
            }
            if map.contains_key(&entry.name) {
                return Err(GatewayError::Config(format!(
                    "duplicate channel name '{}'",
                    entry.name
                )));
            }
            map.insert(entry.name.clone(), entry);
        }
        Ok(Self {
            entries: map,
            emergency,
        })
    }

    /// Work channels, decrypt-only channels and the emergency channel (if any).
    pub fn from_config(config: &Config) -> GatewayResult<Self> {
        let mut entries: Vec<ChannelKeyEntry> = config
            .channels
            .work
            .iter()
            .map(|c| ChannelKeyEntry {
                name: c.name.clone(),
                key: c.key.clone(),
                role: ChannelRole::Work { channel_id: c.id },
            })
            .collect();
        entries.extend(config.channels.decrypt_only.iter().map(|c| ChannelKeyEntry {
            name: c.name.clone(),
            key: c.key.clone(),
            role: ChannelRole::None,
        }));
        if let Some(ref e) = config.emergency {
            entries.push(ChannelKeyEntry {
                name: e.channel_name.clone(),
                key: e.channel_key.clone(),
                role: ChannelRole::Emergency,
            });
        }
        Self::new(entries)
    }

    /// Look up a channel by name. `PKI` never resolves: those packets are end-to-end
    /// encrypted with keys the gateway does not hold.
    pub fn resolve(&self, channel_name: &str) -> Option<&ChannelKeyEntry> {
        if channel_name == PKI_CHANNEL {
            return None;
        }
        self.entries.get(channel_name)
    }

    pub fn work_channel_id(&self, channel_name: &str) -> Option<u32> {
        match self.resolve(channel_name)?.role {
            ChannelRole::Work { channel_id } => Some(channel_id),
            _ => None,
        }
    }

    pub fn emergency_channel(&self) -> Option<&str> {
        self.emergency.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by name, for status output.
    pub fn entries(&self) -> Vec<&ChannelKeyEntry> {
        let mut v: Vec<_> = self.entries.values().collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        v
    }
}
