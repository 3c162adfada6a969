//! Emergency guardian.
//!
//! Admission runs inline on the ingestion path: silence window first, then the
//! emergency dedup register, then text extraction. An admitted alert is broadcast on
//! the notification channel; when that broadcast went out, an advisory follows as a
//! reply to it.

use super::dedup::DedupRegister;
use super::silence::SilenceWindow;
use crate::config::EmergencyConfig;
use crate::logutil::preview;
use crate::mesh::{self, node_id_string};
use crate::metrics;
use crate::protobuf::meshtastic_generated::MeshPacket;
use crate::services::{NodeDirectory, NodePosition};
use crate::transport::radio::{SendRequest, Transmitter};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use log::{error, info};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Alert bodies longer than this are cut.
pub const ALERT_MAX_CHARS: usize = 20;
pub const ADVISORY_TEXT: &str = "@here 提高警覺，注意安全，視情況協助處理";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencyAlert {
    pub packet_id: u32,
    pub from: u32,
    /// Channel label the alert was heard on.
    pub channel: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmergencyOutcome {
    Silenced,
    Duplicate,
    Emoji,
    NoText,
    Admitted(EmergencyAlert),
}

fn value_text(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => "x".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Offset used to render epoch timestamps (Taiwan, UTC+8).
const DISPLAY_OFFSET_SECS: i32 = 8 * 3600;

/// `MM-DD HH:MM` for epoch seconds (rendered at UTC+8) or ISO-8601 strings; anything
/// else is shown as received.
pub fn format_timestamp(v: &Value) -> String {
    match v {
        Value::Number(n) => n
            .as_f64()
            .zip(FixedOffset::east_opt(DISPLAY_OFFSET_SECS))
            .and_then(|(secs, tz)| tz.timestamp_opt(secs as i64, 0).single())
            .map(|dt| dt.format("%m-%d %H:%M").to_string())
            .unwrap_or_else(|| n.to_string()),
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                dt.format("%m-%d %H:%M %:z").to_string()
            } else if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                naive.format("%m-%d %H:%M").to_string()
            } else {
                s.clone()
            }
        }
        other => other.to_string(),
    }
}

/// `<address>(<channel>/精度<m>m/<time>)` when the position has a Taiwan address.
pub fn address_line(position: &NodePosition) -> Option<String> {
    let detail = position.position.as_ref()?;
    let address = detail.taiwan_address.as_ref()?;
    let when = detail
        .timestamp
        .as_ref()
        .or(detail.update_at.as_ref())
        .filter(|v| !v.is_null())
        .map(format_timestamp)
        .unwrap_or_else(|| "x".to_string());
    Some(format!(
        "{}({}/精度{}m/{})",
        address.emergency_address.as_deref().unwrap_or("x"),
        value_text(detail.channel.as_ref()),
        value_text(detail.precision_in_meters.as_ref()),
        when
    ))
}

pub fn notification_text(channel: &str, from: u32, address: Option<&str>, text: &str) -> String {
    let body = if text.chars().count() > ALERT_MAX_CHARS {
        let mut cut: String = text.chars().take(ALERT_MAX_CHARS).collect();
        cut.push_str("...(略)");
        cut
    } else {
        text.to_string()
    };
    let mut out = format!(
        "🆘 @here 緊急守護通報/{}({})\n",
        channel,
        node_id_string(from)
    );
    if let Some(addr) = address {
        out.push_str(addr);
        out.push('\n');
    }
    out.push_str("內容：");
    out.push_str(&body);
    out
}

pub struct EmergencyGuardian {
    silence: SilenceWindow,
    dedup: DedupRegister,
    notify_channel_id: u32,
    tx: Arc<Transmitter>,
    directory: Arc<dyn NodeDirectory>,
}

impl EmergencyGuardian {
    pub fn new(
        config: &EmergencyConfig,
        dedup_window: Duration,
        tx: Arc<Transmitter>,
        directory: Arc<dyn NodeDirectory>,
    ) -> Self {
        Self {
            silence: SilenceWindow::new(Duration::from_secs(config.silence_secs)),
            dedup: DedupRegister::new(dedup_window),
            notify_channel_id: config.notify_channel_id,
            tx,
            directory,
        }
    }

    pub fn admit(&self, packet: &MeshPacket, channel: &str, now: Instant) -> EmergencyOutcome {
        if !self.silence.check_and_maybe_trigger(now) {
            info!(
                "Emergency notifications are silenced; dropping {} from {}",
                packet.id,
                node_id_string(packet.from)
            );
            return EmergencyOutcome::Silenced;
        }
        if !self.dedup.see_at(packet.id, now) {
            info!("Emergency message {} already handled", packet.id);
            metrics::inc_duplicates();
            return EmergencyOutcome::Duplicate;
        }
        let Some(data) = mesh::decoded(packet) else {
            error!("Emergency message {} has no decoded payload", packet.id);
            return EmergencyOutcome::NoText;
        };
        if mesh::is_emoji(data) {
            info!(
                "Reaction on the emergency channel (id {}) from {}",
                packet.id,
                node_id_string(packet.from)
            );
            return EmergencyOutcome::Emoji;
        }
        let Some(text) = super::commands::extract_text(data) else {
            info!("Emergency message {} carries no text", packet.id);
            return EmergencyOutcome::NoText;
        };
        info!(
            "Emergency message {} from {} on {}: \"{}\"",
            packet.id,
            node_id_string(packet.from),
            channel,
            preview(&text, 60)
        );
        EmergencyOutcome::Admitted(EmergencyAlert {
            packet_id: packet.id,
            from: packet.from,
            channel: channel.to_string(),
            text,
        })
    }

    /// Broadcast the alert and, if it went out, the advisory. Returns the notification.
    pub async fn notify(&self, alert: &EmergencyAlert) -> Option<MeshPacket> {
        let address = match self.directory.node_position(alert.from).await {
            Ok(pos) => address_line(&pos),
            Err(e) => {
                error!(
                    "Position lookup for {} failed: {}",
                    node_id_string(alert.from),
                    e
                );
                None
            }
        };
        let text = notification_text(&alert.channel, alert.from, address.as_deref(), &alert.text);
        let packet = mesh::text_packet(&text, self.notify_channel_id, None);
        let sent = self.tx.send(SendRequest::broadcast(packet, true)).await?;

        sleep(self.tx.pacing().stagger.sample()).await;
        let advisory = mesh::text_packet(ADVISORY_TEXT, self.notify_channel_id, Some(sent.id));
        self.tx.send(SendRequest::broadcast(advisory, true)).await;
        info!("Emergency notification sent: {}", preview(&text, 80));
        Some(sent)
    }

    /// Admit inline; notify in the background.
    pub fn handle(self: &Arc<Self>, packet: &MeshPacket, channel: &str) -> EmergencyOutcome {
        let outcome = self.admit(packet, channel, Instant::now());
        if let EmergencyOutcome::Admitted(ref alert) = outcome {
            let guardian = Arc::clone(self);
            let alert = alert.clone();
            tokio::spawn(async move {
                if guardian.notify(&alert).await.is_none() {
                    error!("Emergency notification for {} was not sent", alert.packet_id);
                }
            });
        }
        outcome
    }
}
