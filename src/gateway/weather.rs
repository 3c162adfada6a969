//! Weather responder with a global cooldown.
//!
//! While the cooldown runs, requests only get a 🤐 reaction. Otherwise the sender's
//! last known city and district are looked up, a processing notice goes out, and the
//! next two forecast periods follow as replies to that notice.

use super::handler::{ReplyTarget, COOLDOWN_EMOJI};
use super::silence::SilenceWindow;
use crate::config::WeatherConfig;
use crate::mesh::node_id_string;
use crate::protobuf::meshtastic_generated::MeshPacket;
use crate::services::{cwa, ForecastSource, NodeDirectory};
use crate::transport::radio::{SendRequest, Transmitter};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherOutcome {
    Disabled,
    CoolingDown,
    NoLocation,
    LookupFailed,
    Answered,
}

pub struct WeatherResponder {
    enabled: bool,
    cooldown: SilenceWindow,
    directory: Arc<dyn NodeDirectory>,
    forecast: Arc<dyn ForecastSource>,
    tx: Arc<Transmitter>,
}

impl WeatherResponder {
    pub fn new(
        config: &WeatherConfig,
        directory: Arc<dyn NodeDirectory>,
        forecast: Arc<dyn ForecastSource>,
        tx: Arc<Transmitter>,
    ) -> Self {
        Self {
            enabled: config.enabled,
            cooldown: SilenceWindow::new(Duration::from_secs(config.cooldown_secs)),
            directory,
            forecast,
            tx,
        }
    }

    pub async fn respond(&self, target: ReplyTarget, tag: &str) -> WeatherOutcome {
        if !self.enabled {
            let text = format!("嗨！{}，天氣查詢功能目前未啟用。", tag);
            self.send(target.reply(&text), true).await;
            return WeatherOutcome::Disabled;
        }
        if !self.cooldown.check_and_maybe_trigger(Instant::now()) {
            info!("Weather lookups are cooling down; reacting to {}", tag);
            self.send(target.reaction(COOLDOWN_EMOJI), false).await;
            return WeatherOutcome::CoolingDown;
        }

        let location = match self.directory.node_position(target.from).await {
            Ok(pos) => pos
                .city_district()
                .map(|(c, d)| (c.to_string(), d.to_string())),
            Err(e) => {
                error!(
                    "Position lookup for {} failed: {}",
                    node_id_string(target.from),
                    e
                );
                None
            }
        };
        let Some((city, district)) = location else {
            let text = format!("嗨！{}，我無法查詢天氣，因為沒有您所在位置的資訊。", tag);
            self.send(target.reply(&text), true).await;
            return WeatherOutcome::NoLocation;
        };

        let notice = format!("嗨！{}，正在為您查詢天氣，若未收到回應，請稍後再試。", tag);
        let anchor = self
            .send(target.reply(&notice), true)
            .await
            .map(|p| p.id);

        let forecast = self.forecast.forecast(&city, &district).await;
        self.stagger().await;

        let forecast = match forecast {
            Ok(f) => f,
            Err(e) => {
                error!("Forecast for {}{} failed: {}", city, district, e);
                let text = format!("嗨！{}，我暫時無法查詢天氣，請稍後再試。", tag);
                self.send(target.text(&text, anchor), true).await;
                return WeatherOutcome::LookupFailed;
            }
        };

        for offset in 0..2 {
            if offset > 0 {
                self.stagger().await;
            }
            let summary = cwa::summarize(&forecast, 1, offset);
            let text = format!("{}{} {}", city, district, summary);
            self.send(target.text(&text, anchor), true).await;
        }
        WeatherOutcome::Answered
    }

    async fn stagger(&self) {
        sleep(self.tx.pacing().stagger.sample()).await;
    }

    async fn send(&self, packet: MeshPacket, want_ack: bool) -> Option<MeshPacket> {
        self.tx.send(SendRequest::broadcast(packet, want_ack)).await
    }
}
