//! # Meshgate - MQTT to Mesh Gateway Bot for Meshtastic Networks
//!
//! Meshgate listens to Meshtastic traffic uplinked to one or more MQTT brokers, decrypts
//! channel packets with configured keys, and answers bot commands by transmitting replies
//! through locally attached radios.
//!
//! ## Features
//!
//! - **Multi-broker ingestion**: every configured host runs its own subscription with
//!   reconnect-and-backoff.
//! - **Channel decryption**: AES-CTR with packet-derived nonces and per-channel PSKs.
//! - **Filtering**: ignore-list, text-port only, stale packet rejection, per-consumer dedup.
//! - **Bot commands**: help, weather, ARBot relay, AI chat, generic replies, test pings.
//! - **Emergency guardian**: rate-limited broadcast alerts for a dedicated channel.
//! - **Paced transmission**: jittered delays, per-radio settle time, bounded retries.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshgate::config::Config;
//! use meshgate::gateway::Gateway;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let gateway = Gateway::new(config)?;
//!     gateway.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`gateway`] - ingestion pipeline, routing, responders, main loop
//! - [`mesh`] - packet helpers, channel crypto, envelope codec, topic model
//! - [`transport`] - MQTT ingestion and outbound radio links
//! - [`services`] - node directory, weather forecast and AI chat clients
//! - [`config`] - configuration loading and validation
//! - [`error`] - error taxonomy
//! - [`metrics`] - pipeline counters
//! - [`protobuf`] - generated Meshtastic protobuf types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  MQTT brokers   │ ← one task per host
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │    Pipeline     │ ← decode, filter, decrypt, route
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Responders    │ ← commands, weather, AI, emergency
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Transmitter   │ ← paced sends over TCP / serial radios
//! └─────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod logutil;
pub mod mesh;
pub mod metrics;
pub mod protobuf;
pub mod services;
pub mod transport;
