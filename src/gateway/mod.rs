//! The gateway proper: everything between a received MQTT publish and the replies sent
//! back onto the mesh.
//!
//! - [`pipeline`] - ingestion entry point (decode, filter, decrypt, route)
//! - [`channels`] - channel key registry
//! - [`filters`] / [`dedup`] / [`silence`] - drop rules and rate-limit state
//! - [`router`] - emergency / work / unroutable classification
//! - [`commands`] / [`handler`] - command parsing and work-channel responders
//! - [`weather`] / [`assistant`] / [`emergency`] - feature responders
//! - [`server`] - assembly and main loop

pub mod assistant;
pub mod channels;
pub mod commands;
pub mod dedup;
pub mod emergency;
pub mod filters;
pub mod handler;
pub mod pipeline;
pub mod router;
pub mod server;
pub mod silence;
pub mod weather;

pub use pipeline::{IngestOutcome, Pipeline, Services};
pub use server::Gateway;
