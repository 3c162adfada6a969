//! Error taxonomy for the ingestion → dispatch → transmit pipeline.
//!
//! None of these are fatal once the gateway is running: each variant maps to a
//! drop-and-log or fallback decision at the call site. Only [`GatewayError::Config`]
//! aborts, and only at startup.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed wire bytes (envelope or inner payload).
    #[error("parse failure: {0}")]
    Parse(String),
    /// Bad key, bad ciphertext, or plaintext that is not a `Data` message.
    #[error("decryption failure: {0}")]
    Decrypt(String),
    /// A collaborator (HTTP lookup) failed or returned an unusable response.
    #[error("lookup failure: {0}")]
    Lookup(String),
    /// A single transmission attempt on a radio link failed.
    #[error("transmission failure on {interface}: {reason}")]
    Transmission { interface: String, reason: String },
    /// Transport-level failure on a broker connection.
    #[error("connection failure ({endpoint}): {reason}")]
    Connection { endpoint: String, reason: String },
    /// Invalid configuration detected at startup.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn transmission(interface: &str, reason: impl ToString) -> Self {
        GatewayError::Transmission {
            interface: interface.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn connection(endpoint: &str, reason: impl ToString) -> Self {
        GatewayError::Connection {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<prost::DecodeError> for GatewayError {
    fn from(e: prost::DecodeError) -> Self {
        GatewayError::Parse(e.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Lookup(e.to_string())
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
