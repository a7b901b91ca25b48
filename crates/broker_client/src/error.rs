//! Broker client error types

use contracts::ContractError;
use thiserror::Error;

/// Transport connector errors
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Endpoint URL cannot be mapped to a WebSocket URL
    #[error("invalid broker endpoint '{endpoint}': {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    /// Socket-level connect failure
    #[error("failed to connect to '{endpoint}': {message}")]
    ConnectFailed { endpoint: String, message: String },

    /// No CONNECTED frame within the connect timeout
    #[error("broker handshake timed out after {timeout_ms} ms")]
    HandshakeTimeout { timeout_ms: u64 },

    /// Broker answered the handshake with an ERROR frame
    #[error("broker rejected connection: {message}")]
    Rejected { message: String },

    /// Operation on a closed session
    #[error("broker session is not connected")]
    NotConnected,

    /// Malformed STOMP frame
    #[error("malformed frame: {message}")]
    Frame { message: String },

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl BrokerError {
    pub fn invalid_endpoint(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn connect_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    /// Map into the shared taxonomy (connect/session failures are transport errors)
    pub fn into_contract(self) -> ContractError {
        match self {
            Self::Contract(e) => e,
            Self::Frame { message } => ContractError::protocol(message),
            other => ContractError::transport(other.to_string()),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, BrokerError>;
