//! Stream manager errors
//!
//! Only construction can fail; runtime failures are logged and surface as
//! state (`connected`, `data_timeout_warning`).

use broker_client::BrokerError;
use contracts::ContractError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    /// Rejected stream configuration
    #[error("invalid stream configuration at '{field}': {message}")]
    Config { field: String, message: String },

    /// The stream's worker has already stopped
    #[error("stream is shut down")]
    Closed,

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl StreamError {
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn into_contract(self) -> ContractError {
        match self {
            Self::Config { field, message } => ContractError::config_validation(field, message),
            Self::Closed => ContractError::transport("stream is shut down"),
            Self::Broker(e) => e.into_contract(),
            Self::Contract(e) => e,
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
