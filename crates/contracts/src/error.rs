//! Layered error definitions
//!
//! Categorized by source: config / transport / payload / publish.
//! None of these cross the stream-manager boundary at runtime; they are
//! logged and reflected in observable state instead.

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error (including a missing endpoint when one is required)
    #[error("config validation error at '{field}': {message}")]
    Configuration { field: String, message: String },

    // ===== Transport Errors =====
    /// Handshake or mid-session transport failure
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Broker protocol violation (malformed frame, unexpected command)
    #[error("protocol error: {message}")]
    Protocol { message: String },

    // ===== Payload Errors =====
    /// Inbound payload is not valid JSON
    #[error("payload parse error for vehicle '{vehicle_id}': {message}")]
    Parse { vehicle_id: String, message: String },

    /// Payload parsed but position fields are missing or non-finite
    #[error("payload validation error for vehicle '{vehicle_id}': {message}")]
    Validation { vehicle_id: String, message: String },

    // ===== Publish Errors =====
    /// Outbound send attempted while disconnected or rejected by the transport
    #[error("publish error on '{destination}': {message}")]
    Publish {
        destination: String,
        message: String,
    },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create publish error
    pub fn publish(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            destination: destination.into(),
            message: message.into(),
        }
    }
}
