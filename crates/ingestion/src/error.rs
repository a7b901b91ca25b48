//! Ingestion error types

use contracts::{ContractError, VehicleId};
use thiserror::Error;

/// Reasons an inbound payload is rejected
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Message carried no body
    #[error("empty message body for vehicle {vehicle_id}")]
    EmptyBody {
        /// Vehicle the subscription was opened for
        vehicle_id: VehicleId,
    },

    /// Body is not valid JSON
    #[error("failed to parse payload for vehicle {vehicle_id}: {message}")]
    ParseFailed {
        /// Vehicle the subscription was opened for
        vehicle_id: VehicleId,
        /// Parser message
        message: String,
    },

    /// JSON but not an object
    #[error("payload for vehicle {vehicle_id} is not a JSON object")]
    NotAnObject {
        /// Vehicle the subscription was opened for
        vehicle_id: VehicleId,
    },

    /// Latitude/longitude unresolved or non-finite
    #[error("invalid position for vehicle {vehicle_id}: latitude {latitude}, longitude {longitude}")]
    InvalidPosition {
        /// Vehicle the subscription was opened for
        vehicle_id: VehicleId,
        /// Latitude resolution outcome
        latitude: String,
        /// Longitude resolution outcome
        longitude: String,
    },
}

impl IngestionError {
    /// Short label used as a metric label
    pub fn reason(&self) -> &'static str {
        match self {
            Self::EmptyBody { .. } => "empty_body",
            Self::ParseFailed { .. } => "parse_error",
            Self::NotAnObject { .. } => "not_an_object",
            Self::InvalidPosition { .. } => "invalid_position",
        }
    }

    /// Map into the shared taxonomy: syntax problems are parse errors,
    /// position problems are validation errors
    pub fn into_contract(self) -> ContractError {
        let message = self.to_string();
        match self {
            Self::EmptyBody { vehicle_id }
            | Self::ParseFailed { vehicle_id, .. }
            | Self::NotAnObject { vehicle_id } => ContractError::Parse {
                vehicle_id: vehicle_id.to_string(),
                message,
            },
            Self::InvalidPosition { vehicle_id, .. } => ContractError::Validation {
                vehicle_id: vehicle_id.to_string(),
                message,
            },
        }
    }
}

/// Ingestion Result alias
pub type Result<T> = std::result::Result<T, IngestionError>;
