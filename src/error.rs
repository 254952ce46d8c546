//! Error types for Synheart Zone

use thiserror::Error;

/// Errors raised while building or updating a zone table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneError {
    #[error("Invalid zone index: {0} (expected 1-5)")]
    InvalidZoneIndex(u8),

    #[error("Expected 5 zones, found {0}")]
    WrongZoneCount(usize),

    #[error("Zone {zone} is inverted: min {min} > max {max}")]
    InvertedBoundary { zone: u8, min: u16, max: u16 },

    #[error("Zones {lower} and {upper} are not contiguous: max {max} + 1 != min {min}")]
    NonContiguous {
        lower: u8,
        upper: u8,
        max: u16,
        min: u16,
    },

    #[error("Invalid maximum heart rate: {0}")]
    InvalidMaxHeartRate(u16),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Errors raised by the workout session state machine
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Cannot {action} a session that is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error(transparent)]
    Zone(#[from] ZoneError),

    #[error("Sensor subscription failed: {0}")]
    Subscribe(#[from] SensorError),
}

/// Errors reported by the sensor collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("Sensor unavailable: {0}")]
    Unavailable(String),

    #[error("Sensor query failed: {0}")]
    QueryFailed(String),
}

/// Errors reported by the companion transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Companion not reachable")]
    Unreachable,

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Errors raised by the configuration sync channel
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Sync channel is closed")]
    Closed,

    #[error("Malformed sync frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    #[error(transparent)]
    Zone(#[from] ZoneError),
}

/// Errors that can occur during computation and encoding
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Zone(#[from] ZoneError),

    #[error(transparent)]
    Session(#[from] SessionError),
}
