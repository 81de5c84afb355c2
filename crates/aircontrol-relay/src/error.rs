//! Relay errors.

use std::time::Duration;

use aircontrol_actuation::ActuationError;
use thiserror::Error;

pub const SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
pub const CONTROLLER_SLOTS_FULL: &str = "CONTROLLER_SLOTS_FULL";
pub const TIMEOUT: &str = "TIMEOUT";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("session not found")]
    NotFound,

    #[error("no free controller slot")]
    SlotsFull,

    #[error("connection is not the session host")]
    Unauthorized,

    #[error("no acknowledgement within {0:?}")]
    Timeout(Duration),

    #[error("connection closed")]
    Closed,

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("frame of {0} bytes exceeds the line limit")]
    FrameTooLarge(usize),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("actuation error: {0}")]
    Actuation(#[from] ActuationError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RelayError {
    /// The error string sent to clients in a failed acknowledgement.
    ///
    /// A non-host update is reported as a missing session.
    pub fn wire_code(&self) -> &str {
        match self {
            Self::NotFound | Self::Unauthorized => SESSION_NOT_FOUND,
            Self::SlotsFull => CONTROLLER_SLOTS_FULL,
            Self::Timeout(_) => TIMEOUT,
            Self::Rejected(code) => code,
            _ => "INTERNAL_ERROR",
        }
    }

    /// Map an acknowledgement error string back to an error.
    pub fn from_wire(code: &str) -> Self {
        match code {
            SESSION_NOT_FOUND => Self::NotFound,
            CONTROLLER_SLOTS_FULL => Self::SlotsFull,
            other => Self::Rejected(other.to_string()),
        }
    }
}
