//! Direct-connect wire protocol.
//!
//! A phone talks straight to a desktop host over one JSON object per line,
//! tagged by `type`. The phone must pair with the host's 6-digit code
//! before any input is accepted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gamepad::{ButtonAction, DpadDirection, Side};
use crate::player::PlayerIndex;

/// Which controller layout the phone should show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    #[default]
    Xbox,
    Simple,
    Custom,
}

impl std::str::FromStr for LayoutKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xbox" => Ok(Self::Xbox),
            "simple" => Ok(Self::Simple),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown layout '{other}'")),
        }
    }
}

impl std::fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Xbox => "xbox",
            Self::Simple => "simple",
            Self::Custom => "custom",
        })
    }
}

/// Phone -> host messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Pair {
        code: String,
    },
    Button {
        button: String,
        state: ButtonAction,
    },
    Stick {
        stick: Side,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
    },
    Trigger {
        trigger: Side,
        #[serde(default)]
        value: f64,
    },
    Dpad {
        direction: DpadDirection,
    },
    Ping,
    Pong,
}

/// A line received from a phone that carried a `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(ClientMessage),
    /// The `type` was present but the message did not decode. Holds the type.
    Unrecognized(String),
}

/// Decode one line. Returns `None` for invalid JSON or a missing `type`.
pub fn parse_client_message(raw: &str) -> Option<Inbound> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let kind = value.get("type")?.as_str()?.to_string();
    Some(match serde_json::from_value::<ClientMessage>(value) {
        Ok(message) => Inbound::Message(message),
        Err(_) => Inbound::Unrecognized(kind),
    })
}

/// Why a pair request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidCode,
    ServerFull,
    AlreadyConnected,
}

impl RejectReason {
    /// Whether the host drops the connection after sending the rejection.
    pub fn closes_connection(self) -> bool {
        !matches!(self, Self::AlreadyConnected)
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::InvalidCode => "invalid_code",
            Self::ServerFull => "server_full",
            Self::AlreadyConnected => "already_connected",
        })
    }
}

/// Host -> phone messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Welcome {
        #[serde(rename = "controllerId")]
        controller_id: PlayerIndex,
        layout: LayoutKind,
    },
    Reject {
        reason: RejectReason,
    },
    LayoutChange {
        layout: LayoutKind,
    },
    Ping,
    Pong,
}
