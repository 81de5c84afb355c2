//! Relay wire messages.
//!
//! Every frame is one JSON object per line. Clients send [`ClientFrame`]s;
//! the relay answers with [`ServerFrame`]s, either an acknowledgement tied
//! to a request id or a pushed [`Notification`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::code::SessionCode;
use crate::config::{ConfigRequest, GameConfig};
use crate::gamepad::DpadDirection;
use crate::id::ConnectionId;
use crate::player::PlayerIndex;
use crate::profile::{GameProfile, Layout};

/// Client event names.
pub mod event {
    pub const CREATE_SESSION: &str = "host:create-session";
    pub const UPDATE_CONFIG: &str = "host:update-config";
    pub const JOIN_CONTROLLER: &str = "controller:join-session";
    pub const JOIN_BRIDGE: &str = "bridge:join-session";
    pub const INPUT: &str = "controller:input";
}

/// Error string sent back for events the relay does not know.
pub const UNKNOWN_EVENT: &str = "UNKNOWN_EVENT";

/// Error string sent back for a known event whose body does not parse.
pub const BAD_REQUEST: &str = "BAD_REQUEST";

/// A raw client frame, before the event body is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    /// Present when the client expects an acknowledgement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl ClientFrame {
    pub fn new(id: Option<u64>, request: &ClientRequest) -> Result<Self, serde_json::Error> {
        let (event, data) = request.to_parts()?;
        Ok(Self {
            id,
            event: event.to_string(),
            data,
        })
    }
}

/// A client request with its body decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientRequest {
    CreateSession(ConfigRequest),
    UpdateConfig(ConfigRequest),
    JoinController {
        code: String,
        player: Option<PlayerIndex>,
    },
    JoinBridge {
        code: String,
        name: Option<String>,
        player: Option<PlayerIndex>,
    },
    Input(InputPayload),
}

#[derive(Debug, Default, Deserialize)]
struct JoinBody {
    #[serde(default)]
    code: Value,
    #[serde(default)]
    name: Option<Value>,
    #[serde(default, deserialize_with = "PlayerIndex::deserialize_lenient")]
    player: Option<PlayerIndex>,
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl ClientRequest {
    /// Decode an event body. `Ok(None)` means the event name is unknown.
    ///
    /// A missing or `null` body is treated as an empty object. Config
    /// requests accept either `{ "config": { .. } }` or the fields inline.
    pub fn parse(event: &str, data: Value) -> Result<Option<Self>, serde_json::Error> {
        let data = if data.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            data
        };

        let request = match event {
            event::CREATE_SESSION => Self::CreateSession(config_body(data)?),
            event::UPDATE_CONFIG => Self::UpdateConfig(config_body(data)?),
            event::JOIN_CONTROLLER => {
                let body: JoinBody = serde_json::from_value(data)?;
                Self::JoinController {
                    code: value_to_string(&body.code).unwrap_or_default(),
                    player: body.player,
                }
            }
            event::JOIN_BRIDGE => {
                let body: JoinBody = serde_json::from_value(data)?;
                Self::JoinBridge {
                    code: value_to_string(&body.code).unwrap_or_default(),
                    name: body.name.as_ref().and_then(value_to_string),
                    player: body.player,
                }
            }
            event::INPUT => Self::Input(serde_json::from_value(data)?),
            _ => return Ok(None),
        };
        Ok(Some(request))
    }

    pub fn event(&self) -> &'static str {
        match self {
            Self::CreateSession(_) => event::CREATE_SESSION,
            Self::UpdateConfig(_) => event::UPDATE_CONFIG,
            Self::JoinController { .. } => event::JOIN_CONTROLLER,
            Self::JoinBridge { .. } => event::JOIN_BRIDGE,
            Self::Input(_) => event::INPUT,
        }
    }

    fn to_parts(&self) -> Result<(&'static str, Value), serde_json::Error> {
        let data = match self {
            Self::CreateSession(config) | Self::UpdateConfig(config) => {
                serde_json::json!({ "config": config })
            }
            Self::JoinController { code, player } => {
                serde_json::json!({ "code": code, "player": player })
            }
            Self::JoinBridge { code, name, player } => {
                serde_json::json!({ "code": code, "name": name, "player": player })
            }
            Self::Input(payload) => serde_json::to_value(payload)?,
        };
        Ok((self.event(), data))
    }
}

fn config_body(data: Value) -> Result<ConfigRequest, serde_json::Error> {
    match data {
        Value::Object(mut map) if map.get("config").is_some_and(Value::is_object) => {
            let inner = map.remove("config").unwrap_or_default();
            serde_json::from_value(inner)
        }
        other => serde_json::from_value(other),
    }
}

/// The resolved configuration of a session, with the catalog entries it
/// names inlined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPayload {
    pub code: SessionCode,
    pub config: GameConfig,
    pub profile: GameProfile,
    pub layout: Layout,
}

/// Acknowledgement body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_index: Option<PlayerIndex>,
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub session: Option<ConfigPayload>,
}

impl Ack {
    pub fn session(payload: ConfigPayload) -> Self {
        Self {
            ok: true,
            error: None,
            player_index: None,
            session: Some(payload),
        }
    }

    pub fn joined(player_index: PlayerIndex, payload: ConfigPayload) -> Self {
        Self {
            player_index: Some(player_index),
            ..Self::session(payload)
        }
    }

    pub fn error(code: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(code.into()),
            player_index: None,
            session: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerPresence {
    pub controller_id: ConnectionId,
    pub player_index: PlayerIndex,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgePresence {
    pub bridge_id: ConnectionId,
    pub name: String,
    pub player_index: PlayerIndex,
    pub count: usize,
}

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The host created another session.
    HostNewSession,
    HostDisconnected,
    ServerShutdown,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::HostNewSession => "host_new_session",
            Self::HostDisconnected => "host_disconnected",
            Self::ServerShutdown => "server_shutdown",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClosed {
    pub code: SessionCode,
    pub reason: CloseReason,
}

/// A controller input as delivered to the host and matching bridges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedInput {
    pub controller_id: ConnectionId,
    pub player_index: PlayerIndex,
    /// Milliseconds since the Unix epoch at routing time.
    pub at: u64,
    pub payload: InputPayload,
}

/// Server-pushed notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Notification {
    #[serde(rename = "session:controller-connected")]
    ControllerConnected(ControllerPresence),
    #[serde(rename = "session:controller-disconnected")]
    ControllerDisconnected(ControllerPresence),
    #[serde(rename = "session:bridge-connected")]
    BridgeConnected(BridgePresence),
    #[serde(rename = "session:bridge-disconnected")]
    BridgeDisconnected(BridgePresence),
    #[serde(rename = "session:config-updated")]
    ConfigUpdated(ConfigPayload),
    #[serde(rename = "session:closed")]
    Closed(SessionClosed),
    #[serde(rename = "session:input")]
    Input(RoutedInput),
}

/// Anything the relay writes to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Ack { id: u64, ack: Ack },
    Notification(Notification),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StickPosition {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerValues {
    #[serde(default)]
    pub lt: f64,
    #[serde(default)]
    pub rt: f64,
}

/// One input message from a phone controller.
///
/// The relay never rewrites it: hosts and bridges receive exactly the JSON
/// the controller sent. The accessors read it leniently, the way a bridge
/// needs it; a missing or malformed field reads as released/centred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputPayload(Value);

impl Default for InputPayload {
    fn default() -> Self {
        Self(Value::Object(serde_json::Map::new()))
    }
}

impl From<Value> for InputPayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Loose truthiness: `false`, `0`, `""` and `null` are off, anything else on.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    }
}

impl InputPayload {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    fn object(&self, key: &str) -> Option<&serde_json::Map<String, Value>> {
        self.0.get(key).and_then(Value::as_object)
    }

    /// Whether `name` is reported as held.
    pub fn is_pressed(&self, name: &str) -> bool {
        self.object("buttons")
            .and_then(|buttons| buttons.get(name))
            .is_some_and(truthy)
    }

    /// Names of the buttons currently reported as held.
    pub fn pressed(&self) -> impl Iterator<Item = &str> {
        self.object("buttons")
            .into_iter()
            .flatten()
            .filter(|(_, held)| truthy(held))
            .map(|(name, _)| name.as_str())
    }

    fn stick(&self, key: &str) -> Option<StickPosition> {
        self.object(key).map(|raw| StickPosition {
            x: number(raw.get("x")),
            y: number(raw.get("y")),
        })
    }

    /// `leftStick`, or the single-stick `stick` field older controllers send.
    pub fn left_stick(&self) -> Option<StickPosition> {
        self.stick("leftStick").or_else(|| self.stick("stick"))
    }

    pub fn right_stick(&self) -> Option<StickPosition> {
        self.stick("rightStick")
    }

    /// Analog trigger values from `triggers` (`lt`/`rt`), falling back to a
    /// `trigger` object keyed `lt`/`rt` or `left`/`right`.
    pub fn triggers(&self) -> TriggerValues {
        let Some(raw) = self.object("triggers").or_else(|| self.object("trigger")) else {
            return TriggerValues::default();
        };
        TriggerValues {
            lt: number(raw.get("lt").or_else(|| raw.get("left"))),
            rt: number(raw.get("rt").or_else(|| raw.get("right"))),
        }
    }

    pub fn dpad(&self) -> Option<DpadDirection> {
        self.0
            .get("dpad")
            .filter(|v| v.is_string())
            .and_then(|v| DpadDirection::deserialize(v).ok())
    }
}
