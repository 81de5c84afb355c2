//! Shared types for aircontrol.
//!
//! This crate contains all types shared across the aircontrol workspace:
//! connection identity, session and pairing codes, player slots, resolved
//! game configuration, catalog entities, gamepad vocabulary, and the wire
//! messages of both the session relay and the direct-connect host.

pub mod code;
pub mod config;
pub mod direct;
pub mod error;
pub mod gamepad;
pub mod id;
pub mod link;
pub mod message;
pub mod player;
pub mod profile;

pub use code::{PairingCode, SessionCode};
pub use config::{ConfigRequest, GameConfig};
pub use direct::{ClientMessage, HostMessage, Inbound, LayoutKind, RejectReason};
pub use error::TypesError;
pub use gamepad::{ButtonAction, DpadDirection, PadAction, PadButton, Side};
pub use id::ConnectionId;
pub use link::DeepLink;
pub use message::{
    Ack, BridgePresence, ClientFrame, ClientRequest, CloseReason, ConfigPayload,
    ControllerPresence, InputPayload, Notification, RoutedInput, ServerFrame, SessionClosed,
    StickPosition, TriggerValues,
};
pub use player::{PlayerIndex, MAX_PLAYERS};
pub use profile::{GameProfile, Layout, TokenList, PROFILE_INPUTS};
