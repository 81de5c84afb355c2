//! Session relay and direct-connect host for aircontrol.
//!
//! Implements the session registry, membership and input routing, config
//! resolution and propagation over a JSON-lines relay, the bridge runtime
//! that turns routed input into virtual pad state, and the direct-connect
//! pairing host.

pub mod bridge;
pub mod catalog;
pub mod client;
pub mod codegen;
pub mod config;
pub mod direct;
pub mod error;
pub mod registry;
pub mod server;
pub mod setup;
pub mod wire;

pub use bridge::{BridgeExit, BridgeOptions, BridgeRuntime};
pub use catalog::Catalog;
pub use client::{Joined, RelayClient};
pub use config::Config;
pub use direct::{DirectHandle, DirectHost, DirectServer, DirectStatus};
pub use error::RelayError;
pub use registry::Registry;
pub use server::{RelayEvent, RelayHandle, RelayServer};

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
