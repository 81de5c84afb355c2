//! Virtual gamepad actuation for aircontrol.
//!
//! This crate turns abstract controller input into persistent per-slot
//! gamepad state and pushes that state to a [`GamepadBackend`]. Backends
//! are pluggable: a uinput device on Linux (feature `linux`), a recording
//! mock for tests (feature `mock`) and a dry-run backend that only logs.

use async_trait::async_trait;
use aircontrol_types::PlayerIndex;

pub mod derive;
pub mod dry_run;
pub mod error;
pub mod hub;
pub mod keysync;
pub mod state;

#[cfg(all(target_os = "linux", feature = "linux"))]
pub mod linux;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use derive::derive_state;
pub use dry_run::DryRunGamepad;
pub use error::ActuationError;
pub use hub::ActuationHub;
pub use keysync::{KeyIntent, KeySync};
pub use state::{GamepadState, PadCommand};

/// Handle to a virtual pad created by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualPadId(pub u32);

impl std::fmt::Display for VirtualPadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pad-{}", self.0)
    }
}

/// Creates virtual gamepads and writes complete state snapshots to them.
///
/// A push always carries the whole pad state so the device never shows a
/// half-applied update.
#[async_trait]
pub trait GamepadBackend: Send + 'static {
    /// Create a virtual pad for the given player slot.
    async fn plug(&mut self, slot: PlayerIndex) -> Result<VirtualPadId, ActuationError>;

    /// Write a full state snapshot to a pad.
    async fn push(&mut self, pad: VirtualPadId, state: &GamepadState)
        -> Result<(), ActuationError>;

    /// Destroy a pad.
    async fn unplug(&mut self, pad: VirtualPadId) -> Result<(), ActuationError>;

    /// Destroy every pad and release the backend.
    async fn shutdown(&mut self) -> Result<(), ActuationError>;
}

#[async_trait]
impl GamepadBackend for Box<dyn GamepadBackend> {
    async fn plug(&mut self, slot: PlayerIndex) -> Result<VirtualPadId, ActuationError> {
        (**self).plug(slot).await
    }

    async fn push(
        &mut self,
        pad: VirtualPadId,
        state: &GamepadState,
    ) -> Result<(), ActuationError> {
        (**self).push(pad, state).await
    }

    async fn unplug(&mut self, pad: VirtualPadId) -> Result<(), ActuationError> {
        (**self).unplug(pad).await
    }

    async fn shutdown(&mut self) -> Result<(), ActuationError> {
        (**self).shutdown().await
    }
}
