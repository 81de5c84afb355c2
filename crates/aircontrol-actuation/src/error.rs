//! Actuation errors.

use aircontrol_types::PlayerIndex;
use thiserror::Error;

use crate::VirtualPadId;

#[derive(Debug, Error)]
pub enum ActuationError {
    #[error("failed to create virtual gamepad: {0}")]
    DeviceCreate(String),

    #[error("failed to push gamepad state: {0}")]
    Push(String),

    #[error("unknown virtual pad {0}")]
    UnknownPad(VirtualPadId),

    #[error("slot {0} is not attached")]
    NotAttached(PlayerIndex),

    #[error("gamepad backend not available on this platform")]
    Unavailable,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
