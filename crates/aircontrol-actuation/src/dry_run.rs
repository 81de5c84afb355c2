//! Backend that only logs. Used when no real gamepad driver is available.

use aircontrol_types::PlayerIndex;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::ActuationError;
use crate::state::GamepadState;
use crate::{GamepadBackend, VirtualPadId};

#[derive(Debug, Default)]
pub struct DryRunGamepad {
    next_id: u32,
}

impl DryRunGamepad {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GamepadBackend for DryRunGamepad {
    async fn plug(&mut self, slot: PlayerIndex) -> Result<VirtualPadId, ActuationError> {
        self.next_id += 1;
        let pad = VirtualPadId(self.next_id);
        info!(%slot, %pad, "dry-run pad plugged");
        Ok(pad)
    }

    async fn push(
        &mut self,
        pad: VirtualPadId,
        state: &GamepadState,
    ) -> Result<(), ActuationError> {
        debug!(
            %pad,
            buttons = state.buttons(),
            lx = state.left_stick.x,
            ly = state.left_stick.y,
            rx = state.right_stick.x,
            ry = state.right_stick.y,
            lt = state.left_trigger,
            rt = state.right_trigger,
            dpad = ?state.dpad,
            "dry-run push"
        );
        Ok(())
    }

    async fn unplug(&mut self, pad: VirtualPadId) -> Result<(), ActuationError> {
        info!(%pad, "dry-run pad unplugged");
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), ActuationError> {
        Ok(())
    }
}
