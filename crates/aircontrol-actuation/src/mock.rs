//! Mock gamepad backend for testing.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use aircontrol_types::PlayerIndex;
use async_trait::async_trait;

use crate::error::ActuationError;
use crate::state::GamepadState;
use crate::{GamepadBackend, VirtualPadId};

/// A recorded push, for test observation.
#[derive(Debug, Clone, PartialEq)]
pub struct PushedState {
    pub pad: VirtualPadId,
    pub slot: PlayerIndex,
    pub state: GamepadState,
}

#[derive(Debug, Default)]
struct MockGamepadState {
    plugged: BTreeMap<VirtualPadId, PlayerIndex>,
    pushes: Vec<PushedState>,
    unplugged: Vec<VirtualPadId>,
    next_id: u32,
    fail_plug: bool,
    shutdown: bool,
}

/// Records every pad operation instead of touching the OS.
pub struct MockGamepad {
    state: Arc<Mutex<MockGamepadState>>,
}

impl Default for MockGamepad {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGamepad {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockGamepadState::default())),
        }
    }

    /// Get a clonable handle for observing the backend from tests.
    pub fn handle(&self) -> MockGamepadHandle {
        MockGamepadHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockGamepadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clonable observer handle for [`MockGamepad`].
#[derive(Clone)]
pub struct MockGamepadHandle {
    state: Arc<Mutex<MockGamepadState>>,
}

impl MockGamepadHandle {
    fn lock(&self) -> MutexGuard<'_, MockGamepadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every push so far, in order.
    pub fn pushes(&self) -> Vec<PushedState> {
        self.lock().pushes.clone()
    }

    /// States pushed to pads of `slot`, in order.
    pub fn pushes_for(&self, slot: PlayerIndex) -> Vec<GamepadState> {
        self.lock()
            .pushes
            .iter()
            .filter(|p| p.slot == slot)
            .map(|p| p.state)
            .collect()
    }

    pub fn last_state(&self, slot: PlayerIndex) -> Option<GamepadState> {
        self.pushes_for(slot).last().copied()
    }

    /// Slots that currently have a plugged pad.
    pub fn plugged_slots(&self) -> Vec<PlayerIndex> {
        self.lock().plugged.values().copied().collect()
    }

    pub fn unplugged_count(&self) -> usize {
        self.lock().unplugged.len()
    }

    /// Make subsequent `plug` calls fail with [`ActuationError::Unavailable`].
    pub fn fail_plugs(&self, fail: bool) {
        self.lock().fail_plug = fail;
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }
}

#[async_trait]
impl GamepadBackend for MockGamepad {
    async fn plug(&mut self, slot: PlayerIndex) -> Result<VirtualPadId, ActuationError> {
        let mut state = self.lock();
        if state.fail_plug {
            return Err(ActuationError::Unavailable);
        }
        state.next_id += 1;
        let id = VirtualPadId(state.next_id);
        state.plugged.insert(id, slot);
        Ok(id)
    }

    async fn push(
        &mut self,
        pad: VirtualPadId,
        pushed: &GamepadState,
    ) -> Result<(), ActuationError> {
        let mut state = self.lock();
        let slot = *state
            .plugged
            .get(&pad)
            .ok_or(ActuationError::UnknownPad(pad))?;
        state.pushes.push(PushedState {
            pad,
            slot,
            state: *pushed,
        });
        Ok(())
    }

    async fn unplug(&mut self, pad: VirtualPadId) -> Result<(), ActuationError> {
        let mut state = self.lock();
        state
            .plugged
            .remove(&pad)
            .ok_or(ActuationError::UnknownPad(pad))?;
        state.unplugged.push(pad);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), ActuationError> {
        let mut state = self.lock();
        state.plugged.clear();
        state.shutdown = true;
        Ok(())
    }
}
