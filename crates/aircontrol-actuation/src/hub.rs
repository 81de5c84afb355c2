//! Slot lifecycle: `Detached -> Attached -> Detached`.
//!
//! The hub owns one [`GamepadState`] per attached player slot. Every batch
//! of changes results in exactly one push, and detaching a slot pushes the
//! neutral state once before the pad is unplugged.

use std::collections::BTreeMap;

use aircontrol_types::PlayerIndex;
use tracing::{debug, info, warn};

use crate::error::ActuationError;
use crate::state::{GamepadState, PadCommand};
use crate::{GamepadBackend, VirtualPadId};

#[derive(Debug)]
struct Slot {
    pad: VirtualPadId,
    state: GamepadState,
}

pub struct ActuationHub<B: GamepadBackend> {
    backend: B,
    slots: BTreeMap<PlayerIndex, Slot>,
}

impl<B: GamepadBackend> ActuationHub<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            slots: BTreeMap::new(),
        }
    }

    pub fn is_attached(&self, slot: PlayerIndex) -> bool {
        self.slots.contains_key(&slot)
    }

    pub fn attached(&self) -> impl Iterator<Item = PlayerIndex> + '_ {
        self.slots.keys().copied()
    }

    pub fn state(&self, slot: PlayerIndex) -> Option<&GamepadState> {
        self.slots.get(&slot).map(|s| &s.state)
    }

    /// Plug a pad for `slot`. Attaching an already attached slot is a no-op.
    pub async fn attach(&mut self, slot: PlayerIndex) -> Result<(), ActuationError> {
        if self.slots.contains_key(&slot) {
            return Ok(());
        }
        let pad = self.backend.plug(slot).await?;
        info!(%slot, %pad, "virtual pad attached");
        self.slots.insert(
            slot,
            Slot {
                pad,
                state: GamepadState::neutral(),
            },
        );
        Ok(())
    }

    /// Apply one message's worth of changes and push the result once.
    pub async fn apply(
        &mut self,
        slot: PlayerIndex,
        commands: &[PadCommand],
    ) -> Result<(), ActuationError> {
        let entry = self
            .slots
            .get_mut(&slot)
            .ok_or(ActuationError::NotAttached(slot))?;
        let mut next = entry.state;
        for command in commands {
            next.apply(command);
        }
        entry.state = next;
        debug!(%slot, commands = commands.len(), "pushing pad state");
        self.backend.push(entry.pad, &next).await
    }

    /// Replace the whole state of a slot and push it once.
    pub async fn set_state(
        &mut self,
        slot: PlayerIndex,
        state: GamepadState,
    ) -> Result<(), ActuationError> {
        let entry = self
            .slots
            .get_mut(&slot)
            .ok_or(ActuationError::NotAttached(slot))?;
        entry.state = state;
        self.backend.push(entry.pad, &state).await
    }

    /// Neutralise and release a slot. Returns `false` if it was not attached.
    ///
    /// The slot is forgotten even if the neutral push or the unplug fails.
    pub async fn detach(&mut self, slot: PlayerIndex) -> Result<bool, ActuationError> {
        let Some(entry) = self.slots.remove(&slot) else {
            return Ok(false);
        };
        let neutral = GamepadState::neutral();
        let pushed = self.backend.push(entry.pad, &neutral).await;
        let unplugged = self.backend.unplug(entry.pad).await;
        info!(%slot, pad = %entry.pad, "virtual pad detached");
        pushed?;
        unplugged?;
        Ok(true)
    }

    /// Detach every slot, then shut the backend down.
    pub async fn shutdown(&mut self) -> Result<(), ActuationError> {
        let slots: Vec<_> = self.slots.keys().copied().collect();
        for slot in slots {
            if let Err(e) = self.detach(slot).await {
                warn!(%slot, error = %e, "failed to release pad during shutdown");
            }
        }
        self.backend.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use aircontrol_types::{DpadDirection, PadButton, Side};

    use super::*;
    use crate::mock::MockGamepad;

    fn p(n: i64) -> PlayerIndex {
        PlayerIndex::new(n).unwrap()
    }

    #[tokio::test]
    async fn batch_pushes_once() {
        let backend = MockGamepad::new();
        let handle = backend.handle();
        let mut hub = ActuationHub::new(backend);
        hub.attach(p(1)).await.unwrap();

        hub.apply(
            p(1),
            &[
                PadCommand::Button {
                    name: "a".into(),
                    pressed: true,
                },
                PadCommand::Stick {
                    side: Side::Left,
                    x: 1.0,
                    y: 1.0,
                },
                PadCommand::Dpad(DpadDirection::Up),
            ],
        )
        .await
        .unwrap();

        let pushes = handle.pushes_for(p(1));
        assert_eq!(pushes.len(), 1);
        assert!(pushes[0].is_pressed(PadButton::A));
        assert_eq!(pushes[0].dpad, (0, 1));
    }

    #[tokio::test]
    async fn detach_pushes_neutral_exactly_once() {
        let backend = MockGamepad::new();
        let handle = backend.handle();
        let mut hub = ActuationHub::new(backend);
        hub.attach(p(2)).await.unwrap();
        hub.apply(
            p(2),
            &[
                PadCommand::Stick {
                    side: Side::Right,
                    x: -1.0,
                    y: 1.0,
                },
                PadCommand::Trigger {
                    side: Side::Left,
                    value: 1.0,
                },
            ],
        )
        .await
        .unwrap();

        assert!(hub.detach(p(2)).await.unwrap());
        assert!(!hub.detach(p(2)).await.unwrap());

        let pushes = handle.pushes_for(p(2));
        assert_eq!(pushes.len(), 2);
        assert!(pushes[1].is_neutral());
        assert_eq!(pushes.iter().filter(|s| s.is_neutral()).count(), 1);
        assert!(handle.plugged_slots().is_empty());
    }

    #[tokio::test]
    async fn apply_requires_attach() {
        let mut hub = ActuationHub::new(MockGamepad::new());
        let err = hub.apply(p(3), &[]).await.unwrap_err();
        assert!(matches!(err, ActuationError::NotAttached(_)));
    }

    #[tokio::test]
    async fn shutdown_neutralises_every_slot() {
        let backend = MockGamepad::new();
        let handle = backend.handle();
        let mut hub = ActuationHub::new(backend);
        for n in 1..=3 {
            hub.attach(p(n)).await.unwrap();
            hub.apply(
                p(n),
                &[PadCommand::Button {
                    name: "x".into(),
                    pressed: true,
                }],
            )
            .await
            .unwrap();
        }
        hub.shutdown().await.unwrap();

        assert!(handle.is_shutdown());
        for n in 1..=3 {
            assert_eq!(handle.last_state(p(n)), Some(GamepadState::neutral()));
        }
    }

    #[tokio::test]
    async fn reattach_starts_neutral() {
        let mut hub = ActuationHub::new(MockGamepad::new());
        hub.attach(p(1)).await.unwrap();
        hub.apply(
            p(1),
            &[PadCommand::Button {
                name: "b".into(),
                pressed: true,
            }],
        )
        .await
        .unwrap();
        hub.detach(p(1)).await.unwrap();
        hub.attach(p(1)).await.unwrap();
        assert_eq!(hub.state(p(1)), Some(&GamepadState::neutral()));
    }
}
