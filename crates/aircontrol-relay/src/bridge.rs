//! Bridge runtime: joins a session as a bridge and drives a virtual pad
//! (and keyboard intents) from routed controller input.

use aircontrol_actuation::{
    derive_state, ActuationHub, GamepadBackend, GamepadState, KeyIntent, KeySync,
};
use aircontrol_types::{CloseReason, ConfigPayload, GameProfile, InputPayload, Notification, PlayerIndex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::{Joined, RelayClient};
use crate::error::RelayError;

#[derive(Debug, Clone, Default)]
pub struct BridgeOptions {
    pub code: String,
    pub name: Option<String>,
    pub player: Option<PlayerIndex>,
}

/// Why a bridge stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    SessionClosed(CloseReason),
    Disconnected,
}

pub struct BridgeRuntime<B: GamepadBackend> {
    hub: ActuationHub<B>,
    keys: KeySync,
    profile: Option<GameProfile>,
    /// Profile pinned locally; session updates do not replace it.
    locked: bool,
    slot: PlayerIndex,
    key_tx: Option<mpsc::UnboundedSender<KeyIntent>>,
}

impl<B: GamepadBackend> BridgeRuntime<B> {
    pub fn new(backend: B, locked_profile: Option<GameProfile>) -> Self {
        Self {
            hub: ActuationHub::new(backend),
            keys: KeySync::new(),
            locked: locked_profile.is_some(),
            profile: locked_profile,
            slot: PlayerIndex::FIRST,
            key_tx: None,
        }
    }

    /// Forward keyboard press/release intents to `tx`.
    #[must_use]
    pub fn with_key_sink(mut self, tx: mpsc::UnboundedSender<KeyIntent>) -> Self {
        self.key_tx = Some(tx);
        self
    }

    pub fn hub(&self) -> &ActuationHub<B> {
        &self.hub
    }

    pub fn profile(&self) -> Option<&GameProfile> {
        self.profile.as_ref()
    }

    pub fn slot(&self) -> PlayerIndex {
        self.slot
    }

    /// Join a session and attach the pad for the assigned slot.
    pub async fn join(
        &mut self,
        client: &RelayClient,
        options: &BridgeOptions,
    ) -> Result<Joined, RelayError> {
        let joined = client
            .join_bridge(&options.code, options.name.as_deref(), options.player)
            .await?;
        self.attach(joined.player, &joined.session).await?;
        Ok(joined)
    }

    /// Adopt a slot and session config, plugging the slot's pad.
    pub async fn attach(
        &mut self,
        slot: PlayerIndex,
        session: &ConfigPayload,
    ) -> Result<(), RelayError> {
        if self.slot != slot {
            self.release().await;
        }
        self.slot = slot;
        if !self.locked {
            self.profile = Some(session.profile.clone());
        }
        self.hub.attach(slot).await?;
        info!(
            code = %session.code,
            %slot,
            profile = self.profile.as_ref().map_or("none", |p| p.id.as_str()),
            "bridge attached"
        );
        Ok(())
    }

    /// React to one relay notification. Returns why the bridge should stop,
    /// if it should.
    pub async fn handle_notification(&mut self, notification: Notification) -> Option<BridgeExit> {
        match notification {
            Notification::Input(input) => {
                self.apply_input(&input.payload).await;
                None
            }
            Notification::ConfigUpdated(payload) => {
                if self.locked {
                    debug!(profile = %payload.config.game_profile_id, "profile locked, update ignored");
                } else if self.profile.as_ref() != Some(&payload.profile) {
                    info!(profile = %payload.profile.id, "bridge profile changed");
                    let released = self.keys.release_all();
                    self.emit_keys(released);
                    self.profile = Some(payload.profile);
                }
                None
            }
            Notification::ControllerDisconnected(presence) => {
                info!(player = %presence.player_index, "controller left, pad neutralised");
                if let Err(e) = self.hub.set_state(self.slot, GamepadState::neutral()).await {
                    warn!(slot = %self.slot, error = %e, "failed to push pad state");
                }
                let released = self.keys.release_all();
                self.emit_keys(released);
                None
            }
            Notification::Closed(closed) => {
                info!(code = %closed.code, reason = %closed.reason, "session closed");
                self.release().await;
                Some(BridgeExit::SessionClosed(closed.reason))
            }
            other => {
                debug!(?other, "ignoring notification");
                None
            }
        }
    }

    async fn apply_input(&mut self, payload: &InputPayload) {
        let Some(profile) = &self.profile else {
            debug!("no profile yet, input dropped");
            return;
        };
        let state = derive_state(payload, &profile.virtual_map);
        let intents = self.keys.sync(payload, &profile.keyboard_map);

        if let Err(e) = self.hub.set_state(self.slot, state).await {
            warn!(slot = %self.slot, error = %e, "failed to push pad state");
        }
        self.emit_keys(intents);
    }

    fn emit_keys(&self, intents: Vec<KeyIntent>) {
        for intent in intents {
            debug!(?intent, "key intent");
            if let Some(tx) = &self.key_tx {
                let _ = tx.send(intent);
            }
        }
    }

    /// Neutralise the pad and release every held key.
    pub async fn release(&mut self) {
        if let Err(e) = self.hub.detach(self.slot).await {
            warn!(slot = %self.slot, error = %e, "failed to release pad");
        }
        let released = self.keys.release_all();
        self.emit_keys(released);
    }

    /// Join, then follow the session until it closes or the relay goes away.
    pub async fn run(
        mut self,
        mut client: RelayClient,
        options: BridgeOptions,
    ) -> Result<BridgeExit, RelayError> {
        self.join(&client, &options).await?;

        let exit = loop {
            match client.next_notification().await {
                Some(notification) => {
                    if let Some(exit) = self.handle_notification(notification).await {
                        break exit;
                    }
                }
                None => {
                    warn!("relay connection lost");
                    self.release().await;
                    break BridgeExit::Disconnected;
                }
            }
        };

        self.hub.shutdown().await?;
        Ok(exit)
    }
}
