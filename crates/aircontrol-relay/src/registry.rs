//! Session registry, membership router, input router and config
//! propagation.
//!
//! The [`Registry`] is plain synchronous state owned by the relay actor.
//! Every mutation queues the notifications it causes in an outbox that the
//! caller drains with [`Registry::take_outbox`] and delivers in order.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use aircontrol_types::{
    BridgePresence, CloseReason, ConfigPayload, ConfigRequest, ConnectionId, ControllerPresence,
    GameConfig, InputPayload, Notification, PlayerIndex, RoutedInput, SessionClosed, SessionCode,
    MAX_PLAYERS,
};
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::codegen;
use crate::error::RelayError;

const MAX_BRIDGE_NAME: usize = 40;
const DEFAULT_BRIDGE_NAME: &str = "Bridge";

/// Default idle threshold before an empty session may be collected.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(20 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Host,
    Controller,
    Bridge,
}

/// The single (role, session, slot) a connection currently occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub role: Role,
    pub code: SessionCode,
    /// Reserved slot for controllers, subscribed slot for bridges.
    pub player: Option<PlayerIndex>,
}

#[derive(Debug, Clone)]
pub struct ControllerMember {
    pub player: PlayerIndex,
    pub joined_at: Instant,
}

#[derive(Debug, Clone)]
pub struct BridgeMember {
    pub name: String,
    pub player: PlayerIndex,
    pub joined_at: Instant,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub code: SessionCode,
    pub host: Option<ConnectionId>,
    pub controllers: BTreeMap<ConnectionId, ControllerMember>,
    pub bridges: BTreeMap<ConnectionId, BridgeMember>,
    pub config: GameConfig,
    pub created_at: Instant,
}

impl Session {
    /// Host, controllers and bridges, read at call time.
    pub fn members(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.host
            .into_iter()
            .chain(self.controllers.keys().copied())
            .chain(self.bridges.keys().copied())
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    pub fn bridge_count(&self) -> usize {
        self.bridges.len()
    }

    fn slot_owner(&self, player: PlayerIndex) -> Option<ConnectionId> {
        self.controllers
            .iter()
            .find(|(_, member)| member.player == player)
            .map(|(id, _)| *id)
    }

    /// Requested slot when it is free, otherwise the lowest free slot.
    fn free_slot(&self, requested: Option<PlayerIndex>, max: u8) -> Option<PlayerIndex> {
        requested
            .filter(|p| p.get() <= max && self.slot_owner(*p).is_none())
            .or_else(|| PlayerIndex::range(max).find(|p| self.slot_owner(*p).is_none()))
    }

    /// Bridges that receive input from the controller on `player`.
    ///
    /// With exactly one controller and one bridge, the bridge is fed
    /// whatever its slot.
    fn bridges_for(&self, player: PlayerIndex) -> Vec<ConnectionId> {
        let matched: Vec<_> = self
            .bridges
            .iter()
            .filter(|(_, bridge)| bridge.player == player)
            .map(|(id, _)| *id)
            .collect();
        if matched.is_empty() && self.controllers.len() == 1 && self.bridges.len() == 1 {
            self.bridges.keys().copied().collect()
        } else {
            matched
        }
    }

    /// Hostless, memberless and older than `idle_timeout`.
    ///
    /// Host departure closes a session on the spot, so live traffic never
    /// reaches this state; collection only guards against a session left
    /// without a host by some other path.
    fn is_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        self.host.is_none()
            && self.controllers.is_empty()
            && self.bridges.is_empty()
            && now.saturating_duration_since(self.created_at) > idle_timeout
    }
}

/// A notification addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: ConnectionId,
    pub notification: Notification,
}

pub struct Registry {
    sessions: HashMap<SessionCode, Session>,
    connections: HashMap<ConnectionId, Membership>,
    catalog: Catalog,
    idle_timeout: Duration,
    max_players: u8,
    outbox: Vec<Outbound>,
    rng: fastrand::Rng,
}

impl Registry {
    pub fn new(catalog: Catalog, idle_timeout: Duration, max_players: u8) -> Self {
        Self::with_rng(catalog, idle_timeout, max_players, fastrand::Rng::new())
    }

    /// Registry with a caller-supplied code generator.
    pub fn with_rng(
        catalog: Catalog,
        idle_timeout: Duration,
        max_players: u8,
        rng: fastrand::Rng,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            connections: HashMap::new(),
            catalog,
            idle_timeout,
            max_players: max_players.clamp(1, MAX_PLAYERS),
            outbox: Vec::new(),
            rng,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn session(&self, code: &SessionCode) -> Option<&Session> {
        self.sessions.get(code)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn membership(&self, conn: ConnectionId) -> Option<&Membership> {
        self.connections.get(&conn)
    }

    /// Drain queued notifications in the order they were produced.
    pub fn take_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    fn send(&mut self, to: ConnectionId, notification: Notification) {
        self.outbox.push(Outbound { to, notification });
    }

    fn broadcast(&mut self, code: &SessionCode, notification: &Notification) {
        let Some(session) = self.sessions.get(code) else {
            return;
        };
        let members: Vec<_> = session.members().collect();
        for to in members {
            self.send(to, notification.clone());
        }
    }

    /// Create a session hosted by `conn`.
    ///
    /// A host that already owns a session has it closed first. Any other
    /// membership of `conn` is detached.
    pub fn create_session(
        &mut self,
        conn: ConnectionId,
        request: &ConfigRequest,
        now: Instant,
    ) -> ConfigPayload {
        if let Some(previous) = self.connections.get(&conn).cloned() {
            if previous.role == Role::Host {
                self.close_session(&previous.code, CloseReason::HostNewSession);
            } else {
                self.detach(conn, now);
            }
        }

        let sessions = &self.sessions;
        let code = codegen::session_code(&mut self.rng, |c| sessions.contains_key(c));
        let config = self.catalog.resolve(request, None);

        self.sessions.insert(
            code.clone(),
            Session {
                code: code.clone(),
                host: Some(conn),
                controllers: BTreeMap::new(),
                bridges: BTreeMap::new(),
                config: config.clone(),
                created_at: now,
            },
        );
        self.connections.insert(
            conn,
            Membership {
                role: Role::Host,
                code: code.clone(),
                player: None,
            },
        );

        info!(code = %code, host = %conn, profile = %config.game_profile_id, "session created");
        self.catalog.payload(&code, &config)
    }

    /// Resolve and store a new config, then push it to every current member.
    ///
    /// Only the session's host may update it.
    pub fn update_config(
        &mut self,
        code: &SessionCode,
        conn: ConnectionId,
        request: &ConfigRequest,
    ) -> Result<ConfigPayload, RelayError> {
        let session = self.sessions.get_mut(code).ok_or(RelayError::NotFound)?;
        if session.host != Some(conn) {
            return Err(RelayError::Unauthorized);
        }

        let config = self.catalog.resolve(request, Some(&session.config));
        session.config = config.clone();

        let payload = self.catalog.payload(code, &config);
        self.broadcast(code, &Notification::ConfigUpdated(payload.clone()));
        info!(
            code = %code,
            profile = %config.game_profile_id,
            layout = %config.layout_id,
            "session config updated"
        );
        Ok(payload)
    }

    /// Update the config of the session `conn` hosts.
    pub fn update_own_config(
        &mut self,
        conn: ConnectionId,
        request: &ConfigRequest,
    ) -> Result<ConfigPayload, RelayError> {
        let membership = self.connections.get(&conn).ok_or(RelayError::NotFound)?;
        if membership.role != Role::Host {
            return Err(RelayError::Unauthorized);
        }
        let code = membership.code.clone();
        self.update_config(&code, conn, request)
    }

    /// Close a session, telling every member why. Closing an unknown code
    /// does nothing and returns `false`.
    pub fn close_session(&mut self, code: &SessionCode, reason: CloseReason) -> bool {
        if !self.sessions.contains_key(code) {
            return false;
        }

        self.broadcast(
            code,
            &Notification::Closed(SessionClosed {
                code: code.clone(),
                reason,
            }),
        );

        let Some(session) = self.sessions.remove(code) else {
            return false;
        };
        for member in session.members() {
            if self.connections.get(&member).is_some_and(|m| m.code == *code) {
                self.connections.remove(&member);
            }
        }

        info!(code = %code, %reason, "session closed");
        true
    }

    /// Close every session, e.g. on relay shutdown.
    pub fn close_all(&mut self, reason: CloseReason) {
        let codes: Vec<_> = self.sessions.keys().cloned().collect();
        for code in codes {
            self.close_session(&code, reason);
        }
    }

    fn lookup(&self, raw_code: &str) -> Result<SessionCode, RelayError> {
        let code = SessionCode::parse(raw_code).map_err(|_| RelayError::NotFound)?;
        if self.sessions.contains_key(&code) {
            Ok(code)
        } else {
            Err(RelayError::NotFound)
        }
    }

    /// Join `conn` to a session as a controller.
    ///
    /// Any previous membership is detached first, even when the join then
    /// fails for lack of a slot. The requested slot is used when free,
    /// otherwise the lowest free slot.
    pub fn join_controller(
        &mut self,
        raw_code: &str,
        conn: ConnectionId,
        requested: Option<PlayerIndex>,
        now: Instant,
    ) -> Result<(PlayerIndex, ConfigPayload), RelayError> {
        let code = self.lookup(raw_code)?;
        self.detach(conn, now);

        let max_players = self.max_players;
        let session = self.sessions.get_mut(&code).ok_or(RelayError::NotFound)?;
        let player = session
            .free_slot(requested, max_players)
            .ok_or(RelayError::SlotsFull)?;
        session.controllers.insert(
            conn,
            ControllerMember {
                player,
                joined_at: now,
            },
        );
        let host = session.host;
        let count = session.controller_count();
        let payload = self.catalog.payload(&code, &session.config);

        self.connections.insert(
            conn,
            Membership {
                role: Role::Controller,
                code: code.clone(),
                player: Some(player),
            },
        );
        if let Some(host) = host {
            self.send(
                host,
                Notification::ControllerConnected(ControllerPresence {
                    controller_id: conn,
                    player_index: player,
                    count,
                }),
            );
        }

        info!(code = %code, controller = %conn, %player, ?requested, "controller joined");
        Ok((player, payload))
    }

    /// Join `conn` to a session as a bridge subscribed to `player`
    /// (slot 1 when absent).
    pub fn join_bridge(
        &mut self,
        raw_code: &str,
        conn: ConnectionId,
        name: Option<&str>,
        player: Option<PlayerIndex>,
        now: Instant,
    ) -> Result<(PlayerIndex, ConfigPayload), RelayError> {
        let code = self.lookup(raw_code)?;
        self.detach(conn, now);

        let name = bridge_name(name);
        let player = player.unwrap_or(PlayerIndex::FIRST);
        let session = self.sessions.get_mut(&code).ok_or(RelayError::NotFound)?;
        session.bridges.insert(
            conn,
            BridgeMember {
                name: name.clone(),
                player,
                joined_at: now,
            },
        );
        let host = session.host;
        let count = session.bridge_count();
        let payload = self.catalog.payload(&code, &session.config);

        self.connections.insert(
            conn,
            Membership {
                role: Role::Bridge,
                code: code.clone(),
                player: Some(player),
            },
        );
        if let Some(host) = host {
            self.send(
                host,
                Notification::BridgeConnected(BridgePresence {
                    bridge_id: conn,
                    name: name.clone(),
                    player_index: player,
                    count,
                }),
            );
        }

        info!(code = %code, bridge = %conn, %name, %player, "bridge joined");
        Ok((player, payload))
    }

    /// Remove `conn` from whatever it belongs to. Returns `false` when it
    /// had no membership.
    ///
    /// A departing host closes its session. A departing controller or
    /// bridge is reported to the host, and the session is then checked for
    /// idle collection.
    pub fn detach(&mut self, conn: ConnectionId, now: Instant) -> bool {
        let Some(membership) = self.connections.remove(&conn) else {
            return false;
        };
        let code = membership.code;

        match membership.role {
            Role::Host => {
                self.close_session(&code, CloseReason::HostDisconnected);
            }
            Role::Controller => {
                let Some(session) = self.sessions.get_mut(&code) else {
                    return true;
                };
                let bridges = session
                    .controllers
                    .get(&conn)
                    .map(|member| session.bridges_for(member.player))
                    .unwrap_or_default();
                if let Some(member) = session.controllers.remove(&conn) {
                    let host = session.host;
                    let presence = ControllerPresence {
                        controller_id: conn,
                        player_index: member.player,
                        count: session.controller_count(),
                    };
                    // Bridges fed by this controller hear about it too, so
                    // they can let go of its slot.
                    for to in host.into_iter().chain(bridges) {
                        self.send(to, Notification::ControllerDisconnected(presence.clone()));
                    }
                    info!(code = %code, controller = %conn, player = %member.player, "controller left");
                }
                self.collect_session(&code, now);
            }
            Role::Bridge => {
                let Some(session) = self.sessions.get_mut(&code) else {
                    return true;
                };
                if let Some(member) = session.bridges.remove(&conn) {
                    let host = session.host;
                    let count = session.bridge_count();
                    if let Some(host) = host {
                        self.send(
                            host,
                            Notification::BridgeDisconnected(BridgePresence {
                                bridge_id: conn,
                                name: member.name.clone(),
                                player_index: member.player,
                                count,
                            }),
                        );
                    }
                    info!(code = %code, bridge = %conn, name = %member.name, "bridge left");
                }
                self.collect_session(&code, now);
            }
        }
        true
    }

    fn collect_session(&mut self, code: &SessionCode, now: Instant) -> bool {
        let idle = self
            .sessions
            .get(code)
            .is_some_and(|s| s.is_idle(now, self.idle_timeout));
        if idle {
            self.sessions.remove(code);
            info!(code = %code, "idle session collected");
        }
        idle
    }

    /// Remove sessions with no members at all that are older than the idle
    /// threshold. Returns how many were removed.
    pub fn garbage_collect(&mut self, now: Instant) -> usize {
        let idle: Vec<_> = self
            .sessions
            .values()
            .filter(|s| s.is_idle(now, self.idle_timeout))
            .map(|s| s.code.clone())
            .collect();
        for code in &idle {
            self.sessions.remove(code);
            info!(code = %code, "idle session collected");
        }
        idle.len()
    }

    /// Route one controller input. Returns the number of deliveries.
    ///
    /// Input from a connection that is not a controller of `code` is
    /// dropped. The host always receives the input, as do bridges on the
    /// controller's slot. With exactly one controller and one bridge the
    /// bridge receives it whatever its slot.
    pub fn route_input(
        &mut self,
        code: &SessionCode,
        conn: ConnectionId,
        payload: InputPayload,
        at: u64,
    ) -> usize {
        let Some(session) = self.sessions.get(code) else {
            debug!(code = %code, controller = %conn, "input for unknown session dropped");
            return 0;
        };
        let Some(member) = session.controllers.get(&conn) else {
            debug!(code = %code, connection = %conn, "input from non-controller dropped");
            return 0;
        };
        let player = member.player;

        let mut targets: Vec<ConnectionId> = session.host.into_iter().collect();
        targets.extend(session.bridges_for(player));

        let routed = RoutedInput {
            controller_id: conn,
            player_index: player,
            at,
            payload,
        };
        let delivered = targets.len();
        for to in targets {
            self.send(to, Notification::Input(routed.clone()));
        }
        debug!(code = %code, controller = %conn, %player, delivered, "input routed");
        delivered
    }

    /// Route input from `conn` into the session it currently controls.
    pub fn route_own_input(&mut self, conn: ConnectionId, payload: InputPayload, at: u64) -> usize {
        match self.connections.get(&conn) {
            Some(m) if m.role == Role::Controller => {
                let code = m.code.clone();
                self.route_input(&code, conn, payload, at)
            }
            _ => {
                debug!(connection = %conn, "input without controller membership dropped");
                0
            }
        }
    }

    /// Swap in a new catalog and re-resolve every live session against it.
    ///
    /// A session is told about its config when the config changed, when no
    /// profile is named, or when it uses the named profile. Returns the
    /// number of sessions notified.
    pub fn replace_catalog(&mut self, catalog: Catalog, edited_profile: Option<&str>) -> usize {
        self.catalog = catalog;
        let mut notified = Vec::new();

        for (code, session) in &mut self.sessions {
            let resolved = self
                .catalog
                .resolve(&ConfigRequest::from(&session.config), Some(&session.config));
            let changed = resolved != session.config;
            session.config = resolved;

            let uses_edited =
                edited_profile.map_or(true, |id| id == session.config.game_profile_id);
            if changed || uses_edited {
                notified.push(code.clone());
            }
        }

        for code in &notified {
            let Some(session) = self.sessions.get(code) else {
                continue;
            };
            let payload = self.catalog.payload(code, &session.config);
            self.broadcast(code, &Notification::ConfigUpdated(payload));
        }
        info!(sessions = notified.len(), ?edited_profile, "catalog replaced");
        notified.len()
    }
}

fn bridge_name(raw: Option<&str>) -> String {
    let name: String = raw.unwrap_or_default().trim().chars().take(MAX_BRIDGE_NAME).collect();
    if name.is_empty() {
        DEFAULT_BRIDGE_NAME.to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;

    use super::*;

    fn registry() -> Registry {
        let catalog = Catalog::sanitize(&json!({
            "gameProfiles": [{ "id": "platformer" }, { "id": "racing" }],
            "layouts": [{ "id": "balanced" }, { "id": "southpaw" }]
        }));
        Registry::with_rng(catalog, DEFAULT_IDLE_TIMEOUT, MAX_PLAYERS, fastrand::Rng::with_seed(42))
    }

    fn press_a() -> InputPayload {
        serde_json::from_value(json!({ "buttons": { "a": true } })).unwrap()
    }

    fn recipients(out: &[Outbound]) -> Vec<ConnectionId> {
        out.iter().map(|o| o.to).collect()
    }

    #[test]
    fn create_session_registers_host() {
        let mut reg = registry();
        let host = ConnectionId::new();
        let payload = reg.create_session(host, &ConfigRequest::new("racing", "bogus"), Instant::now());

        assert_eq!(payload.config.game_profile_id, "racing");
        assert_eq!(payload.config.layout_id, "balanced");
        let membership = reg.membership(host).unwrap();
        assert_eq!(membership.role, Role::Host);
        assert_eq!(membership.code, payload.code);
        assert!(reg.take_outbox().is_empty());
    }

    #[test]
    fn second_create_closes_first_session() {
        let mut reg = registry();
        let now = Instant::now();
        let host = ConnectionId::new();
        let controller = ConnectionId::new();

        let first = reg.create_session(host, &ConfigRequest::default(), now).code;
        reg.join_controller(first.as_str(), controller, None, now).unwrap();
        reg.take_outbox();

        let second = reg.create_session(host, &ConfigRequest::default(), now).code;
        assert_ne!(first, second);
        assert!(reg.session(&first).is_none());
        assert!(reg.membership(controller).is_none());

        let out = reg.take_outbox();
        assert_eq!(out.len(), 2);
        for o in &out {
            assert!(matches!(
                &o.notification,
                Notification::Closed(c) if c.code == first && c.reason == CloseReason::HostNewSession
            ));
        }
        assert_eq!(reg.membership(host).unwrap().code, second);
    }

    #[test]
    fn non_host_update_is_rejected_without_mutation() {
        let mut reg = registry();
        let now = Instant::now();
        let host = ConnectionId::new();
        let controller = ConnectionId::new();
        let code = reg.create_session(host, &ConfigRequest::default(), now).code;
        reg.join_controller(code.as_str(), controller, None, now).unwrap();
        let before = reg.session(&code).unwrap().config.clone();

        let err = reg
            .update_config(&code, controller, &ConfigRequest::new("racing", "southpaw"))
            .unwrap_err();
        assert!(matches!(err, RelayError::Unauthorized));
        assert!(matches!(
            reg.update_own_config(controller, &ConfigRequest::new("racing", "southpaw")),
            Err(RelayError::Unauthorized)
        ));
        assert_eq!(reg.session(&code).unwrap().config, before);
    }

    #[test]
    fn update_broadcasts_to_current_members() {
        let mut reg = registry();
        let now = Instant::now();
        let host = ConnectionId::new();
        let controller = ConnectionId::new();
        let bridge = ConnectionId::new();
        let code = reg.create_session(host, &ConfigRequest::default(), now).code;
        reg.join_controller(code.as_str(), controller, None, now).unwrap();
        reg.join_bridge(code.as_str(), bridge, Some("Desk"), None, now).unwrap();
        reg.take_outbox();

        let payload = reg
            .update_config(&code, host, &ConfigRequest::new("racing", ""))
            .unwrap();
        assert_eq!(payload.config.game_profile_id, "racing");
        assert_eq!(payload.config.layout_id, "balanced");

        let out = reg.take_outbox();
        let to: HashSet<_> = recipients(&out).into_iter().collect();
        assert_eq!(to, HashSet::from([host, controller, bridge]));
    }

    #[test]
    fn update_for_unknown_session_is_not_found() {
        let mut reg = registry();
        let code = SessionCode::parse("ZZZZZZ").unwrap();
        assert!(matches!(
            reg.update_config(&code, ConnectionId::new(), &ConfigRequest::default()),
            Err(RelayError::NotFound)
        ));
    }

    #[test]
    fn join_normalises_code_and_honours_requested_slot() {
        let mut reg = registry();
        let now = Instant::now();
        let host = ConnectionId::new();
        let code = reg.create_session(host, &ConfigRequest::default(), now).code;
        reg.take_outbox();

        let raw = format!(" {} ", code.as_str().to_lowercase());
        let (player, payload) = reg
            .join_controller(&raw, ConnectionId::new(), PlayerIndex::new(3).ok(), now)
            .unwrap();
        assert_eq!(player.get(), 3);
        assert_eq!(payload.code, code);

        let out = reg.take_outbox();
        assert_eq!(recipients(&out), vec![host]);
        assert!(matches!(
            &out[0].notification,
            Notification::ControllerConnected(p) if p.count == 1 && p.player_index == player
        ));
    }

    #[test]
    fn taken_slot_falls_back_to_lowest_free() {
        let mut reg = registry();
        let now = Instant::now();
        let code = reg.create_session(ConnectionId::new(), &ConfigRequest::default(), now).code;
        let wanted = PlayerIndex::new(2).ok();

        let (a, _) = reg.join_controller(code.as_str(), ConnectionId::new(), wanted, now).unwrap();
        let (b, _) = reg.join_controller(code.as_str(), ConnectionId::new(), wanted, now).unwrap();
        let (c, _) = reg.join_controller(code.as_str(), ConnectionId::new(), wanted, now).unwrap();
        assert_eq!((a.get(), b.get(), c.get()), (2, 1, 3));
    }

    #[test]
    fn slots_full_still_leaves_previous_session() {
        let catalog = Catalog::builtin();
        let mut reg = Registry::with_rng(catalog, DEFAULT_IDLE_TIMEOUT, 2, fastrand::Rng::with_seed(1));
        let now = Instant::now();
        let full = reg.create_session(ConnectionId::new(), &ConfigRequest::default(), now).code;
        let other_host = ConnectionId::new();
        let other = reg.create_session(other_host, &ConfigRequest::default(), now).code;

        reg.join_controller(full.as_str(), ConnectionId::new(), None, now).unwrap();
        reg.join_controller(full.as_str(), ConnectionId::new(), None, now).unwrap();

        let mover = ConnectionId::new();
        reg.join_controller(other.as_str(), mover, None, now).unwrap();
        reg.take_outbox();

        let err = reg.join_controller(full.as_str(), mover, None, now).unwrap_err();
        assert!(matches!(err, RelayError::SlotsFull));
        assert!(reg.membership(mover).is_none());
        assert_eq!(reg.session(&other).unwrap().controller_count(), 0);

        let out = reg.take_outbox();
        assert_eq!(recipients(&out), vec![other_host]);
        assert!(matches!(
            &out[0].notification,
            Notification::ControllerDisconnected(p) if p.controller_id == mover && p.count == 0
        ));
    }

    #[test]
    fn rejoin_same_session_keeps_room_for_own_slot() {
        let catalog = Catalog::builtin();
        let mut reg = Registry::with_rng(catalog, DEFAULT_IDLE_TIMEOUT, 1, fastrand::Rng::with_seed(1));
        let now = Instant::now();
        let code = reg.create_session(ConnectionId::new(), &ConfigRequest::default(), now).code;
        let controller = ConnectionId::new();

        reg.join_controller(code.as_str(), controller, None, now).unwrap();
        let (player, _) = reg.join_controller(code.as_str(), controller, None, now).unwrap();
        assert_eq!(player, PlayerIndex::FIRST);
        assert_eq!(reg.session(&code).unwrap().controller_count(), 1);
    }

    #[test]
    fn join_unknown_code_is_not_found() {
        let mut reg = registry();
        let now = Instant::now();
        assert!(matches!(
            reg.join_controller("nope", ConnectionId::new(), None, now),
            Err(RelayError::NotFound)
        ));
        assert!(matches!(
            reg.join_bridge("ZZZZZZ", ConnectionId::new(), None, None, now),
            Err(RelayError::NotFound)
        ));
    }

    #[test]
    fn switching_sessions_notifies_old_host_once() {
        let mut reg = registry();
        let now = Instant::now();
        let host_a = ConnectionId::new();
        let host_b = ConnectionId::new();
        let controller = ConnectionId::new();
        let a = reg.create_session(host_a, &ConfigRequest::default(), now).code;
        let b = reg.create_session(host_b, &ConfigRequest::default(), now).code;

        reg.join_controller(a.as_str(), controller, None, now).unwrap();
        reg.take_outbox();
        reg.join_controller(b.as_str(), controller, None, now).unwrap();

        let out = reg.take_outbox();
        let to_a: Vec<_> = out.iter().filter(|o| o.to == host_a).collect();
        assert_eq!(to_a.len(), 1);
        assert!(matches!(
            &to_a[0].notification,
            Notification::ControllerDisconnected(p) if p.count == 0 && p.controller_id == controller
        ));
        assert_eq!(reg.session(&a).unwrap().controller_count(), 0);
        assert_eq!(reg.membership(controller).unwrap().code, b);
    }

    #[test]
    fn bridge_defaults() {
        let mut reg = registry();
        let now = Instant::now();
        let code = reg.create_session(ConnectionId::new(), &ConfigRequest::default(), now).code;
        let long = "x".repeat(60);

        let (player, _) = reg.join_bridge(code.as_str(), ConnectionId::new(), Some(&long), None, now).unwrap();
        assert_eq!(player, PlayerIndex::FIRST);

        let out = reg.take_outbox();
        assert!(matches!(
            &out.last().unwrap().notification,
            Notification::BridgeConnected(p) if p.name.len() == 40 && p.count == 1
        ));

        assert_eq!(bridge_name(Some("   ")), "Bridge");
        assert_eq!(bridge_name(None), "Bridge");
    }

    #[test]
    fn detach_is_idempotent() {
        let mut reg = registry();
        let now = Instant::now();
        let code = reg.create_session(ConnectionId::new(), &ConfigRequest::default(), now).code;
        let controller = ConnectionId::new();
        reg.join_controller(code.as_str(), controller, None, now).unwrap();
        reg.take_outbox();

        assert!(reg.detach(controller, now));
        assert_eq!(reg.take_outbox().len(), 1);
        assert!(!reg.detach(controller, now));
        assert!(!reg.detach(ConnectionId::new(), now));
        assert!(reg.take_outbox().is_empty());
    }

    #[test]
    fn host_disconnect_closes_session_for_everyone() {
        let mut reg = registry();
        let now = Instant::now();
        let host = ConnectionId::new();
        let controller = ConnectionId::new();
        let bridge = ConnectionId::new();
        let code = reg.create_session(host, &ConfigRequest::default(), now).code;
        reg.join_controller(code.as_str(), controller, None, now).unwrap();
        reg.join_bridge(code.as_str(), bridge, None, None, now).unwrap();
        reg.take_outbox();

        assert!(reg.detach(host, now));
        let out = reg.take_outbox();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|o| matches!(
            &o.notification,
            Notification::Closed(c) if c.reason == CloseReason::HostDisconnected
        )));
        assert!(reg.session(&code).is_none());
        assert!(reg.membership(controller).is_none());
        assert!(reg.membership(bridge).is_none());
    }

    #[test]
    fn close_unknown_session_is_noop() {
        let mut reg = registry();
        let code = SessionCode::parse("ZZZZZZ").unwrap();
        assert!(!reg.close_session(&code, CloseReason::ServerShutdown));
        assert!(reg.take_outbox().is_empty());
    }

    #[test]
    fn garbage_collect_spares_sessions_with_members_or_host() {
        let mut reg = registry();
        let start = Instant::now();
        let later = start + DEFAULT_IDLE_TIMEOUT + Duration::from_secs(1);
        let hosted = reg.create_session(ConnectionId::new(), &ConfigRequest::default(), start).code;

        assert_eq!(reg.garbage_collect(later), 0);
        assert!(reg.session(&hosted).is_some());

        // Hostless, memberless and old: collectable.
        reg.sessions.get_mut(&hosted).unwrap().host = None;
        assert_eq!(reg.garbage_collect(start), 0);
        assert_eq!(reg.garbage_collect(later), 1);
        assert_eq!(reg.session_count(), 0);
    }

    #[test]
    fn input_reaches_host_and_matching_bridges() {
        let mut reg = registry();
        let now = Instant::now();
        let host = ConnectionId::new();
        let code = reg.create_session(host, &ConfigRequest::default(), now).code;
        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();
        let b1 = ConnectionId::new();
        let b2 = ConnectionId::new();
        reg.join_controller(code.as_str(), c1, PlayerIndex::new(1).ok(), now).unwrap();
        reg.join_controller(code.as_str(), c2, PlayerIndex::new(2).ok(), now).unwrap();
        reg.join_bridge(code.as_str(), b1, None, PlayerIndex::new(1).ok(), now).unwrap();
        reg.join_bridge(code.as_str(), b2, None, PlayerIndex::new(2).ok(), now).unwrap();
        reg.take_outbox();

        assert_eq!(reg.route_input(&code, c2, press_a(), 7), 2);
        let out = reg.take_outbox();
        assert_eq!(recipients(&out), vec![host, b2]);
        assert!(matches!(
            &out[1].notification,
            Notification::Input(i) if i.player_index.get() == 2 && i.at == 7 && i.controller_id == c2
        ));
    }

    #[test]
    fn controller_departure_reaches_its_bridges() {
        let mut reg = registry();
        let now = Instant::now();
        let host = ConnectionId::new();
        let code = reg.create_session(host, &ConfigRequest::default(), now).code;
        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();
        let b1 = ConnectionId::new();
        let b2 = ConnectionId::new();
        reg.join_controller(code.as_str(), c1, PlayerIndex::new(1).ok(), now).unwrap();
        reg.join_controller(code.as_str(), c2, PlayerIndex::new(2).ok(), now).unwrap();
        reg.join_bridge(code.as_str(), b1, None, PlayerIndex::new(1).ok(), now).unwrap();
        reg.join_bridge(code.as_str(), b2, None, PlayerIndex::new(2).ok(), now).unwrap();
        reg.take_outbox();

        reg.detach(c2, now);
        let out = reg.take_outbox();
        assert_eq!(recipients(&out), vec![host, b2]);
        assert!(out.iter().all(|o| matches!(
            &o.notification,
            Notification::ControllerDisconnected(p) if p.controller_id == c2 && p.count == 1
        )));
    }

    #[test]
    fn single_pair_fallback_ignores_slot_mismatch() {
        let mut reg = registry();
        let now = Instant::now();
        let host = ConnectionId::new();
        let code = reg.create_session(host, &ConfigRequest::default(), now).code;
        let controller = ConnectionId::new();
        let bridge = ConnectionId::new();
        reg.join_controller(code.as_str(), controller, PlayerIndex::new(4).ok(), now).unwrap();
        reg.join_bridge(code.as_str(), bridge, None, None, now).unwrap();
        reg.take_outbox();

        reg.route_input(&code, controller, press_a(), 1);
        assert_eq!(recipients(&reg.take_outbox()), vec![host, bridge]);

        // A second controller disables the fallback.
        reg.join_controller(code.as_str(), ConnectionId::new(), PlayerIndex::new(5).ok(), now).unwrap();
        reg.take_outbox();
        reg.route_input(&code, controller, press_a(), 2);
        assert_eq!(recipients(&reg.take_outbox()), vec![host]);
    }

    #[test]
    fn stale_input_is_dropped() {
        let mut reg = registry();
        let now = Instant::now();
        let host = ConnectionId::new();
        let code = reg.create_session(host, &ConfigRequest::default(), now).code;
        let controller = ConnectionId::new();
        let bridge = ConnectionId::new();
        reg.join_controller(code.as_str(), controller, None, now).unwrap();
        reg.join_bridge(code.as_str(), bridge, None, None, now).unwrap();
        reg.detach(controller, now);
        reg.take_outbox();

        assert_eq!(reg.route_input(&code, controller, press_a(), 1), 0);
        assert_eq!(reg.route_own_input(controller, press_a(), 1), 0);
        assert_eq!(reg.route_input(&code, bridge, press_a(), 1), 0);
        assert!(reg.take_outbox().is_empty());
    }

    #[test]
    fn replace_catalog_refreshes_sessions() {
        let mut reg = registry();
        let now = Instant::now();
        let racing = reg.create_session(ConnectionId::new(), &ConfigRequest::new("racing", "balanced"), now).code;
        let platformer = reg.create_session(ConnectionId::new(), &ConfigRequest::new("platformer", "balanced"), now).code;
        reg.take_outbox();

        // Editing "racing" only refreshes sessions that use it.
        let same = reg.catalog().clone();
        assert_eq!(reg.replace_catalog(same, Some("racing")), 1);
        let out = reg.take_outbox();
        assert!(matches!(&out[0].notification, Notification::ConfigUpdated(p) if p.code == racing));

        // Removing "racing" moves its session to the default.
        let without_racing = Catalog::sanitize(&json!({
            "gameProfiles": [{ "id": "platformer" }],
            "layouts": [{ "id": "balanced" }]
        }));
        assert_eq!(reg.replace_catalog(without_racing, Some("unrelated")), 1);
        assert_eq!(reg.session(&racing).unwrap().config.game_profile_id, "platformer");
        assert_eq!(reg.session(&platformer).unwrap().config.game_profile_id, "platformer");

        // No named profile refreshes everyone.
        let current = reg.catalog().clone();
        assert_eq!(reg.replace_catalog(current, None), 2);
    }

    #[test]
    fn close_all_closes_every_session() {
        let mut reg = registry();
        let now = Instant::now();
        reg.create_session(ConnectionId::new(), &ConfigRequest::default(), now);
        reg.create_session(ConnectionId::new(), &ConfigRequest::default(), now);
        reg.close_all(CloseReason::ServerShutdown);
        assert_eq!(reg.session_count(), 0);
        assert_eq!(reg.take_outbox().len(), 2);
    }
}
