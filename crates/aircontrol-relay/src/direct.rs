//! Direct-connect host: phones pair with a 6-digit code and drive virtual
//! pads without a relay in between.
//!
//! [`DirectHost`] is the pairing state machine and owns the actuation hub.
//! [`DirectServer`] runs it as an actor behind a TCP JSON-lines listener and
//! pings paired phones on a fixed interval.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use aircontrol_actuation::{ActuationHub, GamepadBackend, PadCommand};
use aircontrol_types::direct::parse_client_message;
use aircontrol_types::{
    ClientMessage, ConnectionId, HostMessage, Inbound, LayoutKind, PairingCode, PlayerIndex,
    RejectReason,
};
use serde::Serialize;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::codegen;
use crate::config::DirectConfig;
use crate::error::RelayError;
use crate::wire;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeerState {
    Unpaired,
    Paired(PlayerIndex),
    /// Rejected; waiting for the transport to go away.
    Closed,
}

#[derive(Debug)]
struct Peer {
    state: PeerState,
    remote: SocketAddr,
    connected_at: u64,
    last_seen_at: u64,
    input_count: u64,
}

/// A paired phone, as shown to the host operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSnapshot {
    pub controller_id: PlayerIndex,
    pub connected_at: u64,
    pub last_seen_at: u64,
    pub input_count: u64,
    pub remote_address: String,
}

/// What to do with a connection after handling one of its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    None,
    Send(HostMessage),
    /// Send the message, then drop the connection.
    Close(HostMessage),
}

impl Reply {
    fn reject(reason: RejectReason) -> Self {
        let message = HostMessage::Reject { reason };
        if reason.closes_connection() {
            Self::Close(message)
        } else {
            Self::Send(message)
        }
    }
}

pub struct DirectHost<B: GamepadBackend> {
    code: PairingCode,
    layout: LayoutKind,
    max_controllers: u8,
    peers: HashMap<ConnectionId, Peer>,
    hub: ActuationHub<B>,
    rng: fastrand::Rng,
}

impl<B: GamepadBackend> DirectHost<B> {
    pub fn new(backend: B, layout: LayoutKind, max_controllers: u8) -> Self {
        Self::with_rng(backend, layout, max_controllers, fastrand::Rng::new())
    }

    pub fn with_rng(
        backend: B,
        layout: LayoutKind,
        max_controllers: u8,
        mut rng: fastrand::Rng,
    ) -> Self {
        Self {
            code: codegen::pairing_code(&mut rng),
            layout,
            max_controllers,
            peers: HashMap::new(),
            hub: ActuationHub::new(backend),
            rng,
        }
    }

    pub fn code(&self) -> &PairingCode {
        &self.code
    }

    pub fn layout(&self) -> LayoutKind {
        self.layout
    }

    pub fn hub(&self) -> &ActuationHub<B> {
        &self.hub
    }

    /// Track a freshly opened connection.
    pub fn connect(&mut self, conn: ConnectionId, remote: SocketAddr, now_ms: u64) {
        debug!(connection = %conn, %remote, "socket opened");
        self.peers.insert(
            conn,
            Peer {
                state: PeerState::Unpaired,
                remote,
                connected_at: now_ms,
                last_seen_at: now_ms,
                input_count: 0,
            },
        );
    }

    /// Handle one line from a phone.
    pub async fn handle(&mut self, conn: ConnectionId, raw: &str, now_ms: u64) -> Reply {
        let Some(peer) = self.peers.get_mut(&conn) else {
            return Reply::None;
        };
        peer.last_seen_at = now_ms;
        let state = peer.state;

        let Some(inbound) = parse_client_message(raw) else {
            warn!(connection = %conn, remote = %peer.remote, "invalid message ignored");
            return Reply::None;
        };

        match state {
            PeerState::Closed => Reply::None,
            PeerState::Unpaired => match inbound {
                Inbound::Message(ClientMessage::Pair { code }) => self.pair(conn, &code).await,
                other => {
                    debug!(connection = %conn, ?other, "message before pairing");
                    self.close_peer(conn);
                    Reply::reject(RejectReason::InvalidCode)
                }
            },
            PeerState::Paired(slot) => self.handle_paired(conn, slot, inbound).await,
        }
    }

    async fn pair(&mut self, conn: ConnectionId, code: &str) -> Reply {
        if !self.code.matches(code) {
            warn!(connection = %conn, "rejected pairing with wrong code");
            self.close_peer(conn);
            return Reply::reject(RejectReason::InvalidCode);
        }

        let Some(slot) = self.free_slot() else {
            warn!(connection = %conn, "rejected pairing, host is full");
            self.close_peer(conn);
            return Reply::reject(RejectReason::ServerFull);
        };

        let Some(peer) = self.peers.get_mut(&conn) else {
            return Reply::None;
        };
        peer.state = PeerState::Paired(slot);
        let remote = peer.remote;

        if let Err(e) = self.hub.attach(slot).await {
            warn!(%slot, error = %e, "paired, but virtual gamepad is unavailable");
        }
        info!(%slot, %remote, "controller paired");
        Reply::Send(HostMessage::Welcome {
            controller_id: slot,
            layout: self.layout,
        })
    }

    async fn handle_paired(
        &mut self,
        conn: ConnectionId,
        slot: PlayerIndex,
        inbound: Inbound,
    ) -> Reply {
        let message = match inbound {
            Inbound::Message(message) => message,
            Inbound::Unrecognized(kind) => {
                debug!(%slot, kind, "unrecognized message ignored");
                return Reply::None;
            }
        };

        match message {
            ClientMessage::Pair { .. } => Reply::reject(RejectReason::AlreadyConnected),
            ClientMessage::Ping => Reply::Send(HostMessage::Pong),
            ClientMessage::Pong => Reply::None,
            input => {
                if let Some(peer) = self.peers.get_mut(&conn) {
                    peer.input_count += 1;
                }
                if let Some(command) = PadCommand::from_message(&input) {
                    if let Err(e) = self.hub.apply(slot, &[command]).await {
                        debug!(%slot, error = %e, "input not applied");
                    }
                }
                Reply::None
            }
        }
    }

    fn close_peer(&mut self, conn: ConnectionId) {
        if let Some(peer) = self.peers.get_mut(&conn) {
            peer.state = PeerState::Closed;
        }
    }

    fn free_slot(&self) -> Option<PlayerIndex> {
        PlayerIndex::range(self.max_controllers).find(|slot| {
            !self
                .peers
                .values()
                .any(|p| p.state == PeerState::Paired(*slot))
        })
    }

    /// Forget a connection, neutralising its pad if it was paired.
    pub async fn disconnect(&mut self, conn: ConnectionId) -> bool {
        let Some(peer) = self.peers.remove(&conn) else {
            return false;
        };
        if let PeerState::Paired(slot) = peer.state {
            if let Err(e) = self.hub.detach(slot).await {
                warn!(%slot, error = %e, "failed to release pad");
            }
            info!(%slot, remote = %peer.remote, "controller disconnected");
        }
        true
    }

    /// Change the layout. Paired phones are told; nothing is sent when the
    /// layout is unchanged.
    pub fn set_layout(&mut self, layout: LayoutKind) -> Vec<(ConnectionId, HostMessage)> {
        if self.layout == layout {
            return Vec::new();
        }
        self.layout = layout;
        info!(%layout, "layout changed");
        self.paired()
            .map(|conn| (conn, HostMessage::LayoutChange { layout }))
            .collect()
    }

    /// Issue a fresh pairing code. Phones already paired stay paired.
    pub fn regenerate_code(&mut self) -> &PairingCode {
        self.code = codegen::pairing_code(&mut self.rng);
        info!("pairing code regenerated");
        &self.code
    }

    fn paired(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.peers
            .iter()
            .filter(|(_, p)| matches!(p.state, PeerState::Paired(_)))
            .map(|(id, _)| *id)
    }

    /// Connections the liveness probe should ping.
    pub fn ping_targets(&self) -> Vec<ConnectionId> {
        self.paired().collect()
    }

    /// Paired phones ordered by slot.
    pub fn controllers(&self) -> Vec<ControllerSnapshot> {
        let mut snapshots: Vec<_> = self
            .peers
            .values()
            .filter_map(|p| match p.state {
                PeerState::Paired(slot) => Some(ControllerSnapshot {
                    controller_id: slot,
                    connected_at: p.connected_at,
                    last_seen_at: p.last_seen_at,
                    input_count: p.input_count,
                    remote_address: p.remote.to_string(),
                }),
                _ => None,
            })
            .collect();
        snapshots.sort_by_key(|s| s.controller_id);
        snapshots
    }

    /// Release every pad and forget every connection.
    pub async fn shutdown(&mut self) -> Result<(), RelayError> {
        self.peers.clear();
        self.hub.shutdown().await?;
        Ok(())
    }
}

/// Host state as reported to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectStatus {
    pub port: u16,
    pub pairing_code: PairingCode,
    pub layout: LayoutKind,
    pub controllers: Vec<ControllerSnapshot>,
}

/// Events processed by the direct-connect host's main loop.
pub enum DirectEvent {
    Line { id: ConnectionId, line: String },
    Disconnected(ConnectionId),
    SetLayout(LayoutKind),
    RegenerateCode(oneshot::Sender<PairingCode>),
    Status(oneshot::Sender<DirectStatus>),
    Shutdown,
}

/// Control handle for a running [`DirectServer`].
#[derive(Clone)]
pub struct DirectHandle {
    tx: mpsc::Sender<DirectEvent>,
}

impl DirectHandle {
    pub async fn set_layout(&self, layout: LayoutKind) -> Result<(), RelayError> {
        self.tx
            .send(DirectEvent::SetLayout(layout))
            .await
            .map_err(|_| RelayError::Closed)
    }

    pub async fn regenerate_code(&self) -> Result<PairingCode, RelayError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(DirectEvent::RegenerateCode(tx))
            .await
            .map_err(|_| RelayError::Closed)?;
        rx.await.map_err(|_| RelayError::Closed)
    }

    pub async fn status(&self) -> Result<DirectStatus, RelayError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(DirectEvent::Status(tx))
            .await
            .map_err(|_| RelayError::Closed)?;
        rx.await.map_err(|_| RelayError::Closed)
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(DirectEvent::Shutdown).await;
    }
}

struct Connection {
    tx: mpsc::UnboundedSender<HostMessage>,
    reader: AbortHandle,
}

/// TCP front end for a [`DirectHost`].
pub struct DirectServer<B: GamepadBackend> {
    listener: TcpListener,
    host: DirectHost<B>,
    connections: HashMap<ConnectionId, Connection>,
    ping_interval: Duration,
    event_tx: mpsc::Sender<DirectEvent>,
    event_rx: mpsc::Receiver<DirectEvent>,
}

impl<B: GamepadBackend> DirectServer<B> {
    pub async fn bind(config: &DirectConfig, backend: B) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(config.listen_addr()).await?;
        let host = DirectHost::new(backend, config.layout, config.max_controllers);
        Ok(Self::with_host(listener, host, config.ping_interval()))
    }

    pub fn with_host(listener: TcpListener, host: DirectHost<B>, ping_interval: Duration) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1024);
        Self {
            listener,
            host,
            connections: HashMap::new(),
            ping_interval,
            event_tx,
            event_rx,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn code(&self) -> &PairingCode {
        self.host.code()
    }

    pub fn handle(&self) -> DirectHandle {
        DirectHandle {
            tx: self.event_tx.clone(),
        }
    }

    /// Run the host event loop until shutdown.
    pub async fn run(mut self) -> Result<(), RelayError> {
        let addr = self.local_addr()?;
        info!(%addr, layout = %self.host.layout(), "direct host listening");

        let start = tokio::time::Instant::now() + self.ping_interval;
        let mut ping = tokio::time::interval_at(start, self.ping_interval);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, remote)) => self.accept(stream, remote),
                        Err(e) => debug!(error = %e, "accept error"),
                    }
                }
                _ = ping.tick() => {
                    // Liveness probe: send only; closes are left to the transport.
                    for id in self.host.ping_targets() {
                        self.send(id, HostMessage::Ping);
                    }
                }
                event = self.event_rx.recv() => {
                    match event {
                        Some(DirectEvent::Shutdown) | None => {
                            info!("shutting down");
                            break;
                        }
                        Some(event) => self.handle_event(event, addr.port()).await,
                    }
                }
            }
        }

        for (_, conn) in self.connections.drain() {
            conn.reader.abort();
        }
        self.host.shutdown().await?;
        info!("direct host shut down complete");
        Ok(())
    }

    fn accept(&mut self, stream: TcpStream, remote: SocketAddr) {
        let id = ConnectionId::new();
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(wire::write_lines(writer, rx));

        let event_tx = self.event_tx.clone();
        let reader_task = tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                match wire::read_line(&mut reader, &mut buf).await {
                    Ok(Some(line)) => {
                        if event_tx.send(DirectEvent::Line { id, line }).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(connection = %id, error = %e, "read failed");
                        break;
                    }
                }
            }
            let _ = event_tx.send(DirectEvent::Disconnected(id)).await;
        });

        self.connections.insert(
            id,
            Connection {
                tx,
                reader: reader_task.abort_handle(),
            },
        );
        self.host.connect(id, remote, crate::unix_millis());
    }

    async fn handle_event(&mut self, event: DirectEvent, port: u16) {
        match event {
            DirectEvent::Line { id, line } => {
                match self.host.handle(id, &line, crate::unix_millis()).await {
                    Reply::None => {}
                    Reply::Send(message) => self.send(id, message),
                    Reply::Close(message) => {
                        self.send(id, message);
                        self.close(id).await;
                    }
                }
            }
            DirectEvent::Disconnected(id) => self.close(id).await,
            DirectEvent::SetLayout(layout) => {
                for (id, message) in self.host.set_layout(layout) {
                    self.send(id, message);
                }
            }
            DirectEvent::RegenerateCode(reply) => {
                let code = self.host.regenerate_code().clone();
                let _ = reply.send(code);
            }
            DirectEvent::Status(reply) => {
                let _ = reply.send(DirectStatus {
                    port,
                    pairing_code: self.host.code().clone(),
                    layout: self.host.layout(),
                    controllers: self.host.controllers(),
                });
            }
            DirectEvent::Shutdown => {}
        }
    }

    fn send(&self, id: ConnectionId, message: HostMessage) {
        if let Some(conn) = self.connections.get(&id) {
            let _ = conn.tx.send(message);
        }
    }

    /// Drop a connection. Its writer drains queued messages before closing.
    async fn close(&mut self, id: ConnectionId) {
        if let Some(conn) = self.connections.remove(&id) {
            conn.reader.abort();
        }
        self.host.disconnect(id).await;
    }
}

#[cfg(test)]
mod tests {
    use aircontrol_actuation::mock::{MockGamepad, MockGamepadHandle};
    use aircontrol_types::PadButton;

    use super::*;

    fn host(max: u8) -> (DirectHost<MockGamepad>, MockGamepadHandle) {
        let mock = MockGamepad::new();
        let pads = mock.handle();
        (
            DirectHost::with_rng(mock, LayoutKind::Xbox, max, fastrand::Rng::with_seed(5)),
            pads,
        )
    }

    fn remote() -> SocketAddr {
        "192.168.1.20:50000".parse().unwrap()
    }

    async fn paired(host: &mut DirectHost<MockGamepad>) -> ConnectionId {
        let conn = ConnectionId::new();
        host.connect(conn, remote(), 0);
        let pair = format!(r#"{{"type":"pair","code":"{}"}}"#, host.code());
        assert!(matches!(host.handle(conn, &pair, 1).await, Reply::Send(HostMessage::Welcome { .. })));
        conn
    }

    #[tokio::test]
    async fn pairing_assigns_lowest_slot_and_attaches_pad() {
        let (mut host, pads) = host(4);
        let conn = ConnectionId::new();
        host.connect(conn, remote(), 0);

        let pair = format!(r#"{{"type":"pair","code":"{}"}}"#, host.code());
        assert_eq!(
            host.handle(conn, &pair, 10).await,
            Reply::Send(HostMessage::Welcome {
                controller_id: PlayerIndex::FIRST,
                layout: LayoutKind::Xbox,
            })
        );
        assert_eq!(pads.plugged_slots(), vec![PlayerIndex::FIRST]);
        assert_eq!(host.controllers()[0].last_seen_at, 10);
    }

    #[tokio::test]
    async fn wrong_code_closes() {
        let (mut host, pads) = host(4);
        let conn = ConnectionId::new();
        host.connect(conn, remote(), 0);
        let wrong = if host.code().as_str() == "000000" { "111111" } else { "000000" };

        let reply = host
            .handle(conn, &format!(r#"{{"type":"pair","code":"{wrong}"}}"#), 1)
            .await;
        assert_eq!(
            reply,
            Reply::Close(HostMessage::Reject {
                reason: RejectReason::InvalidCode
            })
        );
        // Anything after the rejection is ignored.
        assert_eq!(host.handle(conn, r#"{"type":"ping"}"#, 2).await, Reply::None);
        assert!(pads.plugged_slots().is_empty());
    }

    #[tokio::test]
    async fn input_before_pairing_is_rejected() {
        let (mut host, _) = host(4);
        let conn = ConnectionId::new();
        host.connect(conn, remote(), 0);
        let reply = host
            .handle(conn, r#"{"type":"button","button":"a","state":"pressed"}"#, 1)
            .await;
        assert_eq!(
            reply,
            Reply::Close(HostMessage::Reject {
                reason: RejectReason::InvalidCode
            })
        );
    }

    #[tokio::test]
    async fn garbage_before_pairing_is_ignored() {
        let (mut host, _) = host(4);
        let conn = ConnectionId::new();
        host.connect(conn, remote(), 0);
        assert_eq!(host.handle(conn, "not json", 1).await, Reply::None);
        let pair = format!(r#"{{"type":"pair","code":"{}"}}"#, host.code());
        assert!(matches!(host.handle(conn, &pair, 2).await, Reply::Send(_)));
    }

    #[tokio::test]
    async fn full_host_rejects_and_closes() {
        let (mut host, _) = host(1);
        paired(&mut host).await;

        let late = ConnectionId::new();
        host.connect(late, remote(), 0);
        let pair = format!(r#"{{"type":"pair","code":"{}"}}"#, host.code());
        assert_eq!(
            host.handle(late, &pair, 1).await,
            Reply::Close(HostMessage::Reject {
                reason: RejectReason::ServerFull
            })
        );
    }

    #[tokio::test]
    async fn second_pair_is_rejected_without_close() {
        let (mut host, _) = host(4);
        let conn = paired(&mut host).await;
        let pair = format!(r#"{{"type":"pair","code":"{}"}}"#, host.code());
        assert_eq!(
            host.handle(conn, &pair, 1).await,
            Reply::Send(HostMessage::Reject {
                reason: RejectReason::AlreadyConnected
            })
        );
        assert_eq!(host.controllers().len(), 1);
    }

    #[tokio::test]
    async fn paired_input_drives_pad() {
        let (mut host, pads) = host(4);
        let conn = paired(&mut host).await;

        assert_eq!(
            host.handle(conn, r#"{"type":"button","button":"A","state":"pressed"}"#, 1)
                .await,
            Reply::None
        );
        host.handle(conn, r#"{"type":"stick","stick":"left","x":2,"y":-0.5}"#, 2)
            .await;
        assert_eq!(host.handle(conn, r#"{"type":"ping"}"#, 3).await, Reply::Send(HostMessage::Pong));
        assert_eq!(host.handle(conn, r#"{"type":"pong"}"#, 4).await, Reply::None);
        assert_eq!(host.handle(conn, r#"{"type":"wave"}"#, 5).await, Reply::None);

        let state = pads.last_state(PlayerIndex::FIRST).unwrap();
        assert!(state.is_pressed(PadButton::A));
        assert!((state.left_stick.x - 1.0).abs() < f64::EPSILON);
        assert_eq!(host.controllers()[0].input_count, 2);
    }

    #[tokio::test]
    async fn disconnect_neutralises_and_frees_slot() {
        let (mut host, pads) = host(1);
        let conn = paired(&mut host).await;
        host.handle(conn, r#"{"type":"trigger","trigger":"right","value":1}"#, 1)
            .await;

        assert!(host.disconnect(conn).await);
        assert!(!host.disconnect(conn).await);
        assert!(pads.last_state(PlayerIndex::FIRST).unwrap().is_neutral());
        assert_eq!(pads.unplugged_count(), 1);

        // The slot is free again.
        paired(&mut host).await;
    }

    #[tokio::test]
    async fn layout_change_reaches_paired_only() {
        let (mut host, _) = host(4);
        let conn = paired(&mut host).await;
        host.connect(ConnectionId::new(), remote(), 0);

        assert!(host.set_layout(LayoutKind::Xbox).is_empty());
        let sent = host.set_layout(LayoutKind::Simple);
        assert_eq!(
            sent,
            vec![(
                conn,
                HostMessage::LayoutChange {
                    layout: LayoutKind::Simple
                }
            )]
        );
        assert_eq!(host.ping_targets(), vec![conn]);
    }

    #[tokio::test]
    async fn regenerated_code_is_required_for_new_pairings() {
        let (mut host, _) = host(4);
        let old = host.code().clone();
        let mut fresh = host.regenerate_code().clone();
        while fresh == old {
            fresh = host.regenerate_code().clone();
        }

        let conn = ConnectionId::new();
        host.connect(conn, remote(), 0);
        let reply = host
            .handle(conn, &format!(r#"{{"type":"pair","code":"{old}"}}"#), 1)
            .await;
        assert!(matches!(reply, Reply::Close(_)));
    }

    #[tokio::test]
    async fn shutdown_releases_every_pad() {
        let (mut host, pads) = host(4);
        paired(&mut host).await;
        paired(&mut host).await;
        host.shutdown().await.unwrap();
        assert_eq!(pads.unplugged_count(), 2);
        assert!(pads.is_shutdown());
        assert!(host.controllers().is_empty());
    }
}
