//! The relay actor and its TCP JSON-lines front end.
//!
//! One task owns the [`Registry`]. Connection tasks decode frames and hand
//! them over an mpsc channel; every outbound frame, acknowledgements
//! included, goes through the owning connection's writer channel so a
//! member sees notifications and acks in the order they were produced.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use aircontrol_types::message::{BAD_REQUEST, UNKNOWN_EVENT};
use aircontrol_types::{Ack, ClientFrame, ClientRequest, CloseReason, ConnectionId, ServerFrame};
use serde_json::Value;
use tokio::io::BufReader;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::registry::Registry;
use crate::wire;

/// Events processed by the relay's main loop.
pub enum RelayEvent {
    /// A connection was accepted and its writer is ready.
    Connected {
        id: ConnectionId,
        remote: SocketAddr,
        tx: mpsc::UnboundedSender<ServerFrame>,
    },
    /// A decoded request.
    Request {
        id: ConnectionId,
        frame_id: Option<u64>,
        request: ClientRequest,
    },
    /// A frame that could not be served; answered with `error` when it
    /// carried an id.
    Invalid {
        id: ConnectionId,
        frame_id: Option<u64>,
        error: &'static str,
    },
    /// The connection closed.
    Disconnected(ConnectionId),
    /// Swap the profile catalog and refresh live sessions.
    ReplaceCatalog {
        catalog: Catalog,
        edited_profile: Option<String>,
    },
    /// Shutdown signal.
    Shutdown,
}

/// Control handle for a running relay.
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayEvent>,
}

impl RelayHandle {
    /// Ask the relay to close every session and stop.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(RelayEvent::Shutdown).await;
    }

    pub async fn replace_catalog(
        &self,
        catalog: Catalog,
        edited_profile: Option<String>,
    ) -> Result<(), RelayError> {
        self.tx
            .send(RelayEvent::ReplaceCatalog {
                catalog,
                edited_profile,
            })
            .await
            .map_err(|_| RelayError::Closed)
    }
}

/// The session relay.
pub struct RelayServer {
    listener: TcpListener,
    registry: Registry,
    peers: HashMap<ConnectionId, mpsc::UnboundedSender<ServerFrame>>,
    event_tx: mpsc::Sender<RelayEvent>,
    event_rx: mpsc::Receiver<RelayEvent>,
}

impl RelayServer {
    /// Bind the relay's listener.
    pub async fn bind(config: &RelayConfig, catalog: Catalog) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(config.listen_addr()).await?;
        let registry = Registry::new(catalog, config.idle_timeout(), config.max_players);
        Ok(Self::with_registry(listener, registry))
    }

    /// Serve an existing registry on an existing listener.
    pub fn with_registry(listener: TcpListener, registry: Registry) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1024);
        Self {
            listener,
            registry,
            peers: HashMap::new(),
            event_tx,
            event_rx,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            tx: self.event_tx.clone(),
        }
    }

    /// Run the relay event loop until shutdown.
    pub async fn run(mut self) -> Result<(), RelayError> {
        info!(addr = %self.local_addr()?, "relay listening");

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, remote)) => self.spawn_connection(stream, remote),
                        Err(e) => debug!(error = %e, "accept error"),
                    }
                }
                event = self.event_rx.recv() => {
                    match event {
                        Some(RelayEvent::Shutdown) | None => {
                            info!("shutting down");
                            break;
                        }
                        Some(event) => self.handle_event(event),
                    }
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, remote: SocketAddr) {
        let id = ConnectionId::new();
        let event_tx = self.event_tx.clone();
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(wire::write_lines(writer, rx));
        tokio::spawn(async move {
            if event_tx
                .send(RelayEvent::Connected { id, remote, tx })
                .await
                .is_err()
            {
                return;
            }
            read_frames(id, reader, &event_tx).await;
            let _ = event_tx.send(RelayEvent::Disconnected(id)).await;
        });
    }

    fn handle_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Connected { id, remote, tx } => {
                debug!(connection = %id, %remote, "connection opened");
                self.peers.insert(id, tx);
            }
            RelayEvent::Request {
                id,
                frame_id,
                request,
            } => {
                let ack = self.handle_request(id, request);
                self.flush();
                if let (Some(frame_id), Some(ack)) = (frame_id, ack) {
                    self.deliver(id, ServerFrame::Ack { id: frame_id, ack });
                }
            }
            RelayEvent::Invalid {
                id,
                frame_id,
                error,
            } => {
                if let Some(frame_id) = frame_id {
                    self.deliver(
                        id,
                        ServerFrame::Ack {
                            id: frame_id,
                            ack: Ack::error(error),
                        },
                    );
                }
            }
            RelayEvent::Disconnected(id) => {
                let now = Instant::now();
                self.registry.detach(id, now);
                self.registry.garbage_collect(now);
                self.flush();
                self.peers.remove(&id);
                debug!(connection = %id, "connection closed");
            }
            RelayEvent::ReplaceCatalog {
                catalog,
                edited_profile,
            } => {
                self.registry
                    .replace_catalog(catalog, edited_profile.as_deref());
                self.flush();
            }
            RelayEvent::Shutdown => {}
        }
    }

    /// Apply one request. Returns the acknowledgement, if the request has one.
    fn handle_request(&mut self, id: ConnectionId, request: ClientRequest) -> Option<Ack> {
        let now = Instant::now();
        let result = match request {
            ClientRequest::CreateSession(config) => {
                Ok(Ack::session(self.registry.create_session(id, &config, now)))
            }
            ClientRequest::UpdateConfig(config) => self
                .registry
                .update_own_config(id, &config)
                .map(Ack::session),
            ClientRequest::JoinController { code, player } => self
                .registry
                .join_controller(&code, id, player, now)
                .map(|(player, payload)| Ack::joined(player, payload)),
            ClientRequest::JoinBridge { code, name, player } => self
                .registry
                .join_bridge(&code, id, name.as_deref(), player, now)
                .map(|(player, payload)| Ack::joined(player, payload)),
            ClientRequest::Input(payload) => {
                self.registry
                    .route_own_input(id, payload, crate::unix_millis());
                return None;
            }
        };

        Some(result.unwrap_or_else(|e| {
            warn!(connection = %id, error = %e, "request rejected");
            Ack::error(e.wire_code())
        }))
    }

    fn deliver(&self, to: ConnectionId, frame: ServerFrame) {
        if let Some(tx) = self.peers.get(&to) {
            let _ = tx.send(frame);
        }
    }

    fn flush(&mut self) {
        for outbound in self.registry.take_outbox() {
            self.deliver(outbound.to, ServerFrame::Notification(outbound.notification));
        }
    }

    fn shutdown(&mut self) {
        self.registry.close_all(CloseReason::ServerShutdown);
        self.flush();
        // Dropping the senders lets each writer drain and close its socket.
        self.peers.clear();
        info!("relay shut down complete");
    }
}

/// Decode one line into a request, or the error string to answer with.
fn decode_frame(line: &str) -> (Option<u64>, Result<ClientRequest, &'static str>) {
    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return (None, Err(BAD_REQUEST));
    };
    let frame_id = value.get("id").and_then(Value::as_u64);
    let Ok(frame) = serde_json::from_value::<ClientFrame>(value) else {
        return (frame_id, Err(BAD_REQUEST));
    };

    match ClientRequest::parse(&frame.event, frame.data) {
        Ok(Some(request)) => (frame_id, Ok(request)),
        Ok(None) => (frame_id, Err(UNKNOWN_EVENT)),
        Err(_) => (frame_id, Err(BAD_REQUEST)),
    }
}

async fn read_frames(id: ConnectionId, reader: OwnedReadHalf, event_tx: &mpsc::Sender<RelayEvent>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        let line = match wire::read_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!(connection = %id, error = %e, "read failed");
                break;
            }
        };

        let event = match decode_frame(&line) {
            (frame_id, Ok(request)) => RelayEvent::Request {
                id,
                frame_id,
                request,
            },
            (frame_id, Err(error)) => {
                debug!(connection = %id, error, "ignoring frame");
                RelayEvent::Invalid {
                    id,
                    frame_id,
                    error,
                }
            }
        };
        if event_tx.send(event).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_known_event() {
        let (id, request) =
            decode_frame(r#"{"id":4,"event":"controller:join-session","data":{"code":"k7f3xq","player":"2"}}"#);
        assert_eq!(id, Some(4));
        assert!(matches!(
            request,
            Ok(ClientRequest::JoinController { code, player: Some(p) }) if code == "k7f3xq" && p.get() == 2
        ));
    }

    #[test]
    fn decode_unknown_event_keeps_id() {
        let (id, request) = decode_frame(r#"{"id":9,"event":"host:teleport"}"#);
        assert_eq!(id, Some(9));
        assert_eq!(request.unwrap_err(), UNKNOWN_EVENT);
    }

    #[test]
    fn decode_garbage() {
        assert_eq!(decode_frame("not json"), (None, Err(BAD_REQUEST)));
        let (id, request) = decode_frame(r#"{"id":2,"data":{}}"#);
        assert_eq!(id, Some(2));
        assert_eq!(request.unwrap_err(), BAD_REQUEST);
    }

    #[test]
    fn decode_input_without_id() {
        let (id, request) =
            decode_frame(r#"{"event":"controller:input","data":{"buttons":{"a":true}}}"#);
        assert_eq!(id, None);
        assert!(matches!(request, Ok(ClientRequest::Input(p)) if p.is_pressed("a")));
    }
}
