//! Relay client: request/acknowledgement calls with a bounded wait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use aircontrol_types::{
    Ack, ClientFrame, ClientRequest, ConfigPayload, ConfigRequest, InputPayload, Notification,
    PlayerIndex, ServerFrame,
};
use tokio::io::BufReader;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::wire;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Ack>>>>;

/// A joined membership: the slot the relay assigned and the session config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    pub player: PlayerIndex,
    pub session: ConfigPayload,
}

pub struct RelayClient {
    tx: mpsc::UnboundedSender<ClientFrame>,
    notifications: mpsc::UnboundedReceiver<Notification>,
    pending: Pending,
    next_id: AtomicU64,
    ack_timeout: Duration,
}

impl RelayClient {
    /// Connect to a relay.
    pub async fn connect<A: ToSocketAddrs>(addr: A, ack_timeout: Duration) -> Result<Self, RelayError> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let (note_tx, notifications) = mpsc::unbounded_channel();
        let pending: Pending = Arc::default();

        tokio::spawn(wire::write_lines(writer, rx));
        tokio::spawn(read_frames(reader, Arc::clone(&pending), note_tx));

        Ok(Self {
            tx,
            notifications,
            pending,
            next_id: AtomicU64::new(1),
            ack_timeout,
        })
    }

    /// Send a request and wait for its acknowledgement.
    ///
    /// Fails with [`RelayError::Timeout`] when no ack arrives in time and
    /// with [`RelayError::Closed`] when the connection drops first.
    pub async fn request(&self, request: &ClientRequest) -> Result<Ack, RelayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = ClientFrame::new(Some(id), request)?;
        let (ack_tx, ack_rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, ack_tx);

        if self.tx.send(frame).is_err() {
            self.forget(id);
            return Err(RelayError::Closed);
        }

        match tokio::time::timeout(self.ack_timeout, ack_rx).await {
            Ok(Ok(ack)) => Ok(ack),
            Ok(Err(_)) => Err(RelayError::Closed),
            Err(_) => {
                self.forget(id);
                warn!(event = request.event(), id, "acknowledgement timed out");
                Err(RelayError::Timeout(self.ack_timeout))
            }
        }
    }

    fn forget(&self, id: u64) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    async fn session_request(&self, request: &ClientRequest) -> Result<Ack, RelayError> {
        let ack = self.request(request).await?;
        if ack.ok {
            Ok(ack)
        } else {
            Err(RelayError::from_wire(ack.error.as_deref().unwrap_or_default()))
        }
    }

    fn session_of(ack: Ack) -> Result<ConfigPayload, RelayError> {
        ack.session
            .ok_or_else(|| RelayError::Rejected("missing session payload".to_string()))
    }

    pub async fn create_session(&self, config: ConfigRequest) -> Result<ConfigPayload, RelayError> {
        let ack = self
            .session_request(&ClientRequest::CreateSession(config))
            .await?;
        Self::session_of(ack)
    }

    pub async fn update_config(&self, config: ConfigRequest) -> Result<ConfigPayload, RelayError> {
        let ack = self
            .session_request(&ClientRequest::UpdateConfig(config))
            .await?;
        Self::session_of(ack)
    }

    pub async fn join_controller(
        &self,
        code: &str,
        player: Option<PlayerIndex>,
    ) -> Result<Joined, RelayError> {
        let ack = self
            .session_request(&ClientRequest::JoinController {
                code: code.to_string(),
                player,
            })
            .await?;
        Self::joined(ack)
    }

    pub async fn join_bridge(
        &self,
        code: &str,
        name: Option<&str>,
        player: Option<PlayerIndex>,
    ) -> Result<Joined, RelayError> {
        let ack = self
            .session_request(&ClientRequest::JoinBridge {
                code: code.to_string(),
                name: name.map(str::to_string),
                player,
            })
            .await?;
        Self::joined(ack)
    }

    fn joined(ack: Ack) -> Result<Joined, RelayError> {
        let player = ack.player_index.unwrap_or(PlayerIndex::FIRST);
        Ok(Joined {
            player,
            session: Self::session_of(ack)?,
        })
    }

    /// Fire-and-forget controller input.
    pub fn send_input(&self, payload: InputPayload) -> Result<(), RelayError> {
        let frame = ClientFrame::new(None, &ClientRequest::Input(payload))?;
        self.tx.send(frame).map_err(|_| RelayError::Closed)
    }

    /// Next pushed notification. `None` once the connection is gone.
    pub async fn next_notification(&mut self) -> Option<Notification> {
        self.notifications.recv().await
    }
}

async fn read_frames(
    reader: OwnedReadHalf,
    pending: Pending,
    notifications: mpsc::UnboundedSender<Notification>,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        let line = match wire::read_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "relay read failed");
                break;
            }
        };

        match serde_json::from_str::<ServerFrame>(&line) {
            Ok(ServerFrame::Ack { id, ack }) => {
                let waiter = pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(ack);
                    }
                    None => debug!(id, "late acknowledgement dropped"),
                }
            }
            Ok(ServerFrame::Notification(notification)) => {
                let _ = notifications.send(notification);
            }
            Err(e) => warn!(error = %e, "malformed relay frame"),
        }
    }

    // Wake every waiter with `Closed`.
    pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}
