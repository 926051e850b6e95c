//! Per-connection session
//!
//! A session runs one accepted socket through the room protocol:
//!
//! ```text
//! Handshake ── admit ──► Active ── exit | KICKED | EOF | shutdown ──► Closed
//!     │                      ▲
//!     └── room full ──► Waiting ── slot handed over, "NOT LOCKED"
//! ```
//!
//! A promoted waiter keeps its connection and goes straight to Active.
//!
//! Every error ends only this session; the slot it held is always released.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tracing::{debug, info, Span};
use uuid::Uuid;

use crate::dictionary::{Dictionary, Vocab};
use crate::error::{RelayError, Result};
use crate::protocol::messages::{port_token, Inbound, Sentinel};
use crate::server::room::{
    Admission, Delivery, ReleaseReason, Room, RoomSlot, SessionId, WaitTicket, OUTBOX_CAPACITY,
};
use crate::server::shutdown::Shutdown;
use crate::transport::{Connection, FrameReader, FrameWriter};
use crate::translator::translate;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Handshake,
    Waiting,
    Active,
    Closed,
}

pub(crate) struct Session {
    id: SessionId,
    peer_addr: SocketAddr,
    room: Arc<Room>,
    vocab: Arc<Vocab>,
    reader: FrameReader,
    writer: FrameWriter,
    shutdown: Shutdown,
    send_port_token: bool,
    state: SessionState,
    username: Option<String>,
    /// Returned to the connection limit on drop
    _permit: OwnedSemaphorePermit,
    /// Dropped last so the server knows this session finished
    _shutdown_complete: mpsc::Sender<()>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        connection: Connection,
        room: Arc<Room>,
        vocab: Arc<Vocab>,
        shutdown: Shutdown,
        send_port_token: bool,
        permit: OwnedSemaphorePermit,
        shutdown_complete: mpsc::Sender<()>,
    ) -> Self {
        let peer_addr = connection.peer_addr();
        let (reader, writer) = connection.split();
        Self {
            id: Uuid::new_v4(),
            peer_addr,
            room,
            vocab,
            reader,
            writer,
            shutdown,
            send_port_token,
            state: SessionState::Handshake,
            username: None,
            _permit: permit,
            _shutdown_complete: shutdown_complete,
        }
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    fn dictionary(&self) -> &Dictionary {
        self.vocab.dictionary(self.room.direction())
    }

    fn transition(&mut self, next: SessionState) {
        debug!("session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub(crate) async fn run(mut self) -> Result<()> {
        info!("New connection from {}", self.peer_addr);
        let result = self.handshake().await;
        self.transition(SessionState::Closed);
        let _ = self.writer.shutdown().await;

        let user = self.username.as_deref().unwrap_or("anonymous");
        if self.shutdown.is_shutdown() {
            info!("Connection from {} ({}) closed for server shutdown", self.peer_addr, user);
        } else {
            info!("Connection from {} ({}) closed", self.peer_addr, user);
        }
        result
    }

    async fn handshake(&mut self) -> Result<()> {
        if self.send_port_token {
            self.writer
                .write_line(&port_token(self.peer_addr.port()))
                .await?;
        }

        let (outbox, inbox) = mpsc::channel(OUTBOX_CAPACITY);
        match self.room.admit(self.id, outbox) {
            Admission::Accepted(slot) => {
                self.transition(SessionState::Active);
                self.serve(slot, inbox).await
            }
            Admission::Locked(ticket) => {
                self.writer.write_line(Sentinel::Locked.as_str()).await?;
                match ticket {
                    Some(ticket) => {
                        self.transition(SessionState::Waiting);
                        self.wait(ticket, inbox).await
                    }
                    None => Ok(()),
                }
            }
        }
    }

    /// Park until the room hands over a slot, the peer leaves, or shutdown.
    async fn wait(&mut self, mut ticket: WaitTicket, inbox: mpsc::Receiver<String>) -> Result<()> {
        loop {
            tokio::select! {
                // Shutdown wins over a promotion arriving in the same poll
                biased;

                _ = self.shutdown.recv() => {
                    return self.writer.write_line(Sentinel::ServerShutdown.as_str()).await;
                }
                promoted = ticket.promoted() => {
                    let Some(slot) = promoted else {
                        return Err(RelayError::connection("room closed while waiting"));
                    };
                    info!("Slot handed over, leaving the queue");
                    self.writer.write_line(Sentinel::NotLocked.as_str()).await?;
                    self.transition(SessionState::Active);
                    return self.serve(slot, inbox).await;
                }
                line = self.reader.read_line() => match line {
                    Ok(Some(line)) => debug!("ignoring line from queued client [{:?}]", line),
                    Ok(None) => {
                        info!("Queued client left");
                        self.room.withdraw(ticket);
                        return Ok(());
                    }
                    Err(err) => {
                        self.room.withdraw(ticket);
                        return Err(err);
                    }
                },
            }
        }
    }

    async fn serve(&mut self, slot: RoomSlot, mut inbox: mpsc::Receiver<String>) -> Result<()> {
        let outcome = self.relay(&mut inbox).await;
        let reason = match &outcome {
            Ok(reason) => *reason,
            Err(_) => ReleaseReason::Disconnect,
        };
        if reason == ReleaseReason::Kicked {
            slot.eject();
        } else {
            slot.release(reason);
        }
        outcome.map(|_| ())
    }

    /// Run the active loop until something ends the session
    async fn relay(&mut self, inbox: &mut mpsc::Receiver<String>) -> Result<ReleaseReason> {
        loop {
            tokio::select! {
                line = self.reader.read_line() => {
                    let Some(line) = line? else {
                        return Ok(ReleaseReason::Disconnect);
                    };
                    if let Some(reason) = self.handle_line(&line).await? {
                        return Ok(reason);
                    }
                }
                Some(line) = inbox.recv() => {
                    self.writer.write_line(&line).await?;
                }
                _ = self.shutdown.recv() => {
                    self.writer.write_line(Sentinel::ServerShutdown.as_str()).await?;
                    return Ok(ReleaseReason::Shutdown);
                }
            }
        }
    }

    /// Handle one inbound line; `Some` ends the session
    async fn handle_line(&mut self, line: &str) -> Result<Option<ReleaseReason>> {
        let chat = match Inbound::parse(line) {
            Inbound::Kicked => {
                info!("Client reported an inactivity kick");
                return Ok(Some(ReleaseReason::Kicked));
            }
            Inbound::Chat(chat) => chat,
        };

        if self.username.is_none() {
            if let Some(name) = chat.username() {
                Span::current().record("user", name);
                self.username = Some(name.to_string());
            }
        }

        let rendered = chat.render(&translate(self.dictionary(), chat.phrase));
        match self.room.delivery() {
            Delivery::Echo => self.writer.write_line(&rendered).await?,
            Delivery::Peers => {
                let delivered = self.room.relay_to_peers(self.id, &rendered);
                debug!("relayed to {} peers", delivered);
            }
        }

        if chat.is_exit_command() {
            Ok(Some(ReleaseReason::Exit))
        } else {
            Ok(None)
        }
    }
}
