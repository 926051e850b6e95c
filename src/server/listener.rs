//! Room listeners and server lifecycle
//!
//! Each room gets its own `TcpListener` and accept loop. All loops share one
//! connection limit and one shutdown broadcast; [`RelayServer::run`] returns
//! only after every spawned session has finished.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, error, field, info, info_span, warn, Instrument};

use crate::config::ServerConfig;
use crate::dictionary::Vocab;
use crate::error::{RelayError, Result};
use crate::server::room::Room;
use crate::server::session::Session;
use crate::server::shutdown::Shutdown;
use crate::transport::Connection;

/// Longest accept backoff before a room listener gives up, in seconds
const MAX_ACCEPT_BACKOFF: u64 = 64;

/// Accept loop for one room
#[derive(Debug)]
struct Listener {
    listener: TcpListener,
    room: Arc<Room>,
    vocab: Arc<Vocab>,
    notify_shutdown: broadcast::Sender<()>,
    limit_connections: Arc<Semaphore>,
    shutdown_complete_tx: mpsc::Sender<()>,
    send_port_token: bool,
    max_line_length: usize,
}

impl Listener {
    async fn run(&mut self) -> Result<()> {
        loop {
            let permit = Arc::clone(&self.limit_connections)
                .acquire_owned()
                .await
                .map_err(|_| RelayError::connection("connection limit closed"))?;

            let socket = self.accept().await?;
            let connection = match Connection::new(socket, self.max_line_length) {
                Ok(connection) => connection,
                Err(err) => {
                    warn!(cause = %err, "dropping connection before handshake");
                    continue;
                }
            };
            let peer_addr = connection.peer_addr();

            let session = Session::new(
                connection,
                Arc::clone(&self.room),
                Arc::clone(&self.vocab),
                Shutdown::new(self.notify_shutdown.subscribe()),
                self.send_port_token,
                permit,
                self.shutdown_complete_tx.clone(),
            );
            let span = info_span!(
                "session",
                id = %session.id(),
                room = %self.room.name(),
                peer = %peer_addr,
                user = field::Empty,
            );

            tokio::spawn(
                async move {
                    if let Err(err) = session.run().await {
                        error!(cause = %err, code = err.code(), "session error");
                    }
                }
                .instrument(span),
            );
        }
    }

    /// Accept one socket. Transient errors retry at once; anything else backs
    /// off exponentially and gives up after [`MAX_ACCEPT_BACKOFF`].
    async fn accept(&mut self) -> Result<TcpStream> {
        let mut backoff = 1;
        loop {
            match self.listener.accept().await {
                Ok((socket, _)) => return Ok(socket),
                Err(err) if is_transient(&err) => {
                    debug!(cause = %err, "transient accept error");
                    continue;
                }
                Err(err) => {
                    if backoff > MAX_ACCEPT_BACKOFF {
                        return Err(err.into());
                    }
                    warn!(cause = %err, "accept failed, retrying in {}s", backoff);
                }
            }
            time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::WouldBlock
    )
}

/// The relay server: one bound listener per configured room
#[derive(Debug)]
pub struct RelayServer {
    config: ServerConfig,
    vocab: Arc<Vocab>,
    rooms: Vec<(Arc<Room>, TcpListener, SocketAddr)>,
}

impl RelayServer {
    /// Validate `config` and bind every room listener. Any failure aborts startup.
    pub async fn bind(config: ServerConfig, vocab: Arc<Vocab>) -> Result<Self> {
        config.validate()?;

        let mut rooms = Vec::with_capacity(config.rooms.len());
        for room_config in &config.rooms {
            let listener = TcpListener::bind(room_config.bind_addr)
                .await
                .map_err(|e| RelayError::bind(room_config.bind_addr, e))?;
            let local_addr = listener
                .local_addr()
                .map_err(|e| RelayError::bind(room_config.bind_addr, e))?;

            let room = Arc::new(Room::new(
                room_config.name.clone(),
                room_config.direction,
                room_config.capacity,
                config.waiting_queue_capacity,
                config.delivery,
            ));
            info!(
                "Room '{}' ({}, capacity {}) listening on {}",
                room.name(),
                room.direction(),
                room.capacity(),
                local_addr
            );
            rooms.push((room, listener, local_addr));
        }

        Ok(Self {
            config,
            vocab,
            rooms,
        })
    }

    /// Bound addresses, in room order
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.rooms.iter().map(|(_, _, addr)| *addr).collect()
    }

    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.iter().map(|(room, _, _)| Arc::clone(room)).collect()
    }

    /// Serve until `shutdown` resolves, then tell every session and wait for them.
    pub async fn run(self, shutdown: impl Future) -> Result<()> {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel(1);
        let limit_connections = Arc::new(Semaphore::new(self.config.max_connections));

        let mut accept_loops = JoinSet::new();
        for (room, listener, _) in self.rooms {
            let mut listener = Listener {
                listener,
                room,
                vocab: Arc::clone(&self.vocab),
                notify_shutdown: notify_shutdown.clone(),
                limit_connections: Arc::clone(&limit_connections),
                shutdown_complete_tx: shutdown_complete_tx.clone(),
                send_port_token: self.config.send_port_token,
                max_line_length: self.config.max_line_length,
            };
            accept_loops.spawn(async move {
                let name = listener.room.name().to_string();
                if let Err(err) = listener.run().await {
                    error!(cause = %err, "room '{}' stopped accepting", name);
                }
            });
        }

        tokio::select! {
            _ = async {
                while accept_loops.join_next().await.is_some() {}
            } => {
                warn!("All room listeners stopped");
            }
            _ = shutdown => {
                info!("Server shutting down");
            }
        }

        // Stop accepting before notifying, so no session subscribes late
        accept_loops.shutdown().await;
        let _ = notify_shutdown.send(());
        drop(notify_shutdown);
        drop(shutdown_complete_tx);

        // Resolves once every session has dropped its sender
        let _ = shutdown_complete_rx.recv().await;
        info!("Server shutdown complete");
        Ok(())
    }
}
