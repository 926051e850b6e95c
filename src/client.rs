//! Line-mode relay client
//!
//! [`ChatClient`] speaks the relay protocol over one TCP connection.
//! [`run_line_mode`] drives it from stdin: it waits while the room is
//! locked, starts chatting once the server hands it a slot, and reports an
//! inactivity kick.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time;
use tracing::{debug, info};

use crate::auth::UserProfile;
use crate::error::{RelayError, Result};
use crate::protocol::messages::{parse_port_token, Sentinel, EXIT_COMMANDS};
use crate::protocol::DEFAULT_MAX_LINE_LENGTH;
use crate::transport::{Connection, FrameReader, FrameWriter};

/// Chat client configuration
#[derive(Clone, Debug)]
pub struct ChatClientConfig {
    /// Room address to connect to
    pub server_addr: SocketAddr,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Server sends `PORT:<n>` first
    pub expect_port_token: bool,
    pub max_line_length: usize,
    /// Idle time before the client leaves with `KICKED`
    pub inactivity_timeout: Duration,
}

impl ChatClientConfig {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            connect_timeout_secs: 10,
            expect_port_token: true,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            inactivity_timeout: Duration::from_secs(10),
        }
    }
}

/// Something the server sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A translated chat line
    Message(String),
    /// Room is full, we are queued
    Locked,
    /// A slot was handed to this connection, chat may start
    NotLocked,
    ServerShutdown,
    /// Server closed the connection
    Disconnected,
}

/// One connection to one room
#[derive(Debug)]
pub struct ChatClient {
    reader: FrameReader,
    writer: FrameWriter,
    local_port: Option<u16>,
}

impl ChatClient {
    /// Connect and consume the port token if the server sends one
    pub async fn connect(config: &ChatClientConfig) -> Result<Self> {
        debug!("Connecting to {}", config.server_addr);
        let timeout = Duration::from_secs(config.connect_timeout_secs);

        let connection = time::timeout(
            timeout,
            Connection::connect(config.server_addr, config.max_line_length),
        )
        .await
        .map_err(|_| RelayError::connection("connection timeout"))??;
        let (mut reader, writer) = connection.split();

        let local_port = if config.expect_port_token {
            let line = time::timeout(timeout, reader.read_line())
                .await
                .map_err(|_| RelayError::connection("timed out waiting for port token"))??
                .ok_or_else(|| RelayError::connection("closed before sending port token"))?;
            let port = parse_port_token(&line).ok_or_else(|| {
                RelayError::protocol(format!("expected port token, got {:?}", line))
            })?;
            Some(port)
        } else {
            None
        };

        info!("Connected to {}", config.server_addr);
        Ok(Self {
            reader,
            writer,
            local_port,
        })
    }

    /// Port the server reported for this connection
    pub fn local_port(&self) -> Option<u16> {
        self.local_port
    }

    /// Send `"<user> (<language>): <text>"`
    pub async fn send_chat(&mut self, profile: &UserProfile, text: &str) -> Result<()> {
        let line = format!("{}: {}", profile.chat_prefix(), text);
        self.writer.write_line(&line).await
    }

    pub async fn send_raw(&mut self, line: &str) -> Result<()> {
        self.writer.write_line(line).await
    }

    pub async fn send_sentinel(&mut self, sentinel: Sentinel) -> Result<()> {
        self.writer.write_line(sentinel.as_str()).await
    }

    /// Next event from the server. Cancel safe.
    pub async fn recv(&mut self) -> Result<ClientEvent> {
        let Some(line) = self.reader.read_line().await? else {
            return Ok(ClientEvent::Disconnected);
        };
        let event = match Sentinel::parse(&line) {
            Some(Sentinel::Locked) => ClientEvent::Locked,
            Some(Sentinel::NotLocked) => ClientEvent::NotLocked,
            Some(Sentinel::ServerShutdown) => ClientEvent::ServerShutdown,
            Some(Sentinel::Kicked) | None => ClientEvent::Message(line),
        };
        Ok(event)
    }

    pub async fn close(mut self) -> Result<()> {
        self.writer.shutdown().await
    }
}

/// Chat from stdin until the user leaves, is kicked, or the server goes away
pub async fn run_line_mode(config: ChatClientConfig, profile: UserProfile) -> Result<()> {
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let mut client = ChatClient::connect(&config).await?;
    println!(
        "Joined {} as {}. Type /ciao or /exit to leave.",
        config.server_addr,
        profile.chat_prefix()
    );

    let result = chat(&mut client, &profile, &mut input, config.inactivity_timeout).await;
    let _ = client.close().await;
    result
}

async fn chat<R>(
    client: &mut ChatClient,
    profile: &UserProfile,
    input: &mut tokio::io::Lines<R>,
    inactivity_timeout: Duration,
) -> Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let idle = time::sleep(inactivity_timeout);
    tokio::pin!(idle);
    let mut queued = false;
    let mut leaving = false;

    loop {
        tokio::select! {
            event = client.recv() => match event? {
                ClientEvent::Message(line) => println!("{}", line),
                ClientEvent::Locked => {
                    println!("The room is full. You are in the queue, wait for your turn...");
                    queued = true;
                }
                ClientEvent::NotLocked => {
                    println!("A place is free, you are in the room now.");
                    queued = false;
                    idle.as_mut().reset(time::Instant::now() + inactivity_timeout);
                }
                ClientEvent::ServerShutdown => {
                    println!("The server is shutting down.");
                    return Ok(());
                }
                ClientEvent::Disconnected => {
                    if !leaving {
                        println!("Server disconnected.");
                    }
                    return Ok(());
                }
            },
            line = input.next_line(), if !queued && !leaving => {
                let Some(text) = line? else {
                    return Ok(());
                };
                if text.trim().is_empty() {
                    continue;
                }
                client.send_chat(profile, &text).await?;
                idle.as_mut().reset(time::Instant::now() + inactivity_timeout);
                if EXIT_COMMANDS.contains(&text.trim()) {
                    println!("Leaving the room...");
                    leaving = true;
                }
            }
            _ = &mut idle, if !queued && !leaving => {
                println!("You have been kicked from the room due to inactivity.");
                return client.send_sentinel(Sentinel::Kicked).await;
            }
        }
    }
}
