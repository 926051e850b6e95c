//! Translating TCP chat relay
//!
//! Clients join a room over plain TCP and send newline-terminated chat lines.
//! Each room translates every line word by word, English to Italian or
//! Italian to English, and sends it back (or on to the other occupants).
//! A room holds a fixed number of clients; the rest wait in a FIFO queue.

pub mod auth;
pub mod client;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod protocol;
pub mod server;
pub mod translator;
pub mod transport;

pub use auth::{Authenticator, FileUserStore, UserProfile};
pub use client::{ChatClient, ChatClientConfig, ClientEvent};
pub use config::{RoomConfig, ServerConfig};
pub use dictionary::{Dictionary, Direction, HashTable, Vocab};
pub use error::{RelayError, Result};
pub use server::{Delivery, RelayServer, Room};
pub use translator::translate;
