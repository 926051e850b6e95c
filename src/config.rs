//! Server configuration
//!
//! Every field has a default, so an empty TOML file (or no file at all)
//! reproduces the stock two-room deployment.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dictionary::Direction;
use crate::error::{RelayError, Result};
use crate::protocol::DEFAULT_MAX_LINE_LENGTH;
use crate::server::room::Delivery;
use crate::server::waiting_queue::DEFAULT_QUEUE_CAPACITY;

/// Default process-wide connection limit
pub const DEFAULT_MAX_CONNECTIONS: usize = 250;

/// One room: a listening address bound to a translation direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    pub name: String,
    pub direction: Direction,
    pub bind_addr: SocketAddr,
    #[serde(default = "default_room_capacity")]
    pub capacity: usize,
}

impl RoomConfig {
    pub fn new(name: impl Into<String>, direction: Direction, bind_addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            direction,
            bind_addr,
            capacity: default_room_capacity(),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

fn default_room_capacity() -> usize {
    1
}

/// Relay server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub rooms: Vec<RoomConfig>,
    pub vocab_path: PathBuf,
    pub waiting_queue_capacity: usize,
    /// Concurrent sessions across all rooms, waiting ones included
    pub max_connections: usize,
    pub delivery: Delivery,
    /// Send `PORT:<n>` right after accept
    pub send_port_token: bool,
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rooms: vec![
                RoomConfig::new(
                    "english-italian",
                    Direction::EnglishToItalian,
                    SocketAddr::from(([0, 0, 0, 0], 8080)),
                ),
                RoomConfig::new(
                    "italian-english",
                    Direction::ItalianToEnglish,
                    SocketAddr::from(([0, 0, 0, 0], 6969)),
                ),
            ],
            vocab_path: PathBuf::from("vocab.txt"),
            waiting_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            delivery: Delivery::default(),
            send_port_token: true,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = std::fs::read_to_string(path).map_err(|e| {
            RelayError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// First room translating in `direction`
    pub fn room_mut(&mut self, direction: Direction) -> Option<&mut RoomConfig> {
        self.rooms.iter_mut().find(|room| room.direction == direction)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rooms.is_empty() {
            return Err(RelayError::config("at least one room is required"));
        }

        let mut addrs = HashSet::new();
        for room in &self.rooms {
            if room.capacity == 0 {
                return Err(RelayError::config(format!(
                    "room '{}' must have a capacity of at least 1",
                    room.name
                )));
            }
            // Port 0 asks the OS for a fresh port, so it never collides
            if room.bind_addr.port() != 0 && !addrs.insert(room.bind_addr) {
                return Err(RelayError::config(format!(
                    "room '{}' reuses bind address {}",
                    room.name, room.bind_addr
                )));
            }
        }

        if self.waiting_queue_capacity == 0 {
            return Err(RelayError::config(
                "waiting_queue_capacity must be at least 1",
            ));
        }
        if self.max_connections == 0 {
            return Err(RelayError::config("max_connections must be at least 1"));
        }
        if self.max_line_length == 0 {
            return Err(RelayError::config("max_line_length must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.rooms.len(), 2);
        assert_eq!(config.rooms[0].bind_addr.port(), 8080);
        assert_eq!(config.rooms[0].direction, Direction::EnglishToItalian);
        assert_eq!(config.rooms[1].bind_addr.port(), 6969);
        assert_eq!(config.rooms[1].direction, Direction::ItalianToEnglish);
        assert!(config.rooms.iter().all(|room| room.capacity == 1));
        assert_eq!(config.waiting_queue_capacity, 50);
        assert_eq!(config.delivery, Delivery::Echo);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(ServerConfig::from_toml("").unwrap(), ServerConfig::default());
    }

    #[test]
    fn test_toml_overrides() {
        let config = ServerConfig::from_toml(
            r#"
            vocab_path = "/etc/parlo/vocab.txt"
            delivery = "peers"
            waiting_queue_capacity = 5

            [[rooms]]
            name = "lobby"
            direction = "italian_to_english"
            bind_addr = "127.0.0.1:7000"
            capacity = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.vocab_path, PathBuf::from("/etc/parlo/vocab.txt"));
        assert_eq!(config.delivery, Delivery::Peers);
        assert_eq!(config.waiting_queue_capacity, 5);
        assert_eq!(config.rooms.len(), 1);
        assert_eq!(config.rooms[0].capacity, 3);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert!(config.send_port_token);
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let config = ServerConfig::from_toml(include_str!("../parlo.toml")).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_room_capacity_defaults_to_one() {
        let config = ServerConfig::from_toml(
            r#"
            [[rooms]]
            name = "solo"
            direction = "english_to_italian"
            bind_addr = "127.0.0.1:7001"
            "#,
        )
        .unwrap();
        assert_eq!(config.rooms[0].capacity, 1);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_connections = 10").unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.max_connections, 10);
        assert_eq!(ServerConfig::load(None).unwrap(), ServerConfig::default());
    }

    #[test]
    fn test_load_errors_are_config_errors() {
        let err = ServerConfig::load(Some(Path::new("/nonexistent/parlo.toml"))).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));

        let err = ServerConfig::from_toml("delivery = \"broadcast\"").unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_rooms() {
        let mut config = ServerConfig::default();
        config.rooms[0].capacity = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.rooms[1].bind_addr = config.rooms[0].bind_addr;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        for room in &mut config.rooms {
            room.bind_addr = SocketAddr::from(([127, 0, 0, 1], 0));
        }
        config.validate().unwrap();

        let mut config = ServerConfig::default();
        config.rooms.clear();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.waiting_queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_room_mut_by_direction() {
        let mut config = ServerConfig::default();
        config
            .room_mut(Direction::ItalianToEnglish)
            .unwrap()
            .capacity = 4;
        assert_eq!(config.rooms[1].capacity, 4);
    }
}
