//! Error handling for the relay server

use std::net::SocketAddr;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay error types
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Socket I/O failure on an established connection
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A room listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Vocabulary could not be loaded
    #[error("Vocabulary error: {0}")]
    Vocab(String),

    /// Malformed inbound frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// User store failure
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Peer closed or answered unexpectedly
    #[error("Connection error: {0}")]
    Connection(String),
}

impl RelayError {
    /// Get error code for this error type
    pub fn code(&self) -> u32 {
        match self {
            RelayError::Io(_) => 1000,
            RelayError::Bind { .. } => 1001,
            RelayError::Config(_) => 1002,
            RelayError::Vocab(_) => 1003,
            RelayError::Protocol(_) => 1004,
            RelayError::Auth(_) => 1005,
            RelayError::Connection(_) => 1006,
        }
    }

    /// Startup errors abort the process; everything else stays inside a session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RelayError::Bind { .. } | RelayError::Config(_) | RelayError::Vocab(_)
        )
    }

    /// Create a bind error
    pub fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        RelayError::Bind { addr, source }
    }

    /// Create a configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        RelayError::Config(msg.into())
    }

    /// Create a vocabulary error
    pub fn vocab<T: Into<String>>(msg: T) -> Self {
        RelayError::Vocab(msg.into())
    }

    /// Create a protocol error
    pub fn protocol<T: Into<String>>(msg: T) -> Self {
        RelayError::Protocol(msg.into())
    }

    /// Create an authentication error
    pub fn auth<T: Into<String>>(msg: T) -> Self {
        RelayError::Auth(msg.into())
    }

    /// Create a connection error
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        RelayError::Connection(msg.into())
    }
}

impl From<toml::de::Error> for RelayError {
    fn from(err: toml::de::Error) -> Self {
        RelayError::Config(format!("TOML error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            RelayError::Io(std::io::Error::other("x")),
            RelayError::bind(
                "127.0.0.1:1".parse().unwrap(),
                std::io::Error::other("x"),
            ),
            RelayError::config("x"),
            RelayError::vocab("x"),
            RelayError::protocol("x"),
            RelayError::auth("x"),
            RelayError::connection("x"),
        ];

        let mut codes: Vec<u32> = errors.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(RelayError::vocab("empty").is_fatal());
        assert!(RelayError::config("bad").is_fatal());
        assert!(!RelayError::protocol("too long").is_fatal());
        assert!(!RelayError::connection("closed").is_fatal());
    }

    #[test]
    fn test_display() {
        let err = RelayError::vocab("no pairs in ./vocab.txt");
        assert_eq!(err.to_string(), "Vocabulary error: no pairs in ./vocab.txt");
    }
}
