//! Protocol message types for the relay
//!
//! Control signals travel in-band as reserved literal payloads; everything
//! else is a chat line of the form `"<prefix>: <phrase>"`.

use std::fmt;

/// Prefix of the optional port token sent right after accept
pub const PORT_TOKEN_PREFIX: &str = "PORT:";

/// Phrases that end a session after being echoed
pub const EXIT_COMMANDS: [&str; 2] = ["/ciao", "/exit"];

/// Reserved in-band control payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    /// Server -> client: room is full
    Locked,
    /// Server -> waiting client: a slot was freed
    NotLocked,
    /// Client -> server: client left after inactivity
    Kicked,
    /// Server -> client: server is going down
    ServerShutdown,
}

impl Sentinel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentinel::Locked => "LOCKED",
            Sentinel::NotLocked => "NOT LOCKED",
            Sentinel::Kicked => "KICKED",
            Sentinel::ServerShutdown => "SERVER_SHUTDOWN",
        }
    }

    /// Exact-match a payload against the sentinel vocabulary
    pub fn parse(payload: &str) -> Option<Sentinel> {
        match payload {
            "LOCKED" => Some(Sentinel::Locked),
            "NOT LOCKED" => Some(Sentinel::NotLocked),
            "KICKED" => Some(Sentinel::Kicked),
            "SERVER_SHUTDOWN" => Some(Sentinel::ServerShutdown),
            _ => None,
        }
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `PORT:<n>` handshake line
pub fn port_token(port: u16) -> String {
    format!("{}{}", PORT_TOKEN_PREFIX, port)
}

pub fn parse_port_token(line: &str) -> Option<u16> {
    line.strip_prefix(PORT_TOKEN_PREFIX)?.trim().parse().ok()
}

/// A chat line split at its first `':'`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine<'a> {
    /// Everything before the first `':'`, e.g. `alice (english)`
    pub prefix: Option<&'a str>,
    /// Everything after `": "`
    pub phrase: &'a str,
}

impl<'a> ChatLine<'a> {
    pub fn parse(line: &'a str) -> Self {
        match line.split_once(':') {
            Some((prefix, rest)) => Self {
                prefix: Some(prefix),
                phrase: rest.strip_prefix(' ').unwrap_or(rest),
            },
            None => Self {
                prefix: None,
                phrase: line,
            },
        }
    }

    /// Prefix without a trailing ` (<language>)` tag
    pub fn username(&self) -> Option<&'a str> {
        let prefix = self.prefix?;
        let name = match prefix.rfind(" (") {
            Some(idx) if prefix.ends_with(')') => &prefix[..idx],
            _ => prefix,
        };
        Some(name.trim()).filter(|name| !name.is_empty())
    }

    pub fn is_exit_command(&self) -> bool {
        EXIT_COMMANDS.contains(&self.phrase.trim())
    }

    /// Reattach the original prefix to a (translated) phrase
    pub fn render(&self, phrase: &str) -> String {
        match self.prefix {
            Some(prefix) => format!("{}: {}", prefix, phrase),
            None => phrase.to_string(),
        }
    }
}

/// Classification of one inbound line from a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// Client announced it was kicked for inactivity
    Kicked,
    /// Ordinary chat content
    Chat(ChatLine<'a>),
}

impl<'a> Inbound<'a> {
    pub fn parse(line: &'a str) -> Self {
        if Sentinel::parse(line) == Some(Sentinel::Kicked) {
            Inbound::Kicked
        } else {
            Inbound::Chat(ChatLine::parse(line))
        }
    }
}
