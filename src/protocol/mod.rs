//! Protocol layer for the relay
//!
//! This module provides:
//! - Newline-delimited line framing
//! - Sentinel strings, the port token, and chat line parsing

pub mod frame;
pub mod messages;

// Re-export commonly used types
pub use frame::{encode_line, LineCodec, DEFAULT_MAX_LINE_LENGTH};
pub use messages::{parse_port_token, port_token, ChatLine, Inbound, Sentinel};
