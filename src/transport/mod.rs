//! Transport layer for TCP connections
//!
//! This module provides framed, splittable connections used by both the
//! server sessions and the line-mode client.

pub mod connection;

// Re-export commonly used types
pub use connection::{Connection, FrameReader, FrameWriter};
