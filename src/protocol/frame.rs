//! Newline-delimited text framing
//!
//! Frame format:
//! ```text
//! +---------------------------+------+
//! | UTF-8 payload (no '\n')   | '\n' |
//! +---------------------------+------+
//! ```
//!
//! A `\r` right before the terminator is dropped on decode, so `\r\n`
//! peers interoperate.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{RelayError, Result};

/// Line terminator
pub const LINE_DELIMITER: u8 = b'\n';

/// Default maximum payload length of one line (bytes, excluding terminator)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// Encode a payload as one frame into `buf`
pub fn encode_into(payload: &str, buf: &mut BytesMut) {
    buf.reserve(payload.len() + 1);
    buf.put_slice(payload.as_bytes());
    buf.put_u8(LINE_DELIMITER);
}

/// Encode a payload as one frame
pub fn encode_line(payload: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 1);
    encode_into(payload, &mut buf);
    buf.freeze()
}

/// Streaming line decoder
#[derive(Debug)]
pub struct LineCodec {
    buffer: BytesMut,
    max_line_length: usize,
}

impl LineCodec {
    /// Create a new codec with the default line limit
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a new codec with a custom line limit
    pub fn with_max_length(max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_line_length,
        }
    }

    /// Feed data into the codec
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Buffer for `AsyncReadExt::read_buf`
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Try to decode the next line. `Ok(None)` means more data is needed.
    pub fn decode_next(&mut self) -> Result<Option<String>> {
        let Some(pos) = self.buffer.iter().position(|&b| b == LINE_DELIMITER) else {
            if self.buffer.len() > self.max_line_length {
                return Err(RelayError::protocol(format!(
                    "line exceeds {} bytes without terminator",
                    self.max_line_length
                )));
            }
            return Ok(None);
        };

        let mut line = self.buffer.split_to(pos);
        self.buffer.advance(1);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }

        if line.len() > self.max_line_length {
            return Err(RelayError::protocol(format!(
                "line of {} bytes exceeds limit of {}",
                line.len(),
                self.max_line_length
            )));
        }

        String::from_utf8(line.to_vec())
            .map(Some)
            .map_err(|e| RelayError::protocol(format!("invalid UTF-8: {}", e)))
    }

    /// Get the current buffer length
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}
