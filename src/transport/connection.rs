//! Framed TCP connection
//!
//! A [`Connection`] wraps an accepted or dialed `TcpStream` and splits into a
//! [`FrameReader`] and [`FrameWriter`] so a session can wait for inbound lines
//! while writing outbound ones.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::Result;
use crate::protocol::frame::{encode_line, LineCodec};

/// Framed TCP connection
#[derive(Debug)]
pub struct Connection {
    reader: FrameReader,
    writer: FrameWriter,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Wrap a connected socket
    pub fn new(stream: TcpStream, max_line_length: usize) -> Result<Self> {
        let peer_addr = stream.peer_addr()?;
        let (read, write) = stream.into_split();
        Ok(Self {
            reader: FrameReader {
                stream: read,
                codec: LineCodec::with_max_length(max_line_length),
            },
            writer: FrameWriter {
                stream: BufWriter::new(write),
            },
            peer_addr,
        })
    }

    /// Dial `addr`
    pub async fn connect(addr: SocketAddr, max_line_length: usize) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::new(stream, max_line_length)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub async fn read_line(&mut self) -> Result<Option<String>> {
        self.reader.read_line().await
    }

    pub async fn write_line(&mut self, payload: &str) -> Result<()> {
        self.writer.write_line(payload).await
    }

    pub fn split(self) -> (FrameReader, FrameWriter) {
        (self.reader, self.writer)
    }
}

/// Read half producing decoded lines
#[derive(Debug)]
pub struct FrameReader {
    stream: OwnedReadHalf,
    codec: LineCodec,
}

impl FrameReader {
    /// Read the next line. `Ok(None)` means the peer closed the connection.
    ///
    /// Cancel safe: bytes already read stay buffered in the codec.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = self.codec.decode_next()? {
                debug!("read line [{:?}]", line);
                return Ok(Some(line));
            }

            if 0 == self.stream.read_buf(self.codec.buffer_mut()).await? {
                if self.codec.buffered_len() > 0 {
                    debug!(
                        "peer closed with {} unterminated bytes",
                        self.codec.buffered_len()
                    );
                    self.codec.clear();
                }
                return Ok(None);
            }
        }
    }
}

/// Write half sending one line per call
#[derive(Debug)]
pub struct FrameWriter {
    stream: BufWriter<OwnedWriteHalf>,
}

impl FrameWriter {
    pub async fn write_line(&mut self, payload: &str) -> Result<()> {
        debug!("write line [{:?}]", payload);
        self.stream.write_all(&encode_line(payload)).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Flush and half-close the socket
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
