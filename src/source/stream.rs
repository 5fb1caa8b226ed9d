//! Stream-based transport.
//!
//! Reads newline-delimited JSON snapshots from an async byte stream. This is
//! useful for backends or bridges that expose a plain TCP socket.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tracing::warn;

use super::{Connection, Transport};
use crate::error::ConnectionError;

/// A transport that connects to a TCP endpoint speaking one JSON snapshot
/// per line.
///
/// # Example
///
/// ```
/// use agrowatch::source::{TcpTransport, Transport};
///
/// let transport = TcpTransport::new("localhost:9090");
/// assert_eq!(transport.description(), "tcp: localhost:9090");
/// ```
#[derive(Debug, Clone)]
pub struct TcpTransport {
    addr: String,
    description: String,
}

impl TcpTransport {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            description: format!("tcp: {}", addr),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError> {
        let stream = TcpStream::connect(&self.addr).await?;
        Ok(Box::new(LineConnection::new(stream)))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Longest line accepted as a frame, newline included.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// A connection that yields one frame per non-empty line of an async reader.
///
/// Lines are passed on as raw bytes, so a line that is not valid UTF-8 is
/// rejected by snapshot validation instead of ending the connection. Lines
/// longer than [`MAX_LINE_BYTES`] are skipped.
#[derive(Debug)]
pub struct LineConnection<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
}

impl<R> LineConnection<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: Vec::new(),
        }
    }

    /// Read one line into `self.line`. Returns false at EOF with nothing
    /// read, and `Ok(true)` with an empty buffer for an overlong line.
    async fn read_line(&mut self) -> Result<bool, ConnectionError> {
        self.line.clear();
        let mut overlong = false;
        let mut any = false;

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            any = true;
            let (used, done) = match available.iter().position(|b| *b == b'\n') {
                Some(end) => (end + 1, true),
                None => (available.len(), false),
            };
            if !overlong {
                if self.line.len() + used > MAX_LINE_BYTES {
                    overlong = true;
                    self.line.clear();
                } else {
                    self.line.extend_from_slice(&available[..used]);
                }
            }
            self.reader.consume(used);
            if done {
                break;
            }
        }

        if overlong {
            warn!("Skipping line longer than {} bytes", MAX_LINE_BYTES);
        }
        Ok(any)
    }
}

#[async_trait]
impl<R> Connection for LineConnection<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        loop {
            if !self.read_line().await? {
                // EOF
                return Ok(None);
            }
            let trimmed = self.line.trim_ascii();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_vec()));
            }
        }
    }
}
