//! WebSocket transport.
//!
//! The backend pushes each snapshot as one JSON text frame on a WebSocket
//! served from its own host.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{Connection, Transport};
use crate::error::ConnectionError;

/// A transport that opens a WebSocket to the backend.
///
/// # Example
///
/// ```
/// use agrowatch::source::{Transport, WebSocketTransport};
///
/// let transport = WebSocketTransport::new("ws://localhost:5001/");
/// assert_eq!(transport.description(), "ws: ws://localhost:5001/");
/// ```
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
    description: String,
}

impl WebSocketTransport {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            description: format!("ws: {}", url),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(connect_error)?;
        Ok(Box::new(WebSocketConnection { stream }))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        loop {
            match self.stream.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_bytes().to_vec())),
                Some(Ok(Message::Binary(bytes))) => return Ok(Some(bytes.to_vec())),
                Some(Ok(Message::Close(_))) => return Ok(None),
                // Ping/pong are answered by tungstenite itself.
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(read_error(err)),
            }
        }
    }
}

fn connect_error(err: tungstenite::Error) -> ConnectionError {
    match err {
        tungstenite::Error::Io(io) => ConnectionError::from(io),
        tungstenite::Error::Url(url) => ConnectionError::Refused(url.to_string()),
        other => ConnectionError::Handshake(other.to_string()),
    }
}

fn read_error(err: tungstenite::Error) -> ConnectionError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            ConnectionError::Io("connection closed".to_string())
        }
        tungstenite::Error::Io(io) => ConnectionError::Io(io.to_string()),
        other => ConnectionError::Protocol(other.to_string()),
    }
}
