//! Transport abstraction for the live feed's push channel.
//!
//! A [`Transport`] knows how to open a connection to the backend; the
//! resulting [`Connection`] yields raw frames until the remote end goes away.
//! The feed client treats every transport the same way, so the reconnect
//! logic never depends on the wire protocol.
//!
//! Implementations:
//!
//! - [`WebSocketTransport`]: JSON text frames over a WebSocket
//! - [`TcpTransport`]: newline-delimited JSON over TCP
//! - [`ChannelTransport`]: in-memory frames, for bridging another source or
//!   scripting connection failures

mod channel;
mod stream;
mod websocket;

pub use channel::ChannelTransport;
pub use stream::{LineConnection, TcpTransport};
pub use websocket::WebSocketTransport;

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::ConnectionError;

/// Opens connections to the backend's push channel.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Attempt one connection.
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError>;

    /// Returns a human-readable description of the endpoint.
    ///
    /// Used for display in the TUI status bar.
    fn description(&self) -> &str;
}

/// An open push channel.
#[async_trait]
pub trait Connection: Send {
    /// Wait for the next frame.
    ///
    /// Returns `Ok(None)` when the remote end closed the connection in an
    /// orderly way.
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ConnectionError>;
}
