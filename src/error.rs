//! Error types for the feed, payload validation and HTTP pulls.
//!
//! None of these are fatal to a running dashboard: connection errors drive
//! the feed into its reconnect cycle, validation errors drop a single frame,
//! and fetch errors move on to the next history provider.

use thiserror::Error;

/// Transport-level failures of the live feed connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The remote end refused or was unreachable.
    #[error("Connection refused: {0}")]
    Refused(String),

    /// The connection opened but the protocol handshake failed.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Reading from an open connection failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The remote end violated the framing protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for ConnectionError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotFound => {
                ConnectionError::Refused(err.to_string())
            }
            _ => ConnectionError::Io(err.to_string()),
        }
    }
}

/// A payload that could not be turned into a sensor snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The payload was not valid JSON.
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// The payload was JSON but not an object.
    #[error("Payload is not a JSON object")]
    NotAnObject,

    /// A sensor group, or a numeric member inside one, is absent.
    #[error("Missing field: {0}")]
    MissingField(String),

    /// A numeric field held something other than a finite number.
    #[error("Field {field} is not a finite number (found {found})")]
    TypeMismatch { field: String, found: String },

    /// The timestamp is present but not a recognisable instant.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Failures of the HTTP pull paths (current reading, history, location).
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The server answered with a non-success status.
    #[error("Server returned status {0}")]
    Status(u16),

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// The response parsed but is not a valid snapshot.
    #[error("Invalid snapshot: {0}")]
    Invalid(#[from] ValidationError),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Connection(err.to_string())
        } else if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else {
            FetchError::Http(err.to_string())
        }
    }
}
