//! Channel-based transport.
//!
//! Each connection attempt consumes the next queued outcome: either an
//! accepted connection fed through a tokio mpsc channel, or a refusal. This
//! makes it possible to bridge snapshots from another system (a message bus
//! subscriber, a simulator) into the feed, and to script connection failures.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Connection, Transport};
use crate::error::ConnectionError;

/// Frames buffered per queued connection.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
enum Outcome {
    Accept(mpsc::Receiver<Vec<u8>>),
    Refuse(String),
}

#[derive(Debug, Default)]
struct Script {
    queue: VecDeque<Outcome>,
    attempts: u32,
}

/// A transport whose connections are queued in memory.
///
/// When the queue is empty a connection attempt is refused, so a feed
/// driven by this transport keeps retrying until a new connection is
/// queued.
///
/// # Example
///
/// ```
/// use agrowatch::source::ChannelTransport;
///
/// let transport = ChannelTransport::new("simulator");
/// transport.refuse_next("backend starting");
/// let frames = transport.accept_next();
/// // Dropping `frames` closes the connection.
/// drop(frames);
/// ```
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    script: Arc<Mutex<Script>>,
    description: String,
}

impl ChannelTransport {
    pub fn new(source_description: &str) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            description: format!("channel: {}", source_description),
        }
    }

    /// Queue an accepted connection and return the sender feeding it.
    ///
    /// Dropping every clone of the sender closes the connection.
    pub fn accept_next(&self) -> mpsc::Sender<Vec<u8>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.script.lock().queue.push_back(Outcome::Accept(rx));
        tx
    }

    /// Queue a refused connection attempt.
    pub fn refuse_next(&self, reason: &str) {
        self.script
            .lock()
            .queue
            .push_back(Outcome::Refuse(reason.to_string()));
    }

    /// Number of connection attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.script.lock().attempts
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError> {
        let outcome = {
            let mut script = self.script.lock();
            script.attempts += 1;
            script.queue.pop_front()
        };

        match outcome {
            Some(Outcome::Accept(receiver)) => Ok(Box::new(ChannelConnection { receiver })),
            Some(Outcome::Refuse(reason)) => Err(ConnectionError::Refused(reason)),
            None => Err(ConnectionError::Refused("no connection queued".to_string())),
        }
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[derive(Debug)]
struct ChannelConnection {
    receiver: mpsc::Receiver<Vec<u8>>,
}

#[async_trait]
impl Connection for ChannelConnection {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        Ok(self.receiver.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_outcomes_are_consumed_in_order() {
        let transport = ChannelTransport::new("test");
        transport.refuse_next("first");
        let tx = transport.accept_next();

        match transport.connect().await {
            Err(ConnectionError::Refused(reason)) => assert_eq!(reason, "first"),
            other => panic!("expected refusal, got {:?}", other.map(|_| ())),
        }

        let mut conn = transport.connect().await.unwrap();
        tx.send(b"frame".to_vec()).await.unwrap();
        assert_eq!(conn.next_frame().await.unwrap(), Some(b"frame".to_vec()));

        drop(tx);
        assert_eq!(conn.next_frame().await.unwrap(), None);
        assert_eq!(transport.attempts(), 2);
    }

    #[tokio::test]
    async fn test_empty_queue_refuses() {
        let transport = ChannelTransport::new("test");
        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_err());
        assert_eq!(transport.attempts(), 2);
    }

    #[test]
    fn test_description() {
        let transport = ChannelTransport::new("rabbitmq://localhost");
        assert_eq!(transport.description(), "channel: rabbitmq://localhost");
    }
}
