//! Connection state machine of the live feed.
//!
//! [`FeedMachine`] owns the connection state and the subscriber list but does
//! no I/O. The driver task feeds it [`FeedEvent`]s through
//! [`FeedMachine::dispatch`] and carries out the [`Effect`] it returns, which
//! keeps every transition testable without a socket.
//!
//! ```text
//!             Connected                 ConnectionLost
//! Connecting ───────────▶ Open ─────────────────────────┐
//!     ▲  │                                              ▼
//!     │  └──────── ConnectFailed ─────────────────▶ Closed
//!     │                                               │
//!     └──────────────── RetryElapsed ─────────────────┘
//!
//! StopRequested (any state) ──▶ Stopped (terminal)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use crate::data::{parse_snapshot_bytes, SensorSnapshot};
use crate::error::ConnectionError;

/// Lifecycle of the feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// A connection attempt is in flight.
    Connecting,
    /// Connected; frames are being delivered.
    Open,
    /// Disconnected; a reconnect is scheduled.
    Closed,
    /// Deliberately closed. No further reconnects happen.
    Stopped,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "connected",
            ConnectionState::Closed => "disconnected",
            ConnectionState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Callback invoked with every accepted snapshot.
pub type SnapshotHandler = Arc<dyn Fn(&SensorSnapshot) + Send + Sync>;

/// Identifies one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Token returned by `subscribe`, consumed by `unsubscribe`.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a Subscription leaves the handler registered with no way to remove it"]
pub struct Subscription {
    id: SubscriptionId,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

/// Inputs to the state machine.
#[derive(Debug)]
pub enum FeedEvent {
    /// The transport finished its handshake.
    Connected,
    /// The connection attempt failed.
    ConnectFailed(ConnectionError),
    /// A raw frame arrived on the open connection.
    FrameReceived(Vec<u8>),
    /// The open connection ended; `None` for an orderly close.
    ConnectionLost(Option<ConnectionError>),
    /// The reconnect delay has passed.
    RetryElapsed,
    /// The owner is shutting the feed down.
    StopRequested,
}

/// A snapshot together with the handlers it must be handed to, in
/// subscription order.
pub struct Delivery {
    pub snapshot: Arc<SensorSnapshot>,
    pub handlers: Vec<SnapshotHandler>,
}

impl Delivery {
    /// Invoke every handler in order.
    pub fn run(self) {
        for handler in &self.handlers {
            handler(&self.snapshot);
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("snapshot", &self.snapshot)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// What the driver must do after a transition.
#[derive(Debug)]
pub enum Effect {
    /// Nothing to do.
    None,
    /// Hand a snapshot to subscribers.
    Deliver(Delivery),
    /// Start a connection attempt.
    Connect,
    /// Wait, then report [`FeedEvent::RetryElapsed`].
    ScheduleReconnect(Duration),
    /// Stop driving; the feed is closed.
    Halt,
}

/// Counters kept by the feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Frames parsed and delivered.
    pub accepted: u64,
    /// Frames dropped because they failed validation.
    pub rejected: u64,
    /// Successful connections.
    pub connections: u64,
    /// Reconnect attempts started after a close.
    pub reconnects: u64,
}

/// The feed's state, subscribers and retry bookkeeping.
pub struct FeedMachine {
    state: ConnectionState,
    subscribers: Vec<(SubscriptionId, SnapshotHandler)>,
    next_id: u64,
    policy: Box<dyn RetryPolicy>,
    failures: u32,
    stats: FeedStats,
}

struct HandlerList<'a>(&'a [(SubscriptionId, SnapshotHandler)]);

impl fmt::Debug for HandlerList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter().map(|(id, _)| id)).finish()
    }
}

impl FeedMachine {
    /// A machine in the initial `Connecting` state.
    pub fn new(policy: Box<dyn RetryPolicy>) -> Self {
        Self {
            state: ConnectionState::Connecting,
            subscribers: Vec::new(),
            next_id: 0,
            policy,
            failures: 0,
            stats: FeedStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Register a handler; it receives every snapshot accepted from now on.
    pub fn subscribe(&mut self, handler: SnapshotHandler) -> Subscription {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, handler));
        Subscription { id }
    }

    /// Remove a handler. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(id, _)| *id != subscription.id);
        self.subscribers.len() != before
    }

    /// Apply one event and return what the driver must do next.
    pub fn dispatch(&mut self, event: FeedEvent) -> Effect {
        use ConnectionState::*;

        match (self.state, event) {
            (Stopped, event) => {
                debug!("Feed stopped, ignoring {:?}", event);
                Effect::None
            }
            (_, FeedEvent::StopRequested) => {
                info!("Feed stopped");
                self.state = Stopped;
                Effect::Halt
            }
            (Connecting, FeedEvent::Connected) => {
                info!("Feed connected");
                self.state = Open;
                self.failures = 0;
                self.stats.connections += 1;
                Effect::None
            }
            (Connecting, FeedEvent::ConnectFailed(err)) => {
                warn!("Feed connection failed: {}", err);
                self.enter_closed()
            }
            (Open, FeedEvent::FrameReceived(bytes)) => match parse_snapshot_bytes(&bytes) {
                Ok(snapshot) => {
                    self.stats.accepted += 1;
                    Effect::Deliver(Delivery {
                        snapshot: Arc::new(snapshot),
                        handlers: self.subscribers.iter().map(|(_, h)| h.clone()).collect(),
                    })
                }
                Err(err) => {
                    self.stats.rejected += 1;
                    debug!("Dropping invalid frame: {}", err);
                    Effect::None
                }
            },
            (Open, FeedEvent::ConnectionLost(reason)) => {
                match reason {
                    Some(err) => warn!("Feed connection lost: {}", err),
                    None => info!("Feed connection closed by remote"),
                }
                self.enter_closed()
            }
            (Closed, FeedEvent::RetryElapsed) => {
                debug!("Reconnecting (attempt after {} failures)", self.failures);
                self.state = Connecting;
                self.stats.reconnects += 1;
                Effect::Connect
            }
            (state, event) => {
                debug!("Ignoring {:?} in state {:?}", event, state);
                Effect::None
            }
        }
    }

    fn enter_closed(&mut self) -> Effect {
        self.state = ConnectionState::Closed;
        self.failures = self.failures.saturating_add(1);
        Effect::ScheduleReconnect(self.policy.delay(self.failures))
    }
}

impl fmt::Debug for FeedMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedMachine")
            .field("state", &self.state)
            .field("subscribers", &HandlerList(&self.subscribers))
            .field("policy", &self.policy)
            .field("failures", &self.failures)
            .field("stats", &self.stats)
            .finish()
    }
}
