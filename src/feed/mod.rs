//! Live feed: a persistent, self-healing connection to the backend's push
//! channel that fans validated snapshots out to subscribers.

mod client;
mod machine;
mod retry;

pub use client::FeedClient;
pub use machine::{
    ConnectionState, Delivery, Effect, FeedEvent, FeedMachine, FeedStats, SnapshotHandler,
    Subscription, SubscriptionId,
};
pub use retry::{ExponentialBackoff, FixedDelay, RetryPolicy, DEFAULT_RECONNECT_DELAY};
