//! The live feed client.
//!
//! [`FeedClient`] wraps a [`FeedMachine`] and a driver task that performs
//! the I/O the machine asks for: connecting, reading frames and sleeping
//! between reconnect attempts.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::machine::{
    ConnectionState, Effect, FeedEvent, FeedMachine, FeedStats, SnapshotHandler, Subscription,
};
use super::retry::RetryPolicy;
use crate::data::SensorSnapshot;
use crate::source::{Connection, Transport};

struct Shared {
    machine: Mutex<FeedMachine>,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Sender<bool>,
    transport: Arc<dyn Transport>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    /// Apply an event and publish the resulting state.
    ///
    /// Deliveries are run here, after the machine lock is released, so a
    /// handler may call back into the client.
    fn dispatch(&self, event: FeedEvent) -> Effect {
        let (effect, state) = {
            let mut machine = self.machine.lock();
            let effect = machine.dispatch(event);
            (effect, machine.state())
        };

        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });

        match effect {
            Effect::Deliver(delivery) => {
                delivery.run();
                Effect::None
            }
            other => other,
        }
    }

    fn state(&self) -> ConnectionState {
        self.machine.lock().state()
    }
}

/// Client for the backend's push channel.
///
/// Cloning is cheap; all clones share the same connection and subscribers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use agrowatch::feed::{ConnectionState, FeedClient, FixedDelay};
/// use agrowatch::source::ChannelTransport;
///
/// # tokio_test::block_on(async {
/// let transport = ChannelTransport::new("demo");
/// let client = FeedClient::new(Arc::new(transport), Box::new(FixedDelay::default()));
/// let subscription = client.subscribe(|snapshot| println!("{}", snapshot.air_quality));
///
/// client.start();
/// client.unsubscribe(subscription);
/// client.close();
/// assert_eq!(client.current_state(), ConnectionState::Stopped);
/// # });
/// ```
#[derive(Clone)]
pub struct FeedClient {
    shared: Arc<Shared>,
}

impl FeedClient {
    pub fn new(transport: Arc<dyn Transport>, policy: Box<dyn RetryPolicy>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                machine: Mutex::new(FeedMachine::new(policy)),
                state,
                shutdown,
                transport,
                task: Mutex::new(None),
            }),
        }
    }

    /// Spawn the driver task. Calling this more than once has no effect.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut task = self.shared.task.lock();
        if task.is_some() || self.shared.state() == ConnectionState::Stopped {
            return;
        }
        *task = Some(tokio::spawn(drive(self.shared.clone())));
    }

    /// Register a handler for every snapshot accepted from now on.
    ///
    /// Handlers run on the driver task, in subscription order, and should
    /// return quickly.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SensorSnapshot) + Send + Sync + 'static,
    {
        let handler: SnapshotHandler = Arc::new(handler);
        self.shared.machine.lock().subscribe(handler)
    }

    /// Remove a handler. A delivery already in progress may still call it;
    /// it is skipped from the next accepted snapshot on.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.shared.machine.lock().unsubscribe(subscription)
    }

    pub fn current_state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn stats(&self) -> FeedStats {
        self.shared.machine.lock().stats()
    }

    pub fn description(&self) -> &str {
        self.shared.transport.description()
    }

    /// Stop the feed. Any pending reconnect is cancelled and the connection
    /// is dropped; the client cannot be restarted.
    pub fn close(&self) {
        self.shared.dispatch(FeedEvent::StopRequested);
        self.shared.shutdown.send_replace(true);
    }

    /// Wait for the driver task to finish after [`close`](Self::close).
    pub async fn join(&self) {
        let handle = self.shared.task.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                debug!("Feed driver ended abnormally: {}", err);
            }
        }
    }
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("transport", &self.shared.transport)
            .field("machine", &*self.shared.machine.lock())
            .finish()
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // An error means the sender is gone, which also means stop.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Driver loop: carries out effects until the machine halts.
async fn drive(shared: Arc<Shared>) {
    let mut shutdown = shared.shutdown.subscribe();
    let mut next = Effect::Connect;

    loop {
        next = match next {
            Effect::Connect => {
                debug!("Connecting to {}", shared.transport.description());
                let attempt = tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => return,
                    attempt = shared.transport.connect() => attempt,
                };
                match attempt {
                    Ok(connection) => {
                        shared.dispatch(FeedEvent::Connected);
                        if shared.state() != ConnectionState::Open {
                            return;
                        }
                        pump(&shared, connection, &mut shutdown).await
                    }
                    Err(err) => shared.dispatch(FeedEvent::ConnectFailed(err)),
                }
            }
            Effect::ScheduleReconnect(delay) => {
                debug!("Reconnecting in {:?}", delay);
                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                shared.dispatch(FeedEvent::RetryElapsed)
            }
            Effect::Halt | Effect::None | Effect::Deliver(_) => return,
        };
    }
}

/// Read frames from an open connection until it ends.
async fn pump(
    shared: &Shared,
    mut connection: Box<dyn Connection>,
    shutdown: &mut watch::Receiver<bool>,
) -> Effect {
    loop {
        let frame = tokio::select! {
            _ = wait_for_shutdown(shutdown) => return Effect::Halt,
            frame = connection.next_frame() => frame,
        };

        let event = match frame {
            Ok(Some(bytes)) => FeedEvent::FrameReceived(bytes),
            Ok(None) => FeedEvent::ConnectionLost(None),
            Err(err) => FeedEvent::ConnectionLost(Some(err)),
        };
        let ended = !matches!(event, FeedEvent::FrameReceived(_));

        let effect = shared.dispatch(event);
        if ended || shared.state() != ConnectionState::Open {
            return effect;
        }
    }
}
