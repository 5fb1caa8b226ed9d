//! Presentation binder.
//!
//! The binder connects the data sources to a [`DisplaySurface`]: it
//! subscribes to the live feed, follows its connection state, pulls history
//! on a timer (or on request), and fetches the current reading once at
//! startup so the display is not empty while the feed connects.
//!
//! All display calls happen on the binder's own task, so a surface never
//! needs to be thread-safe beyond being `Send`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::backend::{HistoryChain, SnapshotProvider};
use crate::data::{HistoryView, Location, SensorSnapshot, SensorThresholds, SensorTiers};
use crate::feed::{ConnectionState, FeedClient, Subscription};
use crate::location::LocationResolver;

/// Default period between history pulls.
pub const DEFAULT_HISTORY_INTERVAL: Duration = Duration::from_secs(10);

/// Delay before retrying the startup fetch of the current reading.
pub const DEFAULT_INITIAL_RETRY: Duration = Duration::from_secs(2);

/// Something that can show the dashboard.
pub trait DisplaySurface: Send {
    /// A new reading. `received` counts live snapshots since startup; the
    /// startup fetch is shown with the count unchanged.
    fn show_snapshot(&mut self, snapshot: &SensorSnapshot, tiers: &SensorTiers, received: u64);

    fn show_history(&mut self, history: &HistoryView);

    fn show_connection_state(&mut self, state: ConnectionState);

    /// Resolved location, or `None` when unavailable.
    fn show_location(&mut self, _location: Option<&Location>) {}
}

/// One display call, as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayUpdate {
    Snapshot {
        snapshot: SensorSnapshot,
        tiers: SensorTiers,
        received: u64,
    },
    History(HistoryView),
    ConnectionState(ConnectionState),
    Location(Option<Location>),
}

impl DisplayUpdate {
    /// Replay this update on a surface.
    pub fn apply_to<D: DisplaySurface + ?Sized>(&self, surface: &mut D) {
        match self {
            DisplayUpdate::Snapshot {
                snapshot,
                tiers,
                received,
            } => surface.show_snapshot(snapshot, tiers, *received),
            DisplayUpdate::History(view) => surface.show_history(view),
            DisplayUpdate::ConnectionState(state) => surface.show_connection_state(*state),
            DisplayUpdate::Location(location) => surface.show_location(location.as_ref()),
        }
    }
}

/// A surface that forwards every call over a channel.
///
/// Used to hand updates from the binder task to a UI loop that owns the
/// terminal.
#[derive(Debug, Clone)]
pub struct ChannelSurface {
    tx: mpsc::UnboundedSender<DisplayUpdate>,
}

impl ChannelSurface {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DisplayUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, update: DisplayUpdate) {
        // The UI has gone away; nothing left to show.
        let _ = self.tx.send(update);
    }
}

impl DisplaySurface for ChannelSurface {
    fn show_snapshot(&mut self, snapshot: &SensorSnapshot, tiers: &SensorTiers, received: u64) {
        self.send(DisplayUpdate::Snapshot {
            snapshot: snapshot.clone(),
            tiers: *tiers,
            received,
        });
    }

    fn show_history(&mut self, history: &HistoryView) {
        self.send(DisplayUpdate::History(history.clone()));
    }

    fn show_connection_state(&mut self, state: ConnectionState) {
        self.send(DisplayUpdate::ConnectionState(state));
    }

    fn show_location(&mut self, location: Option<&Location>) {
        self.send(DisplayUpdate::Location(location.cloned()));
    }
}

/// Binder timing and classification settings.
#[derive(Debug, Clone)]
pub struct BinderConfig {
    pub history_interval: Duration,
    pub initial_retry: Duration,
    pub thresholds: SensorThresholds,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            history_interval: DEFAULT_HISTORY_INTERVAL,
            initial_retry: DEFAULT_INITIAL_RETRY,
            thresholds: SensorThresholds::default(),
        }
    }
}

/// Drives a display surface from the feed and the history providers.
pub struct Binder<D> {
    feed: FeedClient,
    current: Arc<dyn SnapshotProvider>,
    history: HistoryChain,
    location: Option<LocationResolver>,
    config: BinderConfig,
    surface: D,
    subscription: Option<Subscription>,
    snapshots: mpsc::UnboundedReceiver<SensorSnapshot>,
    refresh: Arc<Notify>,
    received: u64,
}

impl<D: DisplaySurface> Binder<D> {
    /// Create a binder and subscribe it to the feed.
    pub fn new(
        feed: FeedClient,
        current: Arc<dyn SnapshotProvider>,
        history: HistoryChain,
        surface: D,
        config: BinderConfig,
    ) -> Self {
        let (tx, snapshots) = mpsc::unbounded_channel();
        let subscription = feed.subscribe(move |snapshot| {
            let _ = tx.send(snapshot.clone());
        });

        Self {
            feed,
            current,
            history,
            location: None,
            config,
            surface,
            subscription: Some(subscription),
            snapshots,
            refresh: Arc::new(Notify::new()),
            received: 0,
        }
    }

    pub fn with_location(mut self, resolver: LocationResolver) -> Self {
        self.location = Some(resolver);
        self
    }

    /// Notifying this handle triggers an immediate history pull.
    pub fn refresh_handle(&self) -> Arc<Notify> {
        self.refresh.clone()
    }

    /// Live snapshots shown so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Run until the feed is stopped, then hand the surface back.
    pub async fn run(mut self) -> D {
        let mut state_rx = self.feed.watch_state();
        let state = *state_rx.borrow_and_update();
        self.surface.show_connection_state(state);

        let mut initial_rx = self.spawn_initial_fetch();
        let mut initial_pending = true;

        let (location_tx, mut location_rx) = oneshot::channel();
        let mut location_pending = match self.location.take() {
            Some(resolver) => {
                tokio::spawn(async move {
                    let _ = location_tx.send(resolver.resolve().await);
                });
                true
            }
            None => false,
        };

        let mut history_tick = tokio::time::interval(self.config.history_interval);
        history_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let (history_tx, mut history_rx) = mpsc::unbounded_channel();
        // At most one history load runs at a time, off the select loop.
        let mut history_task: Option<JoinHandle<()>> = None;

        if state != ConnectionState::Stopped {
            loop {
                tokio::select! {
                    biased;

                    Some(snapshot) = self.snapshots.recv() => {
                        self.received += 1;
                        let tiers = self.config.thresholds.classify(&snapshot);
                        self.surface.show_snapshot(&snapshot, &tiers, self.received);
                    }
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = *state_rx.borrow_and_update();
                        self.surface.show_connection_state(state);
                        if state == ConnectionState::Stopped {
                            break;
                        }
                    }
                    result = &mut initial_rx, if initial_pending => {
                        initial_pending = false;
                        match result {
                            // A live reading already superseded the startup one.
                            Ok(Some(_)) if self.received > 0 => {}
                            Ok(Some(snapshot)) => {
                                let tiers = self.config.thresholds.classify(&snapshot);
                                self.surface.show_snapshot(&snapshot, &tiers, self.received);
                            }
                            Ok(None) | Err(_) => {}
                        }
                    }
                    result = &mut location_rx, if location_pending => {
                        location_pending = false;
                        let location = result.ok().flatten();
                        self.surface.show_location(location.as_ref());
                    }
                    Some(view) = history_rx.recv(), if history_task.is_some() => {
                        history_task = None;
                        self.surface.show_history(&view);
                    }
                    _ = self.refresh.notified() => {
                        debug!("History refresh requested");
                        self.start_history_load(&mut history_task, &history_tx);
                    }
                    _ = history_tick.tick() => {
                        self.start_history_load(&mut history_task, &history_tx);
                    }
                }
            }
        }

        if let Some(task) = history_task.take() {
            task.abort();
        }
        if let Some(subscription) = self.subscription.take() {
            self.feed.unsubscribe(subscription);
        }
        self.surface
    }

    fn start_history_load(
        &self,
        task: &mut Option<JoinHandle<()>>,
        tx: &mpsc::UnboundedSender<HistoryView>,
    ) {
        if task.is_some() {
            debug!("History load still in flight, skipping");
            return;
        }
        let history = self.history.clone();
        let tx = tx.clone();
        *task = Some(tokio::spawn(async move {
            let _ = tx.send(history.load().await);
        }));
    }

    /// Fetch the current reading, retrying once after a delay.
    fn spawn_initial_fetch(&self) -> oneshot::Receiver<Option<SensorSnapshot>> {
        let (tx, rx) = oneshot::channel();
        let provider = self.current.clone();
        let retry = self.config.initial_retry;

        tokio::spawn(async move {
            let snapshot = match provider.fetch_current().await {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    warn!("Initial sensor fetch failed, retrying in {:?}: {}", retry, err);
                    tokio::time::sleep(retry).await;
                    match provider.fetch_current().await {
                        Ok(snapshot) => Some(snapshot),
                        Err(err) => {
                            warn!("Initial sensor fetch failed again: {}", err);
                            None
                        }
                    }
                }
            };
            let _ = tx.send(snapshot);
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HistoryProvider;
    use crate::data::{parse_snapshot, HistoryRecord, Provenance, Tier};
    use crate::error::FetchError;
    use crate::feed::FixedDelay;
    use crate::source::ChannelTransport;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    enum Shown {
        Snapshot { air_quality: f64, received: u64, air_tier: Tier },
        History(String),
        State(ConnectionState),
        Location(Option<String>),
    }

    #[derive(Clone, Default)]
    struct RecordingSurface {
        log: Arc<Mutex<Vec<Shown>>>,
    }

    impl DisplaySurface for RecordingSurface {
        fn show_snapshot(&mut self, snapshot: &SensorSnapshot, tiers: &SensorTiers, received: u64) {
            self.log.lock().push(Shown::Snapshot {
                air_quality: snapshot.air_quality,
                received,
                air_tier: tiers.air_quality,
            });
        }

        fn show_history(&mut self, history: &HistoryView) {
            self.log.lock().push(Shown::History(history.badge().to_string()));
        }

        fn show_connection_state(&mut self, state: ConnectionState) {
            self.log.lock().push(Shown::State(state));
        }

        fn show_location(&mut self, location: Option<&Location>) {
            self.log.lock().push(Shown::Location(location.map(|l| l.label())));
        }
    }

    fn snapshot_json(air_quality: f64) -> serde_json::Value {
        serde_json::json!({
            "mq135": { "value": air_quality },
            "dht22": { "temperature": 24, "humidity": 58 },
            "tds": { "value": 180 },
            "fc28": { "value": 72 },
            "pms5003": { "pm25": 8, "pm10": 15 }
        })
    }

    struct StubCurrent {
        calls: AtomicU32,
        failures: u32,
        air_quality: f64,
    }

    #[async_trait]
    impl SnapshotProvider for StubCurrent {
        async fn fetch_current(&self) -> Result<SensorSnapshot, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(FetchError::Connection("backend down".to_string()));
            }
            Ok(parse_snapshot(&snapshot_json(self.air_quality))?)
        }
    }

    fn current(failures: u32, air_quality: f64) -> Arc<StubCurrent> {
        Arc::new(StubCurrent {
            calls: AtomicU32::new(0),
            failures,
            air_quality,
        })
    }

    #[derive(Debug)]
    struct StubHistory {
        provenance: Provenance,
        count: usize,
        calls: AtomicU32,
    }

    #[async_trait]
    impl HistoryProvider for StubHistory {
        fn provenance(&self) -> Provenance {
            self.provenance
        }

        async fn fetch(&self) -> Result<Vec<HistoryRecord>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![HistoryRecord::default(); self.count])
        }
    }

    fn history(provenance: Provenance, count: usize) -> Arc<StubHistory> {
        Arc::new(StubHistory {
            provenance,
            count,
            calls: AtomicU32::new(0),
        })
    }

    fn chain(providers: Vec<Arc<StubHistory>>) -> HistoryChain {
        HistoryChain::new(
            providers
                .into_iter()
                .map(|p| p as Arc<dyn HistoryProvider>)
                .collect(),
            20,
        )
    }

    #[derive(Debug)]
    struct SlowHistory {
        delay: Duration,
        calls: AtomicU32,
    }

    #[async_trait]
    impl HistoryProvider for SlowHistory {
        fn provenance(&self) -> Provenance {
            Provenance::Sheets
        }

        async fn fetch(&self) -> Result<Vec<HistoryRecord>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(vec![HistoryRecord::default(); 2])
        }
    }

    fn feed(transport: &ChannelTransport) -> FeedClient {
        FeedClient::new(
            Arc::new(transport.clone()),
            Box::new(FixedDelay(Duration::from_secs(3))),
        )
    }

    async fn wait_until(log: &Arc<Mutex<Vec<Shown>>>, pred: impl Fn(&[Shown]) -> bool) {
        for _ in 0..1000 {
            if pred(&log.lock()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached, log: {:?}", log.lock());
    }

    fn snapshots(log: &[Shown]) -> Vec<(f64, u64)> {
        log.iter()
            .filter_map(|s| match s {
                Shown::Snapshot {
                    air_quality,
                    received,
                    ..
                } => Some((*air_quality, *received)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_snapshots_are_counted_and_classified() {
        let transport = ChannelTransport::new("test");
        let frames = transport.accept_next();
        let feed = feed(&transport);
        let surface = RecordingSurface::default();
        let log = surface.log.clone();

        let binder = Binder::new(
            feed.clone(),
            current(0, 42.0),
            chain(vec![history(Provenance::Local, 3)]),
            surface,
            BinderConfig::default(),
        );
        let task = tokio::spawn(binder.run());

        wait_until(&log, |l| snapshots(l) == vec![(42.0, 0)]).await;

        feed.start();
        for v in [250.0, 50.0] {
            frames
                .send(snapshot_json(v).to_string().into_bytes())
                .await
                .unwrap();
        }
        wait_until(&log, |l| snapshots(l).len() == 3).await;

        feed.close();
        let surface = task.await.unwrap();
        let log = surface.log.lock().clone();

        assert_eq!(snapshots(&log), vec![(42.0, 0), (250.0, 1), (50.0, 2)]);
        assert!(log.contains(&Shown::Snapshot {
            air_quality: 250.0,
            received: 1,
            air_tier: Tier::Poor
        }));
        assert_eq!(log.first(), Some(&Shown::State(ConnectionState::Connecting)));
        assert!(log.contains(&Shown::State(ConnectionState::Open)));
        assert_eq!(log.last(), Some(&Shown::State(ConnectionState::Stopped)));
        assert_eq!(feed.stats().accepted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_fetch_is_retried_once() {
        let transport = ChannelTransport::new("test");
        let feed = feed(&transport);
        let provider = current(1, 80.0);
        let surface = RecordingSurface::default();
        let log = surface.log.clone();

        let binder = Binder::new(
            feed.clone(),
            provider.clone(),
            chain(vec![]),
            surface,
            BinderConfig::default(),
        );
        let task = tokio::spawn(binder.run());

        wait_until(&log, |l| snapshots(l) == vec![(80.0, 0)]).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        feed.close();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_fetch_gives_up_after_second_failure() {
        let transport = ChannelTransport::new("test");
        let feed = feed(&transport);
        let provider = current(u32::MAX, 80.0);
        let surface = RecordingSurface::default();
        let log = surface.log.clone();

        let binder = Binder::new(
            feed.clone(),
            provider.clone(),
            chain(vec![]),
            surface,
            BinderConfig::default(),
        );
        let task = tokio::spawn(binder.run());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(snapshots(&log.lock()).is_empty());

        feed.close();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_pulled_on_interval_and_on_request() {
        let transport = ChannelTransport::new("test");
        let feed = feed(&transport);
        let sheets = history(Provenance::Sheets, 0);
        let local = history(Provenance::Local, 4);
        let surface = RecordingSurface::default();
        let log = surface.log.clone();

        let binder = Binder::new(
            feed.clone(),
            current(0, 1.0),
            chain(vec![sheets.clone(), local.clone()]),
            surface,
            BinderConfig::default(),
        );
        let refresh = binder.refresh_handle();
        let task = tokio::spawn(binder.run());

        // First pull happens immediately.
        wait_until(&log, |l| {
            l.contains(&Shown::History("Data from Local Storage".to_string()))
        })
        .await;
        assert_eq!(sheets.calls.load(Ordering::SeqCst), 1);
        assert_eq!(local.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        wait_until(&log, |_| sheets.calls.load(Ordering::SeqCst) == 2).await;

        refresh.notify_one();
        wait_until(&log, |_| sheets.calls.load(Ordering::SeqCst) == 3).await;

        feed.close();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_history_does_not_block_snapshots_or_shutdown() {
        let transport = ChannelTransport::new("test");
        let frames = transport.accept_next();
        let feed = feed(&transport);
        let slow = Arc::new(SlowHistory {
            delay: Duration::from_secs(120),
            calls: AtomicU32::new(0),
        });
        let surface = RecordingSurface::default();
        let log = surface.log.clone();

        let binder = Binder::new(
            feed.clone(),
            current(0, 1.0),
            HistoryChain::new(vec![slow.clone() as Arc<dyn HistoryProvider>], 20),
            surface,
            BinderConfig::default(),
        );
        let refresh = binder.refresh_handle();
        let task = tokio::spawn(binder.run());

        feed.start();
        frames
            .send(snapshot_json(250.0).to_string().into_bytes())
            .await
            .unwrap();
        wait_until(&log, |l| snapshots(l).contains(&(250.0, 1))).await;

        // Ticks and refresh requests while a load is in flight are skipped.
        refresh.notify_one();
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
        assert!(!log.lock().iter().any(|s| matches!(s, Shown::History(_))));

        feed.close();
        let surface = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("binder stopped while history was loading")
            .unwrap();
        assert_eq!(
            surface.log.lock().last(),
            Some(&Shown::State(ConnectionState::Stopped))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_empty_history_shows_no_data() {
        let transport = ChannelTransport::new("test");
        let feed = feed(&transport);
        let surface = RecordingSurface::default();
        let log = surface.log.clone();

        let binder = Binder::new(
            feed.clone(),
            current(0, 1.0),
            chain(vec![history(Provenance::Sheets, 0), history(Provenance::Local, 0)]),
            surface,
            BinderConfig::default(),
        );
        let task = tokio::spawn(binder.run());

        wait_until(&log, |l| {
            l.contains(&Shown::History(HistoryView::NoData.badge().to_string()))
        })
        .await;

        feed.close();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_states_are_shown() {
        let transport = ChannelTransport::new("test");
        transport.refuse_next("down");
        let feed = feed(&transport);
        let surface = RecordingSurface::default();
        let log = surface.log.clone();

        let binder = Binder::new(
            feed.clone(),
            current(0, 1.0),
            chain(vec![]),
            surface,
            BinderConfig::default(),
        );
        let task = tokio::spawn(binder.run());
        feed.start();

        wait_until(&log, |l| l.contains(&Shown::State(ConnectionState::Closed))).await;
        feed.close();
        let surface = task.await.unwrap();

        assert_eq!(
            surface.log.lock().last(),
            Some(&Shown::State(ConnectionState::Stopped))
        );
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test]
    async fn test_unresolved_location_is_shown_as_none() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let transport = ChannelTransport::new("test");
        let feed = feed(&transport);
        let surface = RecordingSurface::default();
        let log = surface.log.clone();

        let resolver = LocationResolver::new(crate::backend::tests::test_client())
            .with_endpoints(&dead, &dead);
        let binder = Binder::new(
            feed.clone(),
            current(0, 1.0),
            chain(vec![]),
            surface,
            BinderConfig::default(),
        )
        .with_location(resolver);
        let task = tokio::spawn(binder.run());

        wait_until(&log, |l| l.contains(&Shown::Location(None))).await;

        feed.close();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_surface_replays_updates() {
        let (mut surface, mut rx) = ChannelSurface::new();
        surface.show_connection_state(ConnectionState::Open);
        surface.show_history(&HistoryView::NoData);

        let mut recorder = RecordingSurface::default();
        while let Ok(update) = rx.try_recv() {
            update.apply_to(&mut recorder);
        }
        assert_eq!(
            *recorder.log.lock(),
            vec![
                Shown::State(ConnectionState::Open),
                Shown::History(HistoryView::NoData.badge().to_string()),
            ]
        );
    }
}
