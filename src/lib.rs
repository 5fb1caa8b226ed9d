//! # agrowatch
//!
//! A live terminal dashboard and library for agriculture and environmental
//! sensor telemetry.
//!
//! A backend pushes sensor snapshots (air quality, temperature, humidity,
//! particulate matter, tank level, water quality) over a WebSocket and
//! serves recent history over HTTP. This crate keeps a resilient
//! subscription to the push channel, validates and classifies every
//! reading into severity tiers, pulls history periodically, and renders the
//! result in an interactive terminal UI or as log lines.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ source (Transport) ──▶ feed (FeedClient) ──┐                     │
//! │                                            ▼                     │
//! │ backend (HTTP) ──────────────────────▶ binder ──▶ DisplaySurface │
//! │ location (geocoding) ──────────────────────┘      │              │
//! │                                          ┌────────┴────────┐     │
//! │                                          ▼                 ▼     │
//! │                                    app + ui (TUI)   headless     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`source`]**: Push channel transports ([`Transport`] trait) for
//!   WebSocket, TCP and in-memory channels
//! - **[`feed`]**: The live feed client: connection state machine,
//!   subscribers, reconnect policy
//! - **[`data`]**: Snapshot validation, threshold classification, history
//!   shaping and trend buffers
//! - **[`backend`]**: HTTP client for the current reading and the history
//!   provider chain
//! - **[`binder`]**: Wires the feed and the backend to a display surface
//! - **[`app`]**, **[`ui`]**, **[`events`]**: The terminal dashboard
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Dashboard against a local backend
//! agrowatch --backend http://localhost:5001
//!
//! # Log readings instead of drawing
//! agrowatch --headless
//!
//! # Snapshot the current reading and history to a file
//! agrowatch --export state.json
//! ```
//!
//! ### Classifying a reading
//!
//! ```
//! use agrowatch::{parse_snapshot, SensorThresholds, Tier};
//!
//! let raw = serde_json::json!({
//!     "mq135": { "value": 250 },
//!     "dht22": { "temperature": 24.5, "humidity": 58 },
//!     "tds": { "value": 180 },
//!     "fc28": { "value": 72 },
//!     "pms5003": { "pm25": 8, "pm10": 15 }
//! });
//! let snapshot = parse_snapshot(&raw).unwrap();
//! let tiers = SensorThresholds::default().classify(&snapshot);
//! assert_eq!(tiers.air_quality, Tier::Poor);
//! ```
//!
//! ### Subscribing to a live feed
//!
//! ```no_run
//! use std::sync::Arc;
//! use agrowatch::{FeedClient, FixedDelay, WebSocketTransport};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let transport = Arc::new(WebSocketTransport::new("ws://localhost:5001/"));
//! let feed = FeedClient::new(transport, Box::new(FixedDelay(Duration::from_secs(3))));
//! let subscription = feed.subscribe(|snapshot| {
//!     println!("air quality: {}", snapshot.air_quality);
//! });
//! feed.start();
//! # feed.unsubscribe(subscription);
//! # feed.close();
//! # });
//! ```
//!
//! ### Bridging snapshots from another system
//!
//! ```
//! use std::sync::Arc;
//! use agrowatch::{ChannelTransport, FeedClient, FixedDelay};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let transport = ChannelTransport::new("simulator");
//! let frames = transport.accept_next();
//! let feed = FeedClient::new(
//!     Arc::new(transport),
//!     Box::new(FixedDelay(Duration::from_secs(1))),
//! );
//! feed.start();
//! let frame = serde_json::json!({
//!     "mq135": { "value": 80 },
//!     "dht22": { "temperature": 22, "humidity": 50 },
//!     "tds": { "value": 150 },
//!     "fc28": { "value": 64 },
//!     "pms5003": { "pm25": 6, "pm10": 11 }
//! });
//! frames.send(frame.to_string().into_bytes()).await.unwrap();
//! # feed.close();
//! # });
//! ```

pub mod app;
pub mod backend;
pub mod binder;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod feed;
pub mod headless;
pub mod location;
pub mod logging;
pub mod source;
pub mod ui;

// Re-export main types for convenience
pub use app::App;
pub use backend::{HistoryChain, HistoryProvider, HttpBackend, SnapshotProvider};
pub use binder::{Binder, BinderConfig, DisplaySurface};
pub use config::Settings;
pub use data::{
    classify, parse_snapshot, HistoryRecord, HistoryView, Location, SensorSnapshot,
    SensorThresholds, SensorTiers, ThresholdTuple, Tier,
};
pub use error::{ConnectionError, FetchError, ValidationError};
pub use feed::{ConnectionState, FeedClient, FixedDelay, RetryPolicy, Subscription};
pub use source::{ChannelTransport, Connection, TcpTransport, Transport, WebSocketTransport};
