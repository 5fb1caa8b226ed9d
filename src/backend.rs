//! HTTP client for the dashboard backend.
//!
//! The backend serves the latest reading at `GET /api/sensors` and two
//! history endpoints. History is pulled through a chain of providers: the
//! first provider that returns records wins, and its records are tagged with
//! where they came from.
//!
//! ## Example
//!
//! ```rust,no_run
//! use agrowatch::backend::{HistoryChain, HttpBackend, SnapshotProvider};
//! use agrowatch::data::Provenance;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = HttpBackend::builder()
//!         .base_url("http://localhost:5001")
//!         .build()?;
//!
//!     let current = backend.fetch_current().await?;
//!     println!("Air quality: {}", current.air_quality);
//!
//!     let order = [Provenance::Sheets, Provenance::Local];
//!     let chain = HistoryChain::from_backend(&backend, &order, 20);
//!     println!("{}", chain.load().await.badge());
//!     Ok(())
//! }
//! ```

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::data::{
    parse_snapshot, HistoryRecord, HistorySet, HistoryView, Provenance, SensorSnapshot,
};
use crate::error::FetchError;

/// Default backend address.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5001";

/// Source of the current reading.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn fetch_current(&self) -> Result<SensorSnapshot, FetchError>;
}

/// One source of historical records.
#[async_trait]
pub trait HistoryProvider: Send + Sync + Debug {
    /// Tag applied to records from this provider.
    fn provenance(&self) -> Provenance;

    /// Fetch records, oldest first.
    async fn fetch(&self) -> Result<Vec<HistoryRecord>, FetchError>;
}

/// Client for the backend's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a new builder for configuring the client.
    pub fn builder() -> HttpBackendBuilder {
        HttpBackendBuilder::default()
    }

    /// Use an existing reqwest client.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// A history provider backed by one of this backend's endpoints.
    pub fn history_provider(&self, provenance: Provenance, limit: usize) -> HttpHistoryProvider {
        HttpHistoryProvider {
            backend: self.clone(),
            provenance,
            limit,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))
    }
}

#[async_trait]
impl SnapshotProvider for HttpBackend {
    async fn fetch_current(&self) -> Result<SensorSnapshot, FetchError> {
        let url = format!("{}/api/sensors", self.base_url);
        let raw: serde_json::Value = self.get_json(&url).await?;
        Ok(parse_snapshot(&raw)?)
    }
}

/// Builder for [`HttpBackend`].
#[derive(Debug, Default)]
pub struct HttpBackendBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl HttpBackendBuilder {
    /// Set the backend address (e.g., "http://localhost:5001").
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<HttpBackend, FetchError> {
        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(10)))
            .build()?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        Ok(HttpBackend::with_client(client, &base_url))
    }
}

/// History pulled from one backend endpoint.
#[derive(Debug, Clone)]
pub struct HttpHistoryProvider {
    backend: HttpBackend,
    provenance: Provenance,
    limit: usize,
}

impl HttpHistoryProvider {
    pub fn url(&self) -> String {
        match self.provenance {
            Provenance::Sheets => format!(
                "{}/api/sheets/data?limit={}",
                self.backend.base_url, self.limit
            ),
            Provenance::Local => format!("{}/api/history", self.backend.base_url),
        }
    }
}

#[async_trait]
impl HistoryProvider for HttpHistoryProvider {
    fn provenance(&self) -> Provenance {
        self.provenance
    }

    async fn fetch(&self) -> Result<Vec<HistoryRecord>, FetchError> {
        self.backend.get_json(&self.url()).await
    }
}

/// Ordered history providers with fallback.
#[derive(Debug, Clone)]
pub struct HistoryChain {
    providers: Vec<Arc<dyn HistoryProvider>>,
    limit: usize,
}

impl HistoryChain {
    pub fn new(providers: Vec<Arc<dyn HistoryProvider>>, limit: usize) -> Self {
        Self { providers, limit }
    }

    /// One HTTP provider per provenance, in the given order.
    pub fn from_backend(backend: &HttpBackend, order: &[Provenance], limit: usize) -> Self {
        let providers = order
            .iter()
            .map(|p| Arc::new(backend.history_provider(*p, limit)) as Arc<dyn HistoryProvider>)
            .collect();
        Self::new(providers, limit)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Pull history, trying each provider in turn.
    ///
    /// The first provider with records wins. If none has records the result
    /// is [`HistoryView::NoData`], unless every provider failed, in which
    /// case it is [`HistoryView::Unavailable`].
    pub async fn load(&self) -> HistoryView {
        let mut failures = Vec::new();

        for provider in &self.providers {
            let provenance = provider.provenance();
            match provider.fetch().await {
                Ok(records) if !records.is_empty() => {
                    debug!("Loaded {} history records from {}", records.len(), provenance);
                    return HistoryView::Loaded(HistorySet::from_records(
                        records, provenance, self.limit,
                    ));
                }
                Ok(_) => debug!("No history records from {}", provenance),
                Err(err) => {
                    warn!("History provider {} failed: {}", provenance, err);
                    failures.push(format!("{}: {}", provenance, err));
                }
            }
        }

        if !self.providers.is_empty() && failures.len() == self.providers.len() {
            HistoryView::Unavailable {
                reason: failures.join("; "),
            }
        } else {
            HistoryView::NoData
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[derive(Debug)]
    struct StubProvider {
        provenance: Provenance,
        result: Result<usize, u16>,
    }

    #[async_trait]
    impl HistoryProvider for StubProvider {
        fn provenance(&self) -> Provenance {
            self.provenance
        }

        async fn fetch(&self) -> Result<Vec<HistoryRecord>, FetchError> {
            match self.result {
                Ok(count) => Ok((0..count)
                    .map(|i| HistoryRecord {
                        mq135: i as f64,
                        ..Default::default()
                    })
                    .collect()),
                Err(status) => Err(FetchError::Status(status)),
            }
        }
    }

    fn stub(provenance: Provenance, result: Result<usize, u16>) -> Arc<dyn HistoryProvider> {
        Arc::new(StubProvider { provenance, result })
    }

    /// Serve canned JSON responses keyed by request path until the test ends.
    pub(crate) async fn serve(routes: Vec<(&'static str, u16, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let routes = routes.clone();
                tokio::spawn(async move {
                    let (read, mut write) = socket.into_split();
                    let mut reader = BufReader::new(read);
                    let mut request_line = String::new();
                    reader.read_line(&mut request_line).await.unwrap();
                    let path = request_line
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or("/")
                        .to_string();

                    let mut header = String::new();
                    loop {
                        header.clear();
                        let n = reader.read_line(&mut header).await.unwrap();
                        if n == 0 || header == "\r\n" {
                            break;
                        }
                    }

                    let (status, body) = routes
                        .iter()
                        .find(|(p, _, _)| *p == path)
                        .map(|(_, s, b)| (*s, b.clone()))
                        .unwrap_or((404, String::new()));
                    let response = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        if status == 200 { "OK" } else { "Error" },
                        body.len(),
                        body
                    );
                    write.write_all(response.as_bytes()).await.unwrap();
                    let _ = write.shutdown().await;
                });
            }
        });

        format!("http://{}", addr)
    }

    pub(crate) fn test_client() -> Client {
        Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    fn records_json(count: usize) -> String {
        let records: Vec<serde_json::Value> = (0..count)
            .map(|i| {
                serde_json::json!({
                    "timestamp": format!("2024-05-01T10:00:{:02}", i),
                    "mq135": i, "temperature": 24, "humidity": 58,
                    "pm25": 8, "pm10": 15, "fc28": 72, "tds": 180
                })
            })
            .collect();
        serde_json::Value::Array(records).to_string()
    }

    #[tokio::test]
    async fn test_first_provider_with_records_wins() {
        let chain = HistoryChain::new(
            vec![stub(Provenance::Sheets, Ok(3)), stub(Provenance::Local, Ok(5))],
            20,
        );
        match chain.load().await {
            HistoryView::Loaded(set) => {
                assert_eq!(set.provenance, Provenance::Sheets);
                assert_eq!(set.len(), 3);
            }
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_primary_falls_back_to_local() {
        let chain = HistoryChain::new(
            vec![stub(Provenance::Sheets, Ok(0)), stub(Provenance::Local, Ok(25))],
            20,
        );
        match chain.load().await {
            HistoryView::Loaded(set) => {
                assert_eq!(set.provenance, Provenance::Local);
                assert_eq!(set.len(), 20);
                // Newest first: the last of the 25 records leads.
                assert_eq!(set.records[0].mq135, 24.0);
                assert_eq!(set.records[19].mq135, 5.0);
            }
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_primary_falls_back_to_local() {
        let chain = HistoryChain::new(
            vec![stub(Provenance::Sheets, Err(500)), stub(Provenance::Local, Ok(2))],
            20,
        );
        let view = chain.load().await;
        assert_eq!(view.badge(), "Data from Local Storage");
        assert_eq!(view.records().len(), 2);
    }

    #[tokio::test]
    async fn test_all_empty_is_no_data() {
        let chain = HistoryChain::new(
            vec![stub(Provenance::Sheets, Ok(0)), stub(Provenance::Local, Ok(0))],
            20,
        );
        assert_eq!(chain.load().await, HistoryView::NoData);
    }

    #[tokio::test]
    async fn test_empty_and_failed_is_no_data() {
        let chain = HistoryChain::new(
            vec![stub(Provenance::Sheets, Ok(0)), stub(Provenance::Local, Err(503))],
            20,
        );
        assert_eq!(chain.load().await, HistoryView::NoData);
    }

    #[tokio::test]
    async fn test_all_failed_is_unavailable() {
        let chain = HistoryChain::new(
            vec![stub(Provenance::Sheets, Err(500)), stub(Provenance::Local, Err(502))],
            20,
        );
        match chain.load().await {
            HistoryView::Unavailable { reason } => {
                assert!(reason.contains("sheets"));
                assert!(reason.contains("502"));
            }
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_providers_is_no_data() {
        let chain = HistoryChain::new(Vec::new(), 20);
        assert_eq!(chain.load().await, HistoryView::NoData);
    }

    #[test]
    fn test_provider_urls() {
        let backend = HttpBackend::with_client(test_client(), "http://backend:5001/");
        assert_eq!(
            backend.history_provider(Provenance::Sheets, 20).url(),
            "http://backend:5001/api/sheets/data?limit=20"
        );
        assert_eq!(
            backend.history_provider(Provenance::Local, 20).url(),
            "http://backend:5001/api/history"
        );
    }

    #[test]
    fn test_builder_defaults() {
        let backend = HttpBackend::builder().build().unwrap();
        assert_eq!(backend.base_url(), DEFAULT_BACKEND_URL);
    }

    #[tokio::test]
    async fn test_fetch_current_over_http() {
        let body = serde_json::json!({
            "mq135": { "value": 250, "unit": "ppm", "name": "Air Quality (MQ-135)" },
            "dht22": { "temperature": 24, "humidity": 58 },
            "tds": { "value": 180 },
            "fc28": { "value": 72 },
            "pms5003": { "pm25": 8, "pm10": 15 },
            "location": null,
            "timestamp": "2024-05-01T10:00:00.123456"
        })
        .to_string();
        let base = serve(vec![("/api/sensors", 200, body)]).await;
        let backend = HttpBackend::with_client(test_client(), &base);

        let snapshot = backend.fetch_current().await.unwrap();
        assert_eq!(snapshot.air_quality, 250.0);
        assert!(snapshot.timestamp.is_some());
    }

    #[tokio::test]
    async fn test_fetch_current_rejects_incomplete_payload() {
        let base = serve(vec![("/api/sensors", 200, r#"{"mq135":{"value":1}}"#.to_string())]).await;
        let backend = HttpBackend::with_client(test_client(), &base);

        assert!(matches!(
            backend.fetch_current().await,
            Err(FetchError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_http_chain_falls_back_on_error_status() {
        let base = serve(vec![
            ("/api/sheets/data?limit=20", 500, String::new()),
            ("/api/history", 200, records_json(30)),
        ])
        .await;
        let backend = HttpBackend::with_client(test_client(), &base);
        let chain =
            HistoryChain::from_backend(&backend, &[Provenance::Sheets, Provenance::Local], 20);

        match chain.load().await {
            HistoryView::Loaded(set) => {
                assert_eq!(set.provenance, Provenance::Local);
                assert_eq!(set.len(), 20);
                assert_eq!(set.records[0].mq135, 29.0);
            }
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_chain_sheets_empty_array() {
        let base = serve(vec![
            ("/api/sheets/data?limit=20", 200, "[]".to_string()),
            ("/api/history", 200, "[]".to_string()),
        ])
        .await;
        let backend = HttpBackend::with_client(test_client(), &base);
        let chain =
            HistoryChain::from_backend(&backend, &[Provenance::Sheets, Provenance::Local], 20);

        assert_eq!(chain.load().await, HistoryView::NoData);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = HttpBackend::with_client(test_client(), &format!("http://{}", addr));
        let chain =
            HistoryChain::from_backend(&backend, &[Provenance::Sheets, Provenance::Local], 20);
        assert!(matches!(
            chain.load().await,
            HistoryView::Unavailable { .. }
        ));
        assert!(matches!(
            backend.fetch_current().await,
            Err(FetchError::Connection(_))
        ));
    }
}
