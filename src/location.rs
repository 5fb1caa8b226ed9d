//! Best-effort location of the dashboard.
//!
//! The location shown in the header comes from, in order: a cached lookup
//! younger than 24 hours, reverse geocoding of configured coordinates, or an
//! IP-based lookup. Any failure leaves the location unknown; it never stops
//! the dashboard.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::data::Location;
use crate::error::FetchError;

/// Key under which the resolved location is cached.
pub const LOCATION_CACHE_KEY: &str = "user_location";

/// How long a cached location stays usable.
pub const LOCATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub const NOMINATIM_REVERSE_URL: &str = "https://nominatim.openstreetmap.org/reverse";
pub const IPAPI_URL: &str = "https://ipapi.co/json/";

/// A resolved location as stored in the cache file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedLocation {
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl CachedLocation {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match (now - self.timestamp).to_std() {
            Ok(age) => age < ttl,
            // Timestamp in the future: clock skew, treat as fresh.
            Err(_) => true,
        }
    }

    pub fn location(&self) -> Location {
        Location {
            city: self.city.clone(),
            country: self.country.clone(),
        }
    }
}

/// A small JSON key/value file for values that outlive a session.
#[derive(Debug, Clone)]
pub struct LocationStore {
    path: PathBuf,
}

impl LocationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `storage.json` in the platform cache directory, if there is one.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "agrowatch").map(|dirs| dirs.cache_dir().join("storage.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    /// The cached location, if present and younger than `ttl`.
    pub fn get_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> Result<Option<CachedLocation>> {
        let entries = self.load()?;
        let Some(raw) = entries.get(LOCATION_CACHE_KEY) else {
            return Ok(None);
        };
        let cached: CachedLocation = serde_json::from_value(raw.clone())
            .context("Cached location has an unexpected shape")?;
        Ok(cached.is_fresh(now, ttl).then_some(cached))
    }

    /// Store the location, keeping any other keys in the file.
    pub fn save(&self, location: &CachedLocation) -> Result<()> {
        // An unreadable file is replaced rather than blocking the save.
        let mut entries = self.load().unwrap_or_default();
        entries.insert(
            LOCATION_CACHE_KEY.to_string(),
            serde_json::to_value(location)?,
        );

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&entries)?)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ReverseGeocode {
    address: Address,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpLookup {
    city: Option<String>,
    country_name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Resolves and caches the dashboard's location.
#[derive(Debug, Clone)]
pub struct LocationResolver {
    client: Client,
    store: Option<LocationStore>,
    coordinates: Option<(f64, f64)>,
    reverse_url: String,
    ip_url: String,
    ttl: Duration,
}

impl LocationResolver {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            store: None,
            coordinates: None,
            reverse_url: NOMINATIM_REVERSE_URL.to_string(),
            ip_url: IPAPI_URL.to_string(),
            ttl: LOCATION_TTL,
        }
    }

    pub fn with_store(mut self, store: LocationStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Reverse-geocode these coordinates instead of using the IP lookup.
    pub fn with_coordinates(mut self, lat: f64, lon: f64) -> Self {
        self.coordinates = Some((lat, lon));
        self
    }

    pub fn with_endpoints(mut self, reverse_url: &str, ip_url: &str) -> Self {
        self.reverse_url = reverse_url.to_string();
        self.ip_url = ip_url.to_string();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Resolve the location, or `None` when it is unavailable.
    ///
    /// Cache file access runs on the blocking pool.
    pub async fn resolve(&self) -> Option<Location> {
        if let Some(store) = &self.store {
            let (store, ttl) = (store.clone(), self.ttl);
            let cached = tokio::task::spawn_blocking(move || store.get_fresh(Utc::now(), ttl))
                .await
                .context("Location cache read aborted");
            match cached.and_then(|r| r) {
                Ok(Some(cached)) => {
                    debug!("Using cached location {}", cached.location().label());
                    return Some(cached.location());
                }
                Ok(None) => {}
                Err(err) => warn!("Ignoring location cache: {:#}", err),
            }
        }

        let lookup = match self.coordinates {
            Some((lat, lon)) => match self.reverse_geocode(lat, lon).await {
                Ok(found) => Ok(found),
                Err(err) => {
                    debug!("Reverse geocoding failed, trying IP lookup: {}", err);
                    self.ip_lookup().await
                }
            },
            None => self.ip_lookup().await,
        };

        match lookup {
            Ok(found) => {
                if let Some(store) = &self.store {
                    let (store, entry) = (store.clone(), found.clone());
                    let saved = tokio::task::spawn_blocking(move || store.save(&entry))
                        .await
                        .context("Location cache write aborted");
                    if let Err(err) = saved.and_then(|r| r) {
                        warn!("Failed to cache location: {:#}", err);
                    }
                }
                Some(found.location())
            }
            Err(err) => {
                warn!("Location unavailable: {}", err);
                None
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        response
            .json()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))
    }

    async fn reverse_geocode(&self, lat: f64, lon: f64) -> Result<CachedLocation, FetchError> {
        let url = format!("{}?format=json&lat={}&lon={}", self.reverse_url, lat, lon);
        let body: ReverseGeocode = self.get_json(&url).await?;
        let address = body.address;

        let city = address
            .city
            .or(address.town)
            .or(address.village)
            .or(address.state);
        match (city, address.country) {
            (Some(city), Some(country)) => Ok(CachedLocation {
                city,
                country,
                lat: Some(lat),
                lon: Some(lon),
                timestamp: Utc::now(),
            }),
            _ => Err(FetchError::Parse("address has no city or country".to_string())),
        }
    }

    async fn ip_lookup(&self) -> Result<CachedLocation, FetchError> {
        let body: IpLookup = self.get_json(&self.ip_url).await?;
        match (body.city, body.country_name) {
            (Some(city), Some(country)) => Ok(CachedLocation {
                city,
                country,
                lat: body.latitude,
                lon: body.longitude,
                timestamp: Utc::now(),
            }),
            _ => Err(FetchError::Parse("IP lookup returned no city".to_string())),
        }
    }
}
