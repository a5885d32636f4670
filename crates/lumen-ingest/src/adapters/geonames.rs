//! GeoNames reverse geocoder (`findNearbyPlaceNameJSON`).
//!
//! Lookups are cached per coordinate rounded to three decimal places
//! (roughly 100 m) for the lifetime of the session. [`teardown`] drops both
//! the cache and the HTTP client; the next lookup opens a fresh session.
//!
//! [`teardown`]: ReverseGeocoder::teardown

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use lumen_core::{defaults, Error, Place, Result, ReverseGeocoder};

/// GeoNames status codes worth retrying (timeouts, limits, overload).
const TRANSIENT_STATUS_CODES: &[i64] = &[13, 18, 19, 20, 22];

/// GeoNames status code for "no result found".
const NO_RESULT_CODE: i64 = 15;

/// GeoNames account and endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeonamesConfig {
    pub base_url: String,
    pub username: String,
    pub timeout_secs: u64,
}

impl GeonamesConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            base_url: defaults::GEONAMES_URL.to_string(),
            username: username.into(),
            timeout_secs: defaults::GEO_TIMEOUT_SECS,
        }
    }

    /// Read `GEONAMES_USERNAME`; `None` when unset or blank (geocoding off).
    pub fn from_env() -> Option<Self> {
        std::env::var(defaults::ENV_GEONAMES_USERNAME)
            .ok()
            .map(|user| user.trim().to_string())
            .filter(|user| !user.is_empty())
            .map(Self::new)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

#[derive(Debug, Deserialize)]
struct NearbyResponse {
    #[serde(default)]
    geonames: Vec<GeonameEntry>,
    status: Option<GeonamesStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeonameEntry {
    #[serde(default)]
    toponym_name: String,
    #[serde(default)]
    admin_name1: String,
    #[serde(default)]
    admin_name2: String,
    #[serde(default)]
    country_name: String,
    #[serde(default)]
    distance: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeonamesStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    value: i64,
}

impl From<GeonameEntry> for Place {
    fn from(entry: GeonameEntry) -> Self {
        Place {
            toponym_name: entry.toponym_name,
            admin_name2: entry.admin_name2,
            admin_name1: entry.admin_name1,
            country_name: entry.country_name,
            distance_km: entry.distance.and_then(|d| d.trim().parse().ok()),
        }
    }
}

type CacheKey = (i64, i64);

/// Cache key with coordinates rounded to [`defaults::GEO_CACHE_PRECISION`] decimals.
fn cache_key(lat: f64, lon: f64) -> CacheKey {
    let scale = 10f64.powi(defaults::GEO_CACHE_PRECISION);
    ((lat * scale).round() as i64, (lon * scale).round() as i64)
}

/// [`ReverseGeocoder`] backed by the GeoNames web service.
pub struct GeonamesGeocoder {
    config: GeonamesConfig,
    client: Mutex<Option<Client>>,
    cache: Mutex<HashMap<CacheKey, Vec<Place>>>,
}

impl GeonamesGeocoder {
    pub fn new(config: GeonamesConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached lookups.
    pub fn cached_len(&self) -> usize {
        lock(&self.cache).len()
    }

    /// Whether an HTTP session is currently open.
    pub fn has_session(&self) -> bool {
        lock(&self.client).is_some()
    }

    fn session(&self) -> Result<Client> {
        let mut client = lock(&self.client);
        if let Some(existing) = client.as_ref() {
            return Ok(existing.clone());
        }
        let created = Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| Error::Geocode(format!("Failed to build HTTP client: {}", e)))?;
        *client = Some(created.clone());
        Ok(created)
    }

    fn parse_response(body: NearbyResponse) -> Result<Vec<Place>> {
        if let Some(status) = body.status {
            return match status.value {
                NO_RESULT_CODE => Ok(Vec::new()),
                code if TRANSIENT_STATUS_CODES.contains(&code) => Err(Error::Unavailable(format!(
                    "GeoNames status {}: {}",
                    code, status.message
                ))),
                code => Err(Error::Geocode(format!(
                    "GeoNames status {}: {}",
                    code, status.message
                ))),
            };
        }
        Ok(body.geonames.into_iter().map(Place::from).collect())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ReverseGeocoder for GeonamesGeocoder {
    #[instrument(skip(self), fields(subsystem = "geo", component = "geonames", op = "find_nearby_place_name"))]
    async fn find_nearby_place_name(&self, lat: f64, lon: f64) -> Result<Vec<Place>> {
        let key = cache_key(lat, lon);
        if let Some(hit) = lock(&self.cache).get(&key) {
            debug!(result_count = hit.len(), "Geocoder cache hit");
            return Ok(hit.clone());
        }

        let client = self.session()?;
        let url = format!(
            "{}/findNearbyPlaceNameJSON",
            self.config.base_url.trim_end_matches('/')
        );
        let response = client
            .get(&url)
            .query(&[
                ("username", self.config.username.clone()),
                ("lat", lat.to_string()),
                ("lng", lon.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(Error::Unavailable(format!("GeoNames returned {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Geocode(format!(
                "GeoNames returned {}: {}",
                status, body
            )));
        }

        let body: NearbyResponse = response
            .json()
            .await
            .map_err(|e| Error::Geocode(format!("Failed to parse GeoNames response: {}", e)))?;
        let places = Self::parse_response(body)?;

        debug!(result_count = places.len(), "Geocoder lookup complete");
        lock(&self.cache).insert(key, places.clone());
        Ok(places)
    }

    fn teardown(&self) {
        let cached = {
            let mut cache = lock(&self.cache);
            let n = cache.len();
            cache.clear();
            n
        };
        let had_session = lock(&self.client).take().is_some();
        debug!(
            subsystem = "geo",
            component = "geonames",
            op = "teardown",
            cached,
            had_session,
            "Geocoder session released"
        );
    }
}
