//! Place descriptions from GPS coordinates.

use std::sync::Arc;
use std::time::Duration;

use lumen_core::{
    defaults, describe_geo_location, Coordinates, Error, Place, Result, RetryPolicy,
    ReverseGeocoder,
};
use tracing::{debug, instrument};

/// Turns coordinates into a "The scene takes place in ..." sentence.
///
/// Transient geocoder failures are retried once before being returned.
pub struct GeoDescriber {
    geocoder: Arc<dyn ReverseGeocoder>,
    retry: RetryPolicy,
}

impl GeoDescriber {
    pub fn new(geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        Self {
            geocoder,
            retry: RetryPolicy::new(
                1 + defaults::GEO_RETRIES,
                Duration::from_millis(defaults::GEO_RETRY_BACKOFF_MS),
            ),
        }
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Nearby places; an empty vector when none are known.
    pub async fn find_nearby_place_name(&self, lat: f64, lon: f64) -> Result<Vec<Place>> {
        self.retry
            .run("find_nearby_place_name", Error::is_transient, || {
                self.geocoder.find_nearby_place_name(lat, lon)
            })
            .await
    }

    /// Render places as a sentence, `None` when there is nothing to say.
    pub fn describe(&self, places: &[Place]) -> Option<String> {
        describe_geo_location(places)
    }

    /// Look up and describe a location in one step.
    #[instrument(skip(self), fields(subsystem = "geo", component = "describer", op = "describe_location"))]
    pub async fn describe_location(&self, coordinates: Coordinates) -> Result<Option<String>> {
        let places = self
            .find_nearby_place_name(coordinates.lat, coordinates.lon)
            .await?;
        debug!(result_count = places.len(), "Places found");
        Ok(self.describe(&places))
    }

    /// Release the geocoder session.
    pub fn teardown(&self) {
        self.geocoder.teardown();
    }

    /// Guard that tears the geocoder session down when dropped.
    pub fn session(&self) -> GeocoderSession {
        GeocoderSession {
            geocoder: Arc::clone(&self.geocoder),
        }
    }
}

/// Scoped geocoder session, released on every exit path.
#[must_use = "the session is released as soon as the guard is dropped"]
pub struct GeocoderSession {
    geocoder: Arc<dyn ReverseGeocoder>,
}

impl Drop for GeocoderSession {
    fn drop(&mut self) {
        self.geocoder.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Geocoder replaying scripted responses.
    struct ScriptedGeocoder {
        responses: Mutex<VecDeque<Result<Vec<Place>>>>,
        calls: AtomicU32,
        teardowns: AtomicU32,
    }

    impl ScriptedGeocoder {
        fn new(responses: Vec<Result<Vec<Place>>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
                teardowns: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl ReverseGeocoder for ScriptedGeocoder {
        async fn find_nearby_place_name(&self, _lat: f64, _lon: f64) -> Result<Vec<Place>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        fn teardown(&self) {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn la_jolla() -> Place {
        Place {
            toponym_name: "La Jolla".to_string(),
            admin_name2: "San Diego County".to_string(),
            admin_name1: "California".to_string(),
            country_name: "United States".to_string(),
            distance_km: Some(0.5),
        }
    }

    fn describer(geocoder: Arc<ScriptedGeocoder>) -> GeoDescriber {
        GeoDescriber::new(geocoder).with_retry(RetryPolicy::new(2, Duration::ZERO))
    }

    #[tokio::test]
    async fn test_transient_error_retried_once() {
        let geocoder = ScriptedGeocoder::new(vec![
            Err(Error::Unavailable("503".to_string())),
            Ok(vec![la_jolla()]),
        ]);
        let geo = describer(geocoder.clone());

        let sentence = geo
            .describe_location(Coordinates {
                lat: 32.8,
                lon: -117.2,
            })
            .await
            .unwrap();

        assert_eq!(
            sentence.as_deref(),
            Some("The scene takes place in La Jolla, San Diego County, California.")
        );
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_transient_error_surfaces() {
        let geocoder = ScriptedGeocoder::new(vec![
            Err(Error::Unavailable("timeout".to_string())),
            Err(Error::Unavailable("timeout".to_string())),
            Ok(vec![la_jolla()]),
        ]);
        let geo = describer(geocoder.clone());

        let result = geo.find_nearby_place_name(32.8, -117.2).await;

        assert!(matches!(result, Err(Error::Unavailable(_))));
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let geocoder = ScriptedGeocoder::new(vec![Err(Error::Geocode("bad user".to_string()))]);
        let geo = describer(geocoder.clone());

        let result = geo.find_nearby_place_name(0.0, 0.0).await;

        assert!(matches!(result, Err(Error::Geocode(_))));
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_places_is_none() {
        let geocoder = ScriptedGeocoder::new(vec![Ok(Vec::new())]);
        let geo = describer(geocoder);

        let sentence = geo
            .describe_location(Coordinates { lat: 0.0, lon: 0.0 })
            .await
            .unwrap();

        assert!(sentence.is_none());
    }

    #[test]
    fn test_session_guard_tears_down_on_drop() {
        let geocoder = ScriptedGeocoder::new(vec![]);
        let geo = describer(geocoder.clone());
        {
            let _session = geo.session();
            assert_eq!(geocoder.teardowns.load(Ordering::SeqCst), 0);
        }
        assert_eq!(geocoder.teardowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_session_guard_tears_down_on_panic() {
        let geocoder = ScriptedGeocoder::new(vec![]);
        let geo = describer(geocoder.clone());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _session = geo.session();
            panic!("boom");
        }));

        assert!(result.is_err());
        assert_eq!(geocoder.teardowns.load(Ordering::SeqCst), 1);
    }
}
