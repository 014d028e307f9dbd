//! Latest per-city weather batch
//!
//! The store publishes whole batches through a [`tokio::sync::watch`] channel. A refresh
//! starts from a copy of the previous batch, overwrites the cities that were fetched
//! successfully and publishes the result once the sweep is over, so readers never see a
//! sweep half-applied. Cities whose fetch failed keep their previous sample.

use heatscape_core::errors::{HeatscapeError, HeatscapeResult};
use heatscape_core::geo::GeoCoordinate;
use heatscape_core::FloatValue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::collaborators::{CityQuery, WeatherObservation, WeatherProvider};

/// Current weather for one city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityWeatherSample {
    /// Unique key of the city
    pub city: String,
    pub location: GeoCoordinate,
    /// unit: °C
    pub temperature_c: FloatValue,
    /// unit: %
    pub humidity_pct: FloatValue,
    /// unit: km / h
    pub wind_speed_kph: FloatValue,
}

impl CityWeatherSample {
    /// Validate a weather response for `city`
    ///
    /// # Errors
    ///
    /// [`HeatscapeError::DataError`] if the location is invalid or a reading is not finite.
    pub fn from_observation(city: &str, observation: WeatherObservation) -> HeatscapeResult<Self> {
        if !observation.location.is_valid() {
            return Err(HeatscapeError::DataError(format!(
                "{} has an invalid location ({}, {})",
                city, observation.location.lon, observation.location.lat
            )));
        }
        let readings = [
            observation.temperature_c,
            observation.humidity_pct,
            observation.wind_speed_kph,
        ];
        if readings.iter().any(|v| !v.is_finite()) {
            return Err(HeatscapeError::DataError(format!(
                "{} returned non-finite readings",
                city
            )));
        }
        Ok(Self {
            city: city.to_string(),
            location: observation.location,
            temperature_c: observation.temperature_c,
            humidity_pct: observation.humidity_pct.clamp(0.0, 100.0),
            wind_speed_kph: observation.wind_speed_kph.max(0.0),
        })
    }
}

/// A complete set of city samples as of one refresh
#[derive(Debug, Clone, Default)]
pub struct CityBatch {
    generation: u64,
    refreshed_at: Option<Instant>,
    samples: Vec<CityWeatherSample>,
}

impl CityBatch {
    /// A batch assembled outside of a store refresh, e.g. from recorded samples
    pub fn new(generation: u64, samples: Vec<CityWeatherSample>) -> Self {
        Self {
            generation,
            refreshed_at: None,
            samples,
        }
    }

    /// Number of refreshes that produced this batch, zero before the first one
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn refreshed_at(&self) -> Option<Instant> {
        self.refreshed_at
    }

    pub fn samples(&self) -> &[CityWeatherSample] {
        &self.samples
    }

    pub fn get(&self, city: &str) -> Option<&CityWeatherSample> {
        self.samples.iter().find(|s| s.city == city)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Outcome of a single refresh sweep
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    pub generation: u64,
    pub updated: Vec<String>,
    pub failed: Vec<(String, HeatscapeError)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Completed(RefreshReport),
    /// Another refresh was still in flight
    Skipped,
}

/// Clears the in-flight flag however the refresh ends, including cancellation
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Holder of the latest city weather batch
#[derive(Debug)]
pub struct CitySampleStore {
    cities: Vec<CityQuery>,
    batch: watch::Sender<Arc<CityBatch>>,
    in_flight: AtomicBool,
}

impl CitySampleStore {
    pub fn new(cities: Vec<CityQuery>) -> Self {
        let (batch, _) = watch::channel(Arc::new(CityBatch::default()));
        Self {
            cities,
            batch,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn cities(&self) -> &[CityQuery] {
        &self.cities
    }

    /// The most recently published batch
    pub fn latest(&self) -> Arc<CityBatch> {
        self.batch.borrow().clone()
    }

    /// Receive every batch published from now on
    pub fn subscribe(&self) -> watch::Receiver<Arc<CityBatch>> {
        self.batch.subscribe()
    }

    /// Fetch every configured city and publish the new batch
    ///
    /// Returns [`RefreshOutcome::Skipped`] without fetching anything if a refresh is
    /// already running.
    pub async fn refresh(&self, provider: &dyn WeatherProvider) -> RefreshOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Refresh already in flight, skipping");
            return RefreshOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let previous = self.latest();
        let mut samples = Vec::with_capacity(self.cities.len());
        let mut updated = vec![];
        let mut failed = vec![];

        for query in &self.cities {
            let fetched = provider.current(query).await.and_then(|observation| {
                CityWeatherSample::from_observation(&query.name, observation)
            });
            match fetched {
                Ok(sample) => {
                    updated.push(query.name.clone());
                    samples.push(sample);
                }
                Err(e) => {
                    warn!(
                        city = %query.name,
                        error = %e,
                        "Weather fetch failed; keeping the previous sample"
                    );
                    if let Some(sample) = previous.get(&query.name) {
                        samples.push(sample.clone());
                    }
                    failed.push((query.name.clone(), e));
                }
            }
        }

        let generation = previous.generation + 1;
        self.batch.send_replace(Arc::new(CityBatch {
            generation,
            refreshed_at: Some(Instant::now()),
            samples,
        }));
        info!(
            generation,
            updated = updated.len(),
            failed = failed.len(),
            "Published city weather batch"
        );

        RefreshOutcome::Completed(RefreshReport {
            generation,
            updated,
            failed,
        })
    }
}

/// Periodic driver of [`CitySampleStore::refresh`]
pub struct RefreshLoop;

impl RefreshLoop {
    /// Refresh `store` every `period`, starting immediately
    ///
    /// Ticks missed while a slow refresh is running are skipped rather than replayed.
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        store: Arc<CitySampleStore>,
        provider: Arc<dyn WeatherProvider>,
        period: Duration,
    ) -> HeatscapeResult<RefreshHandle> {
        if period.is_zero() {
            return Err(HeatscapeError::ConfigError(
                "Refresh interval must be greater than zero".to_string(),
            ));
        }
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let RefreshOutcome::Completed(report) = store.refresh(provider.as_ref()).await {
                    debug!(generation = report.generation, "Scheduled refresh finished");
                }
            }
        });
        Ok(RefreshHandle { task })
    }
}

/// Owner of a running refresh loop
///
/// The loop is aborted when the handle is stopped or dropped.
#[derive(Debug)]
pub struct RefreshHandle {
    task: JoinHandle<()>,
}

impl RefreshHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Returns a fixed temperature per city, or fails for cities marked as down
    struct FakeWeather {
        temperatures: Mutex<HashMap<String, f64>>,
        down: Mutex<Vec<String>>,
    }

    impl FakeWeather {
        fn new(temperatures: &[(&str, f64)]) -> Self {
            Self {
                temperatures: Mutex::new(
                    temperatures
                        .iter()
                        .map(|(c, t)| (c.to_string(), *t))
                        .collect(),
                ),
                down: Mutex::new(vec![]),
            }
        }

        fn set(&self, city: &str, temperature: f64) {
            self.temperatures
                .lock()
                .unwrap()
                .insert(city.to_string(), temperature);
        }

        fn take_down(&self, city: &str) {
            self.down.lock().unwrap().push(city.to_string());
        }
    }

    #[async_trait]
    impl WeatherProvider for FakeWeather {
        async fn current(&self, city: &CityQuery) -> HeatscapeResult<WeatherObservation> {
            if self.down.lock().unwrap().contains(&city.name) {
                return Err(HeatscapeError::collaborator("weather", "timeout"));
            }
            let temperature_c = self.temperatures.lock().unwrap()[&city.name];
            Ok(WeatherObservation {
                location: GeoCoordinate::new(121.0, 14.6),
                temperature_c,
                humidity_pct: 70.0,
                wind_speed_kph: 12.0,
            })
        }
    }

    /// Holds the fetch of one city until released
    struct GatedWeather {
        inner: FakeWeather,
        gated: String,
        reached: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl WeatherProvider for GatedWeather {
        async fn current(&self, city: &CityQuery) -> HeatscapeResult<WeatherObservation> {
            if city.name == self.gated {
                self.reached.notify_one();
                self.release.notified().await;
            }
            self.inner.current(city).await
        }
    }

    fn cities() -> Vec<CityQuery> {
        vec![
            CityQuery::new("Manila", Some("PH")),
            CityQuery::new("Cebu City", Some("PH")),
        ]
    }

    #[tokio::test]
    async fn test_refresh_publishes_whole_batch() {
        let store = CitySampleStore::new(cities());
        let provider = FakeWeather::new(&[("Manila", 31.0), ("Cebu City", 29.5)]);
        let mut receiver = store.subscribe();

        let outcome = store.refresh(&provider).await;
        let RefreshOutcome::Completed(report) = outcome else {
            panic!("refresh should not be skipped");
        };
        assert_eq!(report.generation, 1);
        assert_eq!(report.updated, vec!["Manila", "Cebu City"]);

        assert!(receiver.has_changed().unwrap());
        let batch = receiver.borrow_and_update().clone();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get("Cebu City").unwrap().temperature_c, 29.5);
    }

    #[tokio::test]
    async fn test_nothing_published_mid_sweep() {
        let store = Arc::new(CitySampleStore::new(cities()));
        let provider = Arc::new(GatedWeather {
            inner: FakeWeather::new(&[("Manila", 31.0), ("Cebu City", 29.5)]),
            gated: "Cebu City".to_string(),
            reached: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let mut receiver = store.subscribe();

        let sweep = tokio::spawn({
            let store = store.clone();
            let provider = provider.clone();
            async move { store.refresh(provider.as_ref()).await }
        });

        // Manila has been fetched and the sweep is waiting on Cebu City
        provider.reached.notified().await;
        assert_eq!(store.latest().generation(), 0);
        assert!(store.latest().is_empty());
        assert!(!receiver.has_changed().unwrap());
        assert_eq!(store.refresh(provider.as_ref()).await, RefreshOutcome::Skipped);

        provider.release.notify_one();
        let RefreshOutcome::Completed(report) = sweep.await.unwrap() else {
            panic!("refresh should not be skipped");
        };
        assert_eq!(report.generation, 1);
        assert!(receiver.has_changed().unwrap());
        assert_eq!(receiver.borrow_and_update().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_city_keeps_previous_sample() {
        let store = CitySampleStore::new(cities());
        let provider = FakeWeather::new(&[("Manila", 31.0), ("Cebu City", 29.5)]);
        store.refresh(&provider).await;

        provider.set("Manila", 33.0);
        provider.set("Cebu City", 30.0);
        provider.take_down("Manila");
        let RefreshOutcome::Completed(report) = store.refresh(&provider).await else {
            panic!("refresh should not be skipped");
        };

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "Manila");
        let batch = store.latest();
        assert_eq!(batch.generation(), 2);
        assert_eq!(batch.get("Manila").unwrap().temperature_c, 31.0);
        assert_eq!(batch.get("Cebu City").unwrap().temperature_c, 30.0);
    }

    #[tokio::test]
    async fn test_city_never_fetched_is_absent() {
        let store = CitySampleStore::new(cities());
        let provider = FakeWeather::new(&[("Manila", 31.0), ("Cebu City", 29.5)]);
        provider.take_down("Cebu City");

        store.refresh(&provider).await;
        let batch = store.latest();
        assert_eq!(batch.len(), 1);
        assert!(batch.get("Cebu City").is_none());
    }

    #[tokio::test]
    async fn test_overlapping_refresh_is_skipped() {
        let store = CitySampleStore::new(cities());
        let provider = FakeWeather::new(&[("Manila", 31.0), ("Cebu City", 29.5)]);

        store.in_flight.store(true, Ordering::Release);
        assert_eq!(store.refresh(&provider).await, RefreshOutcome::Skipped);
        assert_eq!(store.latest().generation(), 0);

        store.in_flight.store(false, Ordering::Release);
        assert!(matches!(
            store.refresh(&provider).await,
            RefreshOutcome::Completed(_)
        ));
    }

    #[test]
    fn test_invalid_observation_rejected() {
        let observation = WeatherObservation {
            location: GeoCoordinate::new(500.0, 14.6),
            temperature_c: 30.0,
            humidity_pct: 50.0,
            wind_speed_kph: 3.0,
        };
        assert!(matches!(
            CityWeatherSample::from_observation("Nowhere", observation),
            Err(HeatscapeError::DataError(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_refreshes_on_interval() {
        let store = Arc::new(CitySampleStore::new(cities()));
        let provider = Arc::new(FakeWeather::new(&[("Manila", 31.0), ("Cebu City", 29.5)]));

        let handle =
            RefreshLoop::spawn(store.clone(), provider.clone(), Duration::from_secs(60)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.latest().generation(), 1);

        provider.take_down("Manila");
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.latest().generation(), 2);
        assert!(handle.is_running());

        handle.stop();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(store.latest().generation(), 2);
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let store = Arc::new(CitySampleStore::new(cities()));
        let provider = Arc::new(FakeWeather::new(&[]));
        assert!(matches!(
            RefreshLoop::spawn(store, provider, Duration::ZERO),
            Err(HeatscapeError::ConfigError(_))
        ));
    }
}
