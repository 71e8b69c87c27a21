//! Time-series data sources.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tidewatch_core::{DimensionMap, Interval, SeriesError, TimeSeries, TimeSeriesKey};

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("no data for {0}")]
    NotFound(String),

    #[error("data source unavailable: {0}")]
    Unavailable(String),

    #[error("series error: {0}")]
    Series(#[from] SeriesError),
}

/// Source of bucketed series for one key.
///
/// `fetch` must be idempotent: the same arguments give the same series.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(
        &self,
        key: &TimeSeriesKey,
        interval: Interval,
        bucket_millis: i64,
    ) -> Result<TimeSeries, DataSourceError>;
}

// ── In-memory source ───────────────────────────────────────────

/// One series in a fixture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureSeries {
    pub metric: String,
    #[serde(default)]
    pub dimensions: DimensionMap,
    /// `[timestamp_millis, value]` pairs.
    pub points: Vec<(i64, f64)>,
}

/// Raw points per key, summed into buckets on fetch.
#[derive(Default)]
pub struct InMemoryDataSource {
    points: RwLock<HashMap<TimeSeriesKey, BTreeMap<i64, f64>>>,
    unavailable: RwLock<HashSet<TimeSeriesKey>>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of [`FixtureSeries`].
    pub fn from_fixture_file(path: &Path) -> Result<Self, DataSourceError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| DataSourceError::Unavailable(format!("{}: {e}", path.display())))?;
        let fixtures: Vec<FixtureSeries> = serde_json::from_str(&json)
            .map_err(|e| DataSourceError::Unavailable(format!("{}: {e}", path.display())))?;

        let source = Self::new();
        for fixture in fixtures {
            let key = TimeSeriesKey::new(fixture.metric, fixture.dimensions);
            for (timestamp, value) in fixture.points {
                source.insert(&key, timestamp, value);
            }
        }
        Ok(source)
    }

    /// Add a raw point. Points sharing a timestamp are summed.
    pub fn insert(&self, key: &TimeSeriesKey, timestamp: i64, value: f64) {
        if let Ok(mut points) = self.points.write() {
            *points
                .entry(key.clone())
                .or_default()
                .entry(timestamp)
                .or_default() += value;
        }
    }

    /// Add consecutive values starting at `start`, one per `step` millis.
    pub fn insert_values(&self, key: &TimeSeriesKey, start: i64, step: i64, values: &[f64]) {
        for (i, value) in values.iter().enumerate() {
            self.insert(key, start + step * i as i64, *value);
        }
    }

    /// Make every fetch for `key` fail as unavailable.
    pub fn mark_unavailable(&self, key: &TimeSeriesKey) {
        if let Ok(mut keys) = self.unavailable.write() {
            keys.insert(key.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.points.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> DataSourceError {
    DataSourceError::Unavailable("lock poisoned".to_string())
}

#[async_trait]
impl DataSource for InMemoryDataSource {
    async fn fetch(
        &self,
        key: &TimeSeriesKey,
        interval: Interval,
        bucket_millis: i64,
    ) -> Result<TimeSeries, DataSourceError> {
        if self.unavailable.read().map_err(poisoned)?.contains(key) {
            return Err(DataSourceError::Unavailable(key.to_string()));
        }

        let points = self.points.read().map_err(poisoned)?;
        let raw = points
            .get(key)
            .ok_or_else(|| DataSourceError::NotFound(key.to_string()))?;

        let mut buckets: BTreeMap<i64, f64> = BTreeMap::new();
        for (&timestamp, &value) in raw.range(interval.start..interval.end) {
            let offset = (timestamp - interval.start).div_euclid(bucket_millis) * bucket_millis;
            *buckets.entry(interval.start + offset).or_default() += value;
        }

        let mut series = TimeSeries::new(interval, bucket_millis)?;
        for (timestamp, value) in buckets {
            series.set(timestamp, value)?;
        }
        Ok(series)
    }
}
