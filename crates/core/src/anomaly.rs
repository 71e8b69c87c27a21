use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::DimensionMap;
use crate::series::Interval;

/// A single, unmerged detection produced by one `analyze()` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAnomalyResult {
    pub start_time: i64,
    pub end_time: i64,
    /// Signed relative deviation of observed from expected.
    pub weight: f64,
    /// Non-negative magnitude.
    pub score: f64,
    pub dimensions: DimensionMap,
    pub function_id: Option<u64>,
}

impl RawAnomalyResult {
    pub fn interval(&self) -> Interval {
        Interval {
            start: self.start_time,
            end: self.end_time,
        }
    }
}

/// A consolidated anomaly spanning one or more raw anomalies.
///
/// `weight` and `score` are always recomputed from the underlying series and
/// raw anomalies, never copied from a single raw result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedAnomalyResult {
    /// Zero until persisted.
    pub id: u64,
    pub function_id: Option<u64>,
    pub metric: String,
    pub dimensions: DimensionMap,
    pub start_time: i64,
    pub end_time: i64,
    pub weight: f64,
    pub score: f64,
    /// Constituent raw anomalies, ordered by start time.
    pub raw_anomalies: Vec<RawAnomalyResult>,
    pub created_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl MergedAnomalyResult {
    /// Open a merged anomaly from its first raw anomaly.
    pub fn from_raw(metric: impl Into<String>, raw: RawAnomalyResult) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            function_id: raw.function_id,
            metric: metric.into(),
            dimensions: raw.dimensions.clone(),
            start_time: raw.start_time,
            end_time: raw.end_time,
            weight: raw.weight,
            score: raw.score,
            raw_anomalies: vec![raw],
            created_time: now,
            update_time: now,
        }
    }

    pub fn interval(&self) -> Interval {
        Interval {
            start: self.start_time,
            end: self.end_time,
        }
    }

    /// Append a raw anomaly, widening the span to cover it.
    pub fn absorb(&mut self, raw: RawAnomalyResult) {
        self.start_time = self.start_time.min(raw.start_time);
        self.end_time = self.end_time.max(raw.end_time);
        let pos = self
            .raw_anomalies
            .partition_point(|r| r.start_time <= raw.start_time);
        self.raw_anomalies.insert(pos, raw);
    }
}
