//! Sparse, bucketed time series.
//!
//! A [`TimeSeries`] maps bucket-aligned epoch-millisecond timestamps to
//! values over an explicit half-open [`Interval`]. Missing buckets are
//! absent, not zero: callers that want zero-fill use
//! [`TimeSeries::get_or_zero`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SeriesError;

/// Half-open time interval `[start, end)` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    pub fn new(start: i64, end: i64) -> Result<Self, SeriesError> {
        if end < start {
            return Err(SeriesError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }

    pub fn duration_millis(&self) -> i64 {
        self.end - self.start
    }

    /// The same interval moved `offset` milliseconds into the past.
    pub fn shifted_back(&self, offset: i64) -> Self {
        Self {
            start: self.start - offset,
            end: self.end - offset,
        }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether `other` lies entirely inside this interval.
    pub fn covers(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Sparse timestamp → value container with a declared interval and bucket size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    values: BTreeMap<i64, f64>,
    interval: Interval,
    bucket_millis: i64,
}

impl TimeSeries {
    /// Create an empty series over `interval` with `bucket_millis` buckets.
    pub fn new(interval: Interval, bucket_millis: i64) -> Result<Self, SeriesError> {
        if bucket_millis <= 0 {
            return Err(SeriesError::InvalidBucket(bucket_millis));
        }
        Ok(Self {
            values: BTreeMap::new(),
            interval,
            bucket_millis,
        })
    }

    /// Build a dense series from consecutive bucket values starting at `start`.
    pub fn from_values(start: i64, bucket_millis: i64, values: &[f64]) -> Result<Self, SeriesError> {
        let end = start + bucket_millis * values.len() as i64;
        let mut series = Self::new(Interval::new(start, end)?, bucket_millis)?;
        for (i, value) in values.iter().enumerate() {
            series.set(start + bucket_millis * i as i64, *value)?;
        }
        Ok(series)
    }

    /// Insert or overwrite the value at `timestamp`.
    pub fn set(&mut self, timestamp: i64, value: f64) -> Result<(), SeriesError> {
        if !self.interval.contains(timestamp) {
            return Err(SeriesError::OutOfInterval {
                timestamp,
                start: self.interval.start,
                end: self.interval.end,
            });
        }
        if (timestamp - self.interval.start) % self.bucket_millis != 0 {
            return Err(SeriesError::Misaligned {
                timestamp,
                start: self.interval.start,
                bucket_millis: self.bucket_millis,
            });
        }
        self.values.insert(timestamp, value);
        Ok(())
    }

    pub fn get(&self, timestamp: i64) -> Option<f64> {
        self.values.get(&timestamp).copied()
    }

    /// Value at `timestamp`, treating a missing bucket as zero.
    pub fn get_or_zero(&self, timestamp: i64) -> f64 {
        self.get(timestamp).unwrap_or(0.0)
    }

    pub fn has_timestamp(&self, timestamp: i64) -> bool {
        self.values.contains_key(&timestamp)
    }

    /// Present timestamps in ascending order.
    pub fn timestamp_set(&self) -> impl Iterator<Item = i64> + '_ {
        self.values.keys().copied()
    }

    /// Present `(timestamp, value)` pairs in ascending timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.values.iter().map(|(t, v)| (*t, *v))
    }

    /// Replace the interval. Keys falling outside it, or no longer aligned
    /// to its start, are dropped.
    pub fn set_interval(&mut self, interval: Interval) {
        let bucket = self.bucket_millis;
        self.values
            .retain(|t, _| interval.contains(*t) && (*t - interval.start) % bucket == 0);
        self.interval = interval;
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn bucket_millis(&self) -> i64 {
        self.bucket_millis
    }

    /// Number of buckets the interval spans, present or not.
    pub fn bucket_count(&self) -> i64 {
        self.interval.duration_millis() / self.bucket_millis
    }

    /// Number of present values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of all present values.
    pub fn total(&self) -> f64 {
        self.values.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> TimeSeries {
        TimeSeries::new(Interval::new(1_000, 6_000).unwrap(), 1_000).unwrap()
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut ts = series();
        for (i, v) in [0.1, -3.5, 1e12, f64::MIN_POSITIVE, 42.0].iter().enumerate() {
            let t = 1_000 + 1_000 * i as i64;
            ts.set(t, *v).unwrap();
            assert_eq!(ts.get(t), Some(*v));
        }
    }

    #[test]
    fn covers_needs_both_ends_inside() {
        let window = Interval::new(5_000, 10_000).unwrap();
        assert!(window.covers(&Interval::new(5_000, 10_000).unwrap()));
        assert!(window.covers(&Interval::new(6_000, 7_000).unwrap()));
        assert!(!window.covers(&Interval::new(4_000, 6_000).unwrap()));
        assert!(!window.covers(&Interval::new(9_000, 11_000).unwrap()));
    }

    #[test]
    fn set_overwrites() {
        let mut ts = series();
        ts.set(2_000, 1.0).unwrap();
        ts.set(2_000, 7.0).unwrap();
        assert_eq!(ts.get(2_000), Some(7.0));
        assert_eq!(ts.len(), 1);
    }

    #[test]
    fn missing_is_absent_not_zero() {
        let ts = series();
        assert_eq!(ts.get(3_000), None);
        assert_eq!(ts.get_or_zero(3_000), 0.0);
    }

    #[test]
    fn rejects_out_of_interval_and_misaligned() {
        let mut ts = series();
        assert!(matches!(
            ts.set(6_000, 1.0),
            Err(SeriesError::OutOfInterval { .. })
        ));
        assert!(matches!(
            ts.set(1_500, 1.0),
            Err(SeriesError::Misaligned { .. })
        ));
    }

    #[test]
    fn timestamp_set_is_ordered() {
        let mut ts = series();
        ts.set(5_000, 1.0).unwrap();
        ts.set(1_000, 2.0).unwrap();
        ts.set(3_000, 3.0).unwrap();
        let stamps: Vec<i64> = ts.timestamp_set().collect();
        assert_eq!(stamps, vec![1_000, 3_000, 5_000]);
    }

    #[test]
    fn set_interval_drops_outside_keys() {
        let ts_values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let mut ts = TimeSeries::from_values(1_000, 1_000, &ts_values).unwrap();
        ts.set_interval(Interval::new(3_000, 6_000).unwrap());
        assert_eq!(ts.len(), 3);
        assert_eq!(ts.get(2_000), None);
        assert_eq!(ts.bucket_count(), 3);
    }

    #[test]
    fn from_values_is_dense() {
        let ts = TimeSeries::from_values(0, 10, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(ts.interval(), Interval { start: 0, end: 30 });
        assert_eq!(ts.total(), 6.0);
    }

    #[test]
    fn interval_rejects_inverted_bounds() {
        assert!(Interval::new(10, 5).is_err());
        assert!(Interval::new(5, 5).is_ok());
    }
}
