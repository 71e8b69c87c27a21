//! Expected-value prediction from seasonal baselines.

use serde::{Deserialize, Serialize};

use tidewatch_core::{Interval, TimeSeries};

use crate::error::DetectError;

/// How the values of several baselines combine into one expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    /// Exactly one baseline; its value is the expectation.
    Single,
    Average,
    Median,
}

/// Treatment of baseline buckets that have no value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FillPolicy {
    /// Missing buckets count as zero and still count toward the divisor.
    #[default]
    ZeroFill,
    /// Missing buckets are left out; a bucket with no baseline values at all
    /// has no expectation.
    SkipMissing,
}

impl std::str::FromStr for FillPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ZERO_FILL" => Ok(FillPolicy::ZeroFill),
            "SKIP_MISSING" => Ok(FillPolicy::SkipMissing),
            _ => Err(()),
        }
    }
}

/// Produces an expected-value series over the observed interval.
pub trait PredictionModel: Send + Sync {
    fn predict(
        &self,
        observed: Interval,
        bucket_millis: i64,
        baselines: &[TimeSeries],
    ) -> Result<TimeSeries, DetectError>;
}

/// Seasonal prediction: the expectation for observed bucket `t` combines
/// `baseline[k](t - offsets[k] * period)` across all baselines.
#[derive(Debug, Clone)]
pub struct SeasonalPrediction {
    offsets: Vec<u32>,
    period_millis: i64,
    aggregation: Aggregation,
    fill: FillPolicy,
}

impl SeasonalPrediction {
    pub fn new(offsets: Vec<u32>, period_millis: i64, aggregation: Aggregation) -> Self {
        Self {
            offsets,
            period_millis,
            aggregation,
            fill: FillPolicy::ZeroFill,
        }
    }

    pub fn with_fill_policy(mut self, fill: FillPolicy) -> Self {
        self.fill = fill;
        self
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn period_millis(&self) -> i64 {
        self.period_millis
    }

    fn combine(&self, mut values: Vec<f64>, baseline_count: usize) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self.aggregation {
            Aggregation::Single | Aggregation::Average => {
                let divisor = match self.fill {
                    FillPolicy::ZeroFill => baseline_count,
                    FillPolicy::SkipMissing => values.len(),
                };
                Some(values.iter().sum::<f64>() / divisor as f64)
            }
            Aggregation::Median => {
                values.sort_by(|a, b| a.total_cmp(b));
                let mid = values.len() / 2;
                if values.len() % 2 == 0 {
                    Some((values[mid - 1] + values[mid]) / 2.0)
                } else {
                    Some(values[mid])
                }
            }
        }
    }
}

impl PredictionModel for SeasonalPrediction {
    fn predict(
        &self,
        observed: Interval,
        bucket_millis: i64,
        baselines: &[TimeSeries],
    ) -> Result<TimeSeries, DetectError> {
        if baselines.len() != self.offsets.len() {
            return Err(DetectError::BaselineCountMismatch {
                expected: self.offsets.len(),
                actual: baselines.len(),
            });
        }

        let mut expected = TimeSeries::new(observed, bucket_millis)?;
        let mut t = observed.start;
        while t < observed.end {
            let values: Vec<f64> = baselines
                .iter()
                .zip(&self.offsets)
                .filter_map(|(baseline, offset)| {
                    let at = t - self.period_millis * i64::from(*offset);
                    match self.fill {
                        FillPolicy::ZeroFill => Some(baseline.get_or_zero(at)),
                        FillPolicy::SkipMissing => baseline.get(at),
                    }
                })
                .collect();

            if let Some(value) = self.combine(values, baselines.len()) {
                expected.set(t, value)?;
            }
            t += bucket_millis;
        }
        Ok(expected)
    }
}

#[cfg(test)]
mod tests {
    use tidewatch_core::time::MILLIS_PER_WEEK;

    use super::*;

    const T0: i64 = 1_000 + 2 * MILLIS_PER_WEEK;

    fn baselines() -> Vec<TimeSeries> {
        vec![
            TimeSeries::from_values(T0 - MILLIS_PER_WEEK, 1_000, &[10.0, 20.0, 15.0, 24.0, 14.0])
                .unwrap(),
            TimeSeries::from_values(T0 - 2 * MILLIS_PER_WEEK, 1_000, &[10.0, 10.0, 5.0, 20.0, 10.0])
                .unwrap(),
        ]
    }

    #[test]
    fn average_of_two_weeks() {
        let model = SeasonalPrediction::new(vec![1, 2], MILLIS_PER_WEEK, Aggregation::Average);
        let interval = Interval::new(T0, T0 + 5_000).unwrap();
        let expected = model.predict(interval, 1_000, &baselines()).unwrap();

        let values: Vec<f64> = expected.iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![10.0, 15.0, 10.0, 22.0, 12.0]);
    }

    #[test]
    fn zero_fill_keeps_divisor() {
        let mut sparse = baselines();
        sparse[1].set_interval(Interval::new(T0 - 2 * MILLIS_PER_WEEK, T0 - 2 * MILLIS_PER_WEEK).unwrap());
        let interval = Interval::new(T0, T0 + 1_000).unwrap();

        let zero_fill = SeasonalPrediction::new(vec![1, 2], MILLIS_PER_WEEK, Aggregation::Average);
        assert_eq!(zero_fill.predict(interval, 1_000, &sparse).unwrap().get(T0), Some(5.0));

        let skip = zero_fill.clone().with_fill_policy(FillPolicy::SkipMissing);
        assert_eq!(skip.predict(interval, 1_000, &sparse).unwrap().get(T0), Some(10.0));
    }

    #[test]
    fn skip_missing_leaves_gaps_without_values() {
        let empty = TimeSeries::new(Interval::new(0, 0).unwrap(), 1_000).unwrap();
        let model = SeasonalPrediction::new(vec![1], MILLIS_PER_WEEK, Aggregation::Single)
            .with_fill_policy(FillPolicy::SkipMissing);
        let interval = Interval::new(T0, T0 + 2_000).unwrap();
        let expected = model.predict(interval, 1_000, &[empty]).unwrap();
        assert!(expected.is_empty());
    }

    #[test]
    fn median_of_three() {
        let third = TimeSeries::from_values(T0 - 3 * MILLIS_PER_WEEK, 1_000, &[100.0]).unwrap();
        let mut series = baselines();
        series.push(third);
        let model = SeasonalPrediction::new(vec![1, 2, 3], MILLIS_PER_WEEK, Aggregation::Median);
        let interval = Interval::new(T0, T0 + 1_000).unwrap();
        assert_eq!(model.predict(interval, 1_000, &series).unwrap().get(T0), Some(10.0));
    }

    #[test]
    fn baseline_count_must_match_offsets() {
        let model = SeasonalPrediction::new(vec![1, 2, 3], MILLIS_PER_WEEK, Aggregation::Average);
        let interval = Interval::new(T0, T0 + 1_000).unwrap();
        assert!(matches!(
            model.predict(interval, 1_000, &baselines()),
            Err(DetectError::BaselineCountMismatch { expected: 3, actual: 2 })
        ));
    }
}
