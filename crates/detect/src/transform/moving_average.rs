use tidewatch_core::{Interval, TimeSeries};

use crate::error::DetectError;
use crate::properties::MOVING_AVERAGE_SMOOTHING_WINDOW_SIZE;

use super::TransformFunction;

/// Trailing moving average over `window` buckets.
///
/// The output interval starts `window - 1` buckets after the input start, so a
/// dense series of N buckets becomes N - window + 1 buckets. Each output value
/// is the mean of the values present among its `window` trailing buckets.
#[derive(Debug, Clone)]
pub struct MovingAverageSmoothing {
    window: usize,
}

impl MovingAverageSmoothing {
    pub fn new(window: usize) -> Result<Self, DetectError> {
        if window == 0 {
            return Err(DetectError::InvalidProperty {
                key: MOVING_AVERAGE_SMOOTHING_WINDOW_SIZE.to_string(),
                value: window.to_string(),
            });
        }
        Ok(Self { window })
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl TransformFunction for MovingAverageSmoothing {
    fn name(&self) -> &str {
        "moving_average_smoothing"
    }

    fn transform(&self, series: &TimeSeries) -> Result<TimeSeries, DetectError> {
        let bucket = series.bucket_millis();
        let input = series.interval();
        let lag = bucket * (self.window as i64 - 1);
        let start = (input.start + lag).min(input.end);
        let output = Interval::new(start, input.end)?;

        let mut smoothed = TimeSeries::new(output, bucket)?;
        for t in series.timestamp_set() {
            if !output.contains(t) {
                continue;
            }
            let (sum, count) = (0..self.window as i64)
                .filter_map(|i| series.get(t - bucket * i))
                .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
            // `t` itself is present, so count >= 1.
            smoothed.set(t, sum / count as f64)?;
        }
        Ok(smoothed)
    }
}
