//! Threshold detection of observed vs expected values.

use tidewatch_core::{RawAnomalyResult, TimeSeries};

use crate::context::DetectionContext;
use crate::error::DetectError;

/// Compares a context's transformed observed series with an expectation and
/// emits raw anomalies ordered by start time, never overlapping.
pub trait DetectionModel: Send + Sync {
    fn detect(
        &self,
        ctx: &DetectionContext,
        expected: &TimeSeries,
    ) -> Result<Vec<RawAnomalyResult>, DetectError>;
}

/// Flags buckets whose relative change `(observed - expected) / expected`
/// reaches `change_threshold` in absolute value.
///
/// Buckets with no expectation, or an expectation of exactly zero, never
/// contribute. With `merge_contiguous` set, adjacent flagged buckets form a
/// single anomaly whose weight is computed from the run's sums; otherwise
/// each flagged bucket is its own anomaly.
#[derive(Debug, Clone)]
pub struct SimpleThresholdDetection {
    change_threshold: f64,
    merge_contiguous: bool,
}

/// Accumulator for a run of flagged buckets.
struct Run {
    start: i64,
    end: i64,
    observed: f64,
    expected: f64,
}

impl Run {
    fn weight(&self) -> f64 {
        if self.expected == 0.0 {
            0.0
        } else {
            (self.observed - self.expected) / self.expected
        }
    }
}

impl SimpleThresholdDetection {
    pub fn new(change_threshold: f64) -> Self {
        Self {
            change_threshold,
            merge_contiguous: false,
        }
    }

    pub fn with_merge_contiguous(mut self, merge_contiguous: bool) -> Self {
        self.merge_contiguous = merge_contiguous;
        self
    }

    pub fn change_threshold(&self) -> f64 {
        self.change_threshold
    }
}

impl DetectionModel for SimpleThresholdDetection {
    fn detect(
        &self,
        ctx: &DetectionContext,
        expected: &TimeSeries,
    ) -> Result<Vec<RawAnomalyResult>, DetectError> {
        let (observed, _) = ctx.transformed()?;
        let bucket = observed.bucket_millis();

        // Score is the magnitude of the window's mean observed value, over
        // every bucket of the interval whether present or not.
        let buckets = observed.bucket_count();
        let score = if buckets > 0 {
            (observed.total() / buckets as f64).abs()
        } else {
            0.0
        };

        let finish = |run: Run| RawAnomalyResult {
            start_time: run.start,
            end_time: run.end,
            weight: run.weight(),
            score,
            dimensions: ctx.key().dimensions.clone(),
            function_id: ctx.function_id(),
        };

        let mut anomalies = Vec::new();
        let mut open: Option<Run> = None;

        for (t, value) in observed.iter() {
            let Some(predicted) = expected.get(t) else {
                continue;
            };
            if predicted == 0.0 {
                continue;
            }

            let change = (value - predicted) / predicted;
            if change.abs() < self.change_threshold {
                if let Some(run) = open.take() {
                    anomalies.push(finish(run));
                }
                continue;
            }

            match open.as_mut() {
                Some(run) if self.merge_contiguous && run.end == t => {
                    run.end = t + bucket;
                    run.observed += value;
                    run.expected += predicted;
                }
                _ => {
                    if let Some(run) = open.take() {
                        anomalies.push(finish(run));
                    }
                    open = Some(Run {
                        start: t,
                        end: t + bucket,
                        observed: value,
                        expected: predicted,
                    });
                }
            }
        }
        if let Some(run) = open.take() {
            anomalies.push(finish(run));
        }

        Ok(anomalies)
    }
}
