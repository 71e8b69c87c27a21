use tidewatch_core::MergedAnomalyResult;

use crate::context::DetectionContext;
use crate::error::DetectError;

/// Recomputes a merged anomaly's weight and score from the context's
/// transformed series. Must be idempotent.
pub trait MergeModel: Send + Sync {
    fn update(
        &self,
        ctx: &DetectionContext,
        merged: &mut MergedAnomalyResult,
    ) -> Result<(), DetectError>;
}

/// Seasonal re-weighting: compares the observed total inside the merged span
/// with the average of the baseline totals at the matching seasonal offsets.
#[derive(Debug, Clone)]
pub struct SeasonalMergeModel {
    offsets: Vec<u32>,
    period_millis: i64,
}

impl SeasonalMergeModel {
    pub fn new(offsets: Vec<u32>, period_millis: i64) -> Self {
        Self {
            offsets,
            period_millis,
        }
    }
}

impl MergeModel for SeasonalMergeModel {
    fn update(
        &self,
        ctx: &DetectionContext,
        merged: &mut MergedAnomalyResult,
    ) -> Result<(), DetectError> {
        let (observed, baselines) = ctx.transformed()?;
        if baselines.len() != self.offsets.len() {
            return Err(DetectError::BaselineCountMismatch {
                expected: self.offsets.len(),
                actual: baselines.len(),
            });
        }

        let span = merged.interval();
        let mut observed_total = 0.0;
        let mut baseline_total = 0.0;
        for (t, value) in observed.iter().filter(|(t, _)| span.contains(*t)) {
            observed_total += value;
            for (baseline, offset) in baselines.iter().zip(&self.offsets) {
                baseline_total += baseline.get_or_zero(t - self.period_millis * i64::from(*offset));
            }
        }

        let avg = if baselines.is_empty() {
            0.0
        } else {
            baseline_total / baselines.len() as f64
        };
        merged.weight = if avg == 0.0 {
            0.0
        } else {
            (observed_total - avg) / avg
        };

        merged.score = if merged.raw_anomalies.is_empty() {
            0.0
        } else {
            merged.raw_anomalies.iter().map(|r| r.score).sum::<f64>()
                / merged.raw_anomalies.len() as f64
        };
        Ok(())
    }
}
