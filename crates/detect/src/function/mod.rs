//! Configured detection functions.

mod spec;
mod week_over_week;


pub use spec::{DetectionFunctionSpec, WEEK_OVER_WEEK_RULE};
pub use week_over_week::WeekOverWeekRule;

use std::sync::Arc;

use tidewatch_core::{Interval, MergedAnomalyResult, RawAnomalyResult};

use crate::context::DetectionContext;
use crate::error::DetectError;

/// A detection function ready to evaluate contexts.
///
/// Implementations are shared across worker tasks, so `analyze` takes
/// `&self` and keeps all per-evaluation state in the context.
pub trait AnomalyFunction: Send + Sync {
    fn id(&self) -> u64;

    fn name(&self) -> &str;

    fn metric(&self) -> &str;

    fn bucket_millis(&self) -> i64;

    /// Intervals to fetch for an evaluation of `window`: the window itself
    /// first, then one interval per baseline in context order.
    fn data_range_intervals(&self, window: Interval) -> Vec<Interval>;

    /// Transform, predict and detect. Calling twice on the same context gives
    /// the same result.
    fn analyze(&self, ctx: &mut DetectionContext) -> Result<Vec<RawAnomalyResult>, DetectError>;

    /// Recompute `merged.weight` and `merged.score` against the context.
    fn update_merged_anomaly_info(
        &self,
        ctx: &mut DetectionContext,
        merged: &mut MergedAnomalyResult,
    ) -> Result<(), DetectError>;
}

/// Instantiate the function a spec describes, validating its properties.
pub fn create_function(spec: &DetectionFunctionSpec) -> Result<Arc<dyn AnomalyFunction>, DetectError> {
    match spec.function_type.to_ascii_uppercase().as_str() {
        WEEK_OVER_WEEK_RULE => Ok(Arc::new(WeekOverWeekRule::init(
            spec.id,
            &spec.name,
            &spec.metric,
            &spec.properties,
        )?)),
        _ => Err(DetectError::UnknownFunctionType(spec.function_type.clone())),
    }
}
