//! Anomaly detection engine.
//!
//! A detection function turns a [`DetectionContext`] (observed series plus
//! seasonal baselines) into raw anomalies:
//!
//! - [`transform`]: series-to-series transforms such as moving-average smoothing
//! - [`prediction`]: expected values derived from the baselines
//! - [`detection`]: threshold comparison of observed vs expected
//! - [`merge`]: consolidation of raw anomalies and weight/score recomputation
//! - [`function`]: configured detection functions wiring the models together

pub mod context;
pub mod detection;
pub mod error;
pub mod function;
pub mod merge;
pub mod prediction;
pub mod properties;
pub mod transform;

pub use context::DetectionContext;
pub use detection::{DetectionModel, SimpleThresholdDetection};
pub use error::DetectError;
pub use function::{
    create_function, AnomalyFunction, DetectionFunctionSpec, WeekOverWeekRule,
};
pub use merge::{
    merge_raw_anomalies, merge_with_persisted, MergeConfig, MergeModel, SeasonalMergeModel,
};
pub use prediction::{Aggregation, FillPolicy, PredictionModel, SeasonalPrediction};
pub use properties::{parse_wow_string, BaselineSpec, FunctionProperties};
pub use transform::{MovingAverageSmoothing, TransformFunction, TransformPipeline};
