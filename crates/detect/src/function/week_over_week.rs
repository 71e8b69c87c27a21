use tracing::debug;

use tidewatch_core::time::MILLIS_PER_WEEK;
use tidewatch_core::{Interval, MergedAnomalyResult, RawAnomalyResult};

use super::AnomalyFunction;
use crate::context::DetectionContext;
use crate::detection::{DetectionModel, SimpleThresholdDetection};
use crate::error::DetectError;
use crate::merge::{MergeModel, SeasonalMergeModel};
use crate::prediction::{FillPolicy, PredictionModel, SeasonalPrediction};
use crate::properties::{
    BaselineSpec, FunctionProperties, BASELINE, BASELINE_FILL_POLICY, CHANGE_THRESHOLD,
    DEFAULT_BASELINE, MERGE_CONTIGUOUS_BUCKETS,
};
use crate::transform::TransformPipeline;

/// Compares the current window with the same window one or more weeks back.
///
/// Configured entirely from [`FunctionProperties`]; all parsing happens in
/// [`WeekOverWeekRule::init`], so a constructed rule cannot fail on
/// configuration at evaluation time.
pub struct WeekOverWeekRule {
    id: u64,
    name: String,
    metric: String,
    bucket_millis: i64,
    baseline: BaselineSpec,
    transforms: TransformPipeline,
    prediction: SeasonalPrediction,
    detection: SimpleThresholdDetection,
    merge_model: SeasonalMergeModel,
}

impl WeekOverWeekRule {
    pub fn init(
        id: u64,
        name: impl Into<String>,
        metric: impl Into<String>,
        props: &FunctionProperties,
    ) -> Result<Self, DetectError> {
        let baseline = BaselineSpec::parse(props.get_or(BASELINE, DEFAULT_BASELINE))?;
        let change_threshold: f64 = props.parse_required(CHANGE_THRESHOLD)?;
        let merge_contiguous = props.flag(MERGE_CONTIGUOUS_BUCKETS)?;
        let fill: FillPolicy = props.parse_or(BASELINE_FILL_POLICY, FillPolicy::ZeroFill)?;
        let bucket_millis = props.bucket_millis()?;
        let transforms = TransformPipeline::from_properties(props)?;

        let offsets = baseline.offsets();
        Ok(Self {
            id,
            name: name.into(),
            metric: metric.into(),
            bucket_millis,
            prediction: SeasonalPrediction::new(
                offsets.clone(),
                MILLIS_PER_WEEK,
                baseline.aggregation,
            )
            .with_fill_policy(fill),
            detection: SimpleThresholdDetection::new(change_threshold)
                .with_merge_contiguous(merge_contiguous),
            merge_model: SeasonalMergeModel::new(offsets, MILLIS_PER_WEEK),
            baseline,
            transforms,
        })
    }

    pub fn baseline(&self) -> &BaselineSpec {
        &self.baseline
    }

    pub fn change_threshold(&self) -> f64 {
        self.detection.change_threshold()
    }
}

impl AnomalyFunction for WeekOverWeekRule {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn metric(&self) -> &str {
        &self.metric
    }

    fn bucket_millis(&self) -> i64 {
        self.bucket_millis
    }

    fn data_range_intervals(&self, window: Interval) -> Vec<Interval> {
        let mut intervals = Vec::with_capacity(self.prediction.offsets().len() + 1);
        intervals.push(window);
        for offset in self.prediction.offsets() {
            intervals.push(window.shifted_back(MILLIS_PER_WEEK * i64::from(*offset)));
        }
        intervals
    }

    fn analyze(&self, ctx: &mut DetectionContext) -> Result<Vec<RawAnomalyResult>, DetectError> {
        ctx.apply_transforms(&self.transforms)?;
        let (observed, baselines) = ctx.transformed()?;
        let expected = self
            .prediction
            .predict(observed.interval(), observed.bucket_millis(), baselines)?;
        let anomalies = self.detection.detect(ctx, &expected)?;
        debug!(
            function = %self.name,
            key = %ctx.key(),
            buckets = observed.len(),
            anomalies = anomalies.len(),
            "analyzed"
        );
        Ok(anomalies)
    }

    fn update_merged_anomaly_info(
        &self,
        ctx: &mut DetectionContext,
        merged: &mut MergedAnomalyResult,
    ) -> Result<(), DetectError> {
        if !ctx.is_transformed() {
            ctx.apply_transforms(&self.transforms)?;
        }
        self.merge_model.update(ctx, merged)
    }
}
