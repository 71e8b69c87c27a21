use tidewatch_core::{TimeSeries, TimeSeriesKey};

use crate::error::DetectError;
use crate::transform::TransformPipeline;

/// The unit of work for one evaluation: a target key, its observed series,
/// the baseline series (in the order the function's offsets expect), and the
/// transformed copies of each.
///
/// Transforms never overwrite the originals, so a context can be re-analyzed
/// or re-merged any number of times with the same result.
#[derive(Debug, Clone)]
pub struct DetectionContext {
    key: TimeSeriesKey,
    function_id: Option<u64>,
    current: TimeSeries,
    baselines: Vec<TimeSeries>,
    transformed_current: Option<TimeSeries>,
    transformed_baselines: Vec<TimeSeries>,
}

impl DetectionContext {
    pub fn new(key: TimeSeriesKey, current: TimeSeries, baselines: Vec<TimeSeries>) -> Self {
        Self {
            key,
            function_id: None,
            current,
            baselines,
            transformed_current: None,
            transformed_baselines: Vec::new(),
        }
    }

    pub fn with_function_id(mut self, function_id: u64) -> Self {
        self.function_id = Some(function_id);
        self
    }

    pub fn key(&self) -> &TimeSeriesKey {
        &self.key
    }

    pub fn function_id(&self) -> Option<u64> {
        self.function_id
    }

    pub fn current(&self) -> &TimeSeries {
        &self.current
    }

    pub fn baselines(&self) -> &[TimeSeries] {
        &self.baselines
    }

    pub fn transformed_current(&self) -> Option<&TimeSeries> {
        self.transformed_current.as_ref()
    }

    pub fn transformed_baselines(&self) -> &[TimeSeries] {
        &self.transformed_baselines
    }

    pub fn is_transformed(&self) -> bool {
        self.transformed_current.is_some()
    }

    /// Run `pipeline` over the observed series and, independently, over each
    /// baseline. Always starts from the originals.
    pub fn apply_transforms(&mut self, pipeline: &TransformPipeline) -> Result<(), DetectError> {
        let current = pipeline.apply(&self.current)?;
        let baselines = self
            .baselines
            .iter()
            .map(|b| pipeline.apply(b))
            .collect::<Result<Vec<_>, _>>()?;
        self.transformed_current = Some(current);
        self.transformed_baselines = baselines;
        Ok(())
    }

    /// Transformed observed and baselines, or an error if no transform has run.
    pub fn transformed(&self) -> Result<(&TimeSeries, &[TimeSeries]), DetectError> {
        let current = self
            .transformed_current
            .as_ref()
            .ok_or(DetectError::NotTransformed)?;
        Ok((current, &self.transformed_baselines))
    }
}
