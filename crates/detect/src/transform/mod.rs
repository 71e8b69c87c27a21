//! Series-to-series transforms applied identically to observed and baseline
//! series before prediction.

mod moving_average;

pub use moving_average::MovingAverageSmoothing;

use tidewatch_core::TimeSeries;

use crate::error::DetectError;
use crate::properties::{
    FunctionProperties, DEFAULT_SMOOTHING_WINDOW_SIZE, ENABLE_SMOOTHING,
    MOVING_AVERAGE_SMOOTHING_WINDOW_SIZE,
};

/// A pure transform. Implementations must be deterministic and must not keep
/// state between calls; each series is transformed on its own.
pub trait TransformFunction: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn transform(&self, series: &TimeSeries) -> Result<TimeSeries, DetectError>;
}

/// Ordered list of transforms. An empty pipeline returns copies of its input.
#[derive(Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn TransformFunction>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transform: Box<dyn TransformFunction>) {
        self.transforms.push(transform);
    }

    /// Build the pipeline described by `ENABLE_SMOOTHING` and
    /// `MOVING_AVERAGE_SMOOTHING_WINDOW_SIZE`.
    pub fn from_properties(props: &FunctionProperties) -> Result<Self, DetectError> {
        let mut pipeline = Self::new();
        if props.flag(ENABLE_SMOOTHING)? {
            let window: usize =
                props.parse_or(MOVING_AVERAGE_SMOOTHING_WINDOW_SIZE, DEFAULT_SMOOTHING_WINDOW_SIZE)?;
            pipeline.push(Box::new(MovingAverageSmoothing::new(window)?));
        }
        Ok(pipeline)
    }

    pub fn apply(&self, series: &TimeSeries) -> Result<TimeSeries, DetectError> {
        let mut current = series.clone();
        for transform in &self.transforms {
            current = transform.transform(&current)?;
        }
        Ok(current)
    }

    pub fn names(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}
