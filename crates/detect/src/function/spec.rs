use serde::{Deserialize, Serialize};

use tidewatch_core::{DimensionMap, Frequency, TimeSeriesKey, TimeUnit};

use crate::merge::MergeConfig;
use crate::properties::FunctionProperties;

pub const WEEK_OVER_WEEK_RULE: &str = "WEEK_OVER_WEEK_RULE";

fn default_function_type() -> String {
    WEEK_OVER_WEEK_RULE.to_string()
}

fn default_targets() -> Vec<DimensionMap> {
    vec![DimensionMap::new()]
}

fn default_window_size() -> u64 {
    1
}

fn default_window_unit() -> TimeUnit {
    TimeUnit::Days
}

fn default_frequency() -> Frequency {
    Frequency::new(1, TimeUnit::Hours)
}

fn default_active() -> bool {
    true
}

/// Configuration of one detection function instance.
///
/// ```toml
/// [[functions]]
/// id = 1
/// name = "pageviews_wow"
/// metric = "page_views"
/// targets = [{ country = "us" }, { country = "de" }]
/// window_size = 1
/// window_unit = "DAYS"
/// frequency = { size = 1, unit = "HOURS" }
///
/// [functions.properties]
/// BASELINE = "w/2wAvg"
/// CHANGE_THRESHOLD = "0.2"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionFunctionSpec {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type", default = "default_function_type")]
    pub function_type: String,
    pub metric: String,
    /// Dimension combinations evaluated by each run, one task per entry.
    #[serde(default = "default_targets")]
    pub targets: Vec<DimensionMap>,
    #[serde(default)]
    pub properties: FunctionProperties,
    /// Length of the evaluated window ending at the trigger time.
    #[serde(default = "default_window_size")]
    pub window_size: u64,
    #[serde(default = "default_window_unit")]
    pub window_unit: TimeUnit,
    /// Fixed delay between runs.
    #[serde(default = "default_frequency")]
    pub frequency: Frequency,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub merge: MergeConfig,
}

impl DetectionFunctionSpec {
    pub fn new(id: u64, name: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            function_type: default_function_type(),
            metric: metric.into(),
            targets: default_targets(),
            properties: FunctionProperties::new(),
            window_size: default_window_size(),
            window_unit: default_window_unit(),
            frequency: default_frequency(),
            active: default_active(),
            merge: MergeConfig::default(),
        }
    }

    pub fn with_properties(mut self, properties: FunctionProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_targets(mut self, targets: Vec<DimensionMap>) -> Self {
        self.targets = targets;
        self
    }

    /// Series keys evaluated per run. An empty target list means the
    /// unsliced metric.
    pub fn keys(&self) -> Vec<TimeSeriesKey> {
        if self.targets.is_empty() {
            return vec![TimeSeriesKey::new(&self.metric, DimensionMap::new())];
        }
        self.targets
            .iter()
            .map(|dims| TimeSeriesKey::new(&self.metric, dims.clone()))
            .collect()
    }

    pub fn window_millis(&self) -> i64 {
        self.window_unit.to_millis(self.window_size as i64)
    }
}
