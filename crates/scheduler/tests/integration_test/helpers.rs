use std::sync::Arc;

use tidewatch_core::time::{MILLIS_PER_SECOND, MILLIS_PER_WEEK};
use tidewatch_core::{DimensionMap, Frequency, TimeSeriesKey, TimeUnit};
use tidewatch_detect::{DetectionFunctionSpec, FunctionProperties};
use tidewatch_scheduler::{InMemoryDataSource, MonitorSettings, Scheduler, SchedulerConfig};
use tidewatch_store::Stores;

/// Start of the evaluated window; aligned to whole seconds.
pub const T0: i64 = 1_700_000_000_000;

pub const METRIC: &str = "page_views";

pub fn dims(country: &str) -> DimensionMap {
    [("country", country)].into_iter().collect()
}

pub fn key(country: &str) -> TimeSeriesKey {
    TimeSeriesKey::new(METRIC, dims(country))
}

/// Week-over-week against the two-week average: 1s buckets, 5s windows,
/// 10s fixed delay.
pub fn wow_function(id: u64, name: &str, countries: &[&str]) -> DetectionFunctionSpec {
    let mut spec = DetectionFunctionSpec::new(id, name, METRIC)
        .with_targets(countries.iter().map(|c| dims(c)).collect())
        .with_properties(
            FunctionProperties::new()
                .with("BASELINE", "w/2wAvg")
                .with("CHANGE_THRESHOLD", "0.2")
                .with("BUCKET_SIZE", "1")
                .with("BUCKET_UNIT", "SECONDS"),
        );
    spec.window_size = 5;
    spec.window_unit = TimeUnit::Seconds;
    spec.frequency = Frequency::new(10, TimeUnit::Seconds);
    spec
}

pub fn config(functions: Vec<DetectionFunctionSpec>) -> SchedulerConfig {
    SchedulerConfig {
        pool_size: 4,
        monitor: MonitorSettings {
            enabled: false,
            ..MonitorSettings::default()
        },
        functions,
    }
}

pub fn make_scheduler(
    functions: Vec<DetectionFunctionSpec>,
    source: Arc<InMemoryDataSource>,
) -> Arc<Scheduler> {
    Arc::new(Scheduler::new(config(functions), Stores::in_memory(), source))
}

/// One value per second starting at `start`.
pub fn seed(source: &InMemoryDataSource, key: &TimeSeriesKey, start: i64, values: &[f64]) {
    source.insert_values(key, start, MILLIS_PER_SECOND, values);
}

/// Observed `[10,15,13,27,10]` from `start` with baselines one and two weeks
/// back. Against the two-week average `[10,15,10,22,12]` the third and
/// fourth buckets exceed a 0.2 threshold.
pub fn seed_spike(source: &InMemoryDataSource, key: &TimeSeriesKey, start: i64) {
    seed(source, key, start, &[10.0, 15.0, 13.0, 27.0, 10.0]);
    seed(source, key, start - MILLIS_PER_WEEK, &[10.0, 20.0, 15.0, 24.0, 14.0]);
    seed(source, key, start - 2 * MILLIS_PER_WEEK, &[10.0, 10.0, 5.0, 20.0, 10.0]);
}

/// `seconds` buckets of the same value in the window and both baselines.
pub fn seed_flat(source: &InMemoryDataSource, key: &TimeSeriesKey, start: i64, seconds: usize) {
    let values = vec![10.0; seconds];
    for weeks in 0..=2 {
        seed(source, key, start - weeks * MILLIS_PER_WEEK, &values);
    }
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-3
}
