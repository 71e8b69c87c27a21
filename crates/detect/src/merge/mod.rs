//! Consolidation of raw anomalies into merged anomalies.
//!
//! Raw anomalies from one evaluation are folded into merged anomalies in
//! start order. A merged anomaly keeps absorbing raw anomalies while they
//! start within `sequential_allowed_gap_millis` of its end and the combined
//! span stays under `max_merge_duration_millis`. Persisted merged anomalies
//! of the same function and dimensions are passed in alongside, so
//! consecutive evaluations (and backfills) grow one finding instead of
//! opening a new one per window, and re-evaluated raw anomalies land back
//! in the merged anomaly that already holds them.

mod model;

pub use model::{MergeModel, SeasonalMergeModel};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use tidewatch_core::time::MILLIS_PER_HOUR;
use tidewatch_core::{MergedAnomalyResult, RawAnomalyResult};

fn default_sequential_allowed_gap() -> i64 {
    2 * MILLIS_PER_HOUR
}

fn default_max_merge_duration() -> i64 {
    12 * MILLIS_PER_HOUR
}

/// Merge thresholds, typically part of a function's TOML entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default = "default_sequential_allowed_gap")]
    pub sequential_allowed_gap_millis: i64,
    #[serde(default = "default_max_merge_duration")]
    pub max_merge_duration_millis: i64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            sequential_allowed_gap_millis: default_sequential_allowed_gap(),
            max_merge_duration_millis: default_max_merge_duration(),
        }
    }
}

impl MergeConfig {
    /// Whether `raw` may extend `merged`: same series, not earlier than the
    /// merged start, within the allowed gap and under the maximum duration.
    fn accepts(&self, merged: &MergedAnomalyResult, raw: &RawAnomalyResult) -> bool {
        if !same_series(merged, raw) || raw.start_time < merged.start_time {
            return false;
        }
        if raw.start_time > merged.end_time + self.sequential_allowed_gap_millis {
            return false;
        }
        let span = merged.end_time.max(raw.end_time) - merged.start_time;
        span <= self.max_merge_duration_millis
    }
}

fn same_series(merged: &MergedAnomalyResult, raw: &RawAnomalyResult) -> bool {
    merged.dimensions == raw.dimensions && merged.function_id == raw.function_id
}

fn overlaps(merged: &MergedAnomalyResult, raw: &RawAnomalyResult) -> bool {
    same_series(merged, raw) && raw.start_time < merged.end_time && raw.end_time > merged.start_time
}

/// Add `raw` to `merged`, replacing a stored raw anomaly with the same
/// interval instead of duplicating it.
fn fold(merged: &mut MergedAnomalyResult, raw: RawAnomalyResult) {
    let duplicate = merged
        .raw_anomalies
        .iter_mut()
        .find(|r| r.start_time == raw.start_time && r.end_time == raw.end_time);
    match duplicate {
        Some(slot) => *slot = raw,
        None => merged.absorb(raw),
    }
}

/// Fold `raws` into merged anomalies for `metric`.
///
/// Returns the merged anomalies that were created or changed, in start
/// order. `existing` appears in the output only if at least one raw anomaly
/// was absorbed into it. Weight and score are provisional; run a
/// [`MergeModel`] over each result.
pub fn merge_raw_anomalies(
    metric: &str,
    raws: Vec<RawAnomalyResult>,
    existing: Option<MergedAnomalyResult>,
    config: &MergeConfig,
) -> Vec<MergedAnomalyResult> {
    merge_with_persisted(metric, raws, existing.into_iter().collect(), config)
}

/// Fold `raws` into merged anomalies for `metric`, given every persisted
/// merged anomaly of the series that lies near the evaluated window.
///
/// A raw anomaly overlapping a persisted merged anomaly lands in the
/// earliest one it overlaps. Any other raw anomaly extends the merged
/// anomaly ending closest before it when [`MergeConfig`] allows, and opens
/// a new one otherwise. Re-evaluating a window therefore never stretches
/// one merged anomaly over another.
///
/// Returns the merged anomalies that were created or changed, in start
/// order.
pub fn merge_with_persisted(
    metric: &str,
    mut raws: Vec<RawAnomalyResult>,
    persisted: Vec<MergedAnomalyResult>,
    config: &MergeConfig,
) -> Vec<MergedAnomalyResult> {
    raws.sort_by_key(|r| (r.start_time, r.end_time));

    // (merged, changed by this call), in start order
    let mut slots: Vec<(MergedAnomalyResult, bool)> =
        persisted.into_iter().map(|m| (m, false)).collect();
    slots.sort_by_key(|(m, _)| (m.start_time, m.id));

    for raw in raws {
        let target = slots
            .iter()
            .position(|(m, _)| overlaps(m, &raw))
            .or_else(|| {
                slots
                    .iter()
                    .enumerate()
                    .filter(|(_, (m, _))| same_series(m, &raw) && m.end_time <= raw.start_time)
                    .max_by_key(|(_, (m, _))| m.end_time)
                    .map(|(i, _)| i)
                    .filter(|&i| config.accepts(&slots[i].0, &raw))
            });

        match target {
            Some(i) => {
                let (merged, touched) = &mut slots[i];
                fold(merged, raw);
                *touched = true;
            }
            None => {
                let pos = slots.partition_point(|(m, _)| m.start_time <= raw.start_time);
                slots.insert(pos, (MergedAnomalyResult::from_raw(metric, raw), true));
            }
        }
    }

    let now = Utc::now();
    slots
        .into_iter()
        .filter_map(|(mut merged, touched)| {
            touched.then(|| {
                merged.update_time = now;
                merged
            })
        })
        .collect()
}
