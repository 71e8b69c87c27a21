use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters for one scheduled stream (a detection function or the monitor).
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamMetrics {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    /// Mean wall time of finished runs.
    pub avg_run_duration: Duration,
    pub last_run: Option<DateTime<Utc>>,
}

/// Scheduler-wide counters, keyed by stream name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    pub streams: HashMap<String, StreamMetrics>,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
}

impl SchedulerMetrics {
    pub fn record_start(&mut self, stream: &str) {
        let entry = self.streams.entry(stream.to_string()).or_default();
        entry.runs_started += 1;
        entry.last_run = Some(Utc::now());
    }

    /// Record a finished run of `stream`.
    pub fn record_run(&mut self, stream: &str, duration: Duration, ok: bool) {
        let entry = self.streams.entry(stream.to_string()).or_default();
        if ok {
            entry.runs_completed += 1;
        } else {
            entry.runs_failed += 1;
        }

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let count = entry.runs_completed + entry.runs_failed;
        entry.avg_run_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = entry.avg_run_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    pub fn record_task(&mut self, ok: bool) {
        if ok {
            self.tasks_completed += 1;
        } else {
            self.tasks_failed += 1;
        }
    }

    pub fn stream(&self, name: &str) -> Option<&StreamMetrics> {
        self.streams.get(name)
    }
}
