//! Fixed-delay detection scheduler.
//!
//! Each active detection function gets its own trigger loop. A run creates a
//! job, fans out one task per target on a shared bounded worker pool, merges
//! and persists the anomalies each task finds, then marks the job terminal.
//! A retention monitor stream deletes finished jobs past their retention.

pub mod data_source;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod runner;
pub mod types;

pub use data_source::{DataSource, DataSourceError, FixtureSeries, InMemoryDataSource};
pub use error::SchedulerError;
pub use metrics::{SchedulerMetrics, StreamMetrics};
pub use monitor::{RetentionMonitor, RETENTION_STREAM};
pub use runner::Scheduler;
pub use types::{BackfillSummary, MonitorSettings, RunSummary, SchedulerConfig};
