use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::key::TimeSeriesKey;

/// Lifecycle status shared by jobs and tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Scheduled => "SCHEDULED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(JobStatus::Scheduled),
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(CoreError::Other(format!("unknown job status: {other}"))),
        }
    }
}

/// One scheduled evaluation run over a detection window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Assigned by the store on insert.
    pub id: u64,
    pub name: String,
    pub status: JobStatus,
    pub function_id: Option<u64>,
    pub schedule_start_time: DateTime<Utc>,
    /// Set once the job reaches a terminal status.
    pub schedule_end_time: Option<DateTime<Utc>>,
    /// Detection window, epoch milliseconds.
    pub window_start_time: i64,
    pub window_end_time: i64,
    pub update_time: DateTime<Utc>,
}

impl Job {
    pub fn new(name: impl Into<String>, window_start_time: i64, window_end_time: i64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            status: JobStatus::Scheduled,
            function_id: None,
            schedule_start_time: now,
            schedule_end_time: None,
            window_start_time,
            window_end_time,
            update_time: now,
        }
    }

    pub fn with_function(mut self, function_id: u64) -> Self {
        self.function_id = Some(function_id);
        self
    }
}

/// One evaluation target within a [`Job`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub job_id: u64,
    pub status: JobStatus,
    pub target: TimeSeriesKey,
    /// Ids of the merged anomalies this task produced or updated.
    pub merged_anomaly_ids: Vec<u64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Failure reason for FAILED tasks.
    pub message: Option<String>,
    pub update_time: DateTime<Utc>,
}

impl Task {
    pub fn new(job_id: u64, target: TimeSeriesKey) -> Self {
        Self {
            id: 0,
            job_id,
            status: JobStatus::Scheduled,
            target,
            merged_anomaly_ids: Vec::new(),
            start_time: None,
            end_time: None,
            message: None,
            update_time: Utc::now(),
        }
    }
}
