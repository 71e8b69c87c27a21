use chrono::{DateTime, Utc};
use tracing::info;

use tidewatch_core::JobStatus;
use tidewatch_store::{JobManager, StoreError};

/// Stream name used for retention metrics and logs.
pub const RETENTION_STREAM: &str = "retention_monitor";

/// Deletes finished jobs (and their tasks) once they age past retention.
#[derive(Clone)]
pub struct RetentionMonitor {
    jobs: JobManager,
    retention_days: u32,
}

impl RetentionMonitor {
    pub fn new(jobs: JobManager, retention_days: u32) -> Self {
        Self {
            jobs,
            retention_days,
        }
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Returns the number of jobs deleted.
    pub async fn run_once(&self) -> Result<usize, StoreError> {
        self.run_once_at(Utc::now()).await
    }

    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for status in [JobStatus::Completed, JobStatus::Failed] {
            deleted += self
                .jobs
                .delete_older_than_with_status_at(now, self.retention_days, status)
                .await?;
        }
        info!(deleted, retention_days = self.retention_days, "retention run finished");
        Ok(deleted)
    }
}
