use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use tidewatch_core::{Job, JobStatus};

use crate::error::StoreError;
use crate::predicate::{Order, Predicate};
use crate::repository::{InMemoryStore, RecordStore};
use crate::task_store::TaskManager;

/// Prefix of backfill job names: `adhoc_<function name>_<function id>`.
pub const BACKFILL_PREFIX: &str = "adhoc_";

pub fn backfill_job_name(function_name: &str, function_id: u64) -> String {
    format!("{BACKFILL_PREFIX}{function_name}_{function_id}")
}

/// Job persistence. Deleting jobs cascades to their tasks.
#[derive(Clone)]
pub struct JobManager {
    store: Arc<dyn RecordStore<Job>>,
    tasks: TaskManager,
}

impl JobManager {
    pub fn new(store: Arc<dyn RecordStore<Job>>, tasks: TaskManager) -> Self {
        Self { store, tasks }
    }

    pub fn in_memory(tasks: TaskManager) -> Self {
        Self::new(Arc::new(InMemoryStore::<Job>::new()), tasks)
    }

    pub async fn create(&self, job: Job) -> Result<Job, StoreError> {
        let job = self.store.insert(job).await?;
        debug!(job_id = job.id, name = %job.name, "job created");
        Ok(job)
    }

    pub async fn find_by_id(&self, id: u64) -> Result<Option<Job>, StoreError> {
        self.store.get(id).await
    }

    pub async fn job_name_by_id(&self, id: u64) -> Result<Option<String>, StoreError> {
        Ok(self.store.get(id).await?.map(|job| job.name))
    }

    pub async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        self.store.find(&Predicate::eq("status", status)).await
    }

    pub async fn update_status(&self, id: u64, status: JobStatus) -> Result<Job, StoreError> {
        self.store
            .update_with(id, Box::new(move |job: &mut Job| job.status = status))
            .await
    }

    /// Set status and end time on each job in `ids`. Each job is updated
    /// atomically on its own; ids that no longer exist are skipped.
    /// Returns how many jobs were updated.
    pub async fn update_status_and_end_time(
        &self,
        ids: &[u64],
        status: JobStatus,
        end_time: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut updated = 0;
        for &id in ids {
            let result = self
                .store
                .update_with(
                    id,
                    Box::new(move |job: &mut Job| {
                        job.status = status;
                        job.schedule_end_time = Some(end_time);
                    }),
                )
                .await;
            match result {
                Ok(_) => updated += 1,
                Err(StoreError::NotFound { .. }) => {
                    warn!(job_id = id, status = %status, "job vanished before status update");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(updated)
    }

    /// Delete jobs with `status` last updated more than `days` ago, and
    /// their tasks. Returns the number of jobs deleted.
    pub async fn delete_older_than_with_status(
        &self,
        days: u32,
        status: JobStatus,
    ) -> Result<usize, StoreError> {
        self.delete_older_than_with_status_at(Utc::now(), days, status)
            .await
    }

    /// [`delete_older_than_with_status`](Self::delete_older_than_with_status)
    /// measured from `now`.
    pub async fn delete_older_than_with_status_at(
        &self,
        now: DateTime<Utc>,
        days: u32,
        status: JobStatus,
    ) -> Result<usize, StoreError> {
        let cutoff = now - Duration::days(i64::from(days));
        let expired = self
            .store
            .find(&Predicate::eq("status", status).and(Predicate::lt("update_time", cutoff)))
            .await?;

        let mut deleted = 0;
        for job in expired {
            // Re-checked under the job's lock: a job updated since the scan stays.
            let still_expired = Box::new(move |job: &Job| {
                job.status == status && job.update_time < cutoff
            });
            if self.store.delete_if(job.id, still_expired).await? {
                self.tasks.delete_by_job_id(job.id).await?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            info!(deleted, status = %status, days, "expired jobs deleted");
        }
        Ok(deleted)
    }

    /// The `n` jobs with the latest schedule start time, newest first.
    pub async fn find_n_recent_jobs(&self, n: usize) -> Result<Vec<Job>, StoreError> {
        self.store
            .find_ordered(&Predicate::All, Order::desc("schedule_start_time"), Some(n))
            .await
    }

    /// The most recently created SCHEDULED job named `name`.
    pub async fn find_latest_scheduled_job_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Job>, StoreError> {
        let jobs = self
            .store
            .find_ordered(
                &Predicate::eq("name", name).and(Predicate::eq("status", JobStatus::Scheduled)),
                Order::desc("id"),
                Some(1),
            )
            .await?;
        Ok(jobs.into_iter().next())
    }

    /// The backfill job for `function_id` whose window start is the latest
    /// one lying in `[window_start, window_end]`.
    pub async fn find_latest_backfill_job_by_function_and_window(
        &self,
        function_id: u64,
        window_start: i64,
        window_end: i64,
    ) -> Result<Option<Job>, StoreError> {
        let pattern = format!("{BACKFILL_PREFIX}%_{function_id}");
        let candidates = self
            .store
            .find_ordered(
                &Predicate::like("name", pattern),
                Order::desc("window_start_time"),
                None,
            )
            .await?;
        Ok(candidates.into_iter().find(|job| {
            job.window_start_time >= window_start && job.window_start_time <= window_end
        }))
    }
}
