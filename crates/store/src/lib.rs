//! Job, task and merged-anomaly persistence.

pub mod anomaly_store;
pub mod error;
pub mod job_store;
pub mod predicate;
pub mod record;
pub mod repository;
pub mod task_store;

use std::path::Path;
use std::sync::Arc;

use tidewatch_core::{Job, MergedAnomalyResult, Task};
use tracing::info;

pub use anomaly_store::AnomalyManager;
pub use error::StoreError;
pub use job_store::{backfill_job_name, JobManager, BACKFILL_PREFIX};
pub use predicate::{like_match, FieldValue, Order, Predicate};
pub use record::Record;
pub use repository::{Condition, InMemoryStore, Mutation, RecordStore};
pub use task_store::TaskManager;

const JOBS_FILE: &str = "jobs.json";
const TASKS_FILE: &str = "tasks.json";
const ANOMALIES_FILE: &str = "merged_anomalies.json";

/// The three managers over in-memory stores, passed to the scheduler as one
/// bundle.
#[derive(Clone)]
pub struct Stores {
    pub jobs: JobManager,
    pub tasks: TaskManager,
    pub anomalies: AnomalyManager,
    job_records: Arc<InMemoryStore<Job>>,
    task_records: Arc<InMemoryStore<Task>>,
    anomaly_records: Arc<InMemoryStore<MergedAnomalyResult>>,
}

impl Default for Stores {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Stores {
    pub fn in_memory() -> Self {
        let job_records: Arc<InMemoryStore<Job>> = Arc::new(InMemoryStore::new());
        let task_records: Arc<InMemoryStore<Task>> = Arc::new(InMemoryStore::new());
        let anomaly_records: Arc<InMemoryStore<MergedAnomalyResult>> =
            Arc::new(InMemoryStore::new());

        let tasks = TaskManager::new(task_records.clone());
        Self {
            jobs: JobManager::new(job_records.clone(), tasks.clone()),
            tasks,
            anomalies: AnomalyManager::new(anomaly_records.clone()),
            job_records,
            task_records,
            anomaly_records,
        }
    }

    /// Write every store to `dir` as JSON.
    pub async fn save_snapshots(&self, dir: &Path) -> Result<(), StoreError> {
        let jobs = self.job_records.save_snapshot(&dir.join(JOBS_FILE)).await?;
        let tasks = self.task_records.save_snapshot(&dir.join(TASKS_FILE)).await?;
        let anomalies = self
            .anomaly_records
            .save_snapshot(&dir.join(ANOMALIES_FILE))
            .await?;
        info!(jobs, tasks, anomalies, dir = %dir.display(), "store snapshots saved");
        Ok(())
    }

    /// Restore every store from `dir`. Missing files leave that store empty.
    pub async fn load_snapshots(&self, dir: &Path) -> Result<(), StoreError> {
        self.job_records.load_snapshot(&dir.join(JOBS_FILE)).await?;
        self.task_records.load_snapshot(&dir.join(TASKS_FILE)).await?;
        self.anomaly_records
            .load_snapshot(&dir.join(ANOMALIES_FILE))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tidewatch_core::{DimensionMap, JobStatus, TimeSeriesKey};

    use super::*;

    #[tokio::test]
    async fn snapshots_restore_all_stores() {
        let dir = tempfile::tempdir().unwrap();
        let stores = Stores::in_memory();
        let job = stores.jobs.create(Job::new("wow", 0, 10)).await.unwrap();
        stores
            .tasks
            .create(Task::new(job.id, TimeSeriesKey::new("m", DimensionMap::new())))
            .await
            .unwrap();
        stores.jobs.update_status(job.id, JobStatus::Completed).await.unwrap();
        stores.save_snapshots(dir.path()).await.unwrap();

        let restored = Stores::in_memory();
        restored.load_snapshots(dir.path()).await.unwrap();
        let job = restored.jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(restored.tasks.find_by_job_id(job.id).await.unwrap().len(), 1);
        assert!(restored.anomalies.find_by_function(1).await.unwrap().is_empty());
    }
}
