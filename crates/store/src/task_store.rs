use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use tidewatch_core::{JobStatus, Task};

use crate::error::StoreError;
use crate::predicate::{Order, Predicate};
use crate::repository::{InMemoryStore, RecordStore};

/// Task persistence.
#[derive(Clone)]
pub struct TaskManager {
    store: Arc<dyn RecordStore<Task>>,
}

impl TaskManager {
    pub fn new(store: Arc<dyn RecordStore<Task>>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::<Task>::new()))
    }

    pub async fn create(&self, task: Task) -> Result<Task, StoreError> {
        self.store.insert(task).await
    }

    pub async fn find_by_id(&self, id: u64) -> Result<Option<Task>, StoreError> {
        self.store.get(id).await
    }

    pub async fn find_by_job_id(&self, job_id: u64) -> Result<Vec<Task>, StoreError> {
        self.store
            .find_ordered(&Predicate::eq("job_id", job_id), Order::asc("id"), None)
            .await
    }

    pub async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Task>, StoreError> {
        self.store.find(&Predicate::eq("status", status)).await
    }

    /// Move a task to `status`. Entering RUNNING stamps the start time once.
    pub async fn update_status(
        &self,
        id: u64,
        status: JobStatus,
        end_time: Option<DateTime<Utc>>,
        message: Option<String>,
    ) -> Result<Task, StoreError> {
        self.store
            .update_with(
                id,
                Box::new(move |task: &mut Task| {
                    task.status = status;
                    if status == JobStatus::Running && task.start_time.is_none() {
                        task.start_time = Some(Utc::now());
                    }
                    if end_time.is_some() {
                        task.end_time = end_time;
                    }
                    if message.is_some() {
                        task.message = message;
                    }
                }),
            )
            .await
    }

    /// Record the merged anomalies a task produced, keeping ids unique.
    pub async fn attach_results(&self, id: u64, merged_ids: Vec<u64>) -> Result<Task, StoreError> {
        self.store
            .update_with(
                id,
                Box::new(move |task: &mut Task| {
                    for merged_id in merged_ids {
                        if !task.merged_anomaly_ids.contains(&merged_id) {
                            task.merged_anomaly_ids.push(merged_id);
                        }
                    }
                }),
            )
            .await
    }

    pub async fn delete_by_job_id(&self, job_id: u64) -> Result<usize, StoreError> {
        let tasks = self.store.find(&Predicate::eq("job_id", job_id)).await?;
        let mut deleted = 0;
        for task in tasks {
            if self.store.delete(task.id).await? {
                deleted += 1;
            }
        }
        debug!(job_id, deleted, "tasks deleted");
        Ok(deleted)
    }
}
