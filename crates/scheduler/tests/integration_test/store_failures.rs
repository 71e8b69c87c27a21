use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use tidewatch_core::{JobStatus, Task};
use tidewatch_scheduler::{InMemoryDataSource, Scheduler, SchedulerError};
use tidewatch_store::{
    Condition, InMemoryStore, Mutation, Order, Predicate, RecordStore, StoreError, Stores,
    TaskManager,
};

use crate::helpers::{config, key, seed_spike, wow_function, T0};

/// Task store that refuses inserts once `capacity` tasks exist.
struct FullTaskStore {
    inner: InMemoryStore<Task>,
    capacity: usize,
    inserted: AtomicUsize,
}

#[async_trait]
impl RecordStore<Task> for FullTaskStore {
    async fn insert(&self, record: Task) -> Result<Task, StoreError> {
        if self.inserted.fetch_add(1, Ordering::SeqCst) >= self.capacity {
            return Err(StoreError::Io(std::io::Error::other("task store full")));
        }
        self.inner.insert(record).await
    }

    async fn get(&self, id: u64) -> Result<Option<Task>, StoreError> {
        self.inner.get(id).await
    }

    async fn update_with(&self, id: u64, mutate: Mutation<Task>) -> Result<Task, StoreError> {
        self.inner.update_with(id, mutate).await
    }

    async fn delete(&self, id: u64) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }

    async fn delete_if(&self, id: u64, condition: Condition<Task>) -> Result<bool, StoreError> {
        self.inner.delete_if(id, condition).await
    }

    async fn find(&self, predicate: &Predicate) -> Result<Vec<Task>, StoreError> {
        self.inner.find(predicate).await
    }

    async fn find_ordered(
        &self,
        predicate: &Predicate,
        order: Order,
        limit: Option<usize>,
    ) -> Result<Vec<Task>, StoreError> {
        self.inner.find_ordered(predicate, order, limit).await
    }
}

#[tokio::test]
async fn task_creation_failure_leaves_every_created_task_terminal() {
    let source = Arc::new(InMemoryDataSource::new());
    seed_spike(&source, &key("us"), T0);
    seed_spike(&source, &key("de"), T0);

    let mut stores = Stores::in_memory();
    stores.tasks = TaskManager::new(Arc::new(FullTaskStore {
        inner: InMemoryStore::new(),
        capacity: 2,
        inserted: AtomicUsize::new(0),
    }));
    let scheduler = Arc::new(Scheduler::new(
        config(vec![wow_function(1, "pageviews_wow", &["us", "de", "fr"])]),
        stores,
        source,
    ));

    let result = scheduler.run_once(1, T0 + 5_000).await;
    assert!(matches!(result, Err(SchedulerError::Store(StoreError::Io(_)))));

    let stores = scheduler.stores();
    let failed = stores.jobs.find_by_status(JobStatus::Failed).await.unwrap();
    assert_eq!(failed.len(), 1);

    let tasks = stores.tasks.find_by_job_id(failed[0].id).await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(
        tasks.iter().all(|t| t.status.is_terminal() && t.end_time.is_some()),
        "tasks left open: {:?}",
        tasks.iter().map(|t| t.status).collect::<Vec<_>>()
    );
}
