//! Generic record persistence.
//!
//! [`RecordStore`] is the single persistence seam: job, task and anomaly
//! managers are thin typed wrappers around one implementation of it.
//! [`InMemoryStore`] locks per record, so writers to different records
//! never wait on each other, and can snapshot itself to a JSON file.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::predicate::{Order, Predicate};
use crate::record::Record;

/// Closure applied to a record under its lock by [`RecordStore::update_with`].
pub type Mutation<R> = Box<dyn FnOnce(&mut R) + Send>;

/// Check run under a record's lock by [`RecordStore::delete_if`].
pub type Condition<R> = Box<dyn FnOnce(&R) -> bool + Send>;

#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    /// Persist a new record, assigning an id when its id is zero.
    async fn insert(&self, record: R) -> Result<R, StoreError>;

    async fn get(&self, id: u64) -> Result<Option<R>, StoreError>;

    /// Atomic read-modify-write of one record. The record's update time is
    /// stamped after `mutate` runs.
    async fn update_with(&self, id: u64, mutate: Mutation<R>) -> Result<R, StoreError>;

    /// Remove a record. Returns whether it existed.
    async fn delete(&self, id: u64) -> Result<bool, StoreError>;

    /// Remove a record only if `condition` holds for it under its lock.
    /// Returns whether it was removed.
    async fn delete_if(&self, id: u64, condition: Condition<R>) -> Result<bool, StoreError>;

    /// Matching records in id order.
    async fn find(&self, predicate: &Predicate) -> Result<Vec<R>, StoreError>;

    async fn find_ordered(
        &self,
        predicate: &Predicate,
        order: Order,
        limit: Option<usize>,
    ) -> Result<Vec<R>, StoreError>;
}

// ── In-memory implementation ───────────────────────────────────

struct Versioned<R> {
    /// `None` once deleted; holders of a stale entry see "not found".
    record: Option<R>,
    version: u64,
}

type Entry<R> = Arc<Mutex<Versioned<R>>>;

pub struct InMemoryStore<R> {
    records: RwLock<BTreeMap<u64, Entry<R>>>,
    next_id: AtomicU64,
}

impl<R: Record> Default for InMemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> InMemoryStore<R> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Number of successful writes to a record since insert.
    pub async fn version(&self, id: u64) -> Option<u64> {
        let entry = self.records.read().await.get(&id).cloned()?;
        let guard = entry.lock().await;
        guard.record.as_ref().map(|_| guard.version)
    }

    async fn entries(&self) -> Vec<Entry<R>> {
        self.records.read().await.values().cloned().collect()
    }

    async fn snapshot_records(&self, predicate: &Predicate) -> Vec<R> {
        let mut out = Vec::new();
        for entry in self.entries().await {
            let guard = entry.lock().await;
            if let Some(record) = guard.record.as_ref() {
                if predicate.matches(record) {
                    out.push(record.clone());
                }
            }
        }
        out
    }

    // ── Snapshots ───────────────────────────────────────────────

    /// Write every live record to `path` as a JSON array.
    pub async fn save_snapshot(&self, path: &Path) -> Result<usize, StoreError> {
        let records = self.snapshot_records(&Predicate::All).await;
        let json = serde_json::to_string_pretty(&records)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        debug!(kind = R::KIND, count = records.len(), path = %path.display(), "snapshot saved");
        Ok(records.len())
    }

    /// Replace the store's contents with the snapshot at `path`. A missing
    /// file leaves the store empty.
    pub async fn load_snapshot(&self, path: &Path) -> Result<usize, StoreError> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(0);
        }
        let json = tokio::fs::read_to_string(path).await?;
        let records: Vec<R> = serde_json::from_str(&json)?;

        let mut map = self.records.write().await;
        map.clear();
        let mut max_id = 0;
        for record in records {
            max_id = max_id.max(record.id());
            map.insert(
                record.id(),
                Arc::new(Mutex::new(Versioned {
                    record: Some(record),
                    version: 0,
                })),
            );
        }
        self.next_id.store(max_id + 1, AtomicOrdering::SeqCst);
        info!(kind = R::KIND, count = map.len(), path = %path.display(), "snapshot loaded");
        Ok(map.len())
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for InMemoryStore<R> {
    async fn insert(&self, mut record: R) -> Result<R, StoreError> {
        let mut map = self.records.write().await;
        if record.id() == 0 {
            record.set_id(self.next_id.fetch_add(1, AtomicOrdering::SeqCst));
        } else if map.contains_key(&record.id()) {
            return Err(StoreError::Conflict {
                kind: R::KIND,
                id: record.id(),
            });
        } else {
            self.next_id
                .fetch_max(record.id() + 1, AtomicOrdering::SeqCst);
        }
        map.insert(
            record.id(),
            Arc::new(Mutex::new(Versioned {
                record: Some(record.clone()),
                version: 0,
            })),
        );
        Ok(record)
    }

    async fn get(&self, id: u64) -> Result<Option<R>, StoreError> {
        let Some(entry) = self.records.read().await.get(&id).cloned() else {
            return Ok(None);
        };
        let guard = entry.lock().await;
        Ok(guard.record.clone())
    }

    async fn update_with(&self, id: u64, mutate: Mutation<R>) -> Result<R, StoreError> {
        let not_found = StoreError::NotFound { kind: R::KIND, id };
        let entry = self
            .records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(not_found)?;

        let mut guard = entry.lock().await;
        let Some(record) = guard.record.as_mut() else {
            return Err(StoreError::NotFound { kind: R::KIND, id });
        };
        mutate(record);
        record.set_id(id);
        record.touch(Utc::now());
        let updated = record.clone();
        guard.version += 1;
        Ok(updated)
    }

    async fn delete(&self, id: u64) -> Result<bool, StoreError> {
        let Some(entry) = self.records.write().await.remove(&id) else {
            return Ok(false);
        };
        let mut guard = entry.lock().await;
        Ok(guard.record.take().is_some())
    }

    async fn delete_if(&self, id: u64, condition: Condition<R>) -> Result<bool, StoreError> {
        let Some(entry) = self.records.read().await.get(&id).cloned() else {
            return Ok(false);
        };
        let mut guard = entry.lock().await;
        match guard.record.as_ref() {
            Some(record) if condition(record) => {}
            _ => return Ok(false),
        }
        guard.record = None;
        let mut map = self.records.write().await;
        if map.get(&id).is_some_and(|current| Arc::ptr_eq(current, &entry)) {
            map.remove(&id);
        }
        Ok(true)
    }

    async fn find(&self, predicate: &Predicate) -> Result<Vec<R>, StoreError> {
        Ok(self.snapshot_records(predicate).await)
    }

    async fn find_ordered(
        &self,
        predicate: &Predicate,
        order: Order,
        limit: Option<usize>,
    ) -> Result<Vec<R>, StoreError> {
        let mut records = self.snapshot_records(predicate).await;
        records.sort_by(|a, b| {
            let by_field = a.field(order.field).cmp(&b.field(order.field));
            let ordering = match by_field {
                Ordering::Equal => a.id().cmp(&b.id()),
                other => other,
            };
            if order.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}
