use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use tidewatch_core::{DimensionMap, Interval, MergedAnomalyResult};

use crate::error::StoreError;
use crate::predicate::{Order, Predicate};
use crate::repository::{InMemoryStore, RecordStore};

/// Merged anomaly persistence.
///
/// Merging reads the persisted anomalies of one series, folds new raw
/// anomalies into them and writes them back. Callers hold
/// [`lock_series`](Self::lock_series) across that sequence so concurrent
/// evaluations of the same series (a backfill next to the trigger loop)
/// cannot overwrite each other's raw anomalies.
#[derive(Clone)]
pub struct AnomalyManager {
    store: Arc<dyn RecordStore<MergedAnomalyResult>>,
    series_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl AnomalyManager {
    pub fn new(store: Arc<dyn RecordStore<MergedAnomalyResult>>) -> Self {
        Self {
            store,
            series_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::<MergedAnomalyResult>::new()))
    }

    /// Insert a new merged anomaly (id zero) or overwrite a persisted one.
    pub async fn save_merged(
        &self,
        merged: MergedAnomalyResult,
    ) -> Result<MergedAnomalyResult, StoreError> {
        if merged.id == 0 {
            return self.store.insert(merged).await;
        }
        let id = merged.id;
        self.store
            .update_with(id, Box::new(move |stored: &mut MergedAnomalyResult| *stored = merged))
            .await
    }

    pub async fn find_by_id(&self, id: u64) -> Result<Option<MergedAnomalyResult>, StoreError> {
        self.store.get(id).await
    }

    /// All merged anomalies of a function, oldest first.
    pub async fn find_by_function(
        &self,
        function_id: u64,
    ) -> Result<Vec<MergedAnomalyResult>, StoreError> {
        self.store
            .find_ordered(
                &Predicate::eq("function_id", function_id),
                Order::asc("start_time"),
                None,
            )
            .await
    }

    /// Exclusive access to the merged anomalies of one function and
    /// dimension combination until the guard drops.
    pub async fn lock_series(
        &self,
        function_id: u64,
        dimensions: &DimensionMap,
    ) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.series_locks.lock().await;
            locks
                .entry(format!("{function_id}:{dimensions}"))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    /// Merged anomalies of one function and dimension combination that
    /// overlap or touch `interval`, oldest first.
    pub async fn find_by_function_and_dimensions_near(
        &self,
        function_id: u64,
        dimensions: &DimensionMap,
        interval: Interval,
    ) -> Result<Vec<MergedAnomalyResult>, StoreError> {
        let found = self
            .store
            .find_ordered(
                &Predicate::eq("function_id", function_id)
                    .and(Predicate::eq("dimensions", dimensions.to_string()))
                    .and(Predicate::lt("start_time", interval.end)),
                Order::asc("start_time"),
                None,
            )
            .await?;
        Ok(found
            .into_iter()
            .filter(|m| m.end_time >= interval.start)
            .collect())
    }

    /// The merged anomaly with the latest end time for one function and
    /// dimension combination.
    pub async fn find_latest_by_function_and_dimensions(
        &self,
        function_id: u64,
        dimensions: &DimensionMap,
    ) -> Result<Option<MergedAnomalyResult>, StoreError> {
        let found = self
            .store
            .find_ordered(
                &Predicate::eq("function_id", function_id)
                    .and(Predicate::eq("dimensions", dimensions.to_string())),
                Order::desc("end_time"),
                Some(1),
            )
            .await?;
        Ok(found.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use tidewatch_core::RawAnomalyResult;

    use super::*;

    fn merged(function_id: u64, country: &str, start: i64, end: i64) -> MergedAnomalyResult {
        let dimensions: DimensionMap = [("country", country)].into_iter().collect();
        MergedAnomalyResult::from_raw(
            "m",
            RawAnomalyResult {
                start_time: start,
                end_time: end,
                weight: 0.5,
                score: 1.0,
                dimensions,
                function_id: Some(function_id),
            },
        )
    }

    #[tokio::test]
    async fn save_inserts_then_overwrites() {
        let anomalies = AnomalyManager::in_memory();
        let mut saved = anomalies.save_merged(merged(1, "us", 0, 10)).await.unwrap();
        assert!(saved.id > 0);

        saved.end_time = 20;
        let again = anomalies.save_merged(saved.clone()).await.unwrap();
        assert_eq!(again.id, saved.id);
        assert_eq!(anomalies.find_by_function(1).await.unwrap().len(), 1);
        assert_eq!(
            anomalies.find_by_id(saved.id).await.unwrap().unwrap().end_time,
            20
        );
    }

    #[tokio::test]
    async fn near_returns_overlapping_and_touching_in_start_order() {
        let anomalies = AnomalyManager::in_memory();
        anomalies.save_merged(merged(1, "us", 40, 50)).await.unwrap();
        anomalies.save_merged(merged(1, "us", 0, 10)).await.unwrap();
        anomalies.save_merged(merged(1, "us", 10, 20)).await.unwrap();
        anomalies.save_merged(merged(1, "us", 60, 70)).await.unwrap();
        anomalies.save_merged(merged(1, "de", 20, 30)).await.unwrap();

        let us: DimensionMap = [("country", "us")].into_iter().collect();
        let near = anomalies
            .find_by_function_and_dimensions_near(1, &us, Interval::new(10, 60).unwrap())
            .await
            .unwrap();
        let spans: Vec<_> = near.iter().map(|m| (m.start_time, m.end_time)).collect();
        assert_eq!(spans, vec![(0, 10), (10, 20), (40, 50)]);
    }

    #[tokio::test]
    async fn series_lock_is_exclusive_per_series() {
        let anomalies = AnomalyManager::in_memory();
        let us: DimensionMap = [("country", "us")].into_iter().collect();
        let de: DimensionMap = [("country", "de")].into_iter().collect();

        let held = anomalies.lock_series(1, &us).await;
        let wait = std::time::Duration::from_millis(50);
        assert!(tokio::time::timeout(wait, anomalies.lock_series(1, &us))
            .await
            .is_err());
        assert!(tokio::time::timeout(wait, anomalies.lock_series(1, &de))
            .await
            .is_ok());
        assert!(tokio::time::timeout(wait, anomalies.lock_series(2, &us))
            .await
            .is_ok());

        drop(held);
        assert!(tokio::time::timeout(wait, anomalies.lock_series(1, &us))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn latest_by_function_and_dimensions() {
        let anomalies = AnomalyManager::in_memory();
        anomalies.save_merged(merged(1, "us", 0, 10)).await.unwrap();
        anomalies.save_merged(merged(1, "us", 20, 30)).await.unwrap();
        anomalies.save_merged(merged(1, "de", 40, 50)).await.unwrap();
        anomalies.save_merged(merged(2, "us", 60, 70)).await.unwrap();

        let us: DimensionMap = [("country", "us")].into_iter().collect();
        let latest = anomalies
            .find_latest_by_function_and_dimensions(1, &us)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.start_time, 20);

        let fr: DimensionMap = [("country", "fr")].into_iter().collect();
        assert!(anomalies
            .find_latest_by_function_and_dimensions(1, &fr)
            .await
            .unwrap()
            .is_none());
    }
}
