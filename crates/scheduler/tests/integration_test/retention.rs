use std::sync::Arc;

use chrono::{Duration, Utc};

use tidewatch_core::JobStatus;
use tidewatch_scheduler::{InMemoryDataSource, RetentionMonitor};

use crate::helpers::{key, make_scheduler, seed_spike, wow_function, T0};

#[tokio::test]
async fn retention_removes_old_finished_jobs_with_their_tasks() {
    let source = Arc::new(InMemoryDataSource::new());
    seed_spike(&source, &key("us"), T0);
    let scheduler = make_scheduler(
        vec![wow_function(1, "pageviews_wow", &["us", "missing"])],
        source,
    );

    let failed = scheduler.run_once(1, T0 + 5_000).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);

    let stores = scheduler.stores();
    let monitor = RetentionMonitor::new(stores.jobs.clone(), 30);

    assert_eq!(monitor.run_once().await.unwrap(), 0);
    assert_eq!(stores.tasks.find_by_job_id(failed.job_id).await.unwrap().len(), 2);

    let later = Utc::now() + Duration::days(31);
    assert_eq!(monitor.run_once_at(later).await.unwrap(), 1);
    assert!(stores.jobs.find_by_id(failed.job_id).await.unwrap().is_none());
    assert!(stores.tasks.find_by_job_id(failed.job_id).await.unwrap().is_empty());

    // Merged anomalies outlive the jobs that produced them.
    assert_eq!(stores.anomalies.find_by_function(1).await.unwrap().len(), 1);
}
