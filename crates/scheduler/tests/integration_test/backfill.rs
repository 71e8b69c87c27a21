use std::sync::Arc;

use tidewatch_core::JobStatus;
use tidewatch_scheduler::{InMemoryDataSource, SchedulerError};
use tidewatch_store::backfill_job_name;

use crate::helpers::{key, make_scheduler, seed_flat, wow_function, T0};

#[tokio::test]
async fn backfill_walks_windows_and_resumes_after_completed_jobs() {
    let source = Arc::new(InMemoryDataSource::new());
    seed_flat(&source, &key("us"), T0, 15);
    let scheduler = make_scheduler(vec![wow_function(1, "pageviews_wow", &["us"])], source);

    let summary = scheduler.run_backfill(1, T0, T0 + 13_000).await.unwrap();
    assert_eq!(summary.resumed_from, T0);
    assert_eq!(summary.runs.len(), 3);
    assert_eq!(summary.failed_runs(), 0);

    let mut windows = Vec::new();
    for run in &summary.runs {
        let job = scheduler
            .stores()
            .jobs
            .find_by_id(run.job_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.name, backfill_job_name("pageviews_wow", 1));
        assert_eq!(job.status, JobStatus::Completed);
        windows.push((job.window_start_time, job.window_end_time));
    }
    // Last window clamped to the range end.
    assert_eq!(
        windows,
        vec![
            (T0, T0 + 5_000),
            (T0 + 5_000, T0 + 10_000),
            (T0 + 10_000, T0 + 13_000),
        ]
    );

    let again = scheduler.run_backfill(1, T0, T0 + 13_000).await.unwrap();
    assert_eq!(again.resumed_from, T0 + 13_000);
    assert!(again.runs.is_empty());
}

#[tokio::test]
async fn backfill_stops_at_failed_window_and_retries_it() {
    let source = Arc::new(InMemoryDataSource::new());
    seed_flat(&source, &key("us"), T0, 15);
    source.mark_unavailable(&key("us"));
    let scheduler = make_scheduler(vec![wow_function(1, "pageviews_wow", &["us"])], source);

    let summary = scheduler.run_backfill(1, T0, T0 + 15_000).await.unwrap();
    assert_eq!(summary.runs.len(), 1);
    assert_eq!(summary.failed_runs(), 1);

    let retry = scheduler.run_backfill(1, T0, T0 + 15_000).await.unwrap();
    assert_eq!(retry.resumed_from, T0);
}

#[tokio::test]
async fn backfill_of_unknown_function_fails() {
    let scheduler = make_scheduler(vec![], Arc::new(InMemoryDataSource::new()));
    assert!(matches!(
        scheduler.run_backfill(9, T0, T0 + 5_000).await,
        Err(SchedulerError::UnknownFunction(9))
    ));
}
