use std::sync::Arc;

use tidewatch_core::JobStatus;
use tidewatch_scheduler::InMemoryDataSource;

use crate::helpers::{approx, dims, key, make_scheduler, seed_flat, seed_spike, wow_function, T0};

#[tokio::test]
async fn spike_becomes_one_merged_anomaly() {
    let source = Arc::new(InMemoryDataSource::new());
    seed_spike(&source, &key("us"), T0);
    let scheduler = make_scheduler(vec![wow_function(1, "pageviews_wow", &["us"])], source);

    let summary = scheduler.run_once(1, T0 + 5_000).await.unwrap();
    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.tasks, 1);
    assert_eq!(summary.failed_tasks, 0);
    assert_eq!(summary.merged_anomaly_ids.len(), 1);

    let stores = scheduler.stores();
    let job = stores.jobs.find_by_id(summary.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.function_id, Some(1));
    assert_eq!((job.window_start_time, job.window_end_time), (T0, T0 + 5_000));
    assert!(job.schedule_end_time.is_some());

    let tasks = stores.tasks.find_by_job_id(job.id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, JobStatus::Completed);
    assert_eq!(tasks[0].merged_anomaly_ids, summary.merged_anomaly_ids);
    assert!(tasks[0].start_time.is_some());

    let merged = stores
        .anomalies
        .find_by_id(summary.merged_anomaly_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!((merged.start_time, merged.end_time), (T0 + 2_000, T0 + 4_000));
    assert_eq!(merged.dimensions, dims("us"));
    assert_eq!(merged.function_id, Some(1));
    assert_eq!(merged.raw_anomalies.len(), 2);
    assert!(approx(merged.weight, 0.25));
    assert!(approx(merged.score, 15.0));
}

#[tokio::test]
async fn rerunning_a_window_updates_instead_of_duplicating() {
    let source = Arc::new(InMemoryDataSource::new());
    seed_spike(&source, &key("us"), T0);
    let scheduler = make_scheduler(vec![wow_function(1, "pageviews_wow", &["us"])], source);

    let first = scheduler.run_once(1, T0 + 5_000).await.unwrap();
    let second = scheduler.run_once(1, T0 + 5_000).await.unwrap();
    assert_ne!(first.job_id, second.job_id);
    assert_eq!(first.merged_anomaly_ids, second.merged_anomaly_ids);

    let all = scheduler.stores().anomalies.find_by_function(1).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].raw_anomalies.len(), 2);
    assert!(approx(all[0].weight, 0.25));
}

#[tokio::test]
async fn quiet_series_completes_without_anomalies() {
    let source = Arc::new(InMemoryDataSource::new());
    seed_flat(&source, &key("us"), T0, 5);
    let scheduler = make_scheduler(vec![wow_function(1, "pageviews_wow", &["us"])], source);

    let summary = scheduler.run_once(1, T0 + 5_500).await.unwrap();
    assert_eq!(summary.status, JobStatus::Completed);
    assert!(summary.merged_anomaly_ids.is_empty());
    assert!(scheduler.stores().anomalies.find_by_function(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn failing_target_fails_only_its_task() {
    let source = Arc::new(InMemoryDataSource::new());
    seed_spike(&source, &key("us"), T0);
    seed_flat(&source, &key("de"), T0, 5);
    source.mark_unavailable(&key("de"));
    // "fr" has no data at all.
    let scheduler = make_scheduler(
        vec![wow_function(1, "pageviews_wow", &["us", "de", "fr"])],
        source,
    );

    let summary = scheduler.run_once(1, T0 + 5_000).await.unwrap();
    assert_eq!(summary.status, JobStatus::Failed);
    assert_eq!(summary.tasks, 3);
    assert_eq!(summary.failed_tasks, 2);
    assert_eq!(summary.merged_anomaly_ids.len(), 1);

    let stores = scheduler.stores();
    let job = stores.jobs.find_by_id(summary.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);

    let tasks = stores.tasks.find_by_job_id(job.id).await.unwrap();
    let completed: Vec<_> = tasks
        .iter()
        .filter(|t| t.status == JobStatus::Completed)
        .collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].target, key("us"));

    let failed = stores.tasks.find_by_status(JobStatus::Failed).await.unwrap();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|t| t.message.is_some() && t.end_time.is_some()));

    let metrics = scheduler.metrics();
    assert_eq!(metrics.tasks_completed, 1);
    assert_eq!(metrics.tasks_failed, 2);
    assert_eq!(metrics.stream("pageviews_wow").unwrap().runs_failed, 1);
}
