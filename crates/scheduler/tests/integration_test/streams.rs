use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use tidewatch_core::time::MILLIS_PER_SECOND;
use tidewatch_core::JobStatus;
use tidewatch_scheduler::InMemoryDataSource;

use crate::helpers::{key, make_scheduler, seed_flat, wow_function};

#[tokio::test]
async fn started_scheduler_runs_each_function_immediately() {
    // Flat data around the current time so the first trigger has a window.
    let now = Utc::now().timestamp_millis();
    let start = now - now.rem_euclid(MILLIS_PER_SECOND) - 30 * MILLIS_PER_SECOND;
    let source = Arc::new(InMemoryDataSource::new());
    seed_flat(&source, &key("us"), start, 60);

    let scheduler = make_scheduler(vec![wow_function(1, "pageviews_wow", &["us"])], source);
    scheduler.start().unwrap();

    let mut finished = Vec::new();
    for _ in 0..50 {
        finished = scheduler
            .stores()
            .jobs
            .find_by_status(JobStatus::Completed)
            .await
            .unwrap();
        if !finished.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(scheduler.stop(Duration::from_secs(5)).await);

    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].name, "pageviews_wow");
    assert_eq!(finished[0].window_end_time - finished[0].window_start_time, 5_000);
}
