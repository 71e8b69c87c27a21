use std::sync::Arc;

use tidewatch_core::time::MILLIS_PER_WEEK;
use tidewatch_core::{JobStatus, MergedAnomalyResult, TimeUnit};
use tidewatch_detect::MergeConfig;
use tidewatch_scheduler::InMemoryDataSource;

use crate::helpers::{approx, key, make_scheduler, seed, seed_spike, wow_function, T0};

fn spans(all: &[MergedAnomalyResult]) -> Vec<(u64, i64, i64, usize)> {
    all.iter()
        .map(|m| (m.id, m.start_time - T0, m.end_time - T0, m.raw_anomalies.len()))
        .collect()
}

fn assert_disjoint(all: &[MergedAnomalyResult]) {
    for (i, a) in all.iter().enumerate() {
        for b in &all[i + 1..] {
            assert!(
                !a.interval().overlaps(&b.interval()),
                "merged anomalies overlap: {:?} and {:?}",
                a.interval(),
                b.interval()
            );
        }
    }
}

/// Flat 10 in the window and both baselines, with the given observed
/// buckets raised to `value`.
fn seed_with_spikes(source: &InMemoryDataSource, seconds: usize, spikes: &[(usize, f64)]) {
    let mut observed = vec![10.0; seconds];
    for &(at, value) in spikes {
        observed[at] = value;
    }
    seed(source, &key("us"), T0, &observed);
    let flat = vec![10.0; seconds];
    seed(source, &key("us"), T0 - MILLIS_PER_WEEK, &flat);
    seed(source, &key("us"), T0 - 2 * MILLIS_PER_WEEK, &flat);
}

#[tokio::test]
async fn rerun_with_two_anomalies_keeps_them_apart() {
    let source = Arc::new(InMemoryDataSource::new());
    seed_with_spikes(&source, 20, &[(2, 20.0), (15, 20.0)]);

    let mut function = wow_function(1, "pageviews_wow", &["us"]);
    function.window_size = 20;
    function.window_unit = TimeUnit::Seconds;
    function.merge = MergeConfig {
        sequential_allowed_gap_millis: 2_000,
        ..MergeConfig::default()
    };
    let scheduler = make_scheduler(vec![function], source);

    scheduler.run_once(1, T0 + 20_000).await.unwrap();
    let first = scheduler.stores().anomalies.find_by_function(1).await.unwrap();
    assert_eq!(spans(&first), vec![(1, 2_000, 3_000, 1), (2, 15_000, 16_000, 1)]);

    let again = scheduler.run_once(1, T0 + 20_000).await.unwrap();
    assert_eq!(again.merged_anomaly_ids, vec![1, 2]);
    let second = scheduler.stores().anomalies.find_by_function(1).await.unwrap();
    assert_disjoint(&second);
    assert_eq!(spans(&second), spans(&first));
}

#[tokio::test]
async fn anomaly_extended_by_next_window_is_weighted_over_its_whole_span() {
    let source = Arc::new(InMemoryDataSource::new());
    seed_with_spikes(&source, 10, &[(4, 20.0), (5, 13.0)]);
    let scheduler = make_scheduler(vec![wow_function(1, "pageviews_wow", &["us"])], source);

    let first = scheduler.run_once(1, T0 + 5_000).await.unwrap();
    let second = scheduler.run_once(1, T0 + 10_000).await.unwrap();
    assert_eq!(first.merged_anomaly_ids, second.merged_anomaly_ids);

    let all = scheduler.stores().anomalies.find_by_function(1).await.unwrap();
    assert_eq!(spans(&all), vec![(1, 4_000, 6_000, 2)]);
    // (20 + 13 - 20) / 20
    assert!(approx(all[0].weight, 0.65), "weight {}", all[0].weight);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_runs_of_one_series_share_a_merged_anomaly() {
    let source = Arc::new(InMemoryDataSource::new());
    seed_spike(&source, &key("us"), T0);
    let scheduler = make_scheduler(vec![wow_function(1, "pageviews_wow", &["us"])], source);

    let (scheduled, backfill) = tokio::join!(
        scheduler.run_once(1, T0 + 5_000),
        scheduler.run_backfill(1, T0, T0 + 5_000),
    );
    assert_eq!(scheduled.unwrap().status, JobStatus::Completed);
    assert_eq!(backfill.unwrap().failed_runs(), 0);

    let all = scheduler.stores().anomalies.find_by_function(1).await.unwrap();
    assert_eq!(spans(&all), vec![(1, 2_000, 4_000, 2)]);
    assert!(approx(all[0].weight, 0.25));
}
