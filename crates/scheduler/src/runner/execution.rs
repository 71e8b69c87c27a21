use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use tidewatch_core::{Interval, Job, JobStatus, SeriesError, Task, TimeSeriesKey};
use tidewatch_detect::{
    merge_with_persisted, AnomalyFunction, DetectionContext, DetectionFunctionSpec, MergeConfig,
};
use tidewatch_store::Stores;

use crate::data_source::{DataSource, DataSourceError};
use crate::error::SchedulerError;
use crate::types::RunSummary;

use super::Scheduler;

/// The detection window ending at the bucket boundary at or before `now_millis`.
pub(crate) fn detection_window(
    now_millis: i64,
    bucket_millis: i64,
    window_millis: i64,
) -> Result<Interval, SeriesError> {
    if bucket_millis <= 0 {
        return Err(SeriesError::InvalidBucket(bucket_millis));
    }
    let end = now_millis - now_millis.rem_euclid(bucket_millis);
    Interval::new(end - window_millis, end)
}

impl Scheduler {
    /// Run function `function_id` once over the window ending at `now_millis`,
    /// outside of its trigger loop.
    pub async fn run_once(
        &self,
        function_id: u64,
        now_millis: i64,
    ) -> Result<RunSummary, SchedulerError> {
        let spec = self
            .config
            .function(function_id)
            .ok_or(SchedulerError::UnknownFunction(function_id))?;
        let function = self.instantiate(spec)?;
        self.run_function_at(spec, &function, now_millis).await
    }

    pub(super) async fn run_function_at(
        &self,
        spec: &DetectionFunctionSpec,
        function: &Arc<dyn AnomalyFunction>,
        now_millis: i64,
    ) -> Result<RunSummary, SchedulerError> {
        let window = detection_window(now_millis, function.bucket_millis(), spec.window_millis())?;
        self.run_detection(spec, function, window, &spec.name).await
    }

    /// One job: evaluate every target of `spec` over `window` on the worker
    /// pool, then mark the job COMPLETED, or FAILED if any task failed.
    pub(super) async fn run_detection(
        &self,
        spec: &DetectionFunctionSpec,
        function: &Arc<dyn AnomalyFunction>,
        window: Interval,
        job_name: &str,
    ) -> Result<RunSummary, SchedulerError> {
        let started = Instant::now();
        if let Ok(mut m) = self.metrics.write() {
            m.record_start(job_name);
        }

        let result = self.execute_job(spec, function, window, job_name).await;

        let ok = matches!(&result, Ok(summary) if summary.status == JobStatus::Completed);
        if let Ok(mut m) = self.metrics.write() {
            m.record_run(job_name, started.elapsed(), ok);
        }
        result
    }

    async fn execute_job(
        &self,
        spec: &DetectionFunctionSpec,
        function: &Arc<dyn AnomalyFunction>,
        window: Interval,
        job_name: &str,
    ) -> Result<RunSummary, SchedulerError> {
        let job = self
            .stores
            .jobs
            .create(Job::new(job_name, window.start, window.end).with_function(spec.id))
            .await?;
        self.stores
            .jobs
            .update_status(job.id, JobStatus::Running)
            .await?;
        info!(
            job_id = job.id,
            function = %spec.name,
            window_start = window.start,
            window_end = window.end,
            "job running"
        );

        let outcomes = match self.run_tasks(spec, function, window, job.id).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                error!(job_id = job.id, error = %e, "job aborted");
                self.stores
                    .jobs
                    .update_status_and_end_time(&[job.id], JobStatus::Failed, Utc::now())
                    .await?;
                return Err(e);
            }
        };

        let failed_tasks = outcomes.iter().filter(|o| o.error.is_some()).count();
        let status = if failed_tasks > 0 {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        let mut merged_anomaly_ids: Vec<u64> = outcomes
            .iter()
            .flat_map(|o| o.merged_anomaly_ids.iter().copied())
            .collect();
        merged_anomaly_ids.sort_unstable();
        merged_anomaly_ids.dedup();

        self.stores
            .jobs
            .update_status_and_end_time(&[job.id], status, Utc::now())
            .await?;
        info!(
            job_id = job.id,
            status = %status,
            tasks = outcomes.len(),
            failed_tasks,
            anomalies = merged_anomaly_ids.len(),
            "job finished"
        );

        Ok(RunSummary {
            job_id: job.id,
            status,
            tasks: outcomes.len(),
            failed_tasks,
            merged_anomaly_ids,
        })
    }

    /// Create one task per target and run them all on the pool. Returns once
    /// every task is terminal.
    async fn run_tasks(
        &self,
        spec: &DetectionFunctionSpec,
        function: &Arc<dyn AnomalyFunction>,
        window: Interval,
        job_id: u64,
    ) -> Result<Vec<TaskOutcome>, SchedulerError> {
        let mut set = JoinSet::new();
        let mut pending = HashSet::new();
        let mut create_error = None;

        for key in spec.keys() {
            let task = match self.stores.tasks.create(Task::new(job_id, key.clone())).await {
                Ok(task) => task,
                Err(e) => {
                    // Let the tasks already spawned finish before failing the job.
                    error!(job_id, key = %key, error = %e, "failed to create task");
                    create_error = Some(e);
                    break;
                }
            };
            pending.insert(task.id);

            let run = TaskRun {
                task_id: task.id,
                key,
                window,
                function: Arc::clone(function),
                merge: spec.merge.clone(),
                source: Arc::clone(&self.source),
                stores: self.stores.clone(),
            };
            let pool = Arc::clone(&self.pool);
            set.spawn(async move {
                match pool.acquire_owned().await {
                    Ok(_permit) => run.execute().await,
                    Err(_) => run.finish(Err(SchedulerError::PoolClosed)).await,
                }
            });
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => {
                    pending.remove(&outcome.task_id);
                    if let Ok(mut m) = self.metrics.write() {
                        m.record_task(outcome.error.is_none());
                    }
                    outcomes.push(outcome);
                }
                Err(e) => error!(job_id, error = %e, "task panicked"),
            }
        }

        // Tasks that never reported back panicked mid-run.
        for task_id in pending {
            let message = "task panicked".to_string();
            self.stores
                .tasks
                .update_status(task_id, JobStatus::Failed, Some(Utc::now()), Some(message.clone()))
                .await?;
            if let Ok(mut m) = self.metrics.write() {
                m.record_task(false);
            }
            outcomes.push(TaskOutcome {
                task_id,
                merged_anomaly_ids: Vec::new(),
                error: Some(message),
            });
        }

        match create_error {
            Some(e) => Err(e.into()),
            None => Ok(outcomes),
        }
    }
}

// ── Task evaluation ────────────────────────────────────────────

struct TaskOutcome {
    task_id: u64,
    merged_anomaly_ids: Vec<u64>,
    error: Option<String>,
}

/// Everything one task needs, owned so it can run on the pool.
struct TaskRun {
    task_id: u64,
    key: TimeSeriesKey,
    window: Interval,
    function: Arc<dyn AnomalyFunction>,
    merge: MergeConfig,
    source: Arc<dyn DataSource>,
    stores: Stores,
}

impl TaskRun {
    async fn execute(self) -> TaskOutcome {
        let result = match self
            .stores
            .tasks
            .update_status(self.task_id, JobStatus::Running, None, None)
            .await
        {
            Ok(_) => self.evaluate().await,
            Err(e) => Err(e.into()),
        };
        self.finish(result).await
    }

    /// Fetch, analyze, merge and persist. Returns the merged anomaly ids.
    ///
    /// Merged anomalies reaching outside this window get their weight
    /// recomputed from a fetch of their own span.
    async fn evaluate(&self) -> Result<Vec<u64>, SchedulerError> {
        let mut ctx = self.fetch_context(self.window).await?;

        let raws = self.function.analyze(&mut ctx)?;
        debug!(task_id = self.task_id, key = %self.key, raw = raws.len(), "analyzed");
        if raws.is_empty() {
            return Ok(Vec::new());
        }

        // Held across read, merge and write so concurrent runs of this
        // series never overwrite each other's raw anomalies.
        let _series = self
            .stores
            .anomalies
            .lock_series(self.function.id(), &self.key.dimensions)
            .await;
        let near = Interval {
            start: self.window.start - self.merge.sequential_allowed_gap_millis,
            end: self.window.end,
        };
        let persisted = self
            .stores
            .anomalies
            .find_by_function_and_dimensions_near(self.function.id(), &self.key.dimensions, near)
            .await?;

        let mut ids = Vec::new();
        for mut merged in merge_with_persisted(self.function.metric(), raws, persisted, &self.merge)
        {
            if ctx.current().interval().covers(&merged.interval()) {
                self.function.update_merged_anomaly_info(&mut ctx, &mut merged)?;
            } else {
                let mut span_ctx = self.fetch_context(merged.interval()).await?;
                self.function
                    .update_merged_anomaly_info(&mut span_ctx, &mut merged)?;
            }
            let saved = self.stores.anomalies.save_merged(merged).await?;
            ids.push(saved.id);
        }
        self.stores.tasks.attach_results(self.task_id, ids.clone()).await?;
        Ok(ids)
    }

    /// Observed and baseline series for `interval`, as the function lays
    /// them out.
    async fn fetch_context(&self, interval: Interval) -> Result<DetectionContext, SchedulerError> {
        let bucket_millis = self.function.bucket_millis();
        let mut fetched = Vec::new();
        for range in self.function.data_range_intervals(interval) {
            fetched.push(self.source.fetch(&self.key, range, bucket_millis).await?);
        }

        let mut fetched = fetched.into_iter();
        let current = fetched
            .next()
            .ok_or_else(|| DataSourceError::NotFound(self.key.to_string()))?;
        Ok(DetectionContext::new(self.key.clone(), current, fetched.collect())
            .with_function_id(self.function.id()))
    }

    async fn finish(&self, result: Result<Vec<u64>, SchedulerError>) -> TaskOutcome {
        let now = Utc::now();
        match result {
            Ok(merged_anomaly_ids) => {
                let error = match self
                    .stores
                    .tasks
                    .update_status(self.task_id, JobStatus::Completed, Some(now), None)
                    .await
                {
                    Ok(_) => None,
                    Err(e) => {
                        error!(task_id = self.task_id, error = %e, "failed to complete task");
                        Some(e.to_string())
                    }
                };
                TaskOutcome {
                    task_id: self.task_id,
                    merged_anomaly_ids,
                    error,
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!(task_id = self.task_id, key = %self.key, error = %message, "task failed");
                if let Err(store_err) = self
                    .stores
                    .tasks
                    .update_status(self.task_id, JobStatus::Failed, Some(now), Some(message.clone()))
                    .await
                {
                    error!(task_id = self.task_id, error = %store_err, "failed to record task failure");
                }
                TaskOutcome {
                    task_id: self.task_id,
                    merged_anomaly_ids: Vec::new(),
                    error: Some(message),
                }
            }
        }
    }
}
