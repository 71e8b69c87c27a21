use tracing::{info, warn};

use tidewatch_core::{Interval, JobStatus};
use tidewatch_store::backfill_job_name;

use crate::error::SchedulerError;
use crate::types::BackfillSummary;

use super::Scheduler;

impl Scheduler {
    /// Evaluate consecutive windows of the function's window size across
    /// `[start_millis, end_millis)` as `adhoc_` jobs. The last window is
    /// clamped to `end_millis`.
    ///
    /// Resumes from the latest backfill job whose window starts in the range:
    /// after it when it completed, at it otherwise. Stops at the first
    /// failed window so a later call retries from there.
    pub async fn run_backfill(
        &self,
        function_id: u64,
        start_millis: i64,
        end_millis: i64,
    ) -> Result<BackfillSummary, SchedulerError> {
        let range = Interval::new(start_millis, end_millis)?;
        let spec = self
            .config
            .function(function_id)
            .ok_or(SchedulerError::UnknownFunction(function_id))?;
        let function = self.instantiate(spec)?;
        let job_name = backfill_job_name(&spec.name, spec.id);

        let latest = self
            .stores
            .jobs
            .find_latest_backfill_job_by_function_and_window(spec.id, range.start, range.end)
            .await?;
        let resumed_from = match &latest {
            Some(job) if job.status == JobStatus::Completed => job.window_end_time,
            Some(job) => job.window_start_time,
            None => range.start,
        }
        .clamp(range.start, range.end);

        info!(
            function = %spec.name,
            start = range.start,
            end = range.end,
            resumed_from,
            "backfill started"
        );

        let window_millis = spec.window_millis();
        let mut runs = Vec::new();
        let mut cursor = resumed_from;
        while cursor < range.end {
            if self.is_stopping() {
                warn!(function = %spec.name, cursor, "backfill interrupted by shutdown");
                break;
            }

            let window = Interval::new(cursor, (cursor + window_millis).min(range.end))?;
            let summary = self
                .run_detection(spec, &function, window, &job_name)
                .await?;
            let failed = summary.status == JobStatus::Failed;
            runs.push(summary);
            if failed {
                warn!(
                    function = %spec.name,
                    window_start = window.start,
                    "backfill window failed; stopping"
                );
                break;
            }
            cursor = window.end;
        }

        info!(function = %spec.name, runs = runs.len(), "backfill finished");
        Ok(BackfillSummary { resumed_from, runs })
    }
}
