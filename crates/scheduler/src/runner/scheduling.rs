use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use tidewatch_detect::{AnomalyFunction, DetectionFunctionSpec};

use crate::monitor::{RetentionMonitor, RETENTION_STREAM};

use super::Scheduler;

/// A unit of recurring work with its own fixed-delay trigger loop.
pub(crate) enum Stream {
    Detection {
        spec: DetectionFunctionSpec,
        function: Arc<dyn AnomalyFunction>,
    },
    Retention {
        monitor: RetentionMonitor,
        delay: Duration,
    },
}

impl Stream {
    fn name(&self) -> &str {
        match self {
            Stream::Detection { spec, .. } => &spec.name,
            Stream::Retention { .. } => RETENTION_STREAM,
        }
    }

    fn delay(&self) -> Duration {
        match self {
            Stream::Detection { spec, .. } => spec.frequency.as_duration(),
            Stream::Retention { delay, .. } => *delay,
        }
    }
}

impl Scheduler {
    /// Trigger loop for one stream. The first run starts immediately; each
    /// later run starts `delay` after the previous one finished, so runs of
    /// one stream never overlap.
    pub(super) async fn run_stream(self: Arc<Self>, stream: Stream, mut shutdown: watch::Receiver<bool>) {
        let delay = stream.delay();
        info!(
            stream = %stream.name(),
            delay_ms = delay.as_millis() as u64,
            "stream started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.trigger(&stream).await;

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!(stream = %stream.name(), "stream stopped");
    }

    /// One run of a stream. Failures are logged and recorded; the loop keeps
    /// going.
    async fn trigger(&self, stream: &Stream) {
        match stream {
            Stream::Detection { spec, function } => {
                let now = Utc::now().timestamp_millis();
                if let Err(e) = self.run_function_at(spec, function, now).await {
                    error!(function = %spec.name, error = %e, "detection run failed");
                }
            }
            Stream::Retention { monitor, .. } => {
                let started = Instant::now();
                if let Ok(mut m) = self.metrics.write() {
                    m.record_start(RETENTION_STREAM);
                }
                let result = monitor.run_once().await;
                if let Ok(mut m) = self.metrics.write() {
                    m.record_run(RETENTION_STREAM, started.elapsed(), result.is_ok());
                }
                if let Err(e) = result {
                    error!(error = %e, "retention run failed");
                }
            }
        }
    }
}
