use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use tidewatch_detect::{create_function, AnomalyFunction, DetectError, DetectionFunctionSpec};
use tidewatch_store::Stores;

use crate::data_source::DataSource;
use crate::error::SchedulerError;
use crate::metrics::SchedulerMetrics;
use crate::monitor::RetentionMonitor;
use crate::types::SchedulerConfig;

use super::scheduling::Stream;

/// The detection scheduler. Runs every active function on a fixed delay,
/// fanning each run out over a shared bounded worker pool.
pub struct Scheduler {
    pub(super) config: SchedulerConfig,
    pub(super) stores: Stores,
    pub(super) source: Arc<dyn DataSource>,
    /// Worker pool shared by every task of every run.
    pub(super) pool: Arc<Semaphore>,
    pub(super) metrics: Arc<RwLock<SchedulerMetrics>>,
    /// Flips to `true` once when stopping.
    pub(super) shutdown: watch::Sender<bool>,
    pub(super) started: AtomicBool,
    /// One trigger loop per stream.
    pub(super) loops: Mutex<JoinSet<()>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, stores: Stores, source: Arc<dyn DataSource>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let pool = Arc::new(Semaphore::new(config.resolved_pool_size()));
        Self {
            config,
            stores,
            source,
            pool,
            metrics: Arc::new(RwLock::new(SchedulerMetrics::default())),
            shutdown,
            started: AtomicBool::new(false),
            loops: Mutex::new(JoinSet::new()),
        }
    }

    /// Instantiate every active function and spawn one fixed-delay stream
    /// per function, plus the retention monitor when enabled.
    ///
    /// Configuration errors are reported here, before any task runs. Fails
    /// with [`SchedulerError::AlreadyStarted`] on a second call.
    pub fn start(self: &Arc<Self>) -> Result<(), SchedulerError> {
        if self.started.load(Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted);
        }

        let mut streams = Vec::new();
        for spec in self.config.active_functions() {
            let function = self.instantiate(spec)?;
            streams.push(Stream::Detection {
                spec: spec.clone(),
                function,
            });
        }
        if self.config.monitor.enabled {
            streams.push(Stream::Retention {
                monitor: RetentionMonitor::new(
                    self.stores.jobs.clone(),
                    self.config.monitor.retention_days,
                ),
                delay: self.config.monitor.frequency.as_duration(),
            });
        }

        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SchedulerError::AlreadyStarted);
        }

        let mut loops = self
            .loops
            .lock()
            .map_err(|e| SchedulerError::LockPoisoned(format!("scheduler loops: {e}")))?;
        info!(
            streams = streams.len(),
            pool_size = self.config.resolved_pool_size(),
            "Scheduler starting"
        );
        for stream in streams {
            let scheduler = Arc::clone(self);
            let shutdown = self.shutdown.subscribe();
            loops.spawn(scheduler.run_stream(stream, shutdown));
        }
        Ok(())
    }

    /// Suppress future triggers and wait up to `timeout` for in-flight runs.
    /// Returns `false` if runs were still going when the timeout expired;
    /// those are detached and finish on their own.
    pub async fn stop(&self, timeout: Duration) -> bool {
        info!("Scheduler shutdown requested");
        self.shutdown.send_replace(true);

        let mut loops = self.take_loops();
        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = loops.join_next().await {
                if let Err(e) = result {
                    if e.is_panic() {
                        error!(error = %e, "trigger loop panicked");
                    }
                }
            }
        })
        .await;

        match drained {
            Ok(()) => {
                info!("Scheduler stopped");
                true
            }
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    remaining = loops.len(),
                    "Scheduler stop timed out; detaching in-flight runs"
                );
                loops.detach_all();
                false
            }
        }
    }

    fn take_loops(&self) -> JoinSet<()> {
        match self.loops.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn is_stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Build and validate the function a spec describes.
    pub(super) fn instantiate(
        &self,
        spec: &DetectionFunctionSpec,
    ) -> Result<Arc<dyn AnomalyFunction>, SchedulerError> {
        let init_error = |source: DetectError| SchedulerError::FunctionInit {
            name: spec.name.clone(),
            source,
        };
        if spec.window_millis() <= 0 {
            return Err(init_error(DetectError::InvalidProperty {
                key: "window_size".to_string(),
                value: spec.window_size.to_string(),
            }));
        }
        if spec.frequency.as_duration().is_zero() {
            return Err(init_error(DetectError::InvalidProperty {
                key: "frequency".to_string(),
                value: spec.frequency.to_string(),
            }));
        }
        create_function(spec).map_err(init_error)
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.metrics.read().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }
}
