use std::path::Path;

use serde::{Deserialize, Serialize};

use tidewatch_core::{Config, Frequency, JobStatus, TimeUnit};
use tidewatch_detect::DetectionFunctionSpec;

use crate::error::SchedulerError;

fn default_pool_size() -> usize { 10 }
fn default_monitor_enabled() -> bool { true }
fn default_retention_days() -> u32 { 30 }
fn default_monitor_frequency() -> Frequency { Frequency::new(60, TimeUnit::Minutes) }

/// Retention monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_monitor_enabled")]
    pub enabled: bool,
    /// COMPLETED and FAILED jobs older than this are deleted.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_monitor_frequency")]
    pub frequency: Frequency,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: default_monitor_enabled(),
            retention_days: default_retention_days(),
            frequency: default_monitor_frequency(),
        }
    }
}

/// Scheduler configuration, typically parsed from TOML.
///
/// ```toml
/// pool_size = 10
///
/// [monitor]
/// retention_days = 30
/// frequency = { size = 1, unit = "HOURS" }
///
/// [[functions]]
/// id = 1
/// name = "pageviews_wow"
/// metric = "page_views"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Worker pool permits shared by every task of every run.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub functions: Vec<DetectionFunctionSpec>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            monitor: MonitorSettings::default(),
            functions: Vec::new(),
        }
    }
}

/// File layout where pool and monitor settings are optional, so values
/// left out of the file fall back to the environment.
#[derive(Deserialize)]
struct SchedulerFile {
    pool_size: Option<usize>,
    monitor: Option<MonitorSettings>,
    #[serde(default)]
    functions: Vec<DetectionFunctionSpec>,
}

impl SchedulerConfig {
    /// Pool and monitor settings from the process environment, no functions.
    pub fn from_env(env: &Config) -> Self {
        Self {
            pool_size: env.worker.pool_size,
            monitor: MonitorSettings {
                enabled: true,
                retention_days: env.monitor.retention_days,
                frequency: Frequency::new(env.monitor.frequency_minutes, TimeUnit::Minutes),
            },
            functions: Vec::new(),
        }
    }

    /// Parse TOML. Settings present in the file win over `env`.
    pub fn from_toml_str(s: &str, env: &Config) -> Result<Self, SchedulerError> {
        let file: SchedulerFile = toml::from_str(s)?;
        let base = Self::from_env(env);
        Ok(Self {
            pool_size: file.pool_size.unwrap_or(base.pool_size),
            monitor: file.monitor.unwrap_or(base.monitor),
            functions: file.functions,
        })
    }

    pub fn load(path: &Path, env: &Config) -> Result<Self, SchedulerError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s, env)
    }

    /// Pool size, never below one permit.
    pub fn resolved_pool_size(&self) -> usize {
        self.pool_size.max(1)
    }

    pub fn function(&self, id: u64) -> Option<&DetectionFunctionSpec> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub fn active_functions(&self) -> impl Iterator<Item = &DetectionFunctionSpec> {
        self.functions.iter().filter(|f| f.active)
    }
}

/// Outcome of one detection run (one job).
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub job_id: u64,
    pub status: JobStatus,
    pub tasks: usize,
    pub failed_tasks: usize,
    /// Merged anomalies created or updated by the run.
    pub merged_anomaly_ids: Vec<u64>,
}

/// Outcome of a backfill over a time range.
#[derive(Debug, Clone, Serialize)]
pub struct BackfillSummary {
    /// Where evaluation started after consulting earlier backfill jobs.
    pub resumed_from: i64,
    pub runs: Vec<RunSummary>,
}

impl BackfillSummary {
    pub fn failed_runs(&self) -> usize {
        self.runs
            .iter()
            .filter(|r| r.status == JobStatus::Failed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Config {
        Config::for_profile("TIDEWATCH_TYPES_TEST_UNSET")
    }

    #[test]
    fn scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.pool_size, 10);
        assert!(config.monitor.enabled);
        assert_eq!(config.monitor.retention_days, 30);
        assert!(config.functions.is_empty());
    }

    #[test]
    fn file_values_win_over_env() {
        let config = SchedulerConfig::from_toml_str(
            r#"
            pool_size = 3

            [monitor]
            retention_days = 7

            [[functions]]
            id = 1
            name = "pageviews_wow"
            metric = "page_views"
            targets = [{ country = "us" }, { country = "de" }]
            frequency = { size = 15, unit = "MINUTES" }

            [functions.properties]
            BASELINE = "w/2wAvg"
            CHANGE_THRESHOLD = "0.2"
            "#,
            &env(),
        )
        .unwrap();

        assert_eq!(config.pool_size, 3);
        assert_eq!(config.monitor.retention_days, 7);
        assert_eq!(config.monitor.frequency, default_monitor_frequency());
        assert_eq!(config.functions.len(), 1);

        let f = config.function(1).unwrap();
        assert_eq!(f.keys().len(), 2);
        assert_eq!(f.frequency, Frequency::new(15, TimeUnit::Minutes));
        assert_eq!(f.properties.get("BASELINE"), Some("w/2wAvg"));
    }

    #[test]
    fn missing_values_fall_back_to_env() {
        let env = env();
        let config = SchedulerConfig::from_toml_str("", &env).unwrap();
        assert_eq!(config.pool_size, env.worker.pool_size);
        assert_eq!(config.monitor.retention_days, env.monitor.retention_days);
    }

    #[test]
    fn malformed_toml_is_rejected() {
        assert!(matches!(
            SchedulerConfig::from_toml_str("pool_size = \"many\"", &env()),
            Err(SchedulerError::Config(_))
        ));
    }

    #[test]
    fn pool_size_never_zero() {
        let config = SchedulerConfig {
            pool_size: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.resolved_pool_size(), 1);
    }
}
