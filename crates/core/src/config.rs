use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

/// Process-level settings read from the environment.
///
/// Scheduler topology (detection functions, frequencies) lives in the
/// scheduler's TOML file; this struct carries the knobs operators usually
/// override per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub worker: WorkerConfig,
    pub storage: StorageConfig,
    pub monitor: MonitorConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TIDEWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("TIDEWATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            worker: WorkerConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            monitor: MonitorConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  worker:   pool_size={}", self.worker.pool_size);
        tracing::info!(
            "  storage:  snapshot_dir={}",
            self.storage
                .snapshot_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(in-memory only)".to_string())
        );
        tracing::info!(
            "  monitor:  retention_days={}, frequency_minutes={}",
            self.monitor.retention_days,
            self.monitor.frequency_minutes
        );
    }
}

// ── Worker pool ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum number of evaluation tasks running at once.
    pub pool_size: usize,
}

impl WorkerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            pool_size: profiled_env_u32(p, "TIDEWATCH_WORKER_POOL_SIZE", 10) as usize,
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for JSON store snapshots. `None` keeps records in memory only.
    pub snapshot_dir: Option<PathBuf>,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            snapshot_dir: profiled_env_opt(p, "TIDEWATCH_SNAPSHOT_DIR").map(PathBuf::from),
        }
    }
}

// ── Retention monitor ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Terminal jobs older than this many days are deleted.
    pub retention_days: u32,
    /// How often the retention monitor runs.
    pub frequency_minutes: u64,
}

impl MonitorConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            retention_days: profiled_env_u32(p, "TIDEWATCH_RETENTION_DAYS", 30),
            frequency_minutes: profiled_env_u64(p, "TIDEWATCH_MONITOR_FREQUENCY_MINUTES", 60),
        }
    }
}
