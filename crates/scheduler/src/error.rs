use thiserror::Error;

use tidewatch_core::SeriesError;
use tidewatch_detect::DetectError;
use tidewatch_store::StoreError;

use crate::data_source::DataSourceError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler already started")]
    AlreadyStarted,

    #[error("worker pool closed")]
    PoolClosed,

    #[error("unknown detection function: {0}")]
    UnknownFunction(u64),

    #[error("function {name} failed to initialize: {source}")]
    FunctionInit {
        name: String,
        #[source]
        source: DetectError,
    },

    #[error("detection error: {0}")]
    Detect(#[from] DetectError),

    #[error("series error: {0}")]
    Series(#[from] SeriesError),

    #[error("data source error: {0}")]
    DataSource(#[from] DataSourceError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid scheduler config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}
