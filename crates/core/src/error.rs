use thiserror::Error;

/// Errors raised while building or mutating a [`TimeSeries`](crate::TimeSeries).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    #[error("timestamp {timestamp} outside interval [{start}, {end})")]
    OutOfInterval { timestamp: i64, start: i64, end: i64 },

    #[error("timestamp {timestamp} not aligned to {bucket_millis}ms buckets from {start}")]
    Misaligned {
        timestamp: i64,
        start: i64,
        bucket_millis: i64,
    },

    #[error("invalid interval [{start}, {end})")]
    InvalidInterval { start: i64, end: i64 },

    #[error("bucket size must be positive, got {0}")]
    InvalidBucket(i64),
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Series error: {0}")]
    Series(#[from] SeriesError),

    #[error("Unknown time unit: {0}")]
    UnknownTimeUnit(String),

    #[error("Invalid config value for {key}: {value}")]
    InvalidConfig { key: String, value: String },

    #[error("{0}")]
    Other(String),
}
