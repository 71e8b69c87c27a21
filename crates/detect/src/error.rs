//! Detection error types.

use thiserror::Error;

use tidewatch_core::{CoreError, SeriesError};

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("missing required property: {0}")]
    MissingProperty(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    InvalidProperty { key: String, value: String },

    #[error("invalid baseline spec {0:?}")]
    InvalidBaseline(String),

    #[error("unknown function type: {0}")]
    UnknownFunctionType(String),

    #[error("expected {expected} baseline series, got {actual}")]
    BaselineCountMismatch { expected: usize, actual: usize },

    #[error("detection context has not been transformed")]
    NotTransformed,

    #[error("series error: {0}")]
    Series(#[from] SeriesError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}
