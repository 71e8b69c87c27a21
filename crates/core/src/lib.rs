pub mod anomaly;
pub mod config;
pub mod error;
pub mod job;
pub mod key;
pub mod series;
pub mod time;

pub use anomaly::{MergedAnomalyResult, RawAnomalyResult};
pub use config::Config;
pub use error::*;
pub use job::{Job, JobStatus, Task};
pub use key::{DimensionMap, TimeSeriesKey};
pub use series::{Interval, TimeSeries};
pub use time::{Frequency, TimeUnit};
