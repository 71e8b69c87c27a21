//! Flat string properties that configure a detection function, and the
//! baseline-spec parser.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use tidewatch_core::TimeUnit;

use crate::error::DetectError;
use crate::prediction::Aggregation;

pub const BASELINE: &str = "BASELINE";
pub const CHANGE_THRESHOLD: &str = "CHANGE_THRESHOLD";
pub const ENABLE_SMOOTHING: &str = "ENABLE_SMOOTHING";
pub const MOVING_AVERAGE_SMOOTHING_WINDOW_SIZE: &str = "MOVING_AVERAGE_SMOOTHING_WINDOW_SIZE";
pub const BUCKET_SIZE: &str = "BUCKET_SIZE";
pub const BUCKET_UNIT: &str = "BUCKET_UNIT";
pub const MERGE_CONTIGUOUS_BUCKETS: &str = "MERGE_CONTIGUOUS_BUCKETS";
pub const BASELINE_FILL_POLICY: &str = "BASELINE_FILL_POLICY";

pub const DEFAULT_BASELINE: &str = "w/w";
pub const DEFAULT_SMOOTHING_WINDOW_SIZE: usize = 7;

/// Option name → string value, as configured for one function instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionProperties(BTreeMap<String, String>);

impl FunctionProperties {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Parse a property, falling back to `default` when it is absent.
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, DetectError> {
        match self.get(key) {
            Some(raw) => raw.parse().map_err(|_| invalid(key, raw)),
            None => Ok(default),
        }
    }

    /// Parse a property that must be present.
    pub fn parse_required<T: FromStr>(&self, key: &'static str) -> Result<T, DetectError> {
        let raw = self.get(key).ok_or(DetectError::MissingProperty(key))?;
        raw.parse().map_err(|_| invalid(key, raw))
    }

    /// Boolean property; accepts `true`/`false` in any case.
    pub fn flag(&self, key: &str) -> Result<bool, DetectError> {
        match self.get(key) {
            None => Ok(false),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(invalid(key, raw)),
            },
        }
    }

    /// Bucket duration from `BUCKET_SIZE` / `BUCKET_UNIT`, defaulting to one hour.
    pub fn bucket_millis(&self) -> Result<i64, DetectError> {
        let size: i64 = self.parse_or(BUCKET_SIZE, 1)?;
        let unit: TimeUnit = match self.get(BUCKET_UNIT) {
            Some(raw) => raw.parse()?,
            None => TimeUnit::Hours,
        };
        if size <= 0 {
            return Err(invalid(BUCKET_SIZE, &size.to_string()));
        }
        Ok(unit.to_millis(size))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FunctionProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn invalid(key: &str, value: &str) -> DetectError {
    DetectError::InvalidProperty {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Extract the "number of periods back" from a baseline spec string.
///
/// Returns the first contiguous run of ASCII digits found scanning left to
/// right, or `"1"` when the string has no digits.
pub fn parse_wow_string(s: &str) -> String {
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        "1".to_string()
    } else {
        digits
    }
}

/// A parsed `BASELINE` option.
///
/// `"w/w"` and `"w/2w"` compare against a single series one or two periods
/// back; `"w/2wAvg"` averages the two most recent periods; `"w/3wMedian"`
/// takes the median of the three most recent periods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineSpec {
    pub periods: u32,
    pub aggregation: Aggregation,
}

impl BaselineSpec {
    pub fn parse(raw: &str) -> Result<Self, DetectError> {
        let periods: u32 = parse_wow_string(raw)
            .parse()
            .map_err(|_| DetectError::InvalidBaseline(raw.to_string()))?;
        if periods == 0 {
            return Err(DetectError::InvalidBaseline(raw.to_string()));
        }

        let lower = raw.to_ascii_lowercase();
        let aggregation = if lower.contains("avg") {
            Aggregation::Average
        } else if lower.contains("median") {
            Aggregation::Median
        } else {
            Aggregation::Single
        };

        Ok(Self {
            periods,
            aggregation,
        })
    }

    /// How many periods back each baseline series sits, in context order.
    pub fn offsets(&self) -> Vec<u32> {
        match self.aggregation {
            Aggregation::Single => vec![self.periods],
            Aggregation::Average | Aggregation::Median => (1..=self.periods).collect(),
        }
    }
}
