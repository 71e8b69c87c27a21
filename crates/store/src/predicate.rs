//! Field predicates and ordering for [`RecordStore`](crate::RecordStore) queries.

use chrono::{DateTime, Utc};

use tidewatch_core::JobStatus;

use crate::record::Record;

/// A comparable field value. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldValue {
    Int(i64),
    Text(String),
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<JobStatus> for FieldValue {
    fn from(v: JobStatus) -> Self {
        FieldValue::Text(v.as_str().to_string())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Int(v.timestamp_millis())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every record.
    All,
    Eq(&'static str, FieldValue),
    Lt(&'static str, FieldValue),
    And(Vec<Predicate>),
    /// Text match where `%` stands for any run of characters. Every other
    /// character, `_` included, matches itself.
    Like(&'static str, String),
}

impl Predicate {
    pub fn eq(field: &'static str, value: impl Into<FieldValue>) -> Self {
        Predicate::Eq(field, value.into())
    }

    pub fn lt(field: &'static str, value: impl Into<FieldValue>) -> Self {
        Predicate::Lt(field, value.into())
    }

    pub fn like(field: &'static str, pattern: impl Into<String>) -> Self {
        Predicate::Like(field, pattern.into())
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut parts) => {
                parts.push(other);
                Predicate::And(parts)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    pub fn matches<R: Record>(&self, record: &R) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Eq(field, value) => record.field(field).as_ref() == Some(value),
            Predicate::Lt(field, value) => match record.field(field) {
                Some(actual) => &actual < value,
                None => false,
            },
            Predicate::And(parts) => parts.iter().all(|p| p.matches(record)),
            Predicate::Like(field, pattern) => match record.field(field) {
                Some(FieldValue::Text(text)) => like_match(pattern, &text),
                _ => false,
            },
        }
    }
}

/// Sort key for ordered queries. Ties break on record id in the same direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub field: &'static str,
    pub descending: bool,
}

impl Order {
    pub fn asc(field: &'static str) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub fn desc(field: &'static str) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

/// `%`-wildcard match over the whole of `text`.
pub fn like_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !text.starts_with(first) {
        return false;
    }
    let mut rest = &text[first.len()..];
    if rest.len() < last.len() || !rest.ends_with(last) {
        return false;
    }
    rest = &rest[..rest.len() - last.len()];

    for middle in &parts[1..parts.len() - 1] {
        match rest.find(middle) {
            Some(pos) => rest = &rest[pos + middle.len()..],
            None => return false,
        }
    }
    true
}
