use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use tidewatch_core::{Job, MergedAnomalyResult, Task};

use crate::predicate::FieldValue;

/// A persistable record with a store-assigned numeric id.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Record kind used in errors and logs.
    const KIND: &'static str;

    fn id(&self) -> u64;

    fn set_id(&mut self, id: u64);

    /// Queryable field by name, `None` for unknown or unset fields.
    fn field(&self, name: &str) -> Option<FieldValue>;

    /// Stamp the record as modified at `now`.
    fn touch(&mut self, now: DateTime<Utc>);
}

impl Record for Job {
    const KIND: &'static str = "job";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.as_str().into()),
            "status" => Some(self.status.into()),
            "function_id" => self.function_id.map(FieldValue::from),
            "schedule_start_time" => Some(self.schedule_start_time.into()),
            "schedule_end_time" => self.schedule_end_time.map(FieldValue::from),
            "window_start_time" => Some(self.window_start_time.into()),
            "window_end_time" => Some(self.window_end_time.into()),
            "update_time" => Some(self.update_time.into()),
            _ => None,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.update_time = now;
    }
}

impl Record for Task {
    const KIND: &'static str = "task";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(self.id.into()),
            "job_id" => Some(self.job_id.into()),
            "status" => Some(self.status.into()),
            "metric" => Some(self.target.metric.as_str().into()),
            "start_time" => self.start_time.map(FieldValue::from),
            "end_time" => self.end_time.map(FieldValue::from),
            "update_time" => Some(self.update_time.into()),
            _ => None,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.update_time = now;
    }
}

impl Record for MergedAnomalyResult {
    const KIND: &'static str = "merged anomaly";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(self.id.into()),
            "function_id" => self.function_id.map(FieldValue::from),
            "metric" => Some(self.metric.as_str().into()),
            "dimensions" => Some(self.dimensions.to_string().into()),
            "start_time" => Some(self.start_time.into()),
            "end_time" => Some(self.end_time.into()),
            "created_time" => Some(self.created_time.into()),
            "update_time" => Some(self.update_time.into()),
            _ => None,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.update_time = now;
    }
}
