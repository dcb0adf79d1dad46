//! In-memory coverage aggregate
//!
//! Reports are Istanbul coverage maps keyed by source file. Merging a report
//! sums the statement (`s`) and function (`f`) hit counters per id and the
//! branch (`b`) counters element-wise; every other field keeps the value
//! from the first report that mentioned the file.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::{CollectorError, Result};

#[derive(Debug, Default)]
struct Aggregate {
    files: Map<String, Value>,
    reports: usize,
}

/// Shared handle to the aggregate; clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct CoverageStore {
    inner: Arc<RwLock<Aggregate>>,
}

impl CoverageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one client report. Returns the number of files now covered.
    pub async fn merge(&self, report: Value) -> Result<usize> {
        let Value::Object(report) = report else {
            return Err(CollectorError::InvalidReport(kind(&report)));
        };

        let mut aggregate = self.inner.write().await;
        merge_report(&mut aggregate.files, report);
        aggregate.reports += 1;
        Ok(aggregate.files.len())
    }

    pub async fn snapshot(&self) -> Value {
        Value::Object(self.inner.read().await.files.clone())
    }

    pub async fn report_count(&self) -> usize {
        self.inner.read().await.reports
    }

    pub async fn file_count(&self) -> usize {
        self.inner.read().await.files.len()
    }

    pub async fn reset(&self) {
        let mut aggregate = self.inner.write().await;
        aggregate.files.clear();
        aggregate.reports = 0;
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Fold `report` into `files`.
pub fn merge_report(files: &mut Map<String, Value>, report: Map<String, Value>) {
    for (file, incoming) in report {
        match files.get_mut(&file) {
            Some(existing) => merge_file(existing, incoming),
            None => {
                files.insert(file, incoming);
            }
        }
    }
}

fn merge_file(existing: &mut Value, incoming: Value) {
    let (Some(existing), Value::Object(incoming)) = (existing.as_object_mut(), incoming) else {
        return;
    };

    for (key, value) in incoming {
        if !existing.contains_key(&key) {
            existing.insert(key, value);
            continue;
        }
        let Some(slot) = existing.get_mut(&key) else {
            continue;
        };
        match key.as_str() {
            "s" | "f" => sum_counts(slot, &value),
            "b" => sum_branches(slot, &value),
            _ => {}
        }
    }
}

fn hits(value: &Value) -> u64 {
    value.as_u64().unwrap_or(0)
}

fn sum_counts(slot: &mut Value, incoming: &Value) {
    let (Some(slot), Some(incoming)) = (slot.as_object_mut(), incoming.as_object()) else {
        return;
    };
    for (id, count) in incoming {
        let total = slot.get(id).map(hits).unwrap_or(0) + hits(count);
        slot.insert(id.clone(), Value::from(total));
    }
}

fn sum_branches(slot: &mut Value, incoming: &Value) {
    let (Some(slot), Some(incoming)) = (slot.as_object_mut(), incoming.as_object()) else {
        return;
    };
    for (id, counts) in incoming {
        let Some(counts) = counts.as_array() else {
            continue;
        };
        match slot.get_mut(id).and_then(Value::as_array_mut) {
            Some(existing) => {
                for (i, count) in counts.iter().enumerate() {
                    match existing.get_mut(i) {
                        Some(current) => *current = Value::from(hits(current) + hits(count)),
                        None => existing.push(Value::from(hits(count))),
                    }
                }
            }
            None => {
                slot.insert(id.clone(), Value::Array(counts.clone()));
            }
        }
    }
}
