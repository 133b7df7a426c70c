use super::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named primitive columns of a single row, ordered by column name.
pub type Columns = BTreeMap<String, Value>;

/// A stored row: its two-level key, the store-assigned write timestamp and
/// the user columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowEntity {
    pub partition_key: String,
    pub row_key: String,
    pub timestamp: DateTime<Utc>,
    pub columns: Columns,
}

impl RowEntity {
    pub fn column(&self, name: &str) -> Option<&Value> {
        self.columns.get(name)
    }
}

/// One page of a partition scan. `continuation` is `None` once the
/// partition has been exhausted.
#[derive(Debug, Clone, Default)]
pub struct RowPage {
    pub rows: Vec<RowEntity>,
    pub continuation: Option<String>,
}

impl RowPage {
    pub fn is_last(&self) -> bool {
        self.continuation.is_none()
    }
}
