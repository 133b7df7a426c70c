use crate::core::{Columns, RowEntity, RowPage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;

/// All rows sharing one partition key, ordered by row key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Partition {
    name: String,
    rows: BTreeMap<String, RowEntity>,
}

impl Partition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: BTreeMap::new(),
        }
    }

    /// Insert or fully replace the row. No columns of a previous version
    /// survive. Returns `true` when the row already existed.
    pub fn upsert(&mut self, row_key: &str, columns: Columns, timestamp: DateTime<Utc>) -> bool {
        let entity = RowEntity {
            partition_key: self.name.clone(),
            row_key: row_key.to_string(),
            timestamp,
            columns,
        };
        self.rows.insert(row_key.to_string(), entity).is_some()
    }

    pub fn get(&self, row_key: &str) -> Option<&RowEntity> {
        self.rows.get(row_key)
    }

    /// Returns up to `limit` rows strictly after `continuation`.
    ///
    /// The continuation token is the last row key handed out, so a page
    /// boundary stays valid even if rows are written between pages.
    pub fn page(&self, continuation: Option<&str>, limit: usize) -> RowPage {
        let limit = limit.max(1);
        let lower = match continuation {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Unbounded,
        };

        let mut iter = self
            .rows
            .range::<String, _>((lower, Bound::Unbounded))
            .map(|(_, row)| row);
        let rows: Vec<RowEntity> = iter.by_ref().take(limit).cloned().collect();
        let has_more = iter.next().is_some();

        let continuation = if has_more {
            rows.last().map(|row| row.row_key.clone())
        } else {
            None
        };
        RowPage { rows, continuation }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
