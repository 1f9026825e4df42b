//! Tabular data-access seam and an in-memory implementation.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::LoadError;

/// A table row: column name to JSON value.
pub type Row = Map<String, Value>;

/// Row predicate understood by every `DataAccess` implementation.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { column: String, value: Value },
    Any(Vec<Filter>),
    All(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Match `value` against any of the given columns.
    pub fn any_column<S: AsRef<str>>(columns: &[S], value: &str) -> Self {
        Filter::Any(
            columns
                .iter()
                .map(|column| Filter::eq(column.as_ref(), value))
                .collect(),
        )
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Eq { column, value } => row
                .get(column)
                .is_some_and(|cell| values_match(cell, value)),
            Filter::Any(filters) => filters.iter().any(|filter| filter.matches(row)),
            Filter::All(filters) => filters.iter().all(|filter| filter.matches(row)),
        }
    }
}

fn values_match(cell: &Value, expected: &Value) -> bool {
    if cell == expected {
        return true;
    }
    match (cell, expected) {
        (Value::Number(number), Value::String(text))
        | (Value::String(text), Value::Number(number)) => {
            match (number.as_f64(), text.trim().parse::<f64>()) {
                (Some(a), Ok(b)) => a == b,
                _ => false,
            }
        }
        _ => false,
    }
}

/// Sort key for `query_one`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    /// Rows lacking the column (or holding null) sort last either way.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let left = a.get(&self.column).filter(|value| !value.is_null());
        let right = b.get(&self.column).filter(|value| !value.is_null());
        match (left, right) {
            (Some(x), Some(y)) => {
                let ordering = compare_values(x, y);
                if self.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Failure reported by a data-access backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AccessError {
    #[error("data service unavailable: {0}")]
    Unavailable(String),
    #[error("table not found: {0}")]
    MissingTable(String),
    #[error("query failed: {0}")]
    Query(String),
}

/// Read access to the tables backing the lab front-end.
#[async_trait]
pub trait DataAccess: Send + Sync {
    async fn query_many(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, AccessError>;

    /// Best matching row, first by `order_by` when given.
    async fn query_one(
        &self,
        table: &str,
        filter: &Filter,
        order_by: Option<&OrderBy>,
    ) -> Result<Option<Row>, AccessError> {
        let mut rows = self.query_many(table, filter).await?;
        if let Some(order) = order_by {
            rows.sort_by(|a, b| order.compare(a, b));
        }
        Ok(rows.into_iter().next())
    }
}

/// Tables held in memory, typically loaded from a JSON snapshot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: HashMap<String, Vec<Row>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<Row>) -> Self {
        self.tables.insert(name.into(), rows);
        self
    }

    pub fn insert(&mut self, table: &str, row: Row) {
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Load `{ "table": [ {row}, ... ], ... }`.
    pub fn from_json_str(input: &str) -> Result<Self, LoadError> {
        let value: Value = serde_json::from_str(input)?;
        Self::from_json_value(value)
    }

    pub fn from_json_value(value: Value) -> Result<Self, LoadError> {
        let Value::Object(tables) = value else {
            return Err(LoadError::Shape(
                "snapshot must be an object of tables".to_string(),
            ));
        };

        let mut store = Self::new();
        for (name, rows) in tables {
            let Value::Array(rows) = rows else {
                return Err(LoadError::Shape(format!("table {name} must be an array")));
            };
            let mut parsed = Vec::with_capacity(rows.len());
            for row in rows {
                match row {
                    Value::Object(row) => parsed.push(row),
                    _ => {
                        return Err(LoadError::Shape(format!(
                            "rows of table {name} must be objects"
                        )))
                    }
                }
            }
            store.tables.insert(name, parsed);
        }
        Ok(store)
    }
}

#[async_trait]
impl DataAccess for MemoryStore {
    async fn query_many(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, AccessError> {
        let rows = self
            .tables
            .get(table)
            .ok_or_else(|| AccessError::MissingTable(table.to_string()))?;
        Ok(rows
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn appointments() -> MemoryStore {
        MemoryStore::new().with_table(
            "appointments",
            vec![
                row(json!({ "mrno": "1001", "patient_name": "Old", "created_at": "2025-01-01T08:00:00Z" })),
                row(json!({ "mrno": 1001, "patient_name": "New", "created_at": "2025-06-01T08:00:00Z" })),
                row(json!({ "mrno": "1002", "patient_name": "Other", "created_at": "2025-07-01T08:00:00Z" })),
                row(json!({ "mrno": "1001", "patient_name": "Undated" })),
            ],
        )
    }

    #[test]
    fn numeric_and_string_identifiers_match() {
        let filter = Filter::eq("mrno", "1001");
        assert!(filter.matches(&row(json!({ "mrno": 1001 }))));
        assert!(filter.matches(&row(json!({ "mrno": "1001" }))));
        assert!(!filter.matches(&row(json!({ "mrno": "10010" }))));
        assert!(!filter.matches(&row(json!({ "id": "1001" }))));
    }

    #[test]
    fn any_column_checks_each_alias() {
        let filter = Filter::any_column(&["mrno", "patient_mrno"], "77");
        assert!(filter.matches(&row(json!({ "patient_mrno": "77" }))));
        assert!(!filter.matches(&row(json!({ "patient_id": "77" }))));
        assert!(!Filter::Any(Vec::new()).matches(&row(json!({}))));
        assert!(Filter::All(Vec::new()).matches(&row(json!({}))));
    }

    #[tokio::test]
    async fn query_one_prefers_latest_and_skips_undated() {
        let store = appointments();
        let latest = store
            .query_one(
                "appointments",
                &Filter::eq("mrno", "1001"),
                Some(&OrderBy::desc("created_at")),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest["patient_name"], "New");

        let earliest = store
            .query_one(
                "appointments",
                &Filter::eq("mrno", "1001"),
                Some(&OrderBy::asc("created_at")),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(earliest["patient_name"], "Old");
    }

    #[tokio::test]
    async fn query_many_filters_rows() {
        let rows = appointments()
            .query_many("appointments", &Filter::eq("mrno", "1001"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn unknown_table_is_an_error() {
        let err = appointments()
            .query_many("walk_in_patients", &Filter::eq("mrno", "1"))
            .await
            .unwrap_err();
        assert_eq!(err, AccessError::MissingTable("walk_in_patients".into()));
    }

    #[test]
    fn snapshot_shape_is_checked() {
        let store = MemoryStore::from_json_str(r#"{ "users": [ { "mrno": "1" } ] }"#).unwrap();
        assert_eq!(store.table_names().collect::<Vec<_>>(), vec!["users"]);

        assert!(matches!(
            MemoryStore::from_json_str(r#"{ "users": {} }"#),
            Err(LoadError::Shape(_))
        ));
        assert!(matches!(
            MemoryStore::from_json_str("[1, 2]"),
            Err(LoadError::Shape(_))
        ));
    }
}
