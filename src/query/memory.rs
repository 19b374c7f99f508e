//! Reference backend over in-memory tables.
//!
//! Used by the CLI and the test suites. It evaluates compiled queries
//! directly: equality joins, grouped conditions, stable multi-key sorts,
//! windows and projection.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use csv::ReaderBuilder;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::debug;

use crate::error::QueryExecutionError;
use crate::metadata::{FieldMetadata, FieldType};
use crate::query::backend::QueryBackend;
use crate::query::clause::{
    bounds, BoolOp, Column, Condition, DatePart, JoinKind, Operator, SortDirection,
};
use crate::query::compiled::CompiledQuery;
use crate::types::{Row, Value};

/// Failure while loading table data.
#[derive(Debug, Error)]
pub enum LoadError {
    /// CSV reading failed.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// A cell could not be converted to its declared type.
    #[error("table '{table}' line {line}: column '{column}' expects {expected}, got '{value}'")]
    Value {
        /// Table being loaded.
        table: String,
        /// Offending column.
        column: String,
        /// 1-based line number including the header.
        line: u64,
        /// Raw cell.
        value: String,
        /// Declared type.
        expected: &'static str,
    },
}

/// In-memory tables keyed by name; rows keyed by bare column name.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    tables: RwLock<BTreeMap<String, Arc<Vec<Row>>>>,
    executions: AtomicU64,
    last_query: Mutex<Option<CompiledQuery>>,
}

impl InMemoryBackend {
    /// Creates a backend without tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces `table`.
    pub fn with_table(self, table: impl Into<String>, rows: Vec<Row>) -> Self {
        self.insert_table(table, rows);
        self
    }

    /// Adds or replaces `table`.
    pub fn insert_table(&self, table: impl Into<String>, rows: Vec<Row>) {
        self.tables.write().insert(table.into(), Arc::new(rows));
    }

    /// Loads `table` from a CSV file with a header row, converting cells per
    /// the declared field types. Columns without metadata stay strings.
    pub fn load_csv(
        &self,
        table: &str,
        path: &Path,
        fields: &[FieldMetadata],
    ) -> Result<usize, LoadError> {
        let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers = reader.headers()?.clone();
        let types: Vec<FieldType> = headers
            .iter()
            .map(|name| {
                fields
                    .iter()
                    .find(|meta| meta.field == name)
                    .map(|meta| meta.field_type)
                    .unwrap_or_default()
            })
            .collect();
        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record?;
            let line = idx as u64 + 2;
            let mut row = Row::new();
            for ((name, ty), cell) in headers.iter().zip(&types).zip(record.iter()) {
                let value = parse_cell(cell, *ty).ok_or_else(|| LoadError::Value {
                    table: table.to_owned(),
                    column: name.to_owned(),
                    line,
                    value: cell.to_owned(),
                    expected: ty.as_str(),
                })?;
                row.insert(name.to_owned(), value);
            }
            rows.push(row);
        }
        let count = rows.len();
        debug!(table, rows = count, path = %path.display(), "backend.load_csv");
        self.insert_table(table, rows);
        Ok(count)
    }

    /// Number of `execute` calls served so far.
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Acquire)
    }

    /// The most recent query passed to `execute`.
    pub fn last_query(&self) -> Option<CompiledQuery> {
        self.last_query.lock().clone()
    }

    fn table(&self, name: &str) -> Result<Arc<Vec<Row>>, QueryExecutionError> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| QueryExecutionError::MissingTable(name.to_owned()))
    }

    fn matching_rows(&self, query: &CompiledQuery) -> Result<Vec<Row>, QueryExecutionError> {
        let base = self.table(&query.base_table)?;
        let mut rows: Vec<Row> = base
            .iter()
            .map(|row| qualify(&query.base_table, row))
            .collect();
        for join in &query.joins {
            let target = self.table(&join.table)?;
            let left_key = format!("{}.{}", join.left_alias, join.left_field);
            let mut joined = Vec::with_capacity(rows.len());
            for row in rows {
                let left = row.get(&left_key).cloned().unwrap_or_default();
                let mut matched = false;
                if !left.is_null() {
                    for candidate in target.iter() {
                        let right = candidate.get(&join.field).unwrap_or(&Value::Null);
                        if left.loose_eq(right) {
                            let mut merged = row.clone();
                            merged.extend(qualify(&join.alias, candidate));
                            joined.push(merged);
                            matched = true;
                        }
                    }
                }
                if !matched && join.kind == JoinKind::Left {
                    joined.push(row);
                }
            }
            rows = joined;
        }
        rows.retain(|row| matches_where(query, row));
        Ok(rows)
    }
}

impl QueryBackend for InMemoryBackend {
    fn execute(&self, query: &CompiledQuery) -> Result<Vec<Row>, QueryExecutionError> {
        self.executions.fetch_add(1, Ordering::AcqRel);
        *self.last_query.lock() = Some(query.clone());
        let mut rows = self.matching_rows(query)?;
        if !query.sorts.is_empty() {
            rows.sort_by(|a, b| {
                for sort in &query.sorts {
                    let left = column_value(a, &sort.column);
                    let right = column_value(b, &sort.column);
                    let ord = match sort.direction {
                        SortDirection::Asc => left.total_cmp(&right),
                        SortDirection::Desc => right.total_cmp(&left),
                    };
                    if ord.is_ne() {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }
        let offset = usize::try_from(query.range.offset).unwrap_or(usize::MAX);
        let limit = query
            .range
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
        let window = rows.into_iter().skip(offset).take(limit);
        let rows: Vec<Row> = if query.fields.is_empty() {
            window.collect()
        } else {
            window
                .map(|row| {
                    query
                        .fields
                        .iter()
                        .map(|column| {
                            let key = column.key();
                            let value = row.get(&key).cloned().unwrap_or_default();
                            (key, value)
                        })
                        .collect()
                })
                .collect()
        };
        debug!(
            plan_hash = query.plan_hash,
            rows = rows.len(),
            "backend.execute"
        );
        Ok(rows)
    }

    fn count(&self, query: &CompiledQuery) -> Result<u64, QueryExecutionError> {
        Ok(self.matching_rows(query)?.len() as u64)
    }
}

fn qualify(alias: &str, row: &Row) -> Row {
    row.iter()
        .map(|(field, value)| (format!("{alias}.{field}"), value.clone()))
        .collect()
}

fn parse_cell(cell: &str, ty: FieldType) -> Option<Value> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Some(Value::Null);
    }
    match ty {
        FieldType::String => Some(Value::String(cell.to_owned())),
        FieldType::Integer => cell.parse().ok().map(Value::Int),
        FieldType::Float => cell.parse().ok().map(Value::Float),
        FieldType::Boolean => Value::from(cell).as_bool().map(Value::Bool),
        FieldType::Timestamp => parse_timestamp(cell).map(Value::Int),
    }
}

/// Accepts epoch seconds, RFC 3339 and `YYYY-MM-DD` (midnight UTC).
pub(crate) fn parse_timestamp(raw: &str) -> Option<i64> {
    if let Ok(secs) = raw.parse::<i64>() {
        return Some(secs);
    }
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(dt.unix_timestamp());
    }
    let date = Date::parse(raw, format_description!("[year]-[month]-[day]")).ok()?;
    Some(date.midnight().assume_utc().unix_timestamp())
}

fn column_value(row: &Row, column: &Column) -> Value {
    let value = row.get(&column.key()).cloned().unwrap_or_default();
    match column.part {
        None => value,
        Some(DatePart::Day) => value
            .as_i64()
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
            .map_or(Value::Null, |dt| Value::Int(i64::from(dt.day()))),
    }
}

fn matches_where(query: &CompiledQuery, row: &Row) -> bool {
    let clause = &query.where_clause;
    let mut filters = Vec::new();
    for group in &clause.groups {
        let holds = match group.op {
            BoolOp::And => group.conditions.iter().all(|c| condition_holds(c, row)),
            BoolOp::Or => group.conditions.iter().any(|c| condition_holds(c, row)),
        };
        if group.id == 0 {
            if !holds {
                return false;
            }
        } else {
            filters.push(holds);
        }
    }
    if filters.is_empty() {
        return true;
    }
    match clause.op {
        BoolOp::And => filters.iter().all(|&f| f),
        BoolOp::Or => filters.iter().any(|&f| f),
    }
}

fn condition_holds(condition: &Condition, row: &Row) -> bool {
    let actual = column_value(row, &condition.column);
    let expected = &condition.value;
    match condition.op {
        Operator::IsNull => actual.is_null(),
        Operator::IsNotNull => !actual.is_null(),
        _ if actual.is_null() => false,
        Operator::Eq => actual.loose_eq(expected),
        Operator::NotEq => !actual.loose_eq(expected),
        Operator::Lt => actual.total_cmp(expected).is_lt(),
        Operator::Le => actual.total_cmp(expected).is_le(),
        Operator::Gt => actual.total_cmp(expected).is_gt(),
        Operator::Ge => actual.total_cmp(expected).is_ge(),
        Operator::In => list_of(expected).iter().any(|item| actual.loose_eq(item)),
        Operator::NotIn => !list_of(expected).iter().any(|item| actual.loose_eq(item)),
        Operator::Contains => actual
            .to_string()
            .to_lowercase()
            .contains(&expected.to_string().to_lowercase()),
        Operator::StartsWith => actual
            .to_string()
            .to_lowercase()
            .starts_with(&expected.to_string().to_lowercase()),
        Operator::Between => {
            let (low, high) = bounds(expected);
            actual.total_cmp(low).is_ge() && actual.total_cmp(high).is_le()
        }
    }
}

fn list_of(value: &Value) -> Vec<Value> {
    match value {
        Value::List(items) => items.clone(),
        other => vec![other.clone()],
    }
}
