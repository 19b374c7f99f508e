//! Frozen, backend-agnostic query handed to a [`crate::query::QueryBackend`].

use std::hash::Hasher;

use serde::Serialize;
use xxhash_rust::xxh64::Xxh64;

use crate::query::clause::{
    Column, Condition, Join, JoinKind, Operator, Range, SortClause, SortDirection, WhereClause,
};
use crate::types::Value;

/// One backend query assembled from handler contributions.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompiledQuery {
    /// Base table; also its alias.
    pub base_table: String,
    /// Joins in contribution order.
    pub joins: Vec<Join>,
    /// Selected columns; empty selects everything.
    pub fields: Vec<Column>,
    /// Conditions.
    #[serde(rename = "where")]
    pub where_clause: WhereClause,
    /// Sort clauses in contribution order.
    pub sorts: Vec<SortClause>,
    /// Row window.
    pub range: Range,
    /// Deterministic hash of the canonical form.
    pub plan_hash: u64,
}

impl CompiledQuery {
    pub(crate) fn new(
        base_table: String,
        joins: Vec<Join>,
        fields: Vec<Column>,
        where_clause: WhereClause,
        sorts: Vec<SortClause>,
        range: Range,
    ) -> Self {
        let mut query = Self {
            base_table,
            joins,
            fields,
            where_clause,
            sorts,
            range,
            plan_hash: 0,
        };
        query.plan_hash = compute_plan_hash(&query);
        query
    }

    /// Same rows without projection, ordering or window; used for totals.
    pub fn count_query(&self) -> CompiledQuery {
        CompiledQuery::new(
            self.base_table.clone(),
            self.joins.clone(),
            Vec::new(),
            self.where_clause.clone(),
            Vec::new(),
            Range::default(),
        )
    }

    /// Every condition in group order.
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.where_clause.conditions()
    }

    /// Readable SQL-like rendering for explain output and debugging.
    pub fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.fields.is_empty() {
            sql.push('*');
        } else {
            let cols: Vec<String> = self.fields.iter().map(ToString::to_string).collect();
            sql.push_str(&cols.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.base_table);
        for join in &self.joins {
            let kind = match join.kind {
                JoinKind::Left => "LEFT JOIN",
                JoinKind::Inner => "INNER JOIN",
            };
            sql.push_str(&format!(
                " {kind} {} AS {} ON {}.{} = {}.{}",
                join.table, join.alias, join.left_alias, join.left_field, join.alias, join.field
            ));
        }
        if let Some(predicate) = self.where_clause.render() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }
        if !self.sorts.is_empty() {
            let terms: Vec<String> = self.sorts.iter().map(ToString::to_string).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        if let Some(limit) = self.range.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if self.range.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", self.range.offset));
        }
        sql
    }
}

fn compute_plan_hash(query: &CompiledQuery) -> u64 {
    let mut hasher = Xxh64::new(0);
    hasher.write(query.base_table.as_bytes());
    hasher.write_u64(query.joins.len() as u64);
    for join in &query.joins {
        hasher.write(join.path_key().as_bytes());
        hasher.write(join.alias.as_bytes());
        hasher.write_u8(match join.kind {
            JoinKind::Left => 0,
            JoinKind::Inner => 1,
        });
    }
    hasher.write_u64(query.fields.len() as u64);
    for column in &query.fields {
        hash_column(column, &mut hasher);
    }
    hasher.write_u8(query.where_clause.op as u8);
    hasher.write_u64(query.where_clause.groups.len() as u64);
    for group in &query.where_clause.groups {
        hasher.write_u32(group.id);
        hasher.write_u8(group.op as u8);
        hasher.write_u64(group.conditions.len() as u64);
        for condition in &group.conditions {
            hash_column(&condition.column, &mut hasher);
            hasher.write_u8(operator_tag(condition.op));
            hash_value(&condition.value, &mut hasher);
        }
    }
    hasher.write_u64(query.sorts.len() as u64);
    for sort in &query.sorts {
        hash_column(&sort.column, &mut hasher);
        hasher.write_u8(match sort.direction {
            SortDirection::Asc => 0,
            SortDirection::Desc => 1,
        });
    }
    hasher.write_u64(query.range.offset);
    hasher.write_u64(query.range.limit.map_or(u64::MAX, |limit| limit));
    hasher.finish()
}

fn hash_column(column: &Column, hasher: &mut Xxh64) {
    hasher.write(column.alias.as_bytes());
    hasher.write_u8(b'.');
    hasher.write(column.field.as_bytes());
    hasher.write_u8(column.part.map_or(0, |_| 1));
}

fn operator_tag(op: Operator) -> u8 {
    match op {
        Operator::Eq => 0,
        Operator::NotEq => 1,
        Operator::Lt => 2,
        Operator::Le => 3,
        Operator::Gt => 4,
        Operator::Ge => 5,
        Operator::In => 6,
        Operator::NotIn => 7,
        Operator::Contains => 8,
        Operator::StartsWith => 9,
        Operator::Between => 10,
        Operator::IsNull => 11,
        Operator::IsNotNull => 12,
    }
}

fn hash_value(value: &Value, hasher: &mut Xxh64) {
    match value {
        Value::Null => hasher.write_u8(0),
        Value::Bool(b) => {
            hasher.write_u8(1);
            hasher.write_u8(*b as u8);
        }
        Value::Int(v) => {
            hasher.write_u8(2);
            hasher.write_i64(*v);
        }
        Value::Float(v) => {
            hasher.write_u8(3);
            hasher.write_u64(v.to_bits());
        }
        Value::String(s) => {
            hasher.write_u8(4);
            hasher.write(s.as_bytes());
        }
        Value::List(items) => {
            hasher.write_u8(5);
            hasher.write_u64(items.len() as u64);
            for item in items {
                hash_value(item, hasher);
            }
        }
        Value::Map(map) => {
            hasher.write_u8(6);
            for (key, item) in map {
                hasher.write(key.as_bytes());
                hash_value(item, hasher);
            }
        }
    }
}
