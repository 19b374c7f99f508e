//! Accumulates handler contributions into a single compiled query.

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::query::clause::{
    join_path_key, BoolOp, Column, Condition, ConditionGroup, Join, JoinKind, Range, SortClause,
    SortDirection, WhereClause,
};
use crate::query::compiled::CompiledQuery;

/// Group reserved for argument conditions; always ANDed with filter groups.
pub const ARGUMENT_GROUP: u32 = 0;

/// Group filters land in unless they pick another one.
pub const DEFAULT_FILTER_GROUP: u32 = 1;

/// Backend-agnostic query under construction.
///
/// Handlers contribute in lifecycle order; the builder deduplicates joins by
/// relationship path and selected columns by key, and keeps sort and
/// condition order exactly as contributed.
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    base_table: String,
    joins: Vec<Join>,
    join_index: FxHashMap<String, usize>,
    aliases: FxHashSet<String>,
    fields: Vec<Column>,
    field_keys: FxHashSet<String>,
    groups: BTreeMap<u32, ConditionGroup>,
    group_ops: BTreeMap<u32, BoolOp>,
    group_operator: BoolOp,
    sorts: Vec<SortClause>,
    range: Range,
}

impl QueryBuilder {
    /// Starts a query over `base_table`, which is also its alias.
    pub fn new(base_table: impl Into<String>) -> Self {
        let base_table = base_table.into();
        let mut aliases = FxHashSet::default();
        aliases.insert(base_table.clone());
        Self {
            base_table,
            joins: Vec::new(),
            join_index: FxHashMap::default(),
            aliases,
            fields: Vec::new(),
            field_keys: FxHashSet::default(),
            groups: BTreeMap::new(),
            group_ops: BTreeMap::new(),
            group_operator: BoolOp::And,
            sorts: Vec::new(),
            range: Range::default(),
        }
    }

    /// Base table, which doubles as its alias.
    pub fn base_table(&self) -> &str {
        &self.base_table
    }

    /// Whether `alias` names the base table or a join added so far.
    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.contains(alias)
    }

    /// Adds a join from `left_alias.left_field` to `table.field` and returns
    /// the alias the joined table is addressed by.
    ///
    /// A second request for the same path returns the existing alias; if the
    /// second request asks for an inner join the existing join is narrowed.
    pub fn add_join(
        &mut self,
        left_alias: &str,
        left_field: &str,
        table: &str,
        field: &str,
        kind: JoinKind,
    ) -> String {
        let key = join_path_key(left_alias, left_field, table, field);
        if let Some(&idx) = self.join_index.get(&key) {
            let join = &mut self.joins[idx];
            if kind == JoinKind::Inner {
                join.kind = JoinKind::Inner;
            }
            return join.alias.clone();
        }
        let alias = self.fresh_alias(table);
        self.aliases.insert(alias.clone());
        self.join_index.insert(key, self.joins.len());
        self.joins.push(Join {
            alias: alias.clone(),
            table: table.to_owned(),
            field: field.to_owned(),
            left_alias: left_alias.to_owned(),
            left_field: left_field.to_owned(),
            kind,
        });
        alias
    }

    fn fresh_alias(&self, table: &str) -> String {
        if !self.aliases.contains(table) {
            return table.to_owned();
        }
        (2..)
            .map(|n| format!("{table}_{n}"))
            .find(|candidate| !self.aliases.contains(candidate))
            .unwrap_or_else(|| format!("{table}_{}", self.aliases.len() + 1))
    }

    /// Selects `alias.field`, returning the key rows will carry it under.
    pub fn add_field(&mut self, alias: &str, field: &str) -> String {
        let column = Column::new(alias, field);
        let key = column.key();
        if self.field_keys.insert(key.clone()) {
            self.fields.push(column);
        }
        key
    }

    /// Appends `condition` to group `group`.
    pub fn add_condition(&mut self, group: u32, condition: Condition) {
        let op = self.group_ops.get(&group).copied().unwrap_or_default();
        self.groups
            .entry(group)
            .or_insert_with(|| ConditionGroup {
                id: group,
                op,
                conditions: Vec::new(),
            })
            .conditions
            .push(condition);
    }

    /// Sets the connective inside `group`.
    pub fn set_group_op(&mut self, group: u32, op: BoolOp) {
        self.group_ops.insert(group, op);
        if let Some(existing) = self.groups.get_mut(&group) {
            existing.op = op;
        }
    }

    /// Sets the connective between filter groups.
    pub fn set_group_operator(&mut self, op: BoolOp) {
        self.group_operator = op;
    }

    /// Appends a sort clause.
    pub fn add_sort(&mut self, column: Column, direction: SortDirection) {
        self.sorts.push(SortClause { column, direction });
    }

    /// Restricts the row window.
    pub fn set_range(&mut self, offset: u64, limit: Option<u64>) {
        self.range = Range { offset, limit };
    }

    /// Number of joins added so far.
    pub fn join_count(&self) -> usize {
        self.joins.len()
    }

    /// Freezes the contributions into a compiled query.
    pub fn compile(&self) -> CompiledQuery {
        let groups = self
            .groups
            .values()
            .filter(|group| !group.conditions.is_empty())
            .cloned()
            .collect();
        CompiledQuery::new(
            self.base_table.clone(),
            self.joins.clone(),
            self.fields.clone(),
            WhereClause {
                op: self.group_operator,
                groups,
            },
            self.sorts.clone(),
            self.range,
        )
    }
}
