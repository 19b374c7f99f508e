//! Query fragments contributed by handlers.
//!
//! These are the fixed vocabulary a compiled query is assembled from; there
//! is no free-form expression language.

use std::fmt;

use serde::Serialize;

use crate::types::Value;

/// Join flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// Keep base rows without a match.
    Left,
    /// Drop base rows without a match.
    Inner,
}

/// Equality join from `left_alias.left_field` to `table.field`, bound under
/// `alias`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Join {
    /// Alias the joined table is addressed by.
    pub alias: String,
    /// Joined table.
    pub table: String,
    /// Column on the joined table.
    pub field: String,
    /// Alias of the table joined from.
    pub left_alias: String,
    /// Column on the table joined from.
    pub left_field: String,
    /// Join flavour.
    pub kind: JoinKind,
}

impl Join {
    /// Relationship path used to deduplicate joins.
    pub fn path_key(&self) -> String {
        join_path_key(&self.left_alias, &self.left_field, &self.table, &self.field)
    }
}

pub(crate) fn join_path_key(
    left_alias: &str,
    left_field: &str,
    table: &str,
    field: &str,
) -> String {
    format!("{left_alias}.{left_field}->{table}.{field}")
}

/// Part of a timestamp column a condition or sort looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePart {
    /// Day of month, 1–31.
    Day,
}

/// Column reference, optionally narrowed to a date part.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Column {
    /// Table alias.
    pub alias: String,
    /// Column name.
    pub field: String,
    /// Date part extracted from a timestamp column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<DatePart>,
}

impl Column {
    /// Plain column reference.
    pub fn new(alias: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            field: field.into(),
            part: None,
        }
    }

    /// Narrows the column to a date part.
    pub fn with_part(mut self, part: DatePart) -> Self {
        self.part = Some(part);
        self
    }

    /// `alias.field` key rows are addressed by.
    pub fn key(&self) -> String {
        format!("{}.{}", self.alias, self.field)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.part {
            Some(DatePart::Day) => write!(f, "DAY({}.{})", self.alias, self.field),
            None => write!(f, "{}.{}", self.alias, self.field),
        }
    }
}

/// Comparison operators available to filters and arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// Membership in a list value.
    In,
    /// Non-membership in a list value.
    NotIn,
    /// Substring match.
    Contains,
    /// Prefix match.
    StartsWith,
    /// Inclusive range given as a two-element list.
    Between,
    /// Column is null.
    IsNull,
    /// Column is not null.
    IsNotNull,
}

impl Operator {
    /// Parses the operator spellings accepted in filter options.
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw.trim().to_ascii_lowercase().as_str() {
            "=" | "eq" => Operator::Eq,
            "!=" | "<>" | "not_eq" => Operator::NotEq,
            "<" | "lt" => Operator::Lt,
            "<=" | "le" => Operator::Le,
            ">" | "gt" => Operator::Gt,
            ">=" | "ge" => Operator::Ge,
            "in" => Operator::In,
            "not in" | "not_in" => Operator::NotIn,
            "contains" => Operator::Contains,
            "starts" | "starts_with" => Operator::StartsWith,
            "between" => Operator::Between,
            "empty" | "is_null" => Operator::IsNull,
            "not empty" | "not_empty" | "is_not_null" => Operator::IsNotNull,
            _ => return None,
        })
    }

    /// Whether the operator ignores its value.
    pub fn is_unary(&self) -> bool {
        matches!(self, Operator::IsNull | Operator::IsNotNull)
    }

    /// Whether the operator expects a list value.
    pub fn takes_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn | Operator::Between)
    }
}

/// One predicate over a column.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Condition {
    /// Column tested.
    pub column: Column,
    /// Comparison.
    pub op: Operator,
    /// Operand; a list for `In`, `NotIn` and `Between`.
    pub value: Value,
}

impl Condition {
    /// Builds a condition.
    pub fn new(column: Column, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            column,
            op,
            value: value.into(),
        }
    }

    /// `column = value`.
    pub fn eq(column: Column, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Eq, value)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let col = &self.column;
        match self.op {
            Operator::Eq => write!(f, "{col} = {}", SqlLiteral(&self.value)),
            Operator::NotEq => write!(f, "{col} != {}", SqlLiteral(&self.value)),
            Operator::Lt => write!(f, "{col} < {}", SqlLiteral(&self.value)),
            Operator::Le => write!(f, "{col} <= {}", SqlLiteral(&self.value)),
            Operator::Gt => write!(f, "{col} > {}", SqlLiteral(&self.value)),
            Operator::Ge => write!(f, "{col} >= {}", SqlLiteral(&self.value)),
            Operator::In => write!(f, "{col} IN ({})", SqlLiteral(&self.value)),
            Operator::NotIn => write!(f, "{col} NOT IN ({})", SqlLiteral(&self.value)),
            Operator::Contains => write!(f, "{col} LIKE '%{}%'", like_body(&self.value)),
            Operator::StartsWith => write!(f, "{col} LIKE '{}%'", like_body(&self.value)),
            Operator::Between => {
                let (low, high) = bounds(&self.value);
                write!(f, "{col} BETWEEN {} AND {}", SqlLiteral(low), SqlLiteral(high))
            }
            Operator::IsNull => write!(f, "{col} IS NULL"),
            Operator::IsNotNull => write!(f, "{col} IS NOT NULL"),
        }
    }
}

pub(crate) fn bounds(value: &Value) -> (&Value, &Value) {
    match value.as_list() {
        Some([low, high, ..]) => (low, high),
        Some([only]) => (only, only),
        _ => (value, value),
    }
}

fn like_body(value: &Value) -> String {
    value.to_string().replace('\'', "''")
}

struct SqlLiteral<'a>(&'a Value);

impl fmt::Display for SqlLiteral<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::List(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", SqlLiteral(item))?;
                }
                Ok(())
            }
            Value::Map(_) => write!(f, "'{}'", self.0.to_string().replace('\'', "''")),
        }
    }
}

/// Boolean connective.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoolOp {
    /// Every member must hold.
    #[default]
    And,
    /// Any member may hold.
    Or,
}

impl BoolOp {
    /// Parses `and` / `or`, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "and" => Some(BoolOp::And),
            "or" => Some(BoolOp::Or),
            _ => None,
        }
    }

    fn keyword(&self) -> &'static str {
        match self {
            BoolOp::And => " AND ",
            BoolOp::Or => " OR ",
        }
    }
}

/// Numbered group of conditions joined by one connective.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConditionGroup {
    /// Group number; 0 is reserved for arguments.
    pub id: u32,
    /// Connective inside the group.
    pub op: BoolOp,
    /// Members in contribution order.
    pub conditions: Vec<Condition>,
}

impl ConditionGroup {
    pub(crate) fn render(&self) -> Option<String> {
        if self.conditions.is_empty() {
            return None;
        }
        let parts: Vec<String> = self.conditions.iter().map(ToString::to_string).collect();
        Some(parts.join(self.op.keyword()))
    }
}

/// Conditions of a compiled query: group 0 ANDed with the remaining groups
/// combined by `op`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct WhereClause {
    /// Connective between filter groups.
    pub op: BoolOp,
    /// Non-empty groups ordered by id.
    pub groups: Vec<ConditionGroup>,
}

impl WhereClause {
    /// Whether there is nothing to test.
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|group| group.conditions.is_empty())
    }

    /// Every condition in group order.
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.groups.iter().flat_map(|group| group.conditions.iter())
    }

    pub(crate) fn render(&self) -> Option<String> {
        let mut parts = Vec::new();
        let mut filters = Vec::new();
        for group in &self.groups {
            let Some(rendered) = group.render() else {
                continue;
            };
            if group.id == 0 {
                parts.push(rendered);
            } else {
                filters.push(rendered);
            }
        }
        match filters.len() {
            0 => {}
            1 => parts.push(filters.remove(0)),
            _ => {
                let wrapped: Vec<String> = filters.into_iter().map(|f| format!("({f})")).collect();
                parts.push(wrapped.join(self.op.keyword()));
            }
        }
        if parts.is_empty() {
            return None;
        }
        if parts.len() == 1 {
            return parts.pop();
        }
        let wrapped: Vec<String> = parts.into_iter().map(|p| format!("({p})")).collect();
        Some(wrapped.join(" AND "))
    }
}

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// Parses `asc` / `desc`, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// One `ORDER BY` term.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SortClause {
    /// Column sorted on.
    pub column: Column,
    /// Direction.
    pub direction: SortDirection,
}

impl fmt::Display for SortClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        write!(f, "{} {dir}", self.column)
    }
}

/// Row window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Range {
    /// Rows skipped.
    pub offset: u64,
    /// Maximum rows returned; unlimited when absent.
    pub limit: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions_render_as_sql() {
        let col = Column::new("articles", "id");
        assert_eq!(Condition::eq(col.clone(), 42i64).to_string(), "articles.id = 42");
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            Condition::new(col.clone(), Operator::In, list).to_string(),
            "articles.id IN (1, 2)"
        );
        assert_eq!(
            Condition::eq(Column::new("a", "t"), "O'Brien").to_string(),
            "a.t = 'O''Brien'"
        );
        assert_eq!(
            Condition::new(col.with_part(DatePart::Day), Operator::Eq, 7i64).to_string(),
            "DAY(articles.id) = 7"
        );
    }

    #[test]
    fn argument_group_is_anded_with_filter_groups() {
        let clause = WhereClause {
            op: BoolOp::Or,
            groups: vec![
                ConditionGroup {
                    id: 0,
                    op: BoolOp::And,
                    conditions: vec![Condition::eq(Column::new("a", "id"), 1i64)],
                },
                ConditionGroup {
                    id: 1,
                    op: BoolOp::And,
                    conditions: vec![Condition::eq(Column::new("a", "x"), 2i64)],
                },
                ConditionGroup {
                    id: 2,
                    op: BoolOp::And,
                    conditions: vec![Condition::eq(Column::new("a", "y"), 3i64)],
                },
            ],
        };
        assert_eq!(
            clause.render().as_deref(),
            Some("(a.id = 1) AND ((a.x = 2) OR (a.y = 3))")
        );
    }

    #[test]
    fn operators_parse_from_option_spellings() {
        assert_eq!(Operator::parse(">="), Some(Operator::Ge));
        assert_eq!(Operator::parse("NOT IN"), Some(Operator::NotIn));
        assert_eq!(Operator::parse("~"), None);
        assert!(Operator::IsNull.is_unary());
        assert!(Operator::Between.takes_list());
    }
}
