//! Vocabulary shared by every layer of the engine.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod value;

pub use value::Value;

/// Handler options keyed by option name.
pub type Options = BTreeMap<String, Value>;

/// Raw backend row keyed by `alias.field`.
pub type Row = BTreeMap<String, Value>;

/// The slot a handler plugin fills.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerType {
    /// Contextual filter resolved at request time.
    Argument,
    /// Output column rendered per row.
    Field,
    /// Fixed filter condition.
    Filter,
    /// Sort clause.
    Sort,
    /// Join to another table.
    Relationship,
    /// Display wrapper (page, block).
    Display,
    /// Overall output layout (list, table, grid).
    Style,
    /// Per-row layout.
    Row,
}

impl HandlerType {
    /// Every handler type in declaration order.
    pub const ALL: [HandlerType; 8] = [
        HandlerType::Argument,
        HandlerType::Field,
        HandlerType::Filter,
        HandlerType::Sort,
        HandlerType::Relationship,
        HandlerType::Display,
        HandlerType::Style,
        HandlerType::Row,
    ];

    /// Lowercase identifier used in definitions and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerType::Argument => "argument",
            HandlerType::Field => "field",
            HandlerType::Filter => "filter",
            HandlerType::Sort => "sort",
            HandlerType::Relationship => "relationship",
            HandlerType::Display => "display",
            HandlerType::Style => "style",
            HandlerType::Row => "row",
        }
    }
}

impl fmt::Display for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandlerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HandlerType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| format!("unknown handler type '{s}'"))
    }
}

/// Splits a `table.field` key at the first dot.
pub fn split_field_key(key: &str) -> Option<(&str, &str)> {
    let (table, field) = key.split_once('.')?;
    if table.is_empty() || field.is_empty() {
        return None;
    }
    Some((table, field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_type_round_trips_through_str() {
        for ty in HandlerType::ALL {
            assert_eq!(ty.as_str().parse::<HandlerType>(), Ok(ty));
        }
        assert!("widget".parse::<HandlerType>().is_err());
    }

    #[test]
    fn field_keys_split_at_first_dot() {
        assert_eq!(split_field_key("articles.title"), Some(("articles", "title")));
        assert_eq!(split_field_key("title"), None);
        assert_eq!(split_field_key(".title"), None);
    }
}
