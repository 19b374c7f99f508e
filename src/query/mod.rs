#![forbid(unsafe_code)]

//! Query assembly and execution.
//!
//! Handlers contribute joins, conditions, sorts and selected columns to a
//! [`QueryBuilder`]; the builder compiles them into one [`CompiledQuery`]
//! that a [`QueryBackend`] executes.

/// Backend collaborator trait.
pub mod backend;
/// Contribution-order query accumulator.
pub mod builder;
/// Query fragments: joins, conditions, sorts.
pub mod clause;
/// Frozen queries with SQL rendering and plan hashing.
pub mod compiled;
/// Reference in-memory backend.
pub mod memory;

pub use backend::QueryBackend;
pub use builder::{QueryBuilder, ARGUMENT_GROUP, DEFAULT_FILTER_GROUP};
pub use clause::{
    BoolOp, Column, Condition, ConditionGroup, DatePart, Join, JoinKind, Operator, Range,
    SortClause, SortDirection, WhereClause,
};
pub use compiled::CompiledQuery;
pub use memory::{InMemoryBackend, LoadError};
