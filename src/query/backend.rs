//! Backend collaborator boundary.

use crate::error::QueryExecutionError;
use crate::query::compiled::CompiledQuery;
use crate::types::Row;

/// Executes compiled queries against some data source.
///
/// Rows are keyed by `alias.field`. Implementations must honour the compiled
/// sort order; without sorts, order is their own business.
pub trait QueryBackend: Send + Sync {
    /// Runs `query` and returns its rows.
    fn execute(&self, query: &CompiledQuery) -> Result<Vec<Row>, QueryExecutionError>;

    /// Number of rows `query` matches, ignoring its window.
    fn count(&self, query: &CompiledQuery) -> Result<u64, QueryExecutionError> {
        Ok(self.execute(&query.count_query())?.len() as u64)
    }
}
