//! Error taxonomy for view initialization, query execution and argument
//! resolution.
#![allow(missing_docs)]

use thiserror::Error;

use crate::types::HandlerType;

/// Result alias for the engine's public entry points.
pub type Result<T> = std::result::Result<T, ViewError>;

/// A single option that failed a handler's own validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionError {
    /// Option name.
    pub option: String,
    /// Human-readable reason.
    pub message: String,
}

impl OptionError {
    /// Builds an error for `option`.
    pub fn new(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            option: option.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for OptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.option, self.message)
    }
}

/// Lookup of an unregistered `(type, id)` pair.
///
/// Recovered by substituting the type's default handler; never surfaced to
/// callers of `run`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no {ty} plugin registered under '{id}'")]
pub struct PluginNotFoundError {
    /// Requested handler type.
    pub ty: HandlerType,
    /// Requested plugin id.
    pub id: String,
}

/// Failures while registering plugin descriptors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A descriptor with the same `(type, id)` already exists.
    #[error("{ty} plugin '{id}' is already registered")]
    Duplicate { ty: HandlerType, id: String },
    /// The descriptor's factory produced a handler of another type.
    #[error("{declared} plugin '{id}' instantiates a {actual} handler")]
    TypeMismatch {
        id: String,
        declared: HandlerType,
        actual: HandlerType,
    },
    /// A default-value provider with the same id already exists.
    #[error("default provider '{0}' is already registered")]
    DuplicateProvider(String),
}

/// Fatal initialization failures; execution aborts before any query is built.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ViewInitError {
    /// The requested display id does not exist on the view.
    #[error("view '{view}' has no display '{display}'")]
    UnknownDisplay { view: String, display: String },
    /// The display's base table is not exposed by the metadata cache.
    #[error("display '{display}' uses unknown base table '{table}'")]
    UnknownBaseTable { display: String, table: String },
    /// A relationship handler references a join path that does not exist.
    #[error("relationship '{handler}' references missing join path '{path}'")]
    BrokenRelationship { handler: String, path: String },
    /// A handler names a relationship id that is not declared on the display.
    #[error("{ty} handler '{field}' uses undeclared relationship '{relationship}'")]
    UnknownRelationship {
        ty: HandlerType,
        field: String,
        relationship: String,
    },
    /// A handler's options failed its own validation.
    #[error("{ty} plugin '{plugin}' rejected its options: {}", join_errors(.errors))]
    InvalidOptions {
        ty: HandlerType,
        plugin: String,
        errors: Vec<OptionError>,
    },
    /// A lifecycle step was invoked out of order.
    #[error("cannot {operation} while the view is {state}")]
    Lifecycle {
        operation: &'static str,
        state: &'static str,
    },
}

impl ViewInitError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            ViewInitError::UnknownDisplay { .. } => "UnknownDisplay",
            ViewInitError::UnknownBaseTable { .. } => "UnknownBaseTable",
            ViewInitError::BrokenRelationship { .. } => "BrokenRelationship",
            ViewInitError::UnknownRelationship { .. } => "UnknownRelationship",
            ViewInitError::InvalidOptions { .. } => "InvalidOptions",
            ViewInitError::Lifecycle { .. } => "Lifecycle",
        }
    }
}

fn join_errors(errors: &[OptionError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure reported by the backend collaborator; surfaced verbatim, never
/// retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryExecutionError {
    /// The backend rejected or failed the query.
    #[error("backend error: {0}")]
    Backend(String),
    /// The backend gave up waiting.
    #[error("backend timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },
    /// The compiled query referenced a table the backend does not hold.
    #[error("backend has no table '{0}'")]
    MissingTable(String),
}

impl QueryExecutionError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            QueryExecutionError::Backend(_) => "Backend",
            QueryExecutionError::Timeout { .. } => "Timeout",
            QueryExecutionError::MissingTable(_) => "MissingTable",
        }
    }
}

/// How an argument that could not be resolved ends the execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentFailure {
    /// Render an empty result.
    RenderNothing,
    /// Terminate the execution as not found.
    NotFound,
}

/// A declared per-handler outcome of argument resolution; never a crash.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("argument #{position} ('{field}') unresolved: {failure:?}")]
pub struct ArgumentResolutionError {
    /// Zero-based position of the argument handler.
    pub position: usize,
    /// Field key of the argument handler.
    pub field: String,
    /// Declared failure behavior.
    pub failure: ArgumentFailure,
}

/// Umbrella error returned by [`crate::view::ViewExecutable::run`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ViewError {
    /// Fatal initialization failure.
    #[error(transparent)]
    Init(#[from] ViewInitError),
    /// Backend execution failure.
    #[error(transparent)]
    Query(#[from] QueryExecutionError),
}

impl ViewError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            ViewError::Init(err) => err.code(),
            ViewError::Query(err) => err.code(),
        }
    }
}
