//! viewkit: declarative, pluggable query-and-render views.
//!
//! A view names a base table and a set of displays; each display is built
//! from typed handlers (arguments, fields, filters, sorts, relationships,
//! display, style and row) resolved from a [`plugin::PluginRegistry`].
//! Executing a display compiles every handler's contribution into a single
//! backend query and renders the rows into an escaped output tree.

#![warn(missing_docs)]

pub mod argument;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod metadata;
pub mod plugin;
pub mod query;
pub mod render;
pub mod site;
pub mod types;
pub mod view;

pub use config::{ConfigError, EngineConfig};
pub use context::{RequestContext, UserContext};
pub use error::{
    ArgumentFailure, ArgumentResolutionError, PluginNotFoundError, QueryExecutionError,
    RegistryError, Result, ViewError, ViewInitError,
};
pub use site::{Site, SiteDefinition, SiteError};
pub use view::{Engine, RenderedView, View, ViewExecutable, ViewStatus};
