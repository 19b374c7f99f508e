#![forbid(unsafe_code)]

//! Views, displays and the per-request executable that runs them.
//!
//! A [`View`] is a named set of [`Display`]s over a base table. Executing a
//! display creates a [`ViewExecutable`] that walks a linear lifecycle:
//! handlers are instantiated and validated, arguments are resolved and every
//! handler contributes to one compiled query, the backend runs it once, and
//! the rows are rendered into a [`crate::render::RenderNode`] tree.
//!
//! ```
//! use std::sync::Arc;
//!
//! use viewkit::metadata::{FieldMetadata, FieldType, MetadataCache, StaticSchema};
//! use viewkit::plugin::PluginRegistry;
//! use viewkit::query::InMemoryBackend;
//! use viewkit::types::{HandlerType, Row, Value};
//! use viewkit::view::{Display, Engine, HandlerConfig, View, ViewStatus};
//! use viewkit::RequestContext;
//!
//! let schema = StaticSchema::new()
//!     .with_field(FieldMetadata::new("articles", "title", FieldType::String));
//! let mut row = Row::new();
//! row.insert("title".into(), Value::from("Hello"));
//! let engine = Engine::new(
//!     Arc::new(PluginRegistry::with_builtins()),
//!     Arc::new(MetadataCache::with_describer(schema)),
//!     Arc::new(InMemoryBackend::new().with_table("articles", vec![row])),
//! );
//! let view = View::new("articles", "articles").with_display(
//!     Display::new("block_1", "block")
//!         .with_handler(HandlerConfig::new(HandlerType::Field, "standard", "articles.title")),
//! );
//! let rendered = engine
//!     .run(&view, "block_1", &RequestContext::default())
//!     .expect("run");
//! assert_eq!(rendered.status, ViewStatus::Ok);
//! assert!(rendered.html().contains("Hello"));
//! ```

/// Static checks over definitions.
pub mod analyze;
/// Declarative view, display and handler configuration.
pub mod definition;
/// Shared services and entry points.
pub mod engine;
/// Per-request lifecycle.
pub mod executable;
/// Pager configuration and state.
pub mod pager;

pub use analyze::{analyze, Diagnostic, Severity};
pub use definition::{AccessConfig, Display, FilterGroups, HandlerConfig, View};
pub use engine::{Engine, Explain};
pub use executable::{ExecutionState, RenderedView, ViewExecutable, ViewStatus};
pub use pager::{PagerConfig, PagerKind, PagerState};
