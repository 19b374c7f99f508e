//! Services shared by every execution, and the entry points built on them.

use std::sync::Arc;

use serde::Serialize;

use crate::argument::ResolvedArgument;
use crate::config::EngineConfig;
use crate::context::RequestContext;
use crate::error::Result;
use crate::metadata::MetadataCache;
use crate::plugin::PluginRegistry;
use crate::query::{CompiledQuery, QueryBackend};
use crate::render::AccessChecker;
use crate::view::analyze::{analyze, Diagnostic};
use crate::view::definition::View;
use crate::view::executable::{RenderedView, ViewExecutable, ViewStatus};
use crate::view::pager::PagerState;

/// Registry, metadata, backend and access checker handed to each execution.
/// Cloning is cheap; every service sits behind an `Arc`.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<PluginRegistry>,
    metadata: Arc<MetadataCache>,
    backend: Arc<dyn QueryBackend>,
    access: Option<Arc<dyn AccessChecker>>,
    config: EngineConfig,
}

/// What an execution would run, without running it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Explain {
    /// `Ok`, or the status the execution would end with early.
    pub status: ViewStatus,
    /// Compiled query.
    pub query: Option<CompiledQuery>,
    /// Readable rendering of the query.
    pub sql: Option<String>,
    /// Resolved arguments.
    pub arguments: Vec<ResolvedArgument>,
    /// Pager window.
    pub pager: Option<PagerState>,
}

impl Engine {
    /// Bundles the services with default configuration and no field access
    /// checks.
    pub fn new(
        registry: Arc<PluginRegistry>,
        metadata: Arc<MetadataCache>,
        backend: Arc<dyn QueryBackend>,
    ) -> Self {
        Self {
            registry,
            metadata,
            backend,
            access: None,
            config: EngineConfig::default(),
        }
    }

    /// Sets the field access checker.
    pub fn with_access(mut self, access: Arc<dyn AccessChecker>) -> Self {
        self.access = Some(access);
        self
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Plugin registry.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Metadata cache.
    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    /// Backend.
    pub fn backend(&self) -> &dyn QueryBackend {
        self.backend.as_ref()
    }

    /// Field access checker, if any.
    pub fn access(&self) -> Option<&dyn AccessChecker> {
        self.access.as_deref()
    }

    /// Configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Executes `display_id` of `view` for `ctx`.
    pub fn run(&self, view: &View, display_id: &str, ctx: &RequestContext) -> Result<RenderedView> {
        ViewExecutable::run(self, view, display_id, ctx)
    }

    /// Initializes and builds without executing the main query. A full pager
    /// still asks the backend for a row count.
    pub fn explain(&self, view: &View, display_id: &str, ctx: &RequestContext) -> Result<Explain> {
        let mut executable = ViewExecutable::new(self, view, display_id, ctx);
        executable.initialize()?;
        if !executable.is_terminated() {
            executable.build()?;
        }
        let query = executable.query().cloned();
        Ok(Explain {
            status: executable.terminal_status().unwrap_or(ViewStatus::Ok),
            sql: query.as_ref().map(CompiledQuery::to_sql),
            query,
            arguments: executable.arguments().to_vec(),
            pager: executable.pager().cloned(),
        })
    }

    /// Static checks of every display of `view`.
    pub fn analyze(&self, view: &View) -> Vec<Diagnostic> {
        analyze(view, &self.registry, &self.metadata)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("metadata", &self.metadata)
            .field("access", &self.access.is_some())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{FieldMetadata, FieldType, StaticSchema};
    use crate::query::InMemoryBackend;
    use crate::types::{HandlerType, Row, Value};
    use crate::view::definition::{Display, HandlerConfig};

    fn engine(backend: Arc<InMemoryBackend>) -> Engine {
        let schema = StaticSchema::new()
            .with_field(FieldMetadata::new("articles", "id", FieldType::Integer))
            .with_field(FieldMetadata::new("articles", "title", FieldType::String));
        Engine::new(
            Arc::new(PluginRegistry::with_builtins()),
            Arc::new(MetadataCache::with_describer(schema)),
            backend,
        )
    }

    fn articles() -> Vec<Row> {
        (1..=3)
            .map(|id| {
                let mut row = Row::new();
                row.insert("id".into(), Value::Int(id));
                row.insert("title".into(), Value::from(format!("Article {id}")));
                row
            })
            .collect()
    }

    #[test]
    fn explain_builds_without_executing() {
        let backend = Arc::new(InMemoryBackend::new().with_table("articles", articles()));
        let engine = engine(backend.clone());
        let view = View::new("articles", "articles").with_display(
            Display::new("page_1", "page")
                .with_option("path", "articles")
                .with_handler(HandlerConfig::new(HandlerType::Field, "standard", "articles.title"))
                .with_handler(HandlerConfig::new(
                    HandlerType::Argument,
                    "numeric",
                    "articles.id",
                )),
        );
        let explain = engine
            .explain(&view, "page_1", &RequestContext::from_path("articles/2"))
            .expect("explain");
        assert_eq!(explain.status, ViewStatus::Ok);
        assert_eq!(
            explain.sql.as_deref(),
            Some("SELECT articles.title FROM articles WHERE articles.id = 2")
        );
        assert_eq!(explain.arguments.len(), 1);
        assert_eq!(backend.executions(), 0);

        let rendered = engine
            .run(&view, "page_1", &RequestContext::from_path("articles/2"))
            .expect("run");
        assert_eq!(rendered.rows, 1);
        assert_eq!(rendered.plan_hash, explain.query.map(|q| q.plan_hash));
    }
}
