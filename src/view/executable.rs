//! One execution of one display: initialize, build, execute, render.

use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::argument::{substitute_tokens, ArgumentResolver, ArgumentSlot, ResolvedArgument};
use crate::context::RequestContext;
use crate::error::{ArgumentFailure, Result, ViewError, ViewInitError};
use crate::handler::options::{merge_defaults, OptionsExt};
use crate::handler::{
    BrokenHandler, DisplayHandler, DisplayParts, HandlerBinding, HandlerInstance, RowHandler,
    StyleHandler,
};
use crate::metadata::{FieldMetadata, MetadataSnapshot};
use crate::query::{CompiledQuery, QueryBuilder};
use crate::render::{FieldSlot, RenderNode, Renderer};
use crate::types::{split_field_key, HandlerType, Options, Row, Value};
use crate::view::definition::{Display, FilterGroups, HandlerConfig, View};
use crate::view::engine::Engine;
use crate::view::pager::PagerState;

/// Lifecycle position of an executable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Nothing done yet.
    Created,
    /// Handlers instantiated and validated.
    Initialized,
    /// Arguments resolved and the query compiled.
    Built,
    /// Rows fetched.
    Executed,
    /// Output produced.
    Rendered,
    /// Ended early or failed; nothing further runs.
    Terminal,
}

impl ExecutionState {
    /// Lowercase name used in errors and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Created => "created",
            ExecutionState::Initialized => "initialized",
            ExecutionState::Built => "built",
            ExecutionState::Executed => "executed",
            ExecutionState::Rendered => "rendered",
            ExecutionState::Terminal => "terminal",
        }
    }
}

/// How an execution ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    /// Rendered normally, possibly without rows.
    Ok,
    /// An argument asked to render nothing.
    Empty,
    /// An argument asked for a not-found response.
    NotFound,
    /// The display's access rule denied the request.
    AccessDenied,
}

/// Output of an execution.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderedView {
    /// Outcome.
    pub status: ViewStatus,
    /// Title after token substitution, unescaped.
    pub title: Option<String>,
    /// Output tree; empty unless the status is `Ok`.
    pub node: RenderNode,
    /// Resolved arguments in declared order.
    pub arguments: Vec<ResolvedArgument>,
    /// Pager state, when a query was built.
    pub pager: Option<PagerState>,
    /// Hash of the executed query.
    pub plan_hash: Option<u64>,
    /// Rows rendered.
    pub rows: usize,
}

impl RenderedView {
    fn terminated(status: ViewStatus, arguments: Vec<ResolvedArgument>) -> Self {
        Self {
            status,
            title: None,
            node: RenderNode::Empty,
            arguments,
            pager: None,
            plan_hash: None,
            rows: 0,
        }
    }

    /// Serialized output tree.
    pub fn html(&self) -> String {
        self.node.to_html()
    }
}

/// A handler bound to its configured slot.
#[derive(Debug)]
struct Bound {
    binding: HandlerBinding,
    instance: HandlerInstance,
}

/// Handlers of the selected display after initialization.
struct Prepared<'a> {
    display: &'a Display,
    base_table: String,
    display_handler: Bound,
    style: Bound,
    row: Bound,
    arguments: Vec<Bound>,
    relationships: Vec<Bound>,
    filters: Vec<Bound>,
    sorts: Vec<Bound>,
    fields: Vec<Bound>,
}

enum BuildOutcome {
    Terminated(ViewStatus, Vec<ResolvedArgument>),
    Built {
        arguments: Vec<ResolvedArgument>,
        pager: PagerState,
        query: CompiledQuery,
    },
}

/// Runtime instance binding a view definition to one request. Created per
/// execution and never shared.
pub struct ViewExecutable<'a> {
    engine: &'a Engine,
    view: &'a View,
    display_id: String,
    ctx: &'a RequestContext,
    state: ExecutionState,
    prepared: Option<Prepared<'a>>,
    arguments: Vec<ResolvedArgument>,
    pager: Option<PagerState>,
    query: Option<CompiledQuery>,
    rows: Vec<Row>,
    outcome: Option<RenderedView>,
}

impl<'a> ViewExecutable<'a> {
    /// Creates an executable for `display_id` of `view`.
    pub fn new(
        engine: &'a Engine,
        view: &'a View,
        display_id: impl Into<String>,
        ctx: &'a RequestContext,
    ) -> Self {
        Self {
            engine,
            view,
            display_id: display_id.into(),
            ctx,
            state: ExecutionState::Created,
            prepared: None,
            arguments: Vec::new(),
            pager: None,
            query: None,
            rows: Vec::new(),
            outcome: None,
        }
    }

    /// Runs every lifecycle step.
    pub fn run(
        engine: &'a Engine,
        view: &'a View,
        display_id: &str,
        ctx: &'a RequestContext,
    ) -> Result<RenderedView> {
        let mut executable = Self::new(engine, view, display_id, ctx);
        executable.initialize()?;
        if !executable.is_terminated() {
            executable.build()?;
        }
        if !executable.is_terminated() {
            executable.execute()?;
        }
        Ok(executable.render()?)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Whether the execution ended early.
    pub fn is_terminated(&self) -> bool {
        self.state == ExecutionState::Terminal
    }

    /// Resolved arguments; empty before `build`.
    pub fn arguments(&self) -> &[ResolvedArgument] {
        &self.arguments
    }

    /// Compiled query, once built.
    pub fn query(&self) -> Option<&CompiledQuery> {
        self.query.as_ref()
    }

    /// Pager state, once built.
    pub fn pager(&self) -> Option<&PagerState> {
        self.pager.as_ref()
    }

    /// Fetched rows, once executed.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Status an early termination ended with.
    pub fn terminal_status(&self) -> Option<ViewStatus> {
        self.outcome.as_ref().map(|outcome| outcome.status)
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[ExecutionState],
    ) -> std::result::Result<(), ViewInitError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ViewInitError::Lifecycle {
                operation,
                state: self.state.as_str(),
            })
        }
    }

    fn prepared(
        &self,
        operation: &'static str,
    ) -> std::result::Result<&Prepared<'a>, ViewInitError> {
        self.prepared.as_ref().ok_or(ViewInitError::Lifecycle {
            operation,
            state: self.state.as_str(),
        })
    }

    fn terminate(&mut self, status: ViewStatus) {
        info!(
            view = %self.view.id,
            display = %self.display_id,
            status = ?status,
            "view.terminate"
        );
        let arguments = self.arguments.clone();
        self.outcome = Some(RenderedView::terminated(status, arguments));
        self.state = ExecutionState::Terminal;
    }

    /// Selects the display, checks its base table and access rule, and
    /// instantiates and validates every handler.
    pub fn initialize(&mut self) -> std::result::Result<(), ViewInitError> {
        self.expect_state("initialize", &[ExecutionState::Created])?;
        let view = self.view;
        let display = view
            .display(&self.display_id)
            .ok_or_else(|| ViewInitError::UnknownDisplay {
                view: view.id.clone(),
                display: self.display_id.clone(),
            })?;
        let base_table = view.base_table_of(display).to_owned();
        let snapshot = self.engine.metadata().snapshot();
        if !snapshot.has_table(&base_table) {
            return Err(ViewInitError::UnknownBaseTable {
                display: display.id.clone(),
                table: base_table,
            });
        }
        if !display.access.allows(self.ctx) {
            self.terminate(ViewStatus::AccessDenied);
            return Ok(());
        }

        let binder = Binder {
            engine: self.engine,
            snapshot: &snapshot,
            ctx: self.ctx,
            base_table: &base_table,
        };
        let prepared = binder.prepare(display)?;
        info!(
            view = %view.id,
            display = %self.display_id,
            base_table = %prepared.base_table,
            fields = prepared.fields.len(),
            filters = prepared.filters.len(),
            arguments = prepared.arguments.len(),
            epoch = snapshot.epoch(),
            "view.init"
        );
        self.prepared = Some(prepared);
        self.state = ExecutionState::Initialized;
        Ok(())
    }

    /// Resolves arguments, collects every handler's contribution and
    /// compiles the query. Repeating it while built returns the same query;
    /// `None` means the execution ended during argument resolution.
    pub fn build(&mut self) -> Result<Option<&CompiledQuery>> {
        if self.state == ExecutionState::Built {
            return Ok(self.query.as_ref());
        }
        self.expect_state("build", &[ExecutionState::Initialized])?;
        match self.compile()? {
            BuildOutcome::Terminated(status, arguments) => {
                self.arguments = arguments;
                self.terminate(status);
                Ok(None)
            }
            BuildOutcome::Built {
                arguments,
                pager,
                query,
            } => {
                info!(
                    view = %self.view.id,
                    display = %self.display_id,
                    plan_hash = query.plan_hash,
                    joins = query.joins.len(),
                    sorts = query.sorts.len(),
                    "view.build"
                );
                debug!(sql = %query.to_sql(), "view.build.sql");
                self.arguments = arguments;
                self.pager = Some(pager);
                self.query = Some(query);
                self.state = ExecutionState::Built;
                Ok(self.query.as_ref())
            }
        }
    }

    fn compile(&self) -> Result<BuildOutcome> {
        let prepared = self.prepared("build")?;
        let display = prepared.display;
        let slots: Vec<ArgumentSlot<'_>> = prepared
            .arguments
            .iter()
            .filter_map(|bound| {
                bound.instance.as_argument().map(|handler| ArgumentSlot {
                    binding: &bound.binding,
                    handler,
                })
            })
            .collect();
        let resolver = ArgumentResolver::new(
            self.engine.registry(),
            self.ctx,
            display.path_prefix_len(),
        );
        let arguments = match resolver.resolve(&slots) {
            Ok(arguments) => arguments,
            Err(err) => {
                let status = match err.failure {
                    ArgumentFailure::RenderNothing => ViewStatus::Empty,
                    ArgumentFailure::NotFound => ViewStatus::NotFound,
                };
                warn!(error = %err, "argument.failed");
                return Ok(BuildOutcome::Terminated(status, Vec::new()));
            }
        };

        let mut builder = QueryBuilder::new(prepared.base_table.as_str());
        for bound in &prepared.relationships {
            if let Some(relationship) = bound.instance.as_relationship() {
                relationship.join(&bound.binding, &mut builder);
            }
        }
        for bound in &prepared.fields {
            bound.instance.query(&bound.binding, &mut builder);
        }
        for (bound, argument) in prepared.arguments.iter().zip(&arguments) {
            if let Some(handler) = bound.instance.as_argument() {
                handler.contribute(&bound.binding, &argument.value, &mut builder);
            }
        }
        for bound in &prepared.filters {
            bound.instance.query(&bound.binding, &mut builder);
        }
        FilterGroups::from_options(&display.options).apply(&mut builder);
        for bound in &prepared.sorts {
            bound.instance.query(&bound.binding, &mut builder);
        }

        let config = self.engine.config();
        let items = config.clamp_items(display.pager.items_per_page);
        let requested = self
            .ctx
            .query
            .get(&config.page_param)
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(0);
        let total = if display.pager.needs_count() && items > 0 {
            Some(self.engine.backend().count(&builder.compile())?)
        } else {
            None
        };
        let pager = PagerState::compute(&display.pager, items, requested, total);
        if pager.limit.is_some() || pager.offset > 0 {
            builder.set_range(pager.offset, pager.limit);
        }
        Ok(BuildOutcome::Built {
            arguments,
            pager,
            query: builder.compile(),
        })
    }

    /// Runs the compiled query. A backend failure is surfaced as is and ends
    /// the execution.
    pub fn execute(&mut self) -> Result<&[Row]> {
        self.expect_state("execute", &[ExecutionState::Built])?;
        let Some(query) = self.query.as_ref() else {
            return Err(ViewInitError::Lifecycle {
                operation: "execute",
                state: self.state.as_str(),
            }
            .into());
        };
        let started = Instant::now();
        let mut rows = match self.engine.backend().execute(query) {
            Ok(rows) => rows,
            Err(err) => {
                warn!(
                    view = %self.view.id,
                    display = %self.display_id,
                    error = %err,
                    "view.execute.failed"
                );
                self.state = ExecutionState::Terminal;
                return Err(ViewError::Query(err));
            }
        };
        if let Some(pager) = self.pager.as_mut() {
            let keep = pager.settle(rows.len());
            rows.truncate(keep);
        }
        info!(
            view = %self.view.id,
            display = %self.display_id,
            rows = rows.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "view.execute"
        );
        self.rows = rows;
        self.state = ExecutionState::Executed;
        Ok(&self.rows)
    }

    /// Produces the output tree, or the empty outcome of an early
    /// termination.
    pub fn render(&mut self) -> std::result::Result<RenderedView, ViewInitError> {
        if self.state == ExecutionState::Terminal {
            if let Some(outcome) = self.outcome.take() {
                return Ok(outcome);
            }
        }
        self.expect_state("render", &[ExecutionState::Executed])?;
        let prepared = self.prepared("render")?;
        let display = prepared.display;

        let fields: Vec<FieldSlot<'_>> = prepared
            .fields
            .iter()
            .filter_map(|bound| {
                bound.instance.as_field().map(|handler| FieldSlot {
                    binding: &bound.binding,
                    handler,
                })
            })
            .collect();
        let renderer = Renderer::new(self.ctx, self.engine.access());
        let style: &dyn StyleHandler =
            prepared.style.instance.as_style().unwrap_or(&BrokenHandler);
        let row: &dyn RowHandler = prepared.row.instance.as_row().unwrap_or(&BrokenHandler);
        let body = if self.rows.is_empty() {
            match display.options.str_opt("empty_text") {
                Some(text) => RenderNode::element("div", vec![RenderNode::text(text)])
                    .with_class("view-empty"),
                None => RenderNode::Empty,
            }
        } else {
            renderer.render_rows(
                &fields,
                (&prepared.row.binding, row),
                (&prepared.style.binding, style),
                &self.rows,
            )
        };

        let display_handler: &dyn DisplayHandler = prepared
            .display_handler
            .instance
            .as_display()
            .unwrap_or(&BrokenHandler);
        let pager = match &self.pager {
            Some(pager) if display_handler.renders_pager() => {
                pager.render(&self.engine.config().page_param)
            }
            _ => RenderNode::Empty,
        };
        let title = self.title(prepared);
        let node = display_handler.render(
            &prepared.display_handler.binding,
            DisplayParts {
                view: self.view.id.clone(),
                display: display.id.clone(),
                title: title.clone(),
                body,
                pager,
            },
        );
        info!(
            view = %self.view.id,
            display = %self.display_id,
            rows = self.rows.len(),
            "view.render"
        );
        let rendered = RenderedView {
            status: ViewStatus::Ok,
            title,
            node,
            arguments: self.arguments.clone(),
            pager: self.pager.clone(),
            plan_hash: self.query.as_ref().map(|query| query.plan_hash),
            rows: self.rows.len(),
        };
        self.state = ExecutionState::Rendered;
        Ok(rendered)
    }

    /// The last non-wildcard argument with its own `title` wins; otherwise
    /// the display title with argument tokens substituted.
    fn title(&self, prepared: &Prepared<'_>) -> Option<String> {
        let from_argument = prepared
            .arguments
            .iter()
            .zip(&self.arguments)
            .rev()
            .find(|(bound, argument)| {
                bound.binding.options.contains_key("title") && !argument.value.is_all()
            })
            .map(|(_, argument)| argument.title.clone());
        from_argument.or_else(|| {
            prepared
                .display
                .options
                .str_opt("title")
                .map(|template| substitute_tokens(template, &self.arguments))
        })
    }
}

/// Instantiates and validates the handlers of one display.
struct Binder<'s> {
    engine: &'s Engine,
    snapshot: &'s Arc<MetadataSnapshot>,
    ctx: &'s RequestContext,
    base_table: &'s str,
}

/// Alias a relationship id resolves to; `None` when its join could not be
/// made.
type RelationshipAliases = FxHashMap<String, Option<String>>;

impl<'s> Binder<'s> {
    fn prepare<'a>(
        &self,
        display: &'a Display,
    ) -> std::result::Result<Prepared<'a>, ViewInitError> {
        let display_config = HandlerConfig {
            id: Some(display.id.clone()),
            options: display.options.clone(),
            ..HandlerConfig::new(HandlerType::Display, display.plugin.clone(), "")
        };
        let display_handler = self.bind_layout(&display_config)?;
        let config = self.engine.config();
        let style = match display.handlers_of(HandlerType::Style).first() {
            Some(style) => self.bind_layout(style)?,
            None => self.bind_layout(&HandlerConfig::new(
                HandlerType::Style,
                config.default_style.clone(),
                "",
            ))?,
        };
        let row = match display.handlers_of(HandlerType::Row).first() {
            Some(row) => self.bind_layout(row)?,
            None => self.bind_layout(&HandlerConfig::new(
                HandlerType::Row,
                config.default_row.clone(),
                "",
            ))?,
        };

        let mut aliases = RelationshipAliases::default();
        let relationships = self.bind_relationships(display, &mut aliases)?;
        let bind_all = |ty: HandlerType| -> std::result::Result<Vec<Bound>, ViewInitError> {
            display
                .handlers_of(ty)
                .into_iter()
                .enumerate()
                .map(|(position, config)| self.bind_data(config, position, &aliases))
                .collect()
        };
        let arguments = bind_all(HandlerType::Argument)?;
        let fields = bind_all(HandlerType::Field)?;
        let sorts = bind_all(HandlerType::Sort)?;
        let filters = bind_all(HandlerType::Filter)?;

        Ok(Prepared {
            display,
            base_table: self.base_table.to_owned(),
            display_handler,
            style,
            row,
            arguments,
            relationships,
            filters,
            sorts,
            fields,
        })
    }

    fn bind_relationships(
        &self,
        display: &Display,
        aliases: &mut RelationshipAliases,
    ) -> std::result::Result<Vec<Bound>, ViewInitError> {
        let mut scratch = QueryBuilder::new(self.base_table);
        let mut bound_all = Vec::new();
        let configs = display.handlers_of(HandlerType::Relationship);
        for (position, config) in configs.into_iter().enumerate() {
            let id = config.handler_id();
            self.check_join_path(config)?;
            let bound = self.bind_data(config, position, aliases)?;
            let alias = if bound.instance.is_broken() {
                None
            } else {
                bound
                    .instance
                    .as_relationship()
                    .and_then(|relationship| relationship.join(&bound.binding, &mut scratch))
            };
            if alias.is_none() {
                warn!(relationship = %id, "view.relationship.unresolved");
            }
            aliases.insert(id, alias);
            bound_all.push(bound);
        }
        Ok(bound_all)
    }

    /// A relationship's field must declare a join path to a known field.
    fn check_join_path(&self, config: &HandlerConfig) -> std::result::Result<(), ViewInitError> {
        let broken = |path: String| ViewInitError::BrokenRelationship {
            handler: config.handler_id(),
            path,
        };
        let path = split_field_key(&config.field)
            .and_then(|(table, field)| self.snapshot.field(table, field))
            .and_then(|meta| meta.relationship.as_ref())
            .ok_or_else(|| broken(config.field.clone()))?;
        if self.snapshot.field(&path.table, &path.field).is_none() {
            return Err(broken(format!(
                "{} -> {}.{}",
                config.field, path.table, path.field
            )));
        }
        Ok(())
    }

    /// Binds a display, style or row handler.
    fn bind_layout(&self, config: &HandlerConfig) -> std::result::Result<Bound, ViewInitError> {
        self.bind(
            config,
            0,
            BindTarget {
                table: self.base_table.to_owned(),
                field: String::new(),
                alias: self.base_table.to_owned(),
                meta: None,
            },
        )
    }

    /// Binds a handler that addresses a field, routing it through its
    /// relationship when it names one.
    fn bind_data(
        &self,
        config: &HandlerConfig,
        position: usize,
        aliases: &RelationshipAliases,
    ) -> std::result::Result<Bound, ViewInitError> {
        let (table, field) =
            split_field_key(&config.field).unwrap_or((self.base_table, config.field.as_str()));
        let alias = match &config.relationship {
            None => Some(table.to_owned()),
            Some(relationship) => aliases.get(relationship).cloned().ok_or_else(|| {
                ViewInitError::UnknownRelationship {
                    ty: config.ty,
                    field: config.field.clone(),
                    relationship: relationship.clone(),
                }
            })?,
        };
        let meta = self.snapshot.field(table, field).cloned();
        let target = BindTarget {
            table: table.to_owned(),
            field: field.to_owned(),
            alias: alias.clone().unwrap_or_else(|| table.to_owned()),
            meta,
        };
        let mut bound = self.bind(config, position, target)?;
        if alias.is_none() {
            warn!(
                ty = %config.ty,
                handler = %bound.binding.id,
                relationship = ?config.relationship,
                "view.handler.broken"
            );
            bound.instance = HandlerInstance::broken(config.ty);
        }
        Ok(bound)
    }

    fn bind(
        &self,
        config: &HandlerConfig,
        position: usize,
        target: BindTarget,
    ) -> std::result::Result<Bound, ViewInitError> {
        let plugin_id = if config.plugin.is_empty() {
            target
                .meta
                .as_ref()
                .and_then(|meta| meta.default_handler(config.ty))
                .unwrap_or_default()
                .to_owned()
        } else {
            config.plugin.clone()
        };
        let resolved = self.engine.registry().get_or_default(config.ty, &plugin_id);
        let mut merged = merge_defaults(&resolved.defaults, &config.options);
        if config.ty == HandlerType::Filter {
            self.apply_exposed_input(&mut merged);
        }
        let options = resolved.instance.validate_options(merged).map_err(|errors| {
            ViewInitError::InvalidOptions {
                ty: config.ty,
                plugin: plugin_id.clone(),
                errors,
            }
        })?;
        let binding = HandlerBinding {
            id: config.handler_id(),
            position,
            table: target.table,
            field: target.field,
            alias: target.alias,
            relationship: config.relationship.clone(),
            meta: target.meta,
            options,
        };
        debug!(
            ty = %config.ty,
            plugin = %resolved.instance.plugin_id(),
            handler = %binding.id,
            alias = %binding.alias,
            "view.handler.bind"
        );
        Ok(Bound {
            binding,
            instance: resolved.instance,
        })
    }

    /// Copies an exposed filter's query-string input into its `value`, ahead
    /// of option validation.
    fn apply_exposed_input(&self, options: &mut Options) {
        if !options.bool_opt("exposed", false) {
            return;
        }
        let Some(identifier) = options.str_opt("identifier").map(str::to_owned) else {
            return;
        };
        if let Some(input) = self.ctx.query.get(&identifier).filter(|raw| !raw.is_empty()) {
            options.insert("value".into(), Value::from(input.as_str()));
        }
    }
}

struct BindTarget {
    table: String,
    field: String,
    alias: String,
    meta: Option<Arc<FieldMetadata>>,
}
