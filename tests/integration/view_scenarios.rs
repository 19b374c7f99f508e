#![allow(missing_docs)]

use std::sync::Arc;

use viewkit::{
    handler::ArgumentValue,
    metadata::{FieldMetadata, FieldType, JoinPath, MetadataCache, StaticSchema},
    plugin::PluginRegistry,
    query::InMemoryBackend,
    render::FieldPermissions,
    types::{HandlerType, Row, Value},
    view::{Display, HandlerConfig, PagerConfig, PagerKind, View},
    Engine, RequestContext, UserContext, ViewStatus,
};

fn schema() -> StaticSchema {
    StaticSchema::new()
        .with_field(FieldMetadata::new("articles", "id", FieldType::Integer))
        .with_field(FieldMetadata::new("articles", "title", FieldType::String).with_title("Title"))
        .with_field(FieldMetadata::new("articles", "created", FieldType::Timestamp))
        .with_field(
            FieldMetadata::new("articles", "uid", FieldType::Integer)
                .with_relationship(JoinPath::new("users", "uid")),
        )
        .with_field(FieldMetadata::new("users", "uid", FieldType::Integer))
        .with_field(FieldMetadata::new("users", "name", FieldType::String))
}

fn article(id: i64, title: &str, created: i64, uid: i64) -> Row {
    let mut row = Row::new();
    row.insert("id".into(), Value::Int(id));
    row.insert("title".into(), Value::from(title));
    row.insert("created".into(), Value::Int(created));
    row.insert("uid".into(), Value::Int(uid));
    row
}

fn user(uid: i64, name: &str) -> Row {
    let mut row = Row::new();
    row.insert("uid".into(), Value::Int(uid));
    row.insert("name".into(), Value::from(name));
    row
}

fn backend() -> Arc<InMemoryBackend> {
    Arc::new(
        InMemoryBackend::new()
            .with_table(
                "articles",
                vec![
                    article(7, "Seven", 300, 1),
                    article(42, "<Tom> says hi", 100, 2),
                    article(99, "Ninety-nine", 100, 1),
                ],
            )
            .with_table("users", vec![user(1, "ada"), user(2, "grace")]),
    )
}

fn engine(backend: Arc<InMemoryBackend>) -> Engine {
    Engine::new(
        Arc::new(PluginRegistry::with_builtins()),
        Arc::new(MetadataCache::with_describer(schema())),
        backend,
    )
}

fn article_page() -> View {
    View::new("articles", "articles").with_display(
        Display::new("page_1", "page")
            .with_option("path", "articles")
            .with_handler(HandlerConfig::new(HandlerType::Argument, "numeric", "articles.id"))
            .with_handler(HandlerConfig::new(HandlerType::Style, "list", ""))
            .with_handler(
                HandlerConfig::new(HandlerType::Field, "label", "articles.title")
                    .with_option("link", true),
            ),
    )
}

#[test]
fn article_by_id_renders_one_linked_title() {
    let backend = backend();
    let engine = engine(backend.clone());
    let view = article_page();
    let ctx = RequestContext::from_path("articles/42");

    let rendered = engine.run(&view, "page_1", &ctx).expect("run");

    assert_eq!(rendered.status, ViewStatus::Ok);
    assert_eq!(rendered.arguments.len(), 1);
    assert_eq!(rendered.arguments[0].value, ArgumentValue::One(Value::Int(42)));
    assert_eq!(rendered.rows, 1);

    let query = backend.last_query().expect("query ran");
    assert!(query.to_sql().ends_with("WHERE articles.id = 42"));

    let html = rendered.html();
    assert_eq!(html.matches("<li>").count(), 1);
    assert!(html.contains("<ul class=\"views-list\">"));
    assert!(html.contains("<a href=\"/articles/42\">&lt;Tom&gt; says hi</a>"));
    assert!(!html.contains("<Tom>"));
}

#[test]
fn standard_title_with_link_renders_a_link_wrapper() {
    let backend = backend();
    let engine = engine(backend.clone());
    let view = View::new("articles", "articles").with_display(
        Display::new("page_1", "page")
            .with_option("path", "articles")
            .with_handler(HandlerConfig::new(HandlerType::Argument, "numeric", "articles.id"))
            .with_handler(
                HandlerConfig::new(HandlerType::Field, "standard", "articles.title")
                    .with_option("link", true),
            ),
    );

    let rendered = engine
        .run(&view, "page_1", &RequestContext::from_path("articles/42"))
        .expect("run");

    assert_eq!(rendered.rows, 1);
    let query = backend.last_query().expect("query ran");
    assert!(query.to_sql().starts_with("SELECT articles.title, articles.id FROM articles"));
    let html = rendered.html();
    assert!(html.contains("<a href=\"/articles/42\">&lt;Tom&gt; says hi</a>"), "{html}");
    assert!(!html.contains("<Tom>"));
}

#[test]
fn unknown_base_table_is_fatal_before_any_query() {
    let backend = backend();
    let engine = engine(backend.clone());
    let view = View::new("ghost", "ghost_table").with_display(
        Display::new("page_1", "page")
            .with_handler(HandlerConfig::new(HandlerType::Field, "standard", "ghost_table.x")),
    );

    let err = engine
        .run(&view, "page_1", &RequestContext::default())
        .expect_err("ghost table");

    assert_eq!(err.code(), "UnknownBaseTable");
    assert_eq!(backend.executions(), 0);
}

#[test]
fn sorts_follow_weight_not_declaration_order() {
    let backend = backend();
    let engine = engine(backend.clone());
    let view = View::new("articles", "articles").with_display(
        Display::new("block_1", "block")
            .with_handler(HandlerConfig::new(HandlerType::Field, "standard", "articles.title"))
            .with_handler(
                HandlerConfig::new(HandlerType::Sort, "standard", "articles.created")
                    .with_weight(5),
            )
            .with_handler(
                HandlerConfig::new(HandlerType::Sort, "standard", "articles.title").with_weight(1),
            ),
    );

    let explain = engine
        .explain(&view, "block_1", &RequestContext::default())
        .expect("explain");

    let sql = explain.sql.expect("sql");
    assert!(sql.ends_with("ORDER BY articles.title ASC, articles.created ASC"), "{sql}");
}

#[test]
fn repeated_executions_compile_identical_queries() {
    let engine = engine(backend());
    let view = View::new("articles", "articles").with_display(
        Display::new("page_1", "default")
            .with_handler(
                HandlerConfig::new(HandlerType::Relationship, "standard", "articles.uid")
                    .with_id("author"),
            )
            .with_handler(HandlerConfig::new(HandlerType::Field, "standard", "articles.title"))
            .with_handler(
                HandlerConfig::new(HandlerType::Field, "standard", "users.name")
                    .with_relationship("author"),
            )
            .with_handler(
                HandlerConfig::new(HandlerType::Filter, "numeric", "articles.created")
                    .with_option("operator", ">=")
                    .with_option("value", 100i64),
            )
            .with_handler(HandlerConfig::new(HandlerType::Sort, "standard", "articles.id")),
    );
    let ctx = RequestContext::default();

    let first = engine.explain(&view, "page_1", &ctx).expect("first");
    let second = engine.explain(&view, "page_1", &ctx).expect("second");

    assert_eq!(first.query, second.query);
    assert_eq!(first.sql, second.sql);
}

#[test]
fn unknown_plugins_fall_back_without_failing() {
    let engine = engine(backend());
    let view = View::new("articles", "articles").with_display(
        Display::new("block_1", "block")
            .with_handler(HandlerConfig::new(HandlerType::Field, "sparkle", "articles.title"))
            .with_handler(HandlerConfig::new(HandlerType::Field, "standard", "articles.id")),
    );

    let rendered = engine
        .run(&view, "block_1", &RequestContext::default())
        .expect("run");

    assert_eq!(rendered.status, ViewStatus::Ok);
    assert_eq!(rendered.rows, 3);
    let html = rendered.html();
    assert!(html.contains(">42<"));
    assert!(!html.contains("Seven"));
}

#[test]
fn field_access_hides_restricted_columns() {
    let permissions = FieldPermissions::new().require("articles.title", "view titles");
    let engine = engine(backend()).with_access(Arc::new(permissions));
    let view = View::new("articles", "articles").with_display(
        Display::new("block_1", "block")
            .with_handler(HandlerConfig::new(HandlerType::Field, "standard", "articles.title")),
    );

    let anonymous = engine
        .run(&view, "block_1", &RequestContext::default())
        .expect("anonymous");
    assert!(!anonymous.html().contains("Seven"));

    let editor = RequestContext::default()
        .with_user(UserContext::new(3).with_permission("view titles"));
    let allowed = engine.run(&view, "block_1", &editor).expect("editor");
    assert!(allowed.html().contains("Seven"));
}

#[test]
fn default_argument_comes_from_the_current_user() {
    let engine = engine(backend());
    let view: View = toml::from_str(
        r#"
        id = "mine"
        base_table = "articles"

        [displays.page_1]
        plugin = "page"
        options = { path = "mine", title = "Posts by user %1" }

        [[displays.page_1.handlers]]
        type = "argument"
        plugin = "numeric"
        field = "articles.uid"
        options = { failure = "not_found", defaults = [{ type = "provider", id = "current_user" }] }

        [[displays.page_1.handlers]]
        type = "field"
        plugin = "standard"
        field = "articles.title"

        [[displays.page_1.handlers]]
        type = "sort"
        plugin = "standard"
        field = "articles.id"
        "#,
    )
    .expect("view parses");
    let view = view.normalize();

    let ada = RequestContext::from_path("mine").with_user(UserContext::new(1));
    let rendered = engine.run(&view, "page_1", &ada).expect("run");
    assert_eq!(rendered.rows, 2);
    assert_eq!(rendered.title.as_deref(), Some("Posts by user 1"));

    let anonymous = RequestContext::from_path("mine");
    let missing = engine.run(&view, "page_1", &anonymous).expect("run");
    assert_eq!(missing.status, ViewStatus::NotFound);
    assert!(missing.node.is_empty());
}

#[test]
fn wildcard_exception_matches_everything() {
    let engine = engine(backend());
    let rendered = engine
        .run(&article_page(), "page_1", &RequestContext::from_path("articles/all"))
        .expect("run");
    assert_eq!(rendered.rows, 3);
    assert!(rendered.arguments[0].value.is_all());
}

#[test]
fn mini_pager_detects_a_next_page() {
    let engine = engine(backend());
    let view = View::new("articles", "articles").with_display(
        Display::new("page_1", "default")
            .with_pager(PagerConfig::new(PagerKind::Mini, 2))
            .with_handler(HandlerConfig::new(HandlerType::Field, "standard", "articles.title"))
            .with_handler(HandlerConfig::new(HandlerType::Sort, "standard", "articles.id")),
    );

    let first = engine
        .run(&view, "page_1", &RequestContext::default())
        .expect("first page");
    assert_eq!(first.rows, 2);
    assert!(first.pager.as_ref().expect("pager").has_next);
    assert!(first.html().contains("?page=1"));

    let second = engine
        .run(&view, "page_1", &RequestContext::default().with_query("page", "1"))
        .expect("second page");
    assert_eq!(second.rows, 1);
    assert!(!second.pager.expect("pager").has_next);
}

#[test]
fn backend_failures_surface_unchanged() {
    let backend = Arc::new(InMemoryBackend::new());
    let engine = engine(backend);
    let err = engine
        .run(&article_page(), "page_1", &RequestContext::from_path("articles/7"))
        .expect_err("no table in backend");
    assert_eq!(err.code(), "MissingTable");
}
