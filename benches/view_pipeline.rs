#![forbid(unsafe_code)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use viewkit::{
    metadata::{FieldMetadata, FieldType, JoinPath, MetadataCache, StaticSchema},
    plugin::PluginRegistry,
    query::InMemoryBackend,
    render::escape,
    types::{HandlerType, Row, Value},
    view::{Display, HandlerConfig, PagerConfig, PagerKind, View},
    Engine, RequestContext,
};

const ARTICLE_COUNT: i64 = 2_000;
const USER_COUNT: i64 = 50;

fn view_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("view/pipeline");
    group.sample_size(40);
    let harness = PipelineHarness::new();
    let listing = RequestContext::default().with_query("page", "3");
    let by_author = RequestContext::from_path("articles/7");

    group.throughput(Throughput::Elements(1));
    group.bench_function("explain_listing", |b| {
        b.iter(|| black_box(harness.engine.explain(&harness.view, "listing", &listing)));
    });

    group.throughput(Throughput::Elements(25));
    group.bench_function("run_listing_full_pager", |b| {
        b.iter(|| black_box(harness.engine.run(&harness.view, "listing", &listing)));
    });

    group.throughput(Throughput::Elements(ARTICLE_COUNT as u64 / USER_COUNT as u64));
    group.bench_function("run_by_author_with_join", |b| {
        b.iter(|| black_box(harness.engine.run(&harness.view, "by_author", &by_author)));
    });

    group.finish();
}

fn escaping(c: &mut Criterion) {
    let mut group = c.benchmark_group("view/escape");
    let text = "Fish & Chips <served> \"hot\" at O'Malley's ".repeat(64);
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("escape_mixed_text", |b| {
        b.iter(|| black_box(escape(black_box(&text))));
    });
    group.finish();
}

struct PipelineHarness {
    engine: Engine,
    view: View,
}

impl PipelineHarness {
    fn new() -> Self {
        let schema = StaticSchema::new()
            .with_field(FieldMetadata::new("articles", "id", FieldType::Integer))
            .with_field(FieldMetadata::new("articles", "title", FieldType::String))
            .with_field(FieldMetadata::new("articles", "created", FieldType::Timestamp))
            .with_field(
                FieldMetadata::new("articles", "uid", FieldType::Integer)
                    .with_relationship(JoinPath::new("users", "uid")),
            )
            .with_field(FieldMetadata::new("users", "uid", FieldType::Integer))
            .with_field(FieldMetadata::new("users", "name", FieldType::String));

        let articles: Vec<Row> = (1..=ARTICLE_COUNT)
            .map(|id| {
                let mut row = Row::new();
                row.insert("id".into(), Value::Int(id));
                row.insert("title".into(), Value::from(format!("Article <{id}> & more")));
                row.insert("created".into(), Value::Int(1_700_000_000 + id * 3_600));
                row.insert("uid".into(), Value::Int(id % USER_COUNT + 1));
                row
            })
            .collect();
        let users: Vec<Row> = (1..=USER_COUNT)
            .map(|uid| {
                let mut row = Row::new();
                row.insert("uid".into(), Value::Int(uid));
                row.insert("name".into(), Value::from(format!("user{uid}")));
                row
            })
            .collect();
        let backend = InMemoryBackend::new()
            .with_table("articles", articles)
            .with_table("users", users);

        let engine = Engine::new(
            Arc::new(PluginRegistry::with_builtins()),
            Arc::new(MetadataCache::with_describer(schema)),
            Arc::new(backend),
        );

        let listing = Display::new("listing", "default")
            .with_pager(PagerConfig::new(PagerKind::Full, 25))
            .with_handler(HandlerConfig::new(HandlerType::Field, "standard", "articles.title"))
            .with_handler(
                HandlerConfig::new(HandlerType::Field, "date", "articles.created")
                    .with_option("format", "[year]-[month]-[day]"),
            )
            .with_handler(
                HandlerConfig::new(HandlerType::Filter, "numeric", "articles.id")
                    .with_option("operator", ">")
                    .with_option("value", 10i64),
            )
            .with_handler(
                HandlerConfig::new(HandlerType::Sort, "standard", "articles.created")
                    .with_option("order", "desc"),
            );
        let by_author = Display::new("by_author", "page")
            .with_option("path", "articles")
            .with_handler(
                HandlerConfig::new(HandlerType::Relationship, "standard", "articles.uid")
                    .with_id("author"),
            )
            .with_handler(HandlerConfig::new(HandlerType::Argument, "numeric", "articles.uid"))
            .with_handler(HandlerConfig::new(HandlerType::Style, "list", ""))
            .with_handler(HandlerConfig::new(HandlerType::Field, "label", "articles.title"))
            .with_handler(
                HandlerConfig::new(HandlerType::Field, "standard", "users.name")
                    .with_relationship("author"),
            )
            .with_handler(HandlerConfig::new(HandlerType::Sort, "standard", "articles.id"));

        let view = View::new("articles", "articles")
            .with_display(listing)
            .with_display(by_author);
        Self { engine, view }
    }
}

criterion_group!(benches, view_pipeline, escaping);
criterion_main!(benches);
