#![allow(missing_docs)]

use std::sync::Arc;

use proptest::prelude::*;
use viewkit::{
    metadata::{FieldMetadata, FieldType, MetadataCache, StaticSchema},
    plugin::PluginRegistry,
    query::InMemoryBackend,
    render::{escape, sanitize_href, unescape, RenderNode},
    types::{HandlerType, Row, Value},
    view::{Display, HandlerConfig, View},
    Engine, RequestContext,
};

fn arb_handler_type() -> impl Strategy<Value = HandlerType> {
    prop::sample::select(HandlerType::ALL.to_vec())
}

fn engine() -> Engine {
    let schema = StaticSchema::new()
        .with_field(FieldMetadata::new("articles", "id", FieldType::Integer))
        .with_field(FieldMetadata::new("articles", "title", FieldType::String));
    let rows: Vec<Row> = (1..=5)
        .map(|id| {
            let mut row = Row::new();
            row.insert("id".into(), Value::Int(id));
            row.insert("title".into(), Value::from(format!("t{id}")));
            row
        })
        .collect();
    Engine::new(
        Arc::new(PluginRegistry::with_builtins()),
        Arc::new(MetadataCache::with_describer(schema)),
        Arc::new(InMemoryBackend::new().with_table("articles", rows)),
    )
}

fn view() -> View {
    View::new("articles", "articles").with_display(
        Display::new("page_1", "page")
            .with_option("path", "articles")
            .with_option("title", "Article %1")
            .with_handler(HandlerConfig::new(HandlerType::Argument, "numeric", "articles.id"))
            .with_handler(HandlerConfig::new(HandlerType::Field, "standard", "articles.title"))
            .with_handler(HandlerConfig::new(HandlerType::Sort, "standard", "articles.id")),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn escaped_text_has_no_markup_characters(raw in any::<String>()) {
        let escaped = escape(&raw);
        prop_assert!(!escaped.contains(['<', '>', '"', '\'']));
        prop_assert_eq!(unescape(&escaped), raw.clone());
        prop_assert_eq!(RenderNode::text(&raw).to_html(), escaped);
    }

    #[test]
    fn links_never_leak_markup(href in any::<String>(), label in any::<String>()) {
        let html = RenderNode::link(&href, &label).to_html();
        prop_assert_eq!(html.matches('<').count(), 2);
        prop_assert_eq!(html.matches('>').count(), 2);
    }

    #[test]
    fn script_schemes_are_neutralized(
        scheme in prop::sample::select(vec!["javascript:", "JavaScript:", " data:", "vbscript:"]),
        rest in "[ -~]{0,24}",
    ) {
        let href = format!("{scheme}{rest}");
        prop_assert_eq!(sanitize_href(&href), "#");
    }

    #[test]
    fn registry_lookups_never_panic(ty in arb_handler_type(), id in "[a-z_]{0,12}") {
        let registry = PluginRegistry::with_builtins();
        let resolved = registry.get_or_default(ty, &id);
        prop_assert_eq!(resolved.missing, !registry.contains(ty, &id));
        prop_assert_eq!(registry.get(ty, &id).is_ok(), registry.contains(ty, &id));
    }

    #[test]
    fn same_request_compiles_the_same_query(id in 0u32..1_000_000) {
        let engine = engine();
        let view = view();
        let ctx = RequestContext::from_path(&format!("articles/{id}"));

        let first = engine.explain(&view, "page_1", &ctx).expect("first");
        let second = engine.explain(&view, "page_1", &ctx).expect("second");

        let first_query = first.query.expect("query");
        let second_query = second.query.expect("query");
        prop_assert_eq!(first_query.plan_hash, second_query.plan_hash);
        prop_assert_eq!(&first_query, &second_query);
        let expected = format!("WHERE articles.id = {id} ORDER BY articles.id ASC");
        prop_assert!(first_query.to_sql().ends_with(&expected));
    }

    #[test]
    fn argument_titles_are_escaped_once(segment in "[a-z]{0,4}[<>&\"'][a-z<>&\"']{0,8}") {
        let engine = engine();
        let view = View::new("articles", "articles").with_display(
            Display::new("page_1", "page")
                .with_option("path", "articles")
                .with_option("title", "Article %1")
                .with_handler(HandlerConfig::new(HandlerType::Argument, "string", "articles.title"))
                .with_handler(HandlerConfig::new(HandlerType::Field, "standard", "articles.title")),
        );
        let ctx = RequestContext::from_path(&format!("articles/{segment}"));

        let rendered = engine.run(&view, "page_1", &ctx).expect("run");

        let title = format!("Article {segment}");
        prop_assert_eq!(rendered.title.as_deref(), Some(title.as_str()));
        let html = rendered.html();
        prop_assert!(html.contains(&escape(&title)));
        prop_assert!(!html.contains(&title));
    }
}
