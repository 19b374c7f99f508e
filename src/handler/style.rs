//! Style handlers: arrange the rendered rows of a result.

use crate::error::OptionError;
use crate::handler::options::{OptionCheck, OptionsExt};
use crate::handler::{Handler, HandlerBinding};
use crate::render::{css_class, RenderNode, RenderedRow};
use crate::types::Options;

/// Overall result layout.
pub trait StyleHandler: Handler {
    /// Whether rows should be assembled by the row handler first.
    fn uses_row_plugin(&self) -> bool {
        true
    }

    /// Assembles every row.
    fn render(&self, binding: &HandlerBinding, rows: &[RenderedRow]) -> RenderNode;
}

fn with_extra_class(node: RenderNode, base: &str, binding: &HandlerBinding) -> RenderNode {
    match binding.options.str_opt("class") {
        Some(extra) if !extra.is_empty() => node.with_class(&format!("{base} {extra}")),
        _ => node.with_class(base),
    }
}

/// Rows one after another.
#[derive(Debug, Default)]
pub struct DefaultStyle;

impl Handler for DefaultStyle {
    fn plugin_id(&self) -> &'static str {
        "default"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        let mut check = OptionCheck::new(&options);
        check.string("class");
        check.finish(options.clone())
    }
}

impl StyleHandler for DefaultStyle {
    fn render(&self, binding: &HandlerBinding, rows: &[RenderedRow]) -> RenderNode {
        let children = rows
            .iter()
            .map(|row| RenderNode::element("div", vec![row.node.clone()]).with_class("views-row"))
            .collect();
        with_extra_class(
            RenderNode::element("div", children),
            "views-view-unformatted",
            binding,
        )
    }
}

/// Ordered or unordered list.
#[derive(Debug, Default)]
pub struct ListStyle;

impl Handler for ListStyle {
    fn plugin_id(&self) -> &'static str {
        "list"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        let mut check = OptionCheck::new(&options);
        check.one_of("list_type", &["ul", "ol"]);
        check.string("class");
        check.finish(options.clone())
    }
}

impl StyleHandler for ListStyle {
    fn render(&self, binding: &HandlerBinding, rows: &[RenderedRow]) -> RenderNode {
        let tag = match binding.options.str_opt("list_type") {
            Some("ol") => "ol",
            _ => "ul",
        };
        let items = rows
            .iter()
            .map(|row| RenderNode::element("li", vec![row.node.clone()]))
            .collect();
        with_extra_class(RenderNode::element(tag, items), "views-list", binding)
    }
}

/// Table with a header of field labels; bypasses the row handler.
#[derive(Debug, Default)]
pub struct TableStyle;

impl Handler for TableStyle {
    fn plugin_id(&self) -> &'static str {
        "table"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        let mut check = OptionCheck::new(&options);
        check.string("class");
        check.string("caption");
        check.finish(options.clone())
    }
}

impl StyleHandler for TableStyle {
    fn uses_row_plugin(&self) -> bool {
        false
    }

    fn render(&self, binding: &HandlerBinding, rows: &[RenderedRow]) -> RenderNode {
        let mut sections = Vec::with_capacity(3);
        if let Some(caption) = binding.options.str_opt("caption") {
            sections.push(RenderNode::element("caption", vec![RenderNode::text(caption)]));
        }
        if let Some(first) = rows.first() {
            let header = first
                .fields
                .iter()
                .map(|field| {
                    RenderNode::element("th", vec![RenderNode::text(&field.label)])
                        .with_class(&format!("views-field-{}", css_class(&field.id)))
                })
                .collect();
            sections.push(RenderNode::element(
                "thead",
                vec![RenderNode::element("tr", header)],
            ));
        }
        let body = rows
            .iter()
            .map(|row| {
                let cells = row
                    .fields
                    .iter()
                    .map(|field| {
                        RenderNode::element("td", vec![field.node.clone()])
                            .with_class(&format!("views-field-{}", css_class(&field.id)))
                    })
                    .collect();
                RenderNode::element("tr", cells)
            })
            .collect();
        sections.push(RenderNode::element("tbody", body));
        with_extra_class(RenderNode::element("table", sections), "views-table", binding)
    }
}

/// Rows laid out in a fixed number of columns.
#[derive(Debug, Default)]
pub struct GridStyle;

impl GridStyle {
    const DEFAULT_COLUMNS: u64 = 4;
}

impl Handler for GridStyle {
    fn plugin_id(&self) -> &'static str {
        "grid"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        let mut check = OptionCheck::new(&options);
        if let Some(0) = check.uint("columns") {
            check.fail("columns", "must be at least 1");
        }
        check.string("class");
        check.finish(options.clone())
    }
}

impl StyleHandler for GridStyle {
    fn render(&self, binding: &HandlerBinding, rows: &[RenderedRow]) -> RenderNode {
        let columns = binding
            .options
            .uint_opt("columns")
            .filter(|&columns| columns > 0)
            .unwrap_or(Self::DEFAULT_COLUMNS) as usize;
        let grid_rows = rows
            .chunks(columns)
            .map(|chunk| {
                let cells = chunk
                    .iter()
                    .map(|row| {
                        RenderNode::element("div", vec![row.node.clone()])
                            .with_class("views-grid-cell")
                    })
                    .collect();
                RenderNode::element("div", cells).with_class("views-grid-row")
            })
            .collect();
        with_extra_class(RenderNode::element("div", grid_rows), "views-grid", binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderedField;
    use crate::types::Value;

    fn rows(n: usize) -> Vec<RenderedRow> {
        (0..n)
            .map(|idx| RenderedRow {
                index: idx,
                node: RenderNode::text(&format!("row {idx}")),
                fields: vec![RenderedField {
                    id: "articles.title".into(),
                    label: "Title".into(),
                    node: RenderNode::text(&format!("t{idx}")),
                }],
            })
            .collect()
    }

    #[test]
    fn list_type_selects_tag() {
        let mut binding = HandlerBinding::default();
        binding.options.insert("list_type".into(), Value::from("ol"));
        let node = ListStyle.render(&binding, &rows(2));
        assert_eq!(node.tag(), Some("ol"));
        assert_eq!(node.children().len(), 2);
    }

    #[test]
    fn table_header_comes_from_field_labels() {
        let node = TableStyle.render(&HandlerBinding::default(), &rows(2));
        let html = node.to_html();
        assert!(html.contains("<th class=\"views-field-articles-title\">Title</th>"));
        assert!(html.contains("<td class=\"views-field-articles-title\">t1</td>"));
        assert!(!html.contains("row 0"));
    }

    #[test]
    fn grid_chunks_rows_by_columns() {
        let mut binding = HandlerBinding::default();
        binding.options.insert("columns".into(), Value::Int(2));
        let node = GridStyle.render(&binding, &rows(5));
        let widths: Vec<usize> = node.children().iter().map(|r| r.children().len()).collect();
        assert_eq!(widths, vec![2, 2, 1]);
    }
}
