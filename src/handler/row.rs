//! Row handlers: arrange one row's rendered fields.

use crate::error::OptionError;
use crate::handler::options::{OptionCheck, OptionsExt};
use crate::handler::{Handler, HandlerBinding};
use crate::render::{css_class, RenderNode, RenderedField};
use crate::types::Options;

/// Per-row layout.
pub trait RowHandler: Handler {
    /// Assembles the fields of one row.
    fn render(&self, binding: &HandlerBinding, fields: &[RenderedField]) -> RenderNode;
}

/// One wrapper per field, with optional labels.
#[derive(Debug, Default)]
pub struct FieldsRow;

impl Handler for FieldsRow {
    fn plugin_id(&self) -> &'static str {
        "fields"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        let mut check = OptionCheck::new(&options);
        check.boolean("labels");
        check.boolean("hide_empty");
        match check.finish(Options::new()) {
            Ok(_) => Ok(options),
            Err(errors) => Err(errors),
        }
    }
}

impl RowHandler for FieldsRow {
    fn render(&self, binding: &HandlerBinding, fields: &[RenderedField]) -> RenderNode {
        let labels = binding.options.bool_opt("labels", false);
        let hide_empty = binding.options.bool_opt("hide_empty", false);
        let children = fields
            .iter()
            .filter(|field| !(hide_empty && field.node.is_empty()))
            .map(|field| {
                let mut parts = Vec::with_capacity(2);
                if labels && !field.label.is_empty() {
                    parts.push(
                        RenderNode::element("span", vec![RenderNode::text(&field.label)])
                            .with_class("views-label"),
                    );
                }
                parts.push(
                    RenderNode::element("span", vec![field.node.clone()])
                        .with_class("field-content"),
                );
                RenderNode::element("div", parts)
                    .with_class(&format!("views-field views-field-{}", css_class(&field.id)))
            })
            .collect();
        RenderNode::fragment(children)
    }
}

/// Fields on one line, joined by `separator`.
#[derive(Debug, Default)]
pub struct InlineRow;

impl Handler for InlineRow {
    fn plugin_id(&self) -> &'static str {
        "inline"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        let mut check = OptionCheck::new(&options);
        check.string("separator");
        match check.finish(Options::new()) {
            Ok(_) => Ok(options),
            Err(errors) => Err(errors),
        }
    }
}

impl RowHandler for InlineRow {
    fn render(&self, binding: &HandlerBinding, fields: &[RenderedField]) -> RenderNode {
        let separator = binding.options.str_opt("separator").unwrap_or(" ");
        let mut children = Vec::with_capacity(fields.len() * 2);
        for field in fields.iter().filter(|field| !field.node.is_empty()) {
            if !children.is_empty() && !separator.is_empty() {
                children.push(RenderNode::text(separator));
            }
            children.push(RenderNode::element("span", vec![field.node.clone()]).with_class(
                &format!("views-field views-field-{}", css_class(&field.id)),
            ));
        }
        RenderNode::fragment(children)
    }
}
