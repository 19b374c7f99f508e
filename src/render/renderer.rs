//! Turns result rows into the styled output tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::context::RequestContext;
use crate::handler::field::render_field;
use crate::handler::options::OptionsExt;
use crate::handler::{FieldHandler, HandlerBinding, RowHandler, StyleHandler};
use crate::render::RenderNode;
use crate::types::Row;

/// Decides whether the viewing user may see a field.
pub trait AccessChecker: Send + Sync {
    /// Whether `ctx` may view the field `field_key` (`table.field`).
    fn can_view(&self, ctx: &RequestContext, field_key: &str) -> bool;
}

/// Field-level rules: a field listed here requires the named permission;
/// unlisted fields are visible to everyone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPermissions {
    rules: BTreeMap<String, String>,
}

impl FieldPermissions {
    /// Creates an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `permission` to view `field_key`.
    pub fn require(mut self, field_key: impl Into<String>, permission: impl Into<String>) -> Self {
        self.rules.insert(field_key.into(), permission.into());
        self
    }

    /// Whether no rule is configured.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl AccessChecker for FieldPermissions {
    fn can_view(&self, ctx: &RequestContext, field_key: &str) -> bool {
        match self.rules.get(field_key) {
            Some(permission) => ctx.has_permission(permission),
            None => true,
        }
    }
}

/// One field of one row, escaped.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderedField {
    /// Handler id.
    pub id: String,
    /// Label, unescaped; escaped when it becomes a node.
    pub label: String,
    /// Escaped output.
    pub node: RenderNode,
}

/// One result row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderedRow {
    /// Position in the result.
    pub index: usize,
    /// Output of the row handler; empty when the style bypasses it.
    pub node: RenderNode,
    /// Visible fields in handler order.
    pub fields: Vec<RenderedField>,
}

/// A field handler paired with its binding.
#[derive(Clone, Copy)]
pub struct FieldSlot<'a> {
    /// Binding.
    pub binding: &'a HandlerBinding,
    /// Handler.
    pub handler: &'a dyn FieldHandler,
}

/// Applies field, row and style handlers for one execution.
pub struct Renderer<'a> {
    ctx: &'a RequestContext,
    access: Option<&'a dyn AccessChecker>,
}

impl<'a> Renderer<'a> {
    /// Creates a renderer; without an access checker every field is visible.
    pub fn new(ctx: &'a RequestContext, access: Option<&'a dyn AccessChecker>) -> Self {
        Self { ctx, access }
    }

    /// Renders the visible fields of `row`.
    pub fn render_fields(&self, fields: &[FieldSlot<'_>], row: &Row) -> Vec<RenderedField> {
        let mut out = Vec::with_capacity(fields.len());
        for slot in fields {
            let binding = slot.binding;
            if let Some(access) = self.access {
                if !access.can_view(self.ctx, &binding.field_key()) {
                    trace!(field = %binding.id, "render.field.denied");
                    continue;
                }
            }
            let rendered = render_field(slot.handler, binding, row);
            if binding.options.bool_opt("exclude", false) {
                continue;
            }
            if rendered.is_empty() && binding.options.bool_opt("hide_empty", false) {
                continue;
            }
            out.push(RenderedField {
                id: binding.id.clone(),
                label: binding.label(),
                node: rendered.into_node(),
            });
        }
        out
    }

    /// Renders every row through the row handler (when the style uses it)
    /// and then the style.
    pub fn render_rows(
        &self,
        fields: &[FieldSlot<'_>],
        row_plugin: (&HandlerBinding, &dyn RowHandler),
        style: (&HandlerBinding, &dyn StyleHandler),
        rows: &[Row],
    ) -> RenderNode {
        let (row_binding, row_handler) = row_plugin;
        let (style_binding, style_handler) = style;
        let uses_row = style_handler.uses_row_plugin();
        let rendered: Vec<RenderedRow> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let fields = self.render_fields(fields, row);
                let node = if uses_row {
                    row_handler.render(row_binding, &fields)
                } else {
                    RenderNode::Empty
                };
                RenderedRow {
                    index,
                    node,
                    fields,
                }
            })
            .collect();
        style_handler.render(style_binding, &rendered)
    }
}

/// Lowercase class-name fragment: anything but ASCII alphanumerics becomes
/// `-`.
pub fn css_class(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::UserContext;
    use crate::handler::field::StandardField;
    use crate::handler::row::FieldsRow;
    use crate::handler::style::ListStyle;
    use crate::types::Value;

    fn binding(field: &str, options: &[(&str, Value)]) -> HandlerBinding {
        HandlerBinding {
            id: format!("users.{field}"),
            table: "users".into(),
            field: field.into(),
            alias: "users".into(),
            options: options
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
            ..HandlerBinding::default()
        }
    }

    fn row() -> Row {
        let mut row = Row::new();
        row.insert("users.name".into(), Value::from("<ada>"));
        row.insert("users.mail".into(), Value::from("ada@example.com"));
        row.insert("users.uid".into(), Value::Int(1));
        row
    }

    #[test]
    fn denied_and_excluded_fields_are_omitted() {
        let name = binding("name", &[]);
        let mail = binding("mail", &[]);
        let uid = binding("uid", &[("exclude", Value::Bool(true))]);
        let slots = [
            FieldSlot { binding: &name, handler: &StandardField },
            FieldSlot { binding: &mail, handler: &StandardField },
            FieldSlot { binding: &uid, handler: &StandardField },
        ];
        let rules = FieldPermissions::new().require("users.mail", "view emails");

        let anonymous = RequestContext::default();
        let renderer = Renderer::new(&anonymous, Some(&rules));
        let ids: Vec<String> = renderer
            .render_fields(&slots, &row())
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec!["users.name"]);

        let admin = RequestContext::default()
            .with_user(UserContext::new(1).with_permission("view emails"));
        let renderer = Renderer::new(&admin, Some(&rules));
        assert_eq!(renderer.render_fields(&slots, &row()).len(), 2);

        let unchecked = Renderer::new(&anonymous, None);
        assert_eq!(unchecked.render_fields(&slots, &row()).len(), 2);
    }

    #[test]
    fn rows_flow_through_row_and_style_handlers() {
        let name = binding("name", &[]);
        let slots = [FieldSlot { binding: &name, handler: &StandardField }];
        let ctx = RequestContext::default();
        let plain = HandlerBinding::default();
        let node = Renderer::new(&ctx, None).render_rows(
            &slots,
            (&plain, &FieldsRow),
            (&plain, &ListStyle),
            &[row()],
        );
        assert_eq!(
            node.to_html(),
            "<ul class=\"views-list\"><li><div class=\"views-field views-field-users-name\">\
             <span class=\"field-content\">&lt;ada&gt;</span></div></li></ul>"
        );
    }

    #[test]
    fn css_classes_are_normalized() {
        assert_eq!(css_class("Page_1.Title"), "page-1-title");
    }
}
