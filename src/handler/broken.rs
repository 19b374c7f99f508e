//! Fallback handler substituted for unknown plugin ids.
//!
//! It contributes nothing to the query and renders nothing of its own;
//! display, style and row slots pass their content through unwrapped so a
//! misconfigured layout still shows the rows.

use crate::handler::{
    ArgumentHandler, ArgumentValue, DisplayHandler, DisplayParts, FieldHandler, FilterHandler,
    Handler, HandlerBinding, Rendered, RelationshipHandler, RowHandler, SortHandler,
    StyleHandler, BROKEN_PLUGIN,
};
use crate::query::{Operator, QueryBuilder};
use crate::render::{RenderNode, RenderedField, RenderedRow};
use crate::types::{Row, Value};

/// The per-type default handler.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrokenHandler;

impl Handler for BrokenHandler {
    fn plugin_id(&self) -> &'static str {
        BROKEN_PLUGIN
    }
}

impl ArgumentHandler for BrokenHandler {
    fn accept(&self, _binding: &HandlerBinding, _raw: &str) -> Option<ArgumentValue> {
        Some(ArgumentValue::All)
    }

    fn contribute(
        &self,
        _binding: &HandlerBinding,
        _value: &ArgumentValue,
        _builder: &mut QueryBuilder,
    ) {
    }
}

impl FieldHandler for BrokenHandler {
    fn raw_value(&self, _binding: &HandlerBinding, _row: &Row) -> Value {
        Value::Null
    }

    fn transform(&self, _binding: &HandlerBinding, _value: &Value, _row: &Row) -> Rendered {
        Rendered::Empty
    }
}

impl FilterHandler for BrokenHandler {
    fn operators(&self) -> &'static [Operator] {
        &[]
    }

    fn operand(&self, _op: Operator, _value: &Value) -> Option<Value> {
        None
    }
}

impl SortHandler for BrokenHandler {}

impl RelationshipHandler for BrokenHandler {
    fn join(&self, _binding: &HandlerBinding, _builder: &mut QueryBuilder) -> Option<String> {
        None
    }
}

impl DisplayHandler for BrokenHandler {
    fn render(&self, _binding: &HandlerBinding, parts: DisplayParts) -> RenderNode {
        parts.body
    }
}

impl StyleHandler for BrokenHandler {
    fn render(&self, _binding: &HandlerBinding, rows: &[RenderedRow]) -> RenderNode {
        RenderNode::fragment(rows.iter().map(|row| row.node.clone()).collect())
    }
}

impl RowHandler for BrokenHandler {
    fn render(&self, _binding: &HandlerBinding, fields: &[RenderedField]) -> RenderNode {
        RenderNode::fragment(fields.iter().map(|field| field.node.clone()).collect())
    }
}
