#![forbid(unsafe_code)]

//! Handlers: the typed building blocks a display is composed of.
//!
//! Every handler type is a trait extending [`Handler`]; a configured
//! handler is carried around as a [`HandlerInstance`], a closed enum over the
//! eight types. Plugins are stateless between calls: everything they know
//! about their configuration arrives through a [`HandlerBinding`].

use std::sync::Arc;

use crate::error::OptionError;
use crate::metadata::FieldMetadata;
use crate::query::{Column, QueryBuilder};
use crate::types::{HandlerType, Options};

pub mod argument;
pub mod broken;
pub mod display;
pub mod field;
pub mod filter;
pub mod options;
pub mod relationship;
pub mod row;
pub mod sort;
pub mod style;

pub use argument::{ArgumentHandler, ArgumentValue};
pub use broken::BrokenHandler;
pub use display::{DisplayHandler, DisplayParts};
pub use field::{FieldHandler, Rendered};
pub use filter::FilterHandler;
pub use relationship::RelationshipHandler;
pub use row::RowHandler;
pub use sort::SortHandler;
pub use style::StyleHandler;

/// Plugin id of the per-type fallback handler.
pub const BROKEN_PLUGIN: &str = "broken";

/// Capabilities shared by every handler type.
pub trait Handler: Send + Sync {
    /// Id the plugin is registered under.
    fn plugin_id(&self) -> &'static str;

    /// Checks the merged options, returning them (possibly normalized) or
    /// every problem found.
    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        Ok(options)
    }

    /// Contributes joins, columns, conditions or sorts.
    fn query(&self, _binding: &HandlerBinding, _builder: &mut QueryBuilder) {}
}

/// Everything a handler knows about its configured position in a display.
#[derive(Clone, Debug, Default)]
pub struct HandlerBinding {
    /// Handler id: the configured id, else the field key.
    pub id: String,
    /// Position among handlers of the same type, after weight ordering.
    pub position: usize,
    /// Table the field lives on.
    pub table: String,
    /// Column name; empty for display, style and row handlers.
    pub field: String,
    /// Alias the table is addressed by in the query.
    pub alias: String,
    /// Relationship the field is reached through.
    pub relationship: Option<String>,
    /// Field metadata, when the field is exposed.
    pub meta: Option<Arc<FieldMetadata>>,
    /// Validated options.
    pub options: Options,
}

impl HandlerBinding {
    /// Column reference in the query.
    pub fn column(&self) -> Column {
        Column::new(&self.alias, &self.field)
    }

    /// Key rows carry this field's value under.
    pub fn row_key(&self) -> String {
        format!("{}.{}", self.alias, self.field)
    }

    /// `table.field` key.
    pub fn field_key(&self) -> String {
        format!("{}.{}", self.table, self.field)
    }

    /// Configured label, else the metadata title, else the column name.
    pub fn label(&self) -> String {
        if let Some(label) = self.options.get("label").and_then(|v| v.as_str()) {
            return label.to_owned();
        }
        match &self.meta {
            Some(meta) => meta.label().to_owned(),
            None => self.field.clone(),
        }
    }
}

/// Factory stored in a plugin descriptor; called once per configured handler
/// per execution.
pub type HandlerFactory = Arc<dyn Fn() -> HandlerInstance + Send + Sync>;

/// A configured handler, tagged by type.
pub enum HandlerInstance {
    /// Contextual value extracted from the request.
    Argument(Box<dyn ArgumentHandler>),
    /// Rendered column.
    Field(Box<dyn FieldHandler>),
    /// Query condition.
    Filter(Box<dyn FilterHandler>),
    /// Sort clause.
    Sort(Box<dyn SortHandler>),
    /// Join.
    Relationship(Box<dyn RelationshipHandler>),
    /// Outer wrapper.
    Display(Box<dyn DisplayHandler>),
    /// Arrangement of rows.
    Style(Box<dyn StyleHandler>),
    /// Arrangement of one row's fields.
    Row(Box<dyn RowHandler>),
}

macro_rules! dispatch {
    ($self:expr, $handler:ident => $body:expr) => {
        match $self {
            HandlerInstance::Argument($handler) => $body,
            HandlerInstance::Field($handler) => $body,
            HandlerInstance::Filter($handler) => $body,
            HandlerInstance::Sort($handler) => $body,
            HandlerInstance::Relationship($handler) => $body,
            HandlerInstance::Display($handler) => $body,
            HandlerInstance::Style($handler) => $body,
            HandlerInstance::Row($handler) => $body,
        }
    };
}

impl HandlerInstance {
    /// The fallback handler for `ty`.
    pub fn broken(ty: HandlerType) -> Self {
        let handler = BrokenHandler;
        match ty {
            HandlerType::Argument => HandlerInstance::Argument(Box::new(handler)),
            HandlerType::Field => HandlerInstance::Field(Box::new(handler)),
            HandlerType::Filter => HandlerInstance::Filter(Box::new(handler)),
            HandlerType::Sort => HandlerInstance::Sort(Box::new(handler)),
            HandlerType::Relationship => HandlerInstance::Relationship(Box::new(handler)),
            HandlerType::Display => HandlerInstance::Display(Box::new(handler)),
            HandlerType::Style => HandlerInstance::Style(Box::new(handler)),
            HandlerType::Row => HandlerInstance::Row(Box::new(handler)),
        }
    }

    /// Handler type tag.
    pub fn handler_type(&self) -> HandlerType {
        match self {
            HandlerInstance::Argument(_) => HandlerType::Argument,
            HandlerInstance::Field(_) => HandlerType::Field,
            HandlerInstance::Filter(_) => HandlerType::Filter,
            HandlerInstance::Sort(_) => HandlerType::Sort,
            HandlerInstance::Relationship(_) => HandlerType::Relationship,
            HandlerInstance::Display(_) => HandlerType::Display,
            HandlerInstance::Style(_) => HandlerType::Style,
            HandlerInstance::Row(_) => HandlerType::Row,
        }
    }

    /// Id of the plugin behind this instance.
    pub fn plugin_id(&self) -> &'static str {
        dispatch!(self, handler => handler.plugin_id())
    }

    /// Whether this is the fallback handler.
    pub fn is_broken(&self) -> bool {
        self.plugin_id() == BROKEN_PLUGIN
    }

    /// Runs the plugin's own option validation.
    pub fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        dispatch!(self, handler => handler.validate_options(options))
    }

    /// Lets the handler contribute to `builder`.
    pub fn query(&self, binding: &HandlerBinding, builder: &mut QueryBuilder) {
        dispatch!(self, handler => handler.query(binding, builder))
    }

    /// Argument capability, if this is an argument handler.
    pub fn as_argument(&self) -> Option<&dyn ArgumentHandler> {
        match self {
            HandlerInstance::Argument(handler) => Some(handler.as_ref()),
            _ => None,
        }
    }

    /// Field capability, if this is a field handler.
    pub fn as_field(&self) -> Option<&dyn FieldHandler> {
        match self {
            HandlerInstance::Field(handler) => Some(handler.as_ref()),
            _ => None,
        }
    }

    /// Relationship capability, if this is a relationship handler.
    pub fn as_relationship(&self) -> Option<&dyn RelationshipHandler> {
        match self {
            HandlerInstance::Relationship(handler) => Some(handler.as_ref()),
            _ => None,
        }
    }

    /// Display capability, if this is a display handler.
    pub fn as_display(&self) -> Option<&dyn DisplayHandler> {
        match self {
            HandlerInstance::Display(handler) => Some(handler.as_ref()),
            _ => None,
        }
    }

    /// Style capability, if this is a style handler.
    pub fn as_style(&self) -> Option<&dyn StyleHandler> {
        match self {
            HandlerInstance::Style(handler) => Some(handler.as_ref()),
            _ => None,
        }
    }

    /// Row capability, if this is a row handler.
    pub fn as_row(&self) -> Option<&dyn RowHandler> {
        match self {
            HandlerInstance::Row(handler) => Some(handler.as_ref()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for HandlerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerInstance")
            .field("type", &self.handler_type())
            .field("plugin", &self.plugin_id())
            .finish()
    }
}
