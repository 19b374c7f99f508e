//! Field metadata records and the schema-description collaborator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::HandlerType;

/// Storage type of a data-source column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 text.
    #[default]
    String,
    /// Signed integer.
    Integer,
    /// Floating point number.
    Float,
    /// Boolean flag.
    Boolean,
    /// Seconds since the Unix epoch, UTC.
    Timestamp,
}

impl FieldType {
    /// Lowercase identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp",
        }
    }
}

/// Join from a field on one table to a field on another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPath {
    /// Target table.
    pub table: String,
    /// Column on the target table.
    pub field: String,
    /// Column on the source table; defaults to the described field itself.
    #[serde(default)]
    pub left_field: Option<String>,
}

impl JoinPath {
    /// Creates a join to `table.field`.
    pub fn new(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
            left_field: None,
        }
    }

    /// Sets an explicit source column.
    pub fn from_field(mut self, left_field: impl Into<String>) -> Self {
        self.left_field = Some(left_field.into());
        self
    }
}

/// What the metadata cache knows about one `(table, field)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    /// Owning table.
    pub table: String,
    /// Column name.
    pub field: String,
    /// Storage type.
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    /// Human title.
    #[serde(default)]
    pub title: Option<String>,
    /// Default plugin id per handler type.
    #[serde(default)]
    pub handlers: BTreeMap<HandlerType, String>,
    /// Join exposed through this field, used by relationship handlers.
    #[serde(default)]
    pub relationship: Option<JoinPath>,
}

impl FieldMetadata {
    /// Creates metadata for `table.field`.
    pub fn new(table: impl Into<String>, field: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
            field_type,
            title: None,
            handlers: BTreeMap::new(),
            relationship: None,
        }
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Binds a default plugin id for `ty`.
    pub fn with_handler(mut self, ty: HandlerType, plugin: impl Into<String>) -> Self {
        self.handlers.insert(ty, plugin.into());
        self
    }

    /// Exposes a join through this field.
    pub fn with_relationship(mut self, join: JoinPath) -> Self {
        self.relationship = Some(join);
        self
    }

    /// `table.field` key.
    pub fn key(&self) -> String {
        format!("{}.{}", self.table, self.field)
    }

    /// Default plugin id for `ty`, if bound.
    pub fn default_handler(&self, ty: HandlerType) -> Option<&str> {
        self.handlers.get(&ty).map(String::as_str)
    }

    /// Title, falling back to the column name.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.field)
    }
}

/// Supplies raw field and relationship metadata for the cache to merge.
pub trait SchemaDescriber: Send + Sync {
    /// Tables this describer contributes to.
    fn tables(&self) -> Vec<String>;
    /// Fields of `name`; empty when the describer knows nothing about it.
    fn describe_table(&self, name: &str) -> Vec<FieldMetadata>;
}

/// One table of a [`StaticSchema`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticTable {
    /// Table name.
    pub name: String,
    /// Field declarations.
    #[serde(default)]
    pub fields: Vec<StaticField>,
}

/// One field of a [`StaticTable`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticField {
    /// Column name.
    pub name: String,
    /// Storage type.
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    /// Human title.
    #[serde(default)]
    pub title: Option<String>,
    /// Default plugin id per handler type.
    #[serde(default)]
    pub handlers: BTreeMap<HandlerType, String>,
    /// Join exposed through this field.
    #[serde(default)]
    pub relationship: Option<JoinPath>,
}

/// Describer backed by declarations known up front (site files, tests).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticSchema {
    /// Declared tables.
    #[serde(default)]
    pub tables: Vec<StaticTable>,
}

impl StaticSchema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field, creating its table on first use.
    pub fn with_field(mut self, meta: FieldMetadata) -> Self {
        let field = StaticField {
            name: meta.field,
            field_type: meta.field_type,
            title: meta.title,
            handlers: meta.handlers,
            relationship: meta.relationship,
        };
        match self.tables.iter_mut().find(|table| table.name == meta.table) {
            Some(table) => table.fields.push(field),
            None => self.tables.push(StaticTable {
                name: meta.table,
                fields: vec![field],
            }),
        }
        self
    }
}

impl SchemaDescriber for StaticSchema {
    fn tables(&self) -> Vec<String> {
        self.tables.iter().map(|table| table.name.clone()).collect()
    }

    fn describe_table(&self, name: &str) -> Vec<FieldMetadata> {
        self.tables
            .iter()
            .filter(|table| table.name == name)
            .flat_map(|table| table.fields.iter())
            .map(|field| FieldMetadata {
                table: name.to_owned(),
                field: field.name.clone(),
                field_type: field.field_type,
                title: field.title.clone(),
                handlers: field.handlers.clone(),
                relationship: field.relationship.clone(),
            })
            .collect()
    }
}
