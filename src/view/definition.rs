//! Declarative view definitions, as authored in site files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::handler::options::OptionsExt;
use crate::query::{BoolOp, QueryBuilder};
use crate::types::{HandlerType, Options, Value};
use crate::view::pager::PagerConfig;

/// One configured handler of a display.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Handler type.
    #[serde(rename = "type")]
    pub ty: HandlerType,
    /// Plugin id; empty selects the field's default plugin for this type.
    #[serde(default)]
    pub plugin: String,
    /// `table.field`; empty for display, style and row handlers.
    #[serde(default)]
    pub field: String,
    /// Ordering key within the type; ties keep declaration order.
    #[serde(default)]
    pub weight: i32,
    /// Plugin options.
    #[serde(default)]
    pub options: Options,
    /// Id other handlers use to name this relationship.
    #[serde(default)]
    pub id: Option<String>,
    /// Relationship the field is reached through.
    #[serde(default)]
    pub relationship: Option<String>,
}

impl HandlerConfig {
    /// Creates a handler config with weight 0 and no options.
    pub fn new(ty: HandlerType, plugin: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            ty,
            plugin: plugin.into(),
            field: field.into(),
            weight: 0,
            options: Options::new(),
            id: None,
            relationship: None,
        }
    }

    /// Sets the weight.
    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    /// Sets an option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Sets the id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Routes the field through a relationship.
    pub fn with_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = Some(relationship.into());
        self
    }

    /// Id the handler is known by: explicit id, else the field key, else the
    /// type name.
    pub fn handler_id(&self) -> String {
        match (&self.id, self.field.is_empty()) {
            (Some(id), _) => id.clone(),
            (None, false) => self.field.clone(),
            (None, true) => self.ty.as_str().to_owned(),
        }
    }
}

/// Who may execute a display.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccessConfig {
    /// Everyone.
    #[default]
    None,
    /// Users holding a permission.
    Permission {
        /// Required permission.
        permission: String,
    },
    /// Users holding a role.
    Role {
        /// Required role.
        role: String,
    },
}

impl AccessConfig {
    /// Whether the request may execute the display.
    pub fn allows(&self, ctx: &RequestContext) -> bool {
        match self {
            AccessConfig::None => true,
            AccessConfig::Permission { permission } => ctx.has_permission(permission),
            AccessConfig::Role { role } => ctx.has_role(role),
        }
    }
}

/// Boolean combination of filter groups, from the display option
/// `filter_groups`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterGroups {
    /// Operator between groups.
    pub operator: BoolOp,
    /// Operator inside each listed group.
    pub groups: BTreeMap<u32, BoolOp>,
}

impl FilterGroups {
    /// Reads `filter_groups` from display options; malformed entries are
    /// ignored (validation rejects them first).
    pub fn from_options(options: &Options) -> Self {
        let Some(grouping) = options.get("filter_groups").and_then(Value::as_map) else {
            return Self::default();
        };
        let operator = grouping
            .get("operator")
            .and_then(Value::as_str)
            .and_then(BoolOp::parse)
            .unwrap_or_default();
        let groups = grouping
            .get("groups")
            .and_then(Value::as_map)
            .map(|groups| {
                groups
                    .iter()
                    .filter_map(|(id, op)| {
                        let id = id.parse::<u32>().ok().filter(|&id| id > 0)?;
                        Some((id, op.as_str().and_then(BoolOp::parse)?))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { operator, groups }
    }

    /// Installs the operators on a builder.
    pub fn apply(&self, builder: &mut QueryBuilder) {
        builder.set_group_operator(self.operator);
        for (&group, &op) in &self.groups {
            builder.set_group_op(group, op);
        }
    }
}

fn default_display_plugin() -> String {
    "default".into()
}

/// An independently executable presentation of a view.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Display {
    /// Display id; filled from the map key when loaded.
    #[serde(default)]
    pub id: String,
    /// Display plugin id.
    #[serde(default = "default_display_plugin")]
    pub plugin: String,
    /// Base table; inherits the view's when absent.
    #[serde(default)]
    pub base_table: Option<String>,
    /// Handlers in declaration order.
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
    /// Pager.
    #[serde(default)]
    pub pager: PagerConfig,
    /// Access rule.
    #[serde(default)]
    pub access: AccessConfig,
    /// Display plugin options (`title`, `empty_text`, `path`,
    /// `filter_groups`, `class`).
    #[serde(default)]
    pub options: Options,
}

impl Display {
    /// Creates a display using `plugin`.
    pub fn new(id: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plugin: plugin.into(),
            base_table: None,
            handlers: Vec::new(),
            pager: PagerConfig::default(),
            access: AccessConfig::default(),
            options: Options::new(),
        }
    }

    /// Overrides the view's base table.
    pub fn with_base_table(mut self, table: impl Into<String>) -> Self {
        self.base_table = Some(table.into());
        self
    }

    /// Appends a handler.
    pub fn with_handler(mut self, handler: HandlerConfig) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Sets the pager.
    pub fn with_pager(mut self, pager: PagerConfig) -> Self {
        self.pager = pager;
        self
    }

    /// Sets the access rule.
    pub fn with_access(mut self, access: AccessConfig) -> Self {
        self.access = access;
        self
    }

    /// Sets a display option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Handlers of `ty`, stably ordered by weight.
    pub fn handlers_of(&self, ty: HandlerType) -> Vec<&HandlerConfig> {
        let mut found: Vec<&HandlerConfig> =
            self.handlers.iter().filter(|handler| handler.ty == ty).collect();
        found.sort_by_key(|handler| handler.weight);
        found
    }

    /// Number of leading path segments the display's `path` option takes;
    /// arguments read the segments after them.
    pub fn path_prefix_len(&self) -> usize {
        self.options
            .str_opt("path")
            .map(|path| path.split('/').filter(|s| !s.is_empty()).count())
            .unwrap_or(0)
    }
}

/// A named set of displays over one base table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct View {
    /// View id.
    pub id: String,
    /// Default base table for displays.
    pub base_table: String,
    /// Displays by id.
    #[serde(default)]
    pub displays: BTreeMap<String, Display>,
}

impl View {
    /// Creates a view without displays.
    pub fn new(id: impl Into<String>, base_table: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_table: base_table.into(),
            displays: BTreeMap::new(),
        }
    }

    /// Adds a display under its id.
    pub fn with_display(mut self, display: Display) -> Self {
        self.displays.insert(display.id.clone(), display);
        self
    }

    /// Copies map keys into display ids; used after deserializing.
    pub fn normalize(mut self) -> Self {
        for (id, display) in self.displays.iter_mut() {
            if display.id.is_empty() {
                display.id = id.clone();
            }
        }
        self
    }

    /// Display `id`.
    pub fn display(&self, id: &str) -> Option<&Display> {
        self.displays.get(id)
    }

    /// Base table `display` queries.
    pub fn base_table_of<'a>(&'a self, display: &'a Display) -> &'a str {
        display.base_table.as_deref().unwrap_or(&self.base_table)
    }
}
