//! Plugin descriptors, the registry that resolves them by `(type, id)` with a
//! broken fallback, the default-value provider table and the built-in set.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::argument::provider::{
    CurrentUserProvider, DefaultValueProvider, NodeProvider, QueryParamProvider,
};
use crate::error::{PluginNotFoundError, RegistryError};
use crate::handler::argument::{DateDayArgument, NullArgument, NumericArgument, StringArgument};
use crate::handler::display::{BlockDisplay, DefaultDisplay, PageDisplay};
use crate::handler::field::{BooleanField, DateField, LabelField, NumericField, StandardField};
use crate::handler::filter::{
    BooleanFilter, InOperatorFilter, NullFilter, NumericFilter, StringFilter,
};
use crate::handler::relationship::StandardRelationship;
use crate::handler::row::{FieldsRow, InlineRow};
use crate::handler::sort::StandardSort;
use crate::handler::style::{DefaultStyle, GridStyle, ListStyle, TableStyle};
use crate::handler::{HandlerFactory, HandlerInstance, BROKEN_PLUGIN};
use crate::types::{HandlerType, Options, Value};

/// Immutable description of one plugin, keyed by `(ty, id)`.
#[derive(Clone)]
pub struct PluginDescriptor {
    /// Handler type the plugin fills.
    pub ty: HandlerType,
    /// Id, unique within `ty`.
    pub id: String,
    /// Human title.
    pub title: String,
    /// Options merged under the configured ones.
    pub default_options: Options,
    /// Instantiates a fresh handler.
    pub factory: HandlerFactory,
}

impl PluginDescriptor {
    /// Creates a descriptor with no default options.
    pub fn new<F>(
        ty: HandlerType,
        id: impl Into<String>,
        title: impl Into<String>,
        factory: F,
    ) -> Self
    where
        F: Fn() -> HandlerInstance + Send + Sync + 'static,
    {
        Self {
            ty,
            id: id.into(),
            title: title.into(),
            default_options: Options::new(),
            factory: Arc::new(factory),
        }
    }

    /// Adds a default option.
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_options.insert(key.into(), value.into());
        self
    }

    /// Calls the factory.
    pub fn instantiate(&self) -> HandlerInstance {
        (self.factory)()
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("ty", &self.ty)
            .field("id", &self.id)
            .field("title", &self.title)
            .field("default_options", &self.default_options)
            .finish_non_exhaustive()
    }
}

/// A handler looked up for one configured slot.
#[derive(Debug)]
pub struct ResolvedPlugin {
    /// Fresh instance.
    pub instance: HandlerInstance,
    /// Defaults of the descriptor that produced `instance`.
    pub defaults: Options,
    /// Whether the requested id was unknown and the broken handler was
    /// substituted.
    pub missing: bool,
}

/// Plugin descriptors and default-value providers, populated at startup and
/// read-only afterwards.
pub struct PluginRegistry {
    descriptors: FxHashMap<(HandlerType, String), Arc<PluginDescriptor>>,
    providers: FxHashMap<String, Arc<dyn DefaultValueProvider>>,
}

impl PluginRegistry {
    /// A registry holding only the per-type broken defaults.
    pub fn new() -> Self {
        let mut registry = Self {
            descriptors: FxHashMap::default(),
            providers: FxHashMap::default(),
        };
        for ty in HandlerType::ALL {
            let factory = move || HandlerInstance::broken(ty);
            registry.insert(PluginDescriptor::new(ty, BROKEN_PLUGIN, "Broken or missing", factory));
        }
        registry
    }

    /// A registry holding the built-in handlers and default providers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtin_arguments();
        registry.register_builtin_fields();
        registry.register_builtin_filters();
        registry.register_builtin_layout();
        registry.insert_provider(Arc::new(NodeProvider));
        registry.insert_provider(Arc::new(CurrentUserProvider));
        registry.insert_provider(Arc::new(QueryParamProvider));
        registry
    }

    fn register_builtin_arguments(&mut self) {
        use HandlerType::Argument;
        self.insert(
            PluginDescriptor::new(Argument, "numeric", "Numeric", || {
                HandlerInstance::Argument(Box::new(NumericArgument))
            })
            .with_default("failure", "all")
            .with_default("exception", "all"),
        );
        self.insert(
            PluginDescriptor::new(Argument, "string", "String", || {
                HandlerInstance::Argument(Box::new(StringArgument))
            })
            .with_default("failure", "all")
            .with_default("exception", "all")
            .with_default("case", "none"),
        );
        self.insert(
            PluginDescriptor::new(Argument, "date_day", "Day of month", || {
                HandlerInstance::Argument(Box::new(DateDayArgument))
            })
            .with_default("failure", "all")
            .with_default("exception", "all"),
        );
        self.insert(PluginDescriptor::new(Argument, "null", "Null", || {
            HandlerInstance::Argument(Box::new(NullArgument))
        }));
    }

    fn register_builtin_fields(&mut self) {
        use HandlerType::Field;
        self.insert(PluginDescriptor::new(Field, "standard", "Standard", || {
            HandlerInstance::Field(Box::new(StandardField))
        }));
        self.insert(PluginDescriptor::new(Field, "numeric", "Numeric", || {
            HandlerInstance::Field(Box::new(NumericField))
        }));
        self.insert(
            PluginDescriptor::new(Field, "boolean", "Boolean", || {
                HandlerInstance::Field(Box::new(BooleanField))
            })
            .with_default("format", "yes-no"),
        );
        self.insert(
            PluginDescriptor::new(Field, "date", "Date", || {
                HandlerInstance::Field(Box::new(DateField))
            })
            .with_default("format", "[year]-[month]-[day]"),
        );
        self.insert(
            PluginDescriptor::new(Field, "label", "Label", || {
                HandlerInstance::Field(Box::new(LabelField))
            })
            .with_default("link", true),
        );
    }

    fn register_builtin_filters(&mut self) {
        use HandlerType::{Filter, Relationship, Sort};
        self.insert(PluginDescriptor::new(Filter, "string", "String", || {
            HandlerInstance::Filter(Box::new(StringFilter))
        }));
        self.insert(PluginDescriptor::new(Filter, "numeric", "Numeric", || {
            HandlerInstance::Filter(Box::new(NumericFilter))
        }));
        self.insert(PluginDescriptor::new(Filter, "in_operator", "In list", || {
            HandlerInstance::Filter(Box::new(InOperatorFilter))
        }));
        self.insert(PluginDescriptor::new(Filter, "boolean", "Boolean", || {
            HandlerInstance::Filter(Box::new(BooleanFilter))
        }));
        self.insert(PluginDescriptor::new(Filter, "null", "Is empty", || {
            HandlerInstance::Filter(Box::new(NullFilter))
        }));
        self.insert(
            PluginDescriptor::new(Sort, "standard", "Standard", || {
                HandlerInstance::Sort(Box::new(StandardSort))
            })
            .with_default("order", "asc"),
        );
        self.insert(PluginDescriptor::new(Relationship, "standard", "Standard", || {
            HandlerInstance::Relationship(Box::new(StandardRelationship))
        }));
    }

    fn register_builtin_layout(&mut self) {
        use HandlerType::{Display, Row, Style};
        self.insert(PluginDescriptor::new(Display, "default", "Default", || {
            HandlerInstance::Display(Box::new(DefaultDisplay))
        }));
        self.insert(PluginDescriptor::new(Display, "page", "Page", || {
            HandlerInstance::Display(Box::new(PageDisplay))
        }));
        self.insert(PluginDescriptor::new(Display, "block", "Block", || {
            HandlerInstance::Display(Box::new(BlockDisplay))
        }));
        self.insert(PluginDescriptor::new(Style, "default", "Unformatted", || {
            HandlerInstance::Style(Box::new(DefaultStyle))
        }));
        self.insert(
            PluginDescriptor::new(Style, "list", "HTML list", || {
                HandlerInstance::Style(Box::new(ListStyle))
            })
            .with_default("list_type", "ul"),
        );
        self.insert(PluginDescriptor::new(Style, "table", "Table", || {
            HandlerInstance::Style(Box::new(TableStyle))
        }));
        self.insert(
            PluginDescriptor::new(Style, "grid", "Grid", || {
                HandlerInstance::Style(Box::new(GridStyle))
            })
            .with_default("columns", 4i64),
        );
        self.insert(PluginDescriptor::new(Row, "fields", "Fields", || {
            HandlerInstance::Row(Box::new(FieldsRow))
        }));
        self.insert(
            PluginDescriptor::new(Row, "inline", "Inline fields", || {
                HandlerInstance::Row(Box::new(InlineRow))
            })
            .with_default("separator", " "),
        );
    }

    fn insert(&mut self, descriptor: PluginDescriptor) {
        self.descriptors
            .insert((descriptor.ty, descriptor.id.clone()), Arc::new(descriptor));
    }

    fn insert_provider(&mut self, provider: Arc<dyn DefaultValueProvider>) {
        self.providers.insert(provider.id().to_owned(), provider);
    }

    /// Registers a descriptor.
    ///
    /// Fails when `(ty, id)` is taken or when the factory instantiates a
    /// handler of another type.
    pub fn register(&mut self, descriptor: PluginDescriptor) -> Result<(), RegistryError> {
        let key = (descriptor.ty, descriptor.id.clone());
        if self.descriptors.contains_key(&key) {
            return Err(RegistryError::Duplicate {
                ty: descriptor.ty,
                id: descriptor.id,
            });
        }
        let actual = descriptor.instantiate().handler_type();
        if actual != descriptor.ty {
            return Err(RegistryError::TypeMismatch {
                id: descriptor.id,
                declared: descriptor.ty,
                actual,
            });
        }
        debug!(ty = %descriptor.ty, id = %descriptor.id, "plugin.register");
        self.descriptors.insert(key, Arc::new(descriptor));
        Ok(())
    }

    /// Instantiates `(ty, id)`.
    pub fn get(&self, ty: HandlerType, id: &str) -> Result<HandlerInstance, PluginNotFoundError> {
        self.descriptor(ty, id)
            .map(|descriptor| descriptor.instantiate())
            .ok_or_else(|| PluginNotFoundError {
                ty,
                id: id.to_owned(),
            })
    }

    /// The broken handler for `ty`.
    pub fn get_default(&self, ty: HandlerType) -> HandlerInstance {
        HandlerInstance::broken(ty)
    }

    /// Instantiates `(ty, id)`, substituting the broken handler when the id
    /// is unknown.
    pub fn get_or_default(&self, ty: HandlerType, id: &str) -> ResolvedPlugin {
        match self.descriptor(ty, id) {
            Some(descriptor) => ResolvedPlugin {
                instance: descriptor.instantiate(),
                defaults: descriptor.default_options.clone(),
                missing: false,
            },
            None => {
                let err = PluginNotFoundError {
                    ty,
                    id: id.to_owned(),
                };
                warn!(error = %err, ty = %ty, id, "plugin.missing");
                ResolvedPlugin {
                    instance: self.get_default(ty),
                    defaults: Options::new(),
                    missing: true,
                }
            }
        }
    }

    /// Descriptor registered under `(ty, id)`.
    pub fn descriptor(&self, ty: HandlerType, id: &str) -> Option<&Arc<PluginDescriptor>> {
        self.descriptors.get(&(ty, id.to_owned()))
    }

    /// Whether `(ty, id)` is registered.
    pub fn contains(&self, ty: HandlerType, id: &str) -> bool {
        self.descriptor(ty, id).is_some()
    }

    /// Descriptors of `ty` in id order.
    pub fn descriptors(&self, ty: HandlerType) -> Vec<Arc<PluginDescriptor>> {
        let mut found: Vec<_> = self
            .descriptors
            .values()
            .filter(|descriptor| descriptor.ty == ty)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    /// Registers a default-value provider under its id.
    pub fn register_default_provider(
        &mut self,
        provider: Arc<dyn DefaultValueProvider>,
    ) -> Result<(), RegistryError> {
        if self.providers.contains_key(provider.id()) {
            return Err(RegistryError::DuplicateProvider(provider.id().to_owned()));
        }
        self.insert_provider(provider);
        Ok(())
    }

    /// Provider registered under `id`.
    pub fn default_provider(&self, id: &str) -> Option<&Arc<dyn DefaultValueProvider>> {
        self.providers.get(id)
    }

    /// Registered provider ids in order.
    pub fn default_provider_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("descriptors", &self.descriptors.len())
            .field("providers", &self.default_provider_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_every_type() {
        let registry = PluginRegistry::with_builtins();
        for ty in HandlerType::ALL {
            let instance = registry.get(ty, BROKEN_PLUGIN).expect("broken default");
            assert_eq!(instance.handler_type(), ty);
            assert!(instance.is_broken());
            assert!(registry.descriptors(ty).len() >= 2, "{ty} has builtins");
        }
        let field = registry.get(HandlerType::Field, "numeric").expect("numeric");
        assert_eq!(field.handler_type(), HandlerType::Field);
        assert_eq!(field.plugin_id(), "numeric");
    }

    #[test]
    fn unknown_ids_fall_back_to_broken() {
        let registry = PluginRegistry::with_builtins();
        let err = registry.get(HandlerType::Style, "carousel").expect_err("unknown");
        assert_eq!(err.id, "carousel");

        let resolved = registry.get_or_default(HandlerType::Style, "carousel");
        assert!(resolved.missing);
        assert!(resolved.instance.is_broken());
        assert_eq!(resolved.instance.handler_type(), HandlerType::Style);
    }

    #[test]
    fn register_rejects_duplicates_and_type_mismatches() {
        let mut registry = PluginRegistry::new();
        let descriptor = PluginDescriptor::new(HandlerType::Field, "plain", "Plain", || {
            HandlerInstance::Field(Box::new(StandardField))
        });
        registry.register(descriptor.clone()).expect("first registration");
        assert_eq!(
            registry.register(descriptor),
            Err(RegistryError::Duplicate {
                ty: HandlerType::Field,
                id: "plain".into()
            })
        );

        let wrong = PluginDescriptor::new(HandlerType::Sort, "plain", "Plain", || {
            HandlerInstance::Field(Box::new(StandardField))
        });
        assert_eq!(
            registry.register(wrong),
            Err(RegistryError::TypeMismatch {
                id: "plain".into(),
                declared: HandlerType::Sort,
                actual: HandlerType::Field,
            })
        );
    }

    #[test]
    fn defaults_travel_with_the_instance() {
        let registry = PluginRegistry::with_builtins();
        let resolved = registry.get_or_default(HandlerType::Style, "grid");
        assert!(!resolved.missing);
        assert_eq!(resolved.defaults.get("columns"), Some(&Value::Int(4)));
    }

    #[test]
    fn providers_are_registered_once() {
        let mut registry = PluginRegistry::with_builtins();
        assert_eq!(registry.default_provider_ids(), vec!["current_user", "node", "query_param"]);
        assert_eq!(
            registry.register_default_provider(Arc::new(NodeProvider)),
            Err(RegistryError::DuplicateProvider("node".into()))
        );
    }
}
