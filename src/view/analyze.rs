//! Static checks over view definitions; nothing is executed.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::handler::options::{merge_defaults, OptionsExt};
use crate::metadata::{MetadataCache, MetadataSnapshot};
use crate::plugin::PluginRegistry;
use crate::types::{split_field_key, HandlerType};
use crate::view::definition::{Display, HandlerConfig, View};
use crate::view::pager::PagerKind;

/// How serious a finding is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Execution will fail.
    Error,
    /// Execution degrades.
    Warning,
    /// Worth knowing.
    Info,
}

impl Severity {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// One finding about one display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// Display id.
    pub display: String,
    /// Handler id, when the finding concerns one handler.
    pub handler: Option<String>,
    /// Description.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}", self.severity.as_str(), self.display)?;
        if let Some(handler) = &self.handler {
            write!(f, " / {handler}")?;
        }
        write!(f, "] {}", self.message)
    }
}

/// Checks every display of `view`. Findings are ordered by display id, then
/// by the order checks run.
pub fn analyze(
    view: &View,
    registry: &PluginRegistry,
    metadata: &MetadataCache,
) -> Vec<Diagnostic> {
    let snapshot = metadata.snapshot();
    let mut diagnostics = Vec::new();
    for display in view.displays.values() {
        let mut checker = DisplayChecker {
            display,
            registry,
            snapshot: &snapshot,
            out: &mut diagnostics,
        };
        checker.check(view.base_table_of(display));
    }
    diagnostics
}

struct DisplayChecker<'a> {
    display: &'a Display,
    registry: &'a PluginRegistry,
    snapshot: &'a MetadataSnapshot,
    out: &'a mut Vec<Diagnostic>,
}

impl DisplayChecker<'_> {
    fn push(&mut self, severity: Severity, handler: Option<&HandlerConfig>, message: String) {
        self.out.push(Diagnostic {
            severity,
            display: self.display.id.clone(),
            handler: handler.map(HandlerConfig::handler_id),
            message,
        });
    }

    fn check(&mut self, base_table: &str) {
        let display = self.display;
        if !self.snapshot.has_table(base_table) {
            self.push(Severity::Error, None, format!("unknown base table '{base_table}'"));
        }
        if !self.registry.contains(HandlerType::Display, &display.plugin) {
            self.push(
                Severity::Warning,
                None,
                format!("unknown display plugin '{}'; falls back to broken", display.plugin),
            );
        }
        if display.plugin == "page" && display.options.str_opt("path").is_none() {
            self.push(Severity::Warning, None, "page display has no path".into());
        }

        let relationships: BTreeSet<String> = display
            .handlers_of(HandlerType::Relationship)
            .into_iter()
            .map(HandlerConfig::handler_id)
            .collect();
        for handler in &display.handlers {
            self.check_handler(handler, &relationships);
        }

        if display.handlers_of(HandlerType::Field).is_empty() {
            self.push(Severity::Warning, None, "display has no fields".into());
        }
        for ty in [HandlerType::Style, HandlerType::Row] {
            let count = display.handlers_of(ty).len();
            if count > 1 {
                self.push(
                    Severity::Warning,
                    None,
                    format!("{count} {ty} handlers configured; only the first is used"),
                );
            }
        }
        let unsorted = display.handlers_of(HandlerType::Sort).is_empty();
        if display.pager.kind == PagerKind::Full && unsorted {
            self.push(
                Severity::Info,
                None,
                "full pager without sorts; page contents may shift between requests".into(),
            );
        }
    }

    fn check_handler(&mut self, handler: &HandlerConfig, relationships: &BTreeSet<String>) {
        if let Some(relationship) = &handler.relationship {
            if !relationships.contains(relationship) {
                self.push(
                    Severity::Error,
                    Some(handler),
                    format!("undeclared relationship '{relationship}'"),
                );
            }
        }

        let snapshot = self.snapshot;
        let meta = split_field_key(&handler.field).and_then(|(t, f)| snapshot.field(t, f));
        let addresses_field = !matches!(
            handler.ty,
            HandlerType::Display | HandlerType::Style | HandlerType::Row
        );
        if addresses_field && meta.is_none() {
            self.push(
                Severity::Warning,
                Some(handler),
                format!("unknown field '{}'", handler.field),
            );
        }
        if handler.ty == HandlerType::Relationship
            && !meta.is_some_and(|meta| meta.relationship.is_some())
        {
            self.push(
                Severity::Error,
                Some(handler),
                format!("field '{}' declares no join", handler.field),
            );
        }

        let plugin = if handler.plugin.is_empty() {
            meta.and_then(|meta| meta.default_handler(handler.ty)).unwrap_or_default()
        } else {
            handler.plugin.as_str()
        };
        let Some(descriptor) = self.registry.descriptor(handler.ty, plugin) else {
            self.push(
                Severity::Warning,
                Some(handler),
                format!("unknown {} plugin '{plugin}'; falls back to broken", handler.ty),
            );
            return;
        };
        let options = merge_defaults(&descriptor.default_options, &handler.options);
        if let Err(errors) = descriptor.instantiate().validate_options(options) {
            for error in errors {
                self.push(Severity::Error, Some(handler), format!("invalid option {error}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{FieldMetadata, FieldType, JoinPath, StaticSchema};
    use crate::view::pager::PagerConfig;

    fn metadata() -> MetadataCache {
        MetadataCache::with_describer(
            StaticSchema::new()
                .with_field(FieldMetadata::new("articles", "title", FieldType::String))
                .with_field(
                    FieldMetadata::new("articles", "uid", FieldType::Integer)
                        .with_relationship(JoinPath::new("users", "uid")),
                )
                .with_field(FieldMetadata::new("users", "uid", FieldType::Integer)),
        )
    }

    fn severities(diagnostics: &[Diagnostic]) -> Vec<(Severity, &str)> {
        diagnostics
            .iter()
            .map(|d| (d.severity, d.message.as_str()))
            .collect()
    }

    #[test]
    fn clean_display_has_no_findings() {
        let view = View::new("articles", "articles").with_display(
            Display::new("block_1", "block")
                .with_handler(HandlerConfig::new(HandlerType::Field, "standard", "articles.title")),
        );
        let registry = PluginRegistry::with_builtins();
        assert!(analyze(&view, &registry, &metadata()).is_empty());
    }

    #[test]
    fn reports_each_problem_once() {
        let view = View::new("articles", "ghost").with_display(
            Display::new("page_1", "page")
                .with_pager(PagerConfig::new(PagerKind::Full, 10))
                .with_handler(HandlerConfig::new(
                    HandlerType::Relationship,
                    "standard",
                    "articles.title",
                ))
                .with_handler(
                    HandlerConfig::new(HandlerType::Filter, "fuzzy", "articles.title")
                        .with_relationship("author"),
                )
                .with_handler(
                    HandlerConfig::new(HandlerType::Sort, "standard", "articles.body")
                        .with_option("order", "sideways"),
                ),
        );
        let registry = PluginRegistry::with_builtins();
        let diagnostics = analyze(&view, &registry, &metadata());
        let found = severities(&diagnostics);
        assert!(found.contains(&(Severity::Error, "unknown base table 'ghost'")));
        assert!(found.contains(&(Severity::Warning, "page display has no path")));
        assert!(found.contains(&(Severity::Error, "field 'articles.title' declares no join")));
        assert!(found.contains(&(Severity::Error, "undeclared relationship 'author'")));
        assert!(found.contains(&(
            Severity::Warning,
            "unknown filter plugin 'fuzzy'; falls back to broken"
        )));
        assert!(found.contains(&(Severity::Warning, "unknown field 'articles.body'")));
        assert!(found.contains(&(Severity::Warning, "display has no fields")));
        assert!(found.contains(&(Severity::Error, "invalid option order: must be asc or desc")));
        assert!(!found.iter().any(|(severity, _)| *severity == Severity::Info));
    }
}
