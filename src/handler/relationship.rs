//! Relationship handlers: joins other handlers can address by id.

use crate::error::OptionError;
use crate::handler::options::{OptionCheck, OptionsExt};
use crate::handler::{Handler, HandlerBinding};
use crate::query::{JoinKind, QueryBuilder};
use crate::types::Options;

/// A join contribution.
pub trait RelationshipHandler: Handler {
    /// Adds the join and returns the alias of the joined table; `None` when
    /// the bound field exposes no join.
    fn join(&self, binding: &HandlerBinding, builder: &mut QueryBuilder) -> Option<String>;
}

/// Follows the join path declared on the field's metadata. Option
/// `required` turns the left join into an inner join.
#[derive(Debug, Default)]
pub struct StandardRelationship;

impl Handler for StandardRelationship {
    fn plugin_id(&self) -> &'static str {
        "standard"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        let mut check = OptionCheck::new(&options);
        check.boolean("required");
        check.string("label");
        match check.finish(Options::new()) {
            Ok(_) => Ok(options),
            Err(errors) => Err(errors),
        }
    }

    fn query(&self, binding: &HandlerBinding, builder: &mut QueryBuilder) {
        self.join(binding, builder);
    }
}

impl RelationshipHandler for StandardRelationship {
    fn join(&self, binding: &HandlerBinding, builder: &mut QueryBuilder) -> Option<String> {
        let path = binding.meta.as_ref()?.relationship.as_ref()?;
        let kind = if binding.options.bool_opt("required", false) {
            JoinKind::Inner
        } else {
            JoinKind::Left
        };
        let left_field = path.left_field.as_deref().unwrap_or(&binding.field);
        Some(builder.add_join(&binding.alias, left_field, &path.table, &path.field, kind))
    }
}
