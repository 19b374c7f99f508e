//! Sort handlers.

use crate::error::OptionError;
use crate::handler::options::{OptionCheck, OptionsExt};
use crate::handler::{Handler, HandlerBinding};
use crate::query::{QueryBuilder, SortDirection};
use crate::types::Options;

/// An `ORDER BY` contribution.
pub trait SortHandler: Handler {
    /// Direction configured on the binding.
    fn direction(&self, binding: &HandlerBinding) -> SortDirection {
        binding
            .options
            .str_opt("order")
            .and_then(SortDirection::parse)
            .unwrap_or_default()
    }
}

/// Sorts on the bound column; option `order` is `asc` (default) or `desc`.
#[derive(Debug, Default)]
pub struct StandardSort;

impl Handler for StandardSort {
    fn plugin_id(&self) -> &'static str {
        "standard"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        let mut check = OptionCheck::new(&options);
        if let Some(order) = check.string("order") {
            if SortDirection::parse(order).is_none() {
                check.fail("order", "must be asc or desc");
            }
        }
        match check.finish(Options::new()) {
            Ok(_) => Ok(options),
            Err(errors) => Err(errors),
        }
    }

    fn query(&self, binding: &HandlerBinding, builder: &mut QueryBuilder) {
        builder.add_sort(binding.column(), self.direction(binding));
    }
}

impl SortHandler for StandardSort {}
