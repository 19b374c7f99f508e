//! Argument handlers: values pulled from the request path.

use std::fmt;

use serde::Serialize;

use crate::error::OptionError;
use crate::handler::options::{OptionCheck, OptionsExt};
use crate::handler::{Handler, HandlerBinding};
use crate::query::{Column, Condition, DatePart, Operator, QueryBuilder, ARGUMENT_GROUP};
use crate::types::{Options, Value};

/// Outcome of resolving one argument.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ArgumentValue {
    /// Wildcard: contributes no condition.
    All,
    /// Single value.
    One(Value),
    /// Any of the listed values (`1+2+3`).
    AnyOf(Vec<Value>),
    /// Every listed value (`1,2`).
    AllOf(Vec<Value>),
}

impl ArgumentValue {
    /// Whether this is the wildcard.
    pub fn is_all(&self) -> bool {
        matches!(self, ArgumentValue::All)
    }
}

impl fmt::Display for ArgumentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentValue::All => f.write_str("all"),
            ArgumentValue::One(value) => write!(f, "{value}"),
            ArgumentValue::AnyOf(values) => f.write_str(&join_values(values, "+")),
            ArgumentValue::AllOf(values) => f.write_str(&join_values(values, ",")),
        }
    }
}

fn join_values(values: &[Value], sep: &str) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

/// A contextual filter.
pub trait ArgumentHandler: Handler {
    /// Parses a raw path segment; `None` when the segment does not match the
    /// pattern this handler accepts.
    fn accept(&self, binding: &HandlerBinding, raw: &str) -> Option<ArgumentValue>;

    /// Human title of a resolved value.
    fn title(&self, binding: &HandlerBinding, value: &ArgumentValue) -> String {
        match value {
            ArgumentValue::All => binding
                .options
                .str_opt("wildcard_title")
                .unwrap_or("All")
                .to_owned(),
            other => other.to_string(),
        }
    }

    /// Summary form of a resolved value, used in summaries and listings.
    fn summary(&self, binding: &HandlerBinding, value: &ArgumentValue) -> String {
        self.title(binding, value)
    }

    /// Adds the condition a resolved value implies.
    fn contribute(
        &self,
        binding: &HandlerBinding,
        value: &ArgumentValue,
        builder: &mut QueryBuilder,
    ) {
        contribute_value(binding.column(), value, builder);
    }
}

/// Default contribution: equality, `IN` for any-of, one equality per value
/// for all-of. The wildcard contributes nothing.
pub fn contribute_value(column: Column, value: &ArgumentValue, builder: &mut QueryBuilder) {
    match value {
        ArgumentValue::All => {}
        ArgumentValue::One(v) => {
            builder.add_condition(ARGUMENT_GROUP, Condition::eq(column, v.clone()));
        }
        ArgumentValue::AnyOf(values) => {
            builder.add_condition(
                ARGUMENT_GROUP,
                Condition::new(column, Operator::In, Value::List(values.clone())),
            );
        }
        ArgumentValue::AllOf(values) => {
            for v in values {
                builder.add_condition(ARGUMENT_GROUP, Condition::eq(column.clone(), v.clone()));
            }
        }
    }
}

/// Option checks shared by every argument plugin.
pub(crate) fn check_common(check: &mut OptionCheck<'_>) {
    check.string("title");
    check.string("exception");
    check.string("wildcard_title");
    check.one_of("failure", &["all", "empty", "not_found"]);
}

fn validate_with(
    options: Options,
    extra: impl FnOnce(&mut OptionCheck<'_>),
) -> Result<Options, Vec<OptionError>> {
    let mut check = OptionCheck::new(&options);
    check_common(&mut check);
    if let Some(defaults) = options.get("defaults") {
        if let Err(message) = crate::argument::resolver::parse_defaults(defaults) {
            check.fail("defaults", message);
        }
    }
    extra(&mut check);
    let errors = check.finish(Options::new()).err();
    match errors {
        Some(errors) => Err(errors),
        None => Ok(options),
    }
}

/// Integer ids, optionally several joined by `+` (any) or `,` (all).
#[derive(Debug, Default)]
pub struct NumericArgument;

impl Handler for NumericArgument {
    fn plugin_id(&self) -> &'static str {
        "numeric"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        validate_with(options, |check| {
            check.boolean("break_phrase");
        })
    }
}

impl ArgumentHandler for NumericArgument {
    fn accept(&self, binding: &HandlerBinding, raw: &str) -> Option<ArgumentValue> {
        let raw = raw.trim();
        let parse = |part: &str| part.trim().parse::<i64>().ok().map(Value::Int);
        if binding.options.bool_opt("break_phrase", false) {
            if raw.contains('+') {
                let values: Option<Vec<Value>> = raw.split('+').map(parse).collect();
                return values.map(ArgumentValue::AnyOf);
            }
            if raw.contains(',') {
                let values: Option<Vec<Value>> = raw.split(',').map(parse).collect();
                return values.map(ArgumentValue::AllOf);
            }
        }
        parse(raw).map(ArgumentValue::One)
    }
}

/// Free-form text, with optional dash and case transforms.
#[derive(Debug, Default)]
pub struct StringArgument;

impl Handler for StringArgument {
    fn plugin_id(&self) -> &'static str {
        "string"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        validate_with(options, |check| {
            check.boolean("transform_dash");
            check.one_of("case", &["none", "lower", "upper"]);
        })
    }
}

impl ArgumentHandler for StringArgument {
    fn accept(&self, binding: &HandlerBinding, raw: &str) -> Option<ArgumentValue> {
        if raw.is_empty() {
            return None;
        }
        let mut value = raw.to_owned();
        if binding.options.bool_opt("transform_dash", false) {
            value = value.replace('-', " ");
        }
        match binding.options.str_opt("case") {
            Some("lower") => value = value.to_lowercase(),
            Some("upper") => value = value.to_uppercase(),
            _ => {}
        }
        Some(ArgumentValue::One(Value::String(value)))
    }
}

/// Day of month matched against a timestamp column.
#[derive(Debug, Default)]
pub struct DateDayArgument;

impl Handler for DateDayArgument {
    fn plugin_id(&self) -> &'static str {
        "date_day"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        validate_with(options, |_| {})
    }
}

impl ArgumentHandler for DateDayArgument {
    fn accept(&self, _binding: &HandlerBinding, raw: &str) -> Option<ArgumentValue> {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > 2 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let day: i64 = raw.parse().ok()?;
        (1..=31)
            .contains(&day)
            .then_some(ArgumentValue::One(Value::Int(day)))
    }

    fn summary(&self, binding: &HandlerBinding, value: &ArgumentValue) -> String {
        match value {
            ArgumentValue::One(Value::Int(day)) => format!("{day:02}"),
            other => self.title(binding, other),
        }
    }

    fn contribute(
        &self,
        binding: &HandlerBinding,
        value: &ArgumentValue,
        builder: &mut QueryBuilder,
    ) {
        contribute_value(binding.column().with_part(DatePart::Day), value, builder);
    }
}

/// Accepts anything and contributes nothing; used to reserve a path position.
#[derive(Debug, Default)]
pub struct NullArgument;

impl Handler for NullArgument {
    fn plugin_id(&self) -> &'static str {
        "null"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        validate_with(options, |check| {
            check.boolean("must_not_be");
        })
    }
}

impl ArgumentHandler for NullArgument {
    fn accept(&self, binding: &HandlerBinding, raw: &str) -> Option<ArgumentValue> {
        if binding.options.bool_opt("must_not_be", false) {
            return None;
        }
        Some(ArgumentValue::One(Value::from(raw)))
    }

    fn contribute(
        &self,
        _binding: &HandlerBinding,
        _value: &ArgumentValue,
        _builder: &mut QueryBuilder,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(options: &[(&str, Value)]) -> HandlerBinding {
        HandlerBinding {
            table: "articles".into(),
            field: "id".into(),
            alias: "articles".into(),
            options: options
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
            ..HandlerBinding::default()
        }
    }

    #[test]
    fn numeric_break_phrase_splits_any_and_all() {
        let plain = binding(&[]);
        assert_eq!(
            NumericArgument.accept(&plain, "42"),
            Some(ArgumentValue::One(Value::Int(42)))
        );
        assert_eq!(NumericArgument.accept(&plain, "1+2"), None);
        assert_eq!(NumericArgument.accept(&plain, "abc"), None);

        let split = binding(&[("break_phrase", Value::Bool(true))]);
        assert_eq!(
            NumericArgument.accept(&split, "1+2+3"),
            Some(ArgumentValue::AnyOf(vec![1.into(), 2.into(), 3.into()]))
        );
        assert_eq!(
            NumericArgument.accept(&split, "1,2"),
            Some(ArgumentValue::AllOf(vec![1.into(), 2.into()]))
        );
        assert_eq!(NumericArgument.accept(&split, "1+x"), None);
    }

    #[test]
    fn any_of_becomes_in_condition() {
        let mut builder = QueryBuilder::new("articles");
        let value = ArgumentValue::AnyOf(vec![1.into(), 2.into()]);
        NumericArgument.contribute(&binding(&[]), &value, &mut builder);
        assert_eq!(
            builder.compile().to_sql(),
            "SELECT * FROM articles WHERE articles.id IN (1, 2)"
        );
    }

    #[test]
    fn string_transforms_apply_in_order() {
        let b = binding(&[
            ("transform_dash", Value::Bool(true)),
            ("case", Value::from("upper")),
        ]);
        assert_eq!(
            StringArgument.accept(&b, "hello-world"),
            Some(ArgumentValue::One(Value::from("HELLO WORLD")))
        );
    }

    #[test]
    fn date_day_titles_unpadded_summaries_padded() {
        let b = binding(&[]);
        let value = DateDayArgument.accept(&b, "07").expect("valid day");
        assert_eq!(DateDayArgument.title(&b, &value), "7");
        assert_eq!(DateDayArgument.summary(&b, &value), "07");
        assert_eq!(DateDayArgument.accept(&b, "32"), None);
        assert_eq!(DateDayArgument.accept(&b, "0"), None);
        assert_eq!(DateDayArgument.accept(&b, "123"), None);
    }

    #[test]
    fn invalid_failure_option_is_rejected() {
        let mut options = Options::new();
        options.insert("failure".into(), Value::from("explode"));
        let errors = NumericArgument
            .validate_options(options)
            .expect_err("invalid failure");
        assert_eq!(errors[0].option, "failure");
    }
}
