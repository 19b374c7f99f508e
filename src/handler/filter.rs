//! Filter handlers: fixed or exposed conditions.
//!
//! Shared options: `operator`, `value`, `group` (default 1), and `exposed` +
//! `identifier` to read the value from the query string. An empty value
//! contributes nothing unless the operator ignores values.

use crate::error::OptionError;
use crate::handler::options::{OptionCheck, OptionsExt};
use crate::handler::{Handler, HandlerBinding};
use crate::query::{Condition, Operator, QueryBuilder, DEFAULT_FILTER_GROUP};
use crate::types::{Options, Value};

/// A query condition.
pub trait FilterHandler: Handler {
    /// Operators this plugin accepts; the first is the default.
    fn operators(&self) -> &'static [Operator];

    /// Converts the configured value into the operand; `None` when the value
    /// cannot be used.
    fn operand(&self, op: Operator, value: &Value) -> Option<Value>;

    /// Condition implied by the binding, if any.
    fn condition(&self, binding: &HandlerBinding) -> Option<Condition> {
        let op = operator_of(self.operators(), &binding.options)?;
        if op.is_unary() {
            return Some(Condition::new(binding.column(), op, Value::Null));
        }
        let value = binding.options.get("value").filter(|v| !v.is_empty())?;
        let operand = self.operand(op, value)?;
        Some(Condition::new(binding.column(), op, operand))
    }
}

/// Group a filter's condition lands in.
pub fn group_of(binding: &HandlerBinding) -> u32 {
    binding
        .options
        .uint_opt("group")
        .and_then(|group| u32::try_from(group).ok())
        .filter(|&group| group > 0)
        .unwrap_or(DEFAULT_FILTER_GROUP)
}

fn operator_of(allowed: &[Operator], options: &Options) -> Option<Operator> {
    match options.str_opt("operator") {
        Some(raw) => Operator::parse(raw).filter(|op| allowed.contains(op)),
        None => allowed.first().copied(),
    }
}

fn add_condition<F: FilterHandler + ?Sized>(
    filter: &F,
    binding: &HandlerBinding,
    builder: &mut QueryBuilder,
) {
    if let Some(condition) = filter.condition(binding) {
        builder.add_condition(group_of(binding), condition);
    }
}

fn validate_with(
    options: Options,
    allowed: &[Operator],
    extra: impl FnOnce(&mut OptionCheck<'_>),
) -> Result<Options, Vec<OptionError>> {
    let mut check = OptionCheck::new(&options);
    if let Some(raw) = check.string("operator") {
        match Operator::parse(raw) {
            Some(op) if allowed.contains(&op) => {}
            _ => check.fail("operator", format!("unsupported operator '{raw}'")),
        }
    }
    if let Some(0) = check.uint("group") {
        check.fail("group", "group 0 is reserved for arguments");
    }
    check.boolean("exposed");
    if options.bool_opt("exposed", false) {
        check.required_string("identifier");
    }
    extra(&mut check);
    match check.finish(Options::new()) {
        Ok(_) => Ok(options),
        Err(errors) => Err(errors),
    }
}

const STRING_OPS: &[Operator] = &[
    Operator::Eq,
    Operator::NotEq,
    Operator::Contains,
    Operator::StartsWith,
    Operator::IsNull,
    Operator::IsNotNull,
];

const NUMERIC_OPS: &[Operator] = &[
    Operator::Eq,
    Operator::NotEq,
    Operator::Lt,
    Operator::Le,
    Operator::Gt,
    Operator::Ge,
    Operator::Between,
    Operator::IsNull,
    Operator::IsNotNull,
];

/// Text comparisons.
#[derive(Debug, Default)]
pub struct StringFilter;

impl Handler for StringFilter {
    fn plugin_id(&self) -> &'static str {
        "string"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        validate_with(options, STRING_OPS, |_| {})
    }

    fn query(&self, binding: &HandlerBinding, builder: &mut QueryBuilder) {
        add_condition(self, binding, builder);
    }
}

impl FilterHandler for StringFilter {
    fn operators(&self) -> &'static [Operator] {
        STRING_OPS
    }

    fn operand(&self, _op: Operator, value: &Value) -> Option<Value> {
        Some(Value::String(value.to_string()))
    }
}

/// Numeric comparisons, including `between` over a two-element list or a
/// `low..high` string.
#[derive(Debug, Default)]
pub struct NumericFilter;

impl Handler for NumericFilter {
    fn plugin_id(&self) -> &'static str {
        "numeric"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        validate_with(options.clone(), NUMERIC_OPS, |check| {
            let op = options
                .str_opt("operator")
                .and_then(Operator::parse)
                .unwrap_or(Operator::Eq);
            if let Some(value) = options.get("value").filter(|v| !v.is_empty()) {
                if !op.is_unary() && NumericFilter.operand(op, value).is_none() {
                    check.fail("value", "must be numeric");
                }
            }
        })
    }

    fn query(&self, binding: &HandlerBinding, builder: &mut QueryBuilder) {
        add_condition(self, binding, builder);
    }
}

impl FilterHandler for NumericFilter {
    fn operators(&self) -> &'static [Operator] {
        NUMERIC_OPS
    }

    fn operand(&self, op: Operator, value: &Value) -> Option<Value> {
        if op == Operator::Between {
            let bounds: Vec<Value> = match value {
                Value::List(items) => items.clone(),
                Value::String(s) => s.split("..").map(Value::from).collect(),
                _ => return None,
            };
            let [low, high] = bounds.as_slice() else {
                return None;
            };
            return Some(Value::List(vec![number(low)?, number(high)?]));
        }
        number(value)
    }
}

fn number(value: &Value) -> Option<Value> {
    match value {
        Value::Int(_) | Value::Float(_) => Some(value.clone()),
        other => other
            .as_i64()
            .map(Value::Int)
            .or_else(|| other.as_f64().map(Value::Float)),
    }
}

/// Membership in a list of values.
#[derive(Debug, Default)]
pub struct InOperatorFilter;

impl Handler for InOperatorFilter {
    fn plugin_id(&self) -> &'static str {
        "in_operator"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        validate_with(options, &[Operator::In, Operator::NotIn], |_| {})
    }

    fn query(&self, binding: &HandlerBinding, builder: &mut QueryBuilder) {
        add_condition(self, binding, builder);
    }
}

impl FilterHandler for InOperatorFilter {
    fn operators(&self) -> &'static [Operator] {
        &[Operator::In, Operator::NotIn]
    }

    fn operand(&self, _op: Operator, value: &Value) -> Option<Value> {
        let items: Vec<Value> = match value {
            Value::List(items) => items.clone(),
            Value::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(Value::from)
                .collect(),
            other => vec![other.clone()],
        };
        (!items.is_empty()).then_some(Value::List(items))
    }
}

/// Flag equality.
#[derive(Debug, Default)]
pub struct BooleanFilter;

impl Handler for BooleanFilter {
    fn plugin_id(&self) -> &'static str {
        "boolean"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        validate_with(options.clone(), &[Operator::Eq, Operator::NotEq], |check| {
            if let Some(value) = options.get("value").filter(|v| !v.is_null()) {
                if value.as_bool().is_none() {
                    check.fail("value", "must be a boolean");
                }
            }
        })
    }

    fn query(&self, binding: &HandlerBinding, builder: &mut QueryBuilder) {
        add_condition(self, binding, builder);
    }
}

impl FilterHandler for BooleanFilter {
    fn operators(&self) -> &'static [Operator] {
        &[Operator::Eq, Operator::NotEq]
    }

    fn operand(&self, _op: Operator, value: &Value) -> Option<Value> {
        value.as_bool().map(Value::Bool)
    }

    fn condition(&self, binding: &HandlerBinding) -> Option<Condition> {
        let op = operator_of(self.operators(), &binding.options)?;
        // `false` is a meaningful value here, unlike an empty string.
        let value = binding.options.get("value").filter(|v| !v.is_null())?;
        Some(Condition::new(binding.column(), op, self.operand(op, value)?))
    }
}

/// Accepts any configuration and contributes nothing.
#[derive(Debug, Default)]
pub struct NullFilter;

impl Handler for NullFilter {
    fn plugin_id(&self) -> &'static str {
        "null"
    }
}

impl FilterHandler for NullFilter {
    fn operators(&self) -> &'static [Operator] {
        &[]
    }

    fn operand(&self, _op: Operator, _value: &Value) -> Option<Value> {
        None
    }

    fn condition(&self, _binding: &HandlerBinding) -> Option<Condition> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(options: &[(&str, Value)]) -> HandlerBinding {
        HandlerBinding {
            table: "articles".into(),
            field: "status".into(),
            alias: "articles".into(),
            options: options
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
            ..HandlerBinding::default()
        }
    }

    #[test]
    fn empty_values_contribute_nothing() {
        assert!(StringFilter.condition(&binding(&[])).is_none());
        let b = binding(&[("operator", Value::from("is_null"))]);
        assert_eq!(
            StringFilter.condition(&b).map(|c| c.to_string()),
            Some("articles.status IS NULL".to_owned())
        );
    }

    #[test]
    fn numeric_between_accepts_range_strings() {
        let b = binding(&[
            ("operator", Value::from("between")),
            ("value", Value::from("1..5")),
        ]);
        assert_eq!(
            NumericFilter.condition(&b).map(|c| c.to_string()),
            Some("articles.status BETWEEN 1 AND 5".to_owned())
        );
    }

    #[test]
    fn filters_land_in_their_group() {
        let b = binding(&[("value", Value::from("a, b")), ("group", Value::Int(2))]);
        let mut builder = QueryBuilder::new("articles");
        InOperatorFilter.query(&b, &mut builder);
        let compiled = builder.compile();
        assert_eq!(compiled.where_clause.groups[0].id, 2);
        assert_eq!(
            compiled.to_sql(),
            "SELECT * FROM articles WHERE articles.status IN ('a', 'b')"
        );
    }

    #[test]
    fn boolean_false_is_a_value() {
        let b = binding(&[("value", Value::Bool(false))]);
        assert_eq!(
            BooleanFilter.condition(&b).map(|c| c.to_string()),
            Some("articles.status = FALSE".to_owned())
        );
    }

    #[test]
    fn operator_outside_plugin_vocabulary_is_rejected() {
        let mut options = Options::new();
        options.insert("operator".into(), Value::from("between"));
        options.insert("group".into(), Value::Int(0));
        let errors = StringFilter.validate_options(options).expect_err("invalid");
        let names: Vec<&str> = errors.iter().map(|e| e.option.as_str()).collect();
        assert_eq!(names, vec!["operator", "group"]);
    }

    #[test]
    fn exposed_filters_need_an_identifier() {
        let mut options = Options::new();
        options.insert("exposed".into(), Value::Bool(true));
        let errors = NumericFilter.validate_options(options).expect_err("invalid");
        assert_eq!(errors[0].option, "identifier");
    }
}
