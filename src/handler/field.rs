//! Field handlers: per-row output columns.
//!
//! Rendering runs in a fixed order. The renderer performs the access check,
//! then [`render_field`] reads the raw value, lets the plugin transform it and
//! applies the options every field shares (`trim_length`, `link`,
//! `empty_text`). Escaping happens last, when [`Rendered::into_node`] builds
//! the output leaf.

use time::OffsetDateTime;

use crate::error::OptionError;
use crate::handler::options::{OptionCheck, OptionsExt};
use crate::handler::{Handler, HandlerBinding};
use crate::query::QueryBuilder;
use crate::render::RenderNode;
use crate::types::{Options, Row, Value};

const DEFAULT_DATE_FORMAT: &str = "[year]-[month]-[day]";

/// Output of a field before escaping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rendered {
    /// Nothing to show.
    Empty,
    /// Plain text.
    Text(String),
    /// Link wrapper around a label.
    Link {
        /// Unsanitized href.
        href: String,
        /// Unescaped label.
        label: String,
    },
}

impl Rendered {
    /// Whether nothing would be shown.
    pub fn is_empty(&self) -> bool {
        match self {
            Rendered::Empty => true,
            Rendered::Text(text) => text.is_empty(),
            Rendered::Link { label, .. } => label.is_empty(),
        }
    }

    /// Visible text.
    pub fn text(&self) -> &str {
        match self {
            Rendered::Empty => "",
            Rendered::Text(text) => text,
            Rendered::Link { label, .. } => label,
        }
    }

    /// Escapes into an output node.
    pub fn into_node(self) -> RenderNode {
        match self {
            Rendered::Empty => RenderNode::Empty,
            Rendered::Text(text) => RenderNode::text(&text),
            Rendered::Link { href, label } => RenderNode::link(&href, &label),
        }
    }
}

/// A rendered column.
pub trait FieldHandler: Handler {
    /// Raw value of this field in `row`.
    fn raw_value(&self, binding: &HandlerBinding, row: &Row) -> Value {
        row.get(&binding.row_key()).cloned().unwrap_or_default()
    }

    /// Formats a raw value.
    fn transform(&self, binding: &HandlerBinding, value: &Value, row: &Row) -> Rendered;

    /// Href used when `link` is enabled without an explicit `path`: the
    /// record the row came from, `/{table}/{id}`.
    fn default_href(&self, binding: &HandlerBinding, row: &Row) -> Option<String> {
        let key = format!("{}.{}", binding.alias, record_id_field(binding));
        let id = row.get(&key).filter(|id| !id.is_empty())?;
        Some(format!("/{}/{id}", binding.table))
    }
}

/// Raw value, plugin transform, then the shared field options.
pub fn render_field(handler: &dyn FieldHandler, binding: &HandlerBinding, row: &Row) -> Rendered {
    let raw = handler.raw_value(binding, row);
    let mut rendered = handler.transform(binding, &raw, row);
    let options = &binding.options;

    if let Some(max) = options.uint_opt("trim_length").filter(|&max| max > 0) {
        rendered = trim(rendered, max as usize, options.bool_opt("ellipsis", true));
    }

    if options.bool_opt("link", false) {
        if let Rendered::Text(label) = &rendered {
            let href = match options.str_opt("path") {
                Some(template) => Some(expand_tokens(template, binding, row)),
                None => handler.default_href(binding, row),
            };
            if let Some(href) = href.filter(|href| !href.is_empty()) {
                rendered = Rendered::Link {
                    href,
                    label: label.clone(),
                };
            }
        }
    }

    if rendered.is_empty() {
        if let Some(text) = options.str_opt("empty_text") {
            return Rendered::Text(text.to_owned());
        }
        return Rendered::Empty;
    }
    rendered
}

fn trim(rendered: Rendered, max: usize, ellipsis: bool) -> Rendered {
    let cut = |text: &str| -> String {
        if text.chars().count() <= max {
            return text.to_owned();
        }
        let mut out: String = text.chars().take(max).collect();
        if ellipsis {
            out.push('…');
        }
        out
    };
    match rendered {
        Rendered::Text(text) => Rendered::Text(cut(&text)),
        Rendered::Link { href, label } => Rendered::Link {
            href,
            label: cut(&label),
        },
        Rendered::Empty => Rendered::Empty,
    }
}

/// Replaces `{key}` tokens with row values. A key is looked up as given,
/// then qualified with the handler's own alias.
pub fn expand_tokens(template: &str, binding: &HandlerBinding, row: &Row) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        let value = row
            .get(key)
            .or_else(|| row.get(&format!("{}.{key}", binding.alias)));
        match value {
            Some(value) => out.push_str(&value.to_string()),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Column identifying the record a field belongs to.
pub fn record_id_field(binding: &HandlerBinding) -> &str {
    binding.options.str_opt("id_field").unwrap_or("id")
}

/// Adds the handler's own column to the selection, plus the record id when a
/// link without `path` needs it.
pub fn select_field(binding: &HandlerBinding, builder: &mut QueryBuilder) {
    builder.add_field(&binding.alias, &binding.field);
    let options = &binding.options;
    if options.bool_opt("link", false) && options.str_opt("path").is_none() {
        builder.add_field(&binding.alias, record_id_field(binding));
    }
}

fn check_common(check: &mut OptionCheck<'_>) {
    check.string("label");
    check.boolean("exclude");
    check.string("empty_text");
    check.boolean("hide_empty");
    check.uint("trim_length");
    check.boolean("ellipsis");
    check.boolean("link");
    check.string("path");
    check.string("id_field");
}

fn validate_with(
    options: Options,
    extra: impl FnOnce(&mut OptionCheck<'_>),
) -> Result<Options, Vec<OptionError>> {
    let mut check = OptionCheck::new(&options);
    check_common(&mut check);
    extra(&mut check);
    match check.finish(Options::new()) {
        Ok(_) => Ok(options),
        Err(errors) => Err(errors),
    }
}

/// Value as text.
#[derive(Debug, Default)]
pub struct StandardField;

impl Handler for StandardField {
    fn plugin_id(&self) -> &'static str {
        "standard"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        validate_with(options, |_| {})
    }

    fn query(&self, binding: &HandlerBinding, builder: &mut QueryBuilder) {
        select_field(binding, builder);
    }
}

impl FieldHandler for StandardField {
    fn transform(&self, _binding: &HandlerBinding, value: &Value, _row: &Row) -> Rendered {
        if value.is_empty() {
            Rendered::Empty
        } else {
            Rendered::Text(value.to_string())
        }
    }
}

/// Numbers with precision, separators and affixes.
#[derive(Debug, Default)]
pub struct NumericField;

impl Handler for NumericField {
    fn plugin_id(&self) -> &'static str {
        "numeric"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        validate_with(options, |check| {
            check.uint("precision");
            check.string("prefix");
            check.string("suffix");
            check.string("thousand_separator");
        })
    }

    fn query(&self, binding: &HandlerBinding, builder: &mut QueryBuilder) {
        select_field(binding, builder);
    }
}

impl FieldHandler for NumericField {
    fn transform(&self, binding: &HandlerBinding, value: &Value, _row: &Row) -> Rendered {
        let options = &binding.options;
        let number = match (value, options.uint_opt("precision")) {
            (Value::Null, _) => return Rendered::Empty,
            (Value::Int(v), None) => v.to_string(),
            (other, precision) => match other.as_f64() {
                Some(v) => format!("{v:.*}", precision.unwrap_or(0) as usize),
                None => return Rendered::Text(other.to_string()),
            },
        };
        let number = match options.str_opt("thousand_separator") {
            Some(sep) if !sep.is_empty() => group_thousands(&number, sep),
            _ => number,
        };
        Rendered::Text(format!(
            "{}{number}{}",
            options.str_opt("prefix").unwrap_or(""),
            options.str_opt("suffix").unwrap_or("")
        ))
    }
}

fn group_thousands(number: &str, sep: &str) -> String {
    let (sign, unsigned) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (unsigned, None),
    };
    let mut grouped = String::new();
    for (idx, ch) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push_str(sep);
        }
        grouped.push(ch);
    }
    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Flags rendered as yes/no, true/false or on/off.
#[derive(Debug, Default)]
pub struct BooleanField;

impl Handler for BooleanField {
    fn plugin_id(&self) -> &'static str {
        "boolean"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        validate_with(options, |check| {
            check.one_of("format", &["yes-no", "true-false", "on-off"]);
        })
    }

    fn query(&self, binding: &HandlerBinding, builder: &mut QueryBuilder) {
        select_field(binding, builder);
    }
}

impl FieldHandler for BooleanField {
    fn transform(&self, binding: &HandlerBinding, value: &Value, _row: &Row) -> Rendered {
        if value.is_null() {
            return Rendered::Empty;
        }
        let Some(flag) = value.as_bool() else {
            return Rendered::Text(value.to_string());
        };
        let (yes, no) = match binding.options.str_opt("format") {
            Some("true-false") => ("True", "False"),
            Some("on-off") => ("On", "Off"),
            _ => ("Yes", "No"),
        };
        let text = if flag { yes } else { no };
        Rendered::Text(text.to_owned())
    }
}

/// Timestamps formatted with a `time` format description, in UTC.
#[derive(Debug, Default)]
pub struct DateField;

impl Handler for DateField {
    fn plugin_id(&self) -> &'static str {
        "date"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        validate_with(options, |check| {
            if let Some(format) = check.string("format") {
                if let Err(err) = time::format_description::parse_borrowed::<2>(format) {
                    check.fail("format", format!("invalid format description: {err}"));
                }
            }
        })
    }

    fn query(&self, binding: &HandlerBinding, builder: &mut QueryBuilder) {
        select_field(binding, builder);
    }
}

impl FieldHandler for DateField {
    fn transform(&self, binding: &HandlerBinding, value: &Value, _row: &Row) -> Rendered {
        let Some(secs) = value.as_i64() else {
            return if value.is_empty() {
                Rendered::Empty
            } else {
                Rendered::Text(value.to_string())
            };
        };
        let format = binding
            .options
            .str_opt("format")
            .unwrap_or(DEFAULT_DATE_FORMAT);
        let formatted = OffsetDateTime::from_unix_timestamp(secs)
            .ok()
            .and_then(|dt| {
                let items = time::format_description::parse_borrowed::<2>(format).ok()?;
                dt.format(&items).ok()
            });
        match formatted {
            Some(text) => Rendered::Text(text),
            None => Rendered::Text(secs.to_string()),
        }
    }
}

/// Entity-reference style label, linked to its record by default.
#[derive(Debug, Default)]
pub struct LabelField;

impl Handler for LabelField {
    fn plugin_id(&self) -> &'static str {
        "label"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        validate_with(options, |_| {})
    }

    fn query(&self, binding: &HandlerBinding, builder: &mut QueryBuilder) {
        select_field(binding, builder);
        builder.add_field(&binding.alias, record_id_field(binding));
    }
}

impl FieldHandler for LabelField {
    fn transform(&self, _binding: &HandlerBinding, value: &Value, _row: &Row) -> Rendered {
        if value.is_empty() {
            Rendered::Empty
        } else {
            Rendered::Text(value.to_string())
        }
    }
}
