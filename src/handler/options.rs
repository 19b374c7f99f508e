//! Option merging and the checks shared by handler `validate_options`
//! implementations.

use crate::error::OptionError;
use crate::types::{Options, Value};

/// Overlays `configured` on top of a descriptor's `defaults`.
pub fn merge_defaults(defaults: &Options, configured: &Options) -> Options {
    let mut merged = defaults.clone();
    for (key, value) in configured {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Typed reads over an options map.
pub trait OptionsExt {
    /// String option, if present and a string.
    fn str_opt(&self, key: &str) -> Option<&str>;
    /// Boolean option, falling back to `default`.
    fn bool_opt(&self, key: &str, default: bool) -> bool;
    /// Non-negative integer option.
    fn uint_opt(&self, key: &str) -> Option<u64>;
}

impl OptionsExt for Options {
    fn str_opt(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn bool_opt(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    fn uint_opt(&self, key: &str) -> Option<u64> {
        self.get(key)
            .and_then(Value::as_i64)
            .and_then(|v| u64::try_from(v).ok())
    }
}

/// Collects every option problem instead of stopping at the first one.
///
/// ```
/// use viewkit::handler::options::OptionCheck;
/// use viewkit::types::{Options, Value};
///
/// let mut options = Options::new();
/// options.insert("precision".into(), Value::from("two"));
/// let mut check = OptionCheck::new(&options);
/// check.uint("precision");
/// assert!(check.finish(options.clone()).is_err());
/// ```
#[derive(Debug)]
pub struct OptionCheck<'a> {
    options: &'a Options,
    errors: Vec<OptionError>,
}

impl<'a> OptionCheck<'a> {
    /// Starts checking `options`.
    pub fn new(options: &'a Options) -> Self {
        Self {
            options,
            errors: Vec::new(),
        }
    }

    fn present(&self, key: &str) -> Option<&'a Value> {
        self.options.get(key).filter(|value| !value.is_null())
    }

    /// Records an error unconditionally.
    pub fn fail(&mut self, key: &str, message: impl Into<String>) {
        self.errors.push(OptionError::new(key, message));
    }

    /// Optional string option.
    pub fn string(&mut self, key: &str) -> Option<&'a str> {
        let value = self.present(key)?;
        match value.as_str() {
            Some(s) => Some(s),
            None => {
                self.fail(key, "must be a string");
                None
            }
        }
    }

    /// Optional string option that must be present.
    pub fn required_string(&mut self, key: &str) -> Option<&'a str> {
        if self.present(key).is_none() {
            self.fail(key, "is required");
            return None;
        }
        self.string(key)
    }

    /// Optional boolean option.
    pub fn boolean(&mut self, key: &str) -> Option<bool> {
        let value = self.present(key)?;
        match value.as_bool() {
            Some(b) => Some(b),
            None => {
                self.fail(key, "must be a boolean");
                None
            }
        }
    }

    /// Optional non-negative integer option.
    pub fn uint(&mut self, key: &str) -> Option<u64> {
        let value = self.present(key)?;
        match value.as_i64().and_then(|v| u64::try_from(v).ok()) {
            Some(v) => Some(v),
            None => {
                self.fail(key, "must be a non-negative integer");
                None
            }
        }
    }

    /// Optional string option restricted to `allowed`.
    pub fn one_of(&mut self, key: &str, allowed: &[&str]) -> Option<&'a str> {
        let value = self.string(key)?;
        if allowed.contains(&value) {
            Some(value)
        } else {
            self.fail(key, format!("must be one of: {}", allowed.join(", ")));
            None
        }
    }

    /// Whether any error was recorded so far.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `validated` when no error was recorded.
    pub fn finish(self, validated: Options) -> Result<Options, Vec<OptionError>> {
        if self.errors.is_empty() {
            Ok(validated)
        } else {
            Err(self.errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(pairs: &[(&str, Value)]) -> Options {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn configured_options_override_defaults() {
        let defaults = opts(&[("link", Value::Bool(false)), ("ellipsis", Value::Bool(true))]);
        let merged = merge_defaults(&defaults, &opts(&[("link", Value::Bool(true))]));
        assert_eq!(merged["link"], Value::Bool(true));
        assert_eq!(merged["ellipsis"], Value::Bool(true));
    }

    #[test]
    fn every_problem_is_reported() {
        let options = opts(&[
            ("precision", Value::from(-1i64)),
            ("format", Value::from("sideways")),
            ("label", Value::Int(3)),
        ]);
        let mut check = OptionCheck::new(&options);
        check.uint("precision");
        check.one_of("format", &["yes-no", "true-false"]);
        check.string("label");
        check.string("absent");
        let errors = check.finish(options.clone()).expect_err("three errors");
        let names: Vec<&str> = errors.iter().map(|e| e.option.as_str()).collect();
        assert_eq!(names, vec!["precision", "format", "label"]);
    }

    #[test]
    fn textual_numbers_and_flags_are_accepted() {
        let options = opts(&[("trim_length", Value::from("40")), ("link", Value::from("yes"))]);
        assert_eq!(options.uint_opt("trim_length"), Some(40));
        assert!(options.bool_opt("link", false));
        assert!(!options.bool_opt("missing", false));
    }
}
