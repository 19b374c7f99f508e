//! Resolves argument handlers against a request, in declared order.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::context::RequestContext;
use crate::error::{ArgumentFailure, ArgumentResolutionError};
use crate::handler::options::OptionsExt;
use crate::handler::{ArgumentHandler, ArgumentValue, HandlerBinding};
use crate::plugin::PluginRegistry;
use crate::types::{Options, Value};

/// Fallback consulted when the path carries no value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DefaultStrategy {
    /// A constant.
    Fixed {
        /// The value.
        value: Value,
    },
    /// A current-context object of the named type.
    ContextObject {
        /// Object type, e.g. `node`.
        object: String,
    },
    /// A registered default-value provider.
    Provider {
        /// Provider id.
        id: String,
        /// Options handed to the provider.
        #[serde(default)]
        options: Options,
    },
}

/// Parses the `defaults` option: a list of strategy tables.
pub fn parse_defaults(value: &Value) -> Result<Vec<DefaultStrategy>, String> {
    let json = serde_json::to_value(value).map_err(|err| err.to_string())?;
    serde_json::from_value(json).map_err(|err| format!("invalid default strategy: {err}"))
}

/// Where a resolved value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// The path segment.
    Path,
    /// The path segment equalled the exception value.
    Exception,
    /// A default strategy.
    Default,
    /// The `all` failure behavior.
    Wildcard,
}

/// Outcome of one argument.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedArgument {
    /// Zero-based position among the display's arguments.
    pub position: usize,
    /// Handler id.
    pub field: String,
    /// Raw text the value was parsed from.
    pub raw: Option<String>,
    /// Parsed value.
    pub value: ArgumentValue,
    /// Title after token substitution, unescaped.
    pub title: String,
    /// Summary form.
    pub summary: String,
    /// Where the value came from.
    pub source: ValueSource,
}

impl ResolvedArgument {
    /// The `!N` token: raw text, else the parsed value.
    pub fn raw_token(&self) -> String {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => self.value.to_string(),
        }
    }
}

/// An argument handler with its binding.
#[derive(Clone, Copy)]
pub struct ArgumentSlot<'a> {
    /// Binding.
    pub binding: &'a HandlerBinding,
    /// Handler.
    pub handler: &'a dyn ArgumentHandler,
}

/// Resolves arguments for one request.
pub struct ArgumentResolver<'a> {
    registry: &'a PluginRegistry,
    ctx: &'a RequestContext,
    offset: usize,
}

impl<'a> ArgumentResolver<'a> {
    /// Arguments read path segments starting at `offset`.
    pub fn new(registry: &'a PluginRegistry, ctx: &'a RequestContext, offset: usize) -> Self {
        Self {
            registry,
            ctx,
            offset,
        }
    }

    /// Resolves every slot in order; stops at the first argument whose
    /// failure behavior ends the execution.
    pub fn resolve(
        &self,
        slots: &[ArgumentSlot<'_>],
    ) -> Result<Vec<ResolvedArgument>, ArgumentResolutionError> {
        let mut resolved: Vec<ResolvedArgument> = Vec::with_capacity(slots.len());
        for (position, slot) in slots.iter().enumerate() {
            let argument = self.resolve_one(position, slot, &resolved)?;
            info!(
                position,
                field = %argument.field,
                value = %argument.value,
                source = ?argument.source,
                "argument.resolve"
            );
            resolved.push(argument);
        }
        Ok(resolved)
    }

    fn resolve_one(
        &self,
        position: usize,
        slot: &ArgumentSlot<'_>,
        earlier: &[ResolvedArgument],
    ) -> Result<ResolvedArgument, ArgumentResolutionError> {
        let binding = slot.binding;
        let exception = binding.options.str_opt("exception").unwrap_or("all");
        let segment = self.ctx.segment(self.offset + position);

        let (raw, parsed, source) = match segment {
            Some(raw) if raw == exception => {
                (Some(raw.to_owned()), Some(ArgumentValue::All), ValueSource::Exception)
            }
            Some(raw) => (
                Some(raw.to_owned()),
                slot.handler.accept(binding, raw),
                ValueSource::Path,
            ),
            None => match self.default_value(binding) {
                Some(value) => {
                    let raw = value.to_string();
                    let parsed = slot.handler.accept(binding, &raw);
                    (Some(raw), parsed, ValueSource::Default)
                }
                None => (None, None, ValueSource::Default),
            },
        };

        let (value, source) = match parsed {
            Some(value) => (value, source),
            None => {
                let failure = match binding.options.str_opt("failure").unwrap_or("all") {
                    "empty" => Some(ArgumentFailure::RenderNothing),
                    "not_found" => Some(ArgumentFailure::NotFound),
                    _ => None,
                };
                if let Some(failure) = failure {
                    debug!(position, field = %binding.id, ?failure, ?raw, "argument.unresolved");
                    return Err(ArgumentResolutionError {
                        position,
                        field: binding.field_key(),
                        failure,
                    });
                }
                (ArgumentValue::All, ValueSource::Wildcard)
            }
        };

        let mut argument = ResolvedArgument {
            position,
            field: binding.id.clone(),
            raw,
            title: slot.handler.title(binding, &value),
            summary: slot.handler.summary(binding, &value),
            value,
            source,
        };
        if let Some(template) = binding.options.str_opt("title") {
            // The argument itself is addressable as its own position's token.
            let mut visible = earlier.to_vec();
            visible.push(argument.clone());
            argument.title = substitute_tokens(template, &visible);
        }
        Ok(argument)
    }

    fn default_value(&self, binding: &HandlerBinding) -> Option<Value> {
        let strategies = binding
            .options
            .get("defaults")
            .and_then(|value| parse_defaults(value).ok())?;
        strategies.iter().find_map(|strategy| {
            let value = match strategy {
                DefaultStrategy::Fixed { value } => Some(value.clone()),
                DefaultStrategy::ContextObject { object } => {
                    self.ctx.objects.get(object).cloned()
                }
                DefaultStrategy::Provider { id, options } => {
                    let provider = self.registry.default_provider(id);
                    if provider.is_none() {
                        debug!(provider = %id, "argument.provider.missing");
                    }
                    provider.and_then(|provider| provider.provide(self.ctx, options))
                }
            };
            value.filter(|value| !value.is_null())
        })
    }
}

/// Replaces `%N` (title) and `!N` (raw value) tokens of the 1-based
/// arguments in `args`; other tokens stay literal.
pub fn substitute_tokens(template: &str, args: &[ResolvedArgument]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if c != '%' && c != '!' {
            out.push(c);
            continue;
        }
        let start = idx + c.len_utf8();
        let mut end = start;
        while let Some(&(next, d)) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            end = next + d.len_utf8();
            chars.next();
        }
        let digits = &template[start..end];
        let argument = digits
            .parse::<usize>()
            .ok()
            .filter(|&n| n >= 1)
            .and_then(|n| args.get(n - 1));
        match argument {
            Some(argument) if c == '%' => out.push_str(&argument.title),
            Some(argument) => out.push_str(&argument.raw_token()),
            None => {
                out.push(c);
                out.push_str(digits);
            }
        }
    }
    out
}
