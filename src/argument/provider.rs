//! Default-value providers: named sources consulted when the path carries no
//! value for an argument.

use crate::context::RequestContext;
use crate::handler::options::OptionsExt;
use crate::types::{Options, Value};

/// Computes a fallback argument value from the request.
pub trait DefaultValueProvider: Send + Sync {
    /// Id strategies refer to.
    fn id(&self) -> &'static str;

    /// The value, or `None` when the request carries nothing usable.
    fn provide(&self, ctx: &RequestContext, options: &Options) -> Option<Value>;
}

/// The current `node` object, else the id in a `node/<n>` path.
#[derive(Debug, Default)]
pub struct NodeProvider;

impl DefaultValueProvider for NodeProvider {
    fn id(&self) -> &'static str {
        "node"
    }

    fn provide(&self, ctx: &RequestContext, _options: &Options) -> Option<Value> {
        if let Some(node) = ctx.objects.get("node").filter(|v| !v.is_null()) {
            return Some(node.clone());
        }
        match (ctx.segment(0), ctx.segment(1)) {
            (Some("node"), Some(id)) => id.parse::<i64>().ok().map(Value::Int),
            _ => None,
        }
    }
}

/// The viewing user's id; nothing for anonymous requests.
#[derive(Debug, Default)]
pub struct CurrentUserProvider;

impl DefaultValueProvider for CurrentUserProvider {
    fn id(&self) -> &'static str {
        "current_user"
    }

    fn provide(&self, ctx: &RequestContext, _options: &Options) -> Option<Value> {
        ctx.user.as_ref().map(|user| Value::Int(user.id))
    }
}

/// A query-string parameter named by the `param` option.
#[derive(Debug, Default)]
pub struct QueryParamProvider;

impl DefaultValueProvider for QueryParamProvider {
    fn id(&self) -> &'static str {
        "query_param"
    }

    fn provide(&self, ctx: &RequestContext, options: &Options) -> Option<Value> {
        let param = options.str_opt("param")?;
        ctx.query
            .get(param)
            .filter(|raw| !raw.is_empty())
            .map(|raw| Value::from(raw.as_str()))
    }
}
