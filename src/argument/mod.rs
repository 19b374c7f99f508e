#![forbid(unsafe_code)]

//! Argument resolution: path segments, default strategies and failure
//! behaviors.

pub mod provider;
pub mod resolver;

pub use provider::{CurrentUserProvider, DefaultValueProvider, NodeProvider, QueryParamProvider};
pub use resolver::{
    parse_defaults, substitute_tokens, ArgumentResolver, ArgumentSlot, DefaultStrategy,
    ResolvedArgument, ValueSource,
};
