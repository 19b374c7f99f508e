#![forbid(unsafe_code)]

//! Plugin discovery: descriptors keyed by `(type, id)`, registered
//! explicitly at startup.

/// The registry and its built-in plugin set.
pub mod registry;

pub use registry::{PluginDescriptor, PluginRegistry, ResolvedPlugin};
