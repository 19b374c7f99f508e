#![forbid(unsafe_code)]

//! Output tree, escaping, and the field/row/style rendering pipeline.

/// Single-pass escaping and href sanitizing.
pub mod escape;
/// The escaped output tree.
pub mod node;
/// Field, row and style orchestration.
pub mod renderer;

pub use escape::{escape, sanitize_href, unescape, Escaped};
pub use node::{Attributes, RenderNode};
pub use renderer::{
    css_class, AccessChecker, FieldPermissions, FieldSlot, RenderedField, RenderedRow, Renderer,
};
