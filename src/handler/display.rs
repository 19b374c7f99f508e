//! Display handlers: the outer wrapper of a rendered view.

use crate::error::OptionError;
use crate::handler::options::{OptionCheck, OptionsExt};
use crate::handler::{Handler, HandlerBinding};
use crate::query::BoolOp;
use crate::render::{css_class, RenderNode};
use crate::types::{Options, Value};

/// Pieces a display wraps.
#[derive(Clone, Debug, Default)]
pub struct DisplayParts {
    /// View id, used for wrapper classes.
    pub view: String,
    /// Display id, used for wrapper classes.
    pub display: String,
    /// Title after token substitution, unescaped.
    pub title: Option<String>,
    /// Styled rows, or the empty text when there are none.
    pub body: RenderNode,
    /// Pager controls.
    pub pager: RenderNode,
}

/// Outer wrapper.
pub trait DisplayHandler: Handler {
    /// Whether the display shows pager controls.
    fn renders_pager(&self) -> bool {
        true
    }

    /// Wraps the rendered body.
    fn render(&self, binding: &HandlerBinding, parts: DisplayParts) -> RenderNode;
}

/// Option checks shared by every display plugin; `filter_groups` is parsed
/// by [`crate::view::FilterGroups`].
pub(crate) fn check_display_options(options: Options) -> Result<Options, Vec<OptionError>> {
    let mut check = OptionCheck::new(&options);
    check.string("title");
    check.string("empty_text");
    check.string("path");
    check.string("class");
    if let Some(groups) = options.get("filter_groups") {
        if let Err(message) = check_filter_groups(groups) {
            check.fail("filter_groups", message);
        }
    }
    check.finish(options.clone())
}

fn check_filter_groups(value: &Value) -> Result<(), String> {
    let map = value.as_map().ok_or("must be a table")?;
    if let Some(op) = map.get("operator") {
        op.as_str()
            .and_then(BoolOp::parse)
            .ok_or("operator must be and/or")?;
    }
    if let Some(groups) = map.get("groups") {
        let groups = groups.as_map().ok_or("groups must be a table")?;
        for (id, op) in groups {
            if id.parse::<u32>().map_or(true, |id| id == 0) {
                return Err(format!("group id '{id}' must be a positive integer"));
            }
            op.as_str()
                .and_then(BoolOp::parse)
                .ok_or_else(|| format!("group {id} operator must be and/or"))?;
        }
    }
    Ok(())
}

fn wrapper(binding: &HandlerBinding, parts: &DisplayParts, kind: &str) -> RenderNode {
    let mut class = format!(
        "view view-{} view-display-{} view-{kind}",
        css_class(&parts.view),
        css_class(&parts.display)
    );
    if let Some(extra) = binding.options.str_opt("class") {
        class.push(' ');
        class.push_str(extra);
    }
    RenderNode::element("div", Vec::new()).with_class(&class)
}

fn assemble(shell: RenderNode, children: Vec<RenderNode>) -> RenderNode {
    match shell {
        RenderNode::Element {
            tag, attributes, ..
        } => RenderNode::Element {
            tag,
            attributes,
            children: children.into_iter().filter(|c| !c.is_empty()).collect(),
        },
        other => other,
    }
}

fn heading(tag: &'static str, title: Option<&str>) -> RenderNode {
    match title {
        Some(title) if !title.is_empty() => RenderNode::element(tag, vec![RenderNode::text(title)]),
        _ => RenderNode::Empty,
    }
}

/// Plain embeddable display.
#[derive(Debug, Default)]
pub struct DefaultDisplay;

impl Handler for DefaultDisplay {
    fn plugin_id(&self) -> &'static str {
        "default"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        check_display_options(options)
    }
}

impl DisplayHandler for DefaultDisplay {
    fn render(&self, binding: &HandlerBinding, parts: DisplayParts) -> RenderNode {
        let shell = wrapper(binding, &parts, "default");
        assemble(
            shell,
            vec![
                heading("h2", parts.title.as_deref()),
                RenderNode::element("div", vec![parts.body]).with_class("view-content"),
                parts.pager,
            ],
        )
    }
}

/// Full page with its own path and a top-level heading.
#[derive(Debug, Default)]
pub struct PageDisplay;

impl Handler for PageDisplay {
    fn plugin_id(&self) -> &'static str {
        "page"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        check_display_options(options)
    }
}

impl DisplayHandler for PageDisplay {
    fn render(&self, binding: &HandlerBinding, parts: DisplayParts) -> RenderNode {
        let shell = wrapper(binding, &parts, "page");
        assemble(
            shell,
            vec![
                heading("h1", parts.title.as_deref()),
                RenderNode::element("div", vec![parts.body]).with_class("view-content"),
                parts.pager,
            ],
        )
    }
}

/// Sidebar block; never shows pager controls.
#[derive(Debug, Default)]
pub struct BlockDisplay;

impl Handler for BlockDisplay {
    fn plugin_id(&self) -> &'static str {
        "block"
    }

    fn validate_options(&self, options: Options) -> Result<Options, Vec<OptionError>> {
        check_display_options(options)
    }
}

impl DisplayHandler for BlockDisplay {
    fn renders_pager(&self) -> bool {
        false
    }

    fn render(&self, binding: &HandlerBinding, parts: DisplayParts) -> RenderNode {
        let shell = wrapper(binding, &parts, "block");
        assemble(
            shell,
            vec![
                heading("h2", parts.title.as_deref()).with_class("block-title"),
                RenderNode::element("div", vec![parts.body]).with_class("view-content"),
            ],
        )
    }
}
