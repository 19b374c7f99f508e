//! Escaped, structured output tree consumed by the presentation layer.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::render::escape::{sanitize_href, Escaped};

/// Attribute map; values are escaped on insertion.
pub type Attributes = BTreeMap<&'static str, Escaped>;

/// Output unit: escaped text, an element with escaped attributes, or a
/// fragment of children. There is no variant that holds unescaped text.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderNode {
    /// Nothing to render.
    #[default]
    Empty,
    /// Escaped text leaf.
    Text {
        /// Escaped content.
        text: Escaped,
    },
    /// Structured element.
    Element {
        /// Element name, fixed at compile time.
        tag: &'static str,
        /// Escaped attribute values.
        attributes: Attributes,
        /// Child nodes.
        children: Vec<RenderNode>,
    },
    /// Children without a wrapper.
    Fragment {
        /// Child nodes.
        children: Vec<RenderNode>,
    },
}

impl RenderNode {
    /// Escaped text leaf built from raw text.
    pub fn text(raw: &str) -> Self {
        RenderNode::Text {
            text: Escaped::new(raw),
        }
    }

    /// Element without attributes.
    pub fn element(tag: &'static str, children: Vec<RenderNode>) -> Self {
        RenderNode::Element {
            tag,
            attributes: Attributes::new(),
            children,
        }
    }

    /// Fragment of children.
    pub fn fragment(children: Vec<RenderNode>) -> Self {
        RenderNode::Fragment { children }
    }

    /// Link wrapper: the shell is trusted markup, the label is escaped and the
    /// href is sanitized and escaped as an attribute.
    pub fn link(href: &str, label: &str) -> Self {
        RenderNode::element("a", vec![RenderNode::text(label)])
            .with_attr("href", &sanitize_href(href))
    }

    /// Adds an attribute, escaping its value. No-op on non-elements.
    pub fn with_attr(mut self, name: &'static str, raw: &str) -> Self {
        if let RenderNode::Element { attributes, .. } = &mut self {
            attributes.insert(name, Escaped::new(raw));
        }
        self
    }

    /// Adds a `class` attribute.
    pub fn with_class(self, class: &str) -> Self {
        self.with_attr("class", class)
    }

    /// Whether the node renders nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            RenderNode::Empty => true,
            RenderNode::Text { text } => text.is_empty(),
            RenderNode::Fragment { children } => children.iter().all(RenderNode::is_empty),
            RenderNode::Element { .. } => false,
        }
    }

    /// Child nodes of elements and fragments.
    pub fn children(&self) -> &[RenderNode] {
        match self {
            RenderNode::Element { children, .. } | RenderNode::Fragment { children } => children,
            _ => &[],
        }
    }

    /// Attribute value of an element.
    pub fn attr(&self, name: &str) -> Option<&Escaped> {
        match self {
            RenderNode::Element { attributes, .. } => attributes.get(name),
            _ => None,
        }
    }

    /// Element tag, if this is an element.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            RenderNode::Element { tag, .. } => Some(*tag),
            _ => None,
        }
    }

    /// Every text leaf in document order.
    pub fn text_leaves(&self) -> Vec<&Escaped> {
        let mut out = Vec::new();
        collect_text(self, &mut out);
        out
    }

    /// Serializes the tree as markup.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_html(self, &mut out);
        out
    }
}

fn collect_text<'a>(node: &'a RenderNode, out: &mut Vec<&'a Escaped>) {
    match node {
        RenderNode::Text { text } => out.push(text),
        RenderNode::Element { children, .. } | RenderNode::Fragment { children } => {
            for child in children {
                collect_text(child, out);
            }
        }
        RenderNode::Empty => {}
    }
}

fn write_html(node: &RenderNode, out: &mut String) {
    match node {
        RenderNode::Empty => {}
        RenderNode::Text { text } => out.push_str(text.as_str()),
        RenderNode::Element {
            tag,
            attributes,
            children,
        } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attributes {
                let _ = write!(out, " {name}=\"{value}\"");
            }
            out.push('>');
            for child in children {
                write_html(child, out);
            }
            let _ = write!(out, "</{tag}>");
        }
        RenderNode::Fragment { children } => {
            for child in children {
                write_html(child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_escapes_label_and_href() {
        let node = RenderNode::link("/search?q=a&b", "<b>Bold</b>");
        assert_eq!(
            node.to_html(),
            "<a href=\"/search?q=a&amp;b\">&lt;b&gt;Bold&lt;/b&gt;</a>"
        );
    }

    #[test]
    fn script_href_becomes_anchor() {
        let node = RenderNode::link("javascript:alert(1)", "x");
        assert_eq!(node.attr("href").map(Escaped::as_str), Some("#"));
    }

    #[test]
    fn fragments_of_empties_are_empty() {
        let node = RenderNode::fragment(vec![RenderNode::Empty, RenderNode::text("")]);
        assert!(node.is_empty());
        assert!(!RenderNode::element("ul", Vec::new()).is_empty());
    }
}
