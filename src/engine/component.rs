//! Component tree as reported by the engine
//!
//! Only the parts the bridges read: tag, class list, attributes, raw
//! content and children. Rendering is a plain serializer with attribute
//! escaping; layout semantics belong to the engine.

use super::modal::escape_html;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentNode {
    /// Empty tag renders `content` verbatim with no wrapping element
    pub tag: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub children: Vec<ComponentNode>,
}

const VOID_TAGS: &[&str] = &["br", "hr", "img", "input", "link", "meta", "source"];

impl ComponentNode {
    pub fn element(tag: impl Into<String>) -> Self {
        ComponentNode {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// Markup fragment kept as-is.
    pub fn raw(html: impl Into<String>) -> Self {
        ComponentNode {
            content: html.into(),
            ..Default::default()
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_child(mut self, child: ComponentNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        if self.tag.is_empty() {
            out.push_str(&self.content);
            for child in &self.children {
                child.render_into(out);
            }
            return;
        }

        out.push('<');
        out.push_str(&self.tag);
        if !self.classes.is_empty() {
            out.push_str(" class=\"");
            out.push_str(&escape_html(&self.classes.join(" ")));
            out.push('"');
        }
        for (key, value) in &self.attributes {
            if key == "class" && !self.classes.is_empty() {
                continue;
            }
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape_html(value));
            out.push('"');
        }
        out.push('>');

        if VOID_TAGS.contains(&self.tag.as_str()) {
            return;
        }
        out.push_str(&self.content);
        for child in &self.children {
            child.render_into(out);
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }

    /// Depth-first, parent before children.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a ComponentNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_nested_markup() {
        let node = ComponentNode::element("section")
            .with_class("hero")
            .with_class("p-4")
            .with_attribute("data-id", "a\"b")
            .with_child(ComponentNode::element("h1").with_content("Hi"))
            .with_child(ComponentNode::element("img").with_attribute("src", "x.png"));
        assert_eq!(
            node.to_html(),
            "<section class=\"hero p-4\" data-id=\"a&quot;b\"><h1>Hi</h1><img src=\"x.png\"></section>"
        );
    }

    #[test]
    fn test_raw_node_renders_verbatim() {
        assert_eq!(ComponentNode::raw("<p>x</p>").to_html(), "<p>x</p>");
    }

    #[test]
    fn test_walk_visits_parent_first() {
        let node = ComponentNode::element("div")
            .with_child(ComponentNode::element("span").with_child(ComponentNode::element("b")));
        let mut tags = Vec::new();
        node.walk(&mut |n| tags.push(n.tag.clone()));
        assert_eq!(tags, vec!["div", "span", "b"]);
    }
}
