//! Modal state as reported with `modal` events

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Title or body of the modal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ModalContent {
    /// Plain text. Escaped when rendered as markup.
    Text(String),
    /// An element, carried as its outer HTML.
    Element(String),
}

impl ModalContent {
    pub fn to_html(&self) -> String {
        match self {
            ModalContent::Text(text) => escape_html(text),
            ModalContent::Element(outer_html) => outer_html.clone(),
        }
    }
}

impl Default for ModalContent {
    fn default() -> Self {
        ModalContent::Text(String::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModalProps {
    pub open: bool,
    pub title: ModalContent,
    pub content: ModalContent,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_is_escaped_elements_are_not() {
        let text = ModalContent::Text("<b>Tom & Jerry</b>".into());
        assert_eq!(text.to_html(), "&lt;b&gt;Tom &amp; Jerry&lt;/b&gt;");

        let element = ModalContent::Element("<div class=\"x\">ok</div>".into());
        assert_eq!(element.to_html(), "<div class=\"x\">ok</div>");
    }
}
