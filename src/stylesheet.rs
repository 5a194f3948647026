//! Utility stylesheet support
//!
//! [`collect_used_classes`] gathers the class names the current page uses.
//! With the `stylesheet` feature, [`StylesheetClient`] posts them to an
//! endpoint that compiles the matching utility CSS.

use crate::engine::{ComponentNode, Editor};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

/// Request body: `{ "classes": [...] }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylesheetRequest {
    pub classes: Vec<String>,
}

/// Response body: `{ "css": "..." }`; a missing `css` means empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylesheetResponse {
    #[serde(default)]
    pub css: Option<String>,
}

impl StylesheetResponse {
    pub fn into_css(self) -> String {
        self.css.unwrap_or_default()
    }
}

fn class_attribute() -> Option<&'static Regex> {
    static CLASS_ATTR: OnceLock<Option<Regex>> = OnceLock::new();
    CLASS_ATTR
        .get_or_init(|| Regex::new(r#"class\s*=\s*["']([^"']+)["']"#).ok())
        .as_ref()
}

/// Insertion-ordered set of class names.
#[derive(Default)]
struct ClassSet {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl ClassSet {
    fn add(&mut self, class: &str) {
        let class = class.trim();
        if !class.is_empty() && self.seen.insert(class.to_string()) {
            self.ordered.push(class.to_string());
        }
    }

    fn add_list(&mut self, classes: &str) {
        for class in classes.split_whitespace() {
            self.add(class);
        }
    }

    fn add_from_html(&mut self, html: &str) {
        let Some(pattern) = class_attribute() else {
            return;
        };
        for capture in pattern.captures_iter(html) {
            if let Some(list) = capture.get(1) {
                self.add_list(list.as_str());
            }
        }
    }

    fn add_from_tree(&mut self, root: &ComponentNode) {
        root.walk(&mut |node| {
            for class in &node.classes {
                self.add(class);
            }
            if let Some(list) = node.attributes.get("class") {
                self.add_list(list);
            }
            if node.tag.is_empty() {
                self.add_from_html(&node.content);
            }
        });
    }
}

/// Class names used by the selected page, deduplicated in first-seen order:
/// the component tree first, then any `class="..."` attribute in the
/// rendered HTML.
pub fn collect_used_classes(editor: &dyn Editor) -> Vec<String> {
    let mut classes = ClassSet::default();
    if let Some(root) = editor.wrapper() {
        classes.add_from_tree(&root);
    }
    match editor.html(None) {
        Ok(html) => classes.add_from_html(&html),
        Err(err) => debug!(error = %err, "rendered html unavailable for class scan"),
    }
    classes.ordered
}

#[cfg(feature = "stylesheet")]
mod client {
    use super::{StylesheetRequest, StylesheetResponse};
    use crate::config::BridgeConfig;
    use thiserror::Error;
    use tracing::{debug, warn};

    #[derive(Debug, Error)]
    pub enum StylesheetError {
        #[error("stylesheet request failed: {0}")]
        Http(#[from] reqwest::Error),

        #[error("stylesheet endpoint returned {status}: {body}")]
        Status { status: u16, body: String },
    }

    /// Client for the derived-stylesheet endpoint. No retries.
    #[derive(Debug, Clone)]
    pub struct StylesheetClient {
        http: reqwest::Client,
        endpoint: String,
    }

    impl StylesheetClient {
        pub fn new(endpoint: impl Into<String>) -> Self {
            StylesheetClient {
                http: reqwest::Client::new(),
                endpoint: endpoint.into(),
            }
        }

        /// `None` when no endpoint is configured.
        pub fn from_config(config: &BridgeConfig) -> Option<Self> {
            config.stylesheet_endpoint.as_deref().map(Self::new)
        }

        pub fn endpoint(&self) -> &str {
            &self.endpoint
        }

        pub async fn build_css(&self, classes: &[String]) -> Result<String, StylesheetError> {
            let request = StylesheetRequest {
                classes: classes.to_vec(),
            };
            let response = self.http.post(&self.endpoint).json(&request).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), "stylesheet endpoint rejected request");
                return Err(StylesheetError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            let css = response.json::<StylesheetResponse>().await?.into_css();
            debug!(classes = classes.len(), bytes = css.len(), "stylesheet built");
            Ok(css)
        }
    }
}

#[cfg(feature = "stylesheet")]
pub use client::{StylesheetClient, StylesheetError};
