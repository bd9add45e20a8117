//! Page handle abstraction
//!
//! Every analysis component (selector engine, context extractor, readiness
//! skeleton scan) reads the DOM through [`PageHandle`] instead of touching a
//! browser directly. [`Document`] is the in-process implementation; a live
//! Chrome page is turned into one with [`Document::from_snapshot`].

pub mod document;
pub mod query;
pub mod shared;
pub mod snapshot;
pub mod xpath;

pub use document::Document;
pub use shared::SharedDocument;
pub use snapshot::{DocumentSnapshot, SnapshotNode};

use crate::error::SelectorError;
use serde::{Deserialize, Serialize};

/// Index of a node inside a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

/// Viewport-relative layout box, as returned by `getBoundingClientRect()`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Load state of an `<img>`, `<iframe>` or `<video>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceState {
    /// Still fetching; neither load nor error has fired
    Pending,
    /// Image decoded, iframe document complete, or video has current data
    Loaded,
    /// The error event fired
    Failed,
    /// Iframe whose document cannot be inspected from this origin
    CrossOrigin,
}

impl ResourceState {
    pub fn is_settled(self) -> bool {
        !matches!(self, ResourceState::Pending)
    }
}

/// Read-only DOM capability consumed by the analysis components.
///
/// Tag names are lowercase. Text accessors return raw text; callers normalize
/// whitespace themselves.
pub trait PageHandle {
    /// The `<html>` element
    fn document_element(&self) -> Option<NodeId>;

    fn body(&self) -> Option<NodeId>;

    /// Lowercase tag name, `None` for text nodes and unknown ids
    fn tag_name(&self, node: NodeId) -> Option<String>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// All attributes in source order
    fn attributes(&self, node: NodeId) -> Vec<(String, String)>;

    fn parent_element(&self, node: NodeId) -> Option<NodeId>;

    fn element_children(&self, node: NodeId) -> Vec<NodeId>;

    /// Concatenated text of the node's direct text children only
    fn own_text(&self, node: NodeId) -> String;

    /// Text of the node and all its descendants (`textContent`)
    fn text_content(&self, node: NodeId) -> String;

    /// Whether the node is attached to the document
    fn is_connected(&self, node: NodeId) -> bool;

    fn bounding_box(&self, node: NodeId) -> Rect;

    fn computed_style(&self, node: NodeId, property: &str) -> Option<String>;

    /// Load state for resource elements, `None` for everything else
    fn resource_state(&self, node: NodeId) -> Option<ResourceState>;

    /// Connected elements in document order
    fn elements(&self) -> Vec<NodeId>;

    /// Non-empty `id` attribute
    fn element_id(&self, node: NodeId) -> Option<String> {
        self.attribute(node, "id")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }

    fn class_list(&self, node: NodeId) -> Vec<String> {
        self.attribute(node, "class")
            .map(|classes| classes.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, SelectorError> {
        query::select_all(self, selector)
    }

    fn evaluate_xpath(&self, expression: &str) -> Result<Vec<NodeId>, SelectorError> {
        xpath::evaluate(self, expression)
    }
}

/// Collapse runs of whitespace into single spaces and trim the ends
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 1-based position of `node` among its parent's children with the same tag
pub fn position_of_type<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> Option<(usize, usize)> {
    let tag = page.tag_name(node)?;
    let parent = page.parent_element(node)?;
    let same_tag: Vec<NodeId> = page
        .element_children(parent)
        .into_iter()
        .filter(|child| page.tag_name(*child).as_deref() == Some(tag.as_str()))
        .collect();
    let index = same_tag.iter().position(|n| *n == node)?;
    Some((index + 1, same_tag.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  Sign \n\t in  "), "Sign in");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_position_of_type() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let list = doc.element(body, "ul", &[]);
        let first = doc.element(list, "li", &[]);
        doc.element(list, "span", &[]);
        let second = doc.element(list, "li", &[]);

        assert_eq!(position_of_type(&doc, first), Some((1, 2)));
        assert_eq!(position_of_type(&doc, second), Some((2, 2)));
        assert_eq!(position_of_type(&doc, list), Some((1, 1)));
    }

    #[test]
    fn test_resource_state_settled() {
        assert!(!ResourceState::Pending.is_settled());
        assert!(ResourceState::Loaded.is_settled());
        assert!(ResourceState::Failed.is_settled());
        assert!(ResourceState::CrossOrigin.is_settled());
    }
}
