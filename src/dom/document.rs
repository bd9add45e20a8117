//! Arena-backed synthetic DOM
//!
//! Layout is deliberately simple: every rendered element gets a 100x20 box at
//! the origin unless a rect is set explicitly, and anything inside a
//! `display: none` subtree (or detached) reports an empty box.

use super::{NodeId, PageHandle, Rect, ResourceState};
use std::collections::BTreeMap;

const DEFAULT_BOX: Rect = Rect {
    x: 0.0,
    y: 0.0,
    width: 100.0,
    height: 20.0,
};

/// Tags that never produce a layout box
const NON_RENDERED: &[&str] = &[
    "head", "script", "style", "meta", "title", "link", "template", "noscript",
];

#[derive(Debug, Clone)]
enum NodeKind {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attributes: Vec<(String, String)>,
    styles: BTreeMap<String, String>,
    rect: Option<Rect>,
    resource: Option<ResourceState>,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// In-memory DOM tree
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty page: `<html><head></head><body></body></html>`
    pub fn new() -> Self {
        let mut doc = Self::bare("html");
        let root = doc.root;
        doc.append_element(root, "head");
        doc.append_element(root, "body");
        doc
    }

    /// A document holding only a root element with the given tag
    pub(crate) fn bare(root_tag: &str) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        doc.root = doc.create_element(root_tag);
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let tag = tag.to_ascii_lowercase();
        let resource = match tag.as_str() {
            "img" | "iframe" | "video" => Some(ResourceState::Loaded),
            _ => None,
        };
        self.push(NodeKind::Element(ElementData {
            tag,
            attributes: Vec::new(),
            styles: BTreeMap::new(),
            rect: None,
            resource,
        }))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Move `child` under `parent`, detaching it from any previous parent
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if self.node(parent).is_none() || self.node(child).is_none() || self.contains(child, parent)
        {
            return;
        }
        self.remove(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let child = self.create_element(tag);
        self.append_child(parent, child);
        child
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let child = self.create_text(text);
        self.append_child(parent, child);
        child
    }

    /// Append an element with attributes in one call
    pub fn element(&mut self, parent: NodeId, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let node = self.append_element(parent, tag);
        for (name, value) in attributes {
            self.set_attribute(node, name, value);
        }
        node
    }

    /// Detach a node (and its subtree) from its parent
    pub fn remove(&mut self, node: NodeId) {
        let Some(parent) = self.node(node).and_then(|n| n.parent) else {
            return;
        };
        self.nodes[parent.0].children.retain(|c| *c != node);
        self.nodes[node.0].parent = None;
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(data) = self.element_data_mut(node) {
            let name = name.to_ascii_lowercase();
            match data.attributes.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = value.to_string(),
                None => data.attributes.push((name, value.to_string())),
            }
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        if let Some(data) = self.element_data_mut(node) {
            data.attributes.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        }
    }

    /// Replace all children of `node` with a single text node
    pub fn set_text(&mut self, node: NodeId, text: &str) {
        if self.element_data(node).is_none() {
            if let Some(Node {
                kind: NodeKind::Text(existing),
                ..
            }) = self.nodes.get_mut(node.0)
            {
                *existing = text.to_string();
            }
            return;
        }
        for child in self.nodes[node.0].children.clone() {
            self.remove(child);
        }
        self.append_text(node, text);
    }

    pub fn set_style(&mut self, node: NodeId, property: &str, value: &str) {
        if let Some(data) = self.element_data_mut(node) {
            data.styles
                .insert(property.to_ascii_lowercase(), value.to_string());
        }
    }

    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        if let Some(data) = self.element_data_mut(node) {
            data.rect = Some(rect);
        }
    }

    /// Override the load state of an `<img>`, `<iframe>` or `<video>`
    pub fn set_resource_state(&mut self, node: NodeId, state: ResourceState) {
        if let Some(data) = self.element_data_mut(node) {
            if data.resource.is_some() {
                data.resource = Some(state);
            }
        }
    }

    /// Whether `descendant` is `ancestor` or lies inside its subtree
    pub fn contains(&self, ancestor: NodeId, descendant: NodeId) -> bool {
        let mut current = Some(descendant);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.node(id).and_then(|n| n.parent);
        }
        false
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn element_data(&self, id: NodeId) -> Option<&ElementData> {
        match self.node(id).map(|n| &n.kind) {
            Some(NodeKind::Element(data)) => Some(data),
            _ => None,
        }
    }

    fn element_data_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.kind) {
            Some(NodeKind::Element(data)) => Some(data),
            _ => None,
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else { return };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element(data) if data.tag == "script" || data.tag == "style" => {}
            NodeKind::Element(_) => {
                for child in &node.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    fn collect_elements(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let Some(node) = self.node(id) else { return };
        if let NodeKind::Element(_) = node.kind {
            out.push(id);
            for child in &node.children {
                self.collect_elements(*child, out);
            }
        }
    }

    /// Whether the node or one of its ancestors is `display: none`
    fn in_hidden_subtree(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            if let Some(data) = self.element_data(node_id) {
                if data.styles.get("display").map(String::as_str) == Some("none")
                    || NON_RENDERED.contains(&data.tag.as_str())
                {
                    return true;
                }
            }
            current = self.node(node_id).and_then(|n| n.parent);
        }
        false
    }
}

impl PageHandle for Document {
    fn document_element(&self) -> Option<NodeId> {
        Some(self.root)
    }

    fn body(&self) -> Option<NodeId> {
        self.element_children(self.root)
            .into_iter()
            .find(|child| self.tag_name(*child).as_deref() == Some("body"))
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.element_data(node).map(|data| data.tag.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.element_data(node).and_then(|data| {
            data.attributes
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        })
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.element_data(node)
            .map(|data| data.attributes.clone())
            .unwrap_or_default()
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)
            .and_then(|n| n.parent)
            .filter(|parent| self.element_data(*parent).is_some())
    }

    fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node)
            .map(|n| {
                n.children
                    .iter()
                    .copied()
                    .filter(|child| self.element_data(*child).is_some())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn own_text(&self, node: NodeId) -> String {
        let Some(n) = self.node(node) else {
            return String::new();
        };
        n.children
            .iter()
            .filter_map(|child| match self.node(*child).map(|c| &c.kind) {
                Some(NodeKind::Text(text)) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn is_connected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.root {
                return true;
            }
            current = self.node(id).and_then(|n| n.parent);
        }
        false
    }

    fn bounding_box(&self, node: NodeId) -> Rect {
        if self.element_data(node).is_none()
            || !self.is_connected(node)
            || self.in_hidden_subtree(node)
        {
            return Rect::default();
        }
        self.element_data(node)
            .and_then(|data| data.rect)
            .unwrap_or(DEFAULT_BOX)
    }

    fn computed_style(&self, node: NodeId, property: &str) -> Option<String> {
        let data = self.element_data(node)?;
        let property = property.to_ascii_lowercase();
        if let Some(value) = data.styles.get(&property) {
            return Some(value.clone());
        }
        let default = match property.as_str() {
            "display" if NON_RENDERED.contains(&data.tag.as_str()) => "none",
            "display" => match data.tag.as_str() {
                "span" | "a" | "label" | "img" | "button" | "input" | "select" | "textarea"
                | "strong" | "em" | "b" | "i" | "iframe" | "video" => "inline",
                _ => "block",
            },
            // visibility is inherited
            "visibility" => {
                return match self.parent_element(node) {
                    Some(parent) => self.computed_style(parent, "visibility"),
                    None => Some("visible".to_string()),
                };
            }
            "position" => "static",
            "z-index" => "auto",
            "opacity" => "1",
            _ => return None,
        };
        Some(default.to_string())
    }

    fn resource_state(&self, node: NodeId) -> Option<ResourceState> {
        self.element_data(node).and_then(|data| data.resource)
    }

    fn elements(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_elements(self.root, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_shape() {
        let doc = Document::new();
        let body = doc.body().expect("body");
        assert_eq!(doc.tag_name(doc.root()).as_deref(), Some("html"));
        assert_eq!(doc.tag_name(body).as_deref(), Some("body"));
        assert_eq!(doc.elements().len(), 3);
    }

    #[test]
    fn test_own_text_vs_text_content() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let button = doc.element(body, "button", &[]);
        doc.append_text(button, "Save ");
        let icon = doc.element(button, "span", &[]);
        doc.append_text(icon, "icon");

        assert_eq!(doc.own_text(button), "Save ");
        assert_eq!(doc.text_content(button), "Save icon");
    }

    #[test]
    fn test_detached_node_is_not_connected() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let div = doc.element(body, "div", &[]);
        assert!(doc.is_connected(div));

        doc.remove(div);
        assert!(!doc.is_connected(div));
        assert!(doc.bounding_box(div).is_empty());
        assert!(!doc.elements().contains(&div));
    }

    #[test]
    fn test_hidden_subtree_has_empty_box() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let wrapper = doc.element(body, "div", &[]);
        let inner = doc.element(wrapper, "span", &[]);
        assert!(!doc.bounding_box(inner).is_empty());

        doc.set_style(wrapper, "display", "none");
        assert!(doc.bounding_box(inner).is_empty());
    }

    #[test]
    fn test_visibility_is_inherited() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let wrapper = doc.element(body, "div", &[]);
        let inner = doc.element(wrapper, "span", &[]);
        doc.set_style(wrapper, "visibility", "hidden");

        assert_eq!(doc.computed_style(inner, "visibility").as_deref(), Some("hidden"));
        assert_eq!(doc.computed_style(inner, "opacity").as_deref(), Some("1"));
    }

    #[test]
    fn test_set_attribute_replaces_value() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let input = doc.element(body, "input", &[("name", "q")]);
        doc.set_attribute(input, "NAME", "search");
        assert_eq!(doc.attribute(input, "name").as_deref(), Some("search"));
        assert_eq!(doc.attributes(input).len(), 1);
    }
}
