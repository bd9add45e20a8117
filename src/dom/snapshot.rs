//! Serialized DOM snapshots coming from a live page

use super::{Document, NodeId, Rect, ResourceState};
use crate::error::{RecorderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat, document-ordered node list produced by the in-page snapshot script.
///
/// Node 0 is the `<html>` element; every other node names the index of its
/// parent, which always precedes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub nodes: Vec<SnapshotNode>,

    /// Index of the event target, when the snapshot was taken for an event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotNode {
    #[serde(default)]
    pub parent: Option<usize>,

    /// Lowercase tag name; `None` marks a text node
    #[serde(default)]
    pub tag: Option<String>,

    /// Text of a text node
    #[serde(default)]
    pub text: Option<String>,

    /// `[name, value]` pairs
    #[serde(default)]
    pub attributes: Vec<(String, String)>,

    #[serde(default)]
    pub rect: Option<Rect>,

    #[serde(default)]
    pub style: BTreeMap<String, String>,

    #[serde(default)]
    pub resource: Option<ResourceState>,
}

impl Document {
    /// Rebuild a document from a snapshot, returning the event target if any
    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> Result<(Document, Option<NodeId>)> {
        let root_tag = snapshot
            .nodes
            .first()
            .and_then(|n| n.tag.as_deref())
            .ok_or_else(|| RecorderError::Probe("snapshot has no root element".to_string()))?;

        let mut doc = Document::bare(root_tag);
        let mut ids: Vec<NodeId> = Vec::with_capacity(snapshot.nodes.len());

        for (index, node) in snapshot.nodes.iter().enumerate() {
            let id = if index == 0 {
                doc.root()
            } else {
                let parent = node
                    .parent
                    .filter(|p| *p < index)
                    .and_then(|p| ids.get(p).copied())
                    .ok_or_else(|| {
                        RecorderError::Probe(format!(
                            "snapshot node {} references an unknown parent",
                            index
                        ))
                    })?;
                match &node.tag {
                    Some(tag) => doc.append_element(parent, tag),
                    None => doc.append_text(parent, node.text.as_deref().unwrap_or_default()),
                }
            };

            if node.tag.is_some() {
                for (name, value) in &node.attributes {
                    doc.set_attribute(id, name, value);
                }
                for (property, value) in &node.style {
                    doc.set_style(id, property, value);
                }
                if let Some(rect) = node.rect {
                    doc.set_rect(id, rect);
                }
                if let Some(state) = node.resource {
                    doc.set_resource_state(id, state);
                }
            }
            ids.push(id);
        }

        let target = snapshot.target.and_then(|t| ids.get(t).copied());
        Ok((doc, target))
    }
}
