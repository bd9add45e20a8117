//! Live document wrapper with mutation and resource-load notifications

use super::{Document, NodeId, PageHandle, Rect, ResourceState};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;

/// A [`Document`] that can be mutated while observers wait on it.
///
/// Every call to [`SharedDocument::mutate`] bumps the mutation epoch the way a
/// `MutationObserver` callback would fire. Resource load/error events are
/// reported on a separate channel and do not count as DOM mutations.
#[derive(Clone)]
pub struct SharedDocument {
    inner: Arc<RwLock<Document>>,
    mutations: Arc<watch::Sender<u64>>,
    resource_events: Arc<watch::Sender<u64>>,
}

impl SharedDocument {
    pub fn new(document: Document) -> Self {
        let (mutations, _) = watch::channel(0);
        let (resource_events, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(document)),
            mutations: Arc::new(mutations),
            resource_events: Arc::new(resource_events),
        }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Document> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Document> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.read_guard())
    }

    /// Apply a DOM change and notify mutation observers
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let result = f(&mut self.write_guard());
        self.mutations.send_modify(|epoch| *epoch += 1);
        result
    }

    /// Fire the load (or error) event of a resource element
    pub fn settle_resource(&self, node: NodeId, state: ResourceState) {
        self.write_guard().set_resource_state(node, state);
        self.resource_events.send_modify(|epoch| *epoch += 1);
    }

    /// Point-in-time copy of the document
    pub fn snapshot(&self) -> Document {
        self.read_guard().clone()
    }

    pub fn mutation_count(&self) -> u64 {
        *self.mutations.borrow()
    }

    pub fn subscribe_mutations(&self) -> watch::Receiver<u64> {
        self.mutations.subscribe()
    }

    pub fn subscribe_resources(&self) -> watch::Receiver<u64> {
        self.resource_events.subscribe()
    }
}

impl PageHandle for SharedDocument {
    fn document_element(&self) -> Option<NodeId> {
        self.read_guard().document_element()
    }

    fn body(&self) -> Option<NodeId> {
        self.read_guard().body()
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.read_guard().tag_name(node)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.read_guard().attribute(node, name)
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.read_guard().attributes(node)
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.read_guard().parent_element(node)
    }

    fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.read_guard().element_children(node)
    }

    fn own_text(&self, node: NodeId) -> String {
        self.read_guard().own_text(node)
    }

    fn text_content(&self, node: NodeId) -> String {
        self.read_guard().text_content(node)
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.read_guard().is_connected(node)
    }

    fn bounding_box(&self, node: NodeId) -> Rect {
        self.read_guard().bounding_box(node)
    }

    fn computed_style(&self, node: NodeId, property: &str) -> Option<String> {
        self.read_guard().computed_style(node, property)
    }

    fn resource_state(&self, node: NodeId) -> Option<ResourceState> {
        self.read_guard().resource_state(node)
    }

    fn elements(&self) -> Vec<NodeId> {
        self.read_guard().elements()
    }
}
