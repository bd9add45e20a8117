//! In-page probe contract
//!
//! The readiness pipeline never touches a document directly. It asks a
//! [`ReadinessProbe`] four narrow questions, each answered from inside the
//! page: one implementation reads the synthetic [`SharedDocument`], the other
//! (`browser::probe::ChromeProbe`) evaluates self-contained scripts in a live
//! tab.

use super::skeleton::{find_visible_indicators, LoadingIndicatorPatterns};
use crate::dom::{NodeId, PageHandle, ResourceState, SharedDocument};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Image,
    Iframe,
    Video,
}

impl ResourceKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "img" => Some(ResourceKind::Image),
            "iframe" => Some(ResourceKind::Iframe),
            "video" => Some(ResourceKind::Video),
            _ => None,
        }
    }
}

/// A resource element that has not fired load or error yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingResource {
    /// Probe-specific handle; a node index for synthetic documents, an index
    /// into the in-page pending list for Chrome
    pub id: usize,
    pub kind: ResourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceOutcome {
    Loaded,
    Failed,
    TimedOut,
}

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Wait up to `window` for a DOM mutation; `true` if one happened
    async fn wait_for_mutation(&self, window: Duration) -> Result<bool>;

    /// Images, iframes and videos still loading. Cross-origin iframes count
    /// as settled and are never returned.
    async fn pending_resources(&self) -> Result<Vec<PendingResource>>;

    /// Wait for the resource's load or error event, giving up after `cap`
    async fn wait_for_resource(&self, resource: &PendingResource, cap: Duration)
        -> Result<ResourceOutcome>;

    /// Short descriptions of visible loading indicators
    async fn visible_loading_indicators(
        &self,
        patterns: &LoadingIndicatorPatterns,
    ) -> Result<Vec<String>>;
}

/// Probe over a [`SharedDocument`]
#[derive(Clone)]
pub struct DocumentProbe {
    document: SharedDocument,
}

impl DocumentProbe {
    pub fn new(document: SharedDocument) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    fn settled_outcome(&self, node: NodeId) -> Option<ResourceOutcome> {
        match self.document.resource_state(node) {
            Some(ResourceState::Pending) => None,
            Some(ResourceState::Failed) => Some(ResourceOutcome::Failed),
            // A node that is gone or no longer a resource can't block readiness
            _ => Some(ResourceOutcome::Loaded),
        }
    }
}

#[async_trait]
impl ReadinessProbe for DocumentProbe {
    async fn wait_for_mutation(&self, window: Duration) -> Result<bool> {
        let mut mutations = self.document.subscribe_mutations();
        mutations.borrow_and_update();
        match tokio::time::timeout(window, mutations.changed()).await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(_)) | Err(_) => Ok(false),
        }
    }

    async fn pending_resources(&self) -> Result<Vec<PendingResource>> {
        let pending = self.document.read(|doc| {
            doc.elements()
                .into_iter()
                .filter(|node| doc.resource_state(*node) == Some(ResourceState::Pending))
                .filter_map(|node| {
                    let kind = ResourceKind::from_tag(&doc.tag_name(node)?)?;
                    Some(PendingResource {
                        id: node.0,
                        kind,
                        source: doc.attribute(node, "src"),
                    })
                })
                .collect()
        });
        Ok(pending)
    }

    async fn wait_for_resource(
        &self,
        resource: &PendingResource,
        cap: Duration,
    ) -> Result<ResourceOutcome> {
        let node = NodeId(resource.id);
        let deadline = Instant::now() + cap;
        let mut events = self.document.subscribe_resources();

        loop {
            events.borrow_and_update();
            if let Some(outcome) = self.settled_outcome(node) {
                return Ok(outcome);
            }
            match timeout_at(deadline, events.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => {
                    return Ok(self
                        .settled_outcome(node)
                        .unwrap_or(ResourceOutcome::TimedOut))
                }
            }
        }
    }

    async fn visible_loading_indicators(
        &self,
        patterns: &LoadingIndicatorPatterns,
    ) -> Result<Vec<String>> {
        Ok(self
            .document
            .read(|doc| find_visible_indicators(doc, patterns)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    fn document_with_image() -> (SharedDocument, NodeId) {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let img = doc.element(body, "img", &[("src", "/hero.png")]);
        doc.set_resource_state(img, ResourceState::Pending);
        (SharedDocument::new(doc), img)
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_mutation_times_out_on_static_document() {
        let (shared, _) = document_with_image();
        let probe = DocumentProbe::new(shared);
        assert!(!probe.wait_for_mutation(Duration::from_millis(300)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_mutation_sees_change() {
        let (shared, _) = document_with_image();
        let probe = DocumentProbe::new(shared.clone());
        let writer = shared.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.mutate(|doc| {
                let body = doc.body().unwrap();
                doc.element(body, "p", &[]);
            });
        });
        assert!(probe.wait_for_mutation(Duration::from_millis(300)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_resource_loads() {
        let (shared, img) = document_with_image();
        let probe = DocumentProbe::new(shared.clone());

        let pending = probe.pending_resources().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, ResourceKind::Image);
        assert_eq!(pending[0].source.as_deref(), Some("/hero.png"));

        let writer = shared.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            writer.settle_resource(img, ResourceState::Loaded);
        });
        let outcome = probe
            .wait_for_resource(&pending[0], Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(outcome, ResourceOutcome::Loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_resource_is_capped() {
        let (shared, _) = document_with_image();
        let probe = DocumentProbe::new(shared);
        let pending = probe.pending_resources().await.unwrap();

        let started = Instant::now();
        let outcome = probe
            .wait_for_resource(&pending[0], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(outcome, ResourceOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cross_origin_iframe_is_not_pending() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let frame = doc.element(body, "iframe", &[("src", "https://other.example/")]);
        doc.set_resource_state(frame, ResourceState::CrossOrigin);
        let probe = DocumentProbe::new(SharedDocument::new(doc));
        assert!(probe.pending_resources().await.unwrap().is_empty());
    }
}
