//! Shared pages and collaborator doubles for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use robert_recorder::capture::{BrowserEvent, EventKind};
use robert_recorder::screenshot::{AssumeLoaded, ScreenshotCapturer, TargetHandle};
use robert_recorder::store::{MemoryStore, Session, StepStore};
use robert_recorder::{
    Document, DocumentProbe, NodeId, PageHandle, Recorder, RecorderConfig, RecorderError,
    Result, SharedDocument, Step, StepUpdate,
};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

pub const FAKE_PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

/// A login form plus a navigation link
pub struct LoginPage {
    pub doc: Document,
    pub form: NodeId,
    pub email: NodeId,
    pub password: NodeId,
    pub remember: NodeId,
    pub submit: NodeId,
    pub next_link: NodeId,
}

pub fn login_page() -> LoginPage {
    let mut doc = Document::new();
    let body = doc.body().unwrap();
    let main = doc.element(body, "main", &[]);
    let form = doc.element(
        main,
        "form",
        &[("id", "login"), ("action", "/session"), ("method", "post")],
    );
    let email = doc.element(form, "input", &[("type", "email"), ("name", "email")]);
    let password = doc.element(form, "input", &[("type", "password"), ("name", "pwd")]);
    let remember = doc.element(form, "input", &[("type", "checkbox"), ("name", "remember")]);
    let submit = doc.element(form, "button", &[("id", "submit-btn"), ("type", "submit")]);
    doc.append_text(submit, "Sign in");

    let nav = doc.element(body, "nav", &[]);
    let next_link = doc.element(nav, "a", &[("href", "/next")]);
    doc.append_text(next_link, "Next");

    LoginPage {
        doc,
        form,
        email,
        password,
        remember,
        submit,
        next_link,
    }
}

pub fn event(target: Option<NodeId>, kind: EventKind) -> BrowserEvent {
    BrowserEvent {
        timestamp: 1_700_000_000_000,
        page_url: Some("https://app.test/login".to_string()),
        target,
        kind,
    }
}

pub fn click(target: NodeId) -> BrowserEvent {
    event(
        Some(target),
        EventKind::Click {
            client_x: 40.0,
            client_y: 20.0,
            page_x: 40.0,
            page_y: 220.0,
            button: 0,
        },
    )
}

pub fn typed(target: NodeId, value: &str) -> BrowserEvent {
    event(
        Some(target),
        EventKind::Input {
            value: value.to_string(),
        },
    )
}

/// One call to the screenshot collaborator
#[derive(Debug, Clone)]
pub struct ScreenshotCall {
    pub target: TargetHandle,
    pub immediate: bool,
    pub at: Instant,
}

/// Screenshot double that records every call
#[derive(Default)]
pub struct RecordingScreenshots {
    pub calls: Mutex<Vec<ScreenshotCall>>,
    /// Every call fails while set
    pub failing: std::sync::atomic::AtomicBool,
}

impl RecordingScreenshots {
    pub fn calls(&self) -> Vec<ScreenshotCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScreenshotCapturer for RecordingScreenshots {
    async fn capture_current_view(&self, target: &TargetHandle, immediate: bool) -> Option<String> {
        self.calls.lock().unwrap().push(ScreenshotCall {
            target: target.clone(),
            immediate,
            at: Instant::now(),
        });
        if self.failing.load(Ordering::SeqCst) {
            None
        } else {
            Some(FAKE_PNG.to_string())
        }
    }
}

/// Memory store whose `add_step` fails for the listed call numbers (1-based)
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_on: Vec<usize>,
    adds: AtomicUsize,
}

impl FlakyStore {
    pub fn new(fail_on: Vec<usize>) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_on,
            adds: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StepStore for FlakyStore {
    async fn create_session(&self, metadata: Map<String, Value>) -> Result<String> {
        self.inner.create_session(metadata).await
    }

    async fn add_step(&self, session_id: &str, step: Step) -> Result<()> {
        let n = self.adds.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&n) {
            return Err(RecorderError::Storage("disk full".to_string()));
        }
        self.inner.add_step(session_id, step).await
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        self.inner.get_session(session_id).await
    }

    async fn update_step(&self, session_id: &str, step_id: &str, update: StepUpdate) -> Result<()> {
        self.inner.update_step(session_id, step_id, update).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.inner.delete_session(session_id).await
    }
}

pub fn test_config() -> RecorderConfig {
    let mut config = RecorderConfig::default();
    config.storage.state_file = None;
    config
}

pub struct Harness {
    pub recorder: Recorder,
    pub screenshots: Arc<RecordingScreenshots>,
    pub store: Arc<dyn StepStore>,
    pub document: SharedDocument,
}

/// Recorder attached to `doc`, with a memory store and recording screenshots
pub async fn harness(doc: Document) -> Harness {
    harness_with_store(doc, Arc::new(MemoryStore::new())).await
}

pub async fn harness_with_store(doc: Document, store: Arc<dyn StepStore>) -> Harness {
    let screenshots = Arc::new(RecordingScreenshots::default());
    let recorder = Recorder::new(
        test_config(),
        store.clone(),
        screenshots.clone(),
        Arc::new(AssumeLoaded),
    );
    let document = SharedDocument::new(doc);
    recorder
        .attach_page(
            TargetHandle::new("tab-1"),
            Arc::new(DocumentProbe::new(document.clone())),
        )
        .await;
    Harness {
        recorder,
        screenshots,
        store,
        document,
    }
}
