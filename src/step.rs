//! Recorded steps
//!
//! A [`Step`] is one user interaction plus its evidence: the locator chosen
//! for the target, alternative locators, an element snapshot and, for
//! visually significant events, a screenshot attached after the step was
//! first saved.

use crate::context::ElementContext;
use crate::readiness::PageReadinessState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Selector used for steps that target the window rather than an element
pub const WINDOW_SELECTOR: &str = "window";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepType {
    Click,
    Input,
    Change,
    Submit,
    Scroll,
    Navigation,
    PageLoad,
    Hover,
    Keypress,
    Focus,
    Blur,
}

/// Recorded value: text for inputs and selects, a flag for checkboxes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepValue {
    Checked(bool),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureMode {
    Immediate,
    AfterReadiness,
    AfterLoadComplete,
    Manual,
}

/// Screenshot attached to a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualCapture {
    /// `data:image/png;base64,...`; empty once a store has written it to `path`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub screenshot: String,

    /// PNG file holding the image, set by stores that keep images on disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the encoded image, for deduplication
    pub hash: String,

    pub captured_at: DateTime<Utc>,

    pub mode: CaptureMode,

    /// Readiness result that preceded the capture, if one ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<PageReadinessState>,
}

impl VisualCapture {
    pub fn new(screenshot: String, mode: CaptureMode, readiness: Option<PageReadinessState>) -> Self {
        Self {
            hash: compute_string_hash(&screenshot),
            screenshot,
            path: None,
            captured_at: Utc::now(),
            mode,
            readiness,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,

    pub session_id: String,

    /// Milliseconds since the Unix epoch when the browser event fired
    pub timestamp: i64,

    #[serde(rename = "type")]
    pub step_type: StepType,

    pub selector: String,

    #[serde(default)]
    pub alternative_selectors: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_context: Option<ElementContext>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual: Option<VisualCapture>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<StepValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Step {
    pub fn new(session_id: impl Into<String>, step_type: StepType, timestamp: i64, selector: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            timestamp,
            step_type,
            selector: selector.into(),
            alternative_selectors: Vec::new(),
            element_context: None,
            visual: None,
            value: None,
            url: None,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Apply an asynchronous update; only `visual` and `metadata` may change
    pub fn apply(&mut self, update: StepUpdate) {
        if let Some(visual) = update.visual {
            self.visual = Some(visual);
        }
        self.metadata.extend(update.metadata);
    }
}

/// Partial update applied after a step's first save
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual: Option<VisualCapture>,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl StepUpdate {
    pub fn is_empty(&self) -> bool {
        self.visual.is_none() && self.metadata.is_empty()
    }
}

/// Current time in the step timestamp unit
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Compute SHA-256 hash of a string
pub fn compute_string_hash(content: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = hasher.finalize();

    format!("{:x}", hash)
}
