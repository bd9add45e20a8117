//! Raw browser events and element classification

use crate::dom::{NodeId, PageHandle};
use serde::{Deserialize, Serialize};

/// An interaction event as reported by the page listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserEvent {
    /// Milliseconds since the Unix epoch at the moment the event fired
    pub timestamp: i64,

    /// Document URL when the event fired
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,

    /// Event target; `None` for window-level events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<NodeId>,

    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventKind {
    #[serde(rename_all = "camelCase")]
    Click {
        client_x: f64,
        client_y: f64,
        page_x: f64,
        page_y: f64,
        #[serde(default)]
        button: u8,
    },
    /// `input` on a text-like field; carries the field's current value
    Input { value: String },
    #[serde(rename_all = "camelCase")]
    Change {
        #[serde(default)]
        checked: Option<bool>,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        selected_index: Option<i64>,
    },
    Submit,
    Navigation {
        url: String,
        trigger: NavigationTrigger,
    },
    PageLoad {
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    Keypress {
        key: String,
        #[serde(default)]
        modifiers: Modifiers,
    },
    #[serde(rename_all = "camelCase")]
    Scroll { scroll_x: f64, scroll_y: f64 },
    Focus,
    Blur,
    Hover,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Click { .. } => "click",
            EventKind::Input { .. } => "input",
            EventKind::Change { .. } => "change",
            EventKind::Submit => "submit",
            EventKind::Navigation { .. } => "navigation",
            EventKind::PageLoad { .. } => "pageLoad",
            EventKind::Keypress { .. } => "keypress",
            EventKind::Scroll { .. } => "scroll",
            EventKind::Focus => "focus",
            EventKind::Blur => "blur",
            EventKind::Hover => "hover",
        }
    }

    /// Events about the window/document rather than an element
    pub fn is_window_level(&self) -> bool {
        matches!(
            self,
            EventKind::Navigation { .. } | EventKind::PageLoad { .. } | EventKind::Scroll { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavigationTrigger {
    PushState,
    ReplaceState,
    PopState,
    HashChange,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modifiers {
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub shift: bool,
}

impl Modifiers {
    pub fn any(&self) -> bool {
        self.alt || self.ctrl || self.meta || self.shift
    }
}

/// Input types that accept free text
const TEXT_INPUT_TYPES: &[&str] = &[
    "text", "password", "email", "search", "tel", "url", "number", "date", "datetime-local",
    "month", "week", "time",
];

/// What an event target is, decided once from its tag and attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    TextField { input_type: String },
    Checkbox,
    Radio,
    Select,
    Button,
    Link { href: Option<String> },
    Form { action: Option<String>, method: String },
    /// `<script>` and `<style>`
    NonRendered,
    Other,
}

impl ElementKind {
    pub fn classify<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> Self {
        let Some(tag) = page.tag_name(node) else {
            return ElementKind::Other;
        };
        match tag.as_str() {
            "script" | "style" => ElementKind::NonRendered,
            "input" => {
                let input_type = page
                    .attribute(node, "type")
                    .map(|t| t.trim().to_ascii_lowercase())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| "text".to_string());
                match input_type.as_str() {
                    "checkbox" => ElementKind::Checkbox,
                    "radio" => ElementKind::Radio,
                    "button" | "submit" | "reset" | "image" => ElementKind::Button,
                    t if TEXT_INPUT_TYPES.contains(&t) => ElementKind::TextField { input_type },
                    _ => ElementKind::Other,
                }
            }
            "textarea" => ElementKind::TextField {
                input_type: "textarea".to_string(),
            },
            "select" => ElementKind::Select,
            "button" => ElementKind::Button,
            "a" => ElementKind::Link {
                href: page.attribute(node, "href"),
            },
            "form" => ElementKind::Form {
                action: page.attribute(node, "action"),
                method: page
                    .attribute(node, "method")
                    .map(|m| m.trim().to_ascii_lowercase())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "get".to_string()),
            },
            _ if page
                .attribute(node, "contenteditable")
                .is_some_and(|v| v.is_empty() || v.eq_ignore_ascii_case("true")) =>
            {
                ElementKind::TextField {
                    input_type: "contenteditable".to_string(),
                }
            }
            _ => ElementKind::Other,
        }
    }

    pub fn input_type(&self) -> Option<&str> {
        match self {
            ElementKind::TextField { input_type } => Some(input_type),
            ElementKind::Checkbox => Some("checkbox"),
            ElementKind::Radio => Some("radio"),
            ElementKind::Select => Some("select"),
            _ => None,
        }
    }
}

/// Nearest ancestor-or-self with the given tag
pub fn closest<P: PageHandle + ?Sized>(page: &P, node: NodeId, tag: &str) -> Option<NodeId> {
    let mut current = Some(node);
    while let Some(id) = current {
        if page.tag_name(id).as_deref() == Some(tag) {
            return Some(id);
        }
        current = page.parent_element(id);
    }
    None
}
