//! Turning browser events into steps
//!
//! [`EventCaptureCoordinator::process`] filters an event, classifies its target,
//! runs the selector engine and context extractor, applies value masking and
//! decides the screenshot timing. It never fails: events it cannot use are
//! dropped with a debug log.

pub mod event;
pub mod masking;
pub mod policy;

pub use event::{BrowserEvent, ElementKind, EventKind, Modifiers, NavigationTrigger};
pub use policy::CaptureTiming;

use crate::config::CaptureConfig;
use crate::context::{extract_context_limited, truncate_text, visible_text};
use crate::dom::{NodeId, PageHandle};
use crate::selector::generate_selectors;
use crate::step::{Step, StepType, StepValue, WINDOW_SELECTOR};
use event::closest;
use masking::{masked_value, should_mask};
use policy::{capture_timing, Link};
use serde_json::json;
use url::Url;

/// Keys recorded as keypress steps; printable input is covered by `input`
pub const RECORDED_KEYS: &[&str] = &["Enter", "Tab", "Escape", "Backspace", "Delete"];

/// A step ready to be recorded, with the screenshot policy that applies to it
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedStep {
    pub step: Step,
    pub timing: CaptureTiming,
}

#[derive(Debug, Clone, Default)]
pub struct EventCaptureCoordinator {
    config: CaptureConfig,
}

impl EventCaptureCoordinator {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Build a step for `event`, or `None` when the event is noise
    pub fn process<P: PageHandle + ?Sized>(
        &self,
        page: &P,
        session_id: &str,
        event: &BrowserEvent,
    ) -> Option<CapturedStep> {
        if event.kind.is_window_level() {
            return self.window_step(session_id, event);
        }

        let Some(node) = event.target else {
            log::debug!("Dropping {} event without a target", event.kind.name());
            return None;
        };
        if !page.is_connected(node) {
            log::debug!("Dropping {} on detached element {:?}", event.kind.name(), node);
            return None;
        }
        let element = ElementKind::classify(page, node);
        if element == ElementKind::NonRendered {
            return None;
        }

        let mut link_href = None;
        let mut link_target = None;
        let mut step = match &event.kind {
            EventKind::Click {
                client_x,
                client_y,
                page_x,
                page_y,
                button,
            } => {
                let mut step = self
                    .element_step(page, node, session_id, StepType::Click, event)
                    .with_metadata("clientX", *client_x)
                    .with_metadata("clientY", *client_y)
                    .with_metadata("pageX", *page_x)
                    .with_metadata("pageY", *page_y)
                    .with_metadata("button", *button)
                    .with_metadata(
                        "text",
                        truncate_text(&visible_text(page, node), self.config.text_limit),
                    );
                if let Some(anchor) = closest(page, node, "a") {
                    if let Some(href) = page.attribute(anchor, "href") {
                        step = step.with_metadata("href", href.clone());
                        link_href = Some(href);
                    }
                    link_target = page.attribute(anchor, "target");
                }
                step
            }
            EventKind::Input { value } => {
                let ElementKind::TextField { input_type } = &element else {
                    log::debug!("Ignoring input on non-text element {:?}", node);
                    return None;
                };
                let mask = should_mask(page, node);
                let mut step = self
                    .element_step(page, node, session_id, StepType::Input, event)
                    .with_metadata("inputType", input_type.as_str())
                    .with_metadata("masked", mask);
                step.value = Some(StepValue::Text(masked_value(
                    value,
                    mask,
                    &self.config.mask_marker,
                )));
                step
            }
            EventKind::Change {
                checked,
                value,
                selected_index,
            } => {
                let recorded = match &element {
                    ElementKind::Checkbox | ElementKind::Radio => {
                        StepValue::Checked(checked.unwrap_or(false))
                    }
                    ElementKind::Select => StepValue::Text(masked_value(
                        value.as_deref().unwrap_or_default(),
                        should_mask(page, node),
                        &self.config.mask_marker,
                    )),
                    // Text fields report through `input`
                    _ => return None,
                };
                let mut step = self.element_step(page, node, session_id, StepType::Change, event);
                if let Some(input_type) = element.input_type() {
                    step = step.with_metadata("inputType", input_type);
                }
                if let Some(index) = selected_index {
                    step = step.with_metadata("selectedIndex", *index);
                }
                step.value = Some(recorded);
                step
            }
            EventKind::Submit => {
                let ElementKind::Form { action, method } = &element else {
                    log::debug!("Ignoring submit on non-form element {:?}", node);
                    return None;
                };
                let mut step = self
                    .element_step(page, node, session_id, StepType::Submit, event)
                    .with_metadata("method", method.as_str());
                if let Some(action) = action {
                    step = step.with_metadata("action", action.as_str());
                }
                step
            }
            EventKind::Keypress { key, modifiers } => {
                if !RECORDED_KEYS.contains(&key.as_str()) {
                    return None;
                }
                let mut step = self
                    .element_step(page, node, session_id, StepType::Keypress, event)
                    .with_metadata("key", key.as_str());
                if modifiers.any() {
                    step = step.with_metadata("modifiers", json!(modifiers));
                }
                step
            }
            EventKind::Focus => self.element_step(page, node, session_id, StepType::Focus, event),
            EventKind::Blur => self.element_step(page, node, session_id, StepType::Blur, event),
            EventKind::Hover => self.element_step(page, node, session_id, StepType::Hover, event),
            EventKind::Navigation { .. } | EventKind::PageLoad { .. } | EventKind::Scroll { .. } => {
                return None
            }
        };

        if let Some(input_type) = element.input_type() {
            step.metadata
                .entry("inputType")
                .or_insert_with(|| input_type.into());
        }

        let link = link_href.as_deref().map(|href| Link {
            href,
            target: link_target.as_deref(),
        });
        let timing = capture_timing(&event.kind, Some(&element), link, event.page_url.as_deref());
        step = step.with_metadata("captureTiming", json!(timing));
        Some(CapturedStep { step, timing })
    }

    fn element_step<P: PageHandle + ?Sized>(
        &self,
        page: &P,
        node: NodeId,
        session_id: &str,
        step_type: StepType,
        event: &BrowserEvent,
    ) -> Step {
        let selectors = generate_selectors(page, node);
        let mut step = Step::new(session_id, step_type, event.timestamp, selectors.primary)
            .with_metadata("selectorConfidence", selectors.confidence);
        step.alternative_selectors = selectors.fallbacks;
        step.element_context = Some(extract_context_limited(
            page,
            node,
            self.config.text_limit,
            &self.config.mask_marker,
        ));
        step.url = event.page_url.clone();
        step
    }

    fn window_step(&self, session_id: &str, event: &BrowserEvent) -> Option<CapturedStep> {
        let step = match &event.kind {
            EventKind::Navigation { url, trigger } => {
                let mut step = Step::new(session_id, StepType::Navigation, event.timestamp, WINDOW_SELECTOR)
                    .with_metadata("trigger", json!(trigger));
                if let Some(from) = &event.page_url {
                    step = step.with_metadata("from", from.as_str());
                }
                step = with_url_parts(step, url);
                step.url = Some(url.clone());
                step
            }
            EventKind::PageLoad { url, title } => {
                let mut step = Step::new(session_id, StepType::PageLoad, event.timestamp, WINDOW_SELECTOR);
                if let Some(title) = title {
                    step = step.with_metadata("title", title.as_str());
                }
                step = with_url_parts(step, url);
                step.url = Some(url.clone());
                step
            }
            EventKind::Scroll { scroll_x, scroll_y } => {
                let mut step = Step::new(session_id, StepType::Scroll, event.timestamp, WINDOW_SELECTOR)
                    .with_metadata("scrollX", *scroll_x)
                    .with_metadata("scrollY", *scroll_y);
                step.url = event.page_url.clone();
                step
            }
            _ => return None,
        };

        let timing = capture_timing(&event.kind, None, None, event.page_url.as_deref());
        let step = step.with_metadata("captureTiming", json!(timing));
        Some(CapturedStep { step, timing })
    }
}

/// Record path, query and hash of `url` in the step metadata
fn with_url_parts(step: Step, url: &str) -> Step {
    match Url::parse(url) {
        Ok(parsed) => step
            .with_metadata("path", parsed.path())
            .with_metadata("query", parsed.query().map(|q| format!("?{}", q)).unwrap_or_default())
            .with_metadata("hash", parsed.fragment().map(|f| format!("#{}", f)).unwrap_or_default()),
        Err(e) => {
            log::debug!("Could not parse navigation URL {}: {}", url, e);
            step
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MASK_MARKER;
    use crate::dom::Document;

    fn event(target: Option<NodeId>, kind: EventKind) -> BrowserEvent {
        BrowserEvent {
            timestamp: 1_700_000_000_000,
            page_url: Some("https://example.com/app".to_string()),
            target,
            kind,
        }
    }

    #[test]
    fn test_masks_password_input() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let field = doc.element(body, "input", &[("type", "password"), ("name", "pwd")]);

        let coordinator = EventCaptureCoordinator::default();
        let captured = coordinator
            .process(&doc, "s1", &event(Some(field), EventKind::Input { value: "secret123".into() }))
            .expect("step");
        assert_eq!(captured.step.value, Some(StepValue::Text(MASK_MARKER.to_string())));
        assert_eq!(captured.step.metadata["masked"], true);
        assert_eq!(captured.timing, CaptureTiming::None);
    }

    #[test]
    fn test_mirrored_value_attribute_is_masked_in_every_step() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let field = doc.element(
            body,
            "input",
            &[("type", "password"), ("name", "pwd"), ("value", "secret123")],
        );
        let coordinator = EventCaptureCoordinator::default();

        let kinds = [
            EventKind::Input { value: "secret123".into() },
            EventKind::Focus,
            EventKind::Blur,
            EventKind::Keypress {
                key: "Enter".into(),
                modifiers: Modifiers::default(),
            },
        ];
        for kind in kinds {
            let captured = coordinator
                .process(&doc, "s1", &event(Some(field), kind))
                .expect("step");
            let context = captured.step.element_context.as_ref().expect("context");
            assert_eq!(context.attributes["value"], MASK_MARKER);
            let json = serde_json::to_string(&captured.step).unwrap();
            assert!(!json.contains("secret123"), "secret leaked into {}", json);
        }
    }

    #[test]
    fn test_change_on_text_field_is_ignored() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let field = doc.element(body, "input", &[("name", "city")]);
        let change = EventKind::Change {
            checked: None,
            value: Some("Lisbon".into()),
            selected_index: None,
        };
        assert!(EventCaptureCoordinator::default()
            .process(&doc, "s1", &event(Some(field), change))
            .is_none());
    }

    #[test]
    fn test_checkbox_change_records_flag() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let check = doc.element(body, "input", &[("type", "checkbox"), ("name", "terms")]);
        let change = EventKind::Change {
            checked: Some(true),
            value: Some("on".into()),
            selected_index: None,
        };
        let captured = EventCaptureCoordinator::default()
            .process(&doc, "s1", &event(Some(check), change))
            .expect("step");
        assert_eq!(captured.step.step_type, StepType::Change);
        assert_eq!(captured.step.value, Some(StepValue::Checked(true)));
        assert_eq!(captured.step.selector, "input[name=\"terms\"]");
        assert_eq!(captured.step.metadata["inputType"], "checkbox");
    }

    #[test]
    fn test_script_and_detached_targets_are_dropped() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let script = doc.element(body, "script", &[]);
        let detached = doc.create_element("button");
        let coordinator = EventCaptureCoordinator::default();

        assert!(coordinator.process(&doc, "s1", &event(Some(script), EventKind::Focus)).is_none());
        assert!(coordinator.process(&doc, "s1", &event(Some(detached), EventKind::Focus)).is_none());
    }

    #[test]
    fn test_navigation_records_url_parts() {
        let doc = Document::new();
        let nav = EventKind::Navigation {
            url: "https://example.com/search?q=rust#results".into(),
            trigger: NavigationTrigger::PushState,
        };
        let captured = EventCaptureCoordinator::default()
            .process(&doc, "s1", &event(None, nav))
            .expect("step");
        let step = captured.step;
        assert_eq!(step.selector, WINDOW_SELECTOR);
        assert_eq!(step.url.as_deref(), Some("https://example.com/search?q=rust#results"));
        assert_eq!(step.metadata["path"], "/search");
        assert_eq!(step.metadata["query"], "?q=rust");
        assert_eq!(step.metadata["hash"], "#results");
        assert_eq!(step.metadata["trigger"], "pushState");
        assert_eq!(captured.timing, CaptureTiming::AfterReadiness);
    }

    #[test]
    fn test_only_special_keys_are_recorded() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let field = doc.element(body, "input", &[("id", "search")]);
        let coordinator = EventCaptureCoordinator::default();
        let key = |k: &str| EventKind::Keypress {
            key: k.to_string(),
            modifiers: Modifiers::default(),
        };

        assert!(coordinator.process(&doc, "s1", &event(Some(field), key("a"))).is_none());
        let captured = coordinator
            .process(&doc, "s1", &event(Some(field), key("Enter")))
            .expect("step");
        assert_eq!(captured.step.metadata["key"], "Enter");
        assert_eq!(captured.step.selector, "#search");
    }

    #[test]
    fn test_timestamp_comes_from_event() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let button = doc.element(body, "button", &[]);
        let captured = EventCaptureCoordinator::default()
            .process(&doc, "s1", &event(Some(button), EventKind::Hover))
            .expect("step");
        assert_eq!(captured.step.timestamp, 1_700_000_000_000);
    }
}
