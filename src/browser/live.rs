//! Bridge from a live Chrome tab into the [`Recorder`]
//!
//! An in-page listener script serializes each interesting event together with
//! a DOM snapshot and hands it to a CDP binding. The host rebuilds a
//! [`Document`] from the snapshot, so selector generation and context
//! extraction run against exactly the DOM the user interacted with.

use super::chrome::ChromeDriver;
use super::probe::ChromeProbe;
use crate::capture::masking::SENSITIVE_FIELD_PATTERN;
use crate::capture::BrowserEvent;
use crate::config::MASK_MARKER;
use crate::dom::{Document, DocumentSnapshot};
use crate::error::{RecorderError, Result};
use crate::screenshot::TargetHandle;
use crate::session::Recorder;
use chromiumoxide::cdp::js_protocol::runtime::EventBindingCalled;
use chromiumoxide::listeners::EventStream;
use futures::StreamExt;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Name of the page-to-host binding
pub const BINDING_NAME: &str = "__robertRecorderEvent";

/// Installed on every document; guarded so re-running it is a no-op
pub static LISTENER_SCRIPT: Lazy<String> = Lazy::new(|| {
    LISTENER_TEMPLATE
        .replace("__SENSITIVE_PATTERN__", SENSITIVE_FIELD_PATTERN)
        .replace("__MASK_MARKER__", MASK_MARKER)
});

const LISTENER_TEMPLATE: &str = r#"(() => {
    if (window.__robertRecorderInstalled) return true;
    window.__robertRecorderInstalled = true;

    const STYLE_PROPS = ['display', 'visibility', 'position', 'z-index', 'opacity'];
    const KEYS = ['Enter', 'Tab', 'Escape', 'Backspace', 'Delete'];
    const SENSITIVE = new RegExp("__SENSITIVE_PATTERN__", 'i');
    const VALUE_ATTRS = ['value', 'data-value'];
    const MASK = "__MASK_MARKER__";
    const OPAQUE = ['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE'];

    const isSensitive = (el) => {
        if (!el || el.nodeType !== Node.ELEMENT_NODE) return false;
        if ((el.getAttribute('type') || '').trim().toLowerCase() === 'password') return true;
        return ['name', 'id', 'autocomplete'].some((a) => {
            const v = el.getAttribute(a);
            return v !== null && SENSITIVE.test(v);
        });
    };
    const holdsTypedText = (el) => el.tagName === 'TEXTAREA'
        || (el.hasAttribute('contenteditable') && el.getAttribute('contenteditable').toLowerCase() !== 'false');

    // Layout is read only along the target's ancestor chain
    const snapshot = (target) => {
        const nodes = [];
        const measured = new Set();
        for (let n = target; n; n = n.parentElement) measured.add(n);
        let targetIndex = null;
        const walk = (node, parent, redactText) => {
            if (node.nodeType === Node.TEXT_NODE) {
                if (node.data.trim()) nodes.push({ parent, text: redactText ? MASK : node.data });
                return;
            }
            if (node.nodeType !== Node.ELEMENT_NODE) return;
            const index = nodes.length;
            if (node === target) targetIndex = index;
            const sensitive = isSensitive(node);
            const entry = {
                parent,
                tag: node.tagName.toLowerCase(),
                attributes: Array.from(node.attributes, (a) =>
                    [a.name, sensitive && VALUE_ATTRS.includes(a.name) ? MASK : a.value]),
            };
            if (measured.has(node)) {
                const rect = node.getBoundingClientRect();
                const computed = getComputedStyle(node);
                entry.rect = { x: rect.x, y: rect.y, width: rect.width, height: rect.height };
                entry.style = {};
                for (const prop of STYLE_PROPS) entry.style[prop] = computed.getPropertyValue(prop);
            }
            nodes.push(entry);
            if (OPAQUE.includes(node.tagName)) return;
            const redactChildren = redactText || (sensitive && holdsTypedText(node));
            for (const child of node.childNodes) walk(child, index, redactChildren);
        };
        walk(document.documentElement, null, false);
        return { nodes, target: targetIndex };
    };

    const fieldValue = (el) => isSensitive(el) ? MASK : String(el.value ?? '');

    const send = (event, target) => {
        try {
            const payload = {
                event: Object.assign({ timestamp: Date.now(), pageUrl: location.href }, event),
                snapshot: target ? snapshot(target) : null,
            };
            window.__robertRecorderEvent(JSON.stringify(payload));
        } catch (_) {}
    };

    document.addEventListener('click', (e) => send({
        type: 'click',
        clientX: e.clientX, clientY: e.clientY, pageX: e.pageX, pageY: e.pageY,
        button: e.button,
    }, e.target), true);
    document.addEventListener('input', (e) => send({ type: 'input', value: fieldValue(e.target) }, e.target), true);
    document.addEventListener('change', (e) => send({
        type: 'change',
        checked: typeof e.target.checked === 'boolean' ? e.target.checked : null,
        value: e.target.value == null ? null : fieldValue(e.target),
        selectedIndex: typeof e.target.selectedIndex === 'number' ? e.target.selectedIndex : null,
    }, e.target), true);
    document.addEventListener('submit', (e) => send({ type: 'submit' }, e.target), true);
    document.addEventListener('keydown', (e) => {
        if (!KEYS.includes(e.key)) return;
        send({
            type: 'keypress',
            key: e.key,
            modifiers: { alt: e.altKey, ctrl: e.ctrlKey, meta: e.metaKey, shift: e.shiftKey },
        }, e.target);
    }, true);
    document.addEventListener('focusin', (e) => send({ type: 'focus' }, e.target), true);
    document.addEventListener('focusout', (e) => send({ type: 'blur' }, e.target), true);

    let scrollTimer = null;
    window.addEventListener('scroll', () => {
        clearTimeout(scrollTimer);
        scrollTimer = setTimeout(() => send({ type: 'scroll', scrollX: window.scrollX, scrollY: window.scrollY }, null), 250);
    }, true);

    const navigation = (trigger) => send({ type: 'navigation', url: location.href, trigger }, null);
    for (const [method, trigger] of [['pushState', 'pushState'], ['replaceState', 'replaceState']]) {
        const original = history[method];
        history[method] = function (...args) {
            const result = original.apply(this, args);
            navigation(trigger);
            return result;
        };
    }
    window.addEventListener('popstate', () => navigation('popState'));
    window.addEventListener('hashchange', () => navigation('hashChange'));

    const loaded = () => send({ type: 'pageLoad', url: location.href, title: document.title }, null);
    if (document.readyState === 'complete') loaded();
    else window.addEventListener('load', loaded);
    return true;
})()"#;

#[derive(Debug, Deserialize)]
struct Payload {
    event: BrowserEvent,
    #[serde(default)]
    snapshot: Option<DocumentSnapshot>,
}

/// Decode one binding payload into the page it describes and its event.
///
/// The event target is remapped onto the rebuilt document; window-level
/// events come without a snapshot and get an empty document.
pub fn decode_payload(payload: &str) -> Result<(Document, BrowserEvent)> {
    let Payload { mut event, snapshot } = serde_json::from_str(payload)?;
    match snapshot {
        Some(snapshot) => {
            let (document, target) = Document::from_snapshot(&snapshot)?;
            event.target = target;
            Ok((document, event))
        }
        None => {
            event.target = None;
            Ok((Document::new(), event))
        }
    }
}

/// Point `recorder` at the driver's active tab
pub async fn attach(driver: &ChromeDriver, recorder: &Recorder) -> Result<TargetHandle> {
    let page = driver.current_page().await?;
    let probe = ChromeProbe::new(page);
    let target = probe.target();
    recorder.attach_page(target.clone(), Arc::new(probe)).await;
    Ok(target)
}

/// Event forwarding from one tab for as long as this value lives
pub struct LiveRecording {
    task: JoinHandle<()>,
}

impl LiveRecording {
    /// Install the listener on the active tab and start forwarding its events
    pub async fn start(driver: &ChromeDriver, recorder: Recorder) -> Result<Self> {
        let events = driver.add_binding(BINDING_NAME).await?;
        driver.add_script_on_new_document(&LISTENER_SCRIPT).await?;
        driver.execute_script(&LISTENER_SCRIPT).await?;
        log::info!("Listening for page events");
        Ok(Self {
            task: tokio::spawn(forward_events(events, recorder)),
        })
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for LiveRecording {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn forward_events(mut events: EventStream<EventBindingCalled>, recorder: Recorder) {
    while let Some(called) = events.next().await {
        if called.name != BINDING_NAME {
            continue;
        }
        let (document, event) = match decode_payload(&called.payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Dropping malformed page event: {}", e);
                continue;
            }
        };
        match recorder.handle_event(&document, &event).await {
            Ok(Some(step_id)) => log::debug!("{} event recorded as {}", event.kind.name(), step_id),
            Ok(None) => {}
            Err(RecorderError::NotRecording) => {}
            Err(e) => log::warn!("Failed to record {} event: {}", event.kind.name(), e),
        }
    }
    log::debug!("Page event stream ended");
}
