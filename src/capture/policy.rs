//! When to take the screenshot for each kind of step

use super::event::{EventKind, ElementKind};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureTiming {
    /// Capture right away; the page is about to unload
    Immediate,
    /// Let the resulting DOM update settle first
    AfterReadiness,
    /// Wait for the tab to report load complete, then for readiness
    AfterLoadComplete,
    /// No screenshot for this step
    None,
}

impl CaptureTiming {
    pub fn captures(self) -> bool {
        !matches!(self, CaptureTiming::None)
    }
}

/// Whether following `href` from `current` unloads the current document.
///
/// Empty hrefs, `javascript:` URLs and fragment links into the same page do not.
pub fn is_navigating_href(href: &str, current: Option<&str>) -> bool {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return false;
    }
    if href
        .get(..11)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("javascript:"))
    {
        return false;
    }

    let Some(base) = current.and_then(|c| Url::parse(c).ok()) else {
        return true;
    };
    match base.join(href) {
        Ok(mut target) => {
            if target.fragment().is_none() {
                return true;
            }
            target.set_fragment(None);
            let mut base = base;
            base.set_fragment(None);
            target != base
        }
        Err(_) => true,
    }
}

/// Nearest enclosing anchor of a clicked element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link<'a> {
    pub href: &'a str,
    /// The anchor's `target` attribute
    pub target: Option<&'a str>,
}

impl Link<'_> {
    /// Whether following the link replaces the document it was clicked in.
    ///
    /// `_blank` and named targets load elsewhere and leave this page alive.
    pub fn unloads_page(&self, current: Option<&str>) -> bool {
        let same_context = match self.target.map(str::trim) {
            None | Some("") => true,
            Some(target) => ["_self", "_top", "_parent"]
                .iter()
                .any(|t| target.eq_ignore_ascii_case(t)),
        };
        same_context && is_navigating_href(self.href, current)
    }
}

/// Capture policy for a classified event.
///
/// `link` is the nearest enclosing anchor for clicks.
pub fn capture_timing(
    event: &EventKind,
    element: Option<&ElementKind>,
    link: Option<Link<'_>>,
    current_url: Option<&str>,
) -> CaptureTiming {
    match event {
        EventKind::Click { .. } => match link {
            Some(link) if link.unloads_page(current_url) => CaptureTiming::Immediate,
            _ => CaptureTiming::AfterReadiness,
        },
        EventKind::Submit => match element {
            Some(ElementKind::Form {
                action: Some(action),
                ..
            }) if !is_navigating_href(action, current_url) && !action.trim().is_empty() => {
                CaptureTiming::AfterReadiness
            }
            _ => CaptureTiming::Immediate,
        },
        EventKind::Navigation { .. } => CaptureTiming::AfterReadiness,
        EventKind::PageLoad { .. } => CaptureTiming::AfterLoadComplete,
        EventKind::Input { .. }
        | EventKind::Change { .. }
        | EventKind::Keypress { .. }
        | EventKind::Scroll { .. }
        | EventKind::Focus
        | EventKind::Blur
        | EventKind::Hover => CaptureTiming::None,
    }
}
