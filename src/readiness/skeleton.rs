//! Loading-indicator detection

use crate::dom::{NodeId, PageHandle};
use serde::{Deserialize, Serialize};

/// Class-name fragments and attribute values that mark loading UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingIndicatorPatterns {
    /// Matched case-insensitively against each class token
    pub class_fragments: Vec<String>,
    /// Exact `(attribute, value)` pairs
    pub attributes: Vec<(String, String)>,
}

impl Default for LoadingIndicatorPatterns {
    fn default() -> Self {
        Self {
            class_fragments: [
                "skeleton",
                "shimmer",
                "spinner",
                "pulse",
                "loading",
                "loader",
                "placeholder-glow",
                "progress-indeterminate",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            attributes: vec![
                ("aria-busy".to_string(), "true".to_string()),
                ("data-loading".to_string(), "true".to_string()),
                ("data-skeleton".to_string(), "true".to_string()),
            ],
        }
    }
}

impl LoadingIndicatorPatterns {
    pub fn matches<P: PageHandle + ?Sized>(&self, page: &P, node: NodeId) -> bool {
        let class_hit = page.class_list(node).iter().any(|class| {
            let class = class.to_ascii_lowercase();
            self.class_fragments
                .iter()
                .any(|fragment| class.contains(fragment.as_str()))
        });
        class_hit
            || self.attributes.iter().any(|(name, value)| {
                page.attribute(node, name)
                    .is_some_and(|actual| actual.trim().eq_ignore_ascii_case(value))
            })
    }
}

/// Attached, not hidden by display/visibility/opacity, and non-zero in size
pub fn is_visible<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> bool {
    if !page.is_connected(node) {
        return false;
    }
    if page.computed_style(node, "display").as_deref() == Some("none") {
        return false;
    }
    if matches!(
        page.computed_style(node, "visibility").as_deref(),
        Some("hidden") | Some("collapse")
    ) {
        return false;
    }
    if page
        .computed_style(node, "opacity")
        .and_then(|o| o.trim().parse::<f64>().ok())
        .is_some_and(|o| o <= 0.0)
    {
        return false;
    }
    !page.bounding_box(node).is_empty()
}

/// Descriptions (`tag.class#id`) of every visible loading indicator
pub fn find_visible_indicators<P: PageHandle + ?Sized>(
    page: &P,
    patterns: &LoadingIndicatorPatterns,
) -> Vec<String> {
    page.elements()
        .into_iter()
        .filter(|node| patterns.matches(page, *node) && is_visible(page, *node))
        .map(|node| describe(page, node))
        .collect()
}

fn describe<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> String {
    let mut out = page.tag_name(node).unwrap_or_default();
    for class in page.class_list(node) {
        out.push('.');
        out.push_str(&class);
    }
    if let Some(id) = page.element_id(node) {
        out.push('#');
        out.push_str(&id);
    }
    out
}
