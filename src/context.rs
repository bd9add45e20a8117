//! Element snapshots attached to recorded steps

use crate::capture::masking::{holds_typed_text, recorded_attributes, should_mask};
use crate::config::MASK_MARKER;
use crate::dom::{normalize_whitespace, NodeId, PageHandle, Rect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default limit for recorded text, ellipsis included
pub const DEFAULT_TEXT_LIMIT: usize = 100;

const ELLIPSIS: &str = "...";
const HASH_TEXT_PREFIX: usize = 20;

/// Computed style properties kept in a context
pub const CONTEXT_STYLE_PROPERTIES: &[&str] = &["display", "visibility", "position", "z-index", "opacity"];

/// Tags whose label usually lives in descendant markup (`<button><span>Save</span></button>`)
const INTERACTIVE_TAGS: &[&str] = &["button", "a", "label", "option", "summary"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementContext {
    pub tag_name: String,
    pub attributes: BTreeMap<String, String>,
    pub text_content: String,
    pub bounding_box: Rect,
    pub computed_styles: BTreeMap<String, String>,
    pub element_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_context: Option<ParentContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentContext {
    pub tag_name: String,
    pub attributes: BTreeMap<String, String>,
    pub text_content: String,
}

/// Snapshot an element for auditing and later re-identification.
///
/// Values of sensitive fields are replaced by the mask marker, in the
/// element itself and in its parent.
pub fn extract_context<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> ElementContext {
    extract_context_limited(page, node, DEFAULT_TEXT_LIMIT, MASK_MARKER)
}

pub fn extract_context_limited<P: PageHandle + ?Sized>(
    page: &P,
    node: NodeId,
    text_limit: usize,
    mask_marker: &str,
) -> ElementContext {
    let tag_name = page.tag_name(node).unwrap_or_default();

    let computed_styles = CONTEXT_STYLE_PROPERTIES
        .iter()
        .filter_map(|property| {
            page.computed_style(node, property)
                .map(|value| (property.to_string(), value))
        })
        .collect();

    let parent_context = page
        .parent_element(node)
        .and_then(|parent| {
            let tag = page.tag_name(parent)?;
            if tag == "body" || tag == "html" {
                return None;
            }
            let text = normalize_whitespace(&page.own_text(parent));
            Some(ParentContext {
                tag_name: tag,
                attributes: recorded_attributes(page, parent, mask_marker),
                text_content: masked_text(page, parent, truncate_text(&text, text_limit), mask_marker),
            })
        });

    ElementContext {
        attributes: recorded_attributes(page, node, mask_marker),
        text_content: masked_text(
            page,
            node,
            truncate_text(&visible_text(page, node), text_limit),
            mask_marker,
        ),
        bounding_box: page.bounding_box(node),
        computed_styles,
        element_hash: element_hash(page, node),
        parent_context,
        tag_name,
    }
}

/// Typed text of a sensitive textarea or editable region becomes the marker
fn masked_text<P: PageHandle + ?Sized>(page: &P, node: NodeId, text: String, marker: &str) -> String {
    if !text.is_empty() && holds_typed_text(page, node) && should_mask(page, node) {
        marker.to_string()
    } else {
        text
    }
}

/// Own text, or descendant text for elements whose label is nested markup
pub fn visible_text<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> String {
    let own = normalize_whitespace(&page.own_text(node));
    if !own.is_empty() {
        return own;
    }
    match page.tag_name(node) {
        Some(tag) if INTERACTIVE_TAGS.contains(&tag.as_str()) => {
            normalize_whitespace(&page.text_content(node))
        }
        _ => own,
    }
}

/// Cut `text` to at most `limit` characters, marking the cut with `...`
pub fn truncate_text(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// Cheap similarity fingerprint: FNV-1a over tag, classes, id and leading
/// own text, in base 36. Distinct elements can and do collide.
pub fn element_hash<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> String {
    let text: String = if holds_typed_text(page, node) && should_mask(page, node) {
        String::new()
    } else {
        normalize_whitespace(&page.own_text(node))
            .chars()
            .take(HASH_TEXT_PREFIX)
            .collect()
    };
    let source = format!(
        "{}|{}|{}|{}",
        page.tag_name(node).unwrap_or_default(),
        page.class_list(node).join(" "),
        page.element_id(node).unwrap_or_default(),
        text
    );

    let mut hash: u32 = 0x811c_9dc5;
    for byte in source.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    to_base36(hash)
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
