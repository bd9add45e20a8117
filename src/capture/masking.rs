//! Sensitive input masking

use crate::dom::{NodeId, PageHandle};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;

/// Field names, ids and autocomplete tokens that hold secrets, matched
/// case-insensitively. Also embedded in the in-page listener script, so it
/// must stay valid JavaScript regex syntax.
pub const SENSITIVE_FIELD_PATTERN: &str = r"(passw(or)?d|passwd|pwd|passcode|secret|token|api[-_]?key|credit|card[-_]?(num|number|no)?|(^|[^a-z])cc([^a-z]|$)|cc-?(number|exp|csc)|cvv|cvc|csc|ssn|social[-_]?security|(^|[^a-z])pin([^a-z]|$)|one-time-code|otp|iban|routing|account[-_]?(number|no))";

/// Attributes that can mirror what was typed into a field
pub const VALUE_ATTRIBUTES: &[&str] = &["value", "data-value"];

static SENSITIVE_FIELD: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(SENSITIVE_FIELD_PATTERN)
        .case_insensitive(true)
        .build()
        .expect("valid regex")
});

/// Whether a field name/id/autocomplete token looks sensitive
pub fn is_sensitive_name(name: &str) -> bool {
    SENSITIVE_FIELD.is_match(name)
}

/// Whether input on this element must be masked.
///
/// Password fields always are. Other fields are masked when their `name`,
/// `id` or `autocomplete` looks sensitive, whatever their declared type.
pub fn should_mask<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> bool {
    let is_password = page
        .attribute(node, "type")
        .is_some_and(|t| t.trim().eq_ignore_ascii_case("password"));
    if is_password {
        return true;
    }
    ["name", "id", "autocomplete"]
        .iter()
        .filter_map(|attribute| page.attribute(node, attribute))
        .any(|value| is_sensitive_name(&value))
}

/// Elements whose text content is what the user typed
pub fn holds_typed_text<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> bool {
    page.tag_name(node).as_deref() == Some("textarea")
        || page
            .attribute(node, "contenteditable")
            .is_some_and(|v| !v.eq_ignore_ascii_case("false"))
}

/// Attributes of `node` as recorded: value-carrying ones replaced by
/// `marker` when the element is sensitive
pub fn recorded_attributes<P: PageHandle + ?Sized>(
    page: &P,
    node: NodeId,
    marker: &str,
) -> BTreeMap<String, String> {
    let mask = should_mask(page, node);
    page.attributes(node)
        .into_iter()
        .map(|(name, value)| {
            if mask && VALUE_ATTRIBUTES.contains(&name.as_str()) {
                (name, marker.to_string())
            } else {
                (name, value)
            }
        })
        .collect()
}

/// The value to record: the marker when masked, the value otherwise
pub fn masked_value(value: &str, mask: bool, marker: &str) -> String {
    if mask {
        marker.to_string()
    } else {
        value.to_string()
    }
}
