//! The eight locator strategies, strongest first
//!
//! Each strategy returns `Ok(None)` when it does not apply to the element and
//! `Err` when evaluating it against the document failed; the engine treats
//! both as "no candidate".

use super::dynamic::{is_dynamic_class, is_dynamic_id, is_dynamic_value, is_utility_class};
use crate::dom::query::{is_plain_identifier, quote};
use crate::dom::{normalize_whitespace, position_of_type, xpath, NodeId, PageHandle};
use crate::error::SelectorError;
use serde::{Deserialize, Serialize};

/// Conventional test-id attributes, in preference order
pub const TEST_ID_ATTRIBUTES: &[&str] = &["data-testid", "data-test", "data-cy", "data-automation"];

/// Attributes that describe transient state rather than identity
const STATE_DATA_ATTRIBUTES: &[&str] = &[
    "data-state",
    "data-loading",
    "data-active",
    "data-selected",
    "data-disabled",
    "data-highlighted",
    "data-focus",
    "data-hover",
    "data-orientation",
    "data-side",
    "data-align",
    "data-reactid",
    "data-reactroot",
    "data-v-app",
];

const MAX_CLASS_NAMES: usize = 3;
const MAX_CLASS_MATCHES: usize = 10;
const MAX_TEXT_LENGTH: usize = 50;
const TEXT_TAGS: &[&str] = &["button", "a", "label", "span"];
const NAME_TAGS: &[&str] = &["input", "select", "textarea"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StrategyKind {
    Id,
    DataAttribute,
    Aria,
    Name,
    Class,
    Text,
    CssPath,
    XPath,
}

impl StrategyKind {
    /// All strategies in priority order
    pub const ALL: [StrategyKind; 8] = [
        StrategyKind::Id,
        StrategyKind::DataAttribute,
        StrategyKind::Aria,
        StrategyKind::Name,
        StrategyKind::Class,
        StrategyKind::Text,
        StrategyKind::CssPath,
        StrategyKind::XPath,
    ];

    /// Confidence contributed by a successful candidate of this kind
    pub fn confidence_weight(self) -> i32 {
        match self {
            StrategyKind::Id => 40,
            StrategyKind::DataAttribute => 30,
            StrategyKind::Aria => 25,
            StrategyKind::Name => 20,
            _ => 0,
        }
    }

    pub fn is_xpath(self) -> bool {
        matches!(self, StrategyKind::XPath)
    }

    pub fn generate<P: PageHandle + ?Sized>(
        self,
        page: &P,
        node: NodeId,
    ) -> Result<Option<String>, SelectorError> {
        match self {
            StrategyKind::Id => Ok(id_selector(page, node)),
            StrategyKind::DataAttribute => Ok(data_attribute_selector(page, node)),
            StrategyKind::Aria => Ok(aria_selector(page, node)),
            StrategyKind::Name => Ok(name_selector(page, node)),
            StrategyKind::Class => class_selector(page, node),
            StrategyKind::Text => Ok(text_selector(page, node)),
            StrategyKind::CssPath => Ok(css_path(page, node)),
            StrategyKind::XPath => Ok(xpath_path(page, node)),
        }
    }
}

/// `#id` for a trustworthy id, written as `[id="..."]` when it needs quoting
pub fn id_selector<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> Option<String> {
    let id = page.element_id(node)?;
    if is_dynamic_id(&id) {
        return None;
    }
    Some(id_fragment(&id))
}

fn id_fragment(id: &str) -> String {
    if is_plain_identifier(id) {
        format!("#{}", id)
    } else {
        format!("[id={}]", quote(id))
    }
}

fn trusted_id<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> Option<String> {
    page.element_id(node).filter(|id| !is_dynamic_id(id))
}

pub fn data_attribute_selector<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> Option<String> {
    let attributes = page.attributes(node);

    for preferred in TEST_ID_ATTRIBUTES {
        if let Some((name, value)) = attributes.iter().find(|(n, _)| n == preferred) {
            if !is_dynamic_value(value) {
                return Some(format!("[{}={}]", name, quote(value)));
            }
        }
    }

    attributes
        .iter()
        .filter(|(name, _)| name.starts_with("data-") && !STATE_DATA_ATTRIBUTES.contains(&name.as_str()))
        .find(|(_, value)| !is_dynamic_value(value))
        .map(|(name, value)| format!("[{}={}]", name, quote(value)))
}

pub fn aria_selector<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> Option<String> {
    let tag = page.tag_name(node)?;
    if let Some(label) = page.attribute(node, "aria-label") {
        if !is_dynamic_value(&label) {
            return Some(format!("{}[aria-label={}]", tag, quote(&label)));
        }
    }
    let role = page.attribute(node, "role").filter(|r| !r.trim().is_empty())?;
    let labelled_by = page.attribute(node, "aria-labelledby")?;
    if is_dynamic_value(&labelled_by) {
        return None;
    }
    Some(format!(
        "[role={}][aria-labelledby={}]",
        quote(&role),
        quote(&labelled_by)
    ))
}

pub fn name_selector<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> Option<String> {
    let tag = page.tag_name(node)?;
    if !NAME_TAGS.contains(&tag.as_str()) {
        return None;
    }
    let name = page.attribute(node, "name")?;
    if is_dynamic_value(&name) {
        return None;
    }
    Some(format!("{}[name={}]", tag, quote(&name)))
}

/// Up to three stable classes joined to the tag; rejected when too broad
pub fn class_selector<P: PageHandle + ?Sized>(
    page: &P,
    node: NodeId,
) -> Result<Option<String>, SelectorError> {
    let Some(tag) = page.tag_name(node) else {
        return Ok(None);
    };
    let classes: Vec<String> = page
        .class_list(node)
        .into_iter()
        .filter(|c| is_plain_identifier(c) && !is_utility_class(c) && !is_dynamic_class(c))
        .take(MAX_CLASS_NAMES)
        .collect();
    if classes.is_empty() {
        return Ok(None);
    }

    let selector = format!("{}.{}", tag, classes.join("."));
    let matches = page.query_selector_all(&selector)?;
    if matches.len() > MAX_CLASS_MATCHES {
        log::debug!(
            "Class selector {} matches {} elements, too broad",
            selector,
            matches.len()
        );
        return Ok(None);
    }
    Ok(Some(selector))
}

/// `tag:has-text("...")` from the element's own short text
pub fn text_selector<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> Option<String> {
    let tag = page.tag_name(node)?;
    if !TEXT_TAGS.contains(&tag.as_str()) {
        return None;
    }
    let text = normalize_whitespace(&page.own_text(node));
    if text.is_empty() || text.chars().count() > MAX_TEXT_LENGTH {
        return None;
    }
    Some(format!("{}:has-text({})", tag, quote(&text)))
}

/// Structural path up to `<body>`, anchored on the nearest trustworthy ancestor id
pub fn css_path<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> Option<String> {
    if !page.is_connected(node) {
        return None;
    }
    let tag = page.tag_name(node)?;
    if tag == "body" || tag == "html" {
        return Some(tag);
    }

    let mut segments: Vec<String> = Vec::new();
    let mut current = node;
    loop {
        let tag = page.tag_name(current)?;
        if tag == "body" {
            segments.push(tag);
            break;
        }
        if current != node {
            if let Some(id) = trusted_id(page, current) {
                segments.push(id_fragment(&id));
                break;
            }
        }
        match position_of_type(page, current) {
            Some((_, 1)) => segments.push(tag),
            Some((index, _)) => segments.push(format!("{}:nth-of-type({})", tag, index)),
            // Reached the root without passing through <body>
            None => return None,
        }
        current = page.parent_element(current)?;
    }

    segments.reverse();
    Some(segments.join(" > "))
}

/// Positional XPath, anchored on the nearest trustworthy ancestor id
pub fn xpath_path<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> Option<String> {
    if !page.is_connected(node) {
        return None;
    }

    let mut segments: Vec<String> = Vec::new();
    let mut current = node;
    let prefix = loop {
        let tag = page.tag_name(current)?;
        if current != node {
            if let Some(literal) = trusted_id(page, current).and_then(|id| xpath::literal(&id)) {
                break format!("//*[@id={}]", literal);
            }
        }
        match page.parent_element(current) {
            Some(parent) => {
                let (index, _) = position_of_type(page, current)?;
                segments.push(format!("{}[{}]", tag, index));
                current = parent;
            }
            None => {
                segments.push(tag);
                break String::new();
            }
        }
    };

    segments.reverse();
    Some(format!("{}/{}", prefix, segments.join("/")))
}
