//! Ranked locator generation
//!
//! [`generate_selectors`] runs every [`StrategyKind`] in priority order against
//! an element and assembles the successful candidates into a
//! [`SelectorStrategy`]: the strongest becomes the primary locator, the rest
//! are kept as replay fallbacks, and a 0-100 confidence score summarizes how
//! much the primary can be trusted.

pub mod dynamic;
pub mod strategies;

pub use strategies::StrategyKind;

use crate::dom::{NodeId, PageHandle};
use serde::{Deserialize, Serialize};

/// Locator used when no strategy produced anything
pub const FALLBACK_SELECTOR: &str = "body";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorCandidate {
    pub kind: StrategyKind,
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorStrategy {
    pub primary: String,
    pub fallbacks: Vec<String>,
    /// 0-100
    pub confidence: u8,
}

impl SelectorStrategy {
    pub fn fallback_only() -> Self {
        Self {
            primary: FALLBACK_SELECTOR.to_string(),
            fallbacks: Vec::new(),
            confidence: 0,
        }
    }

    /// Primary locator followed by every fallback
    pub fn all(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.fallbacks.iter().map(String::as_str))
    }
}

/// Candidates from every applicable strategy, in priority order.
///
/// A strategy that errors is logged and skipped so one bad candidate never
/// prevents the others from being produced.
pub fn collect_candidates<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> Vec<SelectorCandidate> {
    let mut candidates: Vec<SelectorCandidate> = Vec::new();
    for kind in StrategyKind::ALL {
        match kind.generate(page, node) {
            Ok(Some(selector)) => {
                if !candidates.iter().any(|c| c.selector == selector) {
                    candidates.push(SelectorCandidate { kind, selector });
                }
            }
            Ok(None) => {}
            Err(e) => log::debug!("{:?} strategy failed for {:?}: {}", kind, node, e),
        }
    }
    candidates
}

/// Build the primary/fallback locator set for an element
pub fn generate_selectors<P: PageHandle + ?Sized>(page: &P, node: NodeId) -> SelectorStrategy {
    let candidates = collect_candidates(page, node);
    let Some((first, rest)) = candidates.split_first() else {
        log::warn!("No selector strategy applied to {:?}, using {}", node, FALLBACK_SELECTOR);
        return SelectorStrategy::fallback_only();
    };

    let confidence = score(page, first, &candidates);
    SelectorStrategy {
        primary: first.selector.clone(),
        fallbacks: rest.iter().map(|c| c.selector.clone()).collect(),
        confidence,
    }
}

fn score<P: PageHandle + ?Sized>(
    page: &P,
    primary: &SelectorCandidate,
    candidates: &[SelectorCandidate],
) -> u8 {
    let mut score: i32 = candidates.iter().map(|c| c.kind.confidence_weight()).sum();

    if candidates.len() >= 3 {
        score += 10;
    }

    let matched = if primary.kind.is_xpath() {
        page.evaluate_xpath(&primary.selector)
    } else {
        page.query_selector_all(&primary.selector)
    };
    match matched {
        Ok(nodes) if nodes.len() == 1 => score += 20,
        Ok(nodes) if !nodes.is_empty() && nodes.len() <= 5 => score += 10,
        Ok(_) => {}
        Err(e) => {
            log::debug!("Primary selector {} failed to evaluate: {}", primary.selector, e);
            score -= 10;
        }
    }

    score.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    #[test]
    fn test_stable_id_wins() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let button = doc.element(
            body,
            "button",
            &[("id", "submit-btn"), ("data-testid", "submit"), ("class", "btn btn-primary")],
        );
        doc.append_text(button, "Submit");

        let strategy = generate_selectors(&doc, button);
        assert_eq!(strategy.primary, "#submit-btn");
        assert_eq!(strategy.fallbacks[0], "[data-testid=\"submit\"]");
        assert!(strategy.fallbacks.contains(&"button:has-text(\"Submit\")".to_string()));
        assert!(strategy.fallbacks.iter().any(|f| f.starts_with("/html")));
        // 40 + 30 + 10 (candidate count) + 20 (unique), capped
        assert_eq!(strategy.confidence, 100);
    }

    #[test]
    fn test_dynamic_id_is_skipped() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let button = doc.element(body, "button", &[("id", "radix-42"), ("aria-label", "Close")]);

        let strategy = generate_selectors(&doc, button);
        assert_eq!(strategy.primary, "button[aria-label=\"Close\"]");
        assert!(strategy.all().all(|s| !s.contains("radix-42")));
    }

    #[test]
    fn test_structural_only_element() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        doc.element(body, "div", &[]);
        let div = doc.element(body, "div", &[]);

        let strategy = generate_selectors(&doc, div);
        assert_eq!(strategy.primary, "body > div:nth-of-type(2)");
        assert_eq!(strategy.fallbacks, vec!["/html/body[1]/div[2]".to_string()]);
        assert_eq!(strategy.confidence, 20);
    }

    #[test]
    fn test_detached_element_falls_back_to_body() {
        let mut doc = Document::new();
        let orphan = doc.create_element("span");
        let strategy = generate_selectors(&doc, orphan);
        assert_eq!(strategy, SelectorStrategy::fallback_only());
    }
}
