//! XPath subset used by generated locators
//!
//! Location paths only: `/html/body/div[2]`, `//*[@id="main"]/ul/li[3]`,
//! `//button[@name="go"]`. Steps are a name test (`tag` or `*`) followed by
//! attribute-equality or positional predicates.

use super::{NodeId, PageHandle};
use crate::error::SelectorError;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    descendant: bool,
    name: Option<String>,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    AttributeEquals(String, String),
}

/// Evaluate an XPath location path, returning elements in document order
pub fn evaluate<P: PageHandle + ?Sized>(
    page: &P,
    expression: &str,
) -> Result<Vec<NodeId>, SelectorError> {
    let steps = parse(expression)?;
    let mut context: Vec<Option<NodeId>> = vec![None];

    for step in &steps {
        let mut scopes: Vec<Option<NodeId>> = Vec::new();
        if step.descendant {
            for scope in &context {
                scopes.push(*scope);
                let start = match scope {
                    Some(node) => page.element_children(*node),
                    None => page.document_element().into_iter().collect(),
                };
                let mut stack = start;
                while let Some(node) = stack.pop() {
                    scopes.push(Some(node));
                    stack.extend(page.element_children(node));
                }
            }
        } else {
            scopes = context.clone();
        }

        let mut next: Vec<Option<NodeId>> = Vec::new();
        for scope in scopes {
            for node in child_step(page, scope, step) {
                if !next.contains(&Some(node)) {
                    next.push(Some(node));
                }
            }
        }
        context = next;
    }

    let order: HashMap<NodeId, usize> = page
        .elements()
        .into_iter()
        .enumerate()
        .map(|(i, node)| (node, i))
        .collect();
    let mut result: Vec<NodeId> = context.into_iter().flatten().collect();
    result.retain(|node| order.contains_key(node));
    result.sort_by_key(|node| order[node]);
    Ok(result)
}

fn child_step<P: PageHandle + ?Sized>(
    page: &P,
    scope: Option<NodeId>,
    step: &Step,
) -> Vec<NodeId> {
    let children = match scope {
        Some(node) => page.element_children(node),
        None => page.document_element().into_iter().collect(),
    };
    let mut candidates: Vec<NodeId> = children
        .into_iter()
        .filter(|child| match &step.name {
            Some(name) => page.tag_name(*child).as_deref() == Some(name.as_str()),
            None => true,
        })
        .collect();

    for predicate in &step.predicates {
        candidates = match predicate {
            Predicate::Position(n) => candidates.get(n - 1).copied().into_iter().collect(),
            Predicate::AttributeEquals(name, value) => candidates
                .into_iter()
                .filter(|c| page.attribute(*c, name).as_deref() == Some(value.as_str()))
                .collect(),
        };
    }
    candidates
}

/// Quote a string as an XPath literal
pub fn literal(value: &str) -> Option<String> {
    if !value.contains('"') {
        Some(format!("\"{}\"", value))
    } else if !value.contains('\'') {
        Some(format!("'{}'", value))
    } else {
        None
    }
}

fn parse(expression: &str) -> Result<Vec<Step>, SelectorError> {
    let unsupported = || SelectorError::UnsupportedXPath(expression.to_string());
    let expr = expression.trim();
    if expr.is_empty() {
        return Err(SelectorError::Empty);
    }
    if !expr.starts_with('/') {
        return Err(unsupported());
    }

    let chars: Vec<char> = expr.chars().collect();
    let mut pos = 0;
    let mut steps = Vec::new();

    while pos < chars.len() {
        if chars[pos] != '/' {
            return Err(unsupported());
        }
        pos += 1;
        let descendant = chars.get(pos) == Some(&'/');
        if descendant {
            pos += 1;
        }

        let start = pos;
        while pos < chars.len() && (chars[pos].is_alphanumeric() || matches!(chars[pos], '-' | '_' | '*')) {
            pos += 1;
        }
        let name: String = chars[start..pos].iter().collect();
        if name.is_empty() || (name.contains('*') && name != "*") {
            return Err(unsupported());
        }

        let mut predicates = Vec::new();
        while chars.get(pos) == Some(&'[') {
            let close = chars[pos..]
                .iter()
                .position(|c| *c == ']')
                .map(|offset| pos + offset)
                .ok_or_else(|| SelectorError::Unterminated {
                    selector: expression.to_string(),
                    what: "predicate",
                })?;
            let body: String = chars[pos + 1..close].iter().collect();
            predicates.push(parse_predicate(body.trim()).ok_or_else(unsupported)?);
            pos = close + 1;
        }

        steps.push(Step {
            descendant,
            name: (name != "*").then(|| name.to_ascii_lowercase()),
            predicates,
        });
    }

    Ok(steps)
}

fn parse_predicate(body: &str) -> Option<Predicate> {
    if let Ok(n) = body.parse::<usize>() {
        return (n > 0).then_some(Predicate::Position(n));
    }
    let rest = body.strip_prefix('@')?;
    let (name, value) = rest.split_once('=')?;
    let value = value.trim();
    let quote = value.chars().next()?;
    if !(quote == '"' || quote == '\'') || value.len() < 2 || !value.ends_with(quote) {
        return None;
    }
    Some(Predicate::AttributeEquals(
        name.trim().to_ascii_lowercase(),
        value[1..value.len() - 1].to_string(),
    ))
}
