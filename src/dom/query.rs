//! CSS selector subset used by generated locators
//!
//! Supported: type and universal selectors, `#id`, `.class`, `[attr]`,
//! `[attr="value"]`, `:nth-of-type(n)`, `:has-text("text")`, descendant and
//! child combinators, and comma-separated lists. `:has-text` matches elements
//! whose whitespace-normalized own text contains the given string.

use super::{normalize_whitespace, position_of_type, NodeId, PageHandle};
use crate::error::SelectorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList(pub Vec<ComplexSelector>);

/// Compound selectors joined by combinators, stored left to right
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexSelector {
    pub head: Compound,
    pub tail: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    pub tag: Option<String>,
    pub parts: Vec<SimpleSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleSelector {
    Id(String),
    Class(String),
    HasAttribute(String),
    AttributeEquals(String, String),
    NthOfType(usize),
    HasText(String),
}

/// Parse a selector string
pub fn parse(selector: &str) -> Result<SelectorList, SelectorError> {
    Parser::new(selector).parse_list()
}

/// All connected elements matching `selector`, in document order
pub fn select_all<P: PageHandle + ?Sized>(
    page: &P,
    selector: &str,
) -> Result<Vec<NodeId>, SelectorError> {
    let list = parse(selector)?;
    Ok(page
        .elements()
        .into_iter()
        .filter(|node| matches(page, *node, &list))
        .collect())
}

pub fn matches<P: PageHandle + ?Sized>(page: &P, node: NodeId, list: &SelectorList) -> bool {
    list.0.iter().any(|complex| matches_complex(page, node, complex))
}

fn matches_complex<P: PageHandle + ?Sized>(
    page: &P,
    node: NodeId,
    complex: &ComplexSelector,
) -> bool {
    // Flatten to right-to-left order: [rightmost, ..., head]
    let mut compounds: Vec<&Compound> = complex.tail.iter().map(|(_, c)| c).collect();
    compounds.reverse();
    compounds.push(&complex.head);
    let mut combinators: Vec<Combinator> = complex.tail.iter().map(|(c, _)| *c).collect();
    combinators.reverse();

    matches_from(page, node, &compounds, &combinators)
}

fn matches_from<P: PageHandle + ?Sized>(
    page: &P,
    node: NodeId,
    compounds: &[&Compound],
    combinators: &[Combinator],
) -> bool {
    let Some((first, rest)) = compounds.split_first() else {
        return true;
    };
    if !matches_compound(page, node, first) {
        return false;
    }
    let Some((combinator, rest_combinators)) = combinators.split_first() else {
        return true;
    };
    match combinator {
        Combinator::Child => page
            .parent_element(node)
            .is_some_and(|parent| matches_from(page, parent, rest, rest_combinators)),
        Combinator::Descendant => {
            let mut ancestor = page.parent_element(node);
            while let Some(candidate) = ancestor {
                if matches_from(page, candidate, rest, rest_combinators) {
                    return true;
                }
                ancestor = page.parent_element(candidate);
            }
            false
        }
    }
}

fn matches_compound<P: PageHandle + ?Sized>(page: &P, node: NodeId, compound: &Compound) -> bool {
    let Some(tag) = page.tag_name(node) else {
        return false;
    };
    if let Some(expected) = &compound.tag {
        if !expected.eq_ignore_ascii_case(&tag) {
            return false;
        }
    }
    compound.parts.iter().all(|part| match part {
        SimpleSelector::Id(id) => page.attribute(node, "id").as_deref() == Some(id.as_str()),
        SimpleSelector::Class(class) => page.class_list(node).iter().any(|c| c == class),
        SimpleSelector::HasAttribute(name) => page.attribute(node, name).is_some(),
        SimpleSelector::AttributeEquals(name, value) => {
            page.attribute(node, name).as_deref() == Some(value.as_str())
        }
        SimpleSelector::NthOfType(n) => {
            position_of_type(page, node).is_some_and(|(position, _)| position == *n)
        }
        SimpleSelector::HasText(text) => normalize_whitespace(&page.own_text(node)).contains(text),
    })
}

/// Quote a string for use as a CSS attribute value or pseudo-class argument
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\a "),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Whether `value` can be written bare after `#` or `.`
pub fn is_plain_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        Some('-') => match chars.clone().next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        },
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn unexpected(&self) -> SelectorError {
        match self.peek() {
            Some(found) => SelectorError::Unexpected {
                selector: self.source.to_string(),
                offset: self.pos,
                found,
            },
            None => SelectorError::Unterminated {
                selector: self.source.to_string(),
                what: "selector",
            },
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self) -> Result<SelectorList, SelectorError> {
        if self.source.trim().is_empty() {
            return Err(SelectorError::Empty);
        }
        let mut list = Vec::new();
        loop {
            self.skip_whitespace();
            list.push(self.parse_complex()?);
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some(',') => self.pos += 1,
                Some(_) => return Err(self.unexpected()),
            }
        }
        Ok(SelectorList(list))
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, SelectorError> {
        let head = self.parse_compound()?;
        let mut tail = Vec::new();
        loop {
            let had_space = self.skip_whitespace();
            let combinator = match self.peek() {
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    Combinator::Child
                }
                Some(',') | None => break,
                Some(_) if had_space => Combinator::Descendant,
                Some(_) => return Err(self.unexpected()),
            };
            tail.push((combinator, self.parse_compound()?));
        }
        Ok(ComplexSelector { head, tail })
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        let start = self.pos;

        match self.peek() {
            Some('*') => {
                self.pos += 1;
            }
            Some(c) if c.is_alphabetic() => {
                compound.tag = Some(self.parse_identifier()?.to_ascii_lowercase());
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.parts.push(SimpleSelector::Id(self.parse_identifier()?));
                }
                Some('.') => {
                    self.pos += 1;
                    compound
                        .parts
                        .push(SimpleSelector::Class(self.parse_identifier()?));
                }
                Some('[') => {
                    self.pos += 1;
                    compound.parts.push(self.parse_attribute()?);
                }
                Some(':') => {
                    self.pos += 1;
                    compound.parts.push(self.parse_pseudo()?);
                }
                _ => break,
            }
        }

        if self.pos == start {
            return Err(self.unexpected());
        }
        Ok(compound)
    }

    fn parse_identifier(&mut self) -> Result<String, SelectorError> {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                let escaped = self.peek().ok_or_else(|| SelectorError::Unterminated {
                    selector: self.source.to_string(),
                    what: "escape",
                })?;
                ident.push(escaped);
                self.pos += 1;
            } else if c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
                ident.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if ident.is_empty() {
            return Err(self.unexpected());
        }
        Ok(ident)
    }

    fn parse_string(&mut self) -> Result<String, SelectorError> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return self.parse_identifier(),
        };
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(SelectorError::Unterminated {
                        selector: self.source.to_string(),
                        what: "string",
                    })
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some('a') => {
                            value.push('\n');
                            self.pos += 1;
                            if self.peek() == Some(' ') {
                                self.pos += 1;
                            }
                        }
                        Some(c) => {
                            value.push(c);
                            self.pos += 1;
                        }
                        None => continue,
                    }
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(value);
                }
                Some(c) => {
                    value.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn parse_attribute(&mut self) -> Result<SimpleSelector, SelectorError> {
        self.skip_whitespace();
        let name = self.parse_identifier()?.to_ascii_lowercase();
        self.skip_whitespace();
        let selector = match self.peek() {
            Some(']') => SimpleSelector::HasAttribute(name),
            Some('=') => {
                self.pos += 1;
                self.skip_whitespace();
                let value = self.parse_string()?;
                self.skip_whitespace();
                SimpleSelector::AttributeEquals(name, value)
            }
            None => {
                return Err(SelectorError::Unterminated {
                    selector: self.source.to_string(),
                    what: "attribute selector",
                })
            }
            Some(_) => return Err(self.unexpected()),
        };
        if self.peek() != Some(']') {
            return Err(self.unexpected());
        }
        self.pos += 1;
        Ok(selector)
    }

    fn parse_pseudo(&mut self) -> Result<SimpleSelector, SelectorError> {
        let name = self.parse_identifier()?.to_ascii_lowercase();
        if self.peek() != Some('(') {
            return Err(SelectorError::UnsupportedPseudo(name));
        }
        self.pos += 1;
        self.skip_whitespace();
        let selector = match name.as_str() {
            "nth-of-type" => {
                let digits = self.parse_identifier()?;
                let n = digits
                    .parse::<usize>()
                    .map_err(|_| SelectorError::UnsupportedPseudo(format!("nth-of-type({})", digits)))?;
                SimpleSelector::NthOfType(n)
            }
            "has-text" => SimpleSelector::HasText(self.parse_string()?),
            _ => return Err(SelectorError::UnsupportedPseudo(name)),
        };
        self.skip_whitespace();
        if self.peek() != Some(')') {
            return Err(SelectorError::Unterminated {
                selector: self.source.to_string(),
                what: "pseudo-class argument",
            });
        }
        self.pos += 1;
        Ok(selector)
    }
}
