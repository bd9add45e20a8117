//! Heuristics for values that churn between renders
//!
//! Applied to ids, data-attribute values and class names. The patterns err on
//! the side of calling a value dynamic: skipping a stable value only costs a
//! weaker locator, trusting a generated one breaks the step on replay.

use once_cell::sync::Lazy;
use regex::Regex;

/// Framework-issued id patterns (React `useId`, Radix, MUI, Headless UI, ...)
static DYNAMIC_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^:r[0-9a-z]*:$",
        r"^«r[0-9a-z]*»$",
        r"^radix-",
        r"^mui-\d+",
        r"^headlessui-",
        r"^react-select-\d+",
        r"^react-aria\d*-",
        r"^downshift-\d+",
        r"^ember\d+$",
        r"^ext-gen\d+",
        r"^yui_",
        r"^ng-\d+",
        r"^cdk-[a-z-]+-\d+",
        r"^mat-[a-z-]+-\d+",
        r"^rc-[a-z-]+-\d+",
        r"^__next_",
        r"^uid-\d+",
        r"^id-\d+",
        r"-\d+$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid regex"))
    .collect()
});

/// Hashed class names from CSS modules, styled-components, emotion, JSS
static DYNAMIC_CLASS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^[A-Za-z][A-Za-z0-9]*_[A-Za-z0-9]+__[A-Za-z0-9_-]{5,}$",
        r"^sc-[A-Za-z0-9]+$",
        r"^css-[a-z0-9]+(-[A-Za-z0-9]+)?$",
        r"^emotion-\d+$",
        r"^jss\d+$",
        r"^makeStyles-[A-Za-z]+-\d+$",
        r"^[A-Za-z]+-[A-Za-z]+-\d+$",
        r"^svelte-[a-z0-9]+$",
        r"^_[A-Za-z0-9]{5,}$",
        r"^[a-z]{1,2}[0-9][a-z0-9]{3,}$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid regex"))
    .collect()
});

/// Layout/utility classes (Tailwind, Bootstrap helpers) and transient state
static UTILITY_CLASS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^-?(m|p)[trblxyse]?-",
        r"^(w|h|min-w|min-h|max-w|max-h|gap|space-[xy]|inset|top|left|right|bottom|z|order)-",
        r"^(text|bg|border|rounded|shadow|font|leading|tracking|opacity|ring|outline|fill|stroke|cursor|overflow|object|justify|items|content|self|place|grid-cols|grid-rows|col|row|flex|basis|grow|shrink|transition|duration|ease|delay|animate|translate|scale|rotate|skew|origin|divide|from|via|to|decoration|underline-offset|line-clamp)-",
        r"^(flex|grid|block|inline|inline-block|inline-flex|hidden|contents|table|relative|absolute|fixed|sticky|static|truncate|italic|underline|uppercase|lowercase|capitalize|container|clearfix|sr-only|visible|invisible|grow|shrink)$",
        r"^(d|col|offset|order|g|gx|gy)-(sm-|md-|lg-|xl-|xxl-)?\d+$",
        r"^(active|focus|focused|hover|hovered|disabled|selected|open|opened|closed|checked|expanded|collapsed|show|shown|visible|loading|is-[a-z-]+|has-[a-z-]+)$",
        r":",
        r"/",
        r"\[",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid regex"))
    .collect()
});

/// Hex run of 8+ characters that includes at least one digit
static HEX_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8,}").expect("valid regex")
});

static LONG_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{5,}").expect("valid regex"));

static UNDERSCORE_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_\d+").expect("valid regex"));

/// Patterns shared by every kind of value
fn has_generated_shape(value: &str) -> bool {
    if HEX_RUN
        .find_iter(value)
        .any(|m| m.as_str().chars().any(|c| c.is_ascii_digit()))
    {
        return true;
    }
    if LONG_DIGITS.is_match(value) || UNDERSCORE_DIGITS.is_match(value) {
        return true;
    }
    if value.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    is_interleaved_alphanumeric(value)
}

/// Long alphanumeric strings where letters and digits alternate often,
/// e.g. `a1b2c3d4e5f6g7h8` or `x9k2m1q7`
fn is_interleaved_alphanumeric(value: &str) -> bool {
    if value.len() < 8 || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < 3 {
        return false;
    }
    let transitions = value
        .as_bytes()
        .windows(2)
        .filter(|pair| pair[0].is_ascii_digit() != pair[1].is_ascii_digit())
        .count();
    transitions >= 4
}

/// Whether an id looks generated and must not be used in a locator
pub fn is_dynamic_id(id: &str) -> bool {
    let id = id.trim();
    if id.is_empty() {
        return true;
    }
    has_generated_shape(id) || DYNAMIC_ID_PATTERNS.iter().any(|re| re.is_match(id))
}

/// Whether a data-attribute or aria value looks generated
pub fn is_dynamic_value(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return true;
    }
    has_generated_shape(value) || DYNAMIC_ID_PATTERNS.iter().any(|re| re.is_match(value))
}

/// Whether a class name is a build-time hash or framework-generated
pub fn is_dynamic_class(class: &str) -> bool {
    has_generated_shape(class) || DYNAMIC_CLASS_PATTERNS.iter().any(|re| re.is_match(class))
}

/// Whether a class only describes layout/appearance or transient state
pub fn is_utility_class(class: &str) -> bool {
    UTILITY_CLASS_PATTERNS.iter().any(|re| re.is_match(class))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framework_ids_are_dynamic() {
        for id in [
            "radix-42",
            ":r1a:",
            "mui-123",
            "headlessui-menu-button-3",
            "react-select-2-input",
            "ember421",
            "a1b2c3d4e5f6g7h8",
            "5f3a9c2e7b1d",
            "123456",
            "row_17",
            "input-7",
        ] {
            assert!(is_dynamic_id(id), "{} should be dynamic", id);
        }
    }

    #[test]
    fn test_stable_ids_are_trusted() {
        for id in ["submit-btn", "main", "login-form", "nav", "search_box", "header2"] {
            assert!(!is_dynamic_id(id), "{} should be stable", id);
        }
    }

    #[test]
    fn test_hashed_classes_are_dynamic() {
        for class in [
            "Button_primary__a1B2c",
            "sc-bdVaJa",
            "css-1x2y3z",
            "jss12",
            "makeStyles-root-7",
            "svelte-1k2j3h",
        ] {
            assert!(is_dynamic_class(class), "{} should be dynamic", class);
        }
        for class in ["btn", "btn-primary", "card", "nav-item"] {
            assert!(!is_dynamic_class(class), "{} should be stable", class);
        }
    }

    #[test]
    fn test_utility_classes() {
        for class in ["mt-4", "px-2", "flex", "text-sm", "hover:bg-blue-500", "w-1/2", "active", "col-md-6"] {
            assert!(is_utility_class(class), "{} should be utility", class);
        }
        for class in ["btn", "card-title", "search-input"] {
            assert!(!is_utility_class(class), "{} should not be utility", class);
        }
    }

    #[test]
    fn test_empty_values_are_untrusted() {
        assert!(is_dynamic_id(""));
        assert!(is_dynamic_value("   "));
    }
}
