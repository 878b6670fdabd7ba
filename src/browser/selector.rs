//! Element selectors
//!
//! Scenario files use a small prefix syntax that maps onto the locator
//! strategies WebDriver understands.

use std::fmt;

/// A parsed element selector
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Css(String),
    XPath(String),
    LinkText(String),
    /// Element whose normalized text contains the value
    Text(String),
}

impl Selector {
    /// Parse `css=`, `xpath=`, `text=`, `link=` prefixes; `//` starts XPath
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix("xpath=") {
            Self::XPath(rest.to_string())
        } else if let Some(rest) = s.strip_prefix("text=") {
            Self::Text(strip_quotes(rest).to_string())
        } else if let Some(rest) = s.strip_prefix("link=") {
            Self::LinkText(rest.to_string())
        } else if let Some(rest) = s.strip_prefix("css=") {
            Self::Css(rest.to_string())
        } else if s.starts_with("//") || s.starts_with("(//") {
            Self::XPath(s.to_string())
        } else {
            Self::Css(s.to_string())
        }
    }

    /// WebDriver `using` / `value` pair
    pub fn locator(&self) -> (&'static str, String) {
        match self {
            Self::Css(css) => ("css selector", css.clone()),
            Self::XPath(xpath) => ("xpath", xpath.clone()),
            Self::LinkText(text) => ("link text", text.clone()),
            Self::Text(text) => (
                "xpath",
                format!(
                    "//*[not(self::script or self::style or self::head)][contains(normalize-space(.), {})][not(.//*[contains(normalize-space(.), {})])]",
                    xpath_literal(text),
                    xpath_literal(text)
                ),
            ),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(css) => write!(f, "{}", css),
            Self::XPath(xpath) => write!(f, "xpath={}", xpath),
            Self::LinkText(text) => write!(f, "link={}", text),
            Self::Text(text) => write!(f, "text=\"{}\"", text),
        }
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Quote a string for use inside an XPath expression
fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{}'", s)
    } else if !s.contains('"') {
        format!("\"{}\"", s)
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}
