//! Assertion matchers
//!
//! A matcher inspects either the page (title, URL) or the single element a
//! selector resolves to. Evaluation is one probe; [`Page::expect`] polls it.
//!
//! [`Page::expect`]: super::Page::expect

use super::selector::Selector;
use super::wait::Probe;
use super::{BrowserSession, ElementState};
use crate::common::{truncate_for_message, Error, Result};

/// What an `expect` step checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    Title(String),
    Url(String),
    UrlContains(String),
    /// Whitespace-normalized text equality
    Text(String),
    ContainsText(String),
    /// Exact input value, no normalization
    Value(String),
    Visible,
    /// Passes when nothing matches or the match is not displayed
    Hidden,
    Checked,
    Count(usize),
    Attribute { name: String, value: String },
}

impl Matcher {
    /// Whether the matcher needs a selector
    pub fn targets_element(&self) -> bool {
        !matches!(self, Matcher::Title(_) | Matcher::Url(_) | Matcher::UrlContains(_))
    }

    /// Short human-readable form used in messages
    pub fn describe(&self) -> String {
        match self {
            Matcher::Title(t) => format!("to have title '{}'", t),
            Matcher::Url(u) => format!("to have URL '{}'", u),
            Matcher::UrlContains(u) => format!("to have URL containing '{}'", u),
            Matcher::Text(t) => format!("to have text '{}'", t),
            Matcher::ContainsText(t) => format!("to contain text '{}'", t),
            Matcher::Value(v) => format!("to have value '{}'", v),
            Matcher::Visible => "to be visible".to_string(),
            Matcher::Hidden => "to be hidden".to_string(),
            Matcher::Checked => "to be checked".to_string(),
            Matcher::Count(n) => format!("to have count {}", n),
            Matcher::Attribute { name, value } => {
                format!("to have attribute {}='{}'", name, value)
            }
        }
    }
}

/// Collapse runs of whitespace and trim
pub(crate) fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Evaluate once: `Ready(())` when the (possibly negated) matcher holds
pub(crate) async fn evaluate(
    session: &dyn BrowserSession,
    selector: Option<&Selector>,
    matcher: &Matcher,
    negate: bool,
) -> Result<Probe<()>> {
    let (holds, actual) = check(session, selector, matcher).await?;
    if holds != negate {
        Ok(Probe::Ready(()))
    } else if negate {
        Ok(Probe::Retry(format!("matched while expecting not; got {}", actual)))
    } else {
        Ok(Probe::Retry(format!("got {}", actual)))
    }
}

async fn check(
    session: &dyn BrowserSession,
    selector: Option<&Selector>,
    matcher: &Matcher,
) -> Result<(bool, String)> {
    match matcher {
        Matcher::Title(expected) => {
            let title = session.title().await?;
            Ok((&title == expected, quoted(&title)))
        }
        Matcher::Url(expected) => {
            let url = session.current_url().await?;
            Ok((&url == expected, quoted(&url)))
        }
        Matcher::UrlContains(expected) => {
            let url = session.current_url().await?;
            Ok((url.contains(expected.as_str()), quoted(&url)))
        }
        element_matcher => {
            let selector = selector.ok_or_else(|| {
                Error::InvalidStep(format!("'{}' requires a selector", element_matcher.describe()))
            })?;
            check_element(session, selector, element_matcher).await
        }
    }
}

async fn check_element(
    session: &dyn BrowserSession,
    selector: &Selector,
    matcher: &Matcher,
) -> Result<(bool, String)> {
    let elements = session.find_elements(selector).await?;

    if let Matcher::Count(expected) = matcher {
        return Ok((elements.len() == *expected, format!("{} elements", elements.len())));
    }

    if elements.len() > 1 {
        return Err(Error::StrictMode {
            selector: selector.to_string(),
            count: elements.len(),
        });
    }

    let Some(element) = elements.first() else {
        return Ok((matches!(matcher, Matcher::Hidden), "no matching element".to_string()));
    };

    let state = match session.element_state(element).await {
        Ok(state) => state,
        Err(e) if is_transient(&e) => ElementState::default(),
        Err(e) => return Err(e),
    };

    let result = match matcher {
        Matcher::Text(expected) => {
            let actual = normalize_whitespace(&state.text);
            (actual == normalize_whitespace(expected), quoted(&actual))
        }
        Matcher::ContainsText(expected) => {
            let actual = normalize_whitespace(&state.text);
            (actual.contains(&normalize_whitespace(expected)), quoted(&actual))
        }
        Matcher::Value(expected) => {
            let actual = state.value.clone().unwrap_or_default();
            (&actual == expected, quoted(&actual))
        }
        Matcher::Visible => (state.displayed, visibility(&state)),
        Matcher::Hidden => (!state.displayed, visibility(&state)),
        Matcher::Checked => (
            state.selected,
            if state.selected { "checked" } else { "unchecked" }.to_string(),
        ),
        Matcher::Attribute { name, value } => {
            let actual = session.element_attribute(element, name).await?;
            match actual {
                Some(actual) => (&actual == value, format!("{}={}", name, quoted(&actual))),
                None => (false, format!("no attribute '{}'", name)),
            }
        }
        Matcher::Title(_) | Matcher::Url(_) | Matcher::UrlContains(_) | Matcher::Count(_) => {
            return Err(Error::Internal(format!(
                "page matcher '{}' evaluated against an element",
                matcher.describe()
            )))
        }
    };
    Ok(result)
}

/// Errors that mean "the DOM moved under us, look again"
pub(crate) fn is_transient(error: &Error) -> bool {
    match error {
        Error::WebDriver { code, .. } => matches!(
            code.as_str(),
            "stale element reference"
                | "no such element"
                | "element not interactable"
                | "element click intercepted"
                | "invalid element state"
        ),
        _ => false,
    }
}

fn quoted(s: &str) -> String {
    format!("'{}'", truncate_for_message(s, 200))
}

fn visibility(state: &ElementState) -> String {
    if state.displayed { "visible" } else { "hidden" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  Hello,\n   world  "), "Hello, world");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_targets_element() {
        assert!(!Matcher::Title("x".into()).targets_element());
        assert!(!Matcher::UrlContains("/x".into()).targets_element());
        assert!(Matcher::Visible.targets_element());
        assert!(Matcher::Count(3).targets_element());
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&Error::webdriver("click", "stale element reference", "")));
        assert!(!is_transient(&Error::webdriver("click", "invalid session id", "")));
        assert!(!is_transient(&Error::Assertion("x".into())));
    }
}
