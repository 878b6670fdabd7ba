//! Scenario-facing page handle
//!
//! Every element action waits for the element to be actionable (attached,
//! visible, enabled and, for typing, editable) and retries transient
//! failures until the action ceiling. Actions are strict: a selector
//! matching several elements is an error, not a guess.

use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;

use super::expect::{self, is_transient, Matcher};
use super::selector::Selector;
use super::wait::{poll_until, with_ceiling, Probe, ACTION_BACKOFF_MS, EXPECT_BACKOFF_MS};
use super::BrowserSession;
use crate::common::config::{Project, RunConfig};
use crate::common::{Error, Result, TimeoutKind};

/// Ceilings and URL base a page applies to its operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOptions {
    pub base_url: Option<String>,
    pub action_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    pub expect_timeout_ms: u64,
}

impl PageOptions {
    pub fn for_project(config: &RunConfig, project: &Project) -> Self {
        Self {
            base_url: config.base_url.clone(),
            action_timeout_ms: project.options.action_timeout_ms,
            navigation_timeout_ms: project.options.navigation_timeout_ms,
            expect_timeout_ms: config.expect_timeout_ms,
        }
    }
}

/// How to answer a JavaScript dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogResponse {
    Accept { prompt_text: Option<String> },
    Dismiss,
}

/// A dialog that was observed and answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub message: String,
}

/// Interest in the next dialog; consumed by [`Page::click_with_dialog`]
#[derive(Debug)]
#[must_use = "a dialog subscription does nothing until passed to click_with_dialog"]
pub struct DialogSubscription {
    response: DialogResponse,
}

/// Interest in the next new window; consumed by [`Page::click_with_popup`]
///
/// Holds the set of windows open when the subscription was taken, so only
/// windows opened afterwards count as the popup.
#[derive(Debug)]
#[must_use = "a popup subscription does nothing until passed to click_with_popup"]
pub struct PopupSubscription {
    known_windows: HashSet<String>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Requirements {
    visible: bool,
    enabled: bool,
    editable: bool,
}

enum ElementAction<'a> {
    Click,
    Fill(&'a str),
    Clear,
    Press(&'a str),
    SetChecked(bool),
    Select(&'a str),
    Upload(&'a str),
}

impl ElementAction<'_> {
    fn verb(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Fill(_) => "fill",
            Self::Clear => "clear",
            Self::Press(_) => "press",
            Self::SetChecked(true) => "check",
            Self::SetChecked(false) => "uncheck",
            Self::Select(_) => "select option",
            Self::Upload(_) => "upload",
        }
    }

    fn requirements(&self) -> Requirements {
        match self {
            // File inputs are routinely hidden behind styled labels
            Self::Upload(_) => Requirements::default(),
            Self::Fill(_) | Self::Clear | Self::Press(_) => Requirements {
                visible: true,
                enabled: true,
                editable: true,
            },
            Self::Click | Self::SetChecked(_) | Self::Select(_) => Requirements {
                visible: true,
                enabled: true,
                editable: false,
            },
        }
    }
}

/// A page inside one isolated browsing context
pub struct Page {
    session: Box<dyn BrowserSession>,
    options: PageOptions,
}

impl Page {
    pub fn new(session: Box<dyn BrowserSession>, options: PageOptions) -> Self {
        Self { session, options }
    }

    /// Direct access to the underlying session
    pub fn session(&self) -> &dyn BrowserSession {
        self.session.as_ref()
    }

    /// Join a relative target onto the base URL
    pub fn resolve_url(&self, target: &str) -> Result<String> {
        if target.contains("://") || target.starts_with("about:") || target.starts_with("data:") {
            return Ok(target.to_string());
        }
        match &self.options.base_url {
            Some(base) => {
                let path = target.trim_start_matches('/');
                if path.is_empty() {
                    Ok(format!("{}/", base))
                } else {
                    Ok(format!("{}/{}", base, path))
                }
            }
            None => Err(Error::InvalidStep(format!(
                "Relative URL '{}' requires base_url in the configuration",
                target
            ))),
        }
    }

    pub async fn goto(&self, target: &str) -> Result<()> {
        let url = self.resolve_url(target)?;
        tracing::debug!(%url, "navigate");
        with_ceiling(
            TimeoutKind::Navigation,
            self.options.navigation_timeout_ms,
            &format!("goto {}", url),
            self.session.navigate(&url),
        )
        .await
    }

    pub async fn reload(&self) -> Result<()> {
        with_ceiling(
            TimeoutKind::Navigation,
            self.options.navigation_timeout_ms,
            "reload",
            self.session.refresh(),
        )
        .await
    }

    pub async fn go_back(&self) -> Result<()> {
        with_ceiling(
            TimeoutKind::Navigation,
            self.options.navigation_timeout_ms,
            "go back",
            self.session.back(),
        )
        .await
    }

    /// Click; a dialog nobody subscribed to is dismissed
    pub async fn click(&self, selector: &Selector) -> Result<()> {
        self.act(selector, ElementAction::Click).await?;
        if let Some(message) = self.session.dialog_text().await? {
            tracing::warn!(%message, "dismissing unexpected dialog");
            self.session.respond_to_dialog(&DialogResponse::Dismiss).await?;
        }
        Ok(())
    }

    pub async fn fill(&self, selector: &Selector, value: &str) -> Result<()> {
        self.act(selector, ElementAction::Fill(value)).await
    }

    pub async fn clear(&self, selector: &Selector) -> Result<()> {
        self.act(selector, ElementAction::Clear).await
    }

    pub async fn press(&self, selector: &Selector, key: &str) -> Result<()> {
        let keys = key_sequence(key)?;
        self.act(selector, ElementAction::Press(&keys)).await
    }

    pub async fn set_checked(&self, selector: &Selector, checked: bool) -> Result<()> {
        self.act(selector, ElementAction::SetChecked(checked)).await
    }

    pub async fn select_option(&self, selector: &Selector, value: &str) -> Result<()> {
        self.act(selector, ElementAction::Select(value)).await
    }

    /// Set the file of an `<input type=file>`; the path must exist
    pub async fn upload(&self, selector: &Selector, file: &Path) -> Result<()> {
        let file = file.canonicalize().map_err(|e| Error::FileRead {
            path: file.display().to_string(),
            error: e.to_string(),
        })?;
        let file = file.to_string_lossy();
        self.act(selector, ElementAction::Upload(&file)).await
    }

    /// Register interest in the next dialog
    pub fn subscribe_dialog(&self, response: DialogResponse) -> DialogSubscription {
        DialogSubscription { response }
    }

    /// Click something that opens a dialog, then answer it as subscribed
    pub async fn click_with_dialog(
        &self,
        selector: &Selector,
        subscription: DialogSubscription,
    ) -> Result<Dialog> {
        self.act(selector, ElementAction::Click).await?;

        let what = format!("dialog after click '{}'", selector);
        let message = poll_until(
            TimeoutKind::Action,
            self.options.action_timeout_ms,
            &what,
            ACTION_BACKOFF_MS,
            move || async move {
                Ok(match self.session.dialog_text().await? {
                    Some(message) => Probe::Ready(message),
                    None => Probe::Retry("no dialog open".to_string()),
                })
            },
        )
        .await?;

        tracing::debug!(%message, response = ?subscription.response, "answering dialog");
        self.session.respond_to_dialog(&subscription.response).await?;
        Ok(Dialog { message })
    }

    /// Register interest in the next new window
    pub async fn subscribe_popup(&self) -> Result<PopupSubscription> {
        let known_windows = self.session.window_handles().await?.into_iter().collect();
        Ok(PopupSubscription { known_windows })
    }

    /// Click something that opens a window and switch to it
    pub async fn click_with_popup(
        &self,
        selector: &Selector,
        subscription: PopupSubscription,
    ) -> Result<String> {
        self.act(selector, ElementAction::Click).await?;

        let what = format!("popup after click '{}'", selector);
        let known = &subscription.known_windows;
        let handle = poll_until(
            TimeoutKind::Action,
            self.options.action_timeout_ms,
            &what,
            ACTION_BACKOFF_MS,
            move || async move {
                let handles = self.session.window_handles().await?;
                Ok(match handles.into_iter().find(|h| !known.contains(h)) {
                    Some(handle) => Probe::Ready(handle),
                    None => Probe::Retry("no new window".to_string()),
                })
            },
        )
        .await?;

        self.session.switch_to_window(&handle).await?;
        Ok(handle)
    }

    /// Make the window at `index` (in opening order) current
    pub async fn switch_page(&self, index: usize) -> Result<()> {
        let handles = self.session.window_handles().await?;
        let handle = handles.get(index).ok_or_else(|| {
            Error::InvalidStep(format!(
                "Page {} does not exist (only {} open)",
                index,
                handles.len()
            ))
        })?;
        self.session.switch_to_window(handle).await
    }

    /// Close the current window and fall back to the first remaining one
    pub async fn close_page(&self) -> Result<()> {
        self.session.close_window().await?;
        let handles = self.session.window_handles().await?;
        if let Some(first) = handles.first() {
            self.session.switch_to_window(first).await?;
        }
        Ok(())
    }

    /// Poll until the matcher holds (or, with `negate`, stops holding)
    pub async fn expect(
        &self,
        selector: Option<&Selector>,
        matcher: &Matcher,
        negate: bool,
        timeout_ms: Option<u64>,
    ) -> Result<()> {
        match (matcher.targets_element(), selector) {
            (true, None) => {
                return Err(Error::InvalidStep(format!(
                    "expect {} requires a selector",
                    matcher.describe()
                )))
            }
            (false, Some(s)) => {
                return Err(Error::InvalidStep(format!(
                    "expect {} does not take a selector (got '{}')",
                    matcher.describe(),
                    s
                )))
            }
            _ => {}
        }

        let target = selector
            .map(|s| format!("'{}'", s))
            .unwrap_or_else(|| "page".to_string());
        let what = format!(
            "expect {} {}{}",
            target,
            if negate { "not " } else { "" },
            matcher.describe()
        );

        poll_until(
            TimeoutKind::Assertion,
            timeout_ms.unwrap_or(self.options.expect_timeout_ms),
            &what,
            EXPECT_BACKOFF_MS,
            move || expect::evaluate(self.session.as_ref(), selector, matcher, negate),
        )
        .await
    }

    /// PNG of the current viewport
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        self.session.screenshot().await
    }

    /// Run a script body in the page and return its JSON result
    pub async fn evaluate(&self, script: &str) -> Result<Value> {
        self.session.execute_script(script, Vec::new()).await
    }

    pub async fn url(&self) -> Result<String> {
        self.session.current_url().await
    }

    /// Tear down the browsing context
    pub async fn close(self) -> Result<()> {
        self.session.close().await
    }

    async fn act(&self, selector: &Selector, action: ElementAction<'_>) -> Result<()> {
        let what = format!("{} '{}'", action.verb(), selector);
        tracing::debug!("{}", what);
        let action = &action;
        poll_until(
            TimeoutKind::Action,
            self.options.action_timeout_ms,
            &what,
            ACTION_BACKOFF_MS,
            move || self.try_act(selector, action),
        )
        .await
    }

    async fn try_act(&self, selector: &Selector, action: &ElementAction<'_>) -> Result<Probe<()>> {
        let elements = self.session.find_elements(selector).await?;
        let element = match elements.as_slice() {
            [] => return Ok(Probe::Retry("no element matches".to_string())),
            [element] => element,
            many => {
                return Err(Error::StrictMode {
                    selector: selector.to_string(),
                    count: many.len(),
                })
            }
        };

        let required = action.requirements();
        if required.visible || required.enabled {
            let state = match self.session.element_state(element).await {
                Ok(state) => state,
                Err(e) if is_transient(&e) => {
                    return Ok(Probe::Retry("element was detached".to_string()))
                }
                Err(e) => return Err(e),
            };
            if required.visible && !state.displayed {
                return Ok(Probe::Retry("element is not visible".to_string()));
            }
            if required.enabled && !state.enabled {
                return Ok(Probe::Retry("element is not enabled".to_string()));
            }
            if let ElementAction::SetChecked(wanted) = action {
                if state.selected == *wanted {
                    return Ok(Probe::Ready(()));
                }
            }
        }
        if required.editable && self.session.element_attribute(element, "readonly").await?.is_some() {
            return Ok(Probe::Retry("element is read-only".to_string()));
        }

        let result = match action {
            ElementAction::Click | ElementAction::SetChecked(_) => self.session.click(element).await,
            ElementAction::Fill(value) => match self.session.clear(element).await {
                Ok(()) => self.session.send_keys(element, value).await,
                Err(e) => Err(e),
            },
            ElementAction::Clear => self.session.clear(element).await,
            ElementAction::Press(keys) | ElementAction::Upload(keys) => {
                self.session.send_keys(element, keys).await
            }
            ElementAction::Select(value) => self.session.select_option(element, value).await,
        };

        match result {
            Ok(()) => Ok(Probe::Ready(())),
            Err(e) if is_transient(&e) => Ok(Probe::Retry(e.to_string())),
            Err(e) => Err(e),
        }
    }
}

/// Translate a key description (`Enter`, `Control+a`) into WebDriver key codes
pub(crate) fn key_sequence(key: &str) -> Result<String> {
    let parts: Vec<&str> = key.split('+').map(str::trim).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(Error::InvalidStep(format!("Invalid key '{}'", key)));
    }

    let mut sequence = String::new();
    for part in &parts {
        sequence.push(key_code(part).ok_or_else(|| {
            Error::InvalidStep(format!("Unknown key '{}' in '{}'", part, key))
        })?);
    }
    if parts.len() > 1 {
        // NULL releases held modifiers
        sequence.push('\u{E000}');
    }
    Ok(sequence)
}

fn key_code(name: &str) -> Option<char> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(c);
    }
    let code = match name.to_ascii_lowercase().as_str() {
        "backspace" => '\u{E003}',
        "tab" => '\u{E004}',
        "enter" | "return" => '\u{E007}',
        "shift" => '\u{E008}',
        "control" | "ctrl" => '\u{E009}',
        "alt" => '\u{E00A}',
        "escape" | "esc" => '\u{E00C}',
        "space" => '\u{E00D}',
        "pageup" => '\u{E00E}',
        "pagedown" => '\u{E00F}',
        "end" => '\u{E010}',
        "home" => '\u{E011}',
        "arrowleft" => '\u{E012}',
        "arrowup" => '\u{E013}',
        "arrowright" => '\u{E014}',
        "arrowdown" => '\u{E015}',
        "delete" => '\u{E017}',
        "meta" | "command" => '\u{E03D}',
        _ => return None,
    };
    Some(code)
}
