//! In-memory browser used by unit tests
//!
//! A [`FakeSite`] is a set of pages keyed by URL, each a flat list of
//! elements addressed by selector. Every session clones the site, so state
//! changes never leak between sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use super::{
    BrowserLauncher, BrowserSession, DialogResponse, ElementId, ElementState, Selector,
};
use crate::common::config::Project;
use crate::common::{Error, Result};

/// PNG signature followed by a marker, enough to look like an image
pub(crate) const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

#[derive(Debug, Clone)]
pub(crate) enum ClickEffect {
    Dialog(String),
    SetText { selector: String, text: String },
    OpenWindow(String),
    Navigate(String),
}

#[derive(Debug, Clone)]
pub(crate) struct FakeElement {
    selector: String,
    text: String,
    value: Option<String>,
    displayed: bool,
    visible_after: Option<Duration>,
    enabled: bool,
    checked: bool,
    readonly: bool,
    attributes: HashMap<String, String>,
    on_click: Vec<ClickEffect>,
    click_delay: Option<Duration>,
}

impl FakeElement {
    pub(crate) fn new(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            text: String::new(),
            value: None,
            displayed: true,
            visible_after: None,
            enabled: true,
            checked: false,
            readonly: false,
            attributes: HashMap::new(),
            on_click: Vec::new(),
            click_delay: None,
        }
    }

    pub(crate) fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub(crate) fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub(crate) fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub(crate) fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    /// Becomes displayed this long after the session opened
    pub(crate) fn visible_after(mut self, delay: Duration) -> Self {
        self.visible_after = Some(delay);
        self
    }

    pub(crate) fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub(crate) fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    pub(crate) fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// The click call itself takes this long to return
    pub(crate) fn slow_click(mut self, delay: Duration) -> Self {
        self.click_delay = Some(delay);
        self
    }

    pub(crate) fn on_click_dialog(mut self, message: &str) -> Self {
        self.on_click.push(ClickEffect::Dialog(message.to_string()));
        self
    }

    pub(crate) fn on_click_set_text(mut self, selector: &str, text: &str) -> Self {
        self.on_click.push(ClickEffect::SetText {
            selector: selector.to_string(),
            text: text.to_string(),
        });
        self
    }

    pub(crate) fn on_click_open_window(mut self, url: &str) -> Self {
        self.on_click.push(ClickEffect::OpenWindow(url.to_string()));
        self
    }

    pub(crate) fn on_click_navigate(mut self, url: &str) -> Self {
        self.on_click.push(ClickEffect::Navigate(url.to_string()));
        self
    }

    fn matches(&self, selector: &Selector) -> bool {
        Selector::parse(&self.selector) == *selector
    }
}

#[derive(Debug, Clone)]
struct FakePage {
    title: String,
    elements: Vec<FakeElement>,
}

/// A static site definition
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeSite {
    pages: HashMap<String, FakePage>,
    teardown_delay: Option<Duration>,
}

impl FakeSite {
    pub(crate) fn with_page(mut self, url: &str, title: &str, elements: Vec<FakeElement>) -> Self {
        self.pages.insert(
            url.to_string(),
            FakePage {
                title: title.to_string(),
                elements,
            },
        );
        self
    }

    /// Screenshots and closing the session hang for this long
    pub(crate) fn slow_teardown(mut self, delay: Duration) -> Self {
        self.teardown_delay = Some(delay);
        self
    }

    pub(crate) fn session(&self) -> FakeSession {
        FakeSession {
            site: self.clone(),
            opened: Instant::now(),
            state: Mutex::new(SessionState {
                windows: vec![Window {
                    handle: "w0".to_string(),
                    history: vec!["about:blank".to_string()],
                    page: None,
                }],
                current: 0,
                next_window: 1,
                dialog: None,
                closed: false,
            }),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[derive(Debug)]
struct Window {
    handle: String,
    history: Vec<String>,
    page: Option<FakePage>,
}

#[derive(Debug)]
struct SessionState {
    windows: Vec<Window>,
    current: usize,
    next_window: usize,
    dialog: Option<String>,
    closed: bool,
}

pub(crate) struct FakeSession {
    site: FakeSite,
    opened: Instant,
    state: Mutex<SessionState>,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeSession {
    fn load(&self, url: &str) -> FakePage {
        self.site.pages.get(url).cloned().unwrap_or_else(|| FakePage {
            title: "404".to_string(),
            elements: Vec::new(),
        })
    }

    fn record(&self, entry: String) {
        if let Ok(mut log) = self.log.lock() {
            log.push(entry);
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SessionState) -> Result<T>) -> Result<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Internal("fake session poisoned".to_string()))?;
        if state.closed {
            return Err(Error::webdriver("command", "invalid session id", "session closed"));
        }
        f(&mut state)
    }

    fn with_element<T>(
        &self,
        element: &ElementId,
        f: impl FnOnce(&mut SessionState, usize, usize) -> Result<T>,
    ) -> Result<T> {
        let (window, index) = parse_element_id(element)?;
        self.with_state(|state| {
            let w = state
                .windows
                .iter()
                .position(|w| w.handle == window)
                .ok_or_else(|| Error::webdriver("element", "no such window", &window))?;
            let exists = state.windows[w]
                .page
                .as_ref()
                .map(|p| index < p.elements.len())
                .unwrap_or(false);
            if !exists {
                return Err(Error::webdriver("element", "stale element reference", &element.0));
            }
            f(state, w, index)
        })
    }

    async fn teardown_pause(&self) {
        if let Some(delay) = self.site.teardown_delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn displayed(&self, element: &FakeElement) -> bool {
        match element.visible_after {
            Some(delay) => Instant::now() >= self.opened + delay,
            None => element.displayed,
        }
    }
}

fn parse_element_id(element: &ElementId) -> Result<(String, usize)> {
    let (window, index) = element
        .0
        .split_once(':')
        .ok_or_else(|| Error::Protocol(format!("bad element id {}", element.0)))?;
    let index = index
        .parse()
        .map_err(|_| Error::Protocol(format!("bad element id {}", element.0)))?;
    Ok((window.to_string(), index))
}

fn page_mut(state: &mut SessionState, window: usize) -> Result<&mut FakePage> {
    state.windows[window]
        .page
        .as_mut()
        .ok_or_else(|| Error::webdriver("element", "no such element", "blank page"))
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.record(format!("navigate {}", url));
        let page = self.load(url);
        self.with_state(|state| {
            let window = &mut state.windows[state.current];
            window.history.push(url.to_string());
            window.page = Some(page);
            Ok(())
        })
    }

    async fn back(&self) -> Result<()> {
        let previous = self.with_state(|state| {
            let window = &mut state.windows[state.current];
            if window.history.len() > 1 {
                window.history.pop();
            }
            Ok(window.history.last().cloned().unwrap_or_default())
        })?;
        let page = self.load(&previous);
        self.with_state(|state| {
            state.windows[state.current].page = Some(page);
            Ok(())
        })
    }

    async fn refresh(&self) -> Result<()> {
        let url = self.current_url().await?;
        let page = self.load(&url);
        self.with_state(|state| {
            state.windows[state.current].page = Some(page);
            Ok(())
        })
    }

    async fn current_url(&self) -> Result<String> {
        self.with_state(|state| {
            Ok(state.windows[state.current]
                .history
                .last()
                .cloned()
                .unwrap_or_default())
        })
    }

    async fn title(&self) -> Result<String> {
        self.with_state(|state| {
            Ok(state.windows[state.current]
                .page
                .as_ref()
                .map(|p| p.title.clone())
                .unwrap_or_default())
        })
    }

    async fn find_elements(&self, selector: &Selector) -> Result<Vec<ElementId>> {
        self.with_state(|state| {
            let window = &state.windows[state.current];
            let Some(page) = &window.page else {
                return Ok(Vec::new());
            };
            Ok(page
                .elements
                .iter()
                .enumerate()
                .filter(|(_, e)| e.matches(selector))
                .map(|(i, _)| ElementId(format!("{}:{}", window.handle, i)))
                .collect())
        })
    }

    async fn element_state(&self, element: &ElementId) -> Result<ElementState> {
        let snapshot = self.with_element(element, |state, w, i| Ok(page_mut(state, w)?.elements[i].clone()))?;
        Ok(ElementState {
            displayed: self.displayed(&snapshot),
            enabled: snapshot.enabled,
            selected: snapshot.checked,
            text: snapshot.text,
            value: snapshot.value,
        })
    }

    async fn element_attribute(&self, element: &ElementId, name: &str) -> Result<Option<String>> {
        self.with_element(element, |state, w, i| {
            let e = &page_mut(state, w)?.elements[i];
            if name == "readonly" {
                return Ok(e.readonly.then(|| "true".to_string()));
            }
            Ok(e.attributes.get(name).cloned())
        })
    }

    async fn click(&self, element: &ElementId) -> Result<()> {
        self.record(format!("click {}", element.0));
        let delay = self.with_element(element, |state, w, i| Ok(page_mut(state, w)?.elements[i].click_delay))?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let effects = self.with_element(element, |state, w, i| {
            let e = &mut page_mut(state, w)?.elements[i];
            e.checked = !e.checked;
            Ok(e.on_click.clone())
        })?;

        for effect in effects {
            match effect {
                ClickEffect::Dialog(message) => {
                    self.with_state(|state| {
                        state.dialog = Some(message);
                        Ok(())
                    })?;
                }
                ClickEffect::SetText { selector, text } => {
                    let target = Selector::parse(&selector);
                    self.with_state(|state| {
                        let current = state.current;
                        let page = page_mut(state, current)?;
                        for e in page.elements.iter_mut().filter(|e| e.matches(&target)) {
                            e.text = text.clone();
                        }
                        Ok(())
                    })?;
                }
                ClickEffect::OpenWindow(url) => {
                    let page = self.load(&url);
                    self.with_state(|state| {
                        let handle = format!("w{}", state.next_window);
                        state.next_window += 1;
                        state.windows.push(Window {
                            handle,
                            history: vec![url.clone()],
                            page: Some(page),
                        });
                        Ok(())
                    })?;
                }
                ClickEffect::Navigate(url) => self.navigate(&url).await?,
            }
        }
        Ok(())
    }

    async fn clear(&self, element: &ElementId) -> Result<()> {
        self.with_element(element, |state, w, i| {
            page_mut(state, w)?.elements[i].value = Some(String::new());
            Ok(())
        })
    }

    async fn send_keys(&self, element: &ElementId, text: &str) -> Result<()> {
        self.record(format!("type {} {}", element.0, text));
        self.with_element(element, |state, w, i| {
            let e = &mut page_mut(state, w)?.elements[i];
            let mut value = e.value.take().unwrap_or_default();
            value.push_str(text);
            e.value = Some(value);
            Ok(())
        })
    }

    async fn select_option(&self, element: &ElementId, value: &str) -> Result<()> {
        self.with_element(element, |state, w, i| {
            page_mut(state, w)?.elements[i].value = Some(value.to_string());
            Ok(())
        })
    }

    async fn dialog_text(&self) -> Result<Option<String>> {
        self.with_state(|state| Ok(state.dialog.clone()))
    }

    async fn respond_to_dialog(&self, response: &DialogResponse) -> Result<()> {
        self.record(format!("dialog {:?}", response));
        self.with_state(|state| match state.dialog.take() {
            Some(_) => Ok(()),
            None => Err(Error::webdriver("alert", "no such alert", "no dialog open")),
        })
    }

    async fn window_handles(&self) -> Result<Vec<String>> {
        self.with_state(|state| Ok(state.windows.iter().map(|w| w.handle.clone()).collect()))
    }

    async fn switch_to_window(&self, handle: &str) -> Result<()> {
        self.with_state(|state| {
            state.current = state
                .windows
                .iter()
                .position(|w| w.handle == handle)
                .ok_or_else(|| Error::webdriver("window", "no such window", handle))?;
            Ok(())
        })
    }

    async fn close_window(&self) -> Result<()> {
        self.with_state(|state| {
            let current = state.current;
            state.windows.remove(current);
            state.current = 0;
            Ok(())
        })
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.teardown_pause().await;
        self.with_state(|_| Ok(FAKE_PNG.to_vec()))
    }

    async fn execute_script(&self, script: &str, _args: Vec<Value>) -> Result<Value> {
        self.record(format!("script {}", script));
        match script.trim() {
            "return document.title" | "return document.title;" => Ok(Value::String(self.title().await?)),
            s if s.starts_with("throw") => Err(Error::webdriver("execute", "javascript error", s)),
            s => Ok(serde_json::from_str(s.trim_start_matches("return ").trim_end_matches(';'))
                .unwrap_or(Value::Null)),
        }
    }

    async fn close(&self) -> Result<()> {
        self.teardown_pause().await;
        self.record("close".to_string());
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Internal("fake session poisoned".to_string()))?;
        state.closed = true;
        Ok(())
    }
}

/// Launcher handing out isolated [`FakeSession`]s
///
/// The site factory receives the zero-based session number, which lets
/// tests make a site behave differently on a retry.
pub(crate) struct FakeLauncher {
    site_for: Box<dyn Fn(usize) -> FakeSite + Send + Sync>,
    sessions: AtomicUsize,
    fail_sessions: bool,
    open_delay: Option<Duration>,
    pub(crate) log: Arc<Mutex<Vec<String>>>,
}

impl FakeLauncher {
    pub(crate) fn new(site: FakeSite) -> Self {
        Self::per_session(move |_| site.clone())
    }

    pub(crate) fn per_session(site_for: impl Fn(usize) -> FakeSite + Send + Sync + 'static) -> Self {
        Self {
            site_for: Box::new(site_for),
            sessions: AtomicUsize::new(0),
            fail_sessions: false,
            open_delay: None,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every session request fails like an unreachable driver
    pub(crate) fn unavailable() -> Self {
        let mut launcher = Self::new(FakeSite::default());
        launcher.fail_sessions = true;
        launcher
    }

    /// The driver takes this long to create each session
    pub(crate) fn slow_open(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub(crate) fn sessions_opened(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub(crate) fn log(&self) -> Vec<String> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn new_session(&self, project: &Project) -> Result<Box<dyn BrowserSession>> {
        let n = self.sessions.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sessions {
            return Err(Error::SessionFailed(format!("{} driver unavailable", project.browser)));
        }
        let mut session = (self.site_for)(n).session();
        session.log = self.log.clone();
        session.record(format!("open {} {}", project.name, n));
        Ok(Box::new(session))
    }
}
