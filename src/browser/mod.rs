//! Browser automation layer
//!
//! [`BrowserLauncher`] and [`BrowserSession`] are the seam to the automation
//! backend: a session is one isolated browsing context exposing primitive,
//! non-waiting calls. [`Page`] builds the scenario-facing API on top of a
//! session: auto-waiting actions, polling assertions and event subscriptions
//! that must be taken out before the triggering action.

mod expect;
mod page;
mod selector;
mod wait;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use serde_json::Value;

use crate::common::config::Project;
use crate::common::Result;

pub use expect::Matcher;
pub use page::{
    Dialog, DialogResponse, DialogSubscription, Page, PageOptions, PopupSubscription,
};
pub use selector::Selector;
pub use wait::{poll_until, with_ceiling, Probe, ACTION_BACKOFF_MS, EXPECT_BACKOFF_MS};

/// Opaque reference to an element inside one session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementId(pub String);

/// Snapshot of the properties actionability and assertions look at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementState {
    pub displayed: bool,
    pub enabled: bool,
    pub selected: bool,
    pub text: String,
    pub value: Option<String>,
}

/// Creates isolated browsing contexts
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Open a fresh session; nothing is shared with other sessions
    async fn new_session(&self, project: &Project) -> Result<Box<dyn BrowserSession>>;

    /// Release backend resources (driver processes) at the end of a run
    async fn shutdown(&self) {}
}

/// Primitive calls against one browsing context
///
/// None of these wait for anything beyond the backend's own completion of
/// the call; waiting is layered on top by [`Page`].
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn back(&self) -> Result<()>;
    async fn refresh(&self) -> Result<()>;
    async fn current_url(&self) -> Result<String>;
    async fn title(&self) -> Result<String>;

    async fn find_elements(&self, selector: &Selector) -> Result<Vec<ElementId>>;
    async fn element_state(&self, element: &ElementId) -> Result<ElementState>;
    async fn element_attribute(&self, element: &ElementId, name: &str) -> Result<Option<String>>;
    async fn click(&self, element: &ElementId) -> Result<()>;
    async fn clear(&self, element: &ElementId) -> Result<()>;
    async fn send_keys(&self, element: &ElementId, text: &str) -> Result<()>;
    /// Choose the `<option>` of a `<select>` by value, falling back to its label
    async fn select_option(&self, element: &ElementId, value: &str) -> Result<()>;

    /// Text of the open dialog, `None` when no dialog is open
    async fn dialog_text(&self) -> Result<Option<String>>;
    async fn respond_to_dialog(&self, response: &DialogResponse) -> Result<()>;

    async fn window_handles(&self) -> Result<Vec<String>>;
    async fn switch_to_window(&self, handle: &str) -> Result<()>;
    async fn close_window(&self) -> Result<()>;

    /// PNG bytes of the current viewport
    async fn screenshot(&self) -> Result<Vec<u8>>;
    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value>;

    /// Tear down the browsing context
    async fn close(&self) -> Result<()>;
}
