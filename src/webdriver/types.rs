//! WebDriver wire types
//!
//! These types cover the subset of the W3C WebDriver protocol the runner
//! speaks. See: https://www.w3.org/TR/webdriver2/

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::config::{BrowserKind, Project};

/// Key under which W3C drivers serialize element references
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

// === Envelopes ===

/// Every WebDriver response wraps its payload in `value`
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub value: T,
}

/// Error payload of a failed command
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorValue {
    pub error: String,
    #[serde(default)]
    pub message: String,
}

/// Payload of `POST /session`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionValue {
    pub session_id: String,
    #[serde(default)]
    pub capabilities: Value,
}

/// Payload of `GET /status`
#[derive(Debug, Clone, Deserialize)]
pub struct StatusValue {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub message: String,
}

// === Session Capabilities ===

/// `POST /session` request body
#[derive(Debug, Clone, Serialize)]
pub struct NewSessionRequest {
    pub capabilities: CapabilitiesRequest,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesRequest {
    pub always_match: Capabilities,
}

/// W3C capabilities plus the vendor options the runner needs
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub browser_name: String,
    pub accept_insecure_certs: bool,
    /// Dialogs stay open until a scenario answers them
    pub unhandled_prompt_behavior: String,
    pub page_load_strategy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<SessionTimeouts>,
    #[serde(rename = "goog:chromeOptions", skip_serializing_if = "Option::is_none")]
    pub chrome_options: Option<ChromiumOptions>,
    #[serde(rename = "ms:edgeOptions", skip_serializing_if = "Option::is_none")]
    pub edge_options: Option<ChromiumOptions>,
    #[serde(rename = "moz:firefoxOptions", skip_serializing_if = "Option::is_none")]
    pub firefox_options: Option<FirefoxOptions>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionTimeouts {
    pub page_load: u64,
    /// Element lookups never wait on the driver side
    pub implicit: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChromiumOptions {
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_emulation: Option<MobileEmulation>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MobileEmulation {
    pub device_name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct FirefoxOptions {
    pub args: Vec<String>,
}

impl Capabilities {
    /// Capabilities for a fresh session of `project`
    pub fn for_project(project: &Project) -> Self {
        let options = &project.options;
        let timeouts = (options.navigation_timeout_ms > 0).then(|| SessionTimeouts {
            page_load: options.navigation_timeout_ms,
            implicit: 0,
        });

        let mut caps = Self {
            browser_name: project.browser.capability_name().to_string(),
            accept_insecure_certs: options.ignore_https_errors,
            unhandled_prompt_behavior: "ignore".to_string(),
            page_load_strategy: "normal".to_string(),
            timeouts,
            chrome_options: None,
            edge_options: None,
            firefox_options: None,
        };

        match project.browser {
            BrowserKind::Chromium | BrowserKind::Edge => {
                let mut chromium = ChromiumOptions::default();
                if options.headless {
                    chromium.args.push("--headless=new".to_string());
                }
                chromium.args.push(format!(
                    "--window-size={},{}",
                    options.viewport.width, options.viewport.height
                ));
                chromium.mobile_emulation = project.device.as_ref().map(|name| MobileEmulation {
                    device_name: name.clone(),
                });
                if project.browser == BrowserKind::Chromium {
                    caps.chrome_options = Some(chromium);
                } else {
                    caps.edge_options = Some(chromium);
                }
            }
            BrowserKind::Firefox => {
                let mut firefox = FirefoxOptions::default();
                if options.headless {
                    firefox.args.push("-headless".to_string());
                }
                firefox.args.push(format!("-width={}", options.viewport.width));
                firefox.args.push(format!("-height={}", options.viewport.height));
                caps.firefox_options = Some(firefox);
            }
            // safaridriver has no headless mode and no vendor options we use
            BrowserKind::Safari => {}
        }

        caps
    }

    /// Whether the window must be sized after the session opens
    pub fn needs_window_rect(browser: BrowserKind) -> bool {
        browser == BrowserKind::Safari
    }
}
