//! Driver process management
//!
//! Local runs spawn one driver executable per browser kind on a free port
//! and share it between all sessions of that kind. With a remote endpoint
//! configured nothing is spawned.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::browser::{BrowserLauncher, BrowserSession};
use crate::common::config::{BrowserKind, Project, WebDriverConfig};
use crate::common::{Error, Result};

use super::client::WebDriverClient;
use super::types::{Capabilities, Envelope, StatusValue};

/// Timeout for a driver to start answering `/status`
const DRIVER_START_TIMEOUT_SECS: u64 = 10;

/// A locally spawned driver executable
pub struct DriverProcess {
    child: Child,
    endpoint: String,
}

impl DriverProcess {
    /// Spawn `binary` on a free local port and wait until it is ready
    pub async fn spawn(binary: &Path, browser: BrowserKind, http: &reqwest::Client) -> Result<Self> {
        let port = free_port()?;
        tracing::debug!(binary = %binary.display(), port, "spawning driver");

        let mut command = Command::new(binary);
        match browser {
            // safaridriver does not understand the `=` form
            BrowserKind::Safari => command.arg("--port").arg(port.to_string()),
            _ => command.arg(format!("--port={}", port)),
        };
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::DriverStartFailed(format!("Failed to start {}: {}", binary.display(), e))
            })?;

        let mut driver = Self {
            child,
            endpoint: format!("http://127.0.0.1:{}", port),
        };
        driver.wait_ready(http).await?;
        Ok(driver)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn wait_ready(&mut self, http: &reqwest::Client) -> Result<()> {
        let deadline = std::time::Instant::now() + Duration::from_secs(DRIVER_START_TIMEOUT_SECS);

        loop {
            if std::time::Instant::now() >= deadline {
                return Err(Error::DriverStartFailed(format!(
                    "{} did not become ready within {}s",
                    self.endpoint, DRIVER_START_TIMEOUT_SECS
                )));
            }

            if let Ok(Some(status)) = self.child.try_wait() {
                return Err(Error::DriverStartFailed(format!(
                    "Driver exited during startup ({})",
                    status
                )));
            }

            tokio::time::sleep(Duration::from_millis(50)).await;

            match probe_status(http, &self.endpoint).await {
                Ok(status) if status.ready => {
                    tracing::debug!(endpoint = %self.endpoint, "driver ready");
                    return Ok(());
                }
                Ok(status) => {
                    tracing::trace!(message = %status.message, "driver not ready yet");
                }
                Err(_) => continue,
            }
        }
    }

    /// Terminate the driver
    pub async fn stop(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "failed to kill driver");
        }
    }
}

/// Query `GET /status` on an endpoint
pub async fn probe_status(http: &reqwest::Client, endpoint: &str) -> Result<StatusValue> {
    let url = format!("{}/status", endpoint.trim_end_matches('/'));
    let response = http
        .get(&url)
        .timeout(Duration::from_secs(2))
        .send()
        .await
        .map_err(|e| Error::DriverUnreachable(format!("{}: {}", url, e)))?;
    let envelope: Envelope<StatusValue> = response
        .json()
        .await
        .map_err(|e| Error::Protocol(format!("Unexpected /status response: {}", e)))?;
    Ok(envelope.value)
}

/// Locate the driver executable for `browser`
pub fn find_driver(browser: BrowserKind, configured: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.clone());
        }
        return Err(Error::DriverNotFound {
            name: browser.driver_binary().to_string(),
            searched: path.display().to_string(),
        });
    }

    which::which(browser.driver_binary()).map_err(|_| Error::DriverNotFound {
        name: browser.driver_binary().to_string(),
        searched: "PATH".to_string(),
    })
}

fn free_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// [`BrowserLauncher`] backed by WebDriver
pub struct WebDriverLauncher {
    config: WebDriverConfig,
    http: reqwest::Client,
    drivers: Mutex<HashMap<BrowserKind, DriverProcess>>,
}

impl WebDriverLauncher {
    pub fn new(config: WebDriverConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            drivers: Mutex::new(HashMap::new()),
        }
    }

    /// Endpoint serving `browser`, spawning its driver on first use
    async fn endpoint(&self, browser: BrowserKind) -> Result<String> {
        if let Some(url) = &self.config.url {
            return Ok(url.clone());
        }

        let mut drivers = self.drivers.lock().await;
        if let Some(driver) = drivers.get(&browser) {
            return Ok(driver.endpoint().to_string());
        }

        let binary = find_driver(browser, self.config.drivers.get(&browser))?;
        let driver = DriverProcess::spawn(&binary, browser, &self.http).await?;
        let endpoint = driver.endpoint().to_string();
        tracing::info!(%browser, %endpoint, "started {}", binary.display());
        drivers.insert(browser, driver);
        Ok(endpoint)
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn new_session(&self, project: &Project) -> Result<Box<dyn BrowserSession>> {
        let endpoint = self.endpoint(project.browser).await?;
        let client = WebDriverClient::create_session(
            self.http.clone(),
            &endpoint,
            Capabilities::for_project(project),
        )
        .await?;

        if Capabilities::needs_window_rect(project.browser) {
            let viewport = project.options.viewport;
            if let Err(e) = client.set_window_rect(viewport.width, viewport.height).await {
                if let Err(close_error) = client.close().await {
                    tracing::warn!(error = %close_error, "failed to close session after setup error");
                }
                return Err(e);
            }
        }
        tracing::debug!(project = %project.name, session = client.session_id(), "session opened");
        Ok(Box::new(client))
    }

    async fn shutdown(&self) {
        let mut drivers = self.drivers.lock().await;
        for (browser, driver) in drivers.drain() {
            tracing::debug!(%browser, "stopping driver");
            driver.stop().await;
        }
    }
}
