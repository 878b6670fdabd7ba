//! W3C WebDriver backend
//!
//! Implements the browser seam over HTTP against chromedriver, geckodriver,
//! msedgedriver, safaridriver or a remote grid.

pub mod client;
pub mod driver;
pub mod types;

pub use client::WebDriverClient;
pub use driver::{find_driver, probe_status, DriverProcess, WebDriverLauncher};
