//! Run configuration handling
//!
//! The configuration file is deserialized into a raw, partially-optional
//! form that rejects unknown keys, then resolved once into [`RunConfig`]
//! where every default is explicit. Nothing reads the raw form afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use super::paths;
use super::{Error, Result};

/// Name of the environment variable that toggles CI mode
pub const CI_ENV_VAR: &str = "CI";

/// Artifact capture policy, shared by traces, screenshots and videos
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CapturePolicy {
    /// Capture and keep for every attempt
    #[serde(alias = "on")]
    Always,
    /// Never capture
    #[serde(alias = "off")]
    Never,
    /// Capture only on the first retry, keep it regardless of outcome
    OnFirstRetry,
    /// Capture every attempt, keep only when the attempt failed
    #[serde(alias = "retain-on-failure")]
    OnlyOnFailure,
}

/// Browser engine a project runs against
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BrowserKind {
    #[serde(alias = "chrome")]
    Chromium,
    Firefox,
    #[serde(alias = "msedge")]
    Edge,
    #[serde(alias = "webkit")]
    Safari,
}

impl BrowserKind {
    /// W3C `browserName` capability value
    pub fn capability_name(&self) -> &'static str {
        match self {
            Self::Chromium => "chrome",
            Self::Firefox => "firefox",
            Self::Edge => "MicrosoftEdge",
            Self::Safari => "safari",
        }
    }

    /// Default driver executable name looked up on PATH
    pub fn driver_binary(&self) -> &'static str {
        match self {
            Self::Chromium => "chromedriver",
            Self::Firefox => "geckodriver",
            Self::Edge => "msedgedriver",
            Self::Safari => "safaridriver",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Some(Self::Chromium),
            "firefox" => Some(Self::Firefox),
            "edge" | "msedge" => Some(Self::Edge),
            "safari" | "webkit" => Some(Self::Safari),
            _ => None,
        }
    }
}

impl std::fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chromium => write!(f, "chromium"),
            Self::Firefox => write!(f, "firefox"),
            Self::Edge => write!(f, "edge"),
            Self::Safari => write!(f, "safari"),
        }
    }
}

/// Result output format
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReporterKind {
    /// One line per scenario plus a failure digest
    List,
    /// One character per scenario
    Dot,
    /// `results.json` in the output directory
    Json,
    /// `results.xml` (JUnit) in the output directory
    Junit,
}

impl ReporterKind {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "list" | "line" => Ok(Self::List),
            "dot" => Ok(Self::Dot),
            "json" => Ok(Self::Json),
            "junit" | "xml" => Ok(Self::Junit),
            other => Err(Error::Config(format!(
                "Unknown reporter '{}'. Supported: list, dot, json, junit",
                other
            ))),
        }
    }
}

/// Browser viewport
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw file format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawReporter {
    One(String),
    Many(Vec<String>),
}

/// Browser/context options; used both at top level and per project
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
struct RawUse {
    action_timeout_ms: Option<u64>,
    navigation_timeout_ms: Option<u64>,
    trace: Option<CapturePolicy>,
    screenshot: Option<CapturePolicy>,
    video: Option<CapturePolicy>,
    viewport: Option<Viewport>,
    ignore_https_errors: Option<bool>,
    headless: Option<bool>,
}

impl RawUse {
    /// Fields set in `other` win
    fn merged(&self, other: &RawUse) -> RawUse {
        RawUse {
            action_timeout_ms: other.action_timeout_ms.or(self.action_timeout_ms),
            navigation_timeout_ms: other.navigation_timeout_ms.or(self.navigation_timeout_ms),
            trace: other.trace.or(self.trace),
            screenshot: other.screenshot.or(self.screenshot),
            video: other.video.or(self.video),
            viewport: other.viewport.or(self.viewport),
            ignore_https_errors: other.ignore_https_errors.or(self.ignore_https_errors),
            headless: other.headless.or(self.headless),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawExpect {
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProject {
    name: String,
    #[serde(default)]
    browser: Option<String>,
    #[serde(default)]
    device: Option<String>,
    #[serde(rename = "use", default)]
    use_options: RawUse,
}

/// Values that replace the top-level ones in CI mode
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawCi {
    retries: Option<i64>,
    workers: Option<i64>,
    forbid_only: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawWebDriver {
    url: Option<String>,
    #[serde(default)]
    drivers: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    test_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    fully_parallel: Option<bool>,
    forbid_only: Option<bool>,
    retries: Option<i64>,
    workers: Option<i64>,
    reporter: Option<RawReporter>,
    base_url: Option<String>,
    timeout_ms: Option<u64>,
    max_failures: Option<u64>,
    retry_infrastructure_errors: Option<bool>,
    #[serde(default)]
    expect: RawExpect,
    #[serde(rename = "use", default)]
    use_options: RawUse,
    #[serde(default)]
    projects: Vec<RawProject>,
    #[serde(default)]
    ci: RawCi,
    #[serde(default)]
    webdriver: RawWebDriver,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved browser/context options for one project
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UseOptions {
    pub action_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    pub trace: CapturePolicy,
    pub screenshot: CapturePolicy,
    pub video: CapturePolicy,
    pub viewport: Viewport,
    pub ignore_https_errors: bool,
    pub headless: bool,
}

impl UseOptions {
    fn resolve(raw: &RawUse) -> Result<Self> {
        let viewport = raw.viewport.unwrap_or_default();
        if viewport.width == 0 || viewport.height == 0 {
            return Err(Error::Config(format!(
                "Viewport must be non-empty, got {}x{}",
                viewport.width, viewport.height
            )));
        }

        Ok(Self {
            action_timeout_ms: raw.action_timeout_ms.unwrap_or(0),
            navigation_timeout_ms: raw.navigation_timeout_ms.unwrap_or(0),
            trace: raw.trace.unwrap_or(CapturePolicy::OnFirstRetry),
            screenshot: raw.screenshot.unwrap_or(CapturePolicy::Never),
            video: raw.video.unwrap_or(CapturePolicy::Never),
            viewport,
            ignore_https_errors: raw.ignore_https_errors.unwrap_or(false),
            headless: raw.headless.unwrap_or(true),
        })
    }
}

/// A named execution profile; every scenario runs once per project
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub name: String,
    pub browser: BrowserKind,
    /// Device emulation descriptor (Chromium mobile emulation name)
    pub device: Option<String>,
    #[serde(rename = "use")]
    pub options: UseOptions,
}

/// Where the WebDriver endpoints come from
#[derive(Debug, Clone, Serialize, Default)]
pub struct WebDriverConfig {
    /// Remote endpoint; when set no driver process is spawned
    pub url: Option<String>,
    /// Explicit driver executables per browser
    pub drivers: BTreeMap<BrowserKind, PathBuf>,
}

/// Command-line values that take precedence over the file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub workers: Option<i64>,
    pub retries: Option<i64>,
    pub reporters: Vec<String>,
    pub projects: Vec<String>,
    pub max_failures: Option<u64>,
    pub headed: bool,
    pub debug: bool,
}

/// Process environment relevant to configuration
#[derive(Debug, Default, Clone, Copy)]
pub struct Environment {
    pub ci: bool,
}

impl Environment {
    /// Read the environment of the current process
    pub fn from_env() -> Result<Self> {
        let value = std::env::var(CI_ENV_VAR).ok();
        Ok(Self {
            ci: parse_ci_flag(value.as_deref())?,
        })
    }
}

/// Interpret a boolean-like environment value
pub fn parse_ci_flag(value: Option<&str>) -> Result<bool> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        other => Err(Error::Config(format!(
            "{} must be a boolean-like value, got '{}'",
            CI_ENV_VAR, other
        ))),
    }
}

/// Main configuration structure, immutable once loaded
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    /// File the configuration came from, if any
    pub config_file: Option<PathBuf>,
    pub ci: bool,
    pub test_dir: PathBuf,
    pub output_dir: PathBuf,
    pub fully_parallel: bool,
    pub forbid_only: bool,
    pub retries: u32,
    pub workers: usize,
    pub reporters: Vec<ReporterKind>,
    pub base_url: Option<String>,
    /// Overall per-scenario ceiling, 0 = none
    pub timeout_ms: u64,
    /// Assertion ceiling, 0 = none
    pub expect_timeout_ms: u64,
    /// Stop scheduling after this many failures, 0 = never
    pub max_failures: usize,
    pub retry_infrastructure_errors: bool,
    pub projects: Vec<Project>,
    pub webdriver: WebDriverConfig,
}

impl RunConfig {
    /// Load the configuration for this process
    ///
    /// With no explicit path, `scenarios.toml` in the working directory is
    /// used when present; otherwise the defaults apply.
    pub fn load(path: Option<&Path>, env: Environment, overrides: &Overrides) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let candidate = cwd.join(paths::DEFAULT_CONFIG_FILE);
                candidate.exists().then_some(candidate)
            }
        };

        match path {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| Error::FileRead {
                    path: path.display().to_string(),
                    error: e.to_string(),
                })?;
                let root = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or(cwd);
                let mut config = Self::from_toml_str(&content, &root, env, overrides).map_err(
                    |e| match e {
                        Error::ConfigParse { message, .. } => Error::ConfigParse {
                            path: path.display().to_string(),
                            message,
                        },
                        other => other,
                    },
                )?;
                config.config_file = Some(path);
                Ok(config)
            }
            None => Self::from_toml_str("", &cwd, env, overrides),
        }
    }

    /// Parse and resolve configuration text; relative paths are taken from `root`
    pub fn from_toml_str(
        content: &str,
        root: &Path,
        env: Environment,
        overrides: &Overrides,
    ) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content).map_err(|e| Error::ConfigParse {
            path: paths::DEFAULT_CONFIG_FILE.to_string(),
            message: e.message().to_string(),
        })?;
        Self::resolve(raw, root, env, overrides)
    }

    fn resolve(raw: RawConfig, root: &Path, env: Environment, overrides: &Overrides) -> Result<Self> {
        let ci = env.ci;

        // Retries: defaults < file < [ci] < CLI
        let mut retries = raw.retries.unwrap_or(if ci { 2 } else { 0 });
        if ci {
            retries = raw.ci.retries.unwrap_or(retries);
        }
        if let Some(r) = overrides.retries {
            retries = r;
        }
        let retries = u32::try_from(retries).map_err(|_| {
            Error::Config(format!("retries must be a non-negative integer, got {}", retries))
        })?;

        let mut workers = raw.workers;
        if ci {
            workers = raw.ci.workers.or(workers).or(Some(1));
        }
        if overrides.workers.is_some() {
            workers = overrides.workers;
        }
        let workers = match workers {
            None => default_workers(),
            Some(n) if n >= 1 => usize::try_from(n)
                .map_err(|_| Error::Config(format!("workers out of range: {}", n)))?,
            Some(n) => {
                return Err(Error::Config(format!(
                    "workers must be at least 1, got {}",
                    n
                )))
            }
        };

        let mut forbid_only = raw.forbid_only.unwrap_or(ci);
        if ci {
            forbid_only = raw.ci.forbid_only.unwrap_or(forbid_only);
        }

        let reporters = if !overrides.reporters.is_empty() {
            overrides.reporters.clone()
        } else {
            match raw.reporter {
                None => vec!["list".to_string()],
                Some(RawReporter::One(r)) => vec![r],
                Some(RawReporter::Many(rs)) => rs,
            }
        };
        let mut seen = HashSet::new();
        let mut reporters = reporters
            .iter()
            .map(|r| ReporterKind::parse(r))
            .collect::<Result<Vec<_>>>()?;
        reporters.retain(|r| seen.insert(*r));
        if reporters.is_empty() {
            return Err(Error::Config("At least one reporter is required".to_string()));
        }

        let base_url = raw.base_url.map(|u| validate_base_url(&u)).transpose()?;

        let mut projects = resolve_projects(&raw.projects, &raw.use_options)?;
        if !overrides.projects.is_empty() {
            for wanted in &overrides.projects {
                if !projects.iter().any(|p| &p.name == wanted) {
                    let known: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
                    return Err(Error::Config(format!(
                        "Project '{}' not found. Available: {:?}",
                        wanted, known
                    )));
                }
            }
            projects.retain(|p| overrides.projects.contains(&p.name));
        }

        let mut drivers = BTreeMap::new();
        for (name, path) in raw.webdriver.drivers {
            let kind = BrowserKind::parse(&name).ok_or_else(|| {
                Error::Config(format!("Unknown browser '{}' in [webdriver.drivers]", name))
            })?;
            drivers.insert(kind, absolutize(root, &path));
        }
        let webdriver_url = raw.webdriver.url.map(|u| validate_base_url(&u)).transpose()?;

        let mut config = Self {
            config_file: None,
            ci,
            test_dir: absolutize(root, &raw.test_dir.unwrap_or_else(|| PathBuf::from("scenarios"))),
            output_dir: absolutize(
                root,
                &raw.output_dir.unwrap_or_else(|| PathBuf::from("test-results")),
            ),
            fully_parallel: raw.fully_parallel.unwrap_or(false),
            forbid_only,
            retries,
            workers,
            reporters,
            base_url,
            timeout_ms: raw.timeout_ms.unwrap_or(30_000),
            expect_timeout_ms: raw.expect.timeout_ms.unwrap_or(5_000),
            max_failures: usize::try_from(overrides.max_failures.or(raw.max_failures).unwrap_or(0))
                .map_err(|_| Error::Config("max_failures out of range".to_string()))?,
            retry_infrastructure_errors: raw.retry_infrastructure_errors.unwrap_or(false),
            projects,
            webdriver: WebDriverConfig {
                url: webdriver_url,
                drivers,
            },
        };

        if overrides.headed {
            for project in &mut config.projects {
                project.options.headless = false;
            }
        }

        if overrides.debug {
            config.workers = 1;
            config.retries = 0;
            config.timeout_ms = 0;
            config.expect_timeout_ms = 0;
            for project in &mut config.projects {
                project.options.headless = false;
                project.options.action_timeout_ms = 0;
                project.options.navigation_timeout_ms = 0;
            }
        }

        Ok(config)
    }

    /// Look up a project by name
    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }
}

fn resolve_projects(raw: &[RawProject], top_level: &RawUse) -> Result<Vec<Project>> {
    if raw.is_empty() {
        return Ok(vec![Project {
            name: "chromium".to_string(),
            browser: BrowserKind::Chromium,
            device: None,
            options: UseOptions::resolve(top_level)?,
        }]);
    }

    let mut projects: Vec<Project> = Vec::with_capacity(raw.len());
    for p in raw {
        let name = p.name.trim();
        if name.is_empty() {
            return Err(Error::Config("Project name must not be empty".to_string()));
        }
        if projects.iter().any(|existing| existing.name == name) {
            return Err(Error::Config(format!("Duplicate project name '{}'", name)));
        }

        let browser_name = p.browser.as_deref().unwrap_or(name);
        let browser = BrowserKind::parse(browser_name).ok_or_else(|| {
            Error::Config(format!(
                "Project '{}': unknown browser '{}'. Supported: chromium, firefox, edge, safari",
                name, browser_name
            ))
        })?;

        if p.device.is_some() && browser != BrowserKind::Chromium && browser != BrowserKind::Edge {
            return Err(Error::Config(format!(
                "Project '{}': device emulation requires a Chromium-based browser",
                name
            )));
        }

        projects.push(Project {
            name: name.to_string(),
            browser,
            device: p.device.clone(),
            options: UseOptions::resolve(&top_level.merged(&p.use_options))?,
        });
    }
    Ok(projects)
}

fn validate_base_url(url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| Error::Config(format!("Invalid URL '{}': {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(Error::Config(format!(
            "URL '{}' must be an absolute http(s) URL",
            url
        )));
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        root.join(path)
    } else {
        path.to_path_buf()
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().div_ceil(2))
        .unwrap_or(1)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> Environment {
        Environment { ci: false }
    }

    fn ci() -> Environment {
        Environment { ci: true }
    }

    fn resolve(content: &str, env: Environment) -> Result<RunConfig> {
        RunConfig::from_toml_str(content, Path::new("/work"), env, &Overrides::default())
    }

    #[test]
    fn test_defaults_are_explicit() {
        let config = resolve("", local()).unwrap();
        assert_eq!(config.test_dir, PathBuf::from("/work/scenarios"));
        assert_eq!(config.output_dir, PathBuf::from("/work/test-results"));
        assert!(!config.fully_parallel);
        assert!(!config.forbid_only);
        assert_eq!(config.retries, 0);
        assert!(config.workers >= 1);
        assert_eq!(config.reporters, vec![ReporterKind::List]);
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.expect_timeout_ms, 5_000);
        assert_eq!(config.projects.len(), 1);

        let project = &config.projects[0];
        assert_eq!(project.name, "chromium");
        assert_eq!(project.browser, BrowserKind::Chromium);
        assert_eq!(project.options.trace, CapturePolicy::OnFirstRetry);
        assert_eq!(project.options.screenshot, CapturePolicy::Never);
        assert!(project.options.headless);
        assert_eq!(project.options.viewport, Viewport::default());
    }

    #[test]
    fn test_ci_mode_raises_retries_and_serializes() {
        let config = resolve("", ci()).unwrap();
        assert!(config.ci);
        assert_eq!(config.retries, 2);
        assert_eq!(config.workers, 1);
        assert!(config.forbid_only);
    }

    #[test]
    fn test_ci_table_only_applies_in_ci() {
        let content = r#"
retries = 1
workers = 4

[ci]
retries = 3
workers = 2
"#;
        let config = resolve(content, local()).unwrap();
        assert_eq!(config.retries, 1);
        assert_eq!(config.workers, 4);

        let config = resolve(content, ci()).unwrap();
        assert_eq!(config.retries, 3);
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = resolve("retry_count = 2", local()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }), "{err}");
        assert!(err.to_string().contains("retry_count"), "{err}");

        let err = resolve("[use]\nheadles = true", local()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_negative_workers_rejected() {
        let err = resolve("workers = -2", local()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("workers"));

        let err = resolve("workers = 0", local()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let overrides = Overrides {
            workers: Some(-1),
            ..Default::default()
        };
        let err = RunConfig::from_toml_str("", Path::new("/work"), local(), &overrides).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_capture_policies_and_aliases() {
        let content = r#"
[use]
trace = "on"
screenshot = "only-on-failure"
video = "retain-on-failure"
"#;
        let config = resolve(content, local()).unwrap();
        let options = &config.projects[0].options;
        assert_eq!(options.trace, CapturePolicy::Always);
        assert_eq!(options.screenshot, CapturePolicy::OnlyOnFailure);
        assert_eq!(options.video, CapturePolicy::OnlyOnFailure);

        assert!(resolve("[use]\ntrace = \"sometimes\"", local()).is_err());
    }

    #[test]
    fn test_projects_inherit_and_override_use() {
        let content = r#"
[use]
action_timeout_ms = 6000
headless = true

[[projects]]
name = "firefox"

[[projects]]
name = "mobile"
browser = "chrome"
device = "Pixel 5"
use = { viewport = { width = 393, height = 851 }, headless = false }
"#;
        let config = resolve(content, local()).unwrap();
        assert_eq!(config.projects.len(), 2);
        assert_eq!(config.projects[0].browser, BrowserKind::Firefox);
        assert_eq!(config.projects[0].options.action_timeout_ms, 6000);

        let mobile = config.project("mobile").unwrap();
        assert_eq!(mobile.browser, BrowserKind::Chromium);
        assert_eq!(mobile.device.as_deref(), Some("Pixel 5"));
        assert_eq!(mobile.options.viewport.width, 393);
        assert!(!mobile.options.headless);
        assert_eq!(mobile.options.action_timeout_ms, 6000);
    }

    #[test]
    fn test_project_validation() {
        let dup = "[[projects]]\nname = \"a\"\nbrowser = \"firefox\"\n[[projects]]\nname = \"a\"\nbrowser = \"chromium\"";
        assert!(resolve(dup, local()).is_err());

        assert!(resolve("[[projects]]\nname = \"opera\"", local()).is_err());

        let device = "[[projects]]\nname = \"x\"\nbrowser = \"firefox\"\ndevice = \"iPhone 12\"";
        assert!(resolve(device, local()).is_err());

        assert!(resolve("[use]\nviewport = { width = 0, height = 10 }", local()).is_err());
    }

    #[test]
    fn test_project_filter_override() {
        let content = "[[projects]]\nname = \"chromium\"\n[[projects]]\nname = \"firefox\"";
        let overrides = Overrides {
            projects: vec!["firefox".to_string()],
            ..Default::default()
        };
        let config =
            RunConfig::from_toml_str(content, Path::new("/work"), local(), &overrides).unwrap();
        assert_eq!(config.projects.len(), 1);
        assert_eq!(config.projects[0].name, "firefox");

        let overrides = Overrides {
            projects: vec!["webkit-mobile".to_string()],
            ..Default::default()
        };
        assert!(RunConfig::from_toml_str(content, Path::new("/work"), local(), &overrides).is_err());
    }

    #[test]
    fn test_reporters() {
        let config = resolve("reporter = [\"list\", \"junit\"]", local()).unwrap();
        assert_eq!(config.reporters, vec![ReporterKind::List, ReporterKind::Junit]);

        let config = resolve("reporter = \"json\"", local()).unwrap();
        assert_eq!(config.reporters, vec![ReporterKind::Json]);

        let config = resolve("reporter = [\"list\", \"junit\", \"list\"]", local()).unwrap();
        assert_eq!(config.reporters, vec![ReporterKind::List, ReporterKind::Junit]);

        assert!(resolve("reporter = \"html\"", local()).is_err());
    }

    #[test]
    fn test_base_url_validation() {
        let config = resolve("base_url = \"https://the-internet.herokuapp.com/\"", local()).unwrap();
        assert_eq!(
            config.base_url.as_deref(),
            Some("https://the-internet.herokuapp.com")
        );
        assert!(resolve("base_url = \"/relative\"", local()).is_err());
        assert!(resolve("base_url = \"ftp://example.com\"", local()).is_err());
    }

    #[test]
    fn test_debug_override_disables_ceilings() {
        let content = "workers = 8\nretries = 2\n[use]\naction_timeout_ms = 5000";
        let overrides = Overrides {
            debug: true,
            ..Default::default()
        };
        let config =
            RunConfig::from_toml_str(content, Path::new("/work"), local(), &overrides).unwrap();
        assert_eq!(config.workers, 1);
        assert_eq!(config.retries, 0);
        assert_eq!(config.timeout_ms, 0);
        assert_eq!(config.expect_timeout_ms, 0);
        assert_eq!(config.projects[0].options.action_timeout_ms, 0);
        assert!(!config.projects[0].options.headless);
    }

    #[test]
    fn test_parse_ci_flag() {
        assert!(!parse_ci_flag(None).unwrap());
        assert!(!parse_ci_flag(Some("")).unwrap());
        assert!(!parse_ci_flag(Some("false")).unwrap());
        assert!(parse_ci_flag(Some("1")).unwrap());
        assert!(parse_ci_flag(Some("TRUE")).unwrap());
        assert!(parse_ci_flag(Some("maybe")).is_err());
    }

    #[test]
    fn test_webdriver_section() {
        let content = "[webdriver]\nurl = \"http://localhost:4444\"\n[webdriver.drivers]\nfirefox = \"bin/geckodriver\"";
        let config = resolve(content, local()).unwrap();
        assert_eq!(config.webdriver.url.as_deref(), Some("http://localhost:4444"));
        assert_eq!(
            config.webdriver.drivers.get(&BrowserKind::Firefox),
            Some(&PathBuf::from("/work/bin/geckodriver"))
        );
        assert!(resolve("[webdriver.drivers]\nlynx = \"lynx\"", local()).is_err());
    }
}
