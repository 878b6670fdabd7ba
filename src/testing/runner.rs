//! Scenario runner
//!
//! Scenarios are grouped into units of work per project: a whole file by
//! default, a single scenario with `fully_parallel`. Units run on at most
//! `workers` concurrent lanes. Each attempt of a scenario gets a fresh
//! browser session, so nothing leaks between scenarios or retries.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::Instrument;

use crate::browser::{with_ceiling, BrowserLauncher, BrowserSession, Page, PageOptions};
use crate::common::config::{Project, RunConfig};
use crate::common::{paths, Error, Result, TimeoutKind};

use super::artifacts::{self, CapturePlan, TraceRecorder, SCREENSHOT_FILE};
use super::discovery::relative_display;
use super::report::Reporters;
use super::scenario::{Scenario, ScenarioFile, Step};

/// Ceiling for the final screenshot and for closing the session
const TEARDOWN_TIMEOUT_MS: u64 = 10_000;

/// Final outcome of a scenario in one project
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    /// Failed at least once, then passed on a retry
    Flaky,
    Failed,
    TimedOut,
    Skipped,
    /// Not started because the failure budget was exhausted
    Interrupted,
}

impl Outcome {
    /// Outcomes that make the run fail
    pub fn is_unexpected(&self) -> bool {
        matches!(self, Outcome::Failed | Outcome::TimedOut | Outcome::Interrupted)
    }

    fn from_attempts(attempts: &[AttemptResult]) -> Self {
        match attempts.last().map(|a| a.status) {
            Some(AttemptStatus::Passed) if attempts.len() > 1 => Outcome::Flaky,
            Some(AttemptStatus::Passed) => Outcome::Passed,
            Some(AttemptStatus::TimedOut) => Outcome::TimedOut,
            Some(AttemptStatus::Failed) | None => Outcome::Failed,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Passed => write!(f, "passed"),
            Outcome::Flaky => write!(f, "flaky"),
            Outcome::Failed => write!(f, "failed"),
            Outcome::TimedOut => write!(f, "timed out"),
            Outcome::Skipped => write!(f, "skipped"),
            Outcome::Interrupted => write!(f, "interrupted"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Passed,
    Failed,
    TimedOut,
}

/// One execution of a scenario
#[derive(Debug, Clone, Serialize)]
pub struct AttemptResult {
    pub retry: u32,
    pub status: AttemptStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub artifacts: Vec<PathBuf>,
    /// The failure came from the browser infrastructure, not the scenario
    #[serde(skip)]
    pub infrastructure: bool,
}

/// Position used to report results deterministically
pub type ResultOrder = (usize, usize, usize);

/// Everything known about a scenario once it is done in one project
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub project: String,
    /// Scenario file relative to the test directory
    pub file: String,
    pub title: String,
    pub tags: Vec<String>,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub attempts: Vec<AttemptResult>,
    #[serde(skip)]
    pub order: ResultOrder,
}

impl ScenarioResult {
    pub fn duration_ms(&self) -> u64 {
        self.attempts.iter().map(|a| a.duration_ms).sum()
    }

    /// Error of the last attempt
    pub fn error(&self) -> Option<&str> {
        self.attempts.last().and_then(|a| a.error.as_deref())
    }
}

/// Results of a whole run, ordered by project, file and position
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub results: Vec<ScenarioResult>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    /// No scenario failed, timed out or was interrupted
    pub fn is_success(&self) -> bool {
        !self.results.iter().any(|r| r.outcome.is_unexpected())
    }
}

/// A lane of scenarios that run one after another
struct Unit {
    project: Arc<Project>,
    scenarios: Vec<(Arc<Scenario>, ResultOrder)>,
}

/// Shared state of the scenario lanes
#[derive(Clone)]
struct Lanes {
    config: Arc<RunConfig>,
    launcher: Arc<dyn BrowserLauncher>,
    failures: Arc<AtomicUsize>,
}

/// Runs discovered scenarios against a browser backend
pub struct Runner {
    config: Arc<RunConfig>,
    launcher: Arc<dyn BrowserLauncher>,
}

impl Runner {
    pub fn new(config: Arc<RunConfig>, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { config, launcher }
    }

    /// Run every scenario once per project
    ///
    /// The output directory is emptied first. Scenario failures are part
    /// of the summary; only run-level problems are errors.
    pub async fn run(&self, files: &[ScenarioFile], reporters: &mut Reporters) -> Result<RunSummary> {
        let started = Instant::now();
        artifacts::clean_output_dir(&self.config.output_dir)?;

        let units = plan_units(&self.config, files);
        let total: usize = units.iter().map(|u| u.scenarios.len()).sum();
        tracing::info!(
            scenarios = total,
            workers = self.config.workers,
            projects = self.config.projects.len(),
            "starting run"
        );
        reporters.on_begin(&self.config, total);

        let lanes = Lanes {
            config: self.config.clone(),
            launcher: self.launcher.clone(),
            failures: Arc::new(AtomicUsize::new(0)),
        };
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();

        for unit in units {
            let lanes = lanes.clone();
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                for (scenario, order) in &unit.scenarios {
                    let span = tracing::debug_span!(
                        "scenario",
                        project = %unit.project.name,
                        title = %scenario.title()
                    );
                    let result = lanes
                        .run_scenario(&unit.project, scenario, *order)
                        .instrument(span)
                        .await;
                    if tx.send(result).is_err() {
                        return;
                    }
                }
            });
        }
        drop(tx);

        let mut results = Vec::with_capacity(total);
        while let Some(result) = rx.recv().await {
            reporters.on_result(&result);
            results.push(result);
        }

        let mut panicked = None;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                panicked = Some(Error::Internal(format!("Scenario lane failed: {}", e)));
            }
        }
        self.launcher.shutdown().await;
        if let Some(e) = panicked {
            return Err(e);
        }

        results.sort_by_key(|r| r.order);
        let summary = RunSummary {
            results,
            duration: started.elapsed(),
        };
        reporters.on_end(&self.config, &summary)?;
        Ok(summary)
    }
}

fn plan_units(config: &RunConfig, files: &[ScenarioFile]) -> Vec<Unit> {
    let mut units = Vec::new();
    for (p, project) in config.projects.iter().enumerate() {
        let project = Arc::new(project.clone());
        for (f, file) in files.iter().enumerate() {
            let scenarios: Vec<_> = file
                .scenarios
                .iter()
                .map(|s| (Arc::new(s.clone()), (p, f, s.index)))
                .collect();
            if config.fully_parallel {
                units.extend(scenarios.into_iter().map(|s| Unit {
                    project: project.clone(),
                    scenarios: vec![s],
                }));
            } else {
                units.push(Unit {
                    project: project.clone(),
                    scenarios,
                });
            }
        }
    }
    units
}

/// Mutable state threaded through the steps of one attempt
struct AttemptState {
    recorder: TraceRecorder,
    artifacts: Vec<PathBuf>,
    /// Title and start of the step in progress
    current_step: Option<(String, Instant)>,
}

impl Lanes {
    fn interrupted(&self) -> bool {
        self.config.max_failures > 0
            && self.failures.load(Ordering::SeqCst) >= self.config.max_failures
    }

    async fn run_scenario(&self, project: &Project, scenario: &Scenario, order: ResultOrder) -> ScenarioResult {
        let mut result = ScenarioResult {
            project: project.name.clone(),
            file: relative_display(&scenario.file, &self.config.test_dir),
            title: scenario.title(),
            tags: scenario.tags.clone(),
            outcome: Outcome::Skipped,
            skip_reason: None,
            attempts: Vec::new(),
            order,
        };

        if let Some(reason) = &scenario.skip {
            result.skip_reason = Some(reason.clone());
            return result;
        }
        if self.interrupted() {
            result.outcome = Outcome::Interrupted;
            return result;
        }

        for retry in 0..=self.config.retries {
            let attempt = self.run_attempt(project, scenario, retry).await;
            let passed = attempt.status == AttemptStatus::Passed;
            let infrastructure = attempt.infrastructure;
            if let Some(error) = &attempt.error {
                tracing::debug!(project = %project.name, title = %result.title, retry, %error, "attempt failed");
            }
            result.attempts.push(attempt);

            if passed {
                break;
            }
            if infrastructure && !self.config.retry_infrastructure_errors {
                tracing::warn!(title = %result.title, "browser infrastructure failed; not retrying");
                break;
            }
        }

        result.outcome = Outcome::from_attempts(&result.attempts);
        if result.outcome.is_unexpected() {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    async fn run_attempt(&self, project: &Project, scenario: &Scenario, retry: u32) -> AttemptResult {
        let started = Instant::now();
        let title = scenario.title();
        let ceiling = scenario.timeout_ms.unwrap_or(self.config.timeout_ms);
        let file_slug = paths::file_slug(&self.config.test_dir, &scenario.file);
        let dir = paths::attempt_dir(&self.config.output_dir, &file_slug, &scenario.name, &project.name, retry);

        let session = match self.open_session(project, ceiling).await {
            Ok(session) => session,
            Err(e) => {
                return AttemptResult {
                    retry,
                    status: AttemptStatus::Failed,
                    duration_ms: elapsed_ms(started),
                    error: Some(e.to_string()),
                    artifacts: Vec::new(),
                    infrastructure: e.is_infrastructure() || e.is_timeout(),
                }
            }
        };

        let page = Page::new(session, PageOptions::for_project(&self.config, project));
        let plan = CapturePlan::for_attempt(&project.options, retry);
        let mut state = AttemptState {
            recorder: TraceRecorder::new(plan),
            artifacts: Vec::new(),
            current_step: None,
        };

        let remaining = remaining_ms(ceiling, started);
        let outcome = with_ceiling(
            TimeoutKind::Scenario,
            remaining,
            &format!("'{}'", title),
            run_steps(&page, scenario, &dir, &mut state),
        )
        .await;

        let (status, error, infrastructure) = match &outcome {
            Ok(()) => (AttemptStatus::Passed, None, false),
            Err(e @ Error::Timeout { kind: TimeoutKind::Scenario, .. }) => {
                let message = match &state.current_step {
                    Some((step, step_started)) => {
                        state.recorder.record(step.clone(), *step_started, None, Some(e.to_string()));
                        format!(
                            "{} timeout of {}ms exceeded while running {}",
                            TimeoutKind::Scenario,
                            ceiling,
                            step
                        )
                    }
                    None => format!("{} timeout of {}ms exceeded", TimeoutKind::Scenario, ceiling),
                };
                (AttemptStatus::TimedOut, Some(message), false)
            }
            Err(e) => {
                let message = match &state.current_step {
                    Some((step, _)) => format!("{}: {}", step, e),
                    None => e.to_string(),
                };
                (AttemptStatus::Failed, Some(message), e.is_infrastructure())
            }
        };
        let failed = status != AttemptStatus::Passed;

        if plan.keep_screenshot(failed) {
            let screenshot = with_ceiling(
                TimeoutKind::Scenario,
                TEARDOWN_TIMEOUT_MS,
                "final screenshot",
                page.screenshot(),
            );
            match screenshot.await {
                Ok(png) => match artifacts::write_png(&dir, SCREENSHOT_FILE, &png) {
                    Ok(path) => state.artifacts.push(path),
                    Err(e) => tracing::warn!(error = %e, "failed to save screenshot"),
                },
                Err(e) => tracing::warn!(error = %e, "failed to take final screenshot"),
            }
        }

        let closed = with_ceiling(
            TimeoutKind::Scenario,
            TEARDOWN_TIMEOUT_MS,
            "close browser session",
            page.close(),
        );
        if let Err(e) = closed.await {
            tracing::warn!(error = %e, "failed to close browser session");
        }

        match state.recorder.persist(&dir, failed) {
            Ok(paths) => state.artifacts.extend(paths),
            Err(e) => tracing::warn!(error = %e, "failed to save trace artifacts"),
        }

        AttemptResult {
            retry,
            status,
            duration_ms: elapsed_ms(started),
            error,
            artifacts: state.artifacts,
            infrastructure,
        }
    }

    /// Open a session within the scenario ceiling
    ///
    /// A session the backend finishes creating after the ceiling fired is
    /// closed in the background.
    async fn open_session(&self, project: &Project, ceiling: u64) -> Result<Box<dyn BrowserSession>> {
        let launcher = self.launcher.clone();
        let owned = project.clone();
        let mut opening = tokio::spawn(async move { launcher.new_session(&owned).await });

        let joined = if ceiling == 0 {
            (&mut opening).await
        } else {
            let waited = tokio::time::timeout(Duration::from_millis(ceiling), &mut opening).await;
            match waited {
                Ok(joined) => joined,
                Err(_) => {
                    tokio::spawn(async move {
                        if let Ok(Ok(session)) = opening.await {
                            tracing::debug!("closing session opened after the scenario timeout");
                            if let Err(e) = session.close().await {
                                tracing::warn!(error = %e, "failed to close late browser session");
                            }
                        }
                    });
                    return Err(Error::timeout(TimeoutKind::Scenario, ceiling, "open browser session"));
                }
            }
        };
        joined.map_err(|e| Error::Internal(format!("Session task failed: {}", e)))?
    }
}

async fn run_steps(page: &Page, scenario: &Scenario, dir: &Path, state: &mut AttemptState) -> Result<()> {
    for step in scenario.all_steps() {
        let title = step.title();
        tracing::debug!(step = %title, "executing step");
        let started = state.recorder.step_started();
        state.current_step = Some((title.clone(), started));

        let result = execute_step(page, step, dir).await;

        let plan = state.recorder.plan();
        let url = if plan.trace { page.url().await.ok() } else { None };
        if plan.video {
            match page.screenshot().await {
                Ok(png) => state.recorder.add_frame(png),
                Err(e) => tracing::debug!(error = %e, "filmstrip frame skipped"),
            }
        }
        state
            .recorder
            .record(title, started, url, result.as_ref().err().map(|e| e.to_string()));

        if let Some(path) = result? {
            state.artifacts.push(path);
        }
        state.current_step = None;
    }
    Ok(())
}

/// Execute a single step; returns the path of any artifact it wrote
async fn execute_step(page: &Page, step: &Step, dir: &Path) -> Result<Option<PathBuf>> {
    match step {
        Step::Goto { url } => page.goto(url).await?,
        Step::Reload => page.reload().await?,
        Step::GoBack => page.go_back().await?,
        Step::Click {
            selector,
            dialog: Some(expected),
            ..
        } => {
            let subscription = page.subscribe_dialog(expected.response.clone());
            let dialog = page.click_with_dialog(selector, subscription).await?;
            if let Some(message) = &expected.message {
                if &dialog.message != message {
                    return Err(Error::Assertion(format!(
                        "Expected dialog message '{}', got '{}'",
                        message, dialog.message
                    )));
                }
            }
        }
        Step::Click {
            selector,
            popup: true,
            ..
        } => {
            let subscription = page.subscribe_popup().await?;
            page.click_with_popup(selector, subscription).await?;
        }
        Step::Click { selector, .. } => page.click(selector).await?,
        Step::Fill { selector, value } => page.fill(selector, value).await?,
        Step::Clear { selector } => page.clear(selector).await?,
        Step::Press { selector, key } => page.press(selector, key).await?,
        Step::SetChecked { selector, checked } => page.set_checked(selector, *checked).await?,
        Step::SelectOption { selector, value } => page.select_option(selector, value).await?,
        Step::Upload { selector, file } => page.upload(selector, file).await?,
        Step::Expect {
            selector,
            matcher,
            negate,
            timeout_ms,
        } => page.expect(selector.as_ref(), matcher, *negate, *timeout_ms).await?,
        Step::Screenshot { name } => {
            let png = page.screenshot().await?;
            return Ok(Some(artifacts::write_png(dir, name, &png)?));
        }
        Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
        Step::SwitchPage { index } => page.switch_page(*index).await?,
        Step::ClosePage => page.close_page().await?,
        Step::Evaluate { script, expect } => {
            let value = page.evaluate(script).await?;
            if let Some(expected) = expect {
                if &value != expected {
                    return Err(Error::Assertion(format!(
                        "Script returned {}, expected {}",
                        value, expected
                    )));
                }
            }
        }
    }
    Ok(None)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Time left under a ceiling (0 = none); never 0 once a ceiling applies
fn remaining_ms(ceiling: u64, started: Instant) -> u64 {
    if ceiling == 0 {
        return 0;
    }
    ceiling.saturating_sub(elapsed_ms(started)).max(1)
}
