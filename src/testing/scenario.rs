//! Scenario script format
//!
//! Scenario files are YAML documents deserialized into raw types that
//! reject unknown fields, then validated into [`Step`]s with parsed
//! selectors and matchers. A malformed file is a configuration-class error
//! reported before anything runs.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::browser::{DialogResponse, Matcher, Selector};
use crate::common::{paths, Error, Result};

/// Separator between the suite and the scenario name in titles
pub const TITLE_SEPARATOR: &str = " › ";

// === Raw file format ===

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RawScenarioFile {
    /// Title prefix for every scenario in the file
    suite: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    /// Steps run at the start of every scenario
    #[serde(default)]
    before_each: Vec<RawStep>,
    scenarios: Vec<RawScenario>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RawScenario {
    name: String,
    #[serde(default)]
    tags: Vec<String>,
    /// Exclusive focus
    #[serde(default)]
    only: bool,
    skip: Option<RawSkip>,
    timeout_ms: Option<u64>,
    steps: Vec<RawStep>,
}

/// `skip: true` or `skip: "reason"`
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum RawSkip {
    Flag(bool),
    Reason(String),
}

/// A single step as written in the file
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case", deny_unknown_fields)]
enum RawStep {
    Goto {
        url: String,
    },
    Reload,
    GoBack,
    Click {
        selector: String,
        /// Answer the dialog this click opens
        dialog: Option<RawDialog>,
        /// The click opens a new window; continue in it
        #[serde(default)]
        popup: bool,
    },
    Fill {
        selector: String,
        value: String,
    },
    Clear {
        selector: String,
    },
    Press {
        selector: String,
        key: String,
    },
    Check {
        selector: String,
    },
    Uncheck {
        selector: String,
    },
    SelectOption {
        selector: String,
        value: String,
    },
    Upload {
        selector: String,
        /// Relative paths resolve against the scenario file's directory
        file: PathBuf,
    },
    Expect(RawExpect),
    Screenshot {
        name: String,
    },
    Wait {
        ms: u64,
    },
    SwitchPage {
        index: usize,
    },
    ClosePage,
    Evaluate {
        script: String,
        expect: Option<Value>,
    },
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum RawDialogAction {
    Accept,
    Dismiss,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RawDialog {
    respond: RawDialogAction,
    /// Text typed into a prompt before accepting
    prompt_text: Option<String>,
    /// Expected dialog message
    message: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct RawExpect {
    selector: Option<String>,
    #[serde(default, rename = "not")]
    negate: bool,
    timeout_ms: Option<u64>,
    to_have_title: Option<String>,
    to_have_url: Option<String>,
    to_contain_url: Option<String>,
    to_have_text: Option<String>,
    to_contain_text: Option<String>,
    to_have_value: Option<String>,
    to_be_visible: Option<bool>,
    to_be_hidden: Option<bool>,
    to_be_checked: Option<bool>,
    to_have_count: Option<usize>,
    to_have_attribute: Option<RawAttribute>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RawAttribute {
    name: String,
    value: String,
}

// === Validated form ===

/// The expected dialog and how to answer it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogExpectation {
    pub response: DialogResponse,
    pub message: Option<String>,
}

/// A validated scenario step
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Goto {
        url: String,
    },
    Reload,
    GoBack,
    Click {
        selector: Selector,
        dialog: Option<DialogExpectation>,
        popup: bool,
    },
    Fill {
        selector: Selector,
        value: String,
    },
    Clear {
        selector: Selector,
    },
    Press {
        selector: Selector,
        key: String,
    },
    SetChecked {
        selector: Selector,
        checked: bool,
    },
    SelectOption {
        selector: Selector,
        value: String,
    },
    Upload {
        selector: Selector,
        file: PathBuf,
    },
    Expect {
        selector: Option<Selector>,
        matcher: Matcher,
        negate: bool,
        timeout_ms: Option<u64>,
    },
    Screenshot {
        name: String,
    },
    Wait {
        ms: u64,
    },
    SwitchPage {
        index: usize,
    },
    ClosePage,
    Evaluate {
        script: String,
        expect: Option<Value>,
    },
}

impl Step {
    /// One-line title used in traces and failure messages
    pub fn title(&self) -> String {
        match self {
            Step::Goto { url } => format!("goto {}", url),
            Step::Reload => "reload".to_string(),
            Step::GoBack => "go back".to_string(),
            Step::Click { selector, dialog, popup } => {
                let mut title = format!("click '{}'", selector);
                if dialog.is_some() {
                    title.push_str(" (dialog)");
                }
                if *popup {
                    title.push_str(" (popup)");
                }
                title
            }
            Step::Fill { selector, value } => format!("fill '{}' with '{}'", selector, value),
            Step::Clear { selector } => format!("clear '{}'", selector),
            Step::Press { selector, key } => format!("press {} on '{}'", key, selector),
            Step::SetChecked { selector, checked: true } => format!("check '{}'", selector),
            Step::SetChecked { selector, checked: false } => format!("uncheck '{}'", selector),
            Step::SelectOption { selector, value } => {
                format!("select '{}' in '{}'", value, selector)
            }
            Step::Upload { selector, file } => {
                format!("upload {} to '{}'", file.display(), selector)
            }
            Step::Expect { selector, matcher, negate, .. } => format!(
                "expect {}{}{}",
                selector
                    .as_ref()
                    .map(|s| format!("'{}' ", s))
                    .unwrap_or_else(|| "page ".to_string()),
                if *negate { "not " } else { "" },
                matcher.describe()
            ),
            Step::Screenshot { name } => format!("screenshot {}", name),
            Step::Wait { ms } => format!("wait {}ms", ms),
            Step::SwitchPage { index } => format!("switch to page {}", index),
            Step::ClosePage => "close page".to_string(),
            Step::Evaluate { .. } => "evaluate script".to_string(),
        }
    }
}

/// One scenario, carrying everything needed to run it on its own
#[derive(Debug, Clone)]
pub struct Scenario {
    /// File the scenario was loaded from
    pub file: PathBuf,
    /// Position within the file
    pub index: usize,
    pub suite: Option<String>,
    pub name: String,
    /// File tags followed by scenario tags, without duplicates
    pub tags: Vec<String>,
    pub only: bool,
    /// `Some` when skipped; the reason may be empty
    pub skip: Option<String>,
    pub timeout_ms: Option<u64>,
    pub before_each: Vec<Step>,
    pub steps: Vec<Step>,
}

impl Scenario {
    /// `suite › name`, without tags
    pub fn title(&self) -> String {
        match &self.suite {
            Some(suite) => format!("{}{}{}", suite, TITLE_SEPARATOR, self.name),
            None => self.name.clone(),
        }
    }

    /// Title plus `@tag`s; this is what `--grep` matches against
    pub fn full_title(&self) -> String {
        let mut title = self.title();
        for tag in &self.tags {
            title.push_str(" @");
            title.push_str(tag);
        }
        title
    }

    /// Every step of an attempt, before-each steps first
    pub fn all_steps(&self) -> impl Iterator<Item = &Step> {
        self.before_each.iter().chain(self.steps.iter())
    }
}

/// The parsed content of one scenario file
#[derive(Debug, Clone)]
pub struct ScenarioFile {
    pub path: PathBuf,
    pub scenarios: Vec<Scenario>,
}

impl ScenarioFile {
    /// Read and validate a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content, path)
    }

    /// Validate scenario YAML as if it had been read from `path`
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let raw: RawScenarioFile =
            serde_yaml::from_str(content).map_err(|e| Error::scenario_parse(path, e))?;

        if raw.scenarios.is_empty() {
            return Err(Error::scenario_parse(path, "file defines no scenarios"));
        }

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let before_each = raw
            .before_each
            .into_iter()
            .map(|step| validate_step(step, base_dir))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::scenario_parse(path, format!("before_each: {}", e)))?;

        let mut seen = HashSet::new();
        let mut slugs: HashMap<String, String> = HashMap::new();
        let mut scenarios = Vec::with_capacity(raw.scenarios.len());

        for (index, scenario) in raw.scenarios.into_iter().enumerate() {
            let name = scenario.name.trim().to_string();
            if name.is_empty() {
                return Err(Error::scenario_parse(
                    path,
                    format!("scenario #{} has an empty name", index + 1),
                ));
            }
            if !seen.insert(name.clone()) {
                return Err(Error::scenario_parse(
                    path,
                    format!("duplicate scenario name '{}'", name),
                ));
            }
            if let Some(other) = slugs.insert(paths::slugify(&name), name.clone()) {
                return Err(Error::scenario_parse(
                    path,
                    format!(
                        "scenario names '{}' and '{}' map to the same artifact directory",
                        other, name
                    ),
                ));
            }

            let steps = scenario
                .steps
                .into_iter()
                .enumerate()
                .map(|(i, step)| {
                    validate_step(step, base_dir).map_err(|e| {
                        Error::scenario_parse(path, format!("'{}' step {}: {}", name, i + 1, e))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let mut tags = raw.tags.clone();
            for tag in scenario.tags {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }

            let skip = match scenario.skip {
                None | Some(RawSkip::Flag(false)) => None,
                Some(RawSkip::Flag(true)) => Some(String::new()),
                Some(RawSkip::Reason(reason)) => Some(reason),
            };

            scenarios.push(Scenario {
                file: path.to_path_buf(),
                index,
                suite: raw.suite.clone(),
                name,
                tags,
                only: scenario.only,
                skip,
                timeout_ms: scenario.timeout_ms,
                before_each: before_each.clone(),
                steps,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            scenarios,
        })
    }
}

fn validate_step(raw: RawStep, base_dir: &Path) -> Result<Step> {
    let step = match raw {
        RawStep::Goto { url } => Step::Goto { url },
        RawStep::Reload => Step::Reload,
        RawStep::GoBack => Step::GoBack,
        RawStep::Click {
            selector,
            dialog,
            popup,
        } => {
            if dialog.is_some() && popup {
                return Err(Error::InvalidStep(
                    "click cannot expect both a dialog and a popup".to_string(),
                ));
            }
            let dialog = dialog.map(|d| DialogExpectation {
                response: match d.respond {
                    RawDialogAction::Accept => DialogResponse::Accept {
                        prompt_text: d.prompt_text,
                    },
                    RawDialogAction::Dismiss => DialogResponse::Dismiss,
                },
                message: d.message,
            });
            Step::Click {
                selector: selector_of(&selector)?,
                dialog,
                popup,
            }
        }
        RawStep::Fill { selector, value } => Step::Fill {
            selector: selector_of(&selector)?,
            value,
        },
        RawStep::Clear { selector } => Step::Clear {
            selector: selector_of(&selector)?,
        },
        RawStep::Press { selector, key } => Step::Press {
            selector: selector_of(&selector)?,
            key,
        },
        RawStep::Check { selector } => Step::SetChecked {
            selector: selector_of(&selector)?,
            checked: true,
        },
        RawStep::Uncheck { selector } => Step::SetChecked {
            selector: selector_of(&selector)?,
            checked: false,
        },
        RawStep::SelectOption { selector, value } => Step::SelectOption {
            selector: selector_of(&selector)?,
            value,
        },
        RawStep::Upload { selector, file } => Step::Upload {
            selector: selector_of(&selector)?,
            file: if file.is_relative() {
                base_dir.join(file)
            } else {
                file
            },
        },
        RawStep::Expect(expect) => validate_expect(expect)?,
        RawStep::Screenshot { name } => {
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
            if !valid {
                return Err(Error::InvalidStep(format!(
                    "screenshot name '{}' may only contain letters, digits, '-', '_' and '.'",
                    name
                )));
            }
            Step::Screenshot { name }
        }
        RawStep::Wait { ms } => Step::Wait { ms },
        RawStep::SwitchPage { index } => Step::SwitchPage { index },
        RawStep::ClosePage => Step::ClosePage,
        RawStep::Evaluate { script, expect } => Step::Evaluate { script, expect },
    };
    Ok(step)
}

fn selector_of(s: &str) -> Result<Selector> {
    if s.trim().is_empty() {
        return Err(Error::InvalidStep("selector must not be empty".to_string()));
    }
    Ok(Selector::parse(s))
}

fn validate_expect(raw: RawExpect) -> Result<Step> {
    let flag = |name: &str, value: bool, matcher: Matcher| -> Result<Matcher> {
        if value {
            Ok(matcher)
        } else {
            Err(Error::InvalidStep(format!(
                "{}: false is not supported, use `not: true`",
                name
            )))
        }
    };

    let mut matchers = Vec::new();
    if let Some(t) = raw.to_have_title {
        matchers.push(Matcher::Title(t));
    }
    if let Some(u) = raw.to_have_url {
        matchers.push(Matcher::Url(u));
    }
    if let Some(u) = raw.to_contain_url {
        matchers.push(Matcher::UrlContains(u));
    }
    if let Some(t) = raw.to_have_text {
        matchers.push(Matcher::Text(t));
    }
    if let Some(t) = raw.to_contain_text {
        matchers.push(Matcher::ContainsText(t));
    }
    if let Some(v) = raw.to_have_value {
        matchers.push(Matcher::Value(v));
    }
    if let Some(v) = raw.to_be_visible {
        matchers.push(flag("to_be_visible", v, Matcher::Visible)?);
    }
    if let Some(v) = raw.to_be_hidden {
        matchers.push(flag("to_be_hidden", v, Matcher::Hidden)?);
    }
    if let Some(v) = raw.to_be_checked {
        matchers.push(flag("to_be_checked", v, Matcher::Checked)?);
    }
    if let Some(n) = raw.to_have_count {
        matchers.push(Matcher::Count(n));
    }
    if let Some(a) = raw.to_have_attribute {
        matchers.push(Matcher::Attribute {
            name: a.name,
            value: a.value,
        });
    }

    if matchers.len() != 1 {
        return Err(Error::InvalidStep(format!(
            "expect needs exactly one matcher, found {}",
            matchers.len()
        )));
    }
    let matcher = matchers.remove(0);

    let selector = raw.selector.as_deref().map(selector_of).transpose()?;
    match (matcher.targets_element(), &selector) {
        (true, None) => {
            return Err(Error::InvalidStep(format!(
                "expect {} requires a selector",
                matcher.describe()
            )))
        }
        (false, Some(_)) => {
            return Err(Error::InvalidStep(format!(
                "expect {} does not take a selector",
                matcher.describe()
            )))
        }
        _ => {}
    }

    Ok(Step::Expect {
        selector,
        matcher,
        negate: raw.negate,
        timeout_ms: raw.timeout_ms,
    })
}
