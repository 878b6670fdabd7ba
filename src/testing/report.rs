//! Result reporters
//!
//! `list` and `dot` write to stdout while the run progresses; `json` and
//! `junit` write a file into the output directory when the run ends.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::PathBuf;

use colored::Colorize;
use serde::Serialize;

use crate::common::config::{ReporterKind, RunConfig};
use crate::common::Result;

use super::runner::{Outcome, RunSummary, ScenarioResult};

/// JSON report file name
pub const JSON_REPORT: &str = "results.json";
/// JUnit report file name
pub const JUNIT_REPORT: &str = "results.xml";

/// Receives results as the run progresses
pub trait Reporter: Send {
    fn on_begin(&mut self, _config: &RunConfig, _total: usize) {}
    fn on_result(&mut self, _result: &ScenarioResult) {}
    fn on_end(&mut self, config: &RunConfig, summary: &RunSummary) -> Result<()>;
}

/// The configured reporters, fanned out in order
#[derive(Default)]
pub struct Reporters {
    reporters: Vec<Box<dyn Reporter>>,
}

impl Reporters {
    pub fn from_config(config: &RunConfig) -> Self {
        let reporters = config
            .reporters
            .iter()
            .map(|kind| -> Box<dyn Reporter> {
                match kind {
                    ReporterKind::List => Box::new(ListReporter),
                    ReporterKind::Dot => Box::new(DotReporter { column: 0 }),
                    ReporterKind::Json => Box::new(JsonReporter),
                    ReporterKind::Junit => Box::new(JunitReporter),
                }
            })
            .collect();
        Self { reporters }
    }

    pub fn on_begin(&mut self, config: &RunConfig, total: usize) {
        for r in &mut self.reporters {
            r.on_begin(config, total);
        }
    }

    pub fn on_result(&mut self, result: &ScenarioResult) {
        for r in &mut self.reporters {
            r.on_result(result);
        }
    }

    pub fn on_end(&mut self, config: &RunConfig, summary: &RunSummary) -> Result<()> {
        for r in &mut self.reporters {
            r.on_end(config, summary)?;
        }
        Ok(())
    }
}

// === Console ===

fn outcome_mark(outcome: Outcome) -> String {
    match outcome {
        Outcome::Passed => "✓".green().to_string(),
        Outcome::Flaky => "±".yellow().to_string(),
        Outcome::Failed | Outcome::TimedOut => "✗".red().to_string(),
        Outcome::Skipped => "-".dimmed().to_string(),
        Outcome::Interrupted => "○".dimmed().to_string(),
    }
}

/// `[project] › file › title` as shown in console output
pub fn location(result: &ScenarioResult) -> String {
    format!("[{}] › {} › {}", result.project, result.file, result.title)
}

/// One live line per finished scenario
pub fn result_line(result: &ScenarioResult) -> String {
    let mut line = format!("  {} {}", outcome_mark(result.outcome), location(result));
    match result.outcome {
        Outcome::Skipped | Outcome::Interrupted => {}
        _ => {
            let _ = write!(line, " {}", format!("({})", format_ms(result.duration_ms())).dimmed());
        }
    }
    if result.attempts.len() > 1 {
        let _ = write!(line, " {}", format!("[{} attempts]", result.attempts.len()).dimmed());
    }
    line
}

/// Failure digest followed by the per-outcome counts
pub fn summary_text(summary: &RunSummary) -> String {
    let mut out = String::new();

    let unexpected: Vec<&ScenarioResult> = summary
        .results
        .iter()
        .filter(|r| matches!(r.outcome, Outcome::Failed | Outcome::TimedOut | Outcome::Flaky))
        .collect();
    for (i, result) in unexpected.iter().enumerate() {
        let _ = writeln!(out, "\n  {}) {} ({})", i + 1, location(result), result.outcome);
        for attempt in &result.attempts {
            if let Some(error) = &attempt.error {
                let label = if attempt.retry == 0 {
                    String::new()
                } else {
                    format!("retry #{}: ", attempt.retry)
                };
                let _ = writeln!(out, "     {}{}", label.dimmed(), error.red());
            }
            for artifact in &attempt.artifacts {
                let _ = writeln!(out, "     {} {}", "attachment:".dimmed(), artifact.display());
            }
        }
    }

    out.push('\n');
    let counts = [
        (Outcome::Passed, "passed"),
        (Outcome::Flaky, "flaky"),
        (Outcome::Failed, "failed"),
        (Outcome::TimedOut, "timed out"),
        (Outcome::Skipped, "skipped"),
        (Outcome::Interrupted, "interrupted"),
    ];
    for (outcome, label) in counts {
        let n = summary.count(outcome);
        if n == 0 {
            continue;
        }
        let text = format!("{} {}", n, label);
        let text = match outcome {
            Outcome::Passed => text.green(),
            Outcome::Flaky => text.yellow(),
            Outcome::Failed | Outcome::TimedOut => text.red(),
            Outcome::Skipped | Outcome::Interrupted => text.dimmed(),
        };
        let _ = writeln!(out, "  {}", text);
        if outcome.is_unexpected() || outcome == Outcome::Flaky {
            for result in summary.results.iter().filter(|r| r.outcome == outcome) {
                let _ = writeln!(out, "    {}", location(result));
            }
        }
    }
    let _ = writeln!(out, "  {}", format!("finished in {}", format_ms(summary.duration.as_millis() as u64)).dimmed());
    out
}

fn format_ms(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}

fn run_header(config: &RunConfig, total: usize) -> String {
    format!(
        "\nRunning {} scenario{} using {} worker{}\n",
        total,
        if total == 1 { "" } else { "s" },
        config.workers,
        if config.workers == 1 { "" } else { "s" }
    )
}

struct ListReporter;

impl Reporter for ListReporter {
    fn on_begin(&mut self, config: &RunConfig, total: usize) {
        println!("{}", run_header(config, total));
    }

    fn on_result(&mut self, result: &ScenarioResult) {
        println!("{}", result_line(result));
    }

    fn on_end(&mut self, _config: &RunConfig, summary: &RunSummary) -> Result<()> {
        print!("{}", summary_text(summary));
        Ok(())
    }
}

struct DotReporter {
    column: usize,
}

impl Reporter for DotReporter {
    fn on_begin(&mut self, config: &RunConfig, total: usize) {
        println!("{}", run_header(config, total));
    }

    fn on_result(&mut self, result: &ScenarioResult) {
        let mark = match result.outcome {
            Outcome::Passed => "·".green(),
            Outcome::Flaky => "±".yellow(),
            Outcome::Failed => "F".red(),
            Outcome::TimedOut => "T".red(),
            Outcome::Skipped => "°".dimmed(),
            Outcome::Interrupted => "×".dimmed(),
        };
        print!("{}", mark);
        self.column += 1;
        if self.column == 80 {
            println!();
            self.column = 0;
        }
        let _ = std::io::stdout().flush();
    }

    fn on_end(&mut self, _config: &RunConfig, summary: &RunSummary) -> Result<()> {
        println!();
        print!("{}", summary_text(summary));
        Ok(())
    }
}

// === Files ===

#[derive(Serialize)]
struct JsonReport<'a> {
    config: JsonConfig<'a>,
    stats: JsonStats,
    results: &'a [ScenarioResult],
}

#[derive(Serialize)]
struct JsonConfig<'a> {
    config_file: Option<&'a PathBuf>,
    ci: bool,
    workers: usize,
    retries: u32,
    projects: Vec<&'a str>,
}

#[derive(Serialize)]
struct JsonStats {
    expected: usize,
    unexpected: usize,
    flaky: usize,
    skipped: usize,
    duration_ms: u64,
}

/// Render the JSON report
pub fn json_report(config: &RunConfig, summary: &RunSummary) -> Result<String> {
    let report = JsonReport {
        config: JsonConfig {
            config_file: config.config_file.as_ref(),
            ci: config.ci,
            workers: config.workers,
            retries: config.retries,
            projects: config.projects.iter().map(|p| p.name.as_str()).collect(),
        },
        stats: JsonStats {
            expected: summary.count(Outcome::Passed),
            unexpected: summary.results.iter().filter(|r| r.outcome.is_unexpected()).count(),
            flaky: summary.count(Outcome::Flaky),
            skipped: summary.count(Outcome::Skipped),
            duration_ms: summary.duration.as_millis() as u64,
        },
        results: &summary.results,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

struct JsonReporter;

impl Reporter for JsonReporter {
    fn on_end(&mut self, config: &RunConfig, summary: &RunSummary) -> Result<()> {
        std::fs::create_dir_all(&config.output_dir)?;
        let path = config.output_dir.join(JSON_REPORT);
        std::fs::write(&path, json_report(config, summary)?)?;
        tracing::info!(path = %path.display(), "wrote JSON report");
        Ok(())
    }
}

/// Escape text for XML attributes and character data
pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Control characters are not allowed in XML 1.0
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

fn is_failure(result: &ScenarioResult) -> bool {
    matches!(result.outcome, Outcome::Failed | Outcome::TimedOut)
}

fn is_skipped(result: &ScenarioResult) -> bool {
    matches!(result.outcome, Outcome::Skipped | Outcome::Interrupted)
}

/// Render the JUnit report: one suite per file and project
pub fn junit_report(summary: &RunSummary) -> String {
    let mut suites: BTreeMap<(usize, usize), Vec<&ScenarioResult>> = BTreeMap::new();
    for result in &summary.results {
        suites
            .entry((result.order.0, result.order.1))
            .or_default()
            .push(result);
    }

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        xml,
        "<testsuites name=\"scenarios\" tests=\"{}\" failures=\"{}\" skipped=\"{}\" errors=\"0\" time=\"{}\">",
        summary.results.len(),
        summary.results.iter().filter(|r| is_failure(r)).count(),
        summary.results.iter().filter(|r| is_skipped(r)).count(),
        seconds(summary.duration.as_millis() as u64)
    );

    for results in suites.values() {
        let Some(first) = results.first() else {
            continue;
        };
        let suite_name = format!("{} [{}]", first.file, first.project);
        let _ = writeln!(
            xml,
            "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" skipped=\"{}\" errors=\"0\" time=\"{}\">",
            xml_escape(&suite_name),
            results.len(),
            results.iter().filter(|r| is_failure(r)).count(),
            results.iter().filter(|r| is_skipped(r)).count(),
            seconds(results.iter().map(|r| r.duration_ms()).sum())
        );

        for result in results {
            let _ = write!(
                xml,
                "    <testcase name=\"{}\" classname=\"{}\" time=\"{}\"",
                xml_escape(&result.title),
                xml_escape(&suite_name),
                seconds(result.duration_ms())
            );
            match result.outcome {
                Outcome::Passed | Outcome::Flaky => xml.push_str("/>\n"),
                Outcome::Skipped | Outcome::Interrupted => {
                    let message = match result.outcome {
                        Outcome::Interrupted => "interrupted".to_string(),
                        _ => result.skip_reason.clone().unwrap_or_default(),
                    };
                    let _ = writeln!(xml, ">\n      <skipped message=\"{}\"/>\n    </testcase>", xml_escape(&message));
                }
                Outcome::Failed | Outcome::TimedOut => {
                    let error = result.error().unwrap_or("failed");
                    let message = error.lines().next().unwrap_or(error);
                    let _ = writeln!(
                        xml,
                        ">\n      <failure message=\"{}\" type=\"{}\">{}</failure>\n    </testcase>",
                        xml_escape(message),
                        result.outcome,
                        xml_escape(error)
                    );
                }
            }
        }
        xml.push_str("  </testsuite>\n");
    }
    xml.push_str("</testsuites>\n");
    xml
}

struct JunitReporter;

impl Reporter for JunitReporter {
    fn on_end(&mut self, config: &RunConfig, summary: &RunSummary) -> Result<()> {
        std::fs::create_dir_all(&config.output_dir)?;
        let path = config.output_dir.join(JUNIT_REPORT);
        std::fs::write(&path, junit_report(summary))?;
        tracing::info!(path = %path.display(), "wrote JUnit report");
        Ok(())
    }
}
