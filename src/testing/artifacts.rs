//! Per-attempt artifacts: traces, screenshots and filmstrip videos
//!
//! Capture and retention are separate decisions. Whether to capture is
//! known when the attempt starts; whether to keep depends on how it ended.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::time::Instant;

use crate::common::config::{CapturePolicy, UseOptions};
use crate::common::{Error, Result};

/// File name of the zipped trace
pub const TRACE_FILE: &str = "trace.zip";
/// Entry inside the trace archive
pub const TRACE_ENTRY: &str = "trace.jsonl";
/// Final-state screenshot
pub const SCREENSHOT_FILE: &str = "screenshot.png";
/// Directory of filmstrip frames
pub const VIDEO_DIR: &str = "video";

/// Whether an attempt with this retry index records anything at all
pub fn captures(policy: CapturePolicy, retry: u32) -> bool {
    match policy {
        CapturePolicy::Always | CapturePolicy::OnlyOnFailure => true,
        CapturePolicy::Never => false,
        CapturePolicy::OnFirstRetry => retry == 1,
    }
}

/// Whether a captured artifact survives the attempt
pub fn keeps(policy: CapturePolicy, retry: u32, failed: bool) -> bool {
    match policy {
        CapturePolicy::Always => true,
        CapturePolicy::Never => false,
        CapturePolicy::OnlyOnFailure => failed,
        CapturePolicy::OnFirstRetry => retry == 1,
    }
}

/// What one attempt records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePlan {
    pub trace: bool,
    pub video: bool,
    retry: u32,
    policies: [CapturePolicy; 3],
}

impl CapturePlan {
    pub fn for_attempt(options: &UseOptions, retry: u32) -> Self {
        Self {
            trace: captures(options.trace, retry),
            video: captures(options.video, retry),
            retry,
            policies: [options.trace, options.screenshot, options.video],
        }
    }

    pub fn keep_trace(&self, failed: bool) -> bool {
        self.trace && keeps(self.policies[0], self.retry, failed)
    }

    /// The final screenshot is taken after the outcome is known
    pub fn keep_screenshot(&self, failed: bool) -> bool {
        keeps(self.policies[1], self.retry, failed)
    }

    pub fn keep_video(&self, failed: bool) -> bool {
        self.video && keeps(self.policies[2], self.retry, failed)
    }
}

/// One recorded step
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TraceEvent {
    pub index: usize,
    pub title: String,
    /// Milliseconds since the attempt started
    pub start_ms: u64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Collects step events and filmstrip frames during an attempt
pub struct TraceRecorder {
    plan: CapturePlan,
    started: Instant,
    events: Vec<TraceEvent>,
    frames: Vec<Vec<u8>>,
}

impl TraceRecorder {
    pub fn new(plan: CapturePlan) -> Self {
        Self {
            plan,
            started: Instant::now(),
            events: Vec::new(),
            frames: Vec::new(),
        }
    }

    pub fn plan(&self) -> CapturePlan {
        self.plan
    }

    /// Timestamp to pass back to [`TraceRecorder::record`]
    pub fn step_started(&self) -> Instant {
        Instant::now()
    }

    pub fn record(&mut self, title: String, started: Instant, url: Option<String>, error: Option<String>) {
        if !self.plan.trace {
            return;
        }
        self.events.push(TraceEvent {
            index: self.events.len(),
            title,
            start_ms: started.duration_since(self.started).as_millis() as u64,
            duration_ms: started.elapsed().as_millis() as u64,
            url,
            error,
        });
    }

    pub fn add_frame(&mut self, png: Vec<u8>) {
        if self.plan.video {
            self.frames.push(png);
        }
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Write what the plan keeps for this outcome into `dir`
    pub fn persist(&self, dir: &Path, failed: bool) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();

        if self.plan.keep_trace(failed) {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(TRACE_FILE);
            write_trace_zip(&path, &self.events)?;
            written.push(path);
        }

        if self.plan.keep_video(failed) && !self.frames.is_empty() {
            let video_dir = dir.join(VIDEO_DIR);
            std::fs::create_dir_all(&video_dir)?;
            for (i, frame) in self.frames.iter().enumerate() {
                let path = video_dir.join(format!("frame-{:04}.png", i + 1));
                std::fs::write(&path, frame)?;
                written.push(path);
            }
        }

        Ok(written)
    }
}

/// Write a PNG into an attempt directory
pub fn write_png(dir: &Path, name: &str, png: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let file_name = if name.ends_with(".png") {
        name.to_string()
    } else {
        format!("{}.png", name)
    };
    let path = dir.join(file_name);
    std::fs::write(&path, png)?;
    Ok(path)
}

fn write_trace_zip(path: &Path, events: &[TraceEvent]) -> Result<()> {
    let zip_error = |e: zip::result::ZipError| {
        Error::Internal(format!("Failed to write {}: {}", path.display(), e))
    };

    let file = std::fs::File::create(path)?;
    let mut archive = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    archive.start_file(TRACE_ENTRY, options).map_err(zip_error)?;
    for event in events {
        let line = serde_json::to_string(event)?;
        archive.write_all(line.as_bytes())?;
        archive.write_all(b"\n")?;
    }
    archive.finish().map_err(zip_error)?;
    Ok(())
}

/// Empty the output directory at the start of a run
pub fn clean_output_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        tracing::debug!(dir = %dir.display(), "cleaning output directory");
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::Viewport;
    use std::io::Read;

    fn options(trace: CapturePolicy, screenshot: CapturePolicy, video: CapturePolicy) -> UseOptions {
        UseOptions {
            action_timeout_ms: 0,
            navigation_timeout_ms: 0,
            trace,
            screenshot,
            video,
            viewport: Viewport::default(),
            ignore_https_errors: false,
            headless: true,
        }
    }

    #[test]
    fn test_policy_predicates() {
        use CapturePolicy::*;
        for (policy, retry, failed, keep) in [
            (Always, 0, false, true),
            (Always, 2, true, true),
            (Never, 0, true, false),
            (OnlyOnFailure, 0, false, false),
            (OnlyOnFailure, 3, true, true),
            (OnFirstRetry, 0, true, false),
            (OnFirstRetry, 1, false, true),
            (OnFirstRetry, 2, true, false),
        ] {
            assert_eq!(keeps(policy, retry, failed), keep, "{policy:?} retry={retry} failed={failed}");
            if keep {
                assert!(captures(policy, retry));
            }
        }
        assert!(!captures(OnFirstRetry, 0));
        assert!(captures(OnlyOnFailure, 0));
    }

    #[tokio::test]
    async fn test_persist_trace_and_video() {
        let dir = tempfile::tempdir().unwrap();
        let plan = CapturePlan::for_attempt(
            &options(CapturePolicy::Always, CapturePolicy::Never, CapturePolicy::OnlyOnFailure),
            0,
        );
        let mut recorder = TraceRecorder::new(plan);
        let started = recorder.step_started();
        recorder.record("goto /".into(), started, Some("https://x.test/".into()), None);
        recorder.record("click '#go'".into(), recorder.step_started(), None, Some("boom".into()));
        recorder.add_frame(b"png1".to_vec());
        recorder.add_frame(b"png2".to_vec());

        let passed = recorder.persist(&dir.path().join("passed"), false).unwrap();
        assert_eq!(passed, vec![dir.path().join("passed").join(TRACE_FILE)]);

        let failed = recorder.persist(&dir.path().join("failed"), true).unwrap();
        assert_eq!(failed.len(), 3);
        assert!(dir.path().join("failed/video/frame-0002.png").exists());

        let file = std::fs::File::open(dir.path().join("passed").join(TRACE_FILE)).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut content = String::new();
        archive.by_name(TRACE_ENTRY).unwrap().read_to_string(&mut content).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["title"], "goto /");
        assert_eq!(lines[0]["url"], "https://x.test/");
        assert_eq!(lines[1]["error"], "boom");
        assert!(lines[1].get("url").is_none());
    }

    #[test]
    fn test_nothing_recorded_when_not_captured() {
        let dir = tempfile::tempdir().unwrap();
        let plan = CapturePlan::for_attempt(
            &options(CapturePolicy::OnFirstRetry, CapturePolicy::Never, CapturePolicy::Never),
            0,
        );
        let mut recorder = TraceRecorder::new(plan);
        recorder.record("goto /".into(), Instant::now(), None, None);
        recorder.add_frame(b"png".to_vec());
        assert!(recorder.events().is_empty());
        assert!(recorder.persist(dir.path(), true).unwrap().is_empty());
        assert!(!plan.keep_screenshot(true));
    }

    #[test]
    fn test_clean_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("test-results");
        std::fs::create_dir_all(out.join("old-run")).unwrap();
        std::fs::write(out.join("old-run/trace.zip"), b"x").unwrap();

        clean_output_dir(&out).unwrap();
        assert!(out.is_dir());
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn test_write_png_appends_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "after-login", b"png").unwrap();
        assert_eq!(path, dir.path().join("after-login.png"));
        let path = write_png(dir.path(), "x.png", b"png").unwrap();
        assert_eq!(path, dir.path().join("x.png"));
    }
}
