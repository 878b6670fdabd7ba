//! Well-known file names and output layout
//!
//! Per-attempt artifact directories are named
//! `<file-slug>-<scenario-slug>-<project>[-retry<N>]` under the output dir,
//! where the file slug covers the whole path below the test directory.

use std::path::{Component, Path, PathBuf};

/// Application name used for platform directories
const APP_NAME: &str = "scenarios-cli";

/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "scenarios.toml";

/// Longest slug kept in a directory name
const MAX_SLUG_LEN: usize = 60;

/// Get the path to the log directory
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.local/share/scenarios-cli/logs`
/// - macOS: `~/Library/Application Support/scenarios-cli/logs`
/// - Windows: `%APPDATA%\scenarios-cli\data\logs`
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("logs"))
}

/// Lowercase, dash-separated form of a title usable in file names
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }

    if slug.is_empty() {
        "scenario".to_string()
    } else {
        slug
    }
}

/// Slug of a scenario file below `test_dir`, extension dropped
///
/// Directory levels are joined with `--`, which a single slug never
/// contains, so `admin/login.yaml` and `admin-login.yaml` stay apart.
pub fn file_slug(test_dir: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(test_dir).unwrap_or(file).with_extension("");
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(slugify(&part.to_string_lossy())),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        "scenarios".to_string()
    } else {
        parts.join("--")
    }
}

/// Artifact directory for one attempt of one scenario in one project
pub fn attempt_dir(
    output_dir: &Path,
    file_slug: &str,
    scenario: &str,
    project: &str,
    retry: u32,
) -> PathBuf {
    let mut name = format!("{}-{}-{}", file_slug, slugify(scenario), slugify(project));
    if retry > 0 {
        name.push_str(&format!("-retry{}", retry));
    }
    output_dir.join(name)
}
