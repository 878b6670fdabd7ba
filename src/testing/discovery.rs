//! Scenario discovery and filtering

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::common::config::RunConfig;
use crate::common::{paths, Error, Result};

use super::scenario::ScenarioFile;

/// Filters given on the command line
#[derive(Debug, Default, Clone)]
pub struct Filters {
    /// Substrings of the scenario file path; empty means every file
    pub paths: Vec<String>,
    pub grep: Option<Regex>,
    pub grep_invert: Option<Regex>,
}

impl Filters {
    pub fn new(paths: Vec<String>, grep: Option<&str>, grep_invert: Option<&str>) -> Result<Self> {
        let compile = |flag: &str, pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| Error::Config(format!("Invalid {} pattern '{}': {}", flag, pattern, e)))
        };
        Ok(Self {
            paths,
            grep: grep.map(|p| compile("--grep", p)).transpose()?,
            grep_invert: grep_invert.map(|p| compile("--grep-invert", p)).transpose()?,
        })
    }

    fn matches_path(&self, path: &Path, test_dir: &Path) -> bool {
        if self.paths.is_empty() {
            return true;
        }
        let absolute = path.to_string_lossy();
        let relative = path
            .strip_prefix(test_dir)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| absolute.to_string());
        self.paths.iter().any(|filter| {
            let filter = filter.trim_start_matches("./");
            relative.contains(filter) || absolute.contains(filter)
        })
    }

    fn matches_title(&self, title: &str) -> bool {
        self.grep.as_ref().map_or(true, |re| re.is_match(title))
            && !self.grep_invert.as_ref().map_or(false, |re| re.is_match(title))
    }
}

/// Every scenario file under `dir`, in sorted order
pub fn scenario_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "test_dir '{}' does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Config(format!("Failed to walk '{}': {}", dir.display(), e)))?;
        let is_scenario = entry.file_type().is_file()
            && matches!(
                entry.path().extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
        if is_scenario {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Load every scenario selected by the configuration and the filters
///
/// Files that end up with no selected scenario are dropped. When any
/// selected scenario is focused with `only`, everything else is dropped,
/// unless `forbid_only` is set, in which case focus is an error.
pub fn discover(config: &RunConfig, filters: &Filters) -> Result<Vec<ScenarioFile>> {
    let mut files = Vec::new();
    for path in scenario_files(&config.test_dir)? {
        if !filters.matches_path(&path, &config.test_dir) {
            continue;
        }
        files.push(ScenarioFile::load(&path)?);
    }
    tracing::debug!(files = files.len(), "loaded scenario files");

    let mut slugs: HashMap<String, &Path> = HashMap::new();
    for file in &files {
        let slug = paths::file_slug(&config.test_dir, &file.path);
        if let Some(other) = slugs.insert(slug, &file.path) {
            return Err(Error::Config(format!(
                "Scenario files '{}' and '{}' map to the same artifact directory",
                relative_display(other, &config.test_dir),
                relative_display(&file.path, &config.test_dir)
            )));
        }
    }

    let focused: Vec<String> = files
        .iter()
        .flat_map(|f| f.scenarios.iter())
        .filter(|s| s.only)
        .map(|s| format!("{}: {}", relative_display(&s.file, &config.test_dir), s.title()))
        .collect();

    if !focused.is_empty() && config.forbid_only {
        return Err(Error::FocusedScenarios(focused.join(", ")));
    }

    for file in &mut files {
        file.scenarios.retain(|s| filters.matches_title(&s.full_title()));
        if !focused.is_empty() {
            file.scenarios.retain(|s| s.only);
        }
    }
    files.retain(|f| !f.scenarios.is_empty());

    Ok(files)
}

/// Path shown to users: relative to the test directory when possible
pub fn relative_display(path: &Path, test_dir: &Path) -> String {
    path.strip_prefix(test_dir)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::{Environment, Overrides};
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "scenarios/login.yaml",
            "suite: Login\nscenarios:\n  - name: valid credentials\n    tags: [smoke]\n    steps: []\n  - name: invalid password\n    steps: []\n",
        );
        write(
            dir.path(),
            "scenarios/alerts/alerts.yml",
            "scenarios:\n  - name: accept alert\n    steps: []\n",
        );
        write(dir.path(), "scenarios/fixtures/upload.txt", "hello");
        dir
    }

    fn config(dir: &Path, extra: &str) -> RunConfig {
        RunConfig::from_toml_str(
            &format!("test_dir = \"scenarios\"\n{}", extra),
            dir,
            Environment { ci: false },
            &Overrides::default(),
        )
        .unwrap()
    }

    fn titles(files: &[ScenarioFile]) -> Vec<String> {
        files
            .iter()
            .flat_map(|f| f.scenarios.iter().map(|s| s.title()))
            .collect()
    }

    #[test]
    fn test_sorted_discovery() {
        let dir = tree();
        let files = scenario_files(&dir.path().join("scenarios")).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["alerts.yml", "login.yaml"]);
    }

    #[test]
    fn test_missing_test_dir() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(scenario_files(&dir.path().join("nope")), Err(Error::Config(_))));
    }

    #[test]
    fn test_grep_and_path_filters() {
        let dir = tree();
        let config = config(dir.path(), "");

        let all = discover(&config, &Filters::default()).unwrap();
        assert_eq!(
            titles(&all),
            vec!["accept alert", "Login › valid credentials", "Login › invalid password"]
        );

        let smoke = discover(&config, &Filters::new(vec![], Some("@smoke"), None).unwrap()).unwrap();
        assert_eq!(titles(&smoke), vec!["Login › valid credentials"]);

        let inverted = discover(&config, &Filters::new(vec![], None, Some("Login")).unwrap()).unwrap();
        assert_eq!(titles(&inverted), vec!["accept alert"]);

        let by_path = discover(&config, &Filters::new(vec!["alerts/".into()], None, None).unwrap()).unwrap();
        assert_eq!(titles(&by_path), vec!["accept alert"]);
    }

    #[test]
    fn test_invalid_grep() {
        assert!(matches!(Filters::new(vec![], Some("("), None), Err(Error::Config(_))));
    }

    #[test]
    fn test_focus_and_forbid_only() {
        let dir = tree();
        write(
            dir.path(),
            "scenarios/focus.yaml",
            "scenarios:\n  - name: focused one\n    only: true\n    steps: []\n  - name: other\n    steps: []\n",
        );

        let focused = discover(&config(dir.path(), ""), &Filters::default()).unwrap();
        assert_eq!(titles(&focused), vec!["focused one"]);

        let err = discover(&config(dir.path(), "forbid_only = true"), &Filters::default()).unwrap_err();
        match err {
            Error::FocusedScenarios(list) => assert!(list.contains("focus.yaml: focused one"), "{list}"),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_same_file_name_in_different_directories() {
        let dir = tree();
        write(dir.path(), "scenarios/admin/login.yaml", "scenarios:\n  - name: home\n    steps: []\n");
        write(dir.path(), "scenarios/user/login.yaml", "scenarios:\n  - name: home\n    steps: []\n");
        let files = discover(&config(dir.path(), ""), &Filters::default()).unwrap();
        assert_eq!(files.len(), 4);

        write(dir.path(), "scenarios/login.yml", "scenarios:\n  - name: home\n    steps: []\n");
        let err = discover(&config(dir.path(), ""), &Filters::default()).unwrap_err();
        assert!(err.to_string().contains("same artifact directory"), "{err}");
    }

    #[test]
    fn test_malformed_file_fails_discovery() {
        let dir = tree();
        write(dir.path(), "scenarios/broken.yaml", "scenarios:\n  - name: x\n    stepz: []\n");
        let err = discover(&config(dir.path(), ""), &Filters::default()).unwrap_err();
        assert!(matches!(err, Error::ScenarioParse { .. }), "{err}");
    }
}
