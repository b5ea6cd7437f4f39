//! Task runner
//!
//! Executes one category's transformation batch: walk the source root, apply
//! the step pipeline to every matching file, write outputs under the
//! destination preserving relative structure. One bad file never aborts the
//! batch; its failure is recorded and logged and the rest still completes.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::StepError;
use crate::registry::CategoryTask;

/// Outcome of one batch: how many files made it, and which did not
#[derive(Debug, Default)]
pub struct BatchResult {
    pub succeeded: usize,
    pub failed: Vec<(PathBuf, StepError)>,
}

impl BatchResult {
    /// True when every file in the batch transformed cleanly
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run one category's build batch.
///
/// An empty match set (or a source root that does not exist yet) is a no-op
/// success, not an error.
pub fn run_build(task: &CategoryTask) -> BatchResult {
    let mut result = BatchResult::default();

    if !task.src_root.exists() {
        debug!(category = %task.name, root = %task.src_root.display(), "source root missing, nothing to do");
        return result;
    }

    for entry in WalkDir::new(&task.src_root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                warn!(category = %task.name, file = %path.display(), "cannot traverse: {e}");
                result.failed.push((path, StepError::Io(e.into())));
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(&task.src_root) else {
            continue;
        };
        if !task.matches_relative(rel) {
            continue;
        }

        match transform_file(task, entry.path(), rel) {
            Ok(()) => result.succeeded += 1,
            Err(err) => {
                warn!(category = %task.name, file = %entry.path().display(), "{err}");
                result.failed.push((entry.path().to_path_buf(), err));
            }
        }
    }

    result
}

/// Run the step pipeline for one file and write the output
fn transform_file(task: &CategoryTask, source: &Path, rel: &Path) -> Result<(), StepError> {
    let mut bytes = fs::read(source)?;
    for step in task.steps() {
        bytes = step.apply(&bytes)?;
    }

    let dest = task.dest.join(rel);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&dest, bytes)?;

    Ok(())
}

/// Delete the output root ahead of the initial build.
///
/// A missing output root is fine; any other failure is recorded, not fatal,
/// the same as every other batch-level failure.
pub fn run_clean(output_root: &Path) -> BatchResult {
    let mut result = BatchResult::default();

    match fs::remove_dir_all(output_root) {
        Ok(()) => result.succeeded = 1,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(root = %output_root.display(), "clean failed: {e}");
            result.failed.push((output_root.to_path_buf(), StepError::Io(e)));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::registry::Registry;
    use tempfile::TempDir;

    fn registry_for(dir: &TempDir, files: &str, steps: &str) -> Registry {
        let toml = format!(
            r#"
            [settings]
            output = "{out}"

            [categories.subject]
            src = "{src}"
            files = "{files}"
            dest = "out"
            steps = [{steps}]
            "#,
            out = dir.path().join("dist").display(),
            src = dir.path().join("src").display(),
        );
        let config: Config = toml::from_str(&toml).unwrap();
        config.validate().unwrap();
        Registry::from_config(&config).unwrap()
    }

    #[test]
    fn test_one_bad_file_does_not_abort_the_batch() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("bad.js"), "function (").unwrap();
        fs::write(src.join("ok.js"), "console.log('hi');").unwrap();

        let registry = registry_for(&dir, "**/*.js", r#""minify-js""#);
        let result = run_build(registry.get("subject").unwrap());

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed.len(), 1);
        assert!(result.failed[0].0.ends_with("bad.js"));
        assert!(matches!(result.failed[0].1, StepError::Script(_)));
        assert!(dir.path().join("dist/out/ok.js").exists());
        assert!(!dir.path().join("dist/out/bad.js").exists());
    }

    #[test]
    fn test_empty_match_is_noop_success() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();

        let registry = registry_for(&dir, "**/*.css", r#""copy""#);
        let result = run_build(registry.get("subject").unwrap());

        assert_eq!(result.succeeded, 0);
        assert!(result.failed.is_empty());
        assert!(!dir.path().join("dist/out").exists());
    }

    #[test]
    fn test_missing_source_root_is_noop_success() {
        let dir = TempDir::new().unwrap();

        let registry = registry_for(&dir, "**/*.css", r#""copy""#);
        let result = run_build(registry.get("subject").unwrap());

        assert_eq!(result.succeeded, 0);
        assert!(result.failed.is_empty());
    }

    #[test]
    fn test_relative_structure_preserved() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested/deeper")).unwrap();
        fs::write(src.join("top.txt"), "top").unwrap();
        fs::write(src.join("nested/deeper/leaf.txt"), "leaf").unwrap();

        let registry = registry_for(&dir, "**/*.txt", r#""copy""#);
        let result = run_build(registry.get("subject").unwrap());

        assert_eq!(result.succeeded, 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("dist/out/top.txt")).unwrap(),
            "top"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("dist/out/nested/deeper/leaf.txt")).unwrap(),
            "leaf"
        );
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("site.css"), "body {\n  color: #ff0000;\n}\n").unwrap();

        let registry = registry_for(&dir, "**/*.css", r#""minify-css""#);
        let task = registry.get("subject").unwrap();

        let first = run_build(task);
        assert_eq!(first.succeeded, 1);
        let out = dir.path().join("dist/out/site.css");
        let first_bytes = fs::read(&out).unwrap();

        let second = run_build(task);
        assert_eq!(second.succeeded, 1);
        assert_eq!(fs::read(&out).unwrap(), first_bytes);
    }

    #[test]
    fn test_run_clean_removes_output_root() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("dist");
        fs::create_dir_all(out.join("css")).unwrap();
        fs::write(out.join("css/site.css"), "body{}").unwrap();

        let result = run_clean(&out);
        assert!(result.is_clean());
        assert!(!out.exists());

        // missing root is fine too
        let again = run_clean(&out);
        assert!(again.is_clean());
    }
}
