//! Transform registry
//!
//! Turns the validated configuration into the runtime task table: each
//! category gets a compiled glob matcher, resolved source/destination roots,
//! and an instantiated step pipeline. Read-only after construction; anything
//! wrong with a category (bad glob, bad step parameters) fails here, before
//! any task runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::transform::{build_steps, TransformStep};

/// A runnable category: one source tree, one step pipeline, one destination
pub struct CategoryTask {
    pub name: String,
    pub src_root: PathBuf,
    pub pattern: String,
    pub dest: PathBuf,
    pub reload: bool,
    matcher: GlobMatcher,
    steps: Vec<Box<dyn TransformStep>>,
}

impl CategoryTask {
    /// Does a path, relative to this category's source root, match its glob?
    pub fn matches_relative(&self, rel: &Path) -> bool {
        self.matcher.is_match(rel)
    }

    pub fn matcher(&self) -> &GlobMatcher {
        &self.matcher
    }

    /// The ordered step pipeline
    pub fn steps(&self) -> &[Box<dyn TransformStep>] {
        &self.steps
    }
}

/// The immutable task table built once at startup
pub struct Registry {
    tasks: Vec<CategoryTask>,
    by_name: HashMap<String, usize>,
}

impl Registry {
    /// Build the registry from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let output_root = config.output_root();
        let mut tasks = Vec::with_capacity(config.categories.len());
        let mut by_name = HashMap::new();

        for (name, category) in &config.categories {
            let glob = Glob::new(&category.files).map_err(|e| Error::InvalidGlob {
                category: name.clone(),
                pattern: category.files.clone(),
                reason: e.to_string(),
            })?;

            let steps = build_steps(name, &category.steps)?;

            by_name.insert(name.clone(), tasks.len());
            tasks.push(CategoryTask {
                name: name.clone(),
                src_root: category.src_root(),
                pattern: category.files.clone(),
                dest: category.dest_dir(&output_root),
                reload: category.reload,
                matcher: glob.compile_matcher(),
                steps,
            });
        }

        Ok(Self { tasks, by_name })
    }

    /// Get a category task by name
    pub fn get(&self, name: &str) -> Option<&CategoryTask> {
        self.by_name.get(name).map(|&idx| &self.tasks[idx])
    }

    /// All category tasks, in configuration order
    pub fn tasks(&self) -> &[CategoryTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_from_default_config() {
        let config = Config::default();
        let registry = Registry::from_config(&config).unwrap();

        assert_eq!(registry.len(), config.categories.len());
        let stylesheet = registry.get("stylesheet").unwrap();
        assert_eq!(stylesheet.steps().len(), 2);
        assert!(stylesheet.reload);
        assert!(stylesheet.dest.ends_with("css"));
    }

    #[test]
    fn test_matches_relative() {
        let config = Config::default();
        let registry = Registry::from_config(&config).unwrap();
        let stylesheet = registry.get("stylesheet").unwrap();

        assert!(stylesheet.matches_relative(Path::new("site.css")));
        assert!(stylesheet.matches_relative(Path::new("pages/about.css")));
        assert!(!stylesheet.matches_relative(Path::new("site.scss")));
    }

    #[test]
    fn test_bad_glob_rejected() {
        let toml = r#"
            [categories.broken]
            src = "src"
            files = "**/*.{png"
            dest = "img"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(
            Registry::from_config(&config),
            Err(Error::InvalidGlob { .. })
        ));
    }

    #[test]
    fn test_unknown_category_lookup() {
        let registry = Registry::from_config(&Config::default()).unwrap();
        assert!(registry.get("no-such-category").is_none());
    }
}
