//! Configuration parsing for assetpipe.toml
//!
//! Handles loading and validating the pipeline configuration. A missing config
//! file falls back to the built-in default layout (`src/...` -> `dist/...`);
//! a file that exists but fails to parse or validate is fatal.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Default config file names to search for
pub const CONFIG_FILES: &[&str] = &["assetpipe.toml", "Assetpipe.toml"];

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub settings: Settings,

    /// Dev server settings
    #[serde(default)]
    pub serve: ServeConfig,

    /// Asset categories, keyed by name
    #[serde(default = "default_categories")]
    pub categories: BTreeMap<String, CategoryConfig>,
}

/// Global settings for pipeline behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Output root every category destination lives under
    #[serde(default = "default_output")]
    pub output: String,

    /// Delete the output root before the initial build
    #[serde(default)]
    pub clean: bool,

    /// Watch debounce delay in milliseconds
    #[serde(default = "default_debounce")]
    pub watch_debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output: default_output(),
            clean: false,
            watch_debounce_ms: default_debounce(),
        }
    }
}

/// Dev server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServeConfig {
    /// Interface to bind
    #[serde(default = "default_interface")]
    pub interface: String,

    /// HTTP port (retried upward when occupied)
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            port: default_port(),
        }
    }
}

fn default_output() -> String {
    "dist".to_string()
}

fn default_debounce() -> u64 {
    300
}

fn default_interface() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_steps() -> Vec<StepSpec> {
    vec![StepSpec::Name(StepKind::Copy)]
}

/// Configuration for a single asset category
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryConfig {
    /// Source root directory
    pub src: String,

    /// Glob pattern, relative to `src`
    pub files: String,

    /// Destination directory, relative to the output root ("" for the root)
    #[serde(default)]
    pub dest: String,

    /// Ordered transformation steps (order is significant)
    #[serde(default = "default_steps")]
    pub steps: Vec<StepSpec>,

    /// Send a reload signal after this category rebuilds
    #[serde(default = "default_true")]
    pub reload: bool,
}

/// A step entry: either a bare name or a table with parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StepSpec {
    Name(StepKind),
    Full(StepConfig),
}

impl StepSpec {
    /// Normalize to a full step configuration
    pub fn config(&self) -> StepConfig {
        match self {
            StepSpec::Name(kind) => StepConfig {
                kind: *kind,
                quality: None,
                targets: Vec::new(),
            },
            StepSpec::Full(cfg) => cfg.clone(),
        }
    }
}

/// A step with its parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub kind: StepKind,

    /// Encoder quality for `optimize-image`, 1-100
    #[serde(default)]
    pub quality: Option<u8>,

    /// Browserslist queries for `prefix`
    #[serde(default)]
    pub targets: Vec<String>,
}

/// Known transformation step kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    /// Lower stylesheets for a browser target list (vendor prefixes)
    Prefix,
    /// Minify stylesheets
    MinifyCss,
    /// Minify scripts
    MinifyJs,
    /// Re-encode images at a configured quality
    OptimizeImage,
    /// Passthrough copy
    Copy,
}

impl Config {
    /// Load configuration from the specified path or search for it.
    ///
    /// Returns the config and the path it came from, if any. With no explicit
    /// path and no file found, the built-in defaults are used.
    pub fn load(path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let config_path = match path {
            Some(p) => {
                if p.exists() {
                    Some(p.to_path_buf())
                } else {
                    return Err(Error::ConfigRead {
                        path: p.to_path_buf(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "no such file",
                        ),
                    });
                }
            }
            None => Self::find_config()?,
        };

        let config = match &config_path {
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
                        path: path.clone(),
                        source,
                    })?;
                let config: Config =
                    toml::from_str(&content).map_err(|source| Error::ConfigParse {
                        source,
                        path: path.clone(),
                    })?;
                config
            }
            None => Config::default(),
        };

        config.validate()?;

        Ok((config, config_path))
    }

    /// Search for a config file starting from the current directory
    fn find_config() -> Result<Option<PathBuf>> {
        let mut current = std::env::current_dir()?;

        loop {
            for name in CONFIG_FILES {
                let candidate = current.join(name);
                if candidate.exists() {
                    return Ok(Some(candidate));
                }
            }

            if !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Validate the configuration.
    ///
    /// Destination disjointness: two categories whose destination directories
    /// are equal or nested must have glob patterns with provably disjoint
    /// extension sets, so no concrete output path can ever collide.
    pub fn validate(&self) -> Result<()> {
        for (name, category) in &self.categories {
            if category.src.trim().is_empty() {
                return Err(Error::InvalidCategory {
                    category: name.clone(),
                    reason: "'src' must not be empty".to_string(),
                });
            }
            if category.files.trim().is_empty() {
                return Err(Error::InvalidCategory {
                    category: name.clone(),
                    reason: "'files' must not be empty".to_string(),
                });
            }
            if category.steps.is_empty() {
                return Err(Error::InvalidCategory {
                    category: name.clone(),
                    reason: "'steps' must not be empty".to_string(),
                });
            }

            for step in &category.steps {
                let step = step.config();
                if let Some(q) = step.quality {
                    if !(1..=100).contains(&q) {
                        return Err(Error::InvalidCategory {
                            category: name.clone(),
                            reason: format!("step quality {} is out of range 1-100", q),
                        });
                    }
                }
            }
        }

        let categories: Vec<(&String, &CategoryConfig)> = self.categories.iter().collect();
        for (i, (name_a, cat_a)) in categories.iter().enumerate() {
            for (name_b, cat_b) in categories.iter().skip(i + 1) {
                let dest_a = normalize_dest(&cat_a.dest);
                let dest_b = normalize_dest(&cat_b.dest);

                let overlapping = dest_a == dest_b
                    || dest_a.starts_with(&dest_b)
                    || dest_b.starts_with(&dest_a);
                if !overlapping {
                    continue;
                }

                let disjoint = match (
                    glob_extensions(&cat_a.files),
                    glob_extensions(&cat_b.files),
                ) {
                    (Some(a), Some(b)) => a.is_disjoint(&b),
                    _ => false,
                };
                if !disjoint {
                    return Err(Error::DestinationCollision {
                        a: (*name_a).clone(),
                        b: (*name_b).clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Output root, with `~` and env vars expanded
    pub fn output_root(&self) -> PathBuf {
        expand_path(&self.settings.output)
    }

    /// All category names, in stable order
    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(|s| s.as_str())
    }
}

impl CategoryConfig {
    /// Source root, with `~` and env vars expanded
    pub fn src_root(&self) -> PathBuf {
        expand_path(&self.src)
    }

    /// Destination directory resolved under the output root
    pub fn dest_dir(&self, output_root: &Path) -> PathBuf {
        output_root.join(normalize_dest(&self.dest))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            serve: ServeConfig::default(),
            categories: default_categories(),
        }
    }
}

/// The built-in category table, mirroring a conventional `src/` -> `dist/` site
fn default_categories() -> BTreeMap<String, CategoryConfig> {
    fn cat(src: &str, files: &str, dest: &str, steps: Vec<StepSpec>) -> CategoryConfig {
        CategoryConfig {
            src: src.to_string(),
            files: files.to_string(),
            dest: dest.to_string(),
            steps,
            reload: true,
        }
    }

    let mut categories = BTreeMap::new();
    categories.insert(
        "markup".to_string(),
        cat("src", "**/*.html", "", vec![StepSpec::Name(StepKind::Copy)]),
    );
    categories.insert(
        "stylesheet".to_string(),
        cat(
            "src/css",
            "**/*.css",
            "css",
            vec![
                StepSpec::Full(StepConfig {
                    kind: StepKind::Prefix,
                    quality: None,
                    targets: vec!["defaults".to_string()],
                }),
                StepSpec::Name(StepKind::MinifyCss),
            ],
        ),
    );
    categories.insert(
        "script".to_string(),
        cat(
            "src/js",
            "**/*.js",
            "js",
            vec![StepSpec::Name(StepKind::MinifyJs)],
        ),
    );
    categories.insert(
        "image".to_string(),
        cat(
            "src/img",
            "**/*.{png,jpg,jpeg,gif,webp}",
            "img",
            vec![StepSpec::Full(StepConfig {
                kind: StepKind::OptimizeImage,
                quality: Some(80),
                targets: Vec::new(),
            })],
        ),
    );
    categories.insert(
        "template".to_string(),
        cat(
            "src/templates",
            "**/*.tmpl",
            "templates",
            vec![StepSpec::Name(StepKind::Copy)],
        ),
    );
    categories.insert(
        "font".to_string(),
        cat(
            "src/fonts",
            "**/*.{woff,woff2,ttf,otf,eot}",
            "fonts",
            vec![StepSpec::Name(StepKind::Copy)],
        ),
    );
    categories.insert(
        "asset".to_string(),
        cat(
            "src/static",
            "**/*.{ico,txt,json,webmanifest,xml,pdf}",
            "static",
            vec![StepSpec::Name(StepKind::Copy)],
        ),
    );
    categories
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// Normalize a destination to a relative path without `.` components
fn normalize_dest(dest: &str) -> PathBuf {
    Path::new(dest)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Extract the set of file extensions a glob pattern can match.
///
/// Returns `None` when the set cannot be determined (no extension, or a
/// wildcard in the extension position), which validation treats as "matches
/// anything".
fn glob_extensions(pattern: &str) -> Option<BTreeSet<String>> {
    let last = pattern.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;

    if let Some(inner) = ext.strip_prefix('{').and_then(|e| e.strip_suffix('}')) {
        let set: BTreeSet<String> = inner
            .split(',')
            .map(|e| e.trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        if set.iter().any(|e| e.contains(['*', '?', '['])) {
            return None;
        }
        return Some(set);
    }

    if ext.contains(['*', '?', '[', '{']) {
        return None;
    }

    let mut set = BTreeSet::new();
    set.insert(ext.to_ascii_lowercase());
    Some(set)
}
