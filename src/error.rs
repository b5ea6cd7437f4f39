//! Error types for assetpipe
//!
//! Uses `miette` for pretty error reporting with diagnostic codes and help text.
//!
//! Two tiers: [`Error`] is fatal and aborts before the pipeline runs
//! (configuration, watcher setup, server bind). [`StepError`] is scoped to a
//! single source file inside a batch; it is recorded in the batch result and
//! logged, but never propagates past the task runner.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised before or during pipeline startup
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Failed to read configuration file")]
    #[diagnostic(code(assetpipe::config::read))]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration")]
    #[diagnostic(code(assetpipe::config::parse))]
    ConfigParse {
        #[source]
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Invalid category '{category}': {reason}")]
    #[diagnostic(
        code(assetpipe::config::invalid_category),
        help("Check the [categories.{category}] table in assetpipe.toml")
    )]
    InvalidCategory {
        category: String,
        reason: String,
    },

    #[error("Invalid glob pattern '{pattern}' in category '{category}': {reason}")]
    #[diagnostic(code(assetpipe::config::glob))]
    InvalidGlob {
        category: String,
        pattern: String,
        reason: String,
    },

    #[error("Categories '{a}' and '{b}' can write the same output path")]
    #[diagnostic(
        code(assetpipe::config::destination_collision),
        help("Give each category its own destination directory, or globs with disjoint extensions")
    )]
    DestinationCollision {
        a: String,
        b: String,
    },

    #[error("Invalid browser target list in category '{category}': {reason}")]
    #[diagnostic(
        code(assetpipe::config::targets),
        help("Targets use browserslist queries, e.g. \"defaults\" or \"last 2 versions\"")
    )]
    InvalidTargets {
        category: String,
        reason: String,
    },

    #[error("Watch error")]
    #[diagnostic(code(assetpipe::watch))]
    Watch {
        #[source]
        source: notify::Error,
    },

    #[error("Failed to start the dev server: {reason}")]
    #[diagnostic(
        code(assetpipe::serve::bind),
        help("Another process may be using the port; change [serve].port in assetpipe.toml")
    )]
    ServeBind {
        reason: String,
    },

    #[error("I/O error")]
    #[diagnostic(code(assetpipe::io))]
    Io(#[from] std::io::Error),
}

/// Per-file errors inside a transformation batch.
///
/// These never abort a batch: the file is recorded as failed, a diagnostic is
/// logged, and the remaining files are still processed.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("stylesheet transform failed: {0}")]
    Stylesheet(String),

    #[error("script minification failed: {0}")]
    Script(String),

    #[error("image transform failed: {0}")]
    Image(String),

    #[error("file is not valid UTF-8")]
    NotUtf8,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for assetpipe operations
pub type Result<T> = std::result::Result<T, Error>;
