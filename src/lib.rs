//! assetpipe - a watch-and-serve asset build pipeline
//!
//! This crate provides both a CLI tool and a library for asset pipelines.
//!
//! # Features
//!
//! - **Simple TOML configuration** - One category per asset class
//! - **Ordered step pipelines** - Prefix, minify, optimize, copy
//! - **Task graph** - Sequence/parallel composition, interpreted at startup
//! - **File watching** - Per-category rebuilds with coalesced triggers
//! - **Live reload** - Dev server with WebSocket reload notifications
//!
//! # Example
//!
//! ```toml
//! # assetpipe.toml
//!
//! [settings]
//! output = "dist"
//!
//! [categories.stylesheet]
//! src = "src/css"
//! files = "**/*.css"
//! dest = "css"
//! steps = ["prefix", "minify-css"]
//! ```
//!
//! # Library Usage
//!
//! ```rust,ignore
//! use assetpipe::{default_graph, execute, Config, PipelineContext, Registry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (config, _) = Config::load(None)?;
//!     let registry = Registry::from_config(&config)?;
//!     let graph = default_graph(&config);
//!
//!     let (ctx, _shutdown) = PipelineContext::new(config, registry);
//!     execute(graph, ctx).await;
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod registry;
pub mod reload;
pub mod task;
pub mod transform;
pub mod watch;

// Re-export main types
pub use config::{CategoryConfig, Config, StepKind};
pub use error::{Error, Result, StepError};
pub use executor::{execute, PipelineContext};
pub use graph::{default_graph, Node, NodeResult, Task};
pub use registry::{CategoryTask, Registry};
pub use reload::ReloadHandle;
pub use task::BatchResult;
pub use transform::TransformStep;
