//! assetpipe - a watch-and-serve asset build pipeline
//!
//! Builds every asset category once, then watches the source tree and serves
//! the output with live reload until interrupted.

use std::process::ExitCode;

use clap::Parser;
use console::style;

mod cli;
mod config;
mod error;
mod executor;
mod graph;
mod registry;
mod reload;
mod task;
mod transform;
mod watch;

use cli::Cli;
use config::Config;
use error::Result;
use executor::{execute, PipelineContext};
use graph::default_graph;
use registry::Registry;

#[tokio::main]
async fn main() -> ExitCode {
    // Set up panic handler for nice error messages
    miette::set_panic_hook();

    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else if cli.quiet {
        tracing::Level::ERROR
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .without_time()
        .init();

    // Handle --no-color
    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}: {:?}",
                style("error").red().bold(),
                miette::Report::new(e)
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Change working directory if specified
    if let Some(cwd) = &cli.cwd {
        std::env::set_current_dir(cwd)?;
    }

    let (mut config, config_path) = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.serve.port = port;
    }
    if cli.clean {
        config.settings.clean = true;
    }

    match &config_path {
        Some(path) => println!(
            "{} {}",
            style("Using").dim(),
            style(path.display()).bold()
        ),
        None => println!("{}", style("Using built-in default layout").dim()),
    }

    let registry = Registry::from_config(&config)?;
    let graph = default_graph(&config);
    let (ctx, shutdown_tx) = PipelineContext::new(config, registry);

    // Ctrl-C flips the shutdown signal; run-forever tasks select on it and
    // in-flight batches drain before the graph resolves.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let result = execute(graph, ctx).await;

    println!();
    if result.is_clean() {
        println!(
            "{} {} file{} built, shut down cleanly",
            style("✓").green().bold(),
            result.succeeded,
            if result.succeeded == 1 { "" } else { "s" }
        );
    } else {
        println!(
            "{} {} succeeded, {} failed",
            style("✗").red().bold(),
            result.succeeded,
            result.failed.len()
        );
    }

    Ok(())
}
