//! Graph execution engine
//!
//! A small interpreter over the task graph: sequences run children in order
//! and always advance past failures, parallel groups spawn children as tokio
//! tasks and join them all before resolving. Per-file failures surface as
//! diagnostics and counts; they never propagate as errors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use console::style;
use futures::future::BoxFuture;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::watch;

use crate::config::Config;
use crate::graph::{Node, NodeResult, Task};
use crate::registry::Registry;
use crate::reload::ReloadHandle;
use crate::task::{self, BatchResult};

/// Process-scoped state threaded through the whole pipeline.
///
/// Built once in `main` and torn down on shutdown; holds the reload session
/// handle so watch rebuilds can signal the browser, and the shutdown receiver
/// the run-forever tasks select on.
pub struct PipelineContext {
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
    pub reload: Arc<ReloadHandle>,
    pub shutdown: watch::Receiver<bool>,
    pub progress: MultiProgress,
}

impl PipelineContext {
    /// Create the context and the shutdown trigger paired with it
    pub fn new(config: Config, registry: Registry) -> (Arc<Self>, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = Arc::new(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            reload: Arc::new(ReloadHandle::new()),
            shutdown: shutdown_rx,
            progress: MultiProgress::new(),
        });
        (ctx, shutdown_tx)
    }
}

/// Execute a graph node, returning the aggregated result of everything
/// beneath it.
pub fn execute(node: Node, ctx: Arc<PipelineContext>) -> BoxFuture<'static, NodeResult> {
    Box::pin(async move {
        match node {
            Node::Task(task) => run_task(task, ctx).await,

            Node::Sequence(children) => {
                let mut result = NodeResult::default();
                for child in children {
                    // A failing child is aggregated and skipped over; the
                    // sequence always advances.
                    result.merge(execute(child, Arc::clone(&ctx)).await);
                }
                result
            }

            Node::Parallel(children) => {
                let mut handles = Vec::with_capacity(children.len());
                for child in children {
                    handles.push(tokio::spawn(execute(child, Arc::clone(&ctx))));
                }

                // All children are joined before the parallel node resolves.
                let mut result = NodeResult::default();
                for handle in handles {
                    match handle.await {
                        Ok(child_result) => result.merge(child_result),
                        Err(e) => tracing::error!("graph child panicked: {e}"),
                    }
                }
                result
            }
        }
    })
}

async fn run_task(task: Task, ctx: Arc<PipelineContext>) -> NodeResult {
    match task {
        Task::Clean => {
            let root = ctx.config.output_root();
            let batch = run_blocking(move || task::run_clean(&root)).await;
            if batch.is_clean() {
                println!(
                    "{} {} {}",
                    style("✓").green(),
                    style("clean").bold(),
                    style("output root removed").dim()
                );
            }
            batch.into()
        }

        Task::Build(name) => run_build_task(&name, &ctx).await,

        Task::Watch => crate::watch::run_watch(ctx).await,

        Task::Serve => crate::reload::run_server(ctx).await,
    }
}

/// Run one category's build batch with a spinner and a result line.
///
/// Shared between the initial build stage and watch-triggered rebuilds.
pub(crate) async fn run_build_task(name: &str, ctx: &Arc<PipelineContext>) -> NodeResult {
    if ctx.registry.get(name).is_none() {
        // The graph and registry come from the same config, so this is a bug,
        // not an operator mistake.
        tracing::error!(category = name, "graph references an unknown category");
        return NodeResult::default();
    }

    let pb = ctx.progress.add(ProgressBar::new_spinner());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(format!("building {}", name));
    pb.enable_steady_tick(Duration::from_millis(100));

    let start = Instant::now();
    let registry = Arc::clone(&ctx.registry);
    let task_name = name.to_string();
    let batch = run_blocking(move || match registry.get(&task_name) {
        Some(task) => task::run_build(task),
        None => BatchResult::default(),
    })
    .await;

    pb.finish_and_clear();
    print_batch_result(name, &batch, start.elapsed());

    batch.into()
}

async fn run_blocking<F>(f: F) -> BatchResult
where
    F: FnOnce() -> BatchResult + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(batch) => batch,
        Err(e) => {
            tracing::error!("batch task panicked: {e}");
            BatchResult::default()
        }
    }
}

/// Print one batch's result line, and its per-file failures
fn print_batch_result(name: &str, batch: &BatchResult, duration: Duration) {
    let status = if batch.is_clean() {
        style("✓").green()
    } else {
        style("✗").red()
    };

    println!(
        "{} {} {} file{} {}",
        status,
        style(name).bold(),
        batch.succeeded,
        plural(batch.succeeded),
        style(format!("{:.2}s", duration.as_secs_f64())).dim()
    );

    for (file, err) in &batch.failed {
        eprintln!(
            "  {} {}: {}",
            style("✗").red(),
            style(file.display()).bold(),
            err
        );
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn two_category_ctx(dir: &TempDir) -> (Arc<PipelineContext>, watch::Sender<bool>) {
        let toml = format!(
            r#"
            [settings]
            output = "{out}"

            [categories.first]
            src = "{src_a}"
            files = "**/*.js"
            dest = "a"
            steps = ["minify-js"]

            [categories.second]
            src = "{src_b}"
            files = "**/*.js"
            dest = "b"
            steps = ["minify-js"]
            "#,
            out = dir.path().join("dist").display(),
            src_a = dir.path().join("src_a").display(),
            src_b = dir.path().join("src_b").display(),
        );
        let config: Config = toml::from_str(&toml).unwrap();
        config.validate().unwrap();
        let registry = Registry::from_config(&config).unwrap();
        PipelineContext::new(config, registry)
    }

    #[tokio::test]
    async fn test_sequence_continues_past_failures() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src_a")).unwrap();
        fs::create_dir_all(dir.path().join("src_b")).unwrap();
        fs::write(dir.path().join("src_a/bad.js"), "function (").unwrap();
        fs::write(dir.path().join("src_b/ok.js"), "console.log('x');").unwrap();

        let (ctx, _shutdown) = two_category_ctx(&dir);
        let node = Node::Sequence(vec![
            Node::Task(Task::Build("first".to_string())),
            Node::Task(Task::Build("second".to_string())),
        ]);

        let result = execute(node, ctx).await;

        // the first child failed, the second still ran
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.succeeded, 1);
        assert!(dir.path().join("dist/b/ok.js").exists());
    }

    #[tokio::test]
    async fn test_parallel_order_is_unobservable() {
        let run = |reversed: bool| async move {
            let dir = TempDir::new().unwrap();
            fs::create_dir_all(dir.path().join("src_a")).unwrap();
            fs::create_dir_all(dir.path().join("src_b")).unwrap();
            fs::write(dir.path().join("src_a/one.js"), "console.log(1);").unwrap();
            fs::write(dir.path().join("src_b/bad.js"), "function (").unwrap();

            let (ctx, _shutdown) = two_category_ctx(&dir);
            let mut children = vec![
                Node::Task(Task::Build("first".to_string())),
                Node::Task(Task::Build("second".to_string())),
            ];
            if reversed {
                children.reverse();
            }

            let result = execute(Node::Parallel(children), ctx).await;
            (result.succeeded, result.failed.len())
        };

        assert_eq!(run(false).await, run(true).await);
    }

    #[tokio::test]
    async fn test_clean_task_removes_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("dist");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("stale.txt"), "old").unwrap();

        let (ctx, _shutdown) = two_category_ctx(&dir);
        let result = execute(Node::Task(Task::Clean), ctx).await;

        assert!(result.is_clean());
        assert!(!out.exists());
    }
}
