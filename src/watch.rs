//! Watch dispatcher
//!
//! Uses `notify` with debouncing to watch the category source roots and
//! re-run the matching category's build, followed by a reload signal.
//!
//! Each binding is a small state machine: Idle -> Triggered -> Running ->
//! Idle. The trigger channel is bounded to one slot, which is the coalescing
//! policy: a change event arriving while a rebuild is Running parks exactly
//! one pending re-run, and further events merge into it. A rebuild re-reads
//! the whole source set, so the parked re-run covers every coalesced
//! notification and none is dropped.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use globset::GlobMatcher;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::executor::PipelineContext;
use crate::graph::NodeResult;

/// One active watch binding: a category's glob wired to its trigger channel
struct Binding {
    name: String,
    root: PathBuf,
    matcher: GlobMatcher,
    trigger: mpsc::Sender<()>,
}

impl Binding {
    fn matches(&self, path: &std::path::Path) -> bool {
        path.strip_prefix(&self.root)
            .map(|rel| self.matcher.is_match(rel))
            .unwrap_or(false)
    }
}

/// Run the watch loop until the shutdown signal fires.
///
/// In-flight rebuild batches drain before this returns: shutdown closes the
/// trigger channels and the per-binding dispatcher tasks are joined.
pub async fn run_watch(ctx: Arc<PipelineContext>) -> NodeResult {
    use console::style;

    // A cloned receiver marks the current value as seen, so an already-fired
    // shutdown has to be checked explicitly.
    let mut shutdown = ctx.shutdown.clone();
    if *shutdown.borrow() {
        return NodeResult::default();
    }

    let mut dispatchers = JoinSet::new();
    let mut bindings = Vec::with_capacity(ctx.registry.len());
    for task in ctx.registry.tasks() {
        let (trigger, pending) = mpsc::channel::<()>(1);
        dispatchers.spawn(binding_loop(task.name.clone(), pending, Arc::clone(&ctx)));

        // Event paths arrive absolute; match against the canonical root.
        let root = task
            .src_root
            .canonicalize()
            .unwrap_or_else(|_| task.src_root.clone());
        bindings.push(Binding {
            name: task.name.clone(),
            root,
            matcher: task.matcher().clone(),
            trigger,
        });
    }

    let (mut debouncer, mut events) =
        match spawn_debouncer(ctx.config.settings.watch_debounce_ms) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::error!("cannot start the file watcher: {e}");
                return NodeResult::default();
            }
        };

    let mut watched = 0;
    for task in ctx.registry.tasks() {
        if !task.src_root.exists() {
            warn!(category = %task.name, root = %task.src_root.display(), "source root missing, not watching");
            continue;
        }
        match debouncer
            .watcher()
            .watch(&task.src_root, RecursiveMode::Recursive)
        {
            Ok(()) => {
                debug!(category = %task.name, root = %task.src_root.display(), pattern = %task.pattern, "watching");
                watched += 1;
            }
            Err(e) => {
                warn!(category = %task.name, "cannot watch {}: {e}", task.src_root.display())
            }
        }
    }

    println!(
        "{} Watching {} categor{} for changes",
        style("👀").cyan(),
        watched,
        if watched == 1 { "y" } else { "ies" }
    );

    loop {
        tokio::select! {
            maybe_paths = events.recv() => {
                let Some(paths) = maybe_paths else { break };
                dispatch(&bindings, &paths);
            }
            _ = shutdown.changed() => break,
        }
    }

    // Stop scheduling new triggers, let in-flight rebuilds finish.
    drop(debouncer);
    drop(bindings);
    while dispatchers.join_next().await.is_some() {}

    NodeResult::default()
}

/// Route a debounced batch of changed paths to the bindings they match
fn dispatch(bindings: &[Binding], paths: &[PathBuf]) {
    for binding in bindings {
        if !paths.iter().any(|p| binding.matches(p)) {
            continue;
        }

        match binding.trigger.try_send(()) {
            // Idle -> Triggered
            Ok(()) => {}
            // Running with a re-run already parked: coalesce.
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!(category = %binding.name, "change coalesced into pending re-run");
            }
            Err(mpsc::error::TrySendError::Closed(())) => {}
        }
    }
}

/// Per-binding dispatcher: consume triggers one at a time (Running), rebuild,
/// signal a reload, return to Idle. Exits when the trigger channel closes.
async fn binding_loop(name: String, mut pending: mpsc::Receiver<()>, ctx: Arc<PipelineContext>) {
    use console::style;

    while pending.recv().await.is_some() {
        println!(
            "{} {} changed, rebuilding",
            style("📝").yellow(),
            style(&name).bold()
        );

        let _ = crate::executor::run_build_task(&name, &ctx).await;

        // A partial failure still reloads: the rest of the batch made it to
        // the destination.
        let wants_reload = ctx
            .registry
            .get(&name)
            .map(|task| task.reload)
            .unwrap_or(false);
        if wants_reload {
            ctx.reload.notify();
        }
    }
}

type Debouncer = notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>;

/// Create the debounced watcher and the channel its events land on
fn spawn_debouncer(debounce_ms: u64) -> Result<(Debouncer, mpsc::Receiver<Vec<PathBuf>>)> {
    let (tx, rx) = mpsc::channel(16);

    let debouncer = new_debouncer(
        Duration::from_millis(debounce_ms),
        move |events: std::result::Result<Vec<DebouncedEvent>, notify::Error>| {
            if let Ok(events) = events {
                let paths: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();
                let _ = tx.blocking_send(paths);
            }
        },
    )
    .map_err(|e| Error::Watch { source: e })?;

    Ok((debouncer, rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use globset::Glob;

    fn binding(root: &std::path::Path, pattern: &str) -> (Binding, mpsc::Receiver<()>) {
        let (trigger, pending) = mpsc::channel(1);
        (
            Binding {
                name: "subject".to_string(),
                root: root.to_path_buf(),
                matcher: Glob::new(pattern).unwrap().compile_matcher(),
                trigger,
            },
            pending,
        )
    }

    #[tokio::test]
    async fn test_dispatch_matches_by_root_and_glob() {
        let root = std::path::Path::new("/watched/css");
        let (b, mut pending) = binding(root, "**/*.css");

        dispatch(
            &[b],
            &[
                PathBuf::from("/watched/css/site.css"),
                PathBuf::from("/elsewhere/other.css"),
            ],
        );
        assert!(pending.try_recv().is_ok());

        // non-matching extension under the root stays quiet
        let (b, mut pending) = binding(root, "**/*.css");
        dispatch(&[b], &[PathBuf::from("/watched/css/readme.md")]);
        assert!(pending.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rapid_triggers_coalesce_into_one_pending_rerun() {
        let root = std::path::Path::new("/watched/css");
        let (b, mut pending) = binding(root, "**/*.css");
        let changed = [PathBuf::from("/watched/css/site.css")];

        // Idle -> Triggered; the dispatcher is "Running" while the parked
        // trigger sits unconsumed.
        dispatch(std::slice::from_ref(&b), &changed);
        // Two rapid-fire events while Running: both coalesce.
        dispatch(std::slice::from_ref(&b), &changed);
        dispatch(std::slice::from_ref(&b), &changed);

        // Exactly one re-run is pending, and none after it.
        assert!(pending.recv().await.is_some());
        assert!(pending.try_recv().is_err());

        // A change after pickup parks a fresh re-run; zero notifications lost.
        dispatch(std::slice::from_ref(&b), &changed);
        assert!(pending.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_closed_channel_ends_the_binding_loop() {
        let root = std::path::Path::new("/watched/css");
        let (b, mut pending) = binding(root, "**/*.css");

        drop(b);
        assert!(pending.recv().await.is_none());
    }
}
