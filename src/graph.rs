//! Task graph
//!
//! The pipeline is a static tree of nodes built once at startup: a task leaf,
//! a sequence (each child must finish before the next starts), or a parallel
//! group (no ordering between children). The tree is plain data so the default
//! pipeline shape can be inspected and tested without running anything; the
//! interpreter lives in `executor`.

use std::path::PathBuf;

use crate::config::Config;
use crate::error::StepError;
use crate::task::BatchResult;

/// A runnable leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Delete the output root
    Clean,
    /// Build one category's batch
    Build(String),
    /// Run the watch dispatcher until shutdown
    Watch,
    /// Run the dev server / reload acceptor until shutdown
    Serve,
}

/// A node in the task graph
#[derive(Debug, Clone)]
pub enum Node {
    Task(Task),
    /// Children run in listed order; a failing child never stops the sequence
    Sequence(Vec<Node>),
    /// Children run with no ordering guarantee; all are joined before the
    /// parent resolves
    Parallel(Vec<Node>),
}

/// Aggregated outcome of executing a node and everything beneath it
#[derive(Debug, Default)]
pub struct NodeResult {
    pub succeeded: usize,
    pub failed: Vec<(PathBuf, StepError)>,
}

impl NodeResult {
    /// Fold another node's result into this one
    pub fn merge(&mut self, other: NodeResult) {
        self.succeeded += other.succeeded;
        self.failed.extend(other.failed);
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl From<BatchResult> for NodeResult {
    fn from(batch: BatchResult) -> Self {
        Self {
            succeeded: batch.succeeded,
            failed: batch.failed,
        }
    }
}

/// Build the default pipeline graph:
/// `sequence(clean?, parallel(all builds), parallel(watch, serve))`.
///
/// The final stage never completes on its own; its tasks end only when the
/// shutdown signal fires.
pub fn default_graph(config: &Config) -> Node {
    let builds: Vec<Node> = config
        .category_names()
        .map(|name| Node::Task(Task::Build(name.to_string())))
        .collect();

    let mut stages = Vec::new();
    if config.settings.clean {
        stages.push(Node::Task(Task::Clean));
    }
    stages.push(Node::Parallel(builds));
    stages.push(Node::Parallel(vec![
        Node::Task(Task::Watch),
        Node::Task(Task::Serve),
    ]));

    Node::Sequence(stages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_graph_shape() {
        let config = Config::default();
        let graph = default_graph(&config);

        let Node::Sequence(stages) = graph else {
            panic!("top level must be a sequence");
        };
        assert_eq!(stages.len(), 2);

        let Node::Parallel(builds) = &stages[0] else {
            panic!("first stage must be the parallel build group");
        };
        assert_eq!(builds.len(), config.categories.len());
        assert!(builds
            .iter()
            .any(|n| matches!(n, Node::Task(Task::Build(name)) if name == "stylesheet")));

        let Node::Parallel(forever) = &stages[1] else {
            panic!("last stage must be the parallel watch/serve group");
        };
        assert!(forever.iter().any(|n| matches!(n, Node::Task(Task::Watch))));
        assert!(forever.iter().any(|n| matches!(n, Node::Task(Task::Serve))));
    }

    #[test]
    fn test_clean_precedes_every_other_task() {
        let mut config = Config::default();
        config.settings.clean = true;
        let graph = default_graph(&config);

        let Node::Sequence(stages) = graph else {
            panic!("top level must be a sequence");
        };
        assert_eq!(stages.len(), 3);
        assert!(matches!(&stages[0], Node::Task(Task::Clean)));
    }

    #[test]
    fn test_node_result_merge() {
        let mut agg = NodeResult::default();
        agg.merge(NodeResult {
            succeeded: 2,
            failed: vec![(PathBuf::from("a.css"), StepError::NotUtf8)],
        });
        agg.merge(NodeResult {
            succeeded: 3,
            failed: Vec::new(),
        });

        assert_eq!(agg.succeeded, 5);
        assert_eq!(agg.failed.len(), 1);
        assert!(!agg.is_clean());
    }
}
