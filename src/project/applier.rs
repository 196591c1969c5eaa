//! The single writer: owns the symbol index and graph builder.
//!
//! Workers send finished extractions here; the applier merges them in the
//! order received and publishes one snapshot per command, so observers see
//! revisions strictly in order. Each snapshot carries the diff folded from
//! the command's applies.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::graph::types::FileExtraction;
use crate::graph::{CodeGraph, GraphBuilder, GraphDiff, Snapshot};
use crate::index::SymbolIndex;

pub(super) enum Command {
    /// Merge extractions, already in path order.
    Apply {
        extractions: Vec<FileExtraction>,
        reply: oneshot::Sender<GraphDiff>,
    },
    Remove {
        paths: Vec<String>,
        reply: oneshot::Sender<GraphDiff>,
    },
    /// Copy of the current state for persistence.
    Export {
        reply: oneshot::Sender<(Arc<CodeGraph>, SymbolIndex)>,
    },
}

pub(super) struct Applier {
    index: SymbolIndex,
    builder: GraphBuilder,
    published: watch::Sender<Snapshot>,
}

impl Applier {
    pub fn new(index: SymbolIndex, builder: GraphBuilder, published: watch::Sender<Snapshot>) -> Self {
        Self {
            index,
            builder,
            published,
        }
    }

    pub fn spawn(self, commands: mpsc::Receiver<Command>) {
        tokio::spawn(self.run(commands));
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Apply { extractions, reply } => {
                    let diff = self.apply(extractions);
                    let _ = reply.send(diff);
                }
                Command::Remove { paths, reply } => {
                    let diff = self.remove(paths);
                    let _ = reply.send(diff);
                }
                Command::Export { reply } => {
                    let graph = self.published.borrow().graph.clone();
                    let _ = reply.send((graph, self.index.clone()));
                }
            }
        }
        info!(revision = self.builder.revision(), "applier stopped");
    }

    fn apply(&mut self, extractions: Vec<FileExtraction>) -> GraphDiff {
        let before = self.published.borrow().graph.clone();
        let mut steps = Vec::new();
        for extraction in extractions {
            let unchanged = self
                .builder
                .graph()
                .unit(&extraction.path)
                .is_some_and(|u| u.record.content_hash == extraction.content_hash);
            if unchanged {
                debug!(file = %extraction.path, "content unchanged, skipping");
                continue;
            }
            let delta = self.index.update_unit(extraction);
            steps.push(self.builder.apply(delta));
        }
        self.publish(&before, steps)
    }

    fn remove(&mut self, paths: Vec<String>) -> GraphDiff {
        let before = self.published.borrow().graph.clone();
        let mut steps = Vec::new();
        for path in paths {
            if !self.index.contains_unit(&path) {
                continue;
            }
            let delta = self.index.remove_unit(&path);
            steps.push(self.builder.apply(delta));
        }
        self.publish(&before, steps)
    }

    fn publish(&mut self, before: &CodeGraph, steps: Vec<GraphDiff>) -> GraphDiff {
        if steps.is_empty() {
            return GraphDiff::unchanged(before.revision());
        }
        let diff = GraphDiff::compose(before, self.builder.graph(), &steps);
        let graph = self.builder.snapshot();
        debug!(
            revision = graph.revision(),
            units = steps.len(),
            symbols_added = diff.added_symbols.len(),
            symbols_removed = diff.removed_symbols.len(),
            "published snapshot"
        );
        self.published.send_replace(Snapshot {
            graph,
            diff: Arc::new(diff.clone()),
        });
        diff
    }
}
