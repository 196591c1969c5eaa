//! Project: the ingestion pipeline for one source tree.
//!
//! Parsing and extraction run on blocking worker threads (a rayon pool for
//! batches). Finished extractions travel over a channel to a single applier
//! task that owns the symbol index and graph builder. Each applied command
//! publishes an immutable [`CodeGraph`] snapshot, with its diff from the
//! previous one, on a watch channel that diagram sessions follow.

mod applier;
pub mod scan;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::{CodescopeConfig, STATE_DIR};
use crate::error::{CodescopeError, Result};
use crate::extract::extract_file;
use crate::graph::types::{unit_key, FileExtraction, SourceUnit};
use crate::graph::{CodeGraph, GraphBuilder, GraphDiff, Snapshot};
use crate::index::SymbolIndex;
use crate::layout::LayoutState;
use crate::parser::AdapterRegistry;
use crate::session::DiagramSession;
use crate::storage::{self, Manifest, ManifestDiff, ProjectSnapshot, StorageError};

use applier::{Applier, Command};

const COMMAND_BUFFER: usize = 64;

/// How [`Project::load_or_build`] obtained its graph.
#[derive(Debug)]
pub enum LoadOutcome {
    /// The snapshot matched the tree on disk.
    Restored { layout: Option<LayoutState> },
    /// Built from source; `changes` is measured against the discarded
    /// snapshot, or lists every unit as added when there was none.
    Built { changes: ManifestDiff },
}

/// Result of re-reading the tree from disk.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub changes: ManifestDiff,
    pub diff: GraphDiff,
}

#[derive(Clone)]
pub struct Project {
    root: PathBuf,
    config: CodescopeConfig,
    registry: Arc<AdapterRegistry>,
    pool: Option<Arc<rayon::ThreadPool>>,
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl Project {
    /// An empty project. Must be called inside a tokio runtime.
    pub fn new(root: impl Into<PathBuf>, config: CodescopeConfig) -> Self {
        let index = SymbolIndex::new(config.index.ambiguity_policy);
        Self::start(root.into(), config, index, GraphBuilder::new())
    }

    /// Resume from a validated snapshot.
    pub fn from_snapshot(root: impl Into<PathBuf>, config: CodescopeConfig, snapshot: ProjectSnapshot) -> Self {
        let mut index = snapshot.index;
        if index.policy() != config.index.ambiguity_policy {
            // configured policy wins over the persisted one
            let rebound = index.set_policy(config.index.ambiguity_policy);
            if !rebound.is_empty() {
                warn!(rebound = rebound.len(), "ambiguity policy changed since snapshot; rebuild recommended");
            }
        }
        Self::start(root.into(), config, index, GraphBuilder::from_graph(snapshot.graph))
    }

    fn start(root: PathBuf, config: CodescopeConfig, index: SymbolIndex, builder: GraphBuilder) -> Self {
        let (tx, rx) = watch::channel(Snapshot::initial(builder.snapshot()));
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        Applier::new(index, builder, tx).spawn(command_rx);

        let pool = match config.ingest.worker_threads {
            0 => None,
            n => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
                Ok(pool) => Some(Arc::new(pool)),
                Err(e) => {
                    warn!(threads = n, error = %e, "worker pool unavailable, using the global pool");
                    None
                }
            },
        };

        Self {
            root,
            config,
            registry: Arc::new(AdapterRegistry::with_defaults()),
            pool,
            commands,
            snapshots: rx,
        }
    }

    /// Restore the cached snapshot when it still matches the tree, otherwise
    /// build from scratch.
    pub async fn load_or_build(root: impl Into<PathBuf>, config: CodescopeConfig) -> Result<(Self, LoadOutcome)> {
        let root = root.into();
        let units = read_tree(&root, config.ingest.max_file_size).await?;
        let manifest = Manifest::from_units(&units);
        let cache = config.resolve_cache_path(&root.join(STATE_DIR));

        let stored = match storage::load(&cache) {
            Ok(snapshot) => match snapshot.validate(&root, &manifest) {
                Ok(()) => {
                    info!(root = %root.display(), revision = snapshot.graph.revision(), "restored snapshot");
                    let layout = snapshot.layout.clone();
                    let project = Self::from_snapshot(root, config, snapshot);
                    return Ok((project, LoadOutcome::Restored { layout }));
                }
                Err(e) => {
                    info!(error = %e, "discarding snapshot");
                    snapshot.manifest
                }
            },
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Manifest::default(),
            Err(e) => {
                warn!(path = %cache.display(), error = %e, "unreadable snapshot");
                Manifest::default()
            }
        };

        let changes = stored.diff(&manifest);
        let project = Self::new(root, config);
        project.ingest_batch(units).await?;
        Ok((project, LoadOutcome::Built { changes }))
    }

    /// What changed on disk since the cached snapshot was written, without
    /// building anything. Everything counts as added when there is none.
    pub async fn pending_changes(root: &Path, config: &CodescopeConfig) -> Result<ManifestDiff> {
        let units = read_tree(root, config.ingest.max_file_size).await?;
        let cache = config.resolve_cache_path(&root.join(STATE_DIR));
        let stored = match storage::load(&cache) {
            Ok(snapshot) => snapshot.manifest,
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Manifest::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(stored.diff(&Manifest::from_units(&units)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &CodescopeConfig {
        &self.config
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn cache_path(&self) -> PathBuf {
        self.config.resolve_cache_path(&self.root.join(STATE_DIR))
    }

    /// Follow published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<CodeGraph> {
        self.snapshots.borrow().graph.clone()
    }

    pub fn session(&self) -> DiagramSession {
        DiagramSession::new(self.subscribe(), self.config.layout.clone())
    }

    /// A session picking up a persisted layout when there is one.
    pub fn resume_session(&self, layout: Option<LayoutState>) -> DiagramSession {
        match layout {
            Some(state) => DiagramSession::with_layout_state(self.subscribe(), self.config.layout.clone(), state),
            None => self.session(),
        }
    }

    // ─── Ingestion ──────────────────────────────────────────────

    /// Parse one unit and merge it. Re-ingesting identical content returns
    /// an empty diff without bumping the revision.
    pub async fn ingest(&self, unit: SourceUnit) -> Result<GraphDiff> {
        let current = self.snapshot();
        if current
            .unit(&unit.key())
            .is_some_and(|u| u.record.content_hash == unit.content_hash)
        {
            return Ok(GraphDiff::unchanged(current.revision()));
        }
        let size = unit.text.len() as u64;
        if size > self.config.ingest.max_file_size {
            return Err(CodescopeError::FileTooLarge {
                path: unit.path.clone(),
                size,
                limit: self.config.ingest.max_file_size,
            });
        }

        let registry = self.registry.clone();
        let extraction = tokio::task::spawn_blocking(move || extract_file(&registry, &unit))
            .await
            .map_err(|e| CodescopeError::Worker(e.to_string()))??;
        self.send_apply(vec![extraction]).await
    }

    /// Parse units in parallel and merge them in path order. Units that fail
    /// are logged and skipped. Returns the merged diff.
    pub async fn ingest_batch(&self, units: Vec<SourceUnit>) -> Result<GraphDiff> {
        let registry = self.registry.clone();
        let pool = self.pool.clone();
        let limit = self.config.ingest.max_file_size;
        let count = units.len();

        let extractions = tokio::task::spawn_blocking(move || {
            let work = || extract_all(&registry, units, limit);
            match pool {
                Some(pool) => pool.install(work),
                None => work(),
            }
        })
        .await
        .map_err(|e| CodescopeError::Worker(e.to_string()))?;

        debug!(units = count, extracted = extractions.len(), "batch extracted");
        self.send_apply(extractions).await
    }

    /// Drop a unit and everything it declared.
    pub async fn remove(&self, path: impl AsRef<Path>) -> Result<GraphDiff> {
        self.remove_all(vec![unit_key(path.as_ref())]).await
    }

    pub async fn remove_all(&self, paths: Vec<String>) -> Result<GraphDiff> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Remove { paths, reply })
            .await
            .map_err(|_| CodescopeError::ProjectClosed)?;
        rx.await.map_err(|_| CodescopeError::ProjectClosed)
    }

    /// Re-read the root and bring the graph in line with it.
    pub async fn sync(&self) -> Result<SyncReport> {
        let before = self.snapshot();
        let units = read_tree(&self.root, self.config.ingest.max_file_size).await?;
        let changes = Manifest::from_graph(&before).diff(&Manifest::from_units(&units));
        if changes.is_empty() {
            return Ok(SyncReport {
                changes,
                diff: GraphDiff::unchanged(before.revision()),
            });
        }

        let changed: Vec<SourceUnit> = units
            .into_iter()
            .filter(|u| {
                let key = u.key();
                changes.added.contains(&key) || changes.modified.contains(&key)
            })
            .collect();
        let ingested = self.ingest_batch(changed).await?;
        let removed = self.remove_all(changes.deleted.clone()).await?;

        let after = self.snapshot();
        // Another writer may have slipped in between the two commands
        let chained = ingested.from_revision == before.revision()
            && removed.from_revision == ingested.revision
            && removed.revision == after.revision();
        let diff = if chained {
            GraphDiff::compose(&before, &after, &[ingested, removed])
        } else {
            GraphDiff::between(&before, &after)
        };
        info!(%changes, revision = after.revision(), "synced with disk");
        Ok(SyncReport { changes, diff })
    }

    // ─── Persistence ────────────────────────────────────────────

    /// Write the current graph, index and optional layout to the cache path.
    pub async fn save(&self, layout: Option<LayoutState>) -> Result<PathBuf> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Export { reply })
            .await
            .map_err(|_| CodescopeError::ProjectClosed)?;
        let (graph, index) = rx.await.map_err(|_| CodescopeError::ProjectClosed)?;

        let path = self.cache_path();
        let snapshot = ProjectSnapshot::new(&self.root, (*graph).clone(), index, layout);
        let target = path.clone();
        tokio::task::spawn_blocking(move || storage::save(&target, &snapshot))
            .await
            .map_err(|e| CodescopeError::Worker(e.to_string()))??;
        Ok(path)
    }

    async fn send_apply(&self, extractions: Vec<FileExtraction>) -> Result<GraphDiff> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Apply { extractions, reply })
            .await
            .map_err(|_| CodescopeError::ProjectClosed)?;
        rx.await.map_err(|_| CodescopeError::ProjectClosed)
    }
}

fn extract_all(registry: &AdapterRegistry, units: Vec<SourceUnit>, limit: u64) -> Vec<FileExtraction> {
    let mut extractions: Vec<FileExtraction> = units
        .par_iter()
        .filter_map(|unit| {
            if unit.text.len() as u64 > limit {
                warn!(file = %unit.key(), limit, "skipping oversized unit");
                return None;
            }
            match extract_file(registry, unit) {
                Ok(extraction) => Some(extraction),
                Err(e) => {
                    warn!(file = %unit.key(), error = %e, "extraction failed");
                    None
                }
            }
        })
        .collect();
    extractions.sort_by(|a, b| a.path.cmp(&b.path));
    extractions
}

async fn read_tree(root: &Path, max_file_size: u64) -> Result<Vec<SourceUnit>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let files = scan::scan(&root);
        scan::read_units(&files, max_file_size)
    })
    .await
    .map_err(|e| CodescopeError::Worker(e.to_string()))
}
