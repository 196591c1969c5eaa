//! Project snapshots on disk.
//!
//! A snapshot holds the graph, the symbol index and optionally one layout,
//! stamped with the project root and the content-hash manifest it was built
//! from. Any mismatch on load invalidates the whole snapshot; there is no
//! partial reuse.

pub mod manifest;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::graph::CodeGraph;
use crate::index::SymbolIndex;
use crate::layout::LayoutState;

pub use manifest::{Manifest, ManifestDiff};

/// Bumped whenever the snapshot layout changes.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("snapshot IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("snapshot format {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("snapshot belongs to {found}, not {expected}")]
    RootMismatch { expected: String, found: String },

    #[error("snapshot is stale: {0}")]
    Stale(ManifestDiff),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub version: u32,
    pub root: String,
    pub manifest: Manifest,
    pub graph: CodeGraph,
    pub index: SymbolIndex,
    pub layout: Option<LayoutState>,
}

impl ProjectSnapshot {
    pub fn new(root: &Path, graph: CodeGraph, index: SymbolIndex, layout: Option<LayoutState>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            root: root_key(root),
            manifest: Manifest::from_graph(&graph),
            graph,
            index,
            layout,
        }
    }

    /// Accept the snapshot only for the same root and identical content.
    pub fn validate(&self, root: &Path, current: &Manifest) -> Result<(), StorageError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(StorageError::Version {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        let expected = root_key(root);
        if self.root != expected {
            return Err(StorageError::RootMismatch {
                expected,
                found: self.root.clone(),
            });
        }
        let changes = self.manifest.diff(current);
        if !changes.is_empty() {
            return Err(StorageError::Stale(changes));
        }
        Ok(())
    }
}

fn root_key(root: &Path) -> String {
    fs::canonicalize(root)
        .unwrap_or_else(|_| root.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// Write atomically: encode to a sibling temp file, then rename over.
pub fn save(path: &Path, snapshot: &ProjectSnapshot) -> Result<(), StorageError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let bytes = bincode::serialize(snapshot)?;
    let tmp: PathBuf = path.with_extension("tmp");
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, path)?;
    info!(
        path = %path.display(),
        bytes = bytes.len(),
        revision = snapshot.graph.revision(),
        "snapshot saved"
    );
    Ok(())
}

pub fn load(path: &Path) -> Result<ProjectSnapshot, StorageError> {
    let bytes = fs::read(path)?;
    let snapshot: ProjectSnapshot = bincode::deserialize(&bytes)?;
    debug!(path = %path.display(), revision = snapshot.graph.revision(), "snapshot loaded");
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_file;
    use crate::graph::types::SourceUnit;
    use crate::graph::GraphBuilder;
    use crate::parser::AdapterRegistry;

    fn built(units: &[SourceUnit]) -> (CodeGraph, SymbolIndex) {
        let registry = AdapterRegistry::with_defaults();
        let mut index = SymbolIndex::default();
        let mut builder = GraphBuilder::new();
        for unit in units {
            builder.apply(index.update_unit(extract_file(&registry, unit).unwrap()));
        }
        (builder.graph().clone(), index)
    }

    fn units() -> Vec<SourceUnit> {
        vec![
            SourceUnit::new("a.py", "python", "def f():\n    pass\n"),
            SourceUnit::new("b.py", "python", "def g():\n    f()\n"),
        ]
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (graph, index) = built(&units());
        let snapshot = ProjectSnapshot::new(dir.path(), graph, index, None);
        let path = dir.path().join(".codescope/graph.bin");
        save(&path, &snapshot).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.graph.stats(), snapshot.graph.stats());
        assert_eq!(loaded.index.stats(), snapshot.index.stats());
        assert_eq!(loaded.manifest, snapshot.manifest);
        assert!(loaded.validate(dir.path(), &Manifest::from_units(&units())).is_ok());
    }

    #[test]
    fn test_stale_manifest_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let (graph, index) = built(&units());
        let snapshot = ProjectSnapshot::new(dir.path(), graph, index, None);

        let mut changed = units();
        changed[1] = SourceUnit::new("b.py", "python", "def g():\n    pass\n");
        match snapshot.validate(dir.path(), &Manifest::from_units(&changed)) {
            Err(StorageError::Stale(diff)) => assert_eq!(diff.modified, vec!["b.py"]),
            other => panic!("expected stale snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_other_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let (graph, index) = built(&units());
        let snapshot = ProjectSnapshot::new(dir.path(), graph, index, None);
        assert!(matches!(
            snapshot.validate(other.path(), &Manifest::from_units(&units())),
            Err(StorageError::RootMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load(&dir.path().join("nope.bin")), Err(StorageError::Io(_))));
    }
}
