//! Content-hash manifests and change summaries.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::types::SourceUnit;
use crate::graph::CodeGraph;

/// Unit key -> SHA-256 of its content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

impl Manifest {
    pub fn from_units(units: &[SourceUnit]) -> Self {
        Self {
            entries: units
                .iter()
                .map(|u| (u.key(), u.content_hash.clone()))
                .collect(),
        }
    }

    /// What the graph was built from.
    pub fn from_graph(graph: &CodeGraph) -> Self {
        Self {
            entries: graph
                .units()
                .map(|u| (u.record.path.clone(), u.record.content_hash.clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hash(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    /// Changes that turn `self` into `current`.
    pub fn diff(&self, current: &Manifest) -> ManifestDiff {
        let mut diff = ManifestDiff::default();
        for (path, hash) in &current.entries {
            match self.entries.get(path) {
                None => diff.added.push(path.clone()),
                Some(old) if old != hash => diff.modified.push(path.clone()),
                Some(_) => {}
            }
        }
        diff.deleted = self
            .entries
            .keys()
            .filter(|p| !current.entries.contains_key(*p))
            .cloned()
            .collect();
        diff
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDiff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn total(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }
}

impl fmt::Display for ManifestDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no changes");
        }
        write!(
            f,
            "{} added, {} modified, {} deleted",
            self.added.len(),
            self.modified.len(),
            self.deleted.len()
        )
    }
}
