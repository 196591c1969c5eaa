//! Graph diffs: what changed between two revisions.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::engine::CodeGraph;
use super::types::{ReferenceId, SymbolId};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolChange {
    pub id: SymbolId,
    /// The declared span changed.
    pub moved: bool,
}

/// Changes between `from_revision` and `revision`. Every list is sorted by
/// identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDiff {
    pub from_revision: u64,
    pub revision: u64,
    pub added_symbols: Vec<SymbolId>,
    pub removed_symbols: Vec<SymbolId>,
    pub changed_symbols: Vec<SymbolChange>,
    pub added_references: Vec<ReferenceId>,
    pub removed_references: Vec<ReferenceId>,
    pub changed_references: Vec<ReferenceId>,
    /// Units added, removed, re-parsed with different content or status.
    pub units: Vec<String>,
}

impl GraphDiff {
    /// A diff with no changes at `revision`.
    pub fn unchanged(revision: u64) -> Self {
        Self {
            from_revision: revision,
            revision,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added_symbols.is_empty()
            && self.removed_symbols.is_empty()
            && self.changed_symbols.is_empty()
            && self.added_references.is_empty()
            && self.removed_references.is_empty()
            && self.changed_references.is_empty()
            && self.units.is_empty()
    }

    /// Every symbol this diff touches, directly or as a reference endpoint in
    /// either graph.
    pub fn touched_symbols(&self, old: &CodeGraph, new: &CodeGraph) -> BTreeSet<SymbolId> {
        let mut touched: BTreeSet<SymbolId> = self
            .added_symbols
            .iter()
            .chain(&self.removed_symbols)
            .cloned()
            .collect();
        touched.extend(self.changed_symbols.iter().map(|c| c.id.clone()));

        let refs = self
            .added_references
            .iter()
            .chain(&self.removed_references)
            .chain(&self.changed_references);
        for id in refs {
            for graph in [old, new] {
                if let Some(r) = graph.reference(id) {
                    touched.insert(r.source.clone());
                    touched.extend(r.resolution.candidates().into_iter().cloned());
                }
            }
        }
        touched
    }

    /// The merged diff between two snapshots of the same project.
    pub fn between(old: &CodeGraph, new: &CodeGraph) -> Self {
        let symbols = old
            .symbols()
            .chain(new.symbols())
            .map(|r| &r.symbol.id)
            .collect();
        let references = old.references().chain(new.references()).map(|r| &r.id).collect();
        let units = old
            .units()
            .chain(new.units())
            .map(|u| u.record.path.as_str())
            .collect();
        Self::over(old, new, symbols, references, units)
    }

    /// Fold the diffs of consecutive applies from `old` to `new` into one.
    ///
    /// Only the identities the steps name are compared, so the cost follows
    /// the size of the change rather than the graph. An identity added and
    /// removed again drops out; one removed and restored unchanged drops out.
    pub fn compose(old: &CodeGraph, new: &CodeGraph, steps: &[GraphDiff]) -> Self {
        let mut symbols = BTreeSet::new();
        let mut references = BTreeSet::new();
        let mut units = BTreeSet::new();
        for step in steps {
            symbols.extend(step.added_symbols.iter().chain(&step.removed_symbols));
            symbols.extend(step.changed_symbols.iter().map(|c| &c.id));
            references.extend(
                step.added_references
                    .iter()
                    .chain(&step.removed_references)
                    .chain(&step.changed_references),
            );
            units.extend(step.units.iter().map(String::as_str));
        }
        Self::over(old, new, symbols, references, units)
    }

    fn over(
        old: &CodeGraph,
        new: &CodeGraph,
        symbols: BTreeSet<&SymbolId>,
        references: BTreeSet<&ReferenceId>,
        units: BTreeSet<&str>,
    ) -> Self {
        let mut diff = Self {
            from_revision: old.revision(),
            revision: new.revision(),
            ..Self::default()
        };

        for id in symbols {
            match (old.symbol(id), new.symbol(id)) {
                (None, Some(_)) => diff.added_symbols.push(id.clone()),
                (Some(_), None) => diff.removed_symbols.push(id.clone()),
                (Some(previous), Some(current)) if previous.symbol != current.symbol => {
                    diff.changed_symbols.push(SymbolChange {
                        id: id.clone(),
                        moved: previous.symbol.span != current.symbol.span,
                    });
                }
                _ => {}
            }
        }

        for id in references {
            match (old.reference(id), new.reference(id)) {
                (None, Some(_)) => diff.added_references.push(id.clone()),
                (Some(_), None) => diff.removed_references.push(id.clone()),
                (Some(previous), Some(current)) if previous != current => {
                    diff.changed_references.push(id.clone())
                }
                _ => {}
            }
        }

        for path in units {
            let same = match (old.unit(path), new.unit(path)) {
                (Some(previous), Some(current)) => same_unit(previous, current),
                (None, None) => true,
                _ => false,
            };
            if !same {
                diff.units.push(path.to_string());
            }
        }
        diff
    }
}

/// A published revision: the graph and its diff from the revision published
/// before it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub graph: Arc<CodeGraph>,
    pub diff: Arc<GraphDiff>,
}

impl Snapshot {
    /// The first publication, with nothing before it.
    pub fn initial(graph: Arc<CodeGraph>) -> Self {
        let diff = GraphDiff::unchanged(graph.revision());
        Self {
            graph,
            diff: Arc::new(diff),
        }
    }

    pub fn revision(&self) -> u64 {
        self.graph.revision()
    }
}

/// Units compare by content and outcome; the parse timestamp is ignored.
pub(crate) fn same_unit(a: &super::engine::UnitEntry, b: &super::engine::UnitEntry) -> bool {
    a.record.content_hash == b.record.content_hash
        && a.record.language == b.record.language
        && a.record.status == b.record.status
        && a.diagnostics == b.diagnostics
}
