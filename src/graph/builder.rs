//! Graph builder: merges per-unit deltas into the versioned graph.
//!
//! Each applied delta bumps the revision, even when nothing changed, and
//! yields the [`GraphDiff`] against the previous revision.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::diff::{same_unit, GraphDiff, SymbolChange};
use super::engine::{CodeGraph, SymbolRecord, UnitEntry};
use super::types::{ExtractionDiagnostic, Reference, ReferenceId, Symbol, SymbolId, UnitRecord};

/// The resolved contribution of one unit, ready to merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDelta {
    pub path: String,
    /// `None` removes the unit.
    pub unit: Option<UnitRecord>,
    pub symbols: Vec<Symbol>,
    pub references: Vec<Reference>,
    pub diagnostics: Vec<ExtractionDiagnostic>,
    /// References in other units whose resolution changed.
    pub rebound: Vec<Reference>,
}

impl UnitDelta {
    pub fn is_removal(&self) -> bool {
        self.unit.is_none()
    }
}

/// Owns the mutable graph. Readers get immutable snapshots.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: CodeGraph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue from a restored graph.
    pub fn from_graph(graph: CodeGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &CodeGraph {
        &self.graph
    }

    pub fn revision(&self) -> u64 {
        self.graph.revision()
    }

    pub fn snapshot(&self) -> Arc<CodeGraph> {
        Arc::new(self.graph.clone())
    }

    /// Merge one unit delta.
    pub fn apply(&mut self, delta: UnitDelta) -> GraphDiff {
        let from = self.graph.revision();
        let revision = from + 1;
        self.graph.set_revision(revision);

        let mut diff = GraphDiff {
            from_revision: from,
            revision,
            ..GraphDiff::default()
        };

        let previous = self.graph.remove_unit(&delta.path);
        let (old_symbols, old_references): (BTreeSet<SymbolId>, BTreeSet<ReferenceId>) =
            match &previous {
                Some(entry) => (
                    entry.symbols.iter().cloned().collect(),
                    entry.references.iter().cloned().collect(),
                ),
                None => Default::default(),
            };

        match delta.unit {
            Some(record) => {
                let entry = UnitEntry {
                    record,
                    diagnostics: delta.diagnostics,
                    symbols: delta.symbols.iter().map(|s| s.id.clone()).collect(),
                    references: delta.references.iter().map(|r| r.id.clone()).collect(),
                };
                if !previous.as_ref().is_some_and(|p| same_unit(p, &entry)) {
                    diff.units.push(delta.path.clone());
                }
                self.graph.insert_unit(entry);

                self.merge_symbols(revision, old_symbols, delta.symbols, &mut diff);
                self.merge_references(old_references, delta.references, &mut diff);
            }
            None => {
                if previous.is_some() {
                    diff.units.push(delta.path.clone());
                }
                for id in old_symbols {
                    if self.graph.remove_symbol(&id).is_some() {
                        diff.removed_symbols.push(id);
                    }
                }
                for id in old_references {
                    if self.graph.remove_reference(&id).is_some() {
                        diff.removed_references.push(id);
                    }
                }
            }
        }

        for reference in delta.rebound {
            let changed = self
                .graph
                .reference(&reference.id)
                .is_some_and(|existing| existing != &reference);
            if changed {
                diff.changed_references.push(reference.id.clone());
                self.graph.insert_reference(reference);
            }
        }

        diff.changed_references.sort();
        diff.changed_references.dedup();
        debug!(
            file = %delta.path,
            revision,
            added = diff.added_symbols.len(),
            removed = diff.removed_symbols.len(),
            changed = diff.changed_symbols.len(),
            references = diff.added_references.len() + diff.changed_references.len(),
            "applied unit delta"
        );
        diff
    }

    fn merge_symbols(
        &mut self,
        revision: u64,
        old: BTreeSet<SymbolId>,
        symbols: Vec<Symbol>,
        diff: &mut GraphDiff,
    ) {
        let incoming: BTreeMap<SymbolId, Symbol> =
            symbols.into_iter().map(|s| (s.id.clone(), s)).collect();

        for id in old.iter().filter(|id| !incoming.contains_key(*id)) {
            if self.graph.remove_symbol(id).is_some() {
                diff.removed_symbols.push(id.clone());
            }
        }

        for (id, symbol) in incoming {
            let record = match self.graph.symbol(&id) {
                Some(existing) if existing.symbol == symbol => continue,
                Some(existing) => {
                    let moved = existing.symbol.span != symbol.span;
                    let mut record = existing.clone();
                    if moved {
                        record.locations.push((revision, symbol.span));
                    }
                    record.symbol = symbol;
                    record.updated_in = revision;
                    diff.changed_symbols.push(SymbolChange {
                        id: id.clone(),
                        moved,
                    });
                    record
                }
                None => {
                    diff.added_symbols.push(id.clone());
                    SymbolRecord {
                        locations: vec![(revision, symbol.span)],
                        symbol,
                        introduced_in: revision,
                        updated_in: revision,
                    }
                }
            };
            self.graph.insert_symbol(record);
        }
    }

    fn merge_references(
        &mut self,
        old: BTreeSet<ReferenceId>,
        references: Vec<Reference>,
        diff: &mut GraphDiff,
    ) {
        let incoming: BTreeMap<ReferenceId, Reference> =
            references.into_iter().map(|r| (r.id.clone(), r)).collect();

        for id in old.iter().filter(|id| !incoming.contains_key(*id)) {
            if self.graph.remove_reference(id).is_some() {
                diff.removed_references.push(id.clone());
            }
        }

        for (id, reference) in incoming {
            match self.graph.reference(&id) {
                Some(existing) if existing == &reference => continue,
                Some(_) => diff.changed_references.push(id),
                None => diff.added_references.push(id),
            }
            self.graph.insert_reference(reference);
        }
    }
}
