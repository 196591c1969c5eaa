//! The versioned project graph.
//!
//! Symbols, references, unit records and per-unit diagnostics, all keyed by
//! stable identity, plus the secondary indexes the query methods need. A
//! [`CodeGraph`] is immutable once published; [`GraphBuilder`] owns the
//! mutable copy.
//!
//! [`GraphBuilder`]: super::builder::GraphBuilder

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::types::*;
use crate::parser::Span;

/// A symbol plus its revision history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub symbol: Symbol,
    pub introduced_in: u64,
    pub updated_in: u64,
    /// Every declared location, oldest first, with the revision it took effect.
    pub locations: Vec<(u64, Span)>,
}

impl SymbolRecord {
    /// Whether the declaration has been seen at more than one location.
    pub fn has_moved(&self) -> bool {
        self.locations.len() > 1
    }
}

/// What the graph keeps per source unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitEntry {
    pub record: UnitRecord,
    pub diagnostics: Vec<ExtractionDiagnostic>,
    pub symbols: Vec<SymbolId>,
    pub references: Vec<ReferenceId>,
}

/// The project graph at one revision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeGraph {
    revision: u64,
    symbols: BTreeMap<SymbolId, SymbolRecord>,
    references: BTreeMap<ReferenceId, Reference>,
    units: BTreeMap<String, UnitEntry>,
    /// Index: container -> contained symbols.
    children: BTreeMap<SymbolId, BTreeSet<SymbolId>>,
    /// Index: symbol name -> symbols (for search).
    by_name: BTreeMap<String, BTreeSet<SymbolId>>,
    /// Index: source symbol -> references it makes.
    outgoing: BTreeMap<SymbolId, BTreeSet<ReferenceId>>,
    /// Index: candidate target -> references that may point at it.
    incoming: BTreeMap<SymbolId, BTreeSet<ReferenceId>>,
}

impl CodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ─── Node Operations ────────────────────────────────────────

    pub(crate) fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    pub(crate) fn insert_symbol(&mut self, record: SymbolRecord) {
        let id = record.symbol.id.clone();
        if let Some(old) = self.symbols.get(&id) {
            let (name, container) = (old.symbol.name.clone(), old.symbol.container.clone());
            self.unlink_symbol(&id, &name, container.as_ref());
        }
        self.by_name
            .entry(record.symbol.name.clone())
            .or_default()
            .insert(id.clone());
        if let Some(container) = &record.symbol.container {
            self.children
                .entry(container.clone())
                .or_default()
                .insert(id.clone());
        }
        self.symbols.insert(id, record);
    }

    pub(crate) fn remove_symbol(&mut self, id: &SymbolId) -> Option<SymbolRecord> {
        let record = self.symbols.remove(id)?;
        self.unlink_symbol(id, &record.symbol.name, record.symbol.container.as_ref());
        Some(record)
    }

    fn unlink_symbol(&mut self, id: &SymbolId, name: &str, container: Option<&SymbolId>) {
        if let Some(ids) = self.by_name.get_mut(name) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_name.remove(name);
            }
        }
        if let Some(container) = container {
            if let Some(ids) = self.children.get_mut(container) {
                ids.remove(id);
                if ids.is_empty() {
                    self.children.remove(container);
                }
            }
        }
    }

    // ─── Edge Operations ────────────────────────────────────────

    pub(crate) fn insert_reference(&mut self, reference: Reference) {
        let id = reference.id.clone();
        self.remove_reference(&id);
        self.outgoing
            .entry(reference.source.clone())
            .or_default()
            .insert(id.clone());
        for target in reference.resolution.candidates() {
            self.incoming
                .entry(target.clone())
                .or_default()
                .insert(id.clone());
        }
        self.references.insert(id, reference);
    }

    pub(crate) fn remove_reference(&mut self, id: &ReferenceId) -> Option<Reference> {
        let reference = self.references.remove(id)?;
        if let Some(ids) = self.outgoing.get_mut(&reference.source) {
            ids.remove(id);
            if ids.is_empty() {
                self.outgoing.remove(&reference.source);
            }
        }
        for target in reference.resolution.candidates() {
            if let Some(ids) = self.incoming.get_mut(target) {
                ids.remove(id);
                if ids.is_empty() {
                    self.incoming.remove(target);
                }
            }
        }
        Some(reference)
    }

    pub(crate) fn insert_unit(&mut self, entry: UnitEntry) {
        self.units.insert(entry.record.path.clone(), entry);
    }

    pub(crate) fn remove_unit(&mut self, path: &str) -> Option<UnitEntry> {
        self.units.remove(path)
    }

    // ─── Query Operations ───────────────────────────────────────

    pub fn symbol(&self, id: &SymbolId) -> Option<&SymbolRecord> {
        self.symbols.get(id)
    }

    pub fn contains(&self, id: &SymbolId) -> bool {
        self.symbols.contains_key(id)
    }

    pub fn reference(&self, id: &ReferenceId) -> Option<&Reference> {
        self.references.get(id)
    }

    pub fn unit(&self, path: &str) -> Option<&UnitEntry> {
        self.units.get(path)
    }

    pub fn units(&self) -> impl Iterator<Item = &UnitEntry> {
        self.units.values()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &SymbolRecord> {
        self.symbols.values()
    }

    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.references.values()
    }

    /// Search symbols by name. Exact matches rank before prefix matches,
    /// prefix before substring; ties break by identity.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }
        let query_lower = query.to_lowercase();

        let mut scored: Vec<(u8, &SymbolId)> = self
            .by_name
            .iter()
            .filter_map(|(name, ids)| {
                let lower = name.to_lowercase();
                let score = if name == query {
                    0
                } else if lower == query_lower {
                    1
                } else if lower.starts_with(&query_lower) {
                    2
                } else if lower.contains(&query_lower) {
                    3
                } else {
                    return None;
                };
                Some(ids.iter().map(move |id| (score, id)))
            })
            .flatten()
            .collect();
        scored.sort();

        scored
            .into_iter()
            .take(limit)
            .filter_map(|(score, id)| {
                let record = self.symbols.get(id)?;
                Some(SearchResult {
                    id: id.clone(),
                    name: record.symbol.name.clone(),
                    kind: record.symbol.kind,
                    type_hint: record.symbol.type_hint.clone(),
                    path: record.symbol.path.clone(),
                    line: record.symbol.span.line_start,
                    rank: score,
                })
            })
            .collect()
    }

    /// What `id` refers to: one entry per outgoing reference.
    pub fn dependencies(&self, id: &SymbolId) -> Vec<DependencyInfo> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|rid| self.references.get(rid))
            .map(|r| self.dependency_info(r, r.target().cloned()))
            .collect()
    }

    /// Who refers to `id`, including ambiguous references that list it as a
    /// candidate.
    pub fn dependents(&self, id: &SymbolId) -> Vec<DependencyInfo> {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|rid| self.references.get(rid))
            .map(|r| self.dependency_info(r, Some(r.source.clone())))
            .collect()
    }

    fn dependency_info(&self, reference: &Reference, other: Option<SymbolId>) -> DependencyInfo {
        DependencyInfo {
            reference: reference.id.clone(),
            name: other
                .as_ref()
                .and_then(|id| self.symbols.get(id))
                .map(|r| r.symbol.name.clone())
                .unwrap_or_else(|| reference.literal()),
            symbol: other,
            kind: reference.kind,
            confidence: reference.confidence(),
            path: reference.path.clone(),
            line: reference.span.line_start,
        }
    }

    /// Directly contained symbols, in identity order.
    pub fn children(&self, id: &SymbolId) -> Vec<&Symbol> {
        self.children
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|c| self.symbols.get(c))
            .map(|r| &r.symbol)
            .collect()
    }

    pub fn has_children(&self, id: &SymbolId) -> bool {
        self.children.get(id).is_some_and(|c| !c.is_empty())
    }

    pub fn parent(&self, id: &SymbolId) -> Option<&SymbolId> {
        self.symbols.get(id)?.symbol.container.as_ref()
    }

    /// Containers of `id`, innermost first.
    pub fn ancestors(&self, id: &SymbolId) -> Vec<SymbolId> {
        let mut chain = Vec::new();
        let mut current = self.parent(id);
        while let Some(parent) = current {
            // containment is acyclic, but a corrupt snapshot must not hang
            if chain.contains(parent) {
                break;
            }
            chain.push(parent.clone());
            current = self.parent(parent);
        }
        chain
    }

    /// Containment depth; unit modules sit at 0.
    pub fn depth(&self, id: &SymbolId) -> usize {
        self.ancestors(id).len()
    }

    /// Unit root modules, in path order.
    pub fn roots(&self) -> Vec<&Symbol> {
        self.symbols
            .values()
            .filter(|r| r.symbol.container.is_none())
            .map(|r| &r.symbol)
            .collect()
    }

    pub fn symbols_in_unit(&self, path: &str) -> Vec<&Symbol> {
        self.units
            .get(path)
            .into_iter()
            .flat_map(|u| u.symbols.iter())
            .filter_map(|id| self.symbols.get(id))
            .map(|r| &r.symbol)
            .collect()
    }

    pub fn diagnostics(&self, path: &str) -> &[ExtractionDiagnostic] {
        self.units
            .get(path)
            .map(|u| u.diagnostics.as_slice())
            .unwrap_or(&[])
    }

    // ─── Stats ──────────────────────────────────────────────────

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            revision: self.revision,
            units: self.units.len(),
            symbols: self.symbols.len(),
            references: self.references.len(),
            unique_symbol_names: self.by_name.len(),
            ..GraphStats::default()
        };
        for unit in self.units.values() {
            if !unit.record.is_complete() {
                stats.incomplete_units += 1;
            }
            stats.diagnostics += unit.diagnostics.len();
        }
        for reference in self.references.values() {
            match reference.confidence() {
                Confidence::Resolved => stats.resolved += 1,
                Confidence::Ambiguous => stats.ambiguous += 1,
                Confidence::Unresolved => stats.unresolved += 1,
            }
        }
        stats
    }
}

// ─── Query Result Types ─────────────────────────────────────────

/// A search hit returned by [`CodeGraph::search`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    pub type_hint: Option<String>,
    pub path: String,
    pub line: usize,
    /// 0 exact, 1 exact ignoring case, 2 prefix, 3 substring.
    pub rank: u8,
}

/// One side of a reference, seen from a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub reference: ReferenceId,
    /// The symbol at the other end, when known.
    pub symbol: Option<SymbolId>,
    /// Name of the other end, or the literal when unresolved.
    pub name: String,
    pub kind: ReferenceKind,
    pub confidence: Confidence,
    /// Unit the reference appears in.
    pub path: String,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub revision: u64,
    pub units: usize,
    pub incomplete_units: usize,
    pub symbols: usize,
    pub unique_symbol_names: usize,
    pub references: usize,
    pub resolved: usize,
    pub ambiguous: usize,
    pub unresolved: usize,
    pub diagnostics: usize,
}
