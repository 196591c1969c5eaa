//! Symbol index: cross-file resolution of references to declarations.
//!
//! The index keeps every declared symbol by name and every reference by the
//! names it can bind to. Replacing a unit re-indexes that unit only, then
//! re-resolves the references elsewhere whose names intersect the names the
//! unit removed or added.

mod resolve;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::builder::UnitDelta;
use crate::graph::types::{
    Confidence, FileExtraction, ImportBinding, Reference, ReferenceId, Symbol, SymbolId,
};

/// How to pick a preferred target among equally-proximate candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Keep the candidates, prefer none; the edge stays dangling.
    #[default]
    RecordOnly,
    /// Prefer a candidate declared in the referencing unit.
    SameFile,
    /// Prefer the candidate declared first, by path then position.
    FirstDeclared,
}

impl std::fmt::Display for AmbiguityPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmbiguityPolicy::RecordOnly => write!(f, "record_only"),
            AmbiguityPolicy::SameFile => write!(f, "same_file"),
            AmbiguityPolicy::FirstDeclared => write!(f, "first_declared"),
        }
    }
}

/// What the index holds for one unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IndexedUnit {
    symbols: Vec<SymbolId>,
    references: Vec<ReferenceId>,
    imports: Vec<ImportBinding>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub units: usize,
    pub symbols: usize,
    pub references: usize,
    pub resolved: usize,
    pub ambiguous: usize,
    pub unresolved: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolIndex {
    policy: AmbiguityPolicy,
    symbols: BTreeMap<SymbolId, Symbol>,
    by_name: BTreeMap<String, BTreeSet<SymbolId>>,
    units: BTreeMap<String, IndexedUnit>,
    references: BTreeMap<ReferenceId, Reference>,
    /// Lookup name → references that may bind to it.
    refs_by_name: BTreeMap<String, BTreeSet<ReferenceId>>,
}

impl SymbolIndex {
    pub fn new(policy: AmbiguityPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> AmbiguityPolicy {
        self.policy
    }

    /// Switch policy and re-resolve every reference. Returns the references
    /// whose resolution changed.
    pub fn set_policy(&mut self, policy: AmbiguityPolicy) -> Vec<Reference> {
        if policy == self.policy {
            return Vec::new();
        }
        self.policy = policy;
        let all: BTreeSet<ReferenceId> = self.references.keys().cloned().collect();
        self.rebind_ids(all)
    }

    // ─── Lookups ────────────────────────────────────────────────

    pub fn symbol(&self, id: &SymbolId) -> Option<&Symbol> {
        self.symbols.get(id)
    }

    pub fn reference(&self, id: &ReferenceId) -> Option<&Reference> {
        self.references.get(id)
    }

    /// Every symbol declared under `name`, in identity order.
    pub fn named<'s>(&'s self, name: &str) -> impl Iterator<Item = &'s Symbol> + 's {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|id| self.symbols.get(id))
    }

    pub fn imports_of(&self, path: &str) -> &[ImportBinding] {
        self.units
            .get(path)
            .map(|u| u.imports.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains_unit(&self, path: &str) -> bool {
        self.units.contains_key(path)
    }

    pub fn unit_paths(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.references.values()
    }

    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats {
            units: self.units.len(),
            symbols: self.symbols.len(),
            references: self.references.len(),
            ..IndexStats::default()
        };
        for reference in self.references.values() {
            match reference.confidence() {
                Confidence::Resolved => stats.resolved += 1,
                Confidence::Ambiguous => stats.ambiguous += 1,
                Confidence::Unresolved => stats.unresolved += 1,
            }
        }
        stats
    }

    // ─── Updates ────────────────────────────────────────────────

    /// Replace one unit's symbols and references.
    ///
    /// The unit's own references are resolved from scratch; references in
    /// other units are re-resolved only when their names intersect the names
    /// this unit removed or added, and only changed ones are returned in
    /// [`UnitDelta::rebound`].
    pub fn update_unit(&mut self, extraction: FileExtraction) -> UnitDelta {
        let record = extraction.unit_record();
        let FileExtraction {
            path,
            symbols,
            references,
            imports,
            diagnostics,
            ..
        } = extraction;

        let mut touched = self.detach(&path);
        touched.extend(symbols.iter().map(|s| s.name.clone()));

        for symbol in &symbols {
            self.by_name
                .entry(symbol.name.clone())
                .or_default()
                .insert(symbol.id.clone());
            self.symbols.insert(symbol.id.clone(), symbol.clone());
        }
        self.units.insert(
            path.clone(),
            IndexedUnit {
                symbols: symbols.iter().map(|s| s.id.clone()).collect(),
                references: references.iter().map(|r| r.id.clone()).collect(),
                imports,
            },
        );

        let mut resolved = Vec::with_capacity(references.len());
        for mut reference in references {
            reference.resolution = resolve::resolve(self, &reference);
            self.insert_reference(reference.clone());
            resolved.push(reference);
        }

        let rebound = self.rebind(&path, &touched);
        debug!(
            file = %path,
            symbols = symbols.len(),
            references = resolved.len(),
            rebound = rebound.len(),
            "indexed unit"
        );

        UnitDelta {
            path,
            unit: Some(record),
            symbols,
            references: resolved,
            diagnostics,
            rebound,
        }
    }

    /// Drop a unit. References elsewhere that pointed into it are
    /// re-resolved, usually to unresolved.
    pub fn remove_unit(&mut self, path: &str) -> UnitDelta {
        let touched = self.detach(path);
        let rebound = self.rebind(path, &touched);
        debug!(file = %path, rebound = rebound.len(), "removed unit from index");
        UnitDelta {
            path: path.to_string(),
            unit: None,
            symbols: Vec::new(),
            references: Vec::new(),
            diagnostics: Vec::new(),
            rebound,
        }
    }

    // ─── Internal Helpers ───────────────────────────────────────

    /// Remove everything a unit contributed. Returns the removed symbol names.
    fn detach(&mut self, path: &str) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let Some(unit) = self.units.remove(path) else {
            return names;
        };

        for id in &unit.symbols {
            let Some(symbol) = self.symbols.remove(id) else {
                continue;
            };
            if let Some(ids) = self.by_name.get_mut(&symbol.name) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_name.remove(&symbol.name);
                }
            }
            names.insert(symbol.name);
        }

        for id in &unit.references {
            let Some(reference) = self.references.remove(id) else {
                continue;
            };
            for key in resolve::lookup_names(&reference, &unit.imports) {
                if let Some(ids) = self.refs_by_name.get_mut(key) {
                    ids.remove(id);
                    if ids.is_empty() {
                        self.refs_by_name.remove(key);
                    }
                }
            }
        }
        names
    }

    fn insert_reference(&mut self, reference: Reference) {
        let keys: Vec<String> = resolve::lookup_names(&reference, self.imports_of(&reference.path))
            .into_iter()
            .map(str::to_string)
            .collect();
        for key in keys {
            self.refs_by_name
                .entry(key)
                .or_default()
                .insert(reference.id.clone());
        }
        self.references.insert(reference.id.clone(), reference);
    }

    /// Re-resolve references outside `path` that may bind to `names`.
    fn rebind(&mut self, path: &str, names: &BTreeSet<String>) -> Vec<Reference> {
        let candidates: BTreeSet<ReferenceId> = names
            .iter()
            .filter_map(|name| self.refs_by_name.get(name))
            .flatten()
            .filter(|id| self.references.get(*id).is_some_and(|r| r.path != path))
            .cloned()
            .collect();
        self.rebind_ids(candidates)
    }

    fn rebind_ids(&mut self, ids: BTreeSet<ReferenceId>) -> Vec<Reference> {
        let mut changed = Vec::new();
        for id in ids {
            let Some(reference) = self.references.get(&id) else {
                continue;
            };
            let resolution = resolve::resolve(self, reference);
            if resolution == reference.resolution {
                continue;
            }
            if let Some(reference) = self.references.get_mut(&id) {
                reference.resolution = resolution;
                changed.push(reference.clone());
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_file;
    use crate::graph::types::{ReferenceKind, Resolution, SourceUnit};
    use crate::parser::AdapterRegistry;

    fn py(path: &str, src: &str) -> FileExtraction {
        let registry = AdapterRegistry::with_defaults();
        extract_file(&registry, &SourceUnit::new(path, "python", src)).unwrap()
    }

    fn call<'d>(delta: &'d UnitDelta, name: &str) -> &'d Reference {
        delta
            .references
            .iter()
            .find(|r| r.kind == ReferenceKind::Call && r.name == name)
            .unwrap()
    }

    fn id(s: &str) -> SymbolId {
        SymbolId::parse(s).unwrap()
    }

    const DEFINES_F: &str = "def f():\n    pass\n";
    const CALLS_F: &str = "def main():\n    f()\n";

    #[test]
    fn test_cross_file_call_resolves() {
        let mut index = SymbolIndex::default();
        index.update_unit(py("a.py", DEFINES_F));
        let delta = index.update_unit(py("b.py", CALLS_F));

        let r = call(&delta, "f");
        assert_eq!(r.source, id("b.py#b::main"));
        assert_eq!(r.resolution, Resolution::Resolved(id("a.py#a::f")));
    }

    #[test]
    fn test_undefined_call_is_unresolved() {
        let mut index = SymbolIndex::default();
        let delta = index.update_unit(py("b.py", "def main():\n    g()\n"));
        let r = call(&delta, "g");
        assert_eq!(r.resolution, Resolution::Unresolved);
        assert_eq!(r.target(), None);
    }

    #[test]
    fn test_late_declaration_rebinds_earlier_reference() {
        let mut index = SymbolIndex::default();
        let first = index.update_unit(py("b.py", CALLS_F));
        assert_eq!(call(&first, "f").resolution, Resolution::Unresolved);

        let delta = index.update_unit(py("a.py", DEFINES_F));
        assert_eq!(delta.rebound.len(), 1);
        assert_eq!(
            delta.rebound[0].resolution,
            Resolution::Resolved(id("a.py#a::f"))
        );
    }

    #[test]
    fn test_lexical_scope_wins() {
        let mut index = SymbolIndex::default();
        index.update_unit(py("a.py", DEFINES_F));
        let delta = index.update_unit(py("b.py", "def f():\n    pass\n\ndef main():\n    f()\n"));
        assert_eq!(
            call(&delta, "f").resolution,
            Resolution::Resolved(id("b.py#b::f"))
        );
    }

    #[test]
    fn test_import_disambiguates() {
        let mut index = SymbolIndex::default();
        index.update_unit(py("a.py", DEFINES_F));
        index.update_unit(py("c.py", DEFINES_F));
        let delta = index.update_unit(py("b.py", "from a import f\n\ndef main():\n    f()\n"));

        assert_eq!(
            call(&delta, "f").resolution,
            Resolution::Resolved(id("a.py#a::f"))
        );
        let import = delta
            .references
            .iter()
            .find(|r| r.kind == ReferenceKind::Imports)
            .unwrap();
        assert_eq!(import.resolution, Resolution::Resolved(id("a.py#a::f")));
    }

    #[test]
    fn test_aliased_import_resolves_original_name() {
        let mut index = SymbolIndex::default();
        index.update_unit(py("a.py", "def helper():\n    pass\n"));
        let delta = index.update_unit(py(
            "b.py",
            "from a import helper as h\n\ndef main():\n    h()\n",
        ));
        assert_eq!(
            call(&delta, "h").resolution,
            Resolution::Resolved(id("a.py#a::helper"))
        );
    }

    const METHOD_F: &str = "class K:\n    def f(self):\n        pass\n\ndef main():\n    f()\n";

    fn ambiguous_setup(policy: AmbiguityPolicy) -> Resolution {
        let mut index = SymbolIndex::new(policy);
        index.update_unit(py("a.py", DEFINES_F));
        index.update_unit(py("c.py", DEFINES_F));
        let delta = index.update_unit(py("b.py", METHOD_F));
        call(&delta, "f").resolution.clone()
    }

    #[test]
    fn test_record_only_keeps_candidates() {
        let resolution = ambiguous_setup(AmbiguityPolicy::RecordOnly);
        assert_eq!(
            resolution,
            Resolution::Ambiguous {
                candidates: vec![id("a.py#a::f"), id("b.py#b::K::f"), id("c.py#c::f")],
                preferred: None,
            }
        );
        assert_eq!(resolution.target(), None);
    }

    #[test]
    fn test_same_file_policy() {
        let resolution = ambiguous_setup(AmbiguityPolicy::SameFile);
        assert_eq!(resolution.confidence(), Confidence::Ambiguous);
        assert_eq!(resolution.target(), Some(&id("b.py#b::K::f")));
    }

    #[test]
    fn test_first_declared_policy() {
        let resolution = ambiguous_setup(AmbiguityPolicy::FirstDeclared);
        assert_eq!(resolution.target(), Some(&id("a.py#a::f")));
    }

    #[test]
    fn test_set_policy_rebinds() {
        let mut index = SymbolIndex::default();
        index.update_unit(py("a.py", DEFINES_F));
        index.update_unit(py("c.py", DEFINES_F));
        index.update_unit(py("b.py", METHOD_F));

        let changed = index.set_policy(AmbiguityPolicy::FirstDeclared);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].target(), Some(&id("a.py#a::f")));
        assert!(index.set_policy(AmbiguityPolicy::FirstDeclared).is_empty());
    }

    #[test]
    fn test_static_qualifier_narrows() {
        let mut index = SymbolIndex::default();
        index.update_unit(py("a.py", "class Foo:\n    def bar(self):\n        pass\n"));
        index.update_unit(py("c.py", "def bar():\n    pass\n"));
        let delta = index.update_unit(py("b.py", "def main():\n    Foo.bar()\n    Other.bar()\n"));

        let foo = delta
            .references
            .iter()
            .find(|r| r.qualifier.as_deref() == Some("Foo"))
            .unwrap();
        assert_eq!(foo.resolution, Resolution::Resolved(id("a.py#a::Foo::bar")));

        // a static path outside the project
        let other = delta
            .references
            .iter()
            .find(|r| r.qualifier.as_deref() == Some("Other"))
            .unwrap();
        assert_eq!(other.resolution, Resolution::Unresolved);
    }

    #[test]
    fn test_dynamic_call_stays_ambiguous() {
        let mut index = SymbolIndex::default();
        index.update_unit(py("a.py", "class Foo:\n    def bar(self):\n        pass\n"));
        let delta = index.update_unit(py("b.py", "def main(x):\n    x.bar()\n"));

        let r = call(&delta, "bar");
        assert!(r.dynamic);
        assert_eq!(
            r.resolution,
            Resolution::Ambiguous {
                candidates: vec![id("a.py#a::Foo::bar")],
                preferred: Some(id("a.py#a::Foo::bar")),
            }
        );
    }

    #[test]
    fn test_remove_unit_unresolves_and_readd_restores() {
        let mut index = SymbolIndex::default();
        index.update_unit(py("a.py", DEFINES_F));
        index.update_unit(py("b.py", CALLS_F));

        let removed = index.remove_unit("a.py");
        assert!(removed.unit.is_none());
        assert_eq!(removed.rebound.len(), 1);
        assert_eq!(removed.rebound[0].resolution, Resolution::Unresolved);
        assert!(!index.contains_unit("a.py"));
        assert_eq!(index.named("f").count(), 0);

        let readded = index.update_unit(py("a.py", DEFINES_F));
        assert_eq!(readded.rebound.len(), 1);
        assert_eq!(
            readded.rebound[0].resolution,
            Resolution::Resolved(id("a.py#a::f"))
        );
    }

    #[test]
    fn test_unaffected_references_not_rebound() {
        let mut index = SymbolIndex::default();
        index.update_unit(py("a.py", DEFINES_F));
        index.update_unit(py("d.py", "def h():\n    pass\n"));
        index.update_unit(py("b.py", "def main():\n    f()\n    h()\n"));

        // same declarations again: nothing elsewhere changes
        let same = index.update_unit(py("a.py", "def f():\n    return 1\n"));
        assert!(same.rebound.is_empty());

        let gone = index.update_unit(py("a.py", "def other():\n    pass\n"));
        assert_eq!(gone.rebound.len(), 1);
        assert_eq!(gone.rebound[0].name, "f");

        let h = index
            .references()
            .find(|r| r.name == "h")
            .unwrap();
        assert_eq!(h.resolution, Resolution::Resolved(id("d.py#d::h")));
    }

    #[test]
    fn test_stats_count_confidences() {
        let mut index = SymbolIndex::default();
        index.update_unit(py("a.py", DEFINES_F));
        index.update_unit(py("b.py", "def main():\n    f()\n    g()\n"));
        let stats = index.stats();
        assert_eq!(stats.units, 2);
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.unresolved, 1);
        // two modules plus f and main
        assert_eq!(stats.symbols, 4);
    }
}
