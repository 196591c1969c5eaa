//! Projecting a graph snapshot into a layout scene and a diagram view.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::types::{Confidence, ReferenceId, ReferenceKind, Resolution, SymbolId, UnitStatus};
use crate::graph::CodeGraph;
use crate::layout::{Expansion, GroupKey, LayoutEngine, Scene};
use crate::view::{DiagramEdge, DiagramNode, DiagramView, ViewFilter};

/// Drawn edge before layout: references folded onto visible endpoints.
/// Unresolved references fold by name into a dangling group.
struct EdgeGroup {
    source: SymbolId,
    target: Option<SymbolId>,
    target_name: Option<String>,
    kind: ReferenceKind,
    confidence: Confidence,
    references: Vec<ReferenceId>,
}

pub(super) struct SceneBuild {
    pub scene: Scene,
    edges: BTreeMap<String, EdgeGroup>,
}

impl SceneBuild {
    pub fn new(graph: &CodeGraph, layout: &LayoutEngine, filter: &ViewFilter) -> Self {
        let mut build = Self {
            scene: Scene::new(),
            edges: BTreeMap::new(),
        };

        // text matches and their containers
        let keep: Option<BTreeSet<SymbolId>> = filter.has_text().then(|| {
            let mut keep = BTreeSet::new();
            for record in graph.symbols() {
                if filter.matches_text(&record.symbol.name) {
                    keep.insert(record.symbol.id.clone());
                    keep.extend(graph.ancestors(&record.symbol.id));
                }
            }
            keep
        });

        let roots: Vec<SymbolId> = match &filter.scope {
            Some(scope) if graph.contains(scope) => vec![scope.clone()],
            _ => graph.roots().into_iter().map(|s| s.id.clone()).collect(),
        };
        let mut visitor = Visitor {
            graph,
            layout,
            filter,
            keep: keep.as_ref(),
            scene: &mut build.scene,
        };
        for root in &roots {
            visitor.visit(root, None, keep.is_some());
        }

        build.fold_edges(graph, filter);
        build
    }

    fn visible(&self, graph: &CodeGraph, id: &SymbolId) -> Option<SymbolId> {
        std::iter::once(id.clone())
            .chain(graph.ancestors(id))
            .find(|a| self.scene.nodes.contains_key(a))
    }

    fn fold_edges(&mut self, graph: &CodeGraph, filter: &ViewFilter) {
        for reference in graph.references() {
            let confidence = reference.confidence();
            if !filter.admits_reference(reference.kind, confidence) {
                continue;
            }
            let Some(source) = self.visible(graph, &reference.source) else {
                continue;
            };
            let targets: Vec<&SymbolId> = match &reference.resolution {
                Resolution::Resolved(target) => vec![target],
                Resolution::Ambiguous {
                    preferred: Some(preferred),
                    ..
                } => vec![preferred],
                Resolution::Ambiguous { candidates, .. } => candidates.iter().collect(),
                Resolution::Unresolved => {
                    let name = reference.literal();
                    let key = DiagramEdge::dangling_key(&source, &name, reference.kind);
                    self.edges
                        .entry(key)
                        .or_insert_with(|| EdgeGroup {
                            source: source.clone(),
                            target: None,
                            target_name: Some(name),
                            kind: reference.kind,
                            confidence,
                            references: Vec::new(),
                        })
                        .references
                        .push(reference.id.clone());
                    continue;
                }
            };
            for target in targets {
                let Some(target) = self.visible(graph, target) else {
                    continue;
                };
                if source == target {
                    continue;
                }
                let key = DiagramEdge::key(&source, &target, reference.kind, confidence);
                self.edges
                    .entry(key)
                    .or_insert_with(|| EdgeGroup {
                        source: source.clone(),
                        target: Some(target.clone()),
                        target_name: None,
                        kind: reference.kind,
                        confidence,
                        references: Vec::new(),
                    })
                    .references
                    .push(reference.id.clone());
            }
        }

        for (key, edge) in &self.edges {
            match &edge.target {
                Some(target) => self.scene.add_edge(key.clone(), edge.source.clone(), target.clone()),
                None => self.scene.add_stub(key.clone(), edge.source.clone()),
            }
        }
    }

    /// Attach layout results to the scene.
    pub fn view(&self, graph: &CodeGraph, layout: &LayoutEngine, degraded: bool) -> DiagramView {
        let nodes = self
            .scene
            .nodes
            .iter()
            .filter_map(|(id, node)| {
                let record = graph.symbol(id)?;
                let placed = layout.node(id)?;
                let symbol = &record.symbol;
                Some(DiagramNode {
                    id: id.clone(),
                    label: node.label.clone(),
                    kind: symbol.kind,
                    type_hint: symbol.type_hint.clone(),
                    path: symbol.path.clone(),
                    language: symbol.language.clone(),
                    parent: node.parent.clone(),
                    position: placed.bounds.origin,
                    size: placed.bounds.size,
                    expansion: node.expansion,
                    expandable: graph.has_children(id),
                    badges: if symbol.container.is_none() {
                        unit_badges(graph, &symbol.path)
                    } else {
                        Vec::new()
                    },
                })
            })
            .collect();

        let edges = self
            .edges
            .iter()
            .map(|(key, edge)| DiagramEdge {
                id: key.clone(),
                source_id: edge.source.clone(),
                target_id: edge.target.clone(),
                target_name: edge.target_name.clone(),
                kind: edge.kind,
                confidence: edge.confidence,
                routed_path: layout.route(key).map(<[_]>::to_vec).unwrap_or_default(),
                references: edge.references.clone(),
            })
            .collect();

        DiagramView {
            nodes,
            edges,
            revision: graph.revision(),
            layout_revision: layout.revision(),
            degraded,
        }
    }
}

struct Visitor<'a> {
    graph: &'a CodeGraph,
    layout: &'a LayoutEngine,
    filter: &'a ViewFilter,
    keep: Option<&'a BTreeSet<SymbolId>>,
    scene: &'a mut Scene,
}

impl Visitor<'_> {
    /// `restrict` holds while no text match has been entered yet. Symbols
    /// the filter rejects are skipped and their children attach to the
    /// nearest shown container.
    fn visit(&mut self, id: &SymbolId, parent: GroupKey, restrict: bool) {
        let Some(record) = self.graph.symbol(id) else {
            return;
        };
        let symbol = &record.symbol;
        let matched = !restrict || self.filter.matches_text(&symbol.name);
        if !matched && !self.keep.is_some_and(|k| k.contains(id)) {
            return;
        }
        let restrict_children = restrict && !matched;
        let children: Vec<SymbolId> = self.graph.children(id).into_iter().map(|c| c.id.clone()).collect();

        if !self.filter.admits_symbol(symbol) {
            for child in &children {
                self.visit(child, parent.clone(), restrict_children);
            }
            return;
        }

        let expansion = if children.is_empty() {
            Expansion::Collapsed
        } else if restrict_children {
            Expansion::Expanded
        } else {
            self.layout.expansion(id, self.graph.depth(id))
        };
        self.scene.add_node(id.clone(), symbol.name.clone(), parent, expansion);
        if expansion.is_expanded() {
            for child in &children {
                self.visit(child, Some(id.clone()), restrict_children);
            }
        }
    }
}

fn unit_badges(graph: &CodeGraph, path: &str) -> Vec<String> {
    let mut badges = Vec::new();
    if let Some(unit) = graph.unit(path) {
        if let UnitStatus::Incomplete { reason } = &unit.record.status {
            badges.push(format!("incomplete: {}", reason));
        }
    }
    let diagnostics = graph.diagnostics(path).len();
    if diagnostics > 0 {
        badges.push(format!("{} skipped region(s)", diagnostics));
    }
    badges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::extract::extract_file;
    use crate::graph::types::SourceUnit;
    use crate::graph::GraphBuilder;
    use crate::index::SymbolIndex;
    use crate::parser::AdapterRegistry;

    fn graph(files: &[(&str, &str)]) -> CodeGraph {
        let registry = AdapterRegistry::with_defaults();
        let mut index = SymbolIndex::default();
        let mut builder = GraphBuilder::new();
        for (path, text) in files {
            let unit = SourceUnit::new(*path, "python", *text);
            builder.apply(index.update_unit(extract_file(&registry, &unit).unwrap()));
        }
        builder.graph().clone()
    }

    #[test]
    fn test_kind_filter_reparents_children() {
        let graph = graph(&[("a.py", "def f():\n    g()\n\ndef g():\n    pass\n")]);
        let layout = LayoutEngine::new(LayoutConfig::default());
        let filter = ViewFilter {
            kinds: vec![crate::graph::types::SymbolKind::Function],
            ..ViewFilter::default()
        };
        let build = SceneBuild::new(&graph, &layout, &filter);
        let f = SymbolId::new("a.py", "a::f");
        let g = SymbolId::new("a.py", "a::g");
        assert_eq!(build.scene.nodes.len(), 2);
        assert_eq!(build.scene.nodes[&f].parent, None);
        assert_eq!(build.scene.edges.len(), 1);
        assert_eq!(build.scene.edges[0].source, f);
        assert_eq!(build.scene.edges[0].target, g);
    }

    #[test]
    fn test_references_lift_to_collapsed_container() {
        let graph = graph(&[
            ("a.py", "class A:\n    def run(self):\n        helper()\n"),
            ("b.py", "def helper():\n    pass\n"),
        ]);
        let layout = LayoutEngine::new(LayoutConfig::default());
        let build = SceneBuild::new(&graph, &layout, &ViewFilter::default());
        assert_eq!(build.scene.edges.len(), 1);
        assert_eq!(build.scene.edges[0].source, SymbolId::new("a.py", "a"));
        assert_eq!(build.scene.edges[0].target, SymbolId::new("b.py", "b"));
    }

    #[test]
    fn test_unresolved_references_become_stubs() {
        let graph = graph(&[("a.py", "def f():\n    g()\n    g()\n\ndef h():\n    g()\n")]);
        let mut layout = LayoutEngine::new(LayoutConfig::default());
        layout.set_expansion(&SymbolId::new("a.py", "a"), 0, Expansion::Expanded);
        let build = SceneBuild::new(&graph, &layout, &ViewFilter::default());

        assert!(build.scene.edges.is_empty());
        assert_eq!(build.scene.stubs.len(), 2);
        let f = &build.edges[&DiagramEdge::dangling_key(&SymbolId::new("a.py", "a::f"), "g", ReferenceKind::Call)];
        assert_eq!(f.references.len(), 2);
        assert_eq!(f.target_name.as_deref(), Some("g"));

        let hidden = ViewFilter {
            confidences: vec![Confidence::Resolved],
            ..ViewFilter::default()
        };
        assert!(SceneBuild::new(&graph, &layout, &hidden).scene.stubs.is_empty());
    }

    #[test]
    fn test_same_endpoint_references_fold() {
        let graph = graph(&[
            ("a.py", "def f():\n    g()\n    g()\n\ndef h():\n    g()\n"),
            ("b.py", "def g():\n    pass\n"),
        ]);
        let layout = LayoutEngine::new(LayoutConfig::default());
        let build = SceneBuild::new(&graph, &layout, &ViewFilter::default());
        assert_eq!(build.edges.len(), 1);
        let edge = build.edges.values().next().unwrap();
        assert_eq!(edge.references.len(), 3);
    }
}
