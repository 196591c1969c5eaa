//! The renderer-facing projection of the graph.
//!
//! A [`DiagramView`] is what a rendering surface draws: laid-out nodes and
//! routed edges for one graph revision and one layout revision. Renderers
//! that keep their own scene apply [`ViewUpdate`]s instead of whole views.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::types::{Confidence, ReferenceId, ReferenceKind, Symbol, SymbolId, SymbolKind};
use crate::layout::geometry::{Point, Size};
use crate::layout::Expansion;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramNode {
    pub id: SymbolId,
    pub label: String,
    pub kind: SymbolKind,
    pub type_hint: Option<String>,
    pub path: String,
    pub language: String,
    /// Visible container, `None` at the top level.
    pub parent: Option<SymbolId>,
    /// Top-left corner.
    pub position: Point,
    pub size: Size,
    pub expansion: Expansion,
    /// Has children to show when expanded.
    pub expandable: bool,
    /// Unit problems surfaced on module nodes.
    pub badges: Vec<String>,
}

/// One drawn edge. References whose visible endpoints, kind and confidence
/// coincide are drawn once.
///
/// An unresolved reference is a dangling edge: `target_id` is `None` and
/// `target_name` holds the name that failed to bind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramEdge {
    pub id: String,
    pub source_id: SymbolId,
    pub target_id: Option<SymbolId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    pub kind: ReferenceKind,
    pub confidence: Confidence,
    pub routed_path: Vec<Point>,
    pub references: Vec<ReferenceId>,
}

impl DiagramEdge {
    pub fn key(source: &SymbolId, target: &SymbolId, kind: ReferenceKind, confidence: Confidence) -> String {
        format!("{}->{}:{}:{}", source, target, kind, confidence)
    }

    pub fn dangling_key(source: &SymbolId, name: &str, kind: ReferenceKind) -> String {
        format!("{}->?{}:{}:{}", source, name, kind, Confidence::Unresolved)
    }

    pub fn is_dangling(&self) -> bool {
        self.target_id.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagramView {
    pub nodes: Vec<DiagramNode>,
    pub edges: Vec<DiagramEdge>,
    pub revision: u64,
    pub layout_revision: u64,
    /// The last layout pass ran out of budget and reused older orderings.
    pub degraded: bool,
}

impl DiagramView {
    pub fn node(&self, id: &SymbolId) -> Option<&DiagramNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&DiagramEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn edges_from<'v>(&'v self, id: &'v SymbolId) -> impl Iterator<Item = &'v DiagramEdge> + 'v {
        self.edges.iter().filter(move |e| &e.source_id == id)
    }
}

// ─── Filter ─────────────────────────────────────────────────────

/// What a view shows. Empty lists admit everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewFilter {
    pub kinds: Vec<SymbolKind>,
    pub languages: Vec<String>,
    pub confidences: Vec<Confidence>,
    pub reference_kinds: Vec<ReferenceKind>,
    /// Only this symbol and what it contains.
    pub scope: Option<SymbolId>,
    /// Case-insensitive name substring; matches are revealed with their
    /// containers.
    pub text: Option<String>,
}

impl ViewFilter {
    pub fn admits_symbol(&self, symbol: &Symbol) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&symbol.kind))
            && (self.languages.is_empty() || self.languages.iter().any(|l| l == &symbol.language))
    }

    pub fn admits_reference(&self, kind: ReferenceKind, confidence: Confidence) -> bool {
        (self.reference_kinds.is_empty() || self.reference_kinds.contains(&kind))
            && (self.confidences.is_empty() || self.confidences.contains(&confidence))
    }

    pub fn matches_text(&self, name: &str) -> bool {
        match self.text.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(text) => name.to_lowercase().contains(&text.to_lowercase()),
        }
    }

    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

// ─── Updates ────────────────────────────────────────────────────

/// Difference between two views of the same session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewUpdate {
    pub from_revision: u64,
    pub revision: u64,
    pub layout_revision: u64,
    pub degraded: bool,
    pub added_nodes: Vec<DiagramNode>,
    pub updated_nodes: Vec<DiagramNode>,
    pub removed_nodes: Vec<SymbolId>,
    pub added_edges: Vec<DiagramEdge>,
    pub updated_edges: Vec<DiagramEdge>,
    pub removed_edges: Vec<String>,
}

impl ViewUpdate {
    pub fn between(old: &DiagramView, new: &DiagramView) -> Self {
        let mut update = ViewUpdate {
            from_revision: old.revision,
            revision: new.revision,
            layout_revision: new.layout_revision,
            degraded: new.degraded,
            ..ViewUpdate::default()
        };

        let old_nodes: BTreeMap<&SymbolId, &DiagramNode> = old.nodes.iter().map(|n| (&n.id, n)).collect();
        let new_nodes: BTreeMap<&SymbolId, &DiagramNode> = new.nodes.iter().map(|n| (&n.id, n)).collect();
        for (id, node) in &new_nodes {
            match old_nodes.get(id) {
                None => update.added_nodes.push((*node).clone()),
                Some(previous) if previous != node => update.updated_nodes.push((*node).clone()),
                Some(_) => {}
            }
        }
        update.removed_nodes = old_nodes
            .keys()
            .filter(|id| !new_nodes.contains_key(*id))
            .map(|id| (*id).clone())
            .collect();

        let old_edges: BTreeMap<&str, &DiagramEdge> = old.edges.iter().map(|e| (e.id.as_str(), e)).collect();
        let new_edges: BTreeMap<&str, &DiagramEdge> = new.edges.iter().map(|e| (e.id.as_str(), e)).collect();
        for (id, edge) in &new_edges {
            match old_edges.get(id) {
                None => update.added_edges.push((*edge).clone()),
                Some(previous) if previous != edge => update.updated_edges.push((*edge).clone()),
                Some(_) => {}
            }
        }
        update.removed_edges = old_edges
            .keys()
            .filter(|id| !new_edges.contains_key(*id))
            .map(|id| id.to_string())
            .collect();

        update
    }

    /// No node or edge changed. Revisions may still have moved.
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.updated_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.updated_edges.is_empty()
            && self.removed_edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Span;

    fn node(name: &str, x: f32) -> DiagramNode {
        DiagramNode {
            id: SymbolId::new("a.py", name),
            label: name.to_string(),
            kind: SymbolKind::Function,
            type_hint: None,
            path: "a.py".to_string(),
            language: "python".to_string(),
            parent: None,
            position: Point::new(x, 0.0),
            size: Size::new(80.0, 36.0),
            expansion: Expansion::Collapsed,
            expandable: false,
            badges: Vec::new(),
        }
    }

    fn edge(from: &str, to: &str) -> DiagramEdge {
        let (s, t) = (SymbolId::new("a.py", from), SymbolId::new("a.py", to));
        DiagramEdge {
            id: DiagramEdge::key(&s, &t, ReferenceKind::Call, Confidence::Resolved),
            source_id: s,
            target_id: Some(t),
            target_name: None,
            kind: ReferenceKind::Call,
            confidence: Confidence::Resolved,
            routed_path: Vec::new(),
            references: Vec::new(),
        }
    }

    #[test]
    fn test_update_between_views() {
        let old = DiagramView {
            nodes: vec![node("f", 0.0), node("g", 120.0)],
            edges: vec![edge("f", "g")],
            revision: 1,
            layout_revision: 1,
            degraded: false,
        };
        let new = DiagramView {
            nodes: vec![node("f", 0.0), node("g", 200.0), node("h", 320.0)],
            edges: vec![edge("g", "h")],
            revision: 2,
            layout_revision: 2,
            degraded: false,
        };
        let update = ViewUpdate::between(&old, &new);
        assert_eq!(update.from_revision, 1);
        assert_eq!(update.revision, 2);
        assert_eq!(update.added_nodes.len(), 1);
        assert_eq!(update.added_nodes[0].label, "h");
        assert_eq!(update.updated_nodes.len(), 1);
        assert_eq!(update.updated_nodes[0].label, "g");
        assert!(update.removed_nodes.is_empty());
        assert_eq!(update.added_edges.len(), 1);
        assert_eq!(update.removed_edges, vec![old.edges[0].id.clone()]);
        assert!(!update.is_empty());
        assert!(ViewUpdate::between(&new, &new).is_empty());
    }

    #[test]
    fn test_filter_admits() {
        let symbol = Symbol {
            id: SymbolId::new("a.py", "a::f"),
            name: "parse_header".to_string(),
            qualified_name: "a::parse_header".to_string(),
            kind: SymbolKind::Function,
            type_hint: None,
            path: "a.py".to_string(),
            language: "python".to_string(),
            span: Span::new(1, 0, 2, 0),
            container: None,
            overloaded: false,
        };
        assert!(ViewFilter::default().admits_symbol(&symbol));

        let filter = ViewFilter {
            kinds: vec![SymbolKind::Type],
            ..ViewFilter::default()
        };
        assert!(!filter.admits_symbol(&symbol));

        let filter = ViewFilter {
            languages: vec!["python".to_string()],
            confidences: vec![Confidence::Resolved],
            text: Some("HEADER".to_string()),
            ..ViewFilter::default()
        };
        assert!(filter.admits_symbol(&symbol));
        assert!(filter.matches_text(&symbol.name));
        assert!(!filter.matches_text("body"));
        assert!(filter.admits_reference(ReferenceKind::Call, Confidence::Resolved));
        assert!(!filter.admits_reference(ReferenceKind::Call, Confidence::Ambiguous));
    }
}
