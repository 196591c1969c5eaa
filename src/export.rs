//! Diagram export: D2 source text and JSON.
//!
//! D2 output nests expanded containers and keeps the view's edges, styled
//! by confidence. Dangling edges end at one dashed placeholder per missing
//! name. Positions are left to the D2 layout engine; JSON output carries the
//! full laid-out view.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::Result;
use crate::graph::types::{Confidence, SymbolId, SymbolKind};
use crate::view::{DiagramNode, DiagramView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    D2,
    Json,
}

pub fn export(view: &DiagramView, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::D2 => Ok(to_d2(view)),
        ExportFormat::Json => Ok(serde_json::to_string_pretty(view)?),
    }
}

/// Render a view as D2 source.
pub fn to_d2(view: &DiagramView) -> String {
    let mut children: BTreeMap<Option<&SymbolId>, Vec<&DiagramNode>> = BTreeMap::new();
    for node in &view.nodes {
        children.entry(node.parent.as_ref()).or_default().push(node);
    }

    // short keys keep D2 paths readable; identities go into tooltips
    let keys: BTreeMap<&SymbolId, String> = view
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (&n.id, format!("n{}", i)))
        .collect();

    let mut out = String::new();
    let _ = writeln!(
        out,
        "# codescope view: revision {}, layout {}",
        view.revision, view.layout_revision
    );
    write_nodes(&mut out, &children, &keys, None, 0);

    let mut missing: BTreeMap<&str, String> = BTreeMap::new();
    for edge in view.edges.iter().filter(|e| e.is_dangling()) {
        let name = edge.target_name.as_deref().unwrap_or("?");
        if missing.contains_key(name) {
            continue;
        }
        let key = format!("u{}", missing.len());
        let _ = writeln!(out, "{}: {{", key);
        let _ = writeln!(out, "  label: {}", quote(name));
        let _ = writeln!(out, "  style.stroke-dash: 4");
        let _ = writeln!(out, "}}");
        missing.insert(name, key);
    }

    let parents: BTreeMap<&SymbolId, Option<&SymbolId>> =
        view.nodes.iter().map(|n| (&n.id, n.parent.as_ref())).collect();
    for edge in &view.edges {
        let target = match &edge.target_id {
            Some(id) => path(id, &parents, &keys),
            None => missing
                .get(edge.target_name.as_deref().unwrap_or("?"))
                .cloned(),
        };
        let (Some(source), Some(target)) = (path(&edge.source_id, &parents, &keys), target) else {
            continue;
        };
        let _ = write!(out, "{} -> {}: {}", source, target, edge.kind);
        match edge.confidence {
            Confidence::Resolved => out.push('\n'),
            Confidence::Ambiguous | Confidence::Unresolved => {
                out.push_str(" {\n  style.stroke-dash: 4\n}\n");
            }
        }
    }
    out
}

fn write_nodes(
    out: &mut String,
    children: &BTreeMap<Option<&SymbolId>, Vec<&DiagramNode>>,
    keys: &BTreeMap<&SymbolId, String>,
    parent: Option<&SymbolId>,
    depth: usize,
) {
    let indent = "  ".repeat(depth);
    for node in children.get(&parent).into_iter().flatten() {
        let Some(key) = keys.get(&node.id) else {
            continue;
        };
        let _ = writeln!(out, "{}{}: {{", indent, key);
        let _ = writeln!(out, "{}  label: {}", indent, quote(&node.label));
        let _ = writeln!(out, "{}  shape: {}", indent, shape(node.kind));
        let _ = writeln!(out, "{}  tooltip: {}", indent, quote(node.id.as_str()));
        if !node.badges.is_empty() {
            let _ = writeln!(out, "{}  style.stroke: red", indent);
        }
        write_nodes(out, children, keys, Some(&node.id), depth + 1);
        let _ = writeln!(out, "{}}}", indent);
    }
}

/// Dotted D2 path from the top level down to `id`.
fn path(
    id: &SymbolId,
    parents: &BTreeMap<&SymbolId, Option<&SymbolId>>,
    keys: &BTreeMap<&SymbolId, String>,
) -> Option<String> {
    let mut segments = vec![keys.get(id)?.as_str()];
    let mut current = parents.get(id).copied().flatten();
    while let Some(parent) = current {
        segments.push(keys.get(parent)?.as_str());
        current = parents.get(parent).copied().flatten();
    }
    segments.reverse();
    Some(segments.join("."))
}

fn shape(kind: SymbolKind) -> &'static str {
    match kind {
        SymbolKind::Module => "package",
        SymbolKind::Type => "rectangle",
        SymbolKind::Function => "oval",
        SymbolKind::Field => "text",
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::ReferenceKind;
    use crate::layout::geometry::{Point, Size};
    use crate::layout::Expansion;
    use crate::view::DiagramEdge;

    fn node(id: &str, kind: SymbolKind, parent: Option<&str>) -> DiagramNode {
        DiagramNode {
            id: SymbolId::parse(id).unwrap(),
            label: id.rsplit("::").next().unwrap().rsplit('#').next().unwrap().to_string(),
            kind,
            type_hint: None,
            path: "a.py".to_string(),
            language: "python".to_string(),
            parent: parent.map(|p| SymbolId::parse(p).unwrap()),
            position: Point::default(),
            size: Size::new(80.0, 36.0),
            expansion: Expansion::Collapsed,
            expandable: false,
            badges: Vec::new(),
        }
    }

    fn sample() -> DiagramView {
        let a = SymbolId::parse("a.py#a").unwrap();
        let f = SymbolId::parse("a.py#a::f").unwrap();
        let b = SymbolId::parse("b.py#b").unwrap();
        DiagramView {
            nodes: vec![
                node("a.py#a", SymbolKind::Module, None),
                node("a.py#a::f", SymbolKind::Function, Some("a.py#a")),
                node("b.py#b", SymbolKind::Module, None),
            ],
            edges: vec![
                DiagramEdge {
                    id: DiagramEdge::key(&b, &f, ReferenceKind::Call, Confidence::Resolved),
                    source_id: b.clone(),
                    target_id: Some(f),
                    target_name: None,
                    kind: ReferenceKind::Call,
                    confidence: Confidence::Resolved,
                    routed_path: Vec::new(),
                    references: Vec::new(),
                },
                DiagramEdge {
                    id: DiagramEdge::key(&b, &a, ReferenceKind::Imports, Confidence::Ambiguous),
                    source_id: b.clone(),
                    target_id: Some(a),
                    target_name: None,
                    kind: ReferenceKind::Imports,
                    confidence: Confidence::Ambiguous,
                    routed_path: Vec::new(),
                    references: Vec::new(),
                },
                DiagramEdge {
                    id: DiagramEdge::dangling_key(&b, "log.warn", ReferenceKind::Call),
                    source_id: b,
                    target_id: None,
                    target_name: Some("log.warn".to_string()),
                    kind: ReferenceKind::Call,
                    confidence: Confidence::Unresolved,
                    routed_path: Vec::new(),
                    references: Vec::new(),
                },
            ],
            revision: 3,
            layout_revision: 1,
            degraded: false,
        }
    }

    #[test]
    fn test_d2_nests_containers_and_paths_edges() {
        let d2 = to_d2(&sample());
        assert!(d2.starts_with("# codescope view: revision 3, layout 1\n"));
        assert!(d2.contains("n0: {\n  label: \"a\"\n  shape: package\n"));
        assert!(d2.contains("  n1: {\n    label: \"f\"\n    shape: oval\n"));
        assert!(d2.contains("n2 -> n0.n1: call\n"));
        assert!(d2.contains("n2 -> n0: imports {\n  style.stroke-dash: 4\n}\n"));
    }

    #[test]
    fn test_d2_dangling_edge_ends_at_placeholder() {
        let d2 = to_d2(&sample());
        assert!(d2.contains("u0: {\n  label: \"log.warn\"\n  style.stroke-dash: 4\n}\n"));
        assert!(d2.contains("n2 -> u0: call {\n  style.stroke-dash: 4\n}\n"));
    }

    #[test]
    fn test_json_export() {
        let json = export(&sample(), ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["revision"], 3);
        assert_eq!(value["nodes"].as_array().unwrap().len(), 3);
        assert_eq!(value["edges"][0]["kind"], "call");
        assert!(value["edges"][2]["target_id"].is_null());
        assert_eq!(value["edges"][2]["target_name"], "log.warn");
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote(r#"say "hi""#), r#""say \"hi\"""#);
    }
}
