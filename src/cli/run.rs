use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use tracing::{info, warn};

use super::{Cli, Commands, DiagramArgs};
use crate::config::CodescopeConfig;
use crate::error::Result;
use crate::export::export;
use crate::graph::types::SymbolId;
use crate::graph::CodeGraph;
use crate::project::scan::{scan, ScanStats};
use crate::project::{LoadOutcome, Project};
use crate::session::DiagramSession;
use crate::view::{DiagramNode, DiagramView, ViewFilter};

/// Execute one CLI command against the project at `cli.root`.
pub async fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    let root = cli.root.canonicalize().unwrap_or(cli.root);
    let config = CodescopeConfig::load_for_root(&root);

    match cli.command {
        Commands::Build => return build(&root, config, out).await,
        Commands::Changes => return changes(&root, &config, out).await,
        _ => {}
    }

    let (project, outcome) = Project::load_or_build(&root, config).await?;
    let layout = match outcome {
        LoadOutcome::Restored { layout } => layout,
        LoadOutcome::Built { changes } => {
            info!(%changes, "graph rebuilt");
            project.save(None).await?;
            None
        }
    };
    let graph = project.snapshot();

    match cli.command {
        Commands::Stats => stats(&root, &project, &graph, out)?,
        Commands::Search { query, limit } => search(&graph, &query, limit, out)?,
        Commands::Deps { symbol } => deps(&graph, &symbol, out)?,
        Commands::View { diagram } => {
            let view = diagram_view(&project, layout, &diagram).await?;
            print_view(&view, out)?;
        }
        Commands::Export {
            diagram,
            format,
            output,
        } => {
            let view = diagram_view(&project, layout, &diagram).await?;
            let text = export(&view, format)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    writeln!(out, "Wrote {}", path.display())?;
                }
                None => write!(out, "{}", text)?,
            }
        }
        Commands::Build | Commands::Changes => {}
    }
    Ok(())
}

// ─── System ─────────────────────────────────────────────────────

async fn build(root: &Path, config: CodescopeConfig, out: &mut impl Write) -> Result<()> {
    let files = scan(root);
    writeln!(out, "{}", ScanStats::collect(&files, config.ingest.max_file_size))?;

    let project = Project::new(root, config);
    let report = project.sync().await?;
    let path = project.save(None).await?;

    let stats = project.snapshot().stats();
    writeln!(
        out,
        "Built revision {}: {} units, {} symbols, {} references ({} resolved, {} ambiguous, {} unresolved)",
        report.diff.revision,
        stats.units,
        stats.symbols,
        stats.references,
        stats.resolved,
        stats.ambiguous,
        stats.unresolved
    )?;
    if stats.incomplete_units > 0 {
        writeln!(out, "{} units parsed with errors", stats.incomplete_units)?;
    }
    writeln!(out, "Saved to {}", path.display())?;
    Ok(())
}

async fn changes(root: &Path, config: &CodescopeConfig, out: &mut impl Write) -> Result<()> {
    let changes = Project::pending_changes(root, config).await?;
    writeln!(out, "{}", changes)?;
    for path in &changes.added {
        writeln!(out, "  A {}", path)?;
    }
    for path in &changes.modified {
        writeln!(out, "  M {}", path)?;
    }
    for path in &changes.deleted {
        writeln!(out, "  D {}", path)?;
    }
    Ok(())
}

fn stats(root: &Path, project: &Project, graph: &CodeGraph, out: &mut impl Write) -> Result<()> {
    let files = scan(root);
    let stats = graph.stats();
    writeln!(out, "{}", ScanStats::collect(&files, project.config().ingest.max_file_size))?;
    writeln!(out, "Revision:    {}", stats.revision)?;
    writeln!(out, "Units:       {} ({} incomplete)", stats.units, stats.incomplete_units)?;
    writeln!(out, "Symbols:     {} ({} unique names)", stats.symbols, stats.unique_symbol_names)?;
    writeln!(
        out,
        "References:  {} ({} resolved, {} ambiguous, {} unresolved)",
        stats.references, stats.resolved, stats.ambiguous, stats.unresolved
    )?;
    writeln!(out, "Diagnostics: {}", stats.diagnostics)?;
    Ok(())
}

// ─── Query ──────────────────────────────────────────────────────

fn search(graph: &CodeGraph, query: &str, limit: usize, out: &mut impl Write) -> Result<()> {
    let results = graph.search(query, limit);
    if results.is_empty() {
        writeln!(out, "No symbols match '{}'", query)?;
        return Ok(());
    }
    for hit in results {
        let kind = hit.type_hint.unwrap_or_else(|| hit.kind.to_string());
        writeln!(out, "{:<10} {:<30} {}:{}  [{}]", kind, hit.name, hit.path, hit.line, hit.id)?;
    }
    Ok(())
}

fn deps(graph: &CodeGraph, symbol: &str, out: &mut impl Write) -> Result<()> {
    let Some(id) = resolve(graph, symbol) else {
        writeln!(out, "Symbol not found: {}", symbol)?;
        return Ok(());
    };
    writeln!(out, "{}", id)?;

    let dependencies = graph.dependencies(&id);
    writeln!(out, "\nDepends on ({}):", dependencies.len())?;
    for dep in &dependencies {
        let target = dep.symbol.as_ref().map(SymbolId::as_str).unwrap_or(dep.name.as_str());
        writeln!(out, "  → {} {} [{}] {}:{}", dep.kind, target, dep.confidence, dep.path, dep.line)?;
    }

    let dependents = graph.dependents(&id);
    writeln!(out, "\nUsed by ({}):", dependents.len())?;
    for dep in &dependents {
        let source = dep.symbol.as_ref().map(SymbolId::as_str).unwrap_or(dep.name.as_str());
        writeln!(out, "  ← {} {} [{}] {}:{}", dep.kind, source, dep.confidence, dep.path, dep.line)?;
    }
    Ok(())
}

/// An identity string when it names a symbol, otherwise the best name match.
fn resolve(graph: &CodeGraph, symbol: &str) -> Option<SymbolId> {
    if let Some(id) = SymbolId::parse(symbol).filter(|id| graph.contains(id)) {
        return Some(id);
    }
    graph.search(symbol, 1).into_iter().next().map(|hit| hit.id)
}

// ─── Diagram ────────────────────────────────────────────────────

async fn diagram_view(
    project: &Project,
    layout: Option<crate::layout::LayoutState>,
    args: &DiagramArgs,
) -> Result<DiagramView> {
    let mut session = project.resume_session(layout);
    apply_args(&mut session, args)?;
    let view = session.view();
    if args.save {
        let path = project.save(Some(session.layout_state().clone())).await?;
        info!(path = %path.display(), "layout saved");
    }
    Ok(view)
}

fn apply_args(session: &mut DiagramSession, args: &DiagramArgs) -> Result<()> {
    let graph = session.graph().clone();
    let scope = match &args.scope {
        Some(name) => match resolve(&graph, name) {
            Some(id) => Some(id),
            None => {
                warn!(scope = %name, "scope symbol not found, showing everything");
                None
            }
        },
        None => None,
    };
    let filter = ViewFilter {
        languages: args.language.clone(),
        scope,
        text: args.text.clone(),
        ..ViewFilter::default()
    };
    session.set_filter(filter)?;

    for name in &args.expand {
        match resolve(&graph, name) {
            Some(id) => {
                session.expand(&id)?;
            }
            None => warn!(symbol = %name, "nothing to expand"),
        }
    }
    for name in &args.reveal {
        match resolve(&graph, name) {
            Some(id) => {
                session.reveal(&id)?;
            }
            None => warn!(symbol = %name, "nothing to reveal"),
        }
    }
    Ok(())
}

fn print_view(view: &DiagramView, out: &mut impl Write) -> Result<()> {
    writeln!(
        out,
        "Revision {} (layout {}): {} nodes, {} edges{}",
        view.revision,
        view.layout_revision,
        view.nodes.len(),
        view.edges.len(),
        if view.degraded { ", layout degraded" } else { "" }
    )?;

    let mut children: BTreeMap<Option<&SymbolId>, Vec<&DiagramNode>> = BTreeMap::new();
    for node in &view.nodes {
        children.entry(node.parent.as_ref()).or_default().push(node);
    }
    print_nodes(&children, None, 0, out)?;

    if !view.edges.is_empty() {
        writeln!(out)?;
        for edge in &view.edges {
            let target = match (&edge.target_id, &edge.target_name) {
                (Some(id), _) => id.to_string(),
                (None, name) => format!("?{}", name.as_deref().unwrap_or("")),
            };
            writeln!(
                out,
                "{} -> {} ({}, {}, x{})",
                edge.source_id,
                target,
                edge.kind,
                edge.confidence,
                edge.references.len()
            )?;
        }
    }
    Ok(())
}

fn print_nodes(
    children: &BTreeMap<Option<&SymbolId>, Vec<&DiagramNode>>,
    parent: Option<&SymbolId>,
    depth: usize,
    out: &mut impl Write,
) -> Result<()> {
    for node in children.get(&parent).into_iter().flatten() {
        let marker = match (node.expandable, node.expansion.is_expanded()) {
            (false, _) => ' ',
            (true, true) => '-',
            (true, false) => '+',
        };
        write!(
            out,
            "{}{} {} [{}] at ({:.0}, {:.0}) {:.0}x{:.0}",
            "  ".repeat(depth),
            marker,
            node.label,
            node.kind,
            node.position.x,
            node.position.y,
            node.size.width,
            node.size.height
        )?;
        for badge in &node.badges {
            write!(out, " !{}", badge)?;
        }
        writeln!(out)?;
        print_nodes(children, Some(&node.id), depth + 1, out)?;
    }
    Ok(())
}
