//! Diagram sessions: one renderer's interactive window onto the graph.
//!
//! A session follows the project's snapshot channel, owns its own
//! [`LayoutEngine`] and remembers the view its renderer last saw, so
//! [`DiagramSession::poll`] can hand back only what changed. Expansion state
//! and filters are per session.

mod scene;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LayoutConfig;
use crate::graph::types::SymbolId;
use crate::graph::{CodeGraph, GraphDiff, Snapshot};
use crate::layout::{Cancellation, Expansion, LayoutEngine, LayoutError, LayoutState, NeverCancel};
use crate::view::{DiagramView, ViewFilter, ViewUpdate};

use scene::SceneBuild;

/// Relayout attempts restarted by newer snapshots before the session lays
/// out the snapshot it holds without cancellation.
const MAX_RESTARTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("symbol {0} no longer exists")]
    StaleReference(SymbolId),

    #[error("request targets revision {requested}, session is at revision {current}")]
    StaleRevision { requested: u64, current: u64 },
}

/// Cancels a layout pass once a newer snapshot is published.
struct Superseded<'a>(&'a watch::Receiver<Snapshot>);

impl Cancellation for Superseded<'_> {
    fn is_cancelled(&self) -> bool {
        self.0.has_changed().unwrap_or(false)
    }
}

pub struct DiagramSession {
    id: Uuid,
    snapshots: watch::Receiver<Snapshot>,
    graph: Arc<CodeGraph>,
    layout: LayoutEngine,
    filter: ViewFilter,
    current: DiagramView,
    /// What the renderer last received.
    seen: DiagramView,
}

impl DiagramSession {
    /// Follow a project's snapshot stream.
    pub fn new(snapshots: watch::Receiver<Snapshot>, config: LayoutConfig) -> Self {
        Self::with_layout(snapshots, LayoutEngine::new(config))
    }

    /// Resume with a persisted layout.
    pub fn with_layout_state(
        snapshots: watch::Receiver<Snapshot>,
        config: LayoutConfig,
        state: LayoutState,
    ) -> Self {
        Self::with_layout(snapshots, LayoutEngine::with_state(config, state))
    }

    /// A session over a fixed graph.
    pub fn detached(graph: Arc<CodeGraph>, config: LayoutConfig) -> Self {
        let (_tx, rx) = watch::channel(Snapshot::initial(graph));
        Self::new(rx, config)
    }

    fn with_layout(mut snapshots: watch::Receiver<Snapshot>, layout: LayoutEngine) -> Self {
        let graph = snapshots.borrow_and_update().graph.clone();
        let mut session = Self {
            id: Uuid::new_v4(),
            snapshots,
            graph,
            layout,
            filter: ViewFilter::default(),
            current: DiagramView::default(),
            seen: DiagramView::default(),
        };
        session.relayout();
        info!(session = %session.id, revision = session.graph.revision(), "diagram session opened");
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn graph(&self) -> &Arc<CodeGraph> {
        &self.graph
    }

    pub fn revision(&self) -> u64 {
        self.graph.revision()
    }

    pub fn filter(&self) -> &ViewFilter {
        &self.filter
    }

    pub fn layout_state(&self) -> &LayoutState {
        self.layout.state()
    }

    /// Reject requests made against a revision other than the latest
    /// published one. The session moves to that snapshot first.
    pub fn ensure_revision(&mut self, requested: u64) -> Result<(), QueryError> {
        self.refresh();
        let current = self.revision();
        if requested == current {
            Ok(())
        } else {
            Err(QueryError::StaleRevision { requested, current })
        }
    }

    // ─── Queries ────────────────────────────────────────────────

    /// The full view at the latest snapshot.
    pub fn view(&mut self) -> DiagramView {
        self.refresh();
        self.seen = self.current.clone();
        self.current.clone()
    }

    /// Changes since the renderer last received a view or update.
    pub fn poll(&mut self) -> ViewUpdate {
        self.refresh();
        self.take_update()
    }

    pub fn expand(&mut self, id: &SymbolId) -> Result<ViewUpdate, QueryError> {
        self.set_expansion(id, Expansion::Expanded)
    }

    pub fn collapse(&mut self, id: &SymbolId) -> Result<ViewUpdate, QueryError> {
        self.set_expansion(id, Expansion::Collapsed)
    }

    /// Expand every container of `id` so it becomes visible.
    pub fn reveal(&mut self, id: &SymbolId) -> Result<ViewUpdate, QueryError> {
        self.refresh();
        self.require(id)?;
        let mut changed = false;
        for ancestor in self.graph.ancestors(id) {
            let depth = self.graph.depth(&ancestor);
            changed |= self.layout.set_expansion(&ancestor, depth, Expansion::Expanded);
        }
        if changed {
            self.relayout();
        }
        Ok(self.take_update())
    }

    /// Symbols matching `query` that the current filter admits, best first.
    pub fn search(&mut self, query: &str, limit: usize) -> Result<Vec<SymbolId>, QueryError> {
        self.refresh();
        let scope = self.filter.scope.clone();
        let hits = self
            .graph
            .search(query, usize::MAX)
            .into_iter()
            .filter(|hit| {
                self.graph
                    .symbol(&hit.id)
                    .is_some_and(|r| self.filter.admits_symbol(&r.symbol))
            })
            .filter(|hit| match &scope {
                Some(root) => &hit.id == root || self.graph.ancestors(&hit.id).contains(root),
                None => true,
            })
            .take(limit)
            .map(|hit| hit.id)
            .collect();
        Ok(hits)
    }

    pub fn set_filter(&mut self, filter: ViewFilter) -> Result<ViewUpdate, QueryError> {
        self.refresh();
        if let Some(scope) = &filter.scope {
            self.require(scope)?;
        }
        if filter != self.filter {
            debug!(session = %self.id, ?filter, "filter changed");
            self.filter = filter;
            self.relayout();
        }
        Ok(self.take_update())
    }

    // ─── Internals ──────────────────────────────────────────────

    fn require(&self, id: &SymbolId) -> Result<(), QueryError> {
        if self.graph.contains(id) {
            Ok(())
        } else {
            Err(QueryError::StaleReference(id.clone()))
        }
    }

    fn set_expansion(&mut self, id: &SymbolId, expansion: Expansion) -> Result<ViewUpdate, QueryError> {
        self.refresh();
        self.require(id)?;
        let depth = self.graph.depth(id);
        if self.layout.set_expansion(id, depth, expansion) && self.graph.has_children(id) {
            debug!(session = %self.id, symbol = %id, %expansion, "expansion changed");
            self.relayout();
        }
        Ok(self.take_update())
    }

    fn take_update(&mut self) -> ViewUpdate {
        let update = ViewUpdate::between(&self.seen, &self.current);
        self.seen = self.current.clone();
        update
    }

    /// Move to the newest snapshot, if any.
    fn refresh(&mut self) {
        if !self.snapshots.has_changed().unwrap_or(false) {
            return;
        }
        let latest = self.snapshots.borrow_and_update().clone();
        self.advance(latest);
    }

    fn advance(&mut self, latest: Snapshot) {
        // The published diff only applies when no revision was skipped
        let diff = if latest.diff.from_revision == self.graph.revision() {
            latest.diff
        } else {
            Arc::new(GraphDiff::between(&self.graph, &latest.graph))
        };
        let previous = std::mem::replace(&mut self.graph, latest.graph);
        if diff.is_empty() {
            self.current.revision = self.graph.revision();
            return;
        }
        debug!(
            session = %self.id,
            from = diff.from_revision,
            to = diff.revision,
            touched = diff.touched_symbols(&previous, &self.graph).len(),
            "snapshot advanced"
        );

        if !diff.removed_symbols.is_empty() {
            self.prune_removed();
        }
        self.relayout();
    }

    /// Forget expansion state and a filter scope naming symbols the current
    /// graph no longer has.
    fn prune_removed(&mut self) {
        let graph = self.graph.clone();
        self.layout.retain_expansion(|id| graph.contains(id));
        if self.filter.scope.as_ref().is_some_and(|s| !graph.contains(s)) {
            warn!(session = %self.id, "filter scope was removed; showing the whole project");
            self.filter.scope = None;
        }
    }

    /// Rebuild the scene and lay it out. A newer snapshot arriving mid-pass
    /// cancels the pass and restarts it on the newer graph.
    fn relayout(&mut self) {
        let mut restarts = 0;
        loop {
            let build = SceneBuild::new(&self.graph, &self.layout, &self.filter);
            let result = if restarts < MAX_RESTARTS {
                self.layout.layout(&build.scene, &Superseded(&self.snapshots))
            } else {
                self.layout.layout(&build.scene, &NeverCancel)
            };

            let degraded = match result {
                Ok(_) => false,
                Err(LayoutError::Timeout { degraded, .. }) => {
                    warn!(session = %self.id, degraded, "layout over budget; view is degraded");
                    true
                }
                Err(LayoutError::Cancelled) => {
                    restarts += 1;
                    self.graph = self.snapshots.borrow_and_update().graph.clone();
                    debug!(session = %self.id, revision = self.graph.revision(), restarts, "layout superseded");
                    self.prune_removed();
                    continue;
                }
                Err(err @ LayoutError::UnknownNode(_)) => {
                    warn!(session = %self.id, error = %err, "scene rejected by layout; keeping previous view");
                    return;
                }
            };
            self.current = build.view(&self.graph, &self.layout, degraded);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::{Confidence, SourceUnit};
    use crate::graph::{GraphBuilder, UnitDelta};
    use crate::index::{AmbiguityPolicy, SymbolIndex};
    use crate::parser::AdapterRegistry;
    use crate::extract::extract_file;

    struct Fixture {
        registry: AdapterRegistry,
        index: SymbolIndex,
        builder: GraphBuilder,
        tx: watch::Sender<Snapshot>,
    }

    impl Fixture {
        fn new() -> Self {
            let builder = GraphBuilder::new();
            let (tx, _rx) = watch::channel(Snapshot::initial(builder.snapshot()));
            Self {
                registry: AdapterRegistry::with_defaults(),
                index: SymbolIndex::new(AmbiguityPolicy::RecordOnly),
                builder,
                tx,
            }
        }

        fn ingest(&mut self, path: &str, text: &str) {
            let unit = SourceUnit::new(path, "python", text);
            let extraction = extract_file(&self.registry, &unit).unwrap();
            let delta = self.index.update_unit(extraction);
            self.publish(delta);
        }

        fn remove(&mut self, path: &str) {
            let delta = self.index.remove_unit(path);
            self.publish(delta);
        }

        fn publish(&mut self, delta: UnitDelta) {
            let diff = self.builder.apply(delta);
            self.tx.send_replace(Snapshot {
                graph: self.builder.snapshot(),
                diff: Arc::new(diff),
            });
        }

        fn session(&self) -> DiagramSession {
            DiagramSession::new(self.tx.subscribe(), LayoutConfig {
                budget_ms: 0,
                ..LayoutConfig::default()
            })
        }
    }

    fn module(path: &str) -> SymbolId {
        let stem = path.trim_end_matches(".py");
        SymbolId::new(path, stem)
    }

    fn member(path: &str, name: &str) -> SymbolId {
        let stem = path.trim_end_matches(".py");
        SymbolId::new(path, &format!("{}::{}", stem, name))
    }

    fn two_files() -> Fixture {
        let mut fx = Fixture::new();
        fx.ingest("a.py", "def f():\n    return 1\n");
        fx.ingest("b.py", "def caller():\n    f()\n");
        fx
    }

    #[test]
    fn test_initial_view_shows_collapsed_modules() {
        let fx = two_files();
        let mut session = fx.session();
        let view = session.view();

        assert_eq!(view.revision, 2);
        let ids: Vec<&SymbolId> = view.nodes.iter().map(|n| &n.id).collect();
        assert_eq!(ids, vec![&module("a.py"), &module("b.py")]);
        assert!(view.nodes.iter().all(|n| n.expandable && n.expansion == Expansion::Collapsed));

        // b's call lifts to a module-level edge
        assert_eq!(view.edges.len(), 1);
        assert_eq!(view.edges[0].source_id, module("b.py"));
        assert_eq!(view.edges[0].target_id, Some(module("a.py")));
    }

    #[test]
    fn test_expand_and_collapse() {
        let fx = two_files();
        let mut session = fx.session();
        session.view();

        let update = session.expand(&module("b.py")).unwrap();
        assert_eq!(update.added_nodes.len(), 1);
        assert_eq!(update.added_nodes[0].id, member("b.py", "caller"));
        assert!(update.updated_nodes.iter().any(|n| n.id == module("b.py")));

        let expanded = session.view();
        let caller = expanded.node(&member("b.py", "caller")).unwrap();
        assert_eq!(caller.parent, Some(module("b.py")));
        assert!(expanded
            .edges
            .iter()
            .any(|e| e.source_id == member("b.py", "caller") && e.target_id == Some(module("a.py"))));

        let update = session.collapse(&module("b.py")).unwrap();
        assert_eq!(update.removed_nodes, vec![member("b.py", "caller")]);

        let again = session.expand(&module("b.py")).unwrap();
        assert_eq!(again.added_nodes[0], *caller);
    }

    #[test]
    fn test_stale_reference() {
        let fx = two_files();
        let mut session = fx.session();
        let ghost = member("a.py", "ghost");
        assert_eq!(session.expand(&ghost), Err(QueryError::StaleReference(ghost.clone())));
        let filter = ViewFilter {
            scope: Some(ghost.clone()),
            ..ViewFilter::default()
        };
        assert_eq!(session.set_filter(filter), Err(QueryError::StaleReference(ghost)));
    }

    #[test]
    fn test_stale_revision() {
        let mut fx = two_files();
        let mut session = fx.session();
        assert!(session.ensure_revision(2).is_ok());
        assert_eq!(
            session.ensure_revision(1),
            Err(QueryError::StaleRevision {
                requested: 1,
                current: 2
            })
        );

        // Checked against the latest publication, not what was last polled
        fx.ingest("c.py", "def g():\n    pass\n");
        assert!(session.ensure_revision(3).is_ok());
        assert_eq!(session.revision(), 3);
        assert!(session.ensure_revision(2).is_err());
    }

    #[test]
    fn test_poll_follows_snapshots() {
        let mut fx = two_files();
        let mut session = fx.session();
        session.view();
        assert!(session.poll().is_empty());

        fx.ingest("c.py", "def g():\n    pass\n");
        let update = session.poll();
        assert_eq!(update.from_revision, 2);
        assert_eq!(update.revision, 3);
        assert_eq!(update.added_nodes.len(), 1);
        assert_eq!(update.added_nodes[0].id, module("c.py"));

        fx.remove("a.py");
        let update = session.poll();
        assert!(update.removed_nodes.contains(&module("a.py")));
        assert_eq!(update.removed_edges.len(), 1);
        assert_eq!(update.added_edges.len(), 1);
        assert!(update.added_edges[0].is_dangling());
    }

    #[test]
    fn test_removed_target_in_expanded_view() {
        let mut fx = two_files();
        let mut session = fx.session();
        session.expand(&module("b.py")).unwrap();
        fx.remove("a.py");
        let view = session.view();
        // the reference is now unresolved and dangles from its caller
        assert_eq!(view.edges.len(), 1);
        let edge = &view.edges[0];
        assert_eq!(edge.source_id, member("b.py", "caller"));
        assert_eq!(edge.target_id, None);
        assert_eq!(edge.target_name.as_deref(), Some("f"));
        assert_eq!(edge.confidence, Confidence::Unresolved);
        assert!(!edge.routed_path.is_empty());
        assert_eq!(fx.builder.graph().stats().unresolved, 1);
    }

    #[test]
    fn test_search_respects_filter() {
        let mut fx = two_files();
        fx.ingest("c.py", "class Finder:\n    def find(self):\n        pass\n");
        let mut session = fx.session();

        let hits = session.search("f", 10).unwrap();
        assert!(hits.contains(&member("a.py", "f")));
        assert!(hits.contains(&member("c.py", "Finder")));

        session
            .set_filter(ViewFilter {
                scope: Some(module("c.py")),
                ..ViewFilter::default()
            })
            .unwrap();
        let hits = session.search("f", 10).unwrap();
        assert!(!hits.contains(&member("a.py", "f")));
        assert!(hits.contains(&member("c.py", "Finder::find")));
    }

    fn scoped_to(fx: &Fixture, scope: SymbolId) -> DiagramSession {
        let mut session = fx.session();
        session
            .set_filter(ViewFilter {
                scope: Some(scope),
                ..ViewFilter::default()
            })
            .unwrap();
        session
    }

    #[test]
    fn test_removed_scope_cleared_on_poll() {
        let mut fx = two_files();
        let mut session = scoped_to(&fx, module("a.py"));
        fx.remove("a.py");

        let update = session.poll();
        assert_eq!(session.filter().scope, None);
        assert_eq!(update.revision, fx.builder.revision());
        assert!(session.view().node(&module("b.py")).is_some());
    }

    #[test]
    fn test_removed_scope_cleared_on_superseded_layout() {
        let mut fx = two_files();
        let mut session = scoped_to(&fx, module("a.py"));
        fx.remove("a.py");

        // A pending snapshot cancels the pass and restarts it on the new graph
        session.relayout();
        assert_eq!(session.revision(), fx.builder.revision());
        assert_eq!(session.filter().scope, None);
        assert!(session.current.node(&module("b.py")).is_some());
    }

    #[test]
    fn test_text_filter_reveals_matches() {
        let mut fx = two_files();
        fx.ingest("c.py", "class Finder:\n    def locate(self):\n        pass\n");
        let mut session = fx.session();
        session
            .set_filter(ViewFilter {
                text: Some("locate".to_string()),
                ..ViewFilter::default()
            })
            .unwrap();
        let view = session.view();
        let ids: Vec<&SymbolId> = view.nodes.iter().map(|n| &n.id).collect();
        assert_eq!(
            ids,
            vec![&module("c.py"), &member("c.py", "Finder"), &member("c.py", "Finder::locate")]
        );
    }

    #[test]
    fn test_confidence_filter() {
        let mut fx = Fixture::new();
        fx.ingest("a.py", "def f():\n    pass\n");
        fx.ingest("b.py", "def f():\n    pass\n");
        fx.ingest("c.py", "def user():\n    f()\n    missing()\n");
        let mut session = fx.session();
        let view = session.view();
        // ambiguous with no preferred candidate: one edge per candidate
        let ambiguous = view.edges.iter().filter(|e| e.confidence == Confidence::Ambiguous).count();
        assert_eq!(ambiguous, 2);
        let dangling: Vec<_> = view.edges.iter().filter(|e| e.is_dangling()).collect();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].target_name.as_deref(), Some("missing"));
        assert_eq!(view.edges.len(), 3);

        let update = session
            .set_filter(ViewFilter {
                confidences: vec![Confidence::Resolved],
                ..ViewFilter::default()
            })
            .unwrap();
        assert_eq!(update.removed_edges.len(), 3);
    }

    #[test]
    fn test_reveal_expands_containers() {
        let mut fx = Fixture::new();
        fx.ingest("c.py", "class Finder:\n    def locate(self):\n        pass\n");
        let mut session = fx.session();
        session.view();
        let update = session.reveal(&member("c.py", "Finder::locate")).unwrap();
        assert!(update
            .added_nodes
            .iter()
            .any(|n| n.id == member("c.py", "Finder::locate")));
    }

    #[test]
    fn test_incomplete_unit_badge() {
        let mut fx = Fixture::new();
        fx.ingest("bad.py", "def ok():\n    pass\n\ndef broken(:\n");
        let mut session = fx.session();
        let view = session.view();
        let node = view.node(&module("bad.py")).unwrap();
        assert!(node.badges.iter().any(|b| b.starts_with("incomplete")));
    }
}
