//! Layout engine: positions, groupings and edge routes for a [`Scene`].
//!
//! Every expanded container is a group laid out inside its parent; the
//! visible roots form the root group. Groups are processed innermost first so
//! a container's size is known before its own group is placed, then absolute
//! positions are assigned outermost first.
//!
//! Relayout is incremental. A group is dirty when its members or the
//! reference edges lifted into it changed, when a scene edge touching it was
//! added or removed, or when it holds the other end of an edge from a dirty
//! group. Only dirty groups are re-layered and re-ordered; the rest keep their
//! layer order and only reflow sizes and positions. Past
//! `full_relayout_ratio` of dirty groups everything is recomputed.
//!
//! Nothing is committed until a pass completes, so a cancelled pass leaves
//! the previous layout untouched. A pass that runs out of budget keeps the
//! last-known-good order for the remaining dirty groups, commits, and reports
//! [`LayoutError::Timeout`].

pub mod geometry;
pub mod layering;
pub mod routing;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LayoutConfig;
use crate::graph::types::SymbolId;
use geometry::{Bounds, Insets, Point, Size};
use routing::Channel;

/// Group identity: the expanded container, or `None` for the roots.
pub type GroupKey = Option<SymbolId>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expansion {
    #[default]
    Collapsed,
    Expanded,
}

impl Expansion {
    pub fn is_expanded(self) -> bool {
        self == Expansion::Expanded
    }
}

impl std::fmt::Display for Expansion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expansion::Collapsed => write!(f, "collapsed"),
            Expansion::Expanded => write!(f, "expanded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("layout exceeded its {budget_ms} ms budget; {degraded} group(s) kept their previous order")]
    Timeout { budget_ms: u64, degraded: usize },

    #[error("layout cancelled")]
    Cancelled,

    #[error("scene refers to unknown node {0}")]
    UnknownNode(SymbolId),
}

// ─── Cancellation ───────────────────────────────────────────────

/// Checked between groups.
pub trait Cancellation {
    fn is_cancelled(&self) -> bool;
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Cancellation for CancelToken {
    fn is_cancelled(&self) -> bool {
        CancelToken::is_cancelled(self)
    }
}

pub struct NeverCancel;

impl Cancellation for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

// ─── Scene ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneNode {
    pub label: String,
    pub parent: GroupKey,
    pub expansion: Expansion,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SceneEdge {
    pub id: String,
    pub source: SymbolId,
    pub target: SymbolId,
}

/// A reference edge with a visible source and no target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneStub {
    pub id: String,
    pub source: SymbolId,
}

/// The visible containment tree plus the reference edges between visible
/// nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scene {
    pub nodes: BTreeMap<SymbolId, SceneNode>,
    /// An expanded node owns a group even when nothing inside it is visible.
    pub groups: BTreeMap<GroupKey, Vec<SymbolId>>,
    pub edges: Vec<SceneEdge>,
    /// Dangling edges. They never affect layering.
    pub stubs: Vec<SceneStub>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(
        &mut self,
        id: SymbolId,
        label: impl Into<String>,
        parent: GroupKey,
        expansion: Expansion,
    ) {
        self.groups
            .entry(parent.clone())
            .or_default()
            .push(id.clone());
        if expansion.is_expanded() {
            self.groups.entry(Some(id.clone())).or_default();
        }
        self.nodes.insert(
            id,
            SceneNode {
                label: label.into(),
                parent,
                expansion,
            },
        );
    }

    pub fn add_edge(&mut self, id: impl Into<String>, source: SymbolId, target: SymbolId) {
        self.edges.push(SceneEdge {
            id: id.into(),
            source,
            target,
        });
    }

    pub fn add_stub(&mut self, id: impl Into<String>, source: SymbolId) {
        self.stubs.push(SceneStub { id: id.into(), source });
    }

    /// `id` followed by its visible containers, innermost first.
    fn chain(&self, id: &SymbolId) -> Vec<SymbolId> {
        let mut chain = vec![id.clone()];
        let mut current = self.nodes.get(id).and_then(|n| n.parent.clone());
        while let Some(parent) = current {
            if chain.contains(&parent) {
                break;
            }
            current = self.nodes.get(&parent).and_then(|n| n.parent.clone());
            chain.push(parent);
        }
        chain
    }

    fn group_depth(&self, key: &GroupKey) -> usize {
        match key {
            None => 0,
            Some(id) => self.chain(id).len(),
        }
    }

    /// The innermost group holding both ends, with each end lifted to its
    /// member of that group. Lifted ends are equal when one end contains the
    /// other.
    pub fn lift(&self, source: &SymbolId, target: &SymbolId) -> Option<(GroupKey, SymbolId, SymbolId)> {
        let target_chain = self.chain(target);
        let by_group: BTreeMap<&GroupKey, &SymbolId> = target_chain
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|n| (&n.parent, id)))
            .collect();
        for a in self.chain(source) {
            let key = &self.nodes.get(&a)?.parent;
            if let Some(b) = by_group.get(key) {
                return Some((key.clone(), a.clone(), (*b).clone()));
            }
        }
        None
    }

    fn validate(&self) -> Result<(), LayoutError> {
        let known = |id: &SymbolId| {
            if self.nodes.contains_key(id) {
                Ok(())
            } else {
                Err(LayoutError::UnknownNode(id.clone()))
            }
        };
        for (key, members) in &self.groups {
            if let Some(container) = key {
                known(container)?;
            }
            for member in members {
                known(member)?;
            }
        }
        for edge in &self.edges {
            known(&edge.source)?;
            known(&edge.target)?;
        }
        for stub in &self.stubs {
            known(&stub.source)?;
        }
        Ok(())
    }
}

// ─── Layout State ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct GroupLayout {
    /// Identity order; indices below refer to this list.
    members: Vec<SymbolId>,
    internal: Vec<(usize, usize)>,
    layers: Vec<Vec<usize>>,
    /// Offsets from the group's content origin.
    offsets: Vec<Point>,
    layer_of: Vec<usize>,
    /// Top and bottom of every layer.
    bands: Vec<(f32, f32)>,
    size: Size,
}

impl GroupLayout {
    fn index_of(&self, id: &SymbolId) -> Option<usize> {
        self.members.binary_search(id).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutNode {
    pub id: SymbolId,
    pub bounds: Bounds,
    pub expansion: Expansion,
    pub group: GroupKey,
}

/// Everything the engine remembers between passes. Persistable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutState {
    expansion: BTreeMap<SymbolId, Expansion>,
    groups: BTreeMap<GroupKey, GroupLayout>,
    nodes: BTreeMap<SymbolId, LayoutNode>,
    routes: BTreeMap<String, Vec<Point>>,
    edges: BTreeSet<SceneEdge>,
    revision: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutOutcome {
    pub revision: u64,
    pub groups: usize,
    /// Groups re-layered and re-ordered in this pass.
    pub reordered: usize,
    pub full_relayout: bool,
    /// Adjacent-layer crossings left in the re-ordered groups.
    pub crossings: usize,
}

// ─── Engine ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LayoutEngine {
    config: LayoutConfig,
    state: LayoutState,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            state: LayoutState::default(),
        }
    }

    /// Resume from persisted state.
    pub fn with_state(config: LayoutConfig, state: LayoutState) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn state(&self) -> &LayoutState {
        &self.state
    }

    pub fn revision(&self) -> u64 {
        self.state.revision
    }

    // ─── Expansion ──────────────────────────────────────────────

    /// Expansion state of a node at containment `depth`. Nodes never toggled
    /// follow `initial_expand_depth`.
    pub fn expansion(&self, id: &SymbolId, depth: usize) -> Expansion {
        match self.state.expansion.get(id) {
            Some(e) => *e,
            None if depth < self.config.initial_expand_depth => Expansion::Expanded,
            None => Expansion::Collapsed,
        }
    }

    /// Returns whether the effective state changed.
    pub fn set_expansion(&mut self, id: &SymbolId, depth: usize, expansion: Expansion) -> bool {
        let changed = self.expansion(id, depth) != expansion;
        self.state.expansion.insert(id.clone(), expansion);
        changed
    }

    /// Forget expansion state for identities that no longer exist.
    pub fn retain_expansion(&mut self, keep: impl Fn(&SymbolId) -> bool) {
        self.state.expansion.retain(|id, _| keep(id));
    }

    // ─── Results ────────────────────────────────────────────────

    pub fn node(&self, id: &SymbolId) -> Option<&LayoutNode> {
        self.state.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &LayoutNode> {
        self.state.nodes.values()
    }

    pub fn route(&self, edge_id: &str) -> Option<&[Point]> {
        self.state.routes.get(edge_id).map(Vec::as_slice)
    }

    /// Bounds covering every placed node.
    pub fn extent(&self) -> Bounds {
        self.state
            .nodes
            .values()
            .map(|n| n.bounds)
            .reduce(Bounds::merge)
            .unwrap_or_default()
    }

    // ─── Layout ─────────────────────────────────────────────────

    /// Lay out `scene`, reusing as much of the previous pass as possible.
    pub fn layout(&mut self, scene: &Scene, cancel: &dyn Cancellation) -> Result<LayoutOutcome, LayoutError> {
        let deadline = (self.config.budget_ms > 0)
            .then(|| Instant::now() + Duration::from_millis(self.config.budget_ms));
        self.layout_until(scene, cancel, deadline)
    }

    pub(crate) fn layout_until(
        &mut self,
        scene: &Scene,
        cancel: &dyn Cancellation,
        deadline: Option<Instant>,
    ) -> Result<LayoutOutcome, LayoutError> {
        scene.validate()?;

        let inputs = group_inputs(scene);
        let edges: BTreeSet<SceneEdge> = scene.edges.iter().cloned().collect();
        let (dirty, full) = self.dirty_groups(scene, &inputs, &edges);

        // innermost groups first
        let mut order: Vec<&GroupKey> = inputs.keys().collect();
        order.sort_by_key(|k| std::cmp::Reverse(scene.group_depth(k)));

        let mut built: BTreeMap<GroupKey, GroupLayout> = BTreeMap::new();
        let mut sizes: BTreeMap<SymbolId, Size> = BTreeMap::new();
        let (mut reordered, mut degraded, mut crossings) = (0, 0, 0);

        for key in &order {
            if cancel.is_cancelled() {
                debug!(revision = self.state.revision, "layout pass cancelled");
                return Err(LayoutError::Cancelled);
            }
            let Some((members, internal)) = inputs.get(*key) else {
                continue;
            };
            let cached = self.state.groups.get(*key);

            let layers = if dirty.contains(*key) {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    degraded += 1;
                    last_known_layers(cached, members)
                } else {
                    reordered += 1;
                    let layering = layering::layer(members.len(), internal, self.config.ordering_sweeps);
                    crossings += layering::crossings(&layering.layers, internal);
                    layering.layers
                }
            } else {
                last_known_layers(cached, members)
            };

            let member_sizes: Vec<Size> = members
                .iter()
                .map(|id| match scene.nodes.get(id) {
                    Some(node) => self.node_size(node, built.get(&Some(id.clone()))),
                    None => self.leaf_size(""),
                })
                .collect();
            for (id, size) in members.iter().zip(&member_sizes) {
                sizes.insert(id.clone(), *size);
            }
            let group = self.place(members.clone(), internal.clone(), layers, &member_sizes);
            built.insert((*key).clone(), group);
        }

        let (nodes, origins) = self.absolute(scene, &order, &built, &sizes);
        let routes = self.routes(scene, &nodes, &built, &origins);

        self.state.groups = built;
        self.state.nodes = nodes;
        self.state.routes = routes;
        self.state.edges = edges;
        self.state.revision += 1;

        let outcome = LayoutOutcome {
            revision: self.state.revision,
            groups: order.len(),
            reordered,
            full_relayout: full,
            crossings,
        };
        debug!(
            revision = outcome.revision,
            groups = outcome.groups,
            reordered = outcome.reordered,
            full = outcome.full_relayout,
            crossings = outcome.crossings,
            "layout pass complete"
        );

        if degraded > 0 {
            warn!(degraded, budget_ms = self.config.budget_ms, "layout budget exceeded");
            return Err(LayoutError::Timeout {
                budget_ms: self.config.budget_ms,
                degraded,
            });
        }
        Ok(outcome)
    }

    fn dirty_groups(
        &self,
        scene: &Scene,
        inputs: &BTreeMap<GroupKey, (Vec<SymbolId>, Vec<(usize, usize)>)>,
        edges: &BTreeSet<SceneEdge>,
    ) -> (BTreeSet<GroupKey>, bool) {
        let parent = |id: &SymbolId| scene.nodes.get(id).map(|n| n.parent.clone());

        let mut dirty: BTreeSet<GroupKey> = inputs
            .iter()
            .filter(|(key, (members, internal))| match self.state.groups.get(*key) {
                Some(cached) => &cached.members != members || &cached.internal != internal,
                None => true,
            })
            .map(|(key, _)| key.clone())
            .collect();

        for edge in edges.symmetric_difference(&self.state.edges) {
            dirty.extend(parent(&edge.source));
            dirty.extend(parent(&edge.target));
        }

        let seeds = dirty.clone();
        for edge in edges {
            let (Some(ps), Some(pt)) = (parent(&edge.source), parent(&edge.target)) else {
                continue;
            };
            if seeds.contains(&ps) {
                dirty.insert(pt.clone());
            }
            if seeds.contains(&pt) {
                dirty.insert(ps);
            }
        }
        dirty.retain(|k| inputs.contains_key(k));

        let total = inputs.len();
        let full = total > 0 && dirty.len() as f32 > self.config.full_relayout_ratio * total as f32;
        if full {
            dirty = inputs.keys().cloned().collect();
        }
        (dirty, full)
    }

    fn insets(&self) -> Insets {
        let p = self.config.container_padding;
        Insets::new(self.config.header_height + p, p, p, p)
    }

    fn leaf_size(&self, label: &str) -> Size {
        let c = &self.config;
        let width = label.chars().count() as f32 * c.char_width + 2.0 * c.container_padding;
        Size::new(width.max(c.min_node_width), c.node_height)
    }

    fn node_size(&self, node: &SceneNode, own_group: Option<&GroupLayout>) -> Size {
        let leaf = self.leaf_size(&node.label);
        match (node.expansion, own_group) {
            (Expansion::Expanded, Some(group)) => group.size.add_padding(self.insets()).max(leaf),
            _ => leaf,
        }
    }

    /// Stack layers top to bottom, each centred horizontally.
    fn place(
        &self,
        members: Vec<SymbolId>,
        internal: Vec<(usize, usize)>,
        layers: Vec<Vec<usize>>,
        sizes: &[Size],
    ) -> GroupLayout {
        let h = self.config.horizontal_spacing;
        let v = self.config.vertical_spacing;

        let widths: Vec<f32> = layers
            .iter()
            .map(|layer| {
                layer.iter().map(|&i| sizes[i].width).sum::<f32>()
                    + h * layer.len().saturating_sub(1) as f32
            })
            .collect();
        let content_width = widths.iter().copied().fold(0.0, f32::max);

        let mut offsets = vec![Point::default(); members.len()];
        let mut layer_of = vec![0; members.len()];
        let mut bands = Vec::with_capacity(layers.len());
        let mut y = 0.0;
        for (l, layer) in layers.iter().enumerate() {
            let height = layer.iter().map(|&i| sizes[i].height).fold(0.0, f32::max);
            let mut x = (content_width - widths[l]) / 2.0;
            for &i in layer {
                offsets[i] = Point::new(x, y);
                layer_of[i] = l;
                x += sizes[i].width + h;
            }
            bands.push((y, y + height));
            y += height + v;
        }
        let content_height = if layers.is_empty() { 0.0 } else { y - v };

        GroupLayout {
            members,
            internal,
            layers,
            offsets,
            layer_of,
            bands,
            size: Size::new(content_width, content_height),
        }
    }

    /// Absolute node bounds, outermost groups first.
    fn absolute(
        &self,
        scene: &Scene,
        order: &[&GroupKey],
        built: &BTreeMap<GroupKey, GroupLayout>,
        sizes: &BTreeMap<SymbolId, Size>,
    ) -> (BTreeMap<SymbolId, LayoutNode>, BTreeMap<GroupKey, Point>) {
        let insets = self.insets();
        let mut nodes: BTreeMap<SymbolId, LayoutNode> = BTreeMap::new();
        let mut origins: BTreeMap<GroupKey, Point> = BTreeMap::new();

        for key in order.iter().rev() {
            let origin = match key {
                None => Point::default(),
                Some(id) => match nodes.get(id) {
                    Some(n) => n.bounds.origin.add_point(Point::new(insets.left, insets.top)),
                    None => continue,
                },
            };
            let Some(group) = built.get(*key) else {
                continue;
            };
            origins.insert((*key).clone(), origin);
            for (i, id) in group.members.iter().enumerate() {
                let (Some(node), Some(size)) = (scene.nodes.get(id), sizes.get(id)) else {
                    continue;
                };
                nodes.insert(
                    id.clone(),
                    LayoutNode {
                        id: id.clone(),
                        bounds: Bounds::new(origin.add_point(group.offsets[i]), *size),
                        expansion: node.expansion,
                        group: (*key).clone(),
                    },
                );
            }
        }
        (nodes, origins)
    }

    fn routes(
        &self,
        scene: &Scene,
        nodes: &BTreeMap<SymbolId, LayoutNode>,
        built: &BTreeMap<GroupKey, GroupLayout>,
        origins: &BTreeMap<GroupKey, Point>,
    ) -> BTreeMap<String, Vec<Point>> {
        let mut routes = BTreeMap::new();
        for edge in &scene.edges {
            if edge.source == edge.target {
                continue;
            }
            let (Some(src), Some(tgt)) = (nodes.get(&edge.source), nodes.get(&edge.target)) else {
                continue;
            };
            let Some((key, a, b)) = scene.lift(&edge.source, &edge.target) else {
                continue;
            };

            let route = if a == b {
                // one end contains the other
                if a == edge.source {
                    routing::nested(src.bounds, tgt.bounds, self.config.header_height)
                } else {
                    let mut r = routing::nested(tgt.bounds, src.bounds, self.config.header_height);
                    r.reverse();
                    r
                }
            } else {
                let (Some(group), Some(origin)) = (built.get(&key), origins.get(&key)) else {
                    continue;
                };
                let (Some(ia), Some(ib)) = (group.index_of(&a), group.index_of(&b)) else {
                    continue;
                };
                let (la, lb) = (group.layer_of[ia], group.layer_of[ib]);
                let half = self.config.vertical_spacing / 2.0;
                let channel = Channel {
                    below_source: origin.y + group.bands[la].1 + half,
                    above_target: origin.y + group.bands[lb].0 - half,
                    side_x: origin.x + group.size.width + self.config.perimeter_margin,
                    downward: lb > la,
                };
                routing::orthogonal(src.bounds, tgt.bounds, channel)
            };
            routes.insert(edge.id.clone(), route);
        }
        for stub in &scene.stubs {
            if let Some(src) = nodes.get(&stub.source) {
                let route = routing::dangling(src.bounds, self.config.perimeter_margin);
                routes.insert(stub.id.clone(), route);
            }
        }
        routes
    }
}

/// Members in identity order and the reference edges lifted into each group.
fn group_inputs(scene: &Scene) -> BTreeMap<GroupKey, (Vec<SymbolId>, Vec<(usize, usize)>)> {
    let mut inputs: BTreeMap<GroupKey, (Vec<SymbolId>, Vec<(usize, usize)>)> = scene
        .groups
        .iter()
        .map(|(key, members)| {
            let mut members = members.clone();
            members.sort();
            members.dedup();
            (key.clone(), (members, Vec::new()))
        })
        .collect();

    for edge in &scene.edges {
        let Some((key, a, b)) = scene.lift(&edge.source, &edge.target) else {
            continue;
        };
        if a == b {
            continue;
        }
        if let Some((members, internal)) = inputs.get_mut(&key) {
            if let (Ok(ia), Ok(ib)) = (members.binary_search(&a), members.binary_search(&b)) {
                internal.push((ia, ib));
            }
        }
    }
    for (_, internal) in inputs.values_mut() {
        internal.sort();
        internal.dedup();
    }
    inputs
}

/// Previous layer order carried over to the current members: survivors keep
/// their slots, newcomers go to a trailing layer in identity order.
fn last_known_layers(cached: Option<&GroupLayout>, members: &[SymbolId]) -> Vec<Vec<usize>> {
    let Some(cached) = cached else {
        return if members.is_empty() {
            Vec::new()
        } else {
            vec![(0..members.len()).collect()]
        };
    };

    let mut placed = vec![false; members.len()];
    let mut layers: Vec<Vec<usize>> = cached
        .layers
        .iter()
        .map(|layer| {
            layer
                .iter()
                .filter_map(|&old| cached.members.get(old))
                .filter_map(|id| members.binary_search(id).ok())
                .inspect(|&i| placed[i] = true)
                .collect::<Vec<usize>>()
        })
        .filter(|layer| !layer.is_empty())
        .collect();

    let newcomers: Vec<usize> = (0..members.len()).filter(|&i| !placed[i]).collect();
    if !newcomers.is_empty() {
        layers.push(newcomers);
    }
    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::routing::is_orthogonal;

    fn sid(name: &str) -> SymbolId {
        SymbolId::new("m.rs", name)
    }

    fn config() -> LayoutConfig {
        LayoutConfig {
            budget_ms: 0,
            ..LayoutConfig::default()
        }
    }

    fn edge(scene: &mut Scene, a: &str, b: &str) {
        scene.add_edge(format!("{}->{}", a, b), sid(a), sid(b));
    }

    fn flat(names: &[&str], edges: &[(&str, &str)]) -> Scene {
        let mut scene = Scene::new();
        for n in names {
            scene.add_node(sid(n), *n, None, Expansion::Collapsed);
        }
        for (a, b) in edges {
            edge(&mut scene, a, b);
        }
        scene
    }

    /// m1 { a, b }, m2 { c, d }, m3, with a -> b and c -> d.
    fn nested_scene(extra_in_m1: bool) -> Scene {
        let mut scene = Scene::new();
        scene.add_node(sid("m1"), "m1", None, Expansion::Expanded);
        scene.add_node(sid("m2"), "m2", None, Expansion::Expanded);
        scene.add_node(sid("m3"), "m3", None, Expansion::Collapsed);
        for (n, parent) in [("a", "m1"), ("b", "m1"), ("c", "m2"), ("d", "m2")] {
            scene.add_node(sid(n), n, Some(sid(parent)), Expansion::Collapsed);
        }
        if extra_in_m1 {
            scene.add_node(sid("e"), "e", Some(sid("m1")), Expansion::Collapsed);
        }
        edge(&mut scene, "a", "b");
        edge(&mut scene, "c", "d");
        scene
    }

    fn y(engine: &LayoutEngine, name: &str) -> f32 {
        engine.node(&sid(name)).unwrap().bounds.origin.y
    }

    #[test]
    fn test_chain_stacks_layers() {
        let mut engine = LayoutEngine::new(config());
        let scene = flat(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let outcome = engine.layout(&scene, &NeverCancel).unwrap();

        assert_eq!(outcome.revision, 1);
        assert!(y(&engine, "a") < y(&engine, "b"));
        assert!(y(&engine, "b") < y(&engine, "c"));
        let route = engine.route("a->b").unwrap();
        assert!(is_orthogonal(route));
    }

    #[test]
    fn test_unconnected_nodes_share_a_layer() {
        let mut engine = LayoutEngine::new(config());
        engine.layout(&flat(&["a", "b"], &[]), &NeverCancel).unwrap();
        let a = engine.node(&sid("a")).unwrap().bounds;
        let b = engine.node(&sid("b")).unwrap().bounds;
        assert_eq!(a.min_y(), b.min_y());
        assert!(a.max_x() < b.min_x());
    }

    #[test]
    fn test_deterministic() {
        let scene = flat(
            &["a", "b", "c", "d", "e"],
            &[("a", "c"), ("b", "c"), ("c", "d"), ("d", "a"), ("e", "b")],
        );
        let mut first = LayoutEngine::new(config());
        let mut second = LayoutEngine::new(config());
        first.layout(&scene, &NeverCancel).unwrap();
        second.layout(&scene, &NeverCancel).unwrap();
        assert_eq!(first.state(), second.state());
    }

    #[test]
    fn test_children_inside_container() {
        let mut engine = LayoutEngine::new(config());
        engine.layout(&nested_scene(false), &NeverCancel).unwrap();

        let m1 = engine.node(&sid("m1")).unwrap().bounds;
        for child in ["a", "b"] {
            let bounds = engine.node(&sid(child)).unwrap().bounds;
            assert!(m1.contains(bounds), "{} escapes its container", child);
        }
        let m2 = engine.node(&sid("m2")).unwrap().bounds;
        assert!(!m1.overlaps(m2));
        assert!(is_orthogonal(engine.route("a->b").unwrap()));
    }

    #[test]
    fn test_cross_group_route() {
        let mut scene = nested_scene(false);
        edge(&mut scene, "b", "c");
        let mut engine = LayoutEngine::new(config());
        engine.layout(&scene, &NeverCancel).unwrap();

        // the lifted edge m1 -> m2 puts m2 below m1
        assert!(y(&engine, "m1") < y(&engine, "m2"));
        let route = engine.route("b->c").unwrap();
        assert!(is_orthogonal(route));
        let b = engine.node(&sid("b")).unwrap().bounds;
        let c = engine.node(&sid("c")).unwrap().bounds;
        assert_eq!(route.first(), Some(&b.bottom_center()));
        assert_eq!(route.last(), Some(&c.top_center()));
    }

    #[test]
    fn test_stub_routed_without_moving_nodes() {
        let mut plain = LayoutEngine::new(config());
        plain.layout(&flat(&["a", "b"], &[("a", "b")]), &NeverCancel).unwrap();

        let mut scene = flat(&["a", "b"], &[("a", "b")]);
        scene.add_stub("a->?missing", sid("a"));
        let mut engine = LayoutEngine::new(config());
        engine.layout(&scene, &NeverCancel).unwrap();

        assert_eq!(engine.node(&sid("a")), plain.node(&sid("a")));
        assert_eq!(engine.node(&sid("b")), plain.node(&sid("b")));
        let stub = engine.route("a->?missing").unwrap();
        let a = engine.node(&sid("a")).unwrap().bounds;
        assert_eq!(stub.len(), 2);
        assert_eq!(stub[0].x, a.max_x());
        assert!(is_orthogonal(stub));
    }

    #[test]
    fn test_stub_from_unknown_node_rejected() {
        let mut scene = flat(&["a"], &[]);
        scene.add_stub("x->?y", sid("x"));
        let mut engine = LayoutEngine::new(config());
        assert!(matches!(
            engine.layout(&scene, &NeverCancel),
            Err(LayoutError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_incremental_reorders_only_dirty_group() {
        let mut engine = LayoutEngine::new(config());
        let first = engine.layout(&nested_scene(false), &NeverCancel).unwrap();
        assert!(first.full_relayout);

        let m2 = engine.node(&sid("m2")).unwrap().bounds.origin;
        let c = engine.node(&sid("c")).unwrap().bounds.origin;

        let second = engine.layout(&nested_scene(true), &NeverCancel).unwrap();
        assert!(!second.full_relayout);
        assert_eq!(second.reordered, 1);
        assert_eq!(second.groups, 3);

        // m2's interior only moved with its container
        let m2_after = engine.node(&sid("m2")).unwrap().bounds.origin;
        let c_after = engine.node(&sid("c")).unwrap().bounds.origin;
        assert_eq!(c.sub_point(m2), c_after.sub_point(m2_after));
        assert!(engine.node(&sid("e")).is_some());
    }

    #[test]
    fn test_full_relayout_past_ratio() {
        let mut engine = LayoutEngine::new(LayoutConfig {
            full_relayout_ratio: 0.0,
            ..config()
        });
        engine.layout(&nested_scene(false), &NeverCancel).unwrap();
        let outcome = engine.layout(&nested_scene(true), &NeverCancel).unwrap();
        assert!(outcome.full_relayout);
        assert_eq!(outcome.reordered, outcome.groups);
    }

    #[test]
    fn test_unchanged_scene_reorders_nothing() {
        let mut engine = LayoutEngine::new(config());
        engine.layout(&nested_scene(false), &NeverCancel).unwrap();
        let before = engine.state().nodes.clone();
        let outcome = engine.layout(&nested_scene(false), &NeverCancel).unwrap();
        assert_eq!(outcome.reordered, 0);
        assert_eq!(engine.state().nodes, before);
    }

    #[test]
    fn test_collapse_then_expand_restores_children() {
        let mut engine = LayoutEngine::new(config());
        engine.layout(&nested_scene(false), &NeverCancel).unwrap();
        let a = engine.node(&sid("a")).unwrap().clone();

        let mut collapsed = Scene::new();
        collapsed.add_node(sid("m1"), "m1", None, Expansion::Collapsed);
        collapsed.add_node(sid("m2"), "m2", None, Expansion::Expanded);
        collapsed.add_node(sid("m3"), "m3", None, Expansion::Collapsed);
        collapsed.add_node(sid("c"), "c", Some(sid("m2")), Expansion::Collapsed);
        collapsed.add_node(sid("d"), "d", Some(sid("m2")), Expansion::Collapsed);
        edge(&mut collapsed, "c", "d");
        engine.layout(&collapsed, &NeverCancel).unwrap();
        assert!(engine.node(&sid("a")).is_none());

        engine.layout(&nested_scene(false), &NeverCancel).unwrap();
        let restored = engine.node(&sid("a")).unwrap();
        assert_eq!(restored, &a);
        let children: Vec<&SymbolId> = engine
            .nodes()
            .filter(|n| n.group == Some(sid("m1")))
            .map(|n| &n.id)
            .collect();
        assert_eq!(children, vec![&sid("a"), &sid("b")]);
    }

    #[test]
    fn test_cancelled_pass_leaves_state_untouched() {
        let mut engine = LayoutEngine::new(config());
        engine.layout(&flat(&["a", "b"], &[("a", "b")]), &NeverCancel).unwrap();
        let before = engine.state().clone();

        let token = CancelToken::new();
        token.cancel();
        let result = engine.layout(&flat(&["a", "b", "c"], &[("b", "c")]), &token);
        assert_eq!(result, Err(LayoutError::Cancelled));
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn test_timeout_keeps_last_known_order() {
        let mut engine = LayoutEngine::new(config());
        engine
            .layout(&flat(&["a", "b", "c"], &[("a", "b")]), &NeverCancel)
            .unwrap();
        let before: Vec<Vec<usize>> = engine.state().groups[&None].layers.clone();

        // the new edge would push c below b, but the budget is already spent
        let scene = flat(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let result = engine.layout_until(&scene, &NeverCancel, Some(Instant::now()));
        assert_eq!(
            result,
            Err(LayoutError::Timeout {
                budget_ms: 0,
                degraded: 1
            })
        );
        assert_eq!(engine.state().groups[&None].layers, before);
        assert_eq!(engine.revision(), 2);
        assert!(engine.route("b->c").is_some());
    }

    #[test]
    fn test_unknown_node_rejected() {
        let mut engine = LayoutEngine::new(config());
        let mut scene = flat(&["a"], &[]);
        edge(&mut scene, "a", "ghost");
        assert_eq!(
            engine.layout(&scene, &NeverCancel),
            Err(LayoutError::UnknownNode(sid("ghost")))
        );
    }

    #[test]
    fn test_expansion_state_machine() {
        let mut engine = LayoutEngine::new(LayoutConfig {
            initial_expand_depth: 1,
            ..config()
        });
        let m = sid("m");
        assert_eq!(engine.expansion(&m, 0), Expansion::Expanded);
        assert_eq!(engine.expansion(&sid("f"), 1), Expansion::Collapsed);

        assert!(engine.set_expansion(&m, 0, Expansion::Collapsed));
        assert!(!engine.set_expansion(&m, 0, Expansion::Collapsed));
        assert!(engine.set_expansion(&m, 0, Expansion::Expanded));

        engine.retain_expansion(|id| id != &m);
        assert_eq!(engine.expansion(&m, 0), Expansion::Expanded);
    }

    #[test]
    fn test_container_to_child_route() {
        let mut scene = Scene::new();
        scene.add_node(sid("m"), "m", None, Expansion::Expanded);
        scene.add_node(sid("f"), "f", Some(sid("m")), Expansion::Collapsed);
        edge(&mut scene, "m", "f");
        let mut engine = LayoutEngine::new(config());
        engine.layout(&scene, &NeverCancel).unwrap();
        let route = engine.route("m->f").unwrap();
        assert!(is_orthogonal(route));
        assert_eq!(route.last(), Some(&engine.node(&sid("f")).unwrap().bounds.top_center()));
    }
}
