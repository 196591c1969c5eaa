//! Layer assignment and in-layer ordering for one group.
//!
//! Members are indexed `0..n` in identity order, which is also the final
//! tie-break everywhere. Cycles are broken with the greedy feedback arc set
//! heuristic (Eades, Lin and Smyth); layers come from the longest path over
//! the resulting DAG; ordering uses alternating barycenter sweeps.

use std::cmp::Ordering;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

/// Layers of member indices, top to bottom, each in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layering {
    pub layers: Vec<Vec<usize>>,
    /// Edges reversed to break cycles.
    pub reversed: usize,
}

/// Assign `n` members to ordered layers given directed member edges.
pub fn layer(n: usize, edges: &[(usize, usize)], sweeps: usize) -> Layering {
    if n == 0 {
        return Layering {
            layers: Vec::new(),
            reversed: 0,
        };
    }

    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(n, edges.len());
    let nodes: Vec<NodeIndex> = (0..n).map(|i| graph.add_node(i)).collect();
    let mut seen = std::collections::BTreeSet::new();
    for &(a, b) in edges {
        if a != b && a < n && b < n && seen.insert((a, b)) {
            graph.add_edge(nodes[a], nodes[b], ());
        }
    }

    let sequence = feedback_sequence(&graph);
    let mut position = vec![0; n];
    for (p, &v) in sequence.iter().enumerate() {
        position[v] = p;
    }

    // orient every edge forward along the sequence
    let mut dag: Vec<(usize, usize)> = Vec::with_capacity(seen.len());
    let mut reversed = 0;
    for &(a, b) in &seen {
        if position[a] < position[b] {
            dag.push((a, b));
        } else {
            dag.push((b, a));
            reversed += 1;
        }
    }
    dag.sort();
    dag.dedup();

    let rank = longest_path(n, &sequence, &dag);
    let depth = rank.iter().copied().max().unwrap_or(0) + 1;
    let mut layers: Vec<Vec<usize>> = vec![Vec::new(); depth];
    for v in 0..n {
        layers[rank[v]].push(v);
    }

    order_layers(&mut layers, &rank, &dag, sweeps);
    Layering { layers, reversed }
}

/// Vertex sequence whose backward edges form a small feedback arc set.
fn feedback_sequence(graph: &DiGraph<usize, ()>) -> Vec<usize> {
    let n = graph.node_count();
    let mut removed = vec![false; n];
    let mut indeg: Vec<usize> = graph
        .node_indices()
        .map(|v| graph.neighbors_directed(v, Direction::Incoming).count())
        .collect();
    let mut outdeg: Vec<usize> = graph
        .node_indices()
        .map(|v| graph.neighbors_directed(v, Direction::Outgoing).count())
        .collect();

    let mut head: Vec<usize> = Vec::with_capacity(n);
    let mut tail: Vec<usize> = Vec::new();
    let mut remaining = n;

    let take = |v: usize, removed: &mut Vec<bool>, indeg: &mut Vec<usize>, outdeg: &mut Vec<usize>| {
        removed[v] = true;
        let idx = NodeIndex::new(v);
        for w in graph.neighbors_directed(idx, Direction::Outgoing) {
            indeg[w.index()] = indeg[w.index()].saturating_sub(1);
        }
        for w in graph.neighbors_directed(idx, Direction::Incoming) {
            outdeg[w.index()] = outdeg[w.index()].saturating_sub(1);
        }
    };

    while remaining > 0 {
        let mut progressed = true;
        while progressed {
            progressed = false;
            if let Some(v) = (0..n).find(|&v| !removed[v] && outdeg[v] == 0) {
                take(v, &mut removed, &mut indeg, &mut outdeg);
                tail.push(v);
                remaining -= 1;
                progressed = true;
            } else if let Some(v) = (0..n).find(|&v| !removed[v] && indeg[v] == 0) {
                take(v, &mut removed, &mut indeg, &mut outdeg);
                head.push(v);
                remaining -= 1;
                progressed = true;
            }
        }
        if remaining == 0 {
            break;
        }
        let pick = (0..n)
            .filter(|&v| !removed[v])
            .max_by(|&a, &b| {
                let da = outdeg[a] as isize - indeg[a] as isize;
                let db = outdeg[b] as isize - indeg[b] as isize;
                da.cmp(&db).then(b.cmp(&a))
            });
        if let Some(v) = pick {
            take(v, &mut removed, &mut indeg, &mut outdeg);
            head.push(v);
            remaining -= 1;
        }
    }

    tail.reverse();
    head.extend(tail);
    head
}

/// Longest path from the sources, visiting vertices in a topological order.
fn longest_path(n: usize, order: &[usize], dag: &[(usize, usize)]) -> Vec<usize> {
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(a, b) in dag {
        preds[b].push(a);
    }
    let mut rank = vec![0usize; n];
    for &v in order {
        rank[v] = preds[v].iter().map(|&p| rank[p] + 1).max().unwrap_or(0);
    }
    rank
}

fn order_layers(layers: &mut [Vec<usize>], rank: &[usize], dag: &[(usize, usize)], sweeps: usize) {
    let n = rank.len();
    let mut neighbours: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(a, b) in dag {
        neighbours[a].push(b);
        neighbours[b].push(a);
    }

    for sweep in 0..sweeps {
        let downward = sweep % 2 == 0;
        let mut slot = vec![0usize; n];
        for layer in layers.iter() {
            for (i, &v) in layer.iter().enumerate() {
                slot[v] = i;
            }
        }

        let indices: Vec<usize> = if downward {
            (1..layers.len()).collect()
        } else {
            (0..layers.len().saturating_sub(1)).rev().collect()
        };
        for l in indices {
            let mut keyed: Vec<(f32, usize)> = layers[l]
                .iter()
                .map(|&v| {
                    let fixed: Vec<usize> = neighbours[v]
                        .iter()
                        .copied()
                        .filter(|&w| if downward { rank[w] < l } else { rank[w] > l })
                        .collect();
                    let bary = if fixed.is_empty() {
                        slot[v] as f32
                    } else {
                        fixed.iter().map(|&w| slot[w] as f32).sum::<f32>() / fixed.len() as f32
                    };
                    (bary, v)
                })
                .collect();
            keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            layers[l] = keyed.into_iter().map(|(_, v)| v).collect();
            for (i, &v) in layers[l].iter().enumerate() {
                slot[v] = i;
            }
        }
    }
}

/// Edge crossings between adjacent layers.
pub fn crossings(layers: &[Vec<usize>], edges: &[(usize, usize)]) -> usize {
    let mut rank = std::collections::HashMap::new();
    for (l, layer) in layers.iter().enumerate() {
        for (i, &v) in layer.iter().enumerate() {
            rank.insert(v, (l, i));
        }
    }
    let spans: Vec<((usize, usize), (usize, usize))> = edges
        .iter()
        .filter_map(|&(a, b)| {
            let (ra, rb) = (rank.get(&a)?, rank.get(&b)?);
            match ra.0.cmp(&rb.0) {
                Ordering::Less if rb.0 == ra.0 + 1 => Some((*ra, *rb)),
                Ordering::Greater if ra.0 == rb.0 + 1 => Some((*rb, *ra)),
                _ => None,
            }
        })
        .collect();

    let mut count = 0;
    for (i, (a1, b1)) in spans.iter().enumerate() {
        for (a2, b2) in &spans[i + 1..] {
            if a1.0 == a2.0 && ((a1.1 < a2.1 && b1.1 > b2.1) || (a1.1 > a2.1 && b1.1 < b2.1)) {
                count += 1;
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain() {
        let l = layer(3, &[(0, 1), (1, 2)], 4);
        assert_eq!(l.layers, vec![vec![0], vec![1], vec![2]]);
        assert_eq!(l.reversed, 0);
    }

    #[test]
    fn test_no_edges_single_layer_in_identity_order() {
        let l = layer(4, &[], 4);
        assert_eq!(l.layers, vec![vec![0, 1, 2, 3]]);
    }

    #[test]
    fn test_cycle_is_broken_once() {
        let l = layer(3, &[(0, 1), (1, 2), (2, 0)], 4);
        assert_eq!(l.reversed, 1);
        assert_eq!(l.layers.len(), 3);
        let placed: usize = l.layers.iter().map(Vec::len).sum();
        assert_eq!(placed, 3);
    }

    #[test]
    fn test_longest_path_pushes_down() {
        // 0 -> 1 -> 2 and 0 -> 2: 2 sits below 1, not beside it
        let l = layer(3, &[(0, 1), (1, 2), (0, 2)], 4);
        assert_eq!(l.layers, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_barycenter_uncrosses() {
        let edges = [(0, 3), (1, 2)];
        let unordered = layer(4, &edges, 0);
        assert_eq!(unordered.layers, vec![vec![0, 1], vec![2, 3]]);
        assert_eq!(crossings(&unordered.layers, &edges), 1);

        let ordered = layer(4, &edges, 4);
        assert_eq!(ordered.layers, vec![vec![0, 1], vec![3, 2]]);
        assert_eq!(crossings(&ordered.layers, &edges), 0);
    }

    #[test]
    fn test_deterministic() {
        let edges = [(0, 4), (4, 2), (2, 0), (1, 3), (3, 4), (5, 1)];
        assert_eq!(layer(6, &edges, 4), layer(6, &edges, 4));
    }

    #[test]
    fn test_self_loops_and_duplicates_ignored() {
        let l = layer(2, &[(0, 0), (0, 1), (0, 1)], 2);
        assert_eq!(l.layers, vec![vec![0], vec![1]]);
        assert_eq!(l.reversed, 0);
    }
}
