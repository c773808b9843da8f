use std::collections::{HashSet, VecDeque};

use crate::graph::{HierarchyDirection, HierarchyGraph, NodeId};

/// Inclusive hop bounds for a closure traversal. `max: None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopRange {
    pub min: u32,
    pub max: Option<u32>,
}

impl HopRange {
    /// Direct neighbors only (parents / children).
    pub const fn exactly_one() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Irreflexive transitive closure (ancestors / descendants).
    pub const fn strict() -> Self {
        Self { min: 1, max: None }
    }

    /// Reflexive transitive closure (flatten).
    pub const fn reflexive() -> Self {
        Self { min: 0, max: None }
    }

    fn allows_deeper(&self, depth: u32) -> bool {
        self.max.map_or(true, |max| depth < max)
    }
}

/// A node reached during closure traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reached {
    pub node_id: NodeId,
    /// Minimum number of `subClassOf` hops from the start node.
    pub distance: u32,
}

/// Result of a closure traversal.
#[derive(Debug)]
pub struct ClosureResult {
    /// Reached nodes in discovery order.
    pub nodes: Vec<Reached>,
    pub nodes_visited: usize,
}

impl ClosureResult {
    fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            nodes_visited: 0,
        }
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|r| r.node_id)
    }
}

/// BFS closure: every node reachable from `start` along `subClassOf` edges
/// in `direction` within `hops`.
///
/// Uses visited-set pruning: each node is emitted at most once, at its
/// minimum distance, so cyclic hierarchies terminate. With `hops.min == 0`
/// the start node is emitted first at distance 0. Otherwise the start node
/// only appears when a cycle leads back to it.
pub fn closure(
    graph: &HierarchyGraph,
    start: NodeId,
    direction: HierarchyDirection,
    hops: HopRange,
) -> ClosureResult {
    if graph.concept(start).is_none() {
        return ClosureResult::empty();
    }

    let mut emitted: HashSet<NodeId> = HashSet::new();
    let mut expanded: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<(NodeId, u32)> = VecDeque::new();
    let mut nodes = Vec::new();

    if hops.min == 0 {
        emitted.insert(start);
        nodes.push(Reached {
            node_id: start,
            distance: 0,
        });
    }
    expanded.insert(start);
    queue.push_back((start, 0));

    while let Some((current, depth)) = queue.pop_front() {
        if !hops.allows_deeper(depth) {
            continue;
        }

        for &next in graph.neighbors(current, direction) {
            let distance = depth + 1;
            if distance >= hops.min && emitted.insert(next) {
                nodes.push(Reached {
                    node_id: next,
                    distance,
                });
            }
            if expanded.insert(next) {
                queue.push_back((next, distance));
            }
        }
    }

    ClosureResult {
        nodes,
        nodes_visited: expanded.len(),
    }
}
