//! Graph traversal algorithms
//!
//! Both walks are iterative and run over a snapshot of edges, so deep
//! graphs never grow the call stack and cycles are cut by the visited map.

use crate::entity::EntityId;
use crate::relationship::Relationship;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Result of a traversal operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalResult {
    /// Starting entity
    pub start: EntityId,

    /// Distinct entities reached, in discovery order
    pub visited: Vec<EntityId>,

    /// Statistics
    pub stats: TraversalStats,
}

impl TraversalResult {
    pub fn contains(&self, id: &EntityId) -> bool {
        self.visited.contains(id)
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}

/// Traversal statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraversalStats {
    pub nodes_visited: usize,
    pub nodes_expanded: usize,
    pub edges_traversed: usize,
    pub max_depth_reached: u32,
}

/// Graph traversal engine
pub struct TraversalEngine;

impl TraversalEngine {
    /// Depth-first walk along outgoing edges whose type is in `types`.
    ///
    /// At each node the types are expanded in the order given, and each
    /// branch is followed to the bottom before its siblings. The result holds
    /// `start` plus every node within `max_depth` hops, each exactly once;
    /// `max_depth == 0` yields only `start`. A node is expanded again only
    /// when it is reached through a strictly shorter path than before.
    pub fn depth_first(
        start: &EntityId,
        types: &[String],
        max_depth: u32,
        relations: &[Relationship],
    ) -> TraversalResult {
        let adjacency = Self::outgoing(relations, |rel| types.contains(&rel.relationship_type));
        let mut shallowest: HashMap<EntityId, u32> = HashMap::new();
        let mut visited = Vec::new();
        let mut stack: Vec<(EntityId, u32)> = vec![(start.clone(), 0)];
        let mut stats = TraversalStats::default();

        while let Some((current, depth)) = stack.pop() {
            match shallowest.get(&current) {
                Some(&seen) if seen <= depth => continue,
                Some(_) => {}
                None => {
                    visited.push(current.clone());
                    stats.nodes_visited += 1;
                }
            }
            shallowest.insert(current.clone(), depth);
            stats.nodes_expanded += 1;
            stats.max_depth_reached = stats.max_depth_reached.max(depth);

            if depth >= max_depth {
                continue;
            }

            let Some(edges) = adjacency.get(&current) else {
                continue;
            };

            let mut next = Vec::new();
            for relationship_type in types {
                for rel in edges
                    .iter()
                    .filter(|rel| rel.relationship_type == *relationship_type)
                {
                    stats.edges_traversed += 1;
                    next.push(rel.to_id.clone());
                }
            }

            // reversed so the first type's first edge is popped first
            for id in next.into_iter().rev() {
                if shallowest.get(&id).map_or(true, |&seen| seen > depth + 1) {
                    stack.push((id, depth + 1));
                }
            }
        }

        tracing::debug!(
            "Depth-first traversal from {} visited {} nodes, traversed {} edges",
            start,
            stats.nodes_visited,
            stats.edges_traversed
        );

        TraversalResult {
            start: start.clone(),
            visited,
            stats,
        }
    }

    /// Level-order walk along outgoing edges of a single type.
    ///
    /// `max_depth == None` walks until nothing new is reachable. The start
    /// node is not part of the result.
    pub fn breadth_first(
        start: &EntityId,
        relationship_type: &str,
        max_depth: Option<u32>,
        relations: &[Relationship],
    ) -> TraversalResult {
        let adjacency = Self::outgoing(relations, |rel| rel.relationship_type == relationship_type);
        let mut seen: HashSet<EntityId> = HashSet::new();
        let mut visited = Vec::new();
        let mut queue: VecDeque<(EntityId, u32)> = VecDeque::new();
        let mut stats = TraversalStats::default();

        seen.insert(start.clone());
        queue.push_back((start.clone(), 0));

        while let Some((current, depth)) = queue.pop_front() {
            stats.nodes_expanded += 1;
            stats.max_depth_reached = stats.max_depth_reached.max(depth);

            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }

            for rel in adjacency.get(&current).into_iter().flatten() {
                stats.edges_traversed += 1;
                if seen.insert(rel.to_id.clone()) {
                    visited.push(rel.to_id.clone());
                    stats.nodes_visited += 1;
                    queue.push_back((rel.to_id.clone(), depth + 1));
                }
            }
        }

        tracing::debug!(
            "Breadth-first '{}' traversal from {} reached {} nodes",
            relationship_type,
            start,
            stats.nodes_visited
        );

        TraversalResult {
            start: start.clone(),
            visited,
            stats,
        }
    }

    /// Live outgoing edges per source entity, restricted by `keep`
    fn outgoing<'a>(
        relations: &'a [Relationship],
        keep: impl Fn(&Relationship) -> bool,
    ) -> HashMap<&'a EntityId, Vec<&'a Relationship>> {
        let mut adjacency: HashMap<&EntityId, Vec<&Relationship>> = HashMap::new();
        for rel in relations.iter().filter(|rel| !rel.is_deleted() && keep(rel)) {
            adjacency.entry(&rel.from_id).or_default().push(rel);
        }
        adjacency
    }
}
