//! Connection legality and graph traversal
//!
//! [`try_connect`] decides whether a candidate edge may join the graph.
//! [`Adjacency`] is a precomputed index over the node order and edge set,
//! rebuilt after every structural edit, used for invalidation and scheduling.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::ConnectionError;
use crate::types::{GraphEdge, NodeId};

/// Validate `candidate` against `current` and return the new edge set.
///
/// With `replace`, an edge already feeding the candidate's target port is
/// dropped instead of rejecting the candidate. The input slice is never
/// modified; on error the caller's graph stays as it was.
pub fn try_connect(
    candidate: &GraphEdge,
    current: &[GraphEdge],
    replace: bool,
) -> Result<Vec<GraphEdge>, ConnectionError> {
    let occupied = current
        .iter()
        .any(|e| e.target == candidate.target && e.target_port == candidate.target_port);
    if occupied && !replace {
        return Err(ConnectionError::PortOccupied {
            node_id: candidate.target.clone(),
            port: candidate.target_port,
        });
    }

    let remaining: Vec<GraphEdge> = current
        .iter()
        .filter(|e| !(e.target == candidate.target && e.target_port == candidate.target_port))
        .cloned()
        .collect();

    if creates_cycle(&candidate.source, &candidate.target, &remaining) {
        return Err(ConnectionError::CycleDetected {
            source_id: candidate.source.clone(),
            target_id: candidate.target.clone(),
        });
    }

    let mut edges = remaining;
    edges.push(candidate.clone());
    Ok(edges)
}

/// Whether an edge `source -> target` would close a cycle over `edges`.
///
/// True when `source` is reachable from `target` (or they are the same node).
fn creates_cycle(source: &str, target: &str, edges: &[GraphEdge]) -> bool {
    if source == target {
        return true;
    }
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([target]);
    while let Some(current) = queue.pop_front() {
        if current == source {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        for edge in edges.iter().filter(|e| e.source == current) {
            queue.push_back(&edge.target);
        }
    }
    false
}

/// Precomputed successor/predecessor lists over a node order
#[derive(Debug, Clone, Default)]
pub struct Adjacency {
    order: Vec<NodeId>,
    index: HashMap<NodeId, usize>,
    successors: HashMap<NodeId, Vec<NodeId>>,
    predecessors: HashMap<NodeId, Vec<NodeId>>,
}

impl Adjacency {
    /// Build from nodes in insertion order and the edge set.
    ///
    /// Edges whose endpoints are not in `order` are ignored.
    pub fn build(order: &[NodeId], edges: &[GraphEdge]) -> Self {
        let index: HashMap<NodeId, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut predecessors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

        for edge in edges {
            if !index.contains_key(&edge.source) || !index.contains_key(&edge.target) {
                continue;
            }
            let succ = successors.entry(edge.source.clone()).or_default();
            if !succ.contains(&edge.target) {
                succ.push(edge.target.clone());
            }
            let pred = predecessors.entry(edge.target.clone()).or_default();
            if !pred.contains(&edge.source) {
                pred.push(edge.source.clone());
            }
        }

        Self {
            order: order.to_vec(),
            index,
            successors,
            predecessors,
        }
    }

    /// Direct downstream nodes
    pub fn successors(&self, node_id: &str) -> &[NodeId] {
        self.successors.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct upstream nodes
    pub fn predecessors(&self, node_id: &str) -> &[NodeId] {
        self.predecessors.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `start` followed by every node reachable via outgoing edges, breadth-first
    pub fn reachable_from(&self, start: &str) -> Vec<NodeId> {
        self.breadth_first(start, |id| self.successors(id))
    }

    /// Every node with a path into `target`, excluding `target` itself
    pub fn ancestors_of(&self, target: &str) -> HashSet<NodeId> {
        let mut ancestors: HashSet<NodeId> = self
            .breadth_first(target, |id| self.predecessors(id))
            .into_iter()
            .collect();
        ancestors.remove(target);
        ancestors
    }

    fn breadth_first<'a>(&'a self, start: &str, next: impl Fn(&str) -> &'a [NodeId]) -> Vec<NodeId> {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut result = Vec::new();
        let mut queue: VecDeque<NodeId> = VecDeque::from([start.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            for neighbor in next(&current) {
                if !visited.contains(neighbor) {
                    queue.push_back(neighbor.clone());
                }
            }
            result.push(current);
        }
        result
    }

    /// Kahn's algorithm over the nodes in `subset` (all nodes when `None`).
    ///
    /// Among nodes ready at the same time, the earliest inserted goes first,
    /// so the order is stable for a given graph. Edges leaving the subset are
    /// ignored.
    pub fn topological_order(&self, subset: Option<&HashSet<NodeId>>) -> Vec<NodeId> {
        let included = |id: &str| subset.map_or(true, |s| s.contains(id));

        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for id in self.order.iter().filter(|id| included(id)) {
            let degree = self
                .predecessors(id)
                .iter()
                .filter(|p| included(p))
                .count();
            in_degree.insert(id, degree);
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .filter_map(|(id, _)| self.index.get(*id).copied())
            .collect();

        let mut result = Vec::with_capacity(in_degree.len());
        while let Some(position) = ready.pop_first() {
            let node_id = &self.order[position];
            result.push(node_id.clone());
            for successor in self.successors(node_id) {
                if let Some(degree) = in_degree.get_mut(successor.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        if let Some(&i) = self.index.get(successor) {
                            ready.insert(i);
                        }
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(id: &str, source: &str, target: &str, target_port: usize) -> GraphEdge {
        GraphEdge::new(id, source, 0, target, target_port)
    }

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_connect_accepts_valid_edge() {
        let current = vec![edge("e1", "a", "b", 0)];
        let edges = try_connect(&edge("e2", "b", "c", 0), &current, false).unwrap();
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn test_connect_rejects_occupied_port() {
        let current = vec![edge("e1", "a", "c", 0)];
        let err = try_connect(&edge("e2", "b", "c", 0), &current, false).unwrap_err();
        assert_eq!(
            err,
            ConnectionError::PortOccupied {
                node_id: "c".into(),
                port: 0
            }
        );

        // A different input port on the same node is fine
        assert!(try_connect(&edge("e3", "b", "c", 1), &current, false).is_ok());
    }

    #[test]
    fn test_connect_replaces_when_asked() {
        let current = vec![edge("e1", "a", "c", 0)];
        let edges = try_connect(&edge("e2", "b", "c", 0), &current, true).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].id, "e2");
    }

    #[test]
    fn test_connect_rejects_cycle() {
        let current = vec![edge("e1", "a", "b", 0), edge("e2", "b", "c", 0)];
        let err = try_connect(&edge("e3", "c", "a", 0), &current, false).unwrap_err();
        assert!(matches!(err, ConnectionError::CycleDetected { .. }));

        let err = try_connect(&edge("e4", "a", "a", 1), &current, false).unwrap_err();
        assert!(matches!(err, ConnectionError::CycleDetected { .. }));
    }

    #[test]
    fn test_source_port_fans_out() {
        let current = vec![edge("e1", "a", "b", 0)];
        assert!(try_connect(&edge("e2", "a", "c", 0), &current, false).is_ok());
    }

    #[test]
    fn test_reachable_from_is_breadth_first() {
        let order = ids(&["a", "b", "c", "d", "e"]);
        let edges = vec![
            edge("e1", "a", "b", 0),
            edge("e2", "a", "c", 0),
            edge("e3", "b", "d", 0),
            edge("e4", "c", "d", 1),
        ];
        let adjacency = Adjacency::build(&order, &edges);
        assert_eq!(adjacency.reachable_from("a"), ids(&["a", "b", "c", "d"]));
        assert_eq!(adjacency.reachable_from("e"), ids(&["e"]));
    }

    #[test]
    fn test_ancestors_of() {
        let order = ids(&["a", "b", "c", "x"]);
        let edges = vec![edge("e1", "a", "b", 0), edge("e2", "b", "c", 0)];
        let adjacency = Adjacency::build(&order, &edges);
        let ancestors = adjacency.ancestors_of("c");
        assert_eq!(ancestors.len(), 2);
        assert!(ancestors.contains("a") && ancestors.contains("b"));
        assert!(adjacency.ancestors_of("a").is_empty());
    }

    #[test]
    fn test_topological_order_uses_insertion_tie_break() {
        // z and y are both sources; z was inserted first
        let order = ids(&["z", "y", "join"]);
        let edges = vec![edge("e1", "y", "join", 0), edge("e2", "z", "join", 1)];
        let adjacency = Adjacency::build(&order, &edges);
        assert_eq!(adjacency.topological_order(None), ids(&["z", "y", "join"]));
    }

    #[test]
    fn test_topological_order_respects_edges() {
        let order = ids(&["c", "b", "a"]);
        let edges = vec![edge("e1", "a", "b", 0), edge("e2", "b", "c", 0)];
        let adjacency = Adjacency::build(&order, &edges);
        assert_eq!(adjacency.topological_order(None), ids(&["a", "b", "c"]));
    }

    #[test]
    fn test_topological_order_restricted_to_subset() {
        let order = ids(&["a", "b", "c", "d"]);
        let edges = vec![edge("e1", "a", "c", 0), edge("e2", "b", "c", 1), edge("e3", "c", "d", 0)];
        let adjacency = Adjacency::build(&order, &edges);
        let subset: HashSet<NodeId> = ids(&["b", "c"]).into_iter().collect();
        assert_eq!(adjacency.topological_order(Some(&subset)), ids(&["b", "c"]));
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        const NODES: usize = 6;

        // (source, target, target port, replace) connect attempts
        fn attempts_strategy() -> impl Strategy<Value = Vec<(usize, usize, usize, bool)>> {
            proptest::collection::vec((0..NODES, 0..NODES, 0..2usize, any::<bool>()), 0..40)
        }

        proptest! {
            #[test]
            fn accepted_edges_stay_acyclic_with_single_predecessor(attempts in attempts_strategy()) {
                let order: Vec<NodeId> = (0..NODES).map(|i| format!("n{}", i)).collect();
                let mut edges: Vec<GraphEdge> = Vec::new();

                for (i, (source, target, port, replace)) in attempts.into_iter().enumerate() {
                    let candidate = GraphEdge::new(
                        format!("e{}", i),
                        order[source].clone(),
                        0,
                        order[target].clone(),
                        port,
                    );
                    if let Ok(next) = try_connect(&candidate, &edges, replace) {
                        edges = next;
                    }

                    let adjacency = Adjacency::build(&order, &edges);
                    prop_assert_eq!(adjacency.topological_order(None).len(), NODES);

                    let mut inputs = HashSet::new();
                    for edge in &edges {
                        prop_assert!(inputs.insert((edge.target.clone(), edge.target_port)));
                    }
                }
            }
        }
    }
}
