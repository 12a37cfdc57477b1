//! Graph snapshot validation
//!
//! Validates a persisted [`WorkflowGraph`] before the engine loads it:
//! edge references, port ranges, single predecessor per input, and cycles.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::registry::NodeRegistry;
use crate::types::WorkflowGraph;

/// Structural problem found in a graph snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    /// Cycle detected in the graph
    CycleDetected,
    /// Two nodes share an id
    DuplicateNodeId { node_id: String },
    /// A node has an unknown type (not in registry)
    UnknownNodeType { node_id: String, node_type: String },
    /// An edge references a non-existent node
    UnknownNode { edge_id: String, node_id: String },
    /// An edge references a port index the node does not have
    PortOutOfRange {
        edge_id: String,
        node_id: String,
        port: usize,
        count: usize,
    },
    /// More than one edge feeds the same input port
    InputPortOccupied { node_id: String, port: usize },
}

impl std::fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CycleDetected => write!(f, "Cycle detected in graph"),
            Self::DuplicateNodeId { node_id } => write!(f, "Duplicate node id '{}'", node_id),
            Self::UnknownNodeType { node_id, node_type } => {
                write!(f, "Unknown node type '{}' for node '{}'", node_type, node_id)
            }
            Self::UnknownNode { edge_id, node_id } => {
                write!(f, "Edge '{}' references unknown node '{}'", edge_id, node_id)
            }
            Self::PortOutOfRange {
                edge_id,
                node_id,
                port,
                count,
            } => write!(
                f,
                "Edge '{}' uses port {} of node '{}', which has {} ports",
                edge_id, port, node_id, count
            ),
            Self::InputPortOccupied { node_id, port } => write!(
                f,
                "Input port {} of node '{}' has more than one incoming edge",
                port, node_id
            ),
        }
    }
}

impl std::error::Error for GraphIssue {}

/// Validate a workflow graph snapshot
///
/// Returns all issues found (not just the first). Pass a registry to enable
/// node type and port range checks.
pub fn validate_workflow(graph: &WorkflowGraph, registry: Option<&NodeRegistry>) -> Vec<GraphIssue> {
    let mut issues = Vec::new();

    validate_node_ids(graph, &mut issues);
    validate_edge_references(graph, &mut issues);
    validate_single_predecessor(graph, &mut issues);
    detect_cycles(graph, &mut issues);

    if let Some(reg) = registry {
        validate_node_types(graph, reg, &mut issues);
        validate_port_ranges(graph, reg, &mut issues);
    }

    issues
}

fn validate_node_ids(graph: &WorkflowGraph, issues: &mut Vec<GraphIssue>) {
    let mut seen: HashSet<&str> = HashSet::new();
    for node in &graph.nodes {
        if !seen.insert(&node.id) {
            issues.push(GraphIssue::DuplicateNodeId {
                node_id: node.id.clone(),
            });
        }
    }
}

/// Check that all edge source/target nodes exist
fn validate_edge_references(graph: &WorkflowGraph, issues: &mut Vec<GraphIssue>) {
    let node_ids: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();

    for edge in &graph.edges {
        if !node_ids.contains(edge.source.as_str()) {
            issues.push(GraphIssue::UnknownNode {
                edge_id: edge.id.clone(),
                node_id: edge.source.clone(),
            });
        }
        if !node_ids.contains(edge.target.as_str()) {
            issues.push(GraphIssue::UnknownNode {
                edge_id: edge.id.clone(),
                node_id: edge.target.clone(),
            });
        }
    }
}

fn validate_single_predecessor(graph: &WorkflowGraph, issues: &mut Vec<GraphIssue>) {
    let mut seen: HashSet<(&str, usize)> = HashSet::new();
    for edge in &graph.edges {
        if !seen.insert((edge.target.as_str(), edge.target_port)) {
            issues.push(GraphIssue::InputPortOccupied {
                node_id: edge.target.clone(),
                port: edge.target_port,
            });
        }
    }
}

/// Detect cycles using Kahn's algorithm (topological sort)
fn detect_cycles(graph: &WorkflowGraph, issues: &mut Vec<GraphIssue>) {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    for node in &graph.nodes {
        in_degree.insert(&node.id, 0);
    }
    for edge in &graph.edges {
        *in_degree.entry(&edge.target).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0;
    while let Some(node_id) = queue.pop_front() {
        visited += 1;
        for edge in &graph.edges {
            if edge.source == node_id {
                if let Some(deg) = in_degree.get_mut(edge.target.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(&edge.target);
                    }
                }
            }
        }
    }

    if visited < in_degree.len() {
        issues.push(GraphIssue::CycleDetected);
    }
}

/// Check that all nodes have known types in the registry
fn validate_node_types(graph: &WorkflowGraph, registry: &NodeRegistry, issues: &mut Vec<GraphIssue>) {
    for node in &graph.nodes {
        if !registry.has_node_type(&node.node_type) {
            issues.push(GraphIssue::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            });
        }
    }
}

/// Check port indices against the declared port counts of each node kind
fn validate_port_ranges(graph: &WorkflowGraph, registry: &NodeRegistry, issues: &mut Vec<GraphIssue>) {
    let port_counts = |node_id: &str| {
        graph
            .find_node(node_id)
            .and_then(|n| registry.get_metadata(&n.node_type))
            .map(|m| (m.inputs.len(), m.outputs.len()))
    };

    for edge in &graph.edges {
        if let Some((_, outputs)) = port_counts(&edge.source) {
            if edge.source_port >= outputs {
                issues.push(GraphIssue::PortOutOfRange {
                    edge_id: edge.id.clone(),
                    node_id: edge.source.clone(),
                    port: edge.source_port,
                    count: outputs,
                });
            }
        }
        if let Some((inputs, _)) = port_counts(&edge.target) {
            if edge.target_port >= inputs {
                issues.push(GraphIssue::PortOutOfRange {
                    edge_id: edge.id.clone(),
                    node_id: edge.target.clone(),
                    port: edge.target_port,
                    count: inputs,
                });
            }
        }
    }
}
