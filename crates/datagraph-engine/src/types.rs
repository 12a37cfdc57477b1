//! Core types for workflow graphs
//!
//! These types define the persisted structure of a graph: nodes, edges,
//! ports and node categories, plus the per-node execution status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::settings::NodeSettings;

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// Execution status of a node instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not run since the last invalidation
    #[default]
    Idle,
    /// `execute` is in flight
    Executing,
    /// Finished; outputs are cached
    Success,
    /// Failed; carries a message
    Error,
    /// Finished with a warning; outputs are cached
    Warning,
    /// Transient state while being invalidated
    Reset,
}

impl NodeStatus {
    /// Whether the node holds outputs downstream nodes may consume
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Success | Self::Warning)
    }
}

/// Category of a node kind, used for palette grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Nodes that create tables from settings
    Source,
    /// Filters, joins, cleaning
    Manipulation,
    /// Statistical summaries
    Statistics,
    /// Scoring and ranking
    Scoring,
    /// Chart builders
    Visualization,
}

impl NodeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Manipulation => "manipulation",
            Self::Statistics => "statistics",
            Self::Scoring => "scoring",
            Self::Visualization => "visualization",
        }
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "source" => Ok(Self::Source),
            "manipulation" => Ok(Self::Manipulation),
            "statistics" => Ok(Self::Statistics),
            "scoring" => Ok(Self::Scoring),
            "visualization" => Ok(Self::Visualization),
            other => Err(format!("Unknown node category '{}'", other)),
        }
    }
}

/// Metadata for a port (input or output)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMetadata {
    /// Human-readable label
    pub label: String,
    /// What the port carries
    pub description: String,
}

impl PortMetadata {
    pub fn new(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
        }
    }
}

/// An edge from one node's output port to another node's input port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// Unique identifier for this edge
    pub id: EdgeId,
    /// Source node ID
    pub source: NodeId,
    /// Source output port index
    pub source_port: usize,
    /// Target node ID
    pub target: NodeId,
    /// Target input port index
    pub target_port: usize,
}

impl GraphEdge {
    pub fn new(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        source_port: usize,
        target: impl Into<NodeId>,
        target_port: usize,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            source_port,
            target: target.into(),
            target_port,
        }
    }

    /// Whether this edge starts or ends at `node_id`
    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// A node instance in a graph snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Unique identifier for this node instance
    pub id: NodeId,
    /// Node kind (references a registered factory)
    pub node_type: String,
    /// Display label; defaults to the id
    #[serde(default)]
    pub label: String,
    /// Persisted configuration
    #[serde(default)]
    pub settings: NodeSettings,
}

/// A complete workflow graph snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    /// Unique identifier for this graph
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Nodes in insertion order
    pub nodes: Vec<GraphNode>,
    /// Edges connecting nodes
    pub edges: Vec<GraphEdge>,
}

impl WorkflowGraph {
    /// Create a new empty graph
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Get edges coming into a node
    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |e| e.target == node_id)
    }

    /// Get edges going out of a node
    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == node_id)
    }
}
