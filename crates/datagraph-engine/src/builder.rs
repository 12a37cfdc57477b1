//! Fluent builder for workflow graph snapshots
//!
//! Provides a compact API for constructing graphs programmatically, mostly
//! for tests and for hosts that generate workflows.

use crate::settings::NodeSettings;
use crate::types::{GraphEdge, GraphNode, WorkflowGraph};

/// Fluent builder for constructing workflow graph snapshots
///
/// # Example
///
/// ```ignore
/// let graph = WorkflowBuilder::new("wf-1", "My Workflow")
///     .add_node("people", "table-creator")
///     .with_settings(creator_settings)
///     .add_node("adults", "row-filter")
///     .add_edge("people", 0, "adults", 0)
///     .build();
/// ```
pub struct WorkflowBuilder {
    id: String,
    name: String,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    edge_counter: usize,
}

impl WorkflowBuilder {
    /// Create a new workflow builder
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            edge_counter: 0,
        }
    }

    /// Add a node to the graph; its label defaults to its id
    pub fn add_node(mut self, id: impl Into<String>, node_type: impl Into<String>) -> Self {
        let id = id.into();
        self.nodes.push(GraphNode {
            label: id.clone(),
            id,
            node_type: node_type.into(),
            settings: NodeSettings::new(),
        });
        self
    }

    /// Set settings on the most recently added node
    ///
    /// Must be called immediately after `add_node`.
    pub fn with_settings(mut self, settings: NodeSettings) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.settings = settings;
        }
        self
    }

    /// Set the label of the most recently added node
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.label = label.into();
        }
        self
    }

    /// Add an edge between two ports (auto-generates edge ID)
    pub fn add_edge(
        mut self,
        source: impl Into<String>,
        source_port: usize,
        target: impl Into<String>,
        target_port: usize,
    ) -> Self {
        self.edge_counter += 1;
        let id = format!("edge-{}", self.edge_counter);
        self.edges
            .push(GraphEdge::new(id, source, source_port, target, target_port));
        self
    }

    /// Build the graph without validation
    pub fn build(self) -> WorkflowGraph {
        let mut graph = WorkflowGraph::new(self.id, self.name);
        graph.nodes = self.nodes;
        graph.edges = self.edges;
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_workflow() {
        let graph = WorkflowBuilder::new("wf-1", "Test Workflow")
            .add_node("a", "table-creator")
            .with_settings(NodeSettings::new().with("rows", serde_json::json!([])))
            .with_label("People")
            .add_node("b", "row-filter")
            .add_edge("a", 0, "b", 0)
            .build();

        assert_eq!(graph.id, "wf-1");
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[0].label, "People");
        assert_eq!(graph.nodes[1].label, "b");
        assert!(graph.nodes[0].settings.contains("rows"));
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].id, "edge-1");
    }

    #[test]
    fn test_auto_edge_ids() {
        let graph = WorkflowBuilder::new("wf", "Test")
            .add_node("a", "x")
            .add_node("b", "x")
            .add_node("c", "x")
            .add_edge("a", 0, "b", 0)
            .add_edge("b", 0, "c", 0)
            .build();

        assert_eq!(graph.edges[0].id, "edge-1");
        assert_eq!(graph.edges[1].id, "edge-2");
    }
}
