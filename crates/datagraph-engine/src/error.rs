//! Error types for the datagraph engine
//!
//! Three layers of errors exist:
//!
//! - [`NodeError`]: raised by a node's model while configuring, validating
//!   settings or executing. The engine turns these into status transitions.
//! - [`ConnectionError`]: raised synchronously when an edge is rejected.
//! - [`EngineError`]: misuse of the engine API itself (unknown ids, bad snapshots).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::table::DataType;
use crate::validation::GraphIssue;

/// Result type alias using NodeError
pub type Result<T> = std::result::Result<T, NodeError>;

/// Result type alias for engine-boundary operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors raised by node models
#[derive(Debug, Clone, Error)]
pub enum NodeError {
    /// Input specs are structurally incompatible with the node's settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A row did not have one cell per column
    #[error("Row '{row_key}' has {actual} cells, expected {expected}")]
    ShapeMismatch {
        row_key: String,
        expected: usize,
        actual: usize,
    },

    /// A cell's type differs from its column's declared type
    #[error("Row '{row_key}', column '{column}': expected {expected} cell, got {actual}")]
    CellType {
        row_key: String,
        column: String,
        expected: DataType,
        actual: DataType,
    },

    /// Settings are invalid
    #[error("Invalid settings: {0}")]
    Validation(String),

    /// Node-specific business rule violated during execution
    #[error("{0}")]
    Domain(String),

    /// The enclosing run was asked to stop
    #[error("Execution canceled")]
    Canceled,
}

impl NodeError {
    /// Create a configuration error with a message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a settings validation error with a message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a domain error with a message
    pub fn domain(msg: impl Into<String>) -> Self {
        Self::Domain(msg.into())
    }

    /// The taxonomy bucket this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::ShapeMismatch { .. } | Self::CellType { .. } => ErrorKind::ShapeMismatch,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Domain(_) => ErrorKind::Domain,
            Self::Canceled => ErrorKind::Canceled,
        }
    }
}

/// Error taxonomy carried on status events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    ShapeMismatch,
    Validation,
    Domain,
    Canceled,
    /// An upstream node failed, so this node was never attempted
    Upstream,
}

/// Serializable record of why a node failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl NodeFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failure reported on a target's behalf when an ancestor failed
    pub fn upstream(failed_node: &str, cause: &NodeFailure) -> Self {
        Self::new(
            ErrorKind::Upstream,
            format!("Upstream node '{}' failed: {}", failed_node, cause.message),
        )
    }
}

impl From<&NodeError> for NodeFailure {
    fn from(err: &NodeError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Rejection of a candidate edge; the graph is left unchanged
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The target input port already has an incoming edge
    #[error("Input port {port} of node '{node_id}' is already connected")]
    PortOccupied { node_id: String, port: usize },

    /// Adding the edge would create a cycle
    #[error("Connecting '{source_id}' to '{target_id}' would create a cycle")]
    CycleDetected { source_id: String, target_id: String },

    /// The edge references a node that is not in the graph
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// The edge references a port index the node does not have
    #[error("Node '{node_id}' has {count} {direction} ports, port {port} does not exist")]
    PortOutOfRange {
        node_id: String,
        direction: &'static str,
        port: usize,
        count: usize,
    },
}

/// Errors returned across the engine boundary
#[derive(Debug, Error)]
pub enum EngineError {
    /// No node with this id is in the graph
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// No factory is registered for this node type
    #[error("No factory registered for node type '{0}'")]
    UnknownNodeType(String),

    /// A node with this id already exists
    #[error("Node '{0}' already exists")]
    DuplicateNode(String),

    /// No edge with this id is in the graph
    #[error("Unknown edge: {0}")]
    UnknownEdge(String),

    /// Draft settings were rejected before reaching the node
    #[error("Settings rejected: {0}")]
    InvalidSettings(NodeError),

    /// An edge was rejected
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A graph snapshot failed validation
    #[error("Invalid graph: {}", format_issues(.0))]
    InvalidGraph(Vec<GraphIssue>),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_issues(issues: &[GraphIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
