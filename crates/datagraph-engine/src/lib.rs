//! Datagraph Engine - node abstraction and graph execution for tabular workflows
//!
//! This crate provides the core of a visual data-processing tool: a typed
//! table model, the contract every node kind implements, and an engine that
//! schedules nodes over a directed acyclic graph. It supports:
//!
//! - Schema propagation (`configure`) separate from execution (`execute`)
//! - Cascading invalidation of downstream results on every edit
//! - Single-node runs that pull incomplete ancestors, and full-graph runs
//!   that keep independent branches going past a failure
//! - Cooperative cancellation and progress reporting via [`ExecutionContext`]
//! - A dashboard side channel for publishing selected outputs
//!
//! # Architecture
//!
//! - [`NodeRegistry`] maps node type ids to [`NodeFactory`] values
//! - [`WorkflowEngine`] owns the node arena, edges and per-node state
//! - [`EventSink`] receives every status transition (not tied to any UI)
//!
//! # Example
//!
//! ```ignore
//! let mut registry = NodeRegistry::new();
//! datagraph_nodes::register_builtins(&mut registry);
//!
//! let mut engine = WorkflowEngine::new(Arc::new(registry), Arc::new(NullEventSink));
//! engine.add_node("people", "table-creator", settings)?;
//! let report = engine.execute_workflow().await;
//! ```

pub mod builder;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod dialog;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod node;
pub mod registry;
pub mod settings;
pub mod table;
pub mod types;
pub mod validation;
pub mod view;

// Re-export key types
pub use builder::WorkflowBuilder;
pub use config::EngineConfig;
pub use context::{CancelToken, ExecutionContext};
pub use dashboard::{
    send_outputs_to_dashboard, DashboardContext, DashboardItem, DashboardOutput, DashboardShape,
};
pub use dialog::{DialogField, DialogSession, FieldKind, FieldListDialog, NodeDialog};
pub use engine::{FailedNode, RunReport, WorkflowEngine};
pub use error::{
    ConnectionError, EngineError, EngineResult, ErrorKind, NodeError, NodeFailure, Result,
};
pub use events::{EventContext, EventError, EventSink, NodeEvent, NullEventSink, VecEventSink};
pub use graph::{try_connect, Adjacency};
pub use node::{expect_inputs, NodeFactory, NodeMetadata, NodeModel};
pub use registry::NodeRegistry;
pub use settings::NodeSettings;
pub use table::{Cell, CellValue, ColumnSpec, DataType, Row, Table, TableBuilder, TableRef, TableSpec};
pub use types::{
    EdgeId, GraphEdge, GraphNode, NodeCategory, NodeId, NodeStatus, PortMetadata, WorkflowGraph,
};
pub use validation::{validate_workflow, GraphIssue};
pub use view::{NodeView, TablePreviewView, ViewSection, ViewSnapshot};
