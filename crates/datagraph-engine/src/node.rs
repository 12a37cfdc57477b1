//! Node contract
//!
//! A node kind is a small set of cooperating values:
//!
//! - [`NodeModel`]: configuration state plus the `configure` / `execute` pair
//! - [`NodeDialog`](crate::dialog::NodeDialog): editable settings surface (optional)
//! - [`NodeView`](crate::view::NodeView): inspection of the last outputs (optional)
//! - [`NodeFactory`]: static metadata and constructors for the above
//!
//! Factories are registered once in a [`NodeRegistry`](crate::registry::NodeRegistry)
//! and looked up by node type id.
//!
//! # Example
//!
//! ```ignore
//! struct PassThroughFactory { metadata: NodeMetadata }
//!
//! impl NodeFactory for PassThroughFactory {
//!     fn metadata(&self) -> &NodeMetadata { &self.metadata }
//!     fn create_model(&self) -> Box<dyn NodeModel> { Box::new(PassThroughModel) }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::dashboard::DashboardOutput;
use crate::dialog::NodeDialog;
use crate::error::Result;
use crate::settings::NodeSettings;
use crate::table::{Table, TableRef, TableSpec};
use crate::types::{NodeCategory, PortMetadata};
use crate::view::NodeView;

/// Configuration state and behaviour of one node instance
///
/// Port counts are fixed when the model is constructed; `configure` and
/// `execute` must always return exactly `output_port_count()` items.
#[async_trait]
pub trait NodeModel: Send + Sync {
    /// Number of input ports
    fn input_port_count(&self) -> usize;

    /// Number of output ports
    fn output_port_count(&self) -> usize;

    /// Negotiate output specs from input specs and the current settings.
    ///
    /// Must be free of side effects and must not depend on row data.
    fn configure(&self, input_specs: &[TableSpec]) -> Result<Vec<TableSpec>>;

    /// Transform input tables into output tables.
    ///
    /// Long loops should call `ctx.check_canceled()` and `ctx.set_progress(..)`.
    async fn execute(&self, inputs: &[TableRef], ctx: &ExecutionContext) -> Result<Vec<Table>>;

    /// Replace the model's configuration from persisted settings
    fn load_settings(&mut self, settings: &NodeSettings) -> Result<()>;

    /// Write the model's configuration into `settings`
    fn save_settings(&self, settings: &mut NodeSettings);

    /// Check settings without applying them
    fn validate_settings(&self, settings: &NodeSettings) -> Result<()>;
}

/// Static description of a node kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    /// Unique type identifier (e.g., "joiner")
    pub node_type: String,
    /// Human-readable label
    pub label: String,
    /// Description of what the node does
    pub description: String,
    /// Category for palette grouping
    pub category: NodeCategory,
    /// Input port descriptions
    pub inputs: Vec<PortMetadata>,
    /// Output port descriptions
    pub outputs: Vec<PortMetadata>,
    /// Output ports published to the dashboard
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dashboard_outputs: Vec<DashboardOutput>,
}

/// Constructs the roles of one node kind
pub trait NodeFactory: Send + Sync {
    /// Static metadata for this node kind
    fn metadata(&self) -> &NodeMetadata;

    /// Fresh model with default settings
    fn create_model(&self) -> Box<dyn NodeModel>;

    /// Settings editor, if the kind has one
    fn create_dialog(&self) -> Option<Box<dyn NodeDialog>> {
        None
    }

    /// Output viewer, if the kind has one
    fn create_view(&self) -> Option<Box<dyn NodeView>> {
        None
    }
}

/// Helper: fail unless exactly `expected` input specs were supplied
pub fn expect_inputs(input_specs: &[TableSpec], expected: usize) -> Result<()> {
    if input_specs.len() != expected {
        return Err(crate::error::NodeError::configuration(format!(
            "Expected {} input table(s), got {}",
            expected,
            input_specs.len()
        )));
    }
    Ok(())
}
