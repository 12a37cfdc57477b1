//! Registration of the built-in node kinds.
//!
//! Hosts call [`register_builtins`] once at startup on the registry they
//! hand to the engine. Nothing is registered implicitly.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = NodeRegistry::new();
//! datagraph_nodes::register_builtins(&mut registry);
//! let engine = WorkflowEngine::new(Arc::new(registry), sink);
//! ```

use std::sync::Arc;

use datagraph_engine::NodeRegistry;

use crate::descriptor::{DescriptorFactory, NodeDescriptor};
use crate::manipulation::{ColumnFilterModel, JoinerModel, MissingValuesModel, RowFilterModel};
use crate::scoring::WeightedScorerModel;
use crate::source::TableCreatorModel;
use crate::statistics::StatisticsModel;
use crate::visualization::ChartBuilderModel;

fn register<N: NodeDescriptor>(registry: &mut NodeRegistry) {
    registry.register(Arc::new(DescriptorFactory::<N>::new()));
}

/// Register every built-in node kind
pub fn register_builtins(registry: &mut NodeRegistry) {
    register::<TableCreatorModel>(registry);
    register::<ColumnFilterModel>(registry);
    register::<RowFilterModel>(registry);
    register::<JoinerModel>(registry);
    register::<MissingValuesModel>(registry);
    register::<StatisticsModel>(registry);
    register::<WeightedScorerModel>(registry);
    register::<ChartBuilderModel>(registry);
    log::debug!("Registered {} built-in node kinds", registry.len());
}

/// A fresh registry holding the built-in node kinds
pub fn builtin_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_builtins(&mut registry);
    registry
}
