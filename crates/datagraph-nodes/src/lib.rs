//! Datagraph Nodes
//!
//! Built-in node kinds for the Datagraph workflow engine.
//! Each kind is a model type that also describes itself, so one generic
//! factory serves all of them.
//!
//! # Categories
//!
//! - **Source**: Nodes that create tables from settings
//! - **Manipulation**: Column and row filters, joins, missing value treatment
//! - **Statistics**: Summaries of numeric columns
//! - **Scoring**: Weighted ranking of rows
//! - **Visualization**: Chart payloads for the dashboard

pub mod descriptor;
pub mod manipulation;
mod numeric;
pub mod scoring;
pub mod setup;
pub mod source;
pub mod statistics;
pub mod visualization;

// Re-export all node kinds for convenience
pub use descriptor::{DescriptorFactory, NodeDescriptor};
pub use manipulation::*;
pub use scoring::*;
pub use setup::{builtin_registry, register_builtins};
pub use source::*;
pub use statistics::*;
pub use visualization::*;

#[cfg(test)]
mod tests {
    use datagraph_engine::NodeCategory;

    use super::*;

    #[test]
    fn test_registers_all_builtins() {
        let registry = builtin_registry();
        assert_eq!(registry.len(), 8, "Expected 8 built-in nodes");

        for node_type in [
            "table-creator",
            "column-filter",
            "row-filter",
            "joiner",
            "missing-values",
            "statistics",
            "weighted-scorer",
            "chart-builder",
        ] {
            assert!(registry.has_node_type(node_type), "{} missing", node_type);
        }
        assert_eq!(
            registry.factories_by_category(NodeCategory::Manipulation).len(),
            4
        );
    }

    #[test]
    fn test_port_counts_match_metadata() {
        let registry = builtin_registry();
        for factory in registry.all_factories() {
            let meta = factory.metadata();
            let model = factory.create_model();
            assert_eq!(model.input_port_count(), meta.inputs.len(), "{}", meta.node_type);
            assert_eq!(model.output_port_count(), meta.outputs.len(), "{}", meta.node_type);
            for declared in &meta.dashboard_outputs {
                assert!(declared.port < meta.outputs.len(), "{}", meta.node_type);
            }
        }
    }
}
