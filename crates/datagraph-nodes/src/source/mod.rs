//! Source nodes
//!
//! Nodes without inputs that bring tables into a workflow.

mod table_creator;

pub use table_creator::{ColumnDefinition, TableCreatorConfig, TableCreatorModel};
