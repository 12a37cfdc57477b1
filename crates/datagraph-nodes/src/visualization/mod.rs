//! Visualization nodes
//!
//! Nodes that prepare chart payloads for the dashboard.

mod chart_builder;

pub use chart_builder::{ChartBuilderConfig, ChartBuilderModel, ChartType};
