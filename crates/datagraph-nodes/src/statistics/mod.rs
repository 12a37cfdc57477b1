//! Statistics nodes
//!
//! Nodes that describe tables rather than transform them.

mod summary;

pub use summary::{StatisticsConfig, StatisticsModel};
