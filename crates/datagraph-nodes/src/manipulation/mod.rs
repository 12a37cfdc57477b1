//! Manipulation nodes
//!
//! Nodes that reshape, filter, join or clean tables.

mod column_filter;
mod joiner;
mod missing_values;
mod row_filter;

pub use column_filter::{ColumnFilterConfig, ColumnFilterModel};
pub use joiner::{JoinType, JoinerConfig, JoinerModel};
pub use missing_values::{MissingValueMethod, MissingValuesConfig, MissingValuesModel};
pub use row_filter::{FilterOperator, RowFilterConfig, RowFilterModel};
