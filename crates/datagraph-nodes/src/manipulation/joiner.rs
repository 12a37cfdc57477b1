//! Joiner Node
//!
//! Joins two tables on one key column each.

use std::collections::HashMap;

use async_trait::async_trait;
use datagraph_engine::{
    expect_inputs, Cell, ColumnSpec, DialogField, ExecutionContext, FieldKind, NodeCategory,
    NodeError, NodeMetadata, NodeModel, NodeSettings, PortMetadata, Result, Row, Table, TableRef,
    TableSpec,
};
use serde::{Deserialize, Serialize};

use crate::descriptor::{save_config, NodeDescriptor, PROGRESS_INTERVAL};

/// Which unmatched rows survive the join
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Full => "FULL",
        }
    }

    fn keeps_left(&self) -> bool {
        matches!(self, Self::Left | Self::Full)
    }

    fn keeps_right(&self) -> bool {
        matches!(self, Self::Right | Self::Full)
    }
}

/// Configuration for the joiner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinerConfig {
    /// Key column of the left (port 0) table
    pub left_column: String,
    /// Key column of the right (port 1) table
    pub right_column: String,
    pub join_type: JoinType,
    /// Prepended to every left column name
    pub left_prefix: String,
    /// Prepended to every right column name
    pub right_prefix: String,
}

impl Default for JoinerConfig {
    fn default() -> Self {
        Self {
            left_column: String::new(),
            right_column: String::new(),
            join_type: JoinType::Inner,
            left_prefix: String::new(),
            right_prefix: "right_".to_string(),
        }
    }
}

/// Joiner
///
/// Output columns are every left column (with `left_prefix`) followed by
/// every right column (with `right_prefix`). Key columns must share a type.
/// Missing keys never match. Matched rows follow left row order, each left
/// row expanded over its right matches in right row order; unmatched right
/// rows (RIGHT/FULL) come last.
#[derive(Debug, Clone, Default)]
pub struct JoinerModel {
    config: JoinerConfig,
}

/// Resolved key column positions for one pair of specs
struct JoinPlan {
    left_key: usize,
    right_key: usize,
    spec: TableSpec,
}

impl JoinerModel {
    pub const PORT_LEFT: usize = 0;
    pub const PORT_RIGHT: usize = 1;
    pub const PORT_OUTPUT: usize = 0;

    pub fn with_config(config: JoinerConfig) -> Self {
        Self { config }
    }

    fn plan(&self, left: &TableSpec, right: &TableSpec) -> Result<JoinPlan> {
        let left_key = left.require_column(&self.config.left_column)?;
        let right_key = right.require_column(&self.config.right_column)?;

        let left_type = left.columns()[left_key].data_type;
        let right_type = right.columns()[right_key].data_type;
        if left_type != right_type {
            return Err(NodeError::configuration(format!(
                "Join columns have different types: '{}' is {}, '{}' is {}",
                self.config.left_column, left_type, self.config.right_column, right_type
            )));
        }

        let prefixed = |spec: &TableSpec, prefix: &str| -> Vec<ColumnSpec> {
            spec.columns()
                .iter()
                .map(|c| ColumnSpec::new(format!("{}{}", prefix, c.name), c.data_type))
                .collect()
        };
        let mut columns = prefixed(left, &self.config.left_prefix);
        columns.extend(prefixed(right, &self.config.right_prefix));

        Ok(JoinPlan {
            left_key,
            right_key,
            spec: TableSpec::new(columns)?,
        })
    }
}

/// Hashable form of a key cell; `None` for missing keys
fn key_of(cell: &Cell) -> Option<String> {
    if cell.is_missing() {
        None
    } else {
        Some(cell.to_json().to_string())
    }
}

fn nulls(spec: &TableSpec) -> Vec<Cell> {
    spec.columns().iter().map(|c| Cell::null(c.data_type)).collect()
}

fn joined(left: &[Cell], right: &[Cell]) -> Vec<Cell> {
    left.iter().chain(right).cloned().collect()
}

impl NodeDescriptor for JoinerModel {
    fn descriptor() -> NodeMetadata {
        NodeMetadata {
            node_type: "joiner".to_string(),
            label: "Joiner".to_string(),
            description: "Joins two tables on a key column".to_string(),
            category: NodeCategory::Manipulation,
            inputs: vec![
                PortMetadata::new("Left", "Left table"),
                PortMetadata::new("Right", "Right table"),
            ],
            outputs: vec![PortMetadata::new("Joined", "Joined table")],
            dashboard_outputs: vec![],
        }
    }

    fn dialog_fields() -> Vec<DialogField> {
        vec![
            DialogField::new("left_column", "Left key column", FieldKind::Text),
            DialogField::new("right_column", "Right key column", FieldKind::Text),
            DialogField::new(
                "join_type",
                "Join type",
                FieldKind::Choice {
                    options: [JoinType::Inner, JoinType::Left, JoinType::Right, JoinType::Full]
                        .iter()
                        .map(|t| t.as_str().to_string())
                        .collect(),
                },
            ),
            DialogField::new("left_prefix", "Left column prefix", FieldKind::Text),
            DialogField::new("right_prefix", "Right column prefix", FieldKind::Text),
        ]
    }
}

#[async_trait]
impl NodeModel for JoinerModel {
    fn input_port_count(&self) -> usize {
        2
    }

    fn output_port_count(&self) -> usize {
        1
    }

    fn configure(&self, input_specs: &[TableSpec]) -> Result<Vec<TableSpec>> {
        expect_inputs(input_specs, 2)?;
        let plan = self.plan(&input_specs[Self::PORT_LEFT], &input_specs[Self::PORT_RIGHT])?;
        Ok(vec![plan.spec])
    }

    async fn execute(&self, inputs: &[TableRef], ctx: &ExecutionContext) -> Result<Vec<Table>> {
        let left = &inputs[Self::PORT_LEFT];
        let right = &inputs[Self::PORT_RIGHT];
        let plan = self.plan(left.spec(), right.spec())?;

        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, row) in right.rows().iter().enumerate() {
            if let Some(key) = key_of(&row.cells[plan.right_key]) {
                index.entry(key).or_default().push(i);
            }
        }

        let left_nulls = nulls(left.spec());
        let right_nulls = nulls(right.spec());
        let mut right_matched = vec![false; right.size()];
        let mut builder = ctx.create_data_table(plan.spec);

        for (i, row) in left.rows().iter().enumerate() {
            if i % PROGRESS_INTERVAL == 0 {
                ctx.check_canceled()?;
                ctx.set_progress(i as f64 / left.size() as f64, Some("joining"));
            }
            let matches = key_of(&row.cells[plan.left_key])
                .and_then(|key| index.get(&key))
                .map(Vec::as_slice)
                .unwrap_or_default();

            for &r in matches {
                right_matched[r] = true;
                let right_row: &Row = &right.rows()[r];
                builder.add_row(
                    format!("{}_{}", row.key, right_row.key),
                    joined(&row.cells, &right_row.cells),
                )?;
            }
            if matches.is_empty() && self.config.join_type.keeps_left() {
                builder.add_row(row.key.clone(), joined(&row.cells, &right_nulls))?;
            }
        }

        if self.config.join_type.keeps_right() {
            ctx.check_canceled()?;
            for (row, _) in right
                .rows()
                .iter()
                .zip(&right_matched)
                .filter(|(_, &matched)| !matched)
            {
                builder.add_row(row.key.clone(), joined(&left_nulls, &row.cells))?;
            }
        }

        log::debug!(
            "Joiner {}: {} join of {} x {} rows produced {} rows",
            ctx.node_id(),
            self.config.join_type.as_str(),
            left.size(),
            right.size(),
            builder.len()
        );
        Ok(vec![builder.close()])
    }

    fn load_settings(&mut self, settings: &NodeSettings) -> Result<()> {
        self.config = settings.to_config()?;
        Ok(())
    }

    fn save_settings(&self, settings: &mut NodeSettings) {
        save_config("joiner", &self.config, settings);
    }

    fn validate_settings(&self, settings: &NodeSettings) -> Result<()> {
        let config: JoinerConfig = settings.to_config()?;
        if config.left_column.is_empty() || config.right_column.is_empty() {
            return Err(NodeError::validation("Both join columns must be set"));
        }
        Ok(())
    }
}
