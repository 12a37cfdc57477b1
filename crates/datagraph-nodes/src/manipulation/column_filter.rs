//! Column Filter Node
//!
//! Keeps (or drops) a named set of columns.

use async_trait::async_trait;
use datagraph_engine::{
    expect_inputs, DialogField, ExecutionContext, FieldKind, NodeCategory, NodeError,
    NodeMetadata, NodeModel, NodeSettings, PortMetadata, Result, Table, TableRef, TableSpec,
};
use serde::{Deserialize, Serialize};

use crate::descriptor::{save_config, NodeDescriptor, PROGRESS_INTERVAL};

/// Configuration for the column filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnFilterConfig {
    /// Column names to keep (or drop when `exclude` is set)
    pub columns: Vec<String>,
    /// Drop the listed columns instead of keeping them
    pub exclude: bool,
}

/// Column Filter
///
/// Output columns keep their input order. Every listed column must exist
/// in the input; a missing one is a configuration error.
#[derive(Debug, Clone, Default)]
pub struct ColumnFilterModel {
    config: ColumnFilterConfig,
}

impl ColumnFilterModel {
    pub const PORT_INPUT: usize = 0;
    pub const PORT_OUTPUT: usize = 0;

    pub fn with_config(config: ColumnFilterConfig) -> Self {
        Self { config }
    }

    /// Input column indices that survive the filter
    fn kept_indices(&self, spec: &TableSpec) -> Result<Vec<usize>> {
        for name in &self.config.columns {
            spec.require_column(name)?;
        }
        Ok(spec
            .column_names()
            .enumerate()
            .filter(|(_, name)| {
                let listed = self.config.columns.iter().any(|c| c.as_str() == *name);
                listed != self.config.exclude
            })
            .map(|(i, _)| i)
            .collect())
    }

    fn output_spec(spec: &TableSpec, kept: &[usize]) -> Result<TableSpec> {
        TableSpec::new(
            kept.iter()
                .filter_map(|&i| spec.column(i).cloned())
                .collect(),
        )
    }
}

impl NodeDescriptor for ColumnFilterModel {
    fn descriptor() -> NodeMetadata {
        NodeMetadata {
            node_type: "column-filter".to_string(),
            label: "Column Filter".to_string(),
            description: "Keeps or removes selected columns".to_string(),
            category: NodeCategory::Manipulation,
            inputs: vec![PortMetadata::new("Table", "Table to filter")],
            outputs: vec![PortMetadata::new("Filtered", "Table with the selected columns")],
            dashboard_outputs: vec![],
        }
    }

    fn dialog_fields() -> Vec<DialogField> {
        vec![
            DialogField::new("columns", "Columns", FieldKind::Columns),
            DialogField::new("exclude", "Remove selected columns", FieldKind::Toggle),
        ]
    }
}

#[async_trait]
impl NodeModel for ColumnFilterModel {
    fn input_port_count(&self) -> usize {
        1
    }

    fn output_port_count(&self) -> usize {
        1
    }

    fn configure(&self, input_specs: &[TableSpec]) -> Result<Vec<TableSpec>> {
        expect_inputs(input_specs, 1)?;
        let kept = self.kept_indices(&input_specs[0])?;
        Ok(vec![Self::output_spec(&input_specs[0], &kept)?])
    }

    async fn execute(&self, inputs: &[TableRef], ctx: &ExecutionContext) -> Result<Vec<Table>> {
        let input = &inputs[Self::PORT_INPUT];
        let kept = self.kept_indices(input.spec())?;
        log::debug!(
            "ColumnFilter {}: keeping {} of {} columns",
            ctx.node_id(),
            kept.len(),
            input.spec().num_columns()
        );

        let mut builder = ctx.create_data_table(Self::output_spec(input.spec(), &kept)?);
        for (i, row) in input.rows().iter().enumerate() {
            if i % PROGRESS_INTERVAL == 0 {
                ctx.check_canceled()?;
                ctx.set_progress(i as f64 / input.size() as f64, None);
            }
            let cells = kept.iter().map(|&c| row.cells[c].clone()).collect();
            builder.add_row(row.key.clone(), cells)?;
        }
        Ok(vec![builder.close()])
    }

    fn load_settings(&mut self, settings: &NodeSettings) -> Result<()> {
        self.config = settings.to_config()?;
        Ok(())
    }

    fn save_settings(&self, settings: &mut NodeSettings) {
        save_config("column-filter", &self.config, settings);
    }

    fn validate_settings(&self, settings: &NodeSettings) -> Result<()> {
        let config: ColumnFilterConfig = settings.to_config()?;
        if config.columns.iter().any(|c| c.is_empty()) {
            return Err(NodeError::validation("Column names must not be empty"));
        }
        Ok(())
    }
}
