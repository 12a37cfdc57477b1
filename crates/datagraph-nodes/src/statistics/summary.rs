//! Statistics Node
//!
//! Summarizes the numeric columns of a table.

use async_trait::async_trait;
use datagraph_engine::{
    expect_inputs, Cell, ColumnSpec, DashboardOutput, DashboardShape, DataType, DialogField,
    ExecutionContext, FieldKind, NodeCategory, NodeError, NodeMetadata, NodeModel, NodeSettings,
    PortMetadata, Result, Table, TableRef, TableSpec,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::descriptor::{save_config, NodeDescriptor};
use crate::numeric::{mean, median, min_max, std_dev};

/// Configuration for the statistics node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Number columns to summarize; empty means all of them
    pub columns: Vec<String>,
}

/// Summary of one numeric column
#[derive(Debug, Clone, PartialEq)]
struct NumericSummary {
    column: String,
    count: usize,
    missing: usize,
    min: Option<f64>,
    max: Option<f64>,
    mean: Option<f64>,
    std_dev: Option<f64>,
    median: Option<f64>,
}

impl NumericSummary {
    fn of(table: &Table, index: usize) -> Self {
        let mut values = Vec::new();
        let mut missing = 0;
        for cell in table.column_cells(index) {
            match cell.as_f64() {
                Some(v) => values.push(v),
                None => missing += 1,
            }
        }
        let bounds = min_max(&values);
        Self {
            column: table.spec().columns()[index].name.clone(),
            count: values.len(),
            missing,
            min: bounds.map(|(lo, _)| lo),
            max: bounds.map(|(_, hi)| hi),
            mean: mean(&values),
            std_dev: std_dev(&values),
            median: median(values),
        }
    }

    fn cells(&self) -> Vec<Cell> {
        let number = |v: Option<f64>| v.map(Cell::number).unwrap_or(Cell::null(DataType::Number));
        vec![
            Cell::string(self.column.clone()),
            Cell::number(self.count as f64),
            Cell::number(self.missing as f64),
            number(self.min),
            number(self.max),
            number(self.mean),
            number(self.std_dev),
            number(self.median),
        ]
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "column": self.column,
            "count": self.count,
            "missing": self.missing,
            "min": self.min,
            "max": self.max,
            "mean": self.mean,
            "stdDev": self.std_dev,
            "median": self.median,
        })
    }
}

/// Statistics
///
/// # Outputs
/// - port 0: one row per summarized column with `count`, `missing`, `min`,
///   `max`, `mean`, `std_dev` and `median`
/// - port 1: one `stats` row with `summary` (text), `metrics` (json) and
///   `details` (json), published to the dashboard
#[derive(Debug, Clone, Default)]
pub struct StatisticsModel {
    config: StatisticsConfig,
}

impl StatisticsModel {
    pub const PORT_INPUT: usize = 0;
    pub const PORT_COLUMNS: usize = 0;
    pub const PORT_SUMMARY: usize = 1;

    pub fn with_config(config: StatisticsConfig) -> Self {
        Self { config }
    }

    fn column_spec() -> Result<TableSpec> {
        let mut columns = vec![ColumnSpec::new("column", DataType::String)];
        columns.extend(
            ["count", "missing", "min", "max", "mean", "std_dev", "median"]
                .into_iter()
                .map(|name| ColumnSpec::new(name, DataType::Number)),
        );
        TableSpec::new(columns)
    }

    fn summary_spec() -> Result<TableSpec> {
        TableSpec::new(vec![
            ColumnSpec::new("summary", DataType::String),
            ColumnSpec::new("metrics", DataType::Json),
            ColumnSpec::new("details", DataType::Json),
        ])
    }

    /// Indices of the number columns to summarize
    fn selected(&self, spec: &TableSpec) -> Result<Vec<usize>> {
        if self.config.columns.is_empty() {
            return Ok(spec
                .columns()
                .iter()
                .enumerate()
                .filter(|(_, c)| c.data_type == DataType::Number)
                .map(|(i, _)| i)
                .collect());
        }
        self.config
            .columns
            .iter()
            .map(|name| {
                let index = spec.require_column(name)?;
                if spec.columns()[index].data_type != DataType::Number {
                    return Err(NodeError::configuration(format!(
                        "Column '{}' is not a number column",
                        name
                    )));
                }
                Ok(index)
            })
            .collect()
    }
}

impl NodeDescriptor for StatisticsModel {
    fn descriptor() -> NodeMetadata {
        NodeMetadata {
            node_type: "statistics".to_string(),
            label: "Statistics".to_string(),
            description: "Computes summary statistics of numeric columns".to_string(),
            category: NodeCategory::Statistics,
            inputs: vec![PortMetadata::new("Table", "Table to summarize")],
            outputs: vec![
                PortMetadata::new("Column statistics", "One row per numeric column"),
                PortMetadata::new("Summary", "Summary, metrics and details"),
            ],
            dashboard_outputs: vec![
                DashboardOutput::new(Self::PORT_SUMMARY, DashboardShape::Statistics, "{label}")
                    .with_description("Summary statistics"),
                DashboardOutput::new(
                    Self::PORT_COLUMNS,
                    DashboardShape::Table,
                    "{label} by column",
                ),
            ],
        }
    }

    fn dialog_fields() -> Vec<DialogField> {
        vec![DialogField::new("columns", "Columns", FieldKind::Columns)]
    }
}

#[async_trait]
impl NodeModel for StatisticsModel {
    fn input_port_count(&self) -> usize {
        1
    }

    fn output_port_count(&self) -> usize {
        2
    }

    fn configure(&self, input_specs: &[TableSpec]) -> Result<Vec<TableSpec>> {
        expect_inputs(input_specs, 1)?;
        self.selected(&input_specs[0])?;
        Ok(vec![Self::column_spec()?, Self::summary_spec()?])
    }

    async fn execute(&self, inputs: &[TableRef], ctx: &ExecutionContext) -> Result<Vec<Table>> {
        let input = &inputs[Self::PORT_INPUT];
        let selected = self.selected(input.spec())?;

        let mut summaries = Vec::with_capacity(selected.len());
        for (n, &index) in selected.iter().enumerate() {
            ctx.check_canceled()?;
            ctx.set_progress(n as f64 / selected.len() as f64, Some("summarizing"));
            summaries.push(NumericSummary::of(input, index));
        }

        let mut columns = ctx.create_data_table(Self::column_spec()?);
        for summary in &summaries {
            columns.add_row(summary.column.clone(), summary.cells())?;
        }

        let missing_cells: usize = (0..input.spec().num_columns())
            .map(|i| input.column_cells(i).filter(|c| c.is_missing()).count())
            .sum();
        let text = format!(
            "{} rows, {} columns, {} numeric columns summarized",
            input.size(),
            input.spec().num_columns(),
            summaries.len()
        );
        let metrics = json!({
            "rows": input.size(),
            "columns": input.spec().num_columns(),
            "numericColumns": summaries.len(),
            "missingCells": missing_cells,
        });
        let details = serde_json::Value::Array(summaries.iter().map(NumericSummary::to_json).collect());

        let mut summary = ctx.create_data_table(Self::summary_spec()?);
        summary.add_row(
            "stats",
            vec![Cell::string(text), Cell::json(metrics), Cell::json(details)],
        )?;

        log::debug!(
            "Statistics {}: summarized {} columns over {} rows",
            ctx.node_id(),
            summaries.len(),
            input.size()
        );
        Ok(vec![columns.close(), summary.close()])
    }

    fn load_settings(&mut self, settings: &NodeSettings) -> Result<()> {
        self.config = settings.to_config()?;
        Ok(())
    }

    fn save_settings(&self, settings: &mut NodeSettings) {
        save_config("statistics", &self.config, settings);
    }

    fn validate_settings(&self, settings: &NodeSettings) -> Result<()> {
        settings.to_config::<StatisticsConfig>().map(|_| ())
    }
}
