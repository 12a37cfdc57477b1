//! Chart Builder Node
//!
//! Turns table columns into a chart payload for the dashboard.

use async_trait::async_trait;
use datagraph_engine::{
    expect_inputs, Cell, ColumnSpec, DashboardOutput, DashboardShape, DataType, DialogField,
    ExecutionContext, FieldKind, NodeCategory, NodeError, NodeMetadata, NodeModel, NodeSettings,
    PortMetadata, Result, Table, TableRef, TableSpec,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::descriptor::{save_config, NodeDescriptor, PROGRESS_INTERVAL};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    #[default]
    Bar,
    Line,
    Scatter,
    Pie,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Scatter => "scatter",
            Self::Pie => "pie",
        }
    }
}

/// Configuration for the chart builder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartBuilderConfig {
    pub chart_type: ChartType,
    /// Category (or x axis) column
    pub x_column: String,
    /// Plotted number columns
    pub y_columns: Vec<String>,
    /// Optional chart title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ChartBuilderConfig {
    fn validate(&self) -> Result<()> {
        if self.x_column.is_empty() {
            return Err(NodeError::validation("x_column must be set"));
        }
        if self.y_columns.is_empty() {
            return Err(NodeError::validation("At least one y column is required"));
        }
        if self.chart_type == ChartType::Pie && self.y_columns.len() != 1 {
            return Err(NodeError::validation("A pie chart takes exactly one y column"));
        }
        Ok(())
    }
}

/// Chart Builder
///
/// Emits a single `chart` row with `chart_type` (text), `config` (json)
/// and `data` (json: one object per input row, keyed by column name).
/// y columns must be number columns; scatter charts also need a number x.
/// A negative pie slice fails execution with a domain error.
#[derive(Debug, Clone, Default)]
pub struct ChartBuilderModel {
    config: ChartBuilderConfig,
}

impl ChartBuilderModel {
    pub const PORT_INPUT: usize = 0;
    pub const PORT_CHART: usize = 0;

    pub fn with_config(config: ChartBuilderConfig) -> Self {
        Self { config }
    }

    fn chart_spec() -> Result<TableSpec> {
        TableSpec::new(vec![
            ColumnSpec::new("chart_type", DataType::String),
            ColumnSpec::new("config", DataType::Json),
            ColumnSpec::new("data", DataType::Json),
        ])
    }

    /// Indices of the x column followed by each y column
    fn plotted(&self, spec: &TableSpec) -> Result<(usize, Vec<usize>)> {
        let x = spec.require_column(&self.config.x_column)?;
        if self.config.chart_type == ChartType::Scatter
            && spec.columns()[x].data_type != DataType::Number
        {
            return Err(NodeError::configuration(format!(
                "Scatter charts need a number x column, '{}' is {}",
                self.config.x_column,
                spec.columns()[x].data_type
            )));
        }
        let ys = self
            .config
            .y_columns
            .iter()
            .map(|name| {
                let index = spec.require_column(name)?;
                if spec.columns()[index].data_type != DataType::Number {
                    return Err(NodeError::configuration(format!(
                        "y column '{}' must be a number column",
                        name
                    )));
                }
                Ok(index)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((x, ys))
    }
}

impl NodeDescriptor for ChartBuilderModel {
    fn descriptor() -> NodeMetadata {
        NodeMetadata {
            node_type: "chart-builder".to_string(),
            label: "Chart Builder".to_string(),
            description: "Builds a bar, line, scatter or pie chart".to_string(),
            category: NodeCategory::Visualization,
            inputs: vec![PortMetadata::new("Table", "Data to plot")],
            outputs: vec![PortMetadata::new("Chart", "Chart type, config and data")],
            dashboard_outputs: vec![DashboardOutput::new(
                Self::PORT_CHART,
                DashboardShape::Chart,
                "{label}",
            )],
        }
    }

    fn dialog_fields() -> Vec<DialogField> {
        vec![
            DialogField::new(
                "chart_type",
                "Chart type",
                FieldKind::Choice {
                    options: [ChartType::Bar, ChartType::Line, ChartType::Scatter, ChartType::Pie]
                        .iter()
                        .map(|t| t.as_str().to_string())
                        .collect(),
                },
            ),
            DialogField::new("x_column", "X column", FieldKind::Text),
            DialogField::new("y_columns", "Y columns", FieldKind::Columns),
            DialogField::new("title", "Title", FieldKind::Text),
        ]
    }
}

#[async_trait]
impl NodeModel for ChartBuilderModel {
    fn input_port_count(&self) -> usize {
        1
    }

    fn output_port_count(&self) -> usize {
        1
    }

    fn configure(&self, input_specs: &[TableSpec]) -> Result<Vec<TableSpec>> {
        expect_inputs(input_specs, 1)?;
        self.plotted(&input_specs[0])?;
        Ok(vec![Self::chart_spec()?])
    }

    async fn execute(&self, inputs: &[TableRef], ctx: &ExecutionContext) -> Result<Vec<Table>> {
        let input = &inputs[Self::PORT_INPUT];
        let (x, ys) = self.plotted(input.spec())?;

        let mut points = Vec::with_capacity(input.size());
        for (i, row) in input.rows().iter().enumerate() {
            if i % PROGRESS_INTERVAL == 0 {
                ctx.check_canceled()?;
                ctx.set_progress(i as f64 / input.size() as f64, None);
            }
            let mut point = serde_json::Map::new();
            point.insert(self.config.x_column.clone(), row.cells[x].to_json());
            for (name, &y) in self.config.y_columns.iter().zip(&ys) {
                if self.config.chart_type == ChartType::Pie
                    && row.cells[y].as_f64().is_some_and(|v| v < 0.0)
                {
                    return Err(NodeError::domain(format!(
                        "Pie slices cannot be negative ('{}' in row {})",
                        name, row.key
                    )));
                }
                point.insert(name.clone(), row.cells[y].to_json());
            }
            points.push(serde_json::Value::Object(point));
        }

        let config = json!({
            "title": self.config.title.clone().unwrap_or_default(),
            "xColumn": self.config.x_column,
            "yColumns": self.config.y_columns,
            "points": points.len(),
        });

        let mut builder = ctx.create_data_table(Self::chart_spec()?);
        builder.add_row(
            "chart",
            vec![
                Cell::string(self.config.chart_type.as_str()),
                Cell::json(config),
                Cell::json(serde_json::Value::Array(points)),
            ],
        )?;

        log::debug!(
            "ChartBuilder {}: {} chart over {} rows",
            ctx.node_id(),
            self.config.chart_type.as_str(),
            input.size()
        );
        Ok(vec![builder.close()])
    }

    fn load_settings(&mut self, settings: &NodeSettings) -> Result<()> {
        let config: ChartBuilderConfig = settings.to_config()?;
        config.validate()?;
        self.config = config;
        Ok(())
    }

    fn save_settings(&self, settings: &mut NodeSettings) {
        save_config("chart-builder", &self.config, settings);
    }

    fn validate_settings(&self, settings: &NodeSettings) -> Result<()> {
        settings.to_config::<ChartBuilderConfig>()?.validate()
    }
}
