//! Table Creator Node
//!
//! Emits a table typed in by the user: a column layout plus literal rows.

use async_trait::async_trait;
use datagraph_engine::{
    expect_inputs, Cell, ColumnSpec, DataType, ExecutionContext, NodeCategory, NodeError,
    NodeMetadata, NodeModel, NodeSettings, PortMetadata, Result, Table, TableRef, TableSpec,
};
use serde::{Deserialize, Serialize};

use crate::descriptor::{save_config, NodeDescriptor, PROGRESS_INTERVAL};

/// One declared column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Configuration for the table creator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableCreatorConfig {
    /// Column layout, in order
    pub columns: Vec<ColumnDefinition>,
    /// Literal rows; each inner list holds one JSON value per column
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl TableCreatorConfig {
    /// Output spec described by `columns`
    pub fn spec(&self) -> Result<TableSpec> {
        TableSpec::new(
            self.columns
                .iter()
                .map(|c| ColumnSpec::new(c.name.clone(), c.data_type))
                .collect(),
        )
    }

    fn validate(&self) -> Result<()> {
        if self.columns.iter().any(|c| c.name.trim().is_empty()) {
            return Err(NodeError::validation("Column names must not be empty"));
        }
        self.spec()
            .map(|_| ())
            .map_err(|e| NodeError::validation(e.to_string()))
    }
}

/// Source node producing a literal table
///
/// # Settings
/// - `columns`: `[{"name": "Age", "type": "number"}, ...]`
/// - `rows`: `[["Ann", 30], ...]`
///
/// Rows are keyed `Row0`, `Row1`, ... in order. Literals are never coerced:
/// a string in a number column fails the execution.
#[derive(Debug, Clone, Default)]
pub struct TableCreatorModel {
    config: TableCreatorConfig,
}

impl TableCreatorModel {
    /// Port index of the created table
    pub const PORT_TABLE: usize = 0;

    /// Create with configuration
    pub fn with_config(config: TableCreatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TableCreatorConfig {
        &self.config
    }
}

/// JSON literal type, for error reporting
fn literal_type(value: &serde_json::Value) -> DataType {
    match value {
        serde_json::Value::String(_) => DataType::String,
        serde_json::Value::Number(_) => DataType::Number,
        serde_json::Value::Bool(_) => DataType::Boolean,
        _ => DataType::Json,
    }
}

impl NodeDescriptor for TableCreatorModel {
    fn descriptor() -> NodeMetadata {
        NodeMetadata {
            node_type: "table-creator".to_string(),
            label: "Table Creator".to_string(),
            description: "Creates a table from manually entered columns and rows".to_string(),
            category: NodeCategory::Source,
            inputs: vec![],
            outputs: vec![PortMetadata::new("Table", "The entered table")],
            dashboard_outputs: vec![],
        }
    }
}

#[async_trait]
impl NodeModel for TableCreatorModel {
    fn input_port_count(&self) -> usize {
        0
    }

    fn output_port_count(&self) -> usize {
        1
    }

    fn configure(&self, input_specs: &[TableSpec]) -> Result<Vec<TableSpec>> {
        expect_inputs(input_specs, 0)?;
        Ok(vec![self.config.spec()?])
    }

    async fn execute(&self, _inputs: &[TableRef], ctx: &ExecutionContext) -> Result<Vec<Table>> {
        let spec = self.config.spec()?;
        log::debug!(
            "TableCreator {}: creating {} rows x {} columns",
            ctx.node_id(),
            self.config.rows.len(),
            spec.num_columns()
        );

        let mut builder = ctx.create_data_table(spec);
        let total = self.config.rows.len();
        for (i, literals) in self.config.rows.iter().enumerate() {
            if i % PROGRESS_INTERVAL == 0 {
                ctx.check_canceled()?;
                ctx.set_progress(i as f64 / total as f64, None);
            }

            let key = format!("Row{}", i);
            if literals.len() != self.config.columns.len() {
                return Err(NodeError::ShapeMismatch {
                    row_key: key,
                    expected: self.config.columns.len(),
                    actual: literals.len(),
                });
            }

            let mut cells = Vec::with_capacity(literals.len());
            for (literal, column) in literals.iter().zip(&self.config.columns) {
                let cell = Cell::from_json(column.data_type, literal).ok_or_else(|| {
                    NodeError::CellType {
                        row_key: key.clone(),
                        column: column.name.clone(),
                        expected: column.data_type,
                        actual: literal_type(literal),
                    }
                })?;
                cells.push(cell);
            }
            builder.add_row(key, cells)?;
        }

        ctx.set_progress(1.0, None);
        Ok(vec![builder.close()])
    }

    fn load_settings(&mut self, settings: &NodeSettings) -> Result<()> {
        let config: TableCreatorConfig = settings.to_config()?;
        config.validate()?;
        self.config = config;
        Ok(())
    }

    fn save_settings(&self, settings: &mut NodeSettings) {
        save_config("table-creator", &self.config, settings);
    }

    fn validate_settings(&self, settings: &NodeSettings) -> Result<()> {
        settings.to_config::<TableCreatorConfig>()?.validate()
    }
}
