//! Row Filter Node
//!
//! Keeps rows whose cell in one column satisfies a comparison.

use async_trait::async_trait;
use datagraph_engine::{
    expect_inputs, Cell, DataType, DialogField, ExecutionContext, FieldKind, NodeCategory,
    NodeError, NodeMetadata, NodeModel, NodeSettings, PortMetadata, Result, Table, TableRef,
    TableSpec,
};
use serde::{Deserialize, Serialize};

use crate::descriptor::{save_config, NodeDescriptor, PROGRESS_INTERVAL};

/// Comparison applied to each row's cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    #[default]
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    IsMissing,
    IsNotMissing,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 7] = [
        Self::Equals,
        Self::NotEquals,
        Self::GreaterThan,
        Self::LessThan,
        Self::Contains,
        Self::IsMissing,
        Self::IsNotMissing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::Contains => "contains",
            Self::IsMissing => "is_missing",
            Self::IsNotMissing => "is_not_missing",
        }
    }

    fn needs_value(&self) -> bool {
        !matches!(self, Self::IsMissing | Self::IsNotMissing)
    }

    fn is_ordering(&self) -> bool {
        matches!(self, Self::GreaterThan | Self::LessThan)
    }
}

/// Configuration for the row filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowFilterConfig {
    /// Column the comparison reads
    pub column: String,
    pub operator: FilterOperator,
    /// Comparison operand; unused by the missing-value operators
    pub value: serde_json::Value,
    /// Keep matching rows (`true`) or drop them (`false`)
    pub include: bool,
}

impl Default for RowFilterConfig {
    fn default() -> Self {
        Self {
            column: String::new(),
            operator: FilterOperator::Equals,
            value: serde_json::Value::Null,
            include: true,
        }
    }
}

impl RowFilterConfig {
    fn validate(&self) -> Result<()> {
        if self.operator.needs_value() && self.value.is_null() {
            return Err(NodeError::validation(format!(
                "Operator '{}' needs a value",
                self.operator.as_str()
            )));
        }
        if self.operator.is_ordering() && !self.value.is_number() {
            return Err(NodeError::validation(format!(
                "Operator '{}' needs a numeric value",
                self.operator.as_str()
            )));
        }
        if self.operator == FilterOperator::Contains && !self.value.is_string() {
            return Err(NodeError::validation("Operator 'contains' needs a text value"));
        }
        Ok(())
    }

    /// Whether `cell` satisfies the comparison, before `include` is applied
    fn matches(&self, cell: &Cell) -> bool {
        match self.operator {
            FilterOperator::IsMissing => cell.is_missing(),
            FilterOperator::IsNotMissing => !cell.is_missing(),
            FilterOperator::Equals => values_equal(cell, &self.value),
            FilterOperator::NotEquals => !cell.is_null() && !values_equal(cell, &self.value),
            FilterOperator::GreaterThan => compare(cell, &self.value, |a, b| a > b),
            FilterOperator::LessThan => compare(cell, &self.value, |a, b| a < b),
            FilterOperator::Contains => match (cell.as_str(), self.value.as_str()) {
                (Some(text), Some(needle)) => text.contains(needle),
                _ => false,
            },
        }
    }
}

/// Equality that treats `30` and `30.0` as the same number
fn values_equal(cell: &Cell, value: &serde_json::Value) -> bool {
    if cell.is_null() {
        return false;
    }
    match (cell.as_f64(), value.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => cell.to_json() == *value,
    }
}

fn compare(cell: &Cell, value: &serde_json::Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (cell.as_f64(), value.as_f64()) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

/// Row Filter
///
/// Missing cells never satisfy a comparison operator; use `is_missing`
/// to select them. Row keys are preserved.
#[derive(Debug, Clone, Default)]
pub struct RowFilterModel {
    config: RowFilterConfig,
}

impl RowFilterModel {
    pub const PORT_INPUT: usize = 0;
    pub const PORT_OUTPUT: usize = 0;

    pub fn with_config(config: RowFilterConfig) -> Self {
        Self { config }
    }

    fn column_index(&self, spec: &TableSpec) -> Result<usize> {
        let index = spec.require_column(&self.config.column)?;
        if self.config.operator.is_ordering() {
            let data_type = spec.columns()[index].data_type;
            if data_type != DataType::Number {
                return Err(NodeError::configuration(format!(
                    "Operator '{}' needs a number column, '{}' is {}",
                    self.config.operator.as_str(),
                    self.config.column,
                    data_type
                )));
            }
        }
        Ok(index)
    }
}

impl NodeDescriptor for RowFilterModel {
    fn descriptor() -> NodeMetadata {
        NodeMetadata {
            node_type: "row-filter".to_string(),
            label: "Row Filter".to_string(),
            description: "Keeps or removes rows matching a condition on one column".to_string(),
            category: NodeCategory::Manipulation,
            inputs: vec![PortMetadata::new("Table", "Table to filter")],
            outputs: vec![PortMetadata::new("Filtered", "Rows passing the filter")],
            dashboard_outputs: vec![],
        }
    }

    fn dialog_fields() -> Vec<DialogField> {
        vec![
            DialogField::new("column", "Column", FieldKind::Text),
            DialogField::new(
                "operator",
                "Operator",
                FieldKind::Choice {
                    options: FilterOperator::ALL
                        .iter()
                        .map(|op| op.as_str().to_string())
                        .collect(),
                },
            ),
            DialogField::new("value", "Value", FieldKind::Json),
            DialogField::new("include", "Keep matching rows", FieldKind::Toggle),
        ]
    }
}

#[async_trait]
impl NodeModel for RowFilterModel {
    fn input_port_count(&self) -> usize {
        1
    }

    fn output_port_count(&self) -> usize {
        1
    }

    fn configure(&self, input_specs: &[TableSpec]) -> Result<Vec<TableSpec>> {
        expect_inputs(input_specs, 1)?;
        self.column_index(&input_specs[0])?;
        Ok(vec![input_specs[0].clone()])
    }

    async fn execute(&self, inputs: &[TableRef], ctx: &ExecutionContext) -> Result<Vec<Table>> {
        let input = &inputs[Self::PORT_INPUT];
        let index = self.column_index(input.spec())?;

        let mut builder = ctx.create_data_table(input.spec().clone());
        for (i, row) in input.rows().iter().enumerate() {
            if i % PROGRESS_INTERVAL == 0 {
                ctx.check_canceled()?;
                ctx.set_progress(i as f64 / input.size() as f64, None);
            }
            if self.config.matches(&row.cells[index]) == self.config.include {
                builder.add_row(row.key.clone(), row.cells.clone())?;
            }
        }

        log::debug!(
            "RowFilter {}: kept {} of {} rows",
            ctx.node_id(),
            builder.len(),
            input.size()
        );
        Ok(vec![builder.close()])
    }

    fn load_settings(&mut self, settings: &NodeSettings) -> Result<()> {
        let config: RowFilterConfig = settings.to_config()?;
        config.validate()?;
        self.config = config;
        Ok(())
    }

    fn save_settings(&self, settings: &mut NodeSettings) {
        save_config("row-filter", &self.config, settings);
    }

    fn validate_settings(&self, settings: &NodeSettings) -> Result<()> {
        settings.to_config::<RowFilterConfig>()?.validate()
    }
}
