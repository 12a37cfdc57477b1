//! Missing Values Node
//!
//! Replaces or removes missing cells (null, or empty text) column by column.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use datagraph_engine::{
    expect_inputs, Cell, DataType, DialogField, ExecutionContext, FieldKind, NodeCategory,
    NodeError, NodeMetadata, NodeModel, NodeSettings, PortMetadata, Result, Table, TableRef,
    TableSpec,
};
use serde::{Deserialize, Serialize};

use crate::descriptor::{save_config, NodeDescriptor, PROGRESS_INTERVAL};
use crate::numeric::{mean, median};

/// Treatment of missing cells in one column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissingValueMethod {
    #[default]
    DoNothing,
    /// Drop every row missing a value in this column
    RemoveRow,
    /// Replace with the configured `fixed_value`
    FixedValue,
    /// Replace with the column mean (number columns only)
    Mean,
    /// Replace with the column median (number columns only)
    Median,
    /// Replace with the most common value; ties go to the value seen first
    MostFrequent,
    /// Replace with the closest non-missing value above
    Previous,
}

impl MissingValueMethod {
    pub const ALL: [MissingValueMethod; 7] = [
        Self::DoNothing,
        Self::RemoveRow,
        Self::FixedValue,
        Self::Mean,
        Self::Median,
        Self::MostFrequent,
        Self::Previous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DoNothing => "DO_NOTHING",
            Self::RemoveRow => "REMOVE_ROW",
            Self::FixedValue => "FIXED_VALUE",
            Self::Mean => "MEAN",
            Self::Median => "MEDIAN",
            Self::MostFrequent => "MOST_FREQUENT",
            Self::Previous => "PREVIOUS",
        }
    }

    fn numeric_only(&self) -> bool {
        matches!(self, Self::Mean | Self::Median)
    }
}

/// Configuration for missing value handling
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissingValuesConfig {
    /// Method for columns without an entry in `column_methods`
    pub default_method: MissingValueMethod,
    /// Per-column overrides
    pub column_methods: BTreeMap<String, MissingValueMethod>,
    /// Replacement literal for `FIXED_VALUE`
    pub fixed_value: serde_json::Value,
}

impl MissingValuesConfig {
    fn validate(&self) -> Result<()> {
        let uses_fixed = self.default_method == MissingValueMethod::FixedValue
            || self
                .column_methods
                .values()
                .any(|m| *m == MissingValueMethod::FixedValue);
        if uses_fixed && self.fixed_value.is_null() {
            return Err(NodeError::validation("FIXED_VALUE needs a fixed_value"));
        }
        Ok(())
    }
}

/// What to do with a missing cell in one column, after looking at the data
#[derive(Debug, Clone, PartialEq)]
enum Fill {
    Keep,
    Remove,
    Constant(Cell),
    Previous,
}

/// Missing Values
///
/// `column_methods` entries must name existing columns, and may only use
/// MEAN or MEDIAN on number columns or FIXED_VALUE with a literal that fits
/// the column. The default method silently skips columns it does not apply
/// to. A statistic over a column with no values leaves its cells missing
/// and finishes with a warning.
#[derive(Debug, Clone, Default)]
pub struct MissingValuesModel {
    config: MissingValuesConfig,
}

impl MissingValuesModel {
    pub const PORT_INPUT: usize = 0;
    pub const PORT_OUTPUT: usize = 0;

    pub fn with_config(config: MissingValuesConfig) -> Self {
        Self { config }
    }

    fn applies(&self, method: MissingValueMethod, data_type: DataType) -> bool {
        match method {
            MissingValueMethod::Mean | MissingValueMethod::Median => data_type == DataType::Number,
            MissingValueMethod::FixedValue => {
                Cell::from_json(data_type, &self.config.fixed_value).is_some()
            }
            _ => true,
        }
    }

    /// Effective method per column
    fn methods(&self, spec: &TableSpec) -> Result<Vec<MissingValueMethod>> {
        for (name, method) in &self.config.column_methods {
            let index = spec.require_column(name)?;
            let data_type = spec.columns()[index].data_type;
            if !self.applies(*method, data_type) {
                let reason = if method.numeric_only() {
                    "needs a number column".to_string()
                } else {
                    format!("value {} does not fit", self.config.fixed_value)
                };
                return Err(NodeError::configuration(format!(
                    "{} cannot be used on {} column '{}': {}",
                    method.as_str(),
                    data_type,
                    name,
                    reason
                )));
            }
        }

        Ok(spec
            .columns()
            .iter()
            .map(|column| match self.config.column_methods.get(&column.name) {
                Some(method) => *method,
                None if self.applies(self.config.default_method, column.data_type) => {
                    self.config.default_method
                }
                None => MissingValueMethod::DoNothing,
            })
            .collect())
    }

    fn fill_for(
        &self,
        method: MissingValueMethod,
        table: &Table,
        index: usize,
        warnings: &mut Vec<String>,
    ) -> Fill {
        let column = &table.spec().columns()[index];
        let values = || table.column_cells(index).filter(|c| !c.is_missing());
        let statistic = match method {
            MissingValueMethod::DoNothing => return Fill::Keep,
            MissingValueMethod::RemoveRow => return Fill::Remove,
            MissingValueMethod::Previous => return Fill::Previous,
            MissingValueMethod::FixedValue => {
                Cell::from_json(column.data_type, &self.config.fixed_value)
            }
            MissingValueMethod::Mean => {
                let numbers: Vec<f64> = values().filter_map(Cell::as_f64).collect();
                mean(&numbers).map(Cell::number)
            }
            MissingValueMethod::Median => {
                let numbers: Vec<f64> = values().filter_map(Cell::as_f64).collect();
                median(numbers).map(Cell::number)
            }
            MissingValueMethod::MostFrequent => most_frequent(values()),
        };

        match statistic {
            Some(cell) => Fill::Constant(cell),
            None => {
                warnings.push(format!(
                    "Column '{}' has no values for {}; left missing",
                    column.name,
                    method.as_str()
                ));
                Fill::Keep
            }
        }
    }
}

/// Most common cell; ties go to the value that appeared first
fn most_frequent<'a>(cells: impl Iterator<Item = &'a Cell>) -> Option<Cell> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut firsts: Vec<&Cell> = Vec::new();
    for cell in cells {
        let key = cell.to_json().to_string();
        let entry = counts.entry(key).or_insert((0, firsts.len()));
        if entry.0 == 0 {
            firsts.push(cell);
        }
        entry.0 += 1;
    }
    counts
        .values()
        .max_by(|(count_a, order_a), (count_b, order_b)| {
            count_a.cmp(count_b).then(order_b.cmp(order_a))
        })
        .map(|&(_, order)| firsts[order].clone())
}

impl NodeDescriptor for MissingValuesModel {
    fn descriptor() -> NodeMetadata {
        NodeMetadata {
            node_type: "missing-values".to_string(),
            label: "Missing Values".to_string(),
            description: "Fills or removes missing cells".to_string(),
            category: NodeCategory::Manipulation,
            inputs: vec![PortMetadata::new("Table", "Table with missing cells")],
            outputs: vec![PortMetadata::new("Cleaned", "Table after treatment")],
            dashboard_outputs: vec![],
        }
    }

    fn dialog_fields() -> Vec<DialogField> {
        vec![
            DialogField::new(
                "default_method",
                "Default method",
                FieldKind::Choice {
                    options: MissingValueMethod::ALL
                        .iter()
                        .map(|m| m.as_str().to_string())
                        .collect(),
                },
            ),
            DialogField::new("column_methods", "Per-column methods", FieldKind::Json),
            DialogField::new("fixed_value", "Fixed value", FieldKind::Json),
        ]
    }
}

#[async_trait]
impl NodeModel for MissingValuesModel {
    fn input_port_count(&self) -> usize {
        1
    }

    fn output_port_count(&self) -> usize {
        1
    }

    fn configure(&self, input_specs: &[TableSpec]) -> Result<Vec<TableSpec>> {
        expect_inputs(input_specs, 1)?;
        self.methods(&input_specs[0])?;
        Ok(vec![input_specs[0].clone()])
    }

    async fn execute(&self, inputs: &[TableRef], ctx: &ExecutionContext) -> Result<Vec<Table>> {
        let input = &inputs[Self::PORT_INPUT];
        let methods = self.methods(input.spec())?;

        let mut warnings = Vec::new();
        let fills: Vec<Fill> = methods
            .iter()
            .enumerate()
            .map(|(i, method)| self.fill_for(*method, input, i, &mut warnings))
            .collect();
        ctx.check_canceled()?;

        let mut previous: Vec<Option<Cell>> = vec![None; fills.len()];
        let mut builder = ctx.create_data_table(input.spec().clone());
        let mut removed = 0;
        for (i, row) in input.rows().iter().enumerate() {
            if i % PROGRESS_INTERVAL == 0 {
                ctx.check_canceled()?;
                ctx.set_progress(i as f64 / input.size() as f64, None);
            }

            let drop = row
                .cells
                .iter()
                .zip(&fills)
                .any(|(cell, fill)| *fill == Fill::Remove && cell.is_missing());
            if drop {
                removed += 1;
                continue;
            }

            let mut cells = Vec::with_capacity(row.cells.len());
            for (c, cell) in row.cells.iter().enumerate() {
                if !cell.is_missing() {
                    previous[c] = Some(cell.clone());
                    cells.push(cell.clone());
                    continue;
                }
                let filled = match &fills[c] {
                    Fill::Constant(value) => value.clone(),
                    Fill::Previous => previous[c].clone().unwrap_or_else(|| cell.clone()),
                    Fill::Keep | Fill::Remove => cell.clone(),
                };
                cells.push(filled);
            }
            builder.add_row(row.key.clone(), cells)?;
        }

        log::debug!(
            "MissingValues {}: {} rows in, {} removed",
            ctx.node_id(),
            input.size(),
            removed
        );
        if !warnings.is_empty() {
            ctx.set_warning(warnings.join("; "));
        }
        Ok(vec![builder.close()])
    }

    fn load_settings(&mut self, settings: &NodeSettings) -> Result<()> {
        let config: MissingValuesConfig = settings.to_config()?;
        config.validate()?;
        self.config = config;
        Ok(())
    }

    fn save_settings(&self, settings: &mut NodeSettings) {
        save_config("missing-values", &self.config, settings);
    }

    fn validate_settings(&self, settings: &NodeSettings) -> Result<()> {
        settings.to_config::<MissingValuesConfig>()?.validate()
    }
}
