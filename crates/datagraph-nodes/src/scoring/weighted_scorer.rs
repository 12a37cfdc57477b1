//! Weighted Scorer Node
//!
//! Ranks rows by a weighted sum of numeric columns.

use async_trait::async_trait;
use datagraph_engine::{
    expect_inputs, Cell, ColumnSpec, DashboardOutput, DashboardShape, DataType, DialogField,
    ExecutionContext, FieldKind, NodeCategory, NodeError, NodeMetadata, NodeModel, NodeSettings,
    PortMetadata, Result, Table, TableRef, TableSpec,
};
use serde::{Deserialize, Serialize};

use crate::descriptor::{save_config, NodeDescriptor, PROGRESS_INTERVAL};
use crate::numeric::min_max;

/// Allowed distance of the weight sum from 1
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Configuration for the weighted scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightedScorerConfig {
    /// Number columns contributing to the score
    pub columns: Vec<String>,
    /// One weight per column; must sum to 1
    pub weights: Vec<f64>,
    /// Min-max scale each column to [0, 1] before weighting
    pub normalize: bool,
    /// Name of the appended score column
    pub score_column: String,
    /// Highest score first
    pub sort_descending: bool,
}

impl Default for WeightedScorerConfig {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            weights: Vec::new(),
            normalize: true,
            score_column: "score".to_string(),
            sort_descending: true,
        }
    }
}

impl WeightedScorerConfig {
    fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(NodeError::validation("At least one column must be scored"));
        }
        if self.columns.len() != self.weights.len() {
            return Err(NodeError::validation(format!(
                "{} columns but {} weights",
                self.columns.len(),
                self.weights.len()
            )));
        }
        if self.weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(NodeError::validation("Weights must be non-negative numbers"));
        }
        if self.score_column.is_empty() {
            return Err(NodeError::validation("Score column name must not be empty"));
        }
        let total = self.weight_sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(NodeError::validation(format!(
                "weights must sum to 1 (got {})",
                total
            )));
        }
        Ok(())
    }

    fn weight_sum(&self) -> f64 {
        self.weights.iter().sum()
    }
}

/// Weighted Scorer
///
/// Appends `score_column` holding the weighted sum of the selected columns
/// and sorts rows by it (stable, so ties keep input order). Missing cells
/// contribute zero and finish the run with a warning. The weights must sum
/// to 1: settings that break this are rejected, and a model configured
/// directly with such weights fails execution with a domain error.
#[derive(Debug, Clone, Default)]
pub struct WeightedScorerModel {
    config: WeightedScorerConfig,
}

impl WeightedScorerModel {
    pub const PORT_INPUT: usize = 0;
    pub const PORT_OUTPUT: usize = 0;

    pub fn with_config(config: WeightedScorerConfig) -> Self {
        Self { config }
    }

    fn column_indices(&self, spec: &TableSpec) -> Result<Vec<usize>> {
        self.config
            .columns
            .iter()
            .map(|name| {
                let index = spec.require_column(name)?;
                let data_type = spec.columns()[index].data_type;
                if data_type != DataType::Number {
                    return Err(NodeError::configuration(format!(
                        "Scored column '{}' must be a number column, found {}",
                        name, data_type
                    )));
                }
                Ok(index)
            })
            .collect()
    }

    fn output_spec(&self, spec: &TableSpec) -> Result<TableSpec> {
        let mut columns = spec.columns().to_vec();
        columns.push(ColumnSpec::new(
            self.config.score_column.clone(),
            DataType::Number,
        ));
        TableSpec::new(columns)
    }
}

impl NodeDescriptor for WeightedScorerModel {
    fn descriptor() -> NodeMetadata {
        NodeMetadata {
            node_type: "weighted-scorer".to_string(),
            label: "Weighted Scorer".to_string(),
            description: "Scores and ranks rows by a weighted sum of columns".to_string(),
            category: NodeCategory::Scoring,
            inputs: vec![PortMetadata::new("Table", "Rows to score")],
            outputs: vec![PortMetadata::new("Ranked", "Rows with a score, ranked")],
            dashboard_outputs: vec![DashboardOutput::new(
                Self::PORT_OUTPUT,
                DashboardShape::Table,
                "{label} ranking",
            )],
        }
    }

    fn dialog_fields() -> Vec<DialogField> {
        vec![
            DialogField::new("columns", "Columns", FieldKind::Columns),
            DialogField::new("weights", "Weights", FieldKind::Json),
            DialogField::new("normalize", "Normalize columns", FieldKind::Toggle),
            DialogField::new("score_column", "Score column", FieldKind::Text),
            DialogField::new("sort_descending", "Highest first", FieldKind::Toggle),
        ]
    }
}

#[async_trait]
impl NodeModel for WeightedScorerModel {
    fn input_port_count(&self) -> usize {
        1
    }

    fn output_port_count(&self) -> usize {
        1
    }

    fn configure(&self, input_specs: &[TableSpec]) -> Result<Vec<TableSpec>> {
        expect_inputs(input_specs, 1)?;
        self.column_indices(&input_specs[0])?;
        Ok(vec![self.output_spec(&input_specs[0])?])
    }

    async fn execute(&self, inputs: &[TableRef], ctx: &ExecutionContext) -> Result<Vec<Table>> {
        // Models built with `with_config` skip settings validation
        let total = self.config.weight_sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(NodeError::domain(format!(
                "weights must sum to 1 (got {})",
                total
            )));
        }

        let input = &inputs[Self::PORT_INPUT];
        let indices = self.column_indices(input.spec())?;

        // (min, range) per column; a zero range scales to 0
        let scales: Vec<Option<(f64, f64)>> = indices
            .iter()
            .map(|&i| {
                if !self.config.normalize {
                    return None;
                }
                let values: Vec<f64> = input.column_cells(i).filter_map(Cell::as_f64).collect();
                min_max(&values).map(|(lo, hi)| (lo, hi - lo))
            })
            .collect();

        let mut missing = 0;
        let mut scored: Vec<(usize, f64)> = Vec::with_capacity(input.size());
        for (r, row) in input.rows().iter().enumerate() {
            if r % PROGRESS_INTERVAL == 0 {
                ctx.check_canceled()?;
                ctx.set_progress(r as f64 / input.size() as f64, Some("scoring"));
            }
            let mut score = 0.0;
            for ((&column, weight), scale) in
                indices.iter().zip(&self.config.weights).zip(&scales)
            {
                let Some(value) = row.cells[column].as_f64() else {
                    missing += 1;
                    continue;
                };
                let value = match scale {
                    Some((_, range)) if *range == 0.0 => 0.0,
                    Some((min, range)) => (value - min) / range,
                    None => value,
                };
                score += weight * value;
            }
            scored.push((r, score));
        }

        if self.config.sort_descending {
            scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        } else {
            scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        }

        let mut builder = ctx.create_data_table(self.output_spec(input.spec())?);
        for (r, score) in scored {
            let row = &input.rows()[r];
            let mut cells = row.cells.clone();
            cells.push(Cell::number(score));
            builder.add_row(row.key.clone(), cells)?;
        }

        if missing > 0 {
            ctx.set_warning(format!("{} missing cells were scored as 0", missing));
        }
        log::debug!(
            "WeightedScorer {}: scored {} rows on {} columns",
            ctx.node_id(),
            input.size(),
            indices.len()
        );
        Ok(vec![builder.close()])
    }

    fn load_settings(&mut self, settings: &NodeSettings) -> Result<()> {
        let config: WeightedScorerConfig = settings.to_config()?;
        config.validate()?;
        self.config = config;
        Ok(())
    }

    fn save_settings(&self, settings: &mut NodeSettings) {
        save_config("weighted-scorer", &self.config, settings);
    }

    fn validate_settings(&self, settings: &NodeSettings) -> Result<()> {
        settings.to_config::<WeightedScorerConfig>()?.validate()
    }
}
