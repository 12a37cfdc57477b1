//! Dashboard output channel
//!
//! Factories may tag output ports as dashboard-worthy. After a successful
//! execution the engine maps those outputs into plain [`DashboardItem`]s
//! and hands them to the host via the success event and the run report.
//! Mapping problems are logged and skipped; they never change node status.
//!
//! Port shapes:
//! - `table`: any table; projected to column names, the first rows, and
//!   per-column statistics.
//! - `statistics`: a table whose first row has `summary` (string),
//!   `metrics` (json) and `details` (json) columns.
//! - `chart`: a table whose first row has `chart_type` (string), `config`
//!   (json) and `data` (json) columns.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::table::{Cell, DataType, Table, TableRef};

/// Shape of a dashboard-worthy output port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardShape {
    Table,
    Statistics,
    Chart,
}

/// Declaration of one dashboard-worthy output port
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOutput {
    /// Output port index
    pub port: usize,
    pub shape: DashboardShape,
    /// Title template; `{label}` and `{port}` are substituted
    pub title: String,
    /// Description template; same placeholders as `title`
    #[serde(default)]
    pub description: String,
}

impl DashboardOutput {
    pub fn new(port: usize, shape: DashboardShape, title: impl Into<String>) -> Self {
        Self {
            port,
            shape,
            title: title.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Summary of one table column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnStatistics {
    pub name: String,
    pub data_type: DataType,
    /// Non-missing values
    pub count: usize,
    pub missing: usize,
    pub distinct: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
}

/// Compute [`ColumnStatistics`] for column `index` of `table`
pub fn column_statistics(table: &Table, index: usize) -> Option<ColumnStatistics> {
    let column = table.spec().column(index)?;
    let mut missing = 0;
    let mut distinct: HashSet<String> = HashSet::new();
    let mut numbers: Vec<f64> = Vec::new();

    for cell in table.column_cells(index) {
        if cell.is_missing() {
            missing += 1;
            continue;
        }
        distinct.insert(cell.to_json().to_string());
        if let Some(n) = cell.as_f64() {
            numbers.push(n);
        }
    }

    let count = table.size() - missing;
    let (min, max, mean) = if numbers.is_empty() {
        (None, None, None)
    } else {
        let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
        let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
        (Some(min), Some(max), Some(mean))
    };

    Some(ColumnStatistics {
        name: column.name.clone(),
        data_type: column.data_type,
        count,
        missing,
        distinct: distinct.len(),
        min,
        max,
        mean,
    })
}

/// Item published to the host's dashboard store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardItem {
    #[serde(rename_all = "camelCase")]
    Table {
        title: String,
        description: String,
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
        column_stats: Vec<ColumnStatistics>,
        total_rows: usize,
        node_id: String,
        node_label: String,
    },
    #[serde(rename_all = "camelCase")]
    Statistics {
        title: String,
        description: String,
        summary: String,
        metrics: serde_json::Value,
        details: serde_json::Value,
        node_id: String,
        node_label: String,
    },
    #[serde(rename_all = "camelCase")]
    Chart {
        title: String,
        description: String,
        chart_type: String,
        config: serde_json::Value,
        data: serde_json::Value,
        node_id: String,
        node_label: String,
    },
}

impl DashboardItem {
    pub fn title(&self) -> &str {
        match self {
            Self::Table { title, .. } | Self::Statistics { title, .. } | Self::Chart { title, .. } => {
                title
            }
        }
    }

    pub fn node_id(&self) -> &str {
        match self {
            Self::Table { node_id, .. }
            | Self::Statistics { node_id, .. }
            | Self::Chart { node_id, .. } => node_id,
        }
    }
}

/// Where a set of outputs came from
#[derive(Debug, Clone)]
pub struct DashboardContext<'a> {
    pub node_id: &'a str,
    /// Tagged ports of the node's factory
    pub declared: &'a [DashboardOutput],
    /// Maximum rows copied into a table item
    pub row_limit: usize,
}

/// Map a node's raw outputs into dashboard items.
///
/// Only ports listed in `context.declared` are published. `label` is the
/// node's display label, substituted into title templates.
pub fn send_outputs_to_dashboard(
    outputs: &[TableRef],
    context: &DashboardContext<'_>,
    label: &str,
) -> Vec<DashboardItem> {
    let mut items = Vec::new();
    for declared in context.declared {
        let Some(table) = outputs.get(declared.port) else {
            log::warn!(
                "Node {} declares dashboard port {} but produced {} outputs",
                context.node_id,
                declared.port,
                outputs.len()
            );
            continue;
        };
        let title = render_template(&declared.title, label, declared.port);
        let description = render_template(&declared.description, label, declared.port);
        let item = match declared.shape {
            DashboardShape::Table => Some(table_item(table, context, title, description, label)),
            DashboardShape::Statistics => statistics_item(table, context, title, description, label),
            DashboardShape::Chart => chart_item(table, context, title, description, label),
        };
        match item {
            Some(item) => items.push(item),
            None => log::warn!(
                "Node {} output {} does not have the {:?} dashboard layout; skipped",
                context.node_id,
                declared.port,
                declared.shape
            ),
        }
    }
    items
}

fn render_template(template: &str, label: &str, port: usize) -> String {
    template
        .replace("{label}", label)
        .replace("{port}", &port.to_string())
}

fn table_item(
    table: &Table,
    context: &DashboardContext<'_>,
    title: String,
    description: String,
    label: &str,
) -> DashboardItem {
    let columns = table.spec().column_names().map(str::to_string).collect();
    let rows = table
        .rows()
        .iter()
        .take(context.row_limit)
        .map(|row| row.cells.iter().map(Cell::to_json).collect())
        .collect();
    let column_stats = (0..table.spec().num_columns())
        .filter_map(|i| column_statistics(table, i))
        .collect();

    DashboardItem::Table {
        title,
        description,
        columns,
        rows,
        column_stats,
        total_rows: table.size(),
        node_id: context.node_id.to_string(),
        node_label: label.to_string(),
    }
}

/// First-row cell of the named column
fn first_row_cell<'t>(table: &'t Table, column: &str) -> Option<&'t Cell> {
    let index = table.spec().find_column_index(column)?;
    table.rows().first()?.cell(index)
}

fn statistics_item(
    table: &Table,
    context: &DashboardContext<'_>,
    title: String,
    description: String,
    label: &str,
) -> Option<DashboardItem> {
    let summary = first_row_cell(table, "summary")?.as_str()?.to_string();
    let metrics = first_row_cell(table, "metrics")?.to_json();
    let details = first_row_cell(table, "details")?.to_json();
    Some(DashboardItem::Statistics {
        title,
        description,
        summary,
        metrics,
        details,
        node_id: context.node_id.to_string(),
        node_label: label.to_string(),
    })
}

fn chart_item(
    table: &Table,
    context: &DashboardContext<'_>,
    title: String,
    description: String,
    label: &str,
) -> Option<DashboardItem> {
    let chart_type = first_row_cell(table, "chart_type")?.as_str()?.to_string();
    let config = first_row_cell(table, "config")?.to_json();
    let data = first_row_cell(table, "data")?.to_json();
    Some(DashboardItem::Chart {
        title,
        description,
        chart_type,
        config,
        data,
        node_id: context.node_id.to_string(),
        node_label: label.to_string(),
    })
}
