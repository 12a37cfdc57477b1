//! Output inspection
//!
//! A [`NodeView`] receives a node's last outputs and renders them into a
//! presentation-neutral [`ViewSnapshot`]. Hosts decide how to draw it.

use serde::{Deserialize, Serialize};

use crate::table::TableRef;

/// Rendered state of a view
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    /// One section per output table
    pub sections: Vec<ViewSection>,
    /// Set when the model changed since the data was loaded
    pub stale: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSection {
    pub header: Vec<String>,
    pub lines: Vec<Vec<String>>,
    pub total_rows: usize,
}

/// Renders a model's last outputs
///
/// Views belong to the host. Forward node events to open views with
/// [`WorkflowEngine::sync_view`](crate::engine::WorkflowEngine::sync_view).
pub trait NodeView: Send + Sync {
    /// Receive the outputs of the latest successful execution
    fn set_loaded_data(&mut self, outputs: &[TableRef]);

    /// The model's settings or status changed; cached data may be stale
    fn on_model_changed(&mut self);

    fn render(&self) -> ViewSnapshot;
}

/// Text preview of the first rows of every output table
pub struct TablePreviewView {
    max_rows: usize,
    outputs: Vec<TableRef>,
    stale: bool,
}

impl TablePreviewView {
    pub fn new(max_rows: usize) -> Self {
        Self {
            max_rows,
            outputs: Vec::new(),
            stale: false,
        }
    }
}

impl Default for TablePreviewView {
    fn default() -> Self {
        Self::new(20)
    }
}

impl NodeView for TablePreviewView {
    fn set_loaded_data(&mut self, outputs: &[TableRef]) {
        self.outputs = outputs.to_vec();
        self.stale = false;
    }

    fn on_model_changed(&mut self) {
        self.outputs.clear();
        self.stale = true;
    }

    fn render(&self) -> ViewSnapshot {
        let sections = self
            .outputs
            .iter()
            .map(|table| {
                let mut header = vec!["RowID".to_string()];
                header.extend(table.spec().column_names().map(str::to_string));
                let lines = table
                    .rows()
                    .iter()
                    .take(self.max_rows)
                    .map(|row| {
                        let mut line = vec![row.key.clone()];
                        line.extend(row.cells.iter().map(|c| c.to_string()));
                        line
                    })
                    .collect();
                ViewSection {
                    header,
                    lines,
                    total_rows: table.size(),
                }
            })
            .collect();
        ViewSnapshot {
            sections,
            stale: self.stale,
        }
    }
}
