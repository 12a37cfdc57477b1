//! Settings editing surface
//!
//! A [`NodeDialog`] describes which settings a node kind exposes for editing.
//! A [`DialogSession`] binds that description to a draft copy of a node's
//! settings; edits only touch the draft until [`DialogSession::save`] hands
//! back validated settings for the host to pass to
//! [`WorkflowEngine::update_settings`](crate::engine::WorkflowEngine::update_settings).

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::node::NodeModel;
use crate::settings::NodeSettings;

/// Widget kind for one editable setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Toggle,
    /// One of a fixed set of values
    Choice { options: Vec<String> },
    /// List of column names
    Columns,
    /// Free-form JSON
    Json,
}

/// One editable setting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogField {
    pub key: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl DialogField {
    pub fn new(key: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind,
        }
    }
}

/// Describes the editable settings of a node kind
pub trait NodeDialog: Send + Sync {
    fn fields(&self) -> Vec<DialogField>;
}

/// Dialog built from a fixed field list
pub struct FieldListDialog {
    fields: Vec<DialogField>,
}

impl FieldListDialog {
    pub fn new(fields: Vec<DialogField>) -> Self {
        Self { fields }
    }
}

impl NodeDialog for FieldListDialog {
    fn fields(&self) -> Vec<DialogField> {
        self.fields.clone()
    }
}

/// Draft editing state for one node's settings
pub struct DialogSession {
    fields: Vec<DialogField>,
    committed: NodeSettings,
    draft: NodeSettings,
}

impl DialogSession {
    /// Open a session on the model's current settings
    pub fn open(dialog: &dyn NodeDialog, model: &dyn NodeModel) -> Self {
        let mut committed = NodeSettings::new();
        model.save_settings(&mut committed);
        Self {
            fields: dialog.fields(),
            draft: committed.clone(),
            committed,
        }
    }

    pub fn fields(&self) -> &[DialogField] {
        &self.fields
    }

    pub fn draft(&self) -> &NodeSettings {
        &self.draft
    }

    /// Edit the draft; the model and engine are untouched
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.draft.set(key, value);
    }

    /// Whether the draft differs from the committed settings
    pub fn is_dirty(&self) -> bool {
        self.draft != self.committed
    }

    /// Throw away draft edits
    pub fn discard(&mut self) {
        self.draft = self.committed.clone();
    }

    /// Validate the draft against `model` and return it for committing.
    ///
    /// On failure the draft is kept so the user can fix it.
    pub fn save(&mut self, model: &dyn NodeModel) -> Result<NodeSettings> {
        model.validate_settings(&self.draft)?;
        self.committed = self.draft.clone();
        Ok(self.committed.clone())
    }
}
