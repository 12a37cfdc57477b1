//! Shared plumbing for built-in node kinds
//!
//! Every built-in kind is a model type implementing [`NodeDescriptor`].
//! [`DescriptorFactory`] turns such a type into a [`NodeFactory`] so the
//! registry never needs a hand-written factory per kind.

use std::marker::PhantomData;

use datagraph_engine::{
    DialogField, FieldListDialog, NodeDialog, NodeFactory, NodeMetadata, NodeModel, NodeSettings,
    NodeView, TablePreviewView,
};
use serde::Serialize;

/// Static description of a built-in node kind
pub trait NodeDescriptor: NodeModel + Default + 'static {
    /// Metadata registered for this kind
    fn descriptor() -> NodeMetadata;

    /// Editable settings; an empty list means the kind has no dialog
    fn dialog_fields() -> Vec<DialogField> {
        Vec::new()
    }
}

/// [`NodeFactory`] for any [`NodeDescriptor`]
pub struct DescriptorFactory<N> {
    metadata: NodeMetadata,
    _kind: PhantomData<fn() -> N>,
}

impl<N: NodeDescriptor> DescriptorFactory<N> {
    pub fn new() -> Self {
        Self {
            metadata: N::descriptor(),
            _kind: PhantomData,
        }
    }
}

impl<N: NodeDescriptor> Default for DescriptorFactory<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: NodeDescriptor> NodeFactory for DescriptorFactory<N> {
    fn metadata(&self) -> &NodeMetadata {
        &self.metadata
    }

    fn create_model(&self) -> Box<dyn NodeModel> {
        Box::new(N::default())
    }

    fn create_dialog(&self) -> Option<Box<dyn NodeDialog>> {
        let fields = N::dialog_fields();
        if fields.is_empty() {
            None
        } else {
            Some(Box::new(FieldListDialog::new(fields)))
        }
    }

    fn create_view(&self) -> Option<Box<dyn NodeView>> {
        Some(Box::new(TablePreviewView::default()))
    }
}

/// Write a config struct into `settings`, keeping keys it does not own
pub(crate) fn save_config<T: Serialize>(node_type: &str, config: &T, settings: &mut NodeSettings) {
    match NodeSettings::from_config(config) {
        Ok(values) => settings.merge(values),
        Err(e) => log::warn!("Failed to save {} settings: {}", node_type, e),
    }
}

/// Report progress every this many rows
pub(crate) const PROGRESS_INTERVAL: usize = 1000;
