//! Node kind registry
//!
//! Maps node type ids to their [`NodeFactory`]. The registry is an ordinary
//! value: the application root constructs one, registers the kinds it wants
//! (see `datagraph_nodes::register_builtins`) and hands it to the engine.
//!
//! # Usage
//!
//! ```ignore
//! let mut registry = NodeRegistry::new();
//! registry.register(Arc::new(MyNodeFactory::default()));
//! let engine = WorkflowEngine::new(Arc::new(registry), sink);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::node::{NodeFactory, NodeMetadata, NodeModel};
use crate::types::NodeCategory;

/// Registry of node kinds keyed by node type id
///
/// # Composability
///
/// Registries can be composed by merging:
/// ```ignore
/// let mut registry = NodeRegistry::new();
/// // Register built-in nodes...
/// registry.merge(plugin_registry); // Add plugin nodes
/// ```
#[derive(Clone, Default)]
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node kind; a later registration with the same id wins
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let node_type = factory.metadata().node_type.clone();
        if self.factories.insert(node_type.clone(), factory).is_some() {
            log::debug!("Replaced factory for node type '{}'", node_type);
        }
    }

    /// Factory for a node type
    pub fn get_factory(&self, node_type: &str) -> Option<Arc<dyn NodeFactory>> {
        self.factories.get(node_type).cloned()
    }

    /// All factories, sorted by node type id
    pub fn all_factories(&self) -> Vec<Arc<dyn NodeFactory>> {
        let mut factories: Vec<_> = self.factories.values().cloned().collect();
        factories.sort_by(|a, b| a.metadata().node_type.cmp(&b.metadata().node_type));
        factories
    }

    /// Factories in one category, sorted by node type id
    pub fn factories_by_category(&self, category: NodeCategory) -> Vec<Arc<dyn NodeFactory>> {
        self.all_factories()
            .into_iter()
            .filter(|f| f.metadata().category == category)
            .collect()
    }

    /// Get metadata for a node type
    pub fn get_metadata(&self, node_type: &str) -> Option<&NodeMetadata> {
        self.factories.get(node_type).map(|f| f.metadata())
    }

    /// Construct a fresh model for a node type
    pub fn create_model(&self, node_type: &str) -> Option<Box<dyn NodeModel>> {
        self.factories.get(node_type).map(|f| f.create_model())
    }

    /// Check if a node type is registered
    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// List all registered node type strings
    pub fn node_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` if they share the same node type.
    pub fn merge(&mut self, other: NodeRegistry) {
        self.factories.extend(other.factories);
    }
}
