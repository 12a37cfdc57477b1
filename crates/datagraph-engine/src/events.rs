//! Status events emitted by the engine
//!
//! Every status transition is reported synchronously through a single
//! [`EventSink`]. The host maps these into UI state and persists dashboard
//! items carried on success events.

use serde::{Deserialize, Serialize};

use crate::dashboard::DashboardItem;
use crate::error::NodeFailure;
use crate::table::TableRef;
use crate::types::{NodeId, NodeStatus};

/// Trait for receiving node status transitions
///
/// This abstracts over the transport mechanism (UI channel, mpsc, log, etc.)
/// allowing the engine to be used in different contexts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be delivered (e.g., channel closed)
    fn send(&self, event: NodeEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Extra information attached to a transition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    /// Run this transition belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Progress fraction in `[0, 1]` while executing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Progress or warning message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Dashboard items published on success
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dashboard_items: Vec<DashboardItem>,
}

impl EventContext {
    pub fn for_run(run_id: &str) -> Self {
        Self {
            run_id: Some(run_id.to_string()),
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, progress: f64, message: Option<String>) -> Self {
        self.progress = Some(progress);
        self.message = message;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_dashboard_items(mut self, items: Vec<DashboardItem>) -> Self {
        self.dashboard_items = items;
        self
    }
}

/// One status transition: `(nodeId, status, outputs?, error?, context?)`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEvent {
    pub node_id: NodeId,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<TableRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<EventContext>,
}

impl NodeEvent {
    pub fn new(node_id: &str, status: NodeStatus) -> Self {
        Self {
            node_id: node_id.to_string(),
            status,
            outputs: None,
            error: None,
            context: None,
        }
    }

    pub fn with_outputs(mut self, outputs: Vec<TableRef>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn with_error(mut self, error: NodeFailure) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_context(mut self, context: EventContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: NodeEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: std::sync::Mutex<Vec<NodeEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<NodeEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Statuses reported for one node, in order
    pub fn statuses_for(&self, node_id: &str) -> Vec<NodeStatus> {
        self.events()
            .into_iter()
            .filter(|e| e.node_id == node_id)
            .map(|e| e.status)
            .collect()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: NodeEvent) -> Result<(), EventError> {
        self.events
            .lock()
            .map_err(|_| EventError {
                message: "Event buffer poisoned".to_string(),
            })?
            .push(event);
        Ok(())
    }
}
