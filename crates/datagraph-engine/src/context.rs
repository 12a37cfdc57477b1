//! Execution context handed to a node's `execute`
//!
//! The context is scoped to one run of one node. It is the only sanctioned
//! way to create output tables, and carries the run's cancellation token and
//! a progress channel back to the engine's event sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{NodeError, Result};
use crate::events::{EventContext, EventSink, NodeEvent};
use crate::table::{TableBuilder, TableSpec};
use crate::types::{NodeId, NodeStatus};

/// Cooperative cancellation flag shared by everything in one run
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop at its next suspension point
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Capability object for one node execution
pub struct ExecutionContext {
    node_id: NodeId,
    run_id: String,
    cancel: CancelToken,
    sink: Arc<dyn EventSink>,
    last_progress: Mutex<f64>,
    warning: Mutex<Option<String>>,
}

impl ExecutionContext {
    pub fn new(
        node_id: impl Into<NodeId>,
        run_id: impl Into<String>,
        cancel: CancelToken,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            run_id: run_id.into(),
            cancel,
            sink,
            last_progress: Mutex::new(0.0),
            warning: Mutex::new(None),
        }
    }

    /// Id of the running node
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Id of the enclosing run
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Start an output table with the given spec
    pub fn create_data_table(&self, spec: TableSpec) -> TableBuilder {
        TableBuilder::new(spec)
    }

    /// Fail with [`NodeError::Canceled`] if the run has been asked to stop
    pub fn check_canceled(&self) -> Result<()> {
        if self.cancel.is_canceled() {
            Err(NodeError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Report progress; `fraction` is clamped to `[0, 1]`
    pub fn set_progress(&self, fraction: f64, message: Option<&str>) {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        if let Ok(mut last) = self.last_progress.lock() {
            if fraction < *last {
                log::debug!(
                    "Node {} reported decreasing progress {} -> {}",
                    self.node_id,
                    *last,
                    fraction
                );
            }
            *last = fraction;
        }

        let event = NodeEvent::new(&self.node_id, NodeStatus::Executing).with_context(
            EventContext::for_run(&self.run_id)
                .with_progress(fraction, message.map(str::to_string)),
        );
        if let Err(e) = self.sink.send(event) {
            log::warn!("Failed to relay progress for node {}: {}", self.node_id, e);
        }
    }

    /// Finish with a warning instead of plain success; the last call wins
    pub fn set_warning(&self, message: impl Into<String>) {
        if let Ok(mut warning) = self.warning.lock() {
            *warning = Some(message.into());
        }
    }

    /// Warning set so far, if any
    pub fn warning(&self) -> Option<String> {
        self.warning.lock().ok().and_then(|w| w.clone())
    }

    pub(crate) fn take_warning(&self) -> Option<String> {
        self.warning.lock().ok().and_then(|mut w| w.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::VecEventSink;

    fn make_context(sink: Arc<VecEventSink>, cancel: CancelToken) -> ExecutionContext {
        ExecutionContext::new("node-1", "run-1", cancel, sink)
    }

    #[test]
    fn test_check_canceled() {
        let token = CancelToken::new();
        let ctx = make_context(Arc::new(VecEventSink::new()), token.clone());
        assert!(ctx.check_canceled().is_ok());

        token.cancel();
        assert!(matches!(ctx.check_canceled(), Err(NodeError::Canceled)));
    }

    #[test]
    fn test_progress_is_clamped_and_relayed() {
        let sink = Arc::new(VecEventSink::new());
        let ctx = make_context(sink.clone(), CancelToken::new());

        ctx.set_progress(1.7, Some("almost"));
        ctx.set_progress(-3.0, None);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        let first = events[0].context.as_ref().unwrap();
        assert_eq!(first.progress, Some(1.0));
        assert_eq!(first.message.as_deref(), Some("almost"));
        assert_eq!(events[1].context.as_ref().unwrap().progress, Some(0.0));
        assert!(events.iter().all(|e| e.status == NodeStatus::Executing));
    }

    #[test]
    fn test_warning_taken_once() {
        let ctx = make_context(Arc::new(VecEventSink::new()), CancelToken::new());
        ctx.set_warning("3 rows dropped");
        assert_eq!(ctx.take_warning().as_deref(), Some("3 rows dropped"));
        assert!(ctx.take_warning().is_none());
    }
}
