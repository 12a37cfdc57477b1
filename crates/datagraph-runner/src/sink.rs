//! Event sink that reports node transitions through the `log` facade

use datagraph_engine::{EventError, EventSink, NodeEvent, NodeStatus};
use log::Level;

/// Logs every transition; progress goes to debug, failures to warn/error
#[derive(Debug, Default)]
pub struct LoggingEventSink;

impl LoggingEventSink {
    pub fn new() -> Self {
        Self
    }
}

/// Level and message for one event
fn describe(event: &NodeEvent) -> (Level, String) {
    let context = event.context.as_ref();
    let message = context.and_then(|c| c.message.as_deref());
    match event.status {
        NodeStatus::Executing => {
            let progress = context.and_then(|c| c.progress).unwrap_or(0.0);
            let mut line = format!("{} executing ({:.0}%)", event.node_id, progress * 100.0);
            if let Some(message) = message {
                line.push_str(": ");
                line.push_str(message);
            }
            (Level::Debug, line)
        }
        NodeStatus::Success => {
            let tables = event.outputs.as_ref().map_or(0, Vec::len);
            let items = context.map_or(0, |c| c.dashboard_items.len());
            (
                Level::Info,
                format!(
                    "{} succeeded ({} tables, {} dashboard items)",
                    event.node_id, tables, items
                ),
            )
        }
        NodeStatus::Warning => (
            Level::Warn,
            format!("{} finished with warning: {}", event.node_id, message.unwrap_or("")),
        ),
        NodeStatus::Error => {
            let reason = event
                .error
                .as_ref()
                .map(|e| format!("{:?}: {}", e.kind, e.message))
                .unwrap_or_default();
            (Level::Error, format!("{} failed: {}", event.node_id, reason))
        }
        NodeStatus::Idle => match &event.error {
            Some(e) => (
                Level::Warn,
                format!("{} not run: {}", event.node_id, e.message),
            ),
            None => (Level::Debug, format!("{} idle", event.node_id)),
        },
        NodeStatus::Reset => (Level::Debug, format!("{} reset", event.node_id)),
    }
}

impl EventSink for LoggingEventSink {
    fn send(&self, event: NodeEvent) -> Result<(), EventError> {
        let (level, message) = describe(&event);
        log::log!(level, "{}", message);
        Ok(())
    }
}
