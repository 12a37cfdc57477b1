//! Workflow execution engine
//!
//! [`WorkflowEngine`] owns the node arena, the edge list and the per-node
//! execution state. It is responsible for:
//!
//! - **Cascading invalidation**: any edit resets the touched node and every
//!   node reachable downstream of it, clearing cached outputs and errors
//! - **Schema propagation**: after each edit, nodes whose inputs have known
//!   specs are configured in topological order
//! - **Runs**: single-node runs pull incomplete ancestors first; full runs
//!   walk one topological order and block only the branches below a failure
//!
//! All transitions are reported synchronously through the [`EventSink`].
//! Node-level failures never cross the engine boundary as `Err`; they become
//! `Error` statuses with a [`NodeFailure`] attached.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::context::{CancelToken, ExecutionContext};
use crate::dashboard::{send_outputs_to_dashboard, DashboardContext, DashboardItem};
use crate::dialog::DialogSession;
use crate::error::{
    ConnectionError, EngineError, EngineResult, ErrorKind, NodeError, NodeFailure, Result,
};
use crate::events::{EventContext, EventSink, NodeEvent};
use crate::graph::{try_connect, Adjacency};
use crate::node::NodeModel;
use crate::registry::NodeRegistry;
use crate::settings::NodeSettings;
use crate::table::{Table, TableRef, TableSpec};
use crate::types::{GraphEdge, GraphNode, NodeId, NodeStatus, WorkflowGraph};
use crate::validation::validate_workflow;
use crate::view::NodeView;

/// One node instance in the arena
struct NodeSlot {
    node_type: String,
    label: String,
    model: Box<dyn NodeModel>,
    /// Last settings handed to the node, valid or not
    settings: NodeSettings,
    status: NodeStatus,
    outputs: Option<Vec<TableRef>>,
    output_specs: Option<Vec<TableSpec>>,
    error: Option<NodeFailure>,
    /// Rejected settings; survives resets until settings are fixed
    settings_error: Option<NodeFailure>,
}

/// A node that failed during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedNode {
    pub node_id: NodeId,
    pub error: NodeFailure,
}

/// Outcome of one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    /// Nodes executed successfully, in execution order
    pub executed: Vec<NodeId>,
    /// Nodes that failed, or were already failed and not retried
    pub failed: Vec<FailedNode>,
    /// Nodes skipped because something upstream failed
    pub blocked: Vec<NodeId>,
    /// The run was canceled before finishing
    pub canceled: bool,
    /// Dashboard items published by executed nodes
    pub dashboard_items: Vec<DashboardItem>,
}

impl RunReport {
    fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            ..Self::default()
        }
    }

    /// Nothing failed, nothing was blocked and the run was not canceled
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty() && !self.canceled
    }
}

/// Graph execution engine
///
/// Operations take `&mut self`; a host that shares the engine between tasks
/// wraps it in a `tokio::sync::Mutex`, which also keeps edits out of a run.
pub struct WorkflowEngine {
    graph_id: String,
    graph_name: String,
    nodes: HashMap<NodeId, NodeSlot>,
    /// Node ids in insertion order
    order: Vec<NodeId>,
    edges: Vec<GraphEdge>,
    adjacency: Adjacency,
    registry: Arc<NodeRegistry>,
    sink: Arc<dyn EventSink>,
    config: EngineConfig,
}

impl WorkflowEngine {
    /// Create an empty engine over a populated registry
    pub fn new(registry: Arc<NodeRegistry>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            graph_id: "workflow".to_string(),
            graph_name: "Untitled workflow".to_string(),
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: Vec::new(),
            adjacency: Adjacency::default(),
            registry,
            sink,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Add a node of a registered kind.
    ///
    /// Rejected settings do not fail the call: the node is added in `Error`
    /// with a validation failure and blocks execution until fixed.
    pub fn add_node(
        &mut self,
        id: impl Into<NodeId>,
        node_type: &str,
        settings: NodeSettings,
    ) -> EngineResult<()> {
        let id = id.into();
        self.insert_node(GraphNode {
            label: id.clone(),
            id,
            node_type: node_type.to_string(),
            settings,
        })?;
        self.rebuild_adjacency();
        self.propagate_specs();
        Ok(())
    }

    /// Remove a node and its edges; former successors are invalidated
    pub fn remove_node(&mut self, id: &str) -> EngineResult<()> {
        if !self.nodes.contains_key(id) {
            return Err(EngineError::UnknownNode(id.to_string()));
        }
        let successors = self.adjacency.successors(id).to_vec();
        self.edges.retain(|e| !e.touches(id));
        self.nodes.remove(id);
        self.order.retain(|n| n != id);
        self.rebuild_adjacency();
        log::debug!("Removed node {}", id);

        self.invalidate_from(&successors);
        self.propagate_specs();
        Ok(())
    }

    /// Add an edge; rejected if the target port is occupied or a cycle would form
    pub fn connect(&mut self, edge: GraphEdge) -> EngineResult<()> {
        self.connect_inner(edge, false)
    }

    /// Add an edge, replacing whatever currently feeds the target port
    pub fn connect_replacing(&mut self, edge: GraphEdge) -> EngineResult<()> {
        self.connect_inner(edge, true)
    }

    fn connect_inner(&mut self, edge: GraphEdge, replace: bool) -> EngineResult<()> {
        let source = self
            .nodes
            .get(&edge.source)
            .ok_or_else(|| ConnectionError::UnknownNode(edge.source.clone()))?;
        let target = self
            .nodes
            .get(&edge.target)
            .ok_or_else(|| ConnectionError::UnknownNode(edge.target.clone()))?;

        let outputs = source.model.output_port_count();
        if edge.source_port >= outputs {
            return Err(ConnectionError::PortOutOfRange {
                node_id: edge.source.clone(),
                direction: "output",
                port: edge.source_port,
                count: outputs,
            }
            .into());
        }
        let inputs = target.model.input_port_count();
        if edge.target_port >= inputs {
            return Err(ConnectionError::PortOutOfRange {
                node_id: edge.target.clone(),
                direction: "input",
                port: edge.target_port,
                count: inputs,
            }
            .into());
        }

        self.edges = try_connect(&edge, &self.edges, replace)?;
        self.rebuild_adjacency();
        log::debug!(
            "Connected {}:{} -> {}:{}",
            edge.source,
            edge.source_port,
            edge.target,
            edge.target_port
        );

        self.invalidate_from(&[edge.target]);
        self.propagate_specs();
        Ok(())
    }

    /// Remove an edge by id and invalidate its former target
    pub fn disconnect(&mut self, edge_id: &str) -> EngineResult<GraphEdge> {
        let position = self
            .edges
            .iter()
            .position(|e| e.id == edge_id)
            .ok_or_else(|| EngineError::UnknownEdge(edge_id.to_string()))?;
        let edge = self.edges.remove(position);
        self.rebuild_adjacency();
        log::debug!("Disconnected edge {}", edge_id);

        self.invalidate_from(&[edge.target.clone()]);
        self.propagate_specs();
        Ok(edge)
    }

    /// Hand new settings to a node and invalidate it and its downstream.
    ///
    /// Invalid settings are stored (so a snapshot keeps what the user
    /// entered) but leave the node in `Error` until corrected. Returns the
    /// node's resulting status.
    pub fn update_settings(&mut self, id: &str, settings: NodeSettings) -> EngineResult<NodeStatus> {
        let slot = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownNode(id.to_string()))?;

        let result = apply_settings(slot.model.as_mut(), &settings);
        slot.settings = settings;
        slot.settings_error = match result {
            Ok(()) => None,
            Err(e) => {
                log::warn!("Node {} rejected settings: {}", id, e);
                Some(NodeFailure::from(&e))
            }
        };

        self.invalidate_from(&[id.to_string()]);
        self.propagate_specs();
        Ok(self.nodes.get(id).map(|s| s.status).unwrap_or_default())
    }

    /// Explicit user reset of one node (and its downstream)
    pub fn reset_node(&mut self, id: &str) -> EngineResult<()> {
        if !self.nodes.contains_key(id) {
            return Err(EngineError::UnknownNode(id.to_string()));
        }
        self.invalidate_from(&[id.to_string()]);
        self.propagate_specs();
        Ok(())
    }

    /// Every node back to `Idle`; edges and settings are kept
    pub fn reset_workflow(&mut self) {
        let all = self.order.clone();
        self.invalidate_from(&all);
        self.propagate_specs();
        log::info!("Reset workflow {} ({} nodes)", self.graph_id, all.len());
    }

    pub fn set_node_label(&mut self, id: &str, label: impl Into<String>) -> EngineResult<()> {
        let slot = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownNode(id.to_string()))?;
        slot.label = label.into();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dialogs and views
    // ------------------------------------------------------------------

    /// Open a settings editing session, if the node kind has a dialog
    pub fn open_dialog(&self, id: &str) -> EngineResult<Option<DialogSession>> {
        let slot = self
            .nodes
            .get(id)
            .ok_or_else(|| EngineError::UnknownNode(id.to_string()))?;
        let factory = self
            .registry
            .get_factory(&slot.node_type)
            .ok_or_else(|| EngineError::UnknownNodeType(slot.node_type.clone()))?;
        Ok(factory
            .create_dialog()
            .map(|dialog| DialogSession::open(dialog.as_ref(), slot.model.as_ref())))
    }

    /// Validate a session's draft and apply it through [`update_settings`](Self::update_settings).
    ///
    /// A rejected draft returns [`EngineError::InvalidSettings`] and leaves the node untouched.
    pub fn commit_dialog(&mut self, id: &str, session: &mut DialogSession) -> EngineResult<NodeStatus> {
        let slot = self
            .nodes
            .get(id)
            .ok_or_else(|| EngineError::UnknownNode(id.to_string()))?;
        let settings = session
            .save(slot.model.as_ref())
            .map_err(EngineError::InvalidSettings)?;
        self.update_settings(id, settings)
    }

    /// Create the node kind's view, loaded with the node's current outputs
    pub fn open_view(&self, id: &str) -> EngineResult<Option<Box<dyn NodeView>>> {
        let slot = self
            .nodes
            .get(id)
            .ok_or_else(|| EngineError::UnknownNode(id.to_string()))?;
        let factory = self
            .registry
            .get_factory(&slot.node_type)
            .ok_or_else(|| EngineError::UnknownNodeType(slot.node_type.clone()))?;
        let mut view = factory.create_view();
        if let (Some(view), Some(outputs)) = (view.as_mut(), slot.outputs.as_ref()) {
            view.set_loaded_data(outputs);
        }
        Ok(view)
    }

    /// Bring a view the host keeps open up to date with its node
    ///
    /// The engine does not hold views. Hosts call this when an event for
    /// `id` arrives: a node with outputs reloads them, any other node marks
    /// the view stale through [`NodeView::on_model_changed`].
    pub fn sync_view(&self, id: &str, view: &mut dyn NodeView) -> EngineResult<()> {
        let slot = self
            .nodes
            .get(id)
            .ok_or_else(|| EngineError::UnknownNode(id.to_string()))?;
        match slot.outputs.as_ref() {
            Some(outputs) => view.set_loaded_data(outputs),
            None => view.on_model_changed(),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------

    /// Run `target`, executing its incomplete ancestors first
    pub async fn execute_node_with_dependencies(&mut self, target: &str) -> EngineResult<RunReport> {
        self.execute_node_with_dependencies_with_token(target, CancelToken::new())
            .await
    }

    pub async fn execute_node_with_dependencies_with_token(
        &mut self,
        target: &str,
        cancel: CancelToken,
    ) -> EngineResult<RunReport> {
        if !self.nodes.contains_key(target) {
            return Err(EngineError::UnknownNode(target.to_string()));
        }
        let run_id = self.config.next_run_id();
        let ancestors = self.adjacency.ancestors_of(target);
        let plan = self.adjacency.topological_order(Some(&ancestors));
        log::info!(
            "Run {}: executing {} with {} ancestor(s)",
            run_id,
            target,
            plan.len()
        );

        let mut report = RunReport::new(&run_id);
        for id in plan {
            if cancel.is_canceled() {
                report.canceled = true;
                return Ok(report);
            }
            if self.is_complete(&id) {
                continue;
            }
            match self.run_single(&id, &run_id, &cancel).await {
                Ok(items) => {
                    report.executed.push(id);
                    report.dashboard_items.extend(items);
                }
                Err(failure) => {
                    let on_behalf = NodeFailure::upstream(&id, &failure);
                    log::warn!("Run {}: {} not attempted: {}", run_id, target, on_behalf.message);
                    send_event(
                        self.sink.as_ref(),
                        NodeEvent::new(target, NodeStatus::Idle)
                            .with_error(on_behalf)
                            .with_context(EventContext::for_run(&run_id)),
                    );
                    report.canceled = failure.kind == ErrorKind::Canceled;
                    report.failed.push(FailedNode {
                        node_id: id,
                        error: failure,
                    });
                    report.blocked.push(target.to_string());
                    return Ok(report);
                }
            }
        }

        if cancel.is_canceled() {
            report.canceled = true;
            return Ok(report);
        }
        if self.is_complete(target) {
            log::debug!("Run {}: {} is already complete", run_id, target);
            return Ok(report);
        }
        match self.run_single(target, &run_id, &cancel).await {
            Ok(items) => {
                report.executed.push(target.to_string());
                report.dashboard_items.extend(items);
            }
            Err(failure) => {
                report.canceled = failure.kind == ErrorKind::Canceled;
                report.failed.push(FailedNode {
                    node_id: target.to_string(),
                    error: failure,
                });
            }
        }
        Ok(report)
    }

    /// Run every incomplete node of the graph
    pub async fn execute_workflow(&mut self) -> RunReport {
        self.execute_workflow_with_token(CancelToken::new()).await
    }

    pub async fn execute_workflow_with_token(&mut self, cancel: CancelToken) -> RunReport {
        let run_id = self.config.next_run_id();
        let order = self.adjacency.topological_order(None);
        log::info!("Run {}: executing workflow ({} nodes)", run_id, order.len());

        let mut report = RunReport::new(&run_id);
        // Failed or blocked nodes, mapped to the root failure behind them
        let mut stopped: HashMap<NodeId, (NodeId, NodeFailure)> = HashMap::new();

        for id in order {
            if cancel.is_canceled() {
                report.canceled = true;
                break;
            }
            if self.is_complete(&id) {
                continue;
            }

            let root = self
                .adjacency
                .predecessors(&id)
                .iter()
                .find_map(|p| stopped.get(p))
                .cloned();
            if let Some((root_id, root_failure)) = root {
                send_event(
                    self.sink.as_ref(),
                    NodeEvent::new(&id, NodeStatus::Idle)
                        .with_error(NodeFailure::upstream(&root_id, &root_failure))
                        .with_context(EventContext::for_run(&run_id)),
                );
                report.blocked.push(id.clone());
                stopped.insert(id, (root_id, root_failure));
                continue;
            }

            match self.run_single(&id, &run_id, &cancel).await {
                Ok(items) => {
                    report.executed.push(id);
                    report.dashboard_items.extend(items);
                }
                Err(failure) => {
                    let canceled = failure.kind == ErrorKind::Canceled;
                    report.failed.push(FailedNode {
                        node_id: id.clone(),
                        error: failure.clone(),
                    });
                    stopped.insert(id.clone(), (id, failure));
                    if canceled {
                        report.canceled = true;
                        break;
                    }
                    if self.config.halt_on_failure {
                        break;
                    }
                }
            }
        }

        log::info!(
            "Run {} finished: {} executed, {} failed, {} blocked{}",
            run_id,
            report.executed.len(),
            report.failed.len(),
            report.blocked.len(),
            if report.canceled { ", canceled" } else { "" }
        );
        report
    }

    /// Configure and execute one node whose predecessors are complete
    async fn run_single(
        &mut self,
        id: &str,
        run_id: &str,
        cancel: &CancelToken,
    ) -> std::result::Result<Vec<DashboardItem>, NodeFailure> {
        let Some(slot) = self.nodes.get(id) else {
            return Err(NodeFailure::new(
                ErrorKind::Configuration,
                format!("Unknown node '{}'", id),
            ));
        };
        if let Some(failure) = &slot.settings_error {
            return Err(failure.clone());
        }
        // Failed nodes wait for an invalidation before they are retried
        if slot.status == NodeStatus::Error {
            if let Some(failure) = &slot.error {
                return Err(failure.clone());
            }
        }
        if let Some(pending) = self
            .adjacency
            .predecessors(id)
            .iter()
            .find(|p| !self.is_complete(p))
        {
            return Err(NodeFailure::new(
                ErrorKind::Upstream,
                format!("Predecessor '{}' has not completed", pending),
            ));
        }
        let Some(inputs) = self.input_tables_for(id) else {
            let failure = NodeFailure::new(
                ErrorKind::Configuration,
                format!("Node '{}' has unconnected input ports", id),
            );
            self.fail_node(id, failure.clone(), run_id);
            return Err(failure);
        };

        self.set_executing(id, run_id);
        let ctx = ExecutionContext::new(id, run_id, cancel.clone(), self.sink.clone());
        let result = match self.nodes.get(id) {
            Some(slot) => execute_model(slot.model.as_ref(), &inputs, &ctx).await,
            None => return Ok(Vec::new()),
        };

        match result {
            Ok(tables) => Ok(self.complete_node(id, tables, ctx.take_warning(), run_id)),
            Err(failure) => {
                log::warn!("Node {} failed: {}", id, failure.message);
                self.fail_node(id, failure.clone(), run_id);
                Err(failure)
            }
        }
    }

    fn set_executing(&mut self, id: &str, run_id: &str) {
        if let Some(slot) = self.nodes.get_mut(id) {
            slot.status = NodeStatus::Executing;
            send_event(
                self.sink.as_ref(),
                NodeEvent::new(id, NodeStatus::Executing).with_context(EventContext::for_run(run_id)),
            );
        }
    }

    fn fail_node(&mut self, id: &str, failure: NodeFailure, run_id: &str) {
        if let Some(slot) = self.nodes.get_mut(id) {
            slot.status = NodeStatus::Error;
            slot.outputs = None;
            slot.error = Some(failure.clone());
            send_event(
                self.sink.as_ref(),
                NodeEvent::new(id, NodeStatus::Error)
                    .with_error(failure)
                    .with_context(EventContext::for_run(run_id)),
            );
        }
    }

    /// Cache outputs, publish dashboard items and report success
    fn complete_node(
        &mut self,
        id: &str,
        tables: Vec<Table>,
        warning: Option<String>,
        run_id: &str,
    ) -> Vec<DashboardItem> {
        let outputs: Vec<TableRef> = tables.into_iter().map(Arc::new).collect();
        let specs: Vec<TableSpec> = outputs.iter().map(|t| t.spec().clone()).collect();

        let Some(slot) = self.nodes.get_mut(id) else {
            return Vec::new();
        };
        let items = match self.registry.get_metadata(&slot.node_type) {
            Some(metadata) if !metadata.dashboard_outputs.is_empty() => {
                let context = DashboardContext {
                    node_id: id,
                    declared: &metadata.dashboard_outputs,
                    row_limit: self.config.dashboard_row_limit,
                };
                send_outputs_to_dashboard(&outputs, &context, &slot.label)
            }
            _ => Vec::new(),
        };

        let specs_changed = slot.output_specs.as_ref().map_or(false, |old| *old != specs);
        let status = if warning.is_some() {
            NodeStatus::Warning
        } else {
            NodeStatus::Success
        };
        slot.status = status;
        slot.outputs = Some(outputs.clone());
        slot.output_specs = Some(specs);
        slot.error = None;

        let mut context = EventContext::for_run(run_id).with_dashboard_items(items.clone());
        if let Some(message) = warning {
            log::info!("Node {} finished with a warning: {}", id, message);
            context = context.with_message(message);
        }
        send_event(
            self.sink.as_ref(),
            NodeEvent::new(id, status)
                .with_outputs(outputs)
                .with_context(context),
        );

        if specs_changed {
            log::debug!("Output specs of {} changed during execution", id);
            let successors = self.adjacency.successors(id).to_vec();
            self.invalidate_from(&successors);
            self.propagate_specs();
        }
        items
    }

    // ------------------------------------------------------------------
    // Invalidation and schema propagation
    // ------------------------------------------------------------------

    /// Reset every node reachable from `starts` (starts included) to `Idle`
    fn invalidate_from(&mut self, starts: &[NodeId]) {
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut affected = Vec::new();
        for start in starts {
            for id in self.adjacency.reachable_from(start) {
                if seen.insert(id.clone()) {
                    affected.push(id);
                }
            }
        }

        for id in &affected {
            let Some(slot) = self.nodes.get_mut(id) else {
                continue;
            };
            slot.status = NodeStatus::Reset;
            send_event(self.sink.as_ref(), NodeEvent::new(id, NodeStatus::Reset));
            slot.outputs = None;
            slot.output_specs = None;
            slot.error = None;
            slot.status = NodeStatus::Idle;
            send_event(self.sink.as_ref(), NodeEvent::new(id, NodeStatus::Idle));
        }
        if !affected.is_empty() {
            log::debug!("Invalidated {} node(s)", affected.len());
        }
    }

    /// Configure every node whose input specs are known and whose own specs are not
    fn propagate_specs(&mut self) {
        for id in self.adjacency.topological_order(None) {
            let Some(slot) = self.nodes.get(&id) else {
                continue;
            };
            if let Some(failure) = slot.settings_error.clone() {
                self.set_config_failure(&id, failure);
                continue;
            }
            if slot.output_specs.is_some() {
                continue;
            }
            let Some(input_specs) = self.input_specs_for(&id) else {
                continue;
            };
            match configure_model(slot.model.as_ref(), &input_specs) {
                Ok(specs) => {
                    if let Some(slot) = self.nodes.get_mut(&id) {
                        slot.output_specs = Some(specs);
                        if slot.status == NodeStatus::Error {
                            slot.status = NodeStatus::Idle;
                            slot.error = None;
                            send_event(self.sink.as_ref(), NodeEvent::new(&id, NodeStatus::Idle));
                        }
                    }
                }
                Err(e) => {
                    log::debug!("Node {} failed to configure: {}", id, e);
                    self.set_config_failure(&id, NodeFailure::from(&e));
                }
            }
        }
    }

    /// Put a node in `Error` for a settings or configure problem, reporting only changes
    fn set_config_failure(&mut self, id: &str, failure: NodeFailure) {
        let Some(slot) = self.nodes.get_mut(id) else {
            return;
        };
        if slot.status == NodeStatus::Error && slot.error.as_ref() == Some(&failure) {
            return;
        }
        slot.status = NodeStatus::Error;
        slot.outputs = None;
        slot.output_specs = None;
        slot.error = Some(failure.clone());
        send_event(
            self.sink.as_ref(),
            NodeEvent::new(id, NodeStatus::Error).with_error(failure),
        );
    }

    /// Output specs feeding each input port, if every port is connected and known
    fn input_specs_for(&self, id: &str) -> Option<Vec<TableSpec>> {
        let slot = self.nodes.get(id)?;
        (0..slot.model.input_port_count())
            .map(|port| {
                let edge = self.incoming_edge(id, port)?;
                self.nodes
                    .get(&edge.source)?
                    .output_specs
                    .as_ref()?
                    .get(edge.source_port)
                    .cloned()
            })
            .collect()
    }

    /// Cached tables feeding each input port, if every port is connected and computed
    fn input_tables_for(&self, id: &str) -> Option<Vec<TableRef>> {
        let slot = self.nodes.get(id)?;
        (0..slot.model.input_port_count())
            .map(|port| {
                let edge = self.incoming_edge(id, port)?;
                self.nodes
                    .get(&edge.source)?
                    .outputs
                    .as_ref()?
                    .get(edge.source_port)
                    .cloned()
            })
            .collect()
    }

    fn incoming_edge(&self, id: &str, port: usize) -> Option<&GraphEdge> {
        self.edges
            .iter()
            .find(|e| e.target == id && e.target_port == port)
    }

    fn rebuild_adjacency(&mut self) {
        self.adjacency = Adjacency::build(&self.order, &self.edges);
    }

    fn is_complete(&self, id: &str) -> bool {
        self.nodes.get(id).map_or(false, |s| s.status.is_complete())
    }

    fn insert_node(&mut self, node: GraphNode) -> EngineResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(EngineError::DuplicateNode(node.id));
        }
        let factory = self
            .registry
            .get_factory(&node.node_type)
            .ok_or_else(|| EngineError::UnknownNodeType(node.node_type.clone()))?;

        let mut model = factory.create_model();
        let settings_error = match apply_settings(model.as_mut(), &node.settings) {
            Ok(()) => None,
            Err(e) => {
                log::warn!("Node {} added with invalid settings: {}", node.id, e);
                Some(NodeFailure::from(&e))
            }
        };
        let label = if node.label.is_empty() {
            node.id.clone()
        } else {
            node.label
        };

        log::debug!("Added node {} ({})", node.id, node.node_type);
        self.order.push(node.id.clone());
        self.nodes.insert(
            node.id,
            NodeSlot {
                node_type: node.node_type,
                label,
                model,
                settings: node.settings,
                status: NodeStatus::Idle,
                outputs: None,
                output_specs: None,
                error: None,
                settings_error,
            },
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Current graph, for the host to persist
    pub fn snapshot(&self) -> WorkflowGraph {
        let mut graph = WorkflowGraph::new(self.graph_id.clone(), self.graph_name.clone());
        graph.nodes = self
            .order
            .iter()
            .filter_map(|id| {
                self.nodes.get(id).map(|slot| GraphNode {
                    id: id.clone(),
                    node_type: slot.node_type.clone(),
                    label: slot.label.clone(),
                    settings: slot.settings.clone(),
                })
            })
            .collect();
        graph.edges = self.edges.clone();
        graph
    }

    /// Replace the current graph with a validated snapshot.
    ///
    /// On a validation failure the current graph is kept.
    pub fn load_snapshot(&mut self, graph: WorkflowGraph) -> EngineResult<()> {
        let issues = validate_workflow(&graph, Some(self.registry.as_ref()));
        if !issues.is_empty() {
            return Err(EngineError::InvalidGraph(issues));
        }

        self.nodes.clear();
        self.order.clear();
        self.edges.clear();
        self.graph_id = graph.id;
        self.graph_name = graph.name;
        for node in graph.nodes {
            self.insert_node(node)?;
        }
        self.edges = graph.edges;
        self.rebuild_adjacency();
        self.propagate_specs();

        log::info!(
            "Loaded workflow {} ({} nodes, {} edges)",
            self.graph_id,
            self.order.len(),
            self.edges.len()
        );
        Ok(())
    }

    pub fn snapshot_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    pub fn load_snapshot_json(&mut self, json: &str) -> EngineResult<()> {
        let graph: WorkflowGraph = serde_json::from_str(json)?;
        self.load_snapshot(graph)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn status(&self, id: &str) -> Option<NodeStatus> {
        self.nodes.get(id).map(|s| s.status)
    }

    /// Cached outputs of a complete node
    pub fn outputs(&self, id: &str) -> Option<&[TableRef]> {
        self.nodes.get(id)?.outputs.as_deref()
    }

    /// Output specs negotiated by `configure` (or observed on the last execution)
    pub fn output_specs(&self, id: &str) -> Option<&[TableSpec]> {
        self.nodes.get(id)?.output_specs.as_deref()
    }

    pub fn error(&self, id: &str) -> Option<&NodeFailure> {
        self.nodes.get(id)?.error.as_ref()
    }

    pub fn settings(&self, id: &str) -> Option<&NodeSettings> {
        self.nodes.get(id).map(|s| &s.settings)
    }

    pub fn node_label(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).map(|s| s.label.as_str())
    }

    pub fn node_type(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).map(|s| s.node_type.as_str())
    }

    /// Node ids in insertion order
    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }
}

fn apply_settings(model: &mut dyn NodeModel, settings: &NodeSettings) -> Result<()> {
    model.validate_settings(settings)?;
    model.load_settings(settings)
}

fn configure_model(model: &dyn NodeModel, input_specs: &[TableSpec]) -> Result<Vec<TableSpec>> {
    let specs = model.configure(input_specs)?;
    if specs.len() != model.output_port_count() {
        return Err(NodeError::configuration(format!(
            "configure returned {} spec(s) for {} output port(s)",
            specs.len(),
            model.output_port_count()
        )));
    }
    Ok(specs)
}

async fn execute_model(
    model: &dyn NodeModel,
    inputs: &[TableRef],
    ctx: &ExecutionContext,
) -> std::result::Result<Vec<Table>, NodeFailure> {
    let input_specs: Vec<TableSpec> = inputs.iter().map(|t| t.spec().clone()).collect();
    configure_model(model, &input_specs).map_err(|e| NodeFailure::from(&e))?;

    let tables = model
        .execute(inputs, ctx)
        .await
        .map_err(|e| NodeFailure::from(&e))?;
    if tables.len() != model.output_port_count() {
        return Err(NodeFailure::new(
            ErrorKind::ShapeMismatch,
            format!(
                "execute returned {} table(s) for {} output port(s)",
                tables.len(),
                model.output_port_count()
            ),
        ));
    }
    Ok(tables)
}

fn send_event(sink: &dyn EventSink, event: NodeEvent) {
    if let Err(e) = sink.send(event) {
        log::warn!("Failed to deliver node event: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::builder::WorkflowBuilder;
    use crate::dashboard::{DashboardOutput, DashboardShape};
    use crate::dialog::{DialogField, FieldKind, FieldListDialog, NodeDialog};
    use crate::events::VecEventSink;
    use crate::node::{expect_inputs, NodeFactory, NodeMetadata};
    use crate::table::{Cell, ColumnSpec, DataType};
    use crate::types::{NodeCategory, PortMetadata};
    use crate::validation::GraphIssue;
    use crate::view::TablePreviewView;

    // --- test node kinds -------------------------------------------------

    /// 0 in / 1 out: one number column from the `values` setting
    #[derive(Default)]
    struct NumbersModel {
        values: Vec<f64>,
        column: String,
    }

    #[async_trait]
    impl NodeModel for NumbersModel {
        fn input_port_count(&self) -> usize {
            0
        }
        fn output_port_count(&self) -> usize {
            1
        }
        fn configure(&self, input_specs: &[TableSpec]) -> Result<Vec<TableSpec>> {
            expect_inputs(input_specs, 0)?;
            Ok(vec![TableSpec::new(vec![ColumnSpec::new(
                &self.column,
                DataType::Number,
            )])?])
        }
        async fn execute(&self, _inputs: &[TableRef], ctx: &ExecutionContext) -> Result<Vec<Table>> {
            let spec = self.configure(&[])?.remove(0);
            let mut builder = ctx.create_data_table(spec);
            for (i, value) in self.values.iter().enumerate() {
                builder.add_row(format!("Row{}", i), vec![Cell::number(*value)])?;
            }
            Ok(vec![builder.close()])
        }
        fn load_settings(&mut self, settings: &NodeSettings) -> Result<()> {
            self.values = settings.get_number_list("values")?;
            self.column = settings.get_string_or("column", "x")?;
            Ok(())
        }
        fn save_settings(&self, settings: &mut NodeSettings) {
            settings.set("values", self.values.clone());
            settings.set("column", self.column.clone());
        }
        fn validate_settings(&self, settings: &NodeSettings) -> Result<()> {
            settings.get_number_list("values")?;
            settings.get_string_or("column", "x")?;
            Ok(())
        }
    }

    /// 1 in / 1 out: multiplies column `x` by `factor`
    struct ScaleModel {
        factor: f64,
        fail: bool,
        warn: bool,
    }

    impl Default for ScaleModel {
        fn default() -> Self {
            Self {
                factor: 1.0,
                fail: false,
                warn: false,
            }
        }
    }

    #[async_trait]
    impl NodeModel for ScaleModel {
        fn input_port_count(&self) -> usize {
            1
        }
        fn output_port_count(&self) -> usize {
            1
        }
        fn configure(&self, input_specs: &[TableSpec]) -> Result<Vec<TableSpec>> {
            expect_inputs(input_specs, 1)?;
            input_specs[0].require_column("x")?;
            Ok(vec![input_specs[0].clone()])
        }
        async fn execute(&self, inputs: &[TableRef], ctx: &ExecutionContext) -> Result<Vec<Table>> {
            let input = &inputs[0];
            let index = input.spec().require_column("x")?;
            if self.fail {
                return Err(NodeError::domain("factor rejected"));
            }
            let mut builder = ctx.create_data_table(input.spec().clone());
            for (i, row) in input.rows().iter().enumerate() {
                ctx.check_canceled()?;
                let mut cells = row.cells.clone();
                if let Some(value) = cells[index].as_f64() {
                    cells[index] = Cell::number(value * self.factor);
                }
                builder.add_row(row.key.clone(), cells)?;
                ctx.set_progress((i + 1) as f64 / input.size() as f64, None);
            }
            if self.warn {
                ctx.set_warning("scaled with warning");
            }
            Ok(vec![builder.close()])
        }
        fn load_settings(&mut self, settings: &NodeSettings) -> Result<()> {
            self.factor = settings.get_number_or("factor", 1.0)?;
            self.fail = settings.get_boolean_or("fail", false)?;
            self.warn = settings.get_boolean_or("warn", false)?;
            Ok(())
        }
        fn save_settings(&self, settings: &mut NodeSettings) {
            settings.set("factor", self.factor);
            settings.set("fail", self.fail);
            settings.set("warn", self.warn);
        }
        fn validate_settings(&self, settings: &NodeSettings) -> Result<()> {
            if settings.get_number_or("factor", 1.0)? < 0.0 {
                return Err(NodeError::validation("factor must not be negative"));
            }
            settings.get_boolean_or("fail", false)?;
            settings.get_boolean_or("warn", false)?;
            Ok(())
        }
    }

    /// 2 in / 1 out: concatenates two tables with identical specs
    #[derive(Default)]
    struct PairModel;

    #[async_trait]
    impl NodeModel for PairModel {
        fn input_port_count(&self) -> usize {
            2
        }
        fn output_port_count(&self) -> usize {
            1
        }
        fn configure(&self, input_specs: &[TableSpec]) -> Result<Vec<TableSpec>> {
            expect_inputs(input_specs, 2)?;
            if input_specs[0] != input_specs[1] {
                return Err(NodeError::configuration("inputs have different columns"));
            }
            Ok(vec![input_specs[0].clone()])
        }
        async fn execute(&self, inputs: &[TableRef], ctx: &ExecutionContext) -> Result<Vec<Table>> {
            let mut builder = ctx.create_data_table(inputs[0].spec().clone());
            for (side, input) in inputs.iter().enumerate() {
                for row in input.rows() {
                    builder.add_row(format!("{}-{}", side, row.key), row.cells.clone())?;
                }
            }
            Ok(vec![builder.close()])
        }
        fn load_settings(&mut self, _settings: &NodeSettings) -> Result<()> {
            Ok(())
        }
        fn save_settings(&self, _settings: &mut NodeSettings) {}
        fn validate_settings(&self, _settings: &NodeSettings) -> Result<()> {
            Ok(())
        }
    }

    /// 1 in / 1 out: trips the run's cancel token while executing
    struct StopperModel {
        token: CancelToken,
    }

    #[async_trait]
    impl NodeModel for StopperModel {
        fn input_port_count(&self) -> usize {
            1
        }
        fn output_port_count(&self) -> usize {
            1
        }
        fn configure(&self, input_specs: &[TableSpec]) -> Result<Vec<TableSpec>> {
            Ok(input_specs.to_vec())
        }
        async fn execute(&self, inputs: &[TableRef], ctx: &ExecutionContext) -> Result<Vec<Table>> {
            self.token.cancel();
            ctx.check_canceled()?;
            Ok(vec![(*inputs[0]).clone()])
        }
        fn load_settings(&mut self, _settings: &NodeSettings) -> Result<()> {
            Ok(())
        }
        fn save_settings(&self, _settings: &mut NodeSettings) {}
        fn validate_settings(&self, _settings: &NodeSettings) -> Result<()> {
            Ok(())
        }
    }

    type ModelBuilder = Box<dyn Fn() -> Box<dyn NodeModel> + Send + Sync>;

    struct TestFactory {
        metadata: NodeMetadata,
        build: ModelBuilder,
        dialog: Option<Vec<DialogField>>,
    }

    impl NodeFactory for TestFactory {
        fn metadata(&self) -> &NodeMetadata {
            &self.metadata
        }
        fn create_model(&self) -> Box<dyn NodeModel> {
            (self.build)()
        }
        fn create_dialog(&self) -> Option<Box<dyn NodeDialog>> {
            self.dialog
                .clone()
                .map(|fields| Box::new(FieldListDialog::new(fields)) as Box<dyn NodeDialog>)
        }
    }

    fn factory<F>(node_type: &str, inputs: usize, outputs: usize, build: F) -> TestFactory
    where
        F: Fn() -> Box<dyn NodeModel> + Send + Sync + 'static,
    {
        TestFactory {
            metadata: NodeMetadata {
                node_type: node_type.to_string(),
                label: node_type.to_string(),
                description: String::new(),
                category: NodeCategory::Manipulation,
                inputs: (0..inputs).map(|i| PortMetadata::new(format!("In {}", i), "")).collect(),
                outputs: (0..outputs)
                    .map(|i| PortMetadata::new(format!("Out {}", i), ""))
                    .collect(),
                dashboard_outputs: vec![],
            },
            build: Box::new(build),
            dialog: None,
        }
    }

    fn test_registry(token: &CancelToken) -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();

        let mut numbers = factory("numbers", 0, 1, || Box::new(NumbersModel::default()));
        numbers.metadata.category = NodeCategory::Source;
        numbers.metadata.dashboard_outputs =
            vec![DashboardOutput::new(0, DashboardShape::Table, "{label} values")];
        registry.register(Arc::new(numbers));

        let mut scale = factory("scale", 1, 1, || Box::new(ScaleModel::default()));
        scale.dialog = Some(vec![DialogField::new("factor", "Factor", FieldKind::Number)]);
        registry.register(Arc::new(scale));

        registry.register(Arc::new(factory("pair", 2, 1, || Box::new(PairModel))));

        let token = token.clone();
        registry.register(Arc::new(factory(
            "stopper",
            1,
            1,
            move || {
                Box::new(StopperModel {
                    token: token.clone(),
                })
            },
        )));
        Arc::new(registry)
    }

    fn setup() -> (WorkflowEngine, Arc<VecEventSink>, CancelToken) {
        let token = CancelToken::new();
        let sink = Arc::new(VecEventSink::new());
        let engine = WorkflowEngine::new(test_registry(&token), sink.clone());
        (engine, sink, token)
    }

    fn numbers(values: &[f64]) -> NodeSettings {
        NodeSettings::new().with("values", values.to_vec())
    }

    fn link(engine: &mut WorkflowEngine, source: &str, target: &str, target_port: usize) {
        let id = format!("{}-{}-{}", source, target, target_port);
        engine
            .connect(GraphEdge::new(id, source, 0, target, target_port))
            .unwrap();
    }

    fn column_values(engine: &WorkflowEngine, id: &str) -> Vec<f64> {
        engine.outputs(id).unwrap()[0]
            .column_cells(0)
            .filter_map(Cell::as_f64)
            .collect()
    }

    // --- editing -----------------------------------------------------------

    #[test]
    fn test_add_node_configures_sources() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();

        assert_eq!(engine.status("a"), Some(NodeStatus::Idle));
        let specs = engine.output_specs("a").unwrap();
        assert_eq!(specs[0].column(0).unwrap().name, "x");
        assert!(engine.outputs("a").is_none());
        assert_eq!(engine.node_ids(), &["a".to_string()]);
    }

    #[test]
    fn test_add_node_rejects_duplicates_and_unknown_types() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();

        assert!(matches!(
            engine.add_node("a", "numbers", numbers(&[1.0])),
            Err(EngineError::DuplicateNode(_))
        ));
        assert!(matches!(
            engine.add_node("b", "no-such-kind", NodeSettings::new()),
            Err(EngineError::UnknownNodeType(_))
        ));
    }

    #[test]
    fn test_rejected_connections_leave_graph_unchanged() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        engine.add_node("b", "scale", NodeSettings::new()).unwrap();
        engine.add_node("c", "scale", NodeSettings::new()).unwrap();
        link(&mut engine, "a", "b", 0);
        link(&mut engine, "b", "c", 0);

        let occupied = engine.connect(GraphEdge::new("x1", "a", 0, "c", 0));
        assert!(matches!(
            occupied,
            Err(EngineError::Connection(ConnectionError::PortOccupied { .. }))
        ));

        let cycle = engine.connect_replacing(GraphEdge::new("x2", "c", 0, "b", 0));
        assert!(matches!(
            cycle,
            Err(EngineError::Connection(ConnectionError::CycleDetected { .. }))
        ));

        let unknown = engine.connect(GraphEdge::new("x3", "ghost", 0, "c", 0));
        assert!(matches!(
            unknown,
            Err(EngineError::Connection(ConnectionError::UnknownNode(_)))
        ));

        let out_of_range = engine.connect(GraphEdge::new("x4", "a", 3, "c", 0));
        assert!(matches!(
            out_of_range,
            Err(EngineError::Connection(ConnectionError::PortOutOfRange {
                direction: "output",
                ..
            }))
        ));

        assert_eq!(engine.edges().len(), 2);
    }

    #[test]
    fn test_connect_replacing_swaps_source() {
        let (mut engine, sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        engine.add_node("b", "numbers", numbers(&[2.0])).unwrap();
        engine.add_node("c", "scale", NodeSettings::new()).unwrap();
        link(&mut engine, "a", "c", 0);
        sink.clear();

        engine
            .connect_replacing(GraphEdge::new("e2", "b", 0, "c", 0))
            .unwrap();

        assert_eq!(engine.edges().len(), 1);
        assert_eq!(engine.edges()[0].source, "b");
        assert_eq!(
            sink.statuses_for("c"),
            vec![NodeStatus::Reset, NodeStatus::Idle]
        );
    }

    #[tokio::test]
    async fn test_disconnect_invalidates_target() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        engine.add_node("b", "scale", NodeSettings::new()).unwrap();
        link(&mut engine, "a", "b", 0);
        engine.execute_workflow().await;

        let edge = engine.disconnect("a-b-0").unwrap();
        assert_eq!(edge.target, "b");
        assert_eq!(engine.status("b"), Some(NodeStatus::Idle));
        assert!(engine.outputs("b").is_none());
        assert!(engine.output_specs("b").is_none());
        assert_eq!(engine.status("a"), Some(NodeStatus::Success));

        assert!(matches!(
            engine.disconnect("a-b-0"),
            Err(EngineError::UnknownEdge(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_node_invalidates_successors() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        engine.add_node("b", "scale", NodeSettings::new()).unwrap();
        engine.add_node("c", "scale", NodeSettings::new()).unwrap();
        link(&mut engine, "a", "b", 0);
        link(&mut engine, "b", "c", 0);
        engine.execute_workflow().await;

        engine.remove_node("b").unwrap();

        assert!(engine.status("b").is_none());
        assert!(engine.edges().is_empty());
        assert_eq!(engine.status("c"), Some(NodeStatus::Idle));
        assert!(engine.outputs("c").is_none());
        assert_eq!(engine.status("a"), Some(NodeStatus::Success));
        assert!(matches!(
            engine.remove_node("b"),
            Err(EngineError::UnknownNode(_))
        ));
    }

    // --- runs ----------------------------------------------------------------

    #[tokio::test]
    async fn test_execute_workflow_linear() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0, 2.0])).unwrap();
        engine
            .add_node("b", "scale", NodeSettings::new().with("factor", 3.0))
            .unwrap();
        link(&mut engine, "a", "b", 0);

        let report = engine.execute_workflow().await;

        assert!(report.is_success());
        assert_eq!(report.executed, vec!["a".to_string(), "b".to_string()]);
        assert!(report.run_id.starts_with("run-"));
        assert_eq!(engine.status("b"), Some(NodeStatus::Success));
        assert_eq!(column_values(&engine, "b"), vec![3.0, 6.0]);
    }

    #[tokio::test]
    async fn test_settings_change_invalidates_only_downstream() {
        let (mut engine, sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0, 2.0])).unwrap();
        engine
            .add_node("b", "scale", NodeSettings::new().with("factor", 2.0))
            .unwrap();
        engine.add_node("c", "scale", NodeSettings::new()).unwrap();
        engine.add_node("d", "numbers", numbers(&[5.0])).unwrap();
        link(&mut engine, "a", "b", 0);
        link(&mut engine, "a", "c", 0);

        let report = engine.execute_workflow().await;
        assert_eq!(report.executed.len(), 4);
        sink.clear();

        engine.update_settings("a", numbers(&[3.0])).unwrap();

        for id in ["a", "b", "c"] {
            assert_eq!(engine.status(id), Some(NodeStatus::Idle), "node {}", id);
            assert!(engine.outputs(id).is_none(), "node {}", id);
        }
        assert_eq!(sink.statuses_for("b"), vec![NodeStatus::Reset, NodeStatus::Idle]);
        assert_eq!(sink.statuses_for("c"), vec![NodeStatus::Reset, NodeStatus::Idle]);

        assert_eq!(engine.status("d"), Some(NodeStatus::Success));
        assert!(engine.outputs("d").is_some());
        assert!(sink.statuses_for("d").is_empty());
    }

    #[tokio::test]
    async fn test_ancestor_failure_leaves_target_idle() {
        let (mut engine, sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        engine
            .add_node("f", "scale", NodeSettings::new().with("fail", true))
            .unwrap();
        engine.add_node("t", "scale", NodeSettings::new()).unwrap();
        link(&mut engine, "a", "f", 0);
        link(&mut engine, "f", "t", 0);
        sink.clear();

        let report = engine.execute_node_with_dependencies("t").await.unwrap();

        assert_eq!(engine.status("a"), Some(NodeStatus::Success));
        assert_eq!(engine.status("f"), Some(NodeStatus::Error));
        assert_eq!(engine.error("f").unwrap().kind, ErrorKind::Domain);
        assert_eq!(engine.status("t"), Some(NodeStatus::Idle));

        assert_eq!(report.executed, vec!["a".to_string()]);
        assert_eq!(report.failed[0].node_id, "f");
        assert_eq!(report.blocked, vec!["t".to_string()]);

        let target_events: Vec<NodeEvent> = sink
            .events()
            .into_iter()
            .filter(|e| e.node_id == "t")
            .collect();
        assert_eq!(target_events.len(), 1);
        assert_eq!(target_events[0].status, NodeStatus::Idle);
        assert_eq!(target_events[0].error.as_ref().unwrap().kind, ErrorKind::Upstream);
    }

    #[tokio::test]
    async fn test_single_node_run_skips_complete_ancestors() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        engine.add_node("b", "scale", NodeSettings::new()).unwrap();
        engine.add_node("c", "scale", NodeSettings::new()).unwrap();
        link(&mut engine, "a", "b", 0);
        link(&mut engine, "b", "c", 0);

        let first = engine.execute_node_with_dependencies("b").await.unwrap();
        assert_eq!(first.executed, vec!["a".to_string(), "b".to_string()]);

        let second = engine.execute_node_with_dependencies("c").await.unwrap();
        assert_eq!(second.executed, vec!["c".to_string()]);

        let third = engine.execute_node_with_dependencies("c").await.unwrap();
        assert!(third.executed.is_empty());
        assert!(third.is_success());

        assert!(matches!(
            engine.execute_node_with_dependencies("ghost").await,
            Err(EngineError::UnknownNode(_))
        ));
    }

    #[tokio::test]
    async fn test_failure_blocks_only_dependent_branch() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        engine
            .add_node("f", "scale", NodeSettings::new().with("fail", true))
            .unwrap();
        engine.add_node("g", "scale", NodeSettings::new()).unwrap();
        engine.add_node("h", "scale", NodeSettings::new()).unwrap();
        engine.add_node("ok", "scale", NodeSettings::new()).unwrap();
        link(&mut engine, "a", "f", 0);
        link(&mut engine, "f", "g", 0);
        link(&mut engine, "g", "h", 0);
        link(&mut engine, "a", "ok", 0);

        let report = engine.execute_workflow().await;

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.blocked, vec!["g".to_string(), "h".to_string()]);
        assert!(report.executed.contains(&"ok".to_string()));
        assert_eq!(engine.status("ok"), Some(NodeStatus::Success));
        assert_eq!(engine.status("g"), Some(NodeStatus::Idle));
        assert_eq!(engine.status("h"), Some(NodeStatus::Idle));
    }

    #[tokio::test]
    async fn test_halt_on_failure_stops_run() {
        let (engine, _sink, _) = setup();
        let mut engine = engine.with_config(EngineConfig::default().with_halt_on_failure(true));
        engine
            .add_node("a", "numbers", numbers(&[1.0]))
            .unwrap();
        engine
            .add_node("f", "scale", NodeSettings::new().with("fail", true))
            .unwrap();
        engine.add_node("z", "numbers", numbers(&[2.0])).unwrap();
        link(&mut engine, "a", "f", 0);

        let report = engine.execute_workflow().await;

        assert_eq!(report.executed, vec!["a".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(engine.status("z"), Some(NodeStatus::Idle));
    }

    #[tokio::test]
    async fn test_failed_nodes_not_retried_until_invalidated() {
        let (mut engine, sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        engine
            .add_node("f", "scale", NodeSettings::new().with("fail", true))
            .unwrap();
        link(&mut engine, "a", "f", 0);

        engine.execute_workflow().await;
        sink.clear();

        let again = engine.execute_workflow().await;
        assert_eq!(again.failed[0].node_id, "f");
        assert!(again.executed.is_empty());
        assert!(!sink.statuses_for("f").contains(&NodeStatus::Executing));

        engine.update_settings("f", NodeSettings::new()).unwrap();
        let fixed = engine.execute_workflow().await;
        assert_eq!(fixed.executed, vec!["f".to_string()]);
        assert_eq!(engine.status("f"), Some(NodeStatus::Success));
    }

    #[tokio::test]
    async fn test_configuration_error_is_local_and_recovers() {
        let (mut engine, sink, _) = setup();
        engine
            .add_node("a", "numbers", numbers(&[1.0]).with("column", "y"))
            .unwrap();
        engine.add_node("b", "scale", NodeSettings::new()).unwrap();
        engine.add_node("d", "numbers", numbers(&[4.0])).unwrap();
        link(&mut engine, "a", "b", 0);

        assert_eq!(engine.status("b"), Some(NodeStatus::Error));
        assert_eq!(engine.error("b").unwrap().kind, ErrorKind::Configuration);
        assert_eq!(engine.status("d"), Some(NodeStatus::Idle));

        let report = engine.execute_workflow().await;
        assert!(report.executed.contains(&"d".to_string()));
        assert_eq!(report.failed[0].node_id, "b");
        sink.clear();

        engine
            .update_settings("a", numbers(&[1.0]).with("column", "x"))
            .unwrap();
        assert_eq!(engine.status("b"), Some(NodeStatus::Idle));
        assert!(engine.error("b").is_none());
        assert!(engine.output_specs("b").is_some());
        assert!(sink.statuses_for("d").is_empty());
    }

    #[tokio::test]
    async fn test_invalid_settings_block_execution() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        engine.add_node("b", "scale", NodeSettings::new()).unwrap();
        link(&mut engine, "a", "b", 0);

        let status = engine
            .update_settings("b", NodeSettings::new().with("factor", -1.0))
            .unwrap();
        assert_eq!(status, NodeStatus::Error);
        assert_eq!(engine.error("b").unwrap().kind, ErrorKind::Validation);
        assert_eq!(engine.settings("b").unwrap().get_number("factor").unwrap(), -1.0);

        let report = engine.execute_workflow().await;
        assert_eq!(report.failed[0].node_id, "b");
        assert_eq!(report.failed[0].error.kind, ErrorKind::Validation);

        // A plain reset does not clear rejected settings
        engine.reset_node("b").unwrap();
        assert_eq!(engine.status("b"), Some(NodeStatus::Error));

        let status = engine
            .update_settings("b", NodeSettings::new().with("factor", 2.0))
            .unwrap();
        assert_eq!(status, NodeStatus::Idle);
    }

    #[tokio::test]
    async fn test_missing_settings_on_add() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("a", "numbers", NodeSettings::new()).unwrap();

        assert_eq!(engine.status("a"), Some(NodeStatus::Error));
        assert_eq!(engine.error("a").unwrap().kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_unconnected_input_fails_node() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        engine.add_node("p", "pair", NodeSettings::new()).unwrap();
        link(&mut engine, "a", "p", 0);

        let report = engine.execute_workflow().await;

        assert_eq!(engine.status("p"), Some(NodeStatus::Error));
        assert_eq!(report.failed[0].error.kind, ErrorKind::Configuration);

        engine.add_node("b", "numbers", numbers(&[2.0])).unwrap();
        link(&mut engine, "b", "p", 1);
        assert_eq!(engine.status("p"), Some(NodeStatus::Idle));

        let report = engine.execute_workflow().await;
        assert!(report.is_success());
        assert_eq!(engine.outputs("p").unwrap()[0].size(), 2);
    }

    #[tokio::test]
    async fn test_nodes_execute_only_after_predecessors_complete() {
        let (mut engine, sink, _) = setup();
        engine.add_node("p", "pair", NodeSettings::new()).unwrap();
        engine.add_node("s", "scale", NodeSettings::new()).unwrap();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        engine.add_node("b", "numbers", numbers(&[2.0])).unwrap();
        link(&mut engine, "a", "p", 0);
        link(&mut engine, "b", "p", 1);
        link(&mut engine, "p", "s", 0);
        sink.clear();

        let report = engine.execute_workflow().await;
        assert!(report.is_success());

        let mut latest: HashMap<String, NodeStatus> = HashMap::new();
        for event in sink.events() {
            if event.status == NodeStatus::Executing {
                for edge in engine.edges().iter().filter(|e| e.target == event.node_id) {
                    let status = latest.get(&edge.source).copied().unwrap_or_default();
                    assert!(
                        status.is_complete(),
                        "{} started before {} completed",
                        event.node_id,
                        edge.source
                    );
                }
            }
            latest.insert(event.node_id.clone(), event.status);
        }
    }

    #[tokio::test]
    async fn test_warning_counts_as_complete() {
        let (mut engine, sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        engine
            .add_node("w", "scale", NodeSettings::new().with("warn", true))
            .unwrap();
        engine.add_node("c", "scale", NodeSettings::new()).unwrap();
        link(&mut engine, "a", "w", 0);
        link(&mut engine, "w", "c", 0);

        let report = engine.execute_workflow().await;

        assert!(report.is_success());
        assert_eq!(engine.status("w"), Some(NodeStatus::Warning));
        assert_eq!(engine.status("c"), Some(NodeStatus::Success));
        let warning = sink
            .events()
            .into_iter()
            .find(|e| e.node_id == "w" && e.status == NodeStatus::Warning)
            .unwrap();
        assert_eq!(
            warning.context.unwrap().message.as_deref(),
            Some("scaled with warning")
        );
    }

    #[tokio::test]
    async fn test_cancellation_halts_run() {
        let (mut engine, sink, token) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        engine.add_node("s", "stopper", NodeSettings::new()).unwrap();
        engine.add_node("t", "scale", NodeSettings::new()).unwrap();
        engine.add_node("z", "numbers", numbers(&[2.0])).unwrap();
        link(&mut engine, "a", "s", 0);
        link(&mut engine, "s", "t", 0);

        let report = engine.execute_workflow_with_token(token).await;

        assert!(report.canceled);
        assert_eq!(report.executed, vec!["a".to_string()]);
        assert_eq!(report.failed[0].error.kind, ErrorKind::Canceled);
        assert_eq!(engine.status("s"), Some(NodeStatus::Error));
        assert_eq!(engine.status("t"), Some(NodeStatus::Idle));
        assert_eq!(engine.status("z"), Some(NodeStatus::Idle));
        assert!(!sink.statuses_for("z").contains(&NodeStatus::Executing));
    }

    #[tokio::test]
    async fn test_canceled_token_runs_nothing() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        let token = CancelToken::new();
        token.cancel();

        let report = engine.execute_workflow_with_token(token.clone()).await;
        assert!(report.canceled);
        assert!(report.executed.is_empty());

        let report = engine
            .execute_node_with_dependencies_with_token("a", token)
            .await
            .unwrap();
        assert!(report.canceled);
        assert_eq!(engine.status("a"), Some(NodeStatus::Idle));
    }

    #[tokio::test]
    async fn test_dashboard_items_published_on_success() {
        let (mut engine, sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0, 2.0])).unwrap();
        engine.set_node_label("a", "Prices").unwrap();
        engine.add_node("b", "scale", NodeSettings::new()).unwrap();
        link(&mut engine, "a", "b", 0);

        let report = engine.execute_workflow().await;

        assert_eq!(report.dashboard_items.len(), 1);
        assert_eq!(report.dashboard_items[0].title(), "Prices values");
        assert_eq!(report.dashboard_items[0].node_id(), "a");

        let success = sink
            .events()
            .into_iter()
            .find(|e| e.node_id == "a" && e.status == NodeStatus::Success)
            .unwrap();
        assert_eq!(success.context.unwrap().dashboard_items.len(), 1);
        assert_eq!(success.outputs.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_workflow_keeps_structure() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        engine.add_node("b", "scale", NodeSettings::new()).unwrap();
        link(&mut engine, "a", "b", 0);
        engine.execute_workflow().await;

        engine.reset_workflow();

        for id in ["a", "b"] {
            assert_eq!(engine.status(id), Some(NodeStatus::Idle));
            assert!(engine.outputs(id).is_none());
        }
        assert_eq!(engine.edges().len(), 1);
        assert!(engine.output_specs("b").is_some());
    }

    // --- snapshots, dialogs, views ---------------------------------------------

    #[test]
    fn test_snapshot_round_trip() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0, 2.0])).unwrap();
        engine
            .add_node("b", "scale", NodeSettings::new().with("factor", 2.0))
            .unwrap();
        engine.set_node_label("b", "Doubler").unwrap();
        link(&mut engine, "a", "b", 0);

        let json = engine.snapshot_json().unwrap();

        let (mut restored, _sink, _) = setup();
        restored.load_snapshot_json(&json).unwrap();

        assert_eq!(restored.snapshot(), engine.snapshot());
        assert_eq!(restored.node_label("b"), Some("Doubler"));
        assert!(restored.output_specs("b").is_some());
    }

    #[test]
    fn test_load_snapshot_rejects_invalid_graph() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("keep", "numbers", numbers(&[1.0])).unwrap();

        let graph = WorkflowBuilder::new("wf", "Cyclic")
            .add_node("a", "scale")
            .add_node("b", "scale")
            .add_edge("a", 0, "b", 0)
            .add_edge("b", 0, "a", 0)
            .build();

        match engine.load_snapshot(graph) {
            Err(EngineError::InvalidGraph(issues)) => {
                assert!(issues.contains(&GraphIssue::CycleDetected));
            }
            other => panic!("Expected InvalidGraph, got {:?}", other.map(|_| ())),
        }
        assert_eq!(engine.node_ids(), &["keep".to_string()]);
    }

    #[test]
    fn test_dialog_commit_validates_draft() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        engine.add_node("b", "scale", NodeSettings::new()).unwrap();

        assert!(engine.open_dialog("a").unwrap().is_none());

        let mut session = engine.open_dialog("b").unwrap().unwrap();
        assert_eq!(session.fields()[0].key, "factor");
        session.set("factor", -2.0);
        assert!(matches!(
            engine.commit_dialog("b", &mut session),
            Err(EngineError::InvalidSettings(NodeError::Validation(_)))
        ));
        assert_eq!(engine.settings("b").unwrap().get_number_or("factor", 1.0).unwrap(), 1.0);

        session.set("factor", 4.0);
        engine.commit_dialog("b", &mut session).unwrap();
        assert_eq!(engine.settings("b").unwrap().get_number("factor").unwrap(), 4.0);
    }

    #[test]
    fn test_open_view_without_view_kind() {
        let (mut engine, _sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0])).unwrap();
        assert!(engine.open_view("a").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sync_view_follows_invalidation() {
        let (mut engine, sink, _) = setup();
        engine.add_node("a", "numbers", numbers(&[1.0, 2.0])).unwrap();
        engine
            .add_node("b", "scale", NodeSettings::new().with("factor", 2.0))
            .unwrap();
        link(&mut engine, "a", "b", 0);
        engine.execute_workflow().await;

        let mut view = TablePreviewView::default();
        engine.sync_view("b", &mut view).unwrap();
        let rendered = view.render();
        assert!(!rendered.stale);
        assert_eq!(rendered.sections[0].total_rows, 2);

        sink.clear();
        engine.update_settings("a", numbers(&[7.0])).unwrap();
        assert!(sink.events().iter().any(|e| e.node_id == "b"));
        engine.sync_view("b", &mut view).unwrap();
        let rendered = view.render();
        assert!(rendered.stale);
        assert!(rendered.sections.is_empty());

        engine.execute_workflow().await;
        engine.sync_view("b", &mut view).unwrap();
        let rendered = view.render();
        assert!(!rendered.stale);
        assert_eq!(rendered.sections[0].lines[0][1], "14");

        assert!(matches!(
            engine.sync_view("missing", &mut view),
            Err(EngineError::UnknownNode(_))
        ));
    }
}
