//! Graph construction.
//!
//! Folds the canonical event list into a linear, phase-annotated execution
//! trace: one node per distinct tool action, chained by edges, plus synthetic
//! run boundary nodes and per-phase lane summaries.

use std::collections::{BTreeSet, HashMap};

use tracelens_protocol::{
    Edge, EventType, GraphView, Lane, Node, NodeId, NodeKind, NodeStatus, Phase, ToolUseId,
};
use tracing::{debug, instrument, trace};

use crate::config::CompilerConfig;
use crate::describe::describe;
use crate::normalize::NormalizedEvent;
use crate::phase::lifecycle_phase;
use crate::status::{ErrorTally, resolve};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunEnd {
    Completed,
    Failed,
}

/// Fold-local accumulator. Lives for exactly one build.
struct GraphFold<'a> {
    config: &'a CompilerConfig,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    origins: HashMap<ToolUseId, Phase>,
    results: Vec<&'a NormalizedEvent>,
    end: Option<RunEnd>,
}

impl<'a> GraphFold<'a> {
    fn new(config: &'a CompilerConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            edges: Vec::new(),
            origins: HashMap::new(),
            results: Vec::new(),
            end: None,
        }
    }

    fn push_node(&mut self, node: Node) {
        if let Some(previous) = self.nodes.last() {
            self.edges.push(Edge::between(&previous.id, &node.id));
        }
        self.nodes.push(node);
    }

    fn next_id(&self) -> NodeId {
        NodeId::from_index(self.nodes.len())
    }

    fn boundary_node(&self, kind: NodeKind, event_type: &EventType, label: &str) -> Node {
        let status = match kind {
            NodeKind::RunFailed => NodeStatus::Error,
            _ => NodeStatus::Completed,
        };
        Node {
            id: self.next_id(),
            kind,
            phase: lifecycle_phase(event_type).unwrap_or(Phase::Deliver),
            label: label.to_owned(),
            subtitle: String::new(),
            status,
            signature: format!("run:{}", event_type.as_str()),
            count: 1,
            tool_ids: Vec::new(),
            tool_name: None,
            file: None,
            input: None,
            output: None,
        }
    }

    fn fold(&mut self, event: &'a NormalizedEvent) {
        match event.event_type {
            EventType::StreamToolUse => self.fold_tool_use(event),
            EventType::StreamToolResult => self.results.push(event),
            EventType::RunCompleted => self.end = Some(RunEnd::Completed),
            EventType::RunFailed => self.end = Some(RunEnd::Failed),
            _ => trace!(event_id = %event.id, event_type = %event.event_type, "not a graph event"),
        }
    }

    fn fold_tool_use(&mut self, event: &NormalizedEvent) {
        let description = describe(&event.tool_name, &event.tool_input, self.config);

        if let Some(last) = self.nodes.last_mut()
            && last.signature == description.signature
        {
            last.count += 1;
            if let Some(tool_id) = &event.tool_id {
                last.tool_ids.push(tool_id.clone());
                self.origins.insert(tool_id.clone(), last.phase);
            }
            last.input = Some(event.tool_input.clone());
            return;
        }

        let tool_ids: Vec<ToolUseId> = event.tool_id.iter().cloned().collect();
        for tool_id in &tool_ids {
            self.origins.insert(tool_id.clone(), description.phase);
        }
        let node = Node {
            id: self.next_id(),
            kind: NodeKind::Tool,
            phase: description.phase,
            label: description.label,
            subtitle: description.subtitle,
            status: NodeStatus::Pending,
            signature: description.signature,
            count: 1,
            tool_ids,
            tool_name: Some(event.tool_name.clone()).filter(|name| !name.is_empty()),
            file: description.file,
            input: Some(event.tool_input.clone()),
            output: None,
        };
        self.push_node(node);
    }

    fn finish(mut self) -> GraphView {
        let mut errors = resolve(
            &mut self.nodes,
            &self.results,
            &self.origins,
            self.end.is_some(),
            self.config.output_chars,
        );

        match self.end {
            Some(RunEnd::Completed) => {
                let node = self.boundary_node(
                    NodeKind::ResponseDelivered,
                    &EventType::RunCompleted,
                    "Response Delivered",
                );
                self.push_node(node);
            }
            Some(RunEnd::Failed) => {
                let node =
                    self.boundary_node(NodeKind::RunFailed, &EventType::RunFailed, "Run Failed");
                errors.add(node.phase);
                self.push_node(node);
            }
            None => {}
        }

        let lanes = materialize_lanes(&self.nodes, &errors);
        GraphView {
            nodes: self.nodes,
            edges: self.edges,
            lanes,
        }
    }
}

/// Build the graph view for an ordered, normalized event list.
#[instrument(skip_all, fields(events = events.len()))]
pub fn build_graph(events: &[NormalizedEvent], config: &CompilerConfig) -> GraphView {
    let mut fold = GraphFold::new(config);
    if !events.is_empty() {
        let start = fold.boundary_node(NodeKind::RunStarted, &EventType::RunStarted, "Run Started");
        fold.push_node(start);
    }
    for event in events {
        fold.fold(event);
    }
    let view = fold.finish();
    debug!(
        events = events.len(),
        nodes = view.nodes.len(),
        edges = view.edges.len(),
        "graph built"
    );
    view
}

/// Summarize all five phases from the final node state.
fn materialize_lanes(nodes: &[Node], errors: &ErrorTally) -> Vec<Lane> {
    Phase::ALL
        .iter()
        .map(|&phase| {
            let mut lane = Lane::empty(phase);
            let mut paths = BTreeSet::new();
            for node in nodes.iter().filter(|node| node.phase == phase) {
                lane.steps += 1;
                if node.is_tool() {
                    lane.actions += node.count as usize;
                }
                if let Some(file) = &node.file {
                    paths.insert(file.clone());
                }
            }
            lane.files = paths.len();
            lane.paths = paths.into_iter().collect();
            lane.errors = errors.get(phase);
            lane
        })
        .collect()
}
