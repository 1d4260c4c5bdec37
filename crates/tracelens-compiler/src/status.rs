//! Status resolution: the second pass over the built nodes.
//!
//! Joins tool results back onto nodes by tool id, then settles every node
//! still pending. The settle step is a heuristic for results that lag behind
//! their tool call: while the run is live the newest pending node is shown as
//! running and older ones as completed. A tool that failed without reporting
//! will therefore show as completed.

use std::collections::HashMap;

use tracelens_protocol::{Node, NodeStatus, Phase, ToolUseId};
use tracing::trace;

use crate::describe::clip;
use crate::normalize::NormalizedEvent;

/// Error results attributed per phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorTally([usize; 5]);

impl ErrorTally {
    pub fn add(&mut self, phase: Phase) {
        self.0[phase.index()] += 1;
    }

    pub fn get(&self, phase: Phase) -> usize {
        self.0[phase.index()]
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }
}

/// Apply `results` in order and settle pending nodes.
///
/// `origins` maps each tool id to the phase it was classified into when its
/// node was created; errors are attributed there.
pub fn resolve(
    nodes: &mut [Node],
    results: &[&NormalizedEvent],
    origins: &HashMap<ToolUseId, Phase>,
    run_finished: bool,
    output_chars: usize,
) -> ErrorTally {
    let owners: HashMap<ToolUseId, usize> = nodes
        .iter()
        .enumerate()
        .flat_map(|(index, node)| node.tool_ids.iter().map(move |id| (id.clone(), index)))
        .collect();

    let mut tally = ErrorTally::default();
    for result in results {
        let Some(tool_id) = result.tool_id.as_ref() else {
            trace!(event_id = %result.id, "tool result without tool id ignored");
            continue;
        };
        let Some(&owner) = owners.get(tool_id) else {
            trace!(event_id = %result.id, %tool_id, "tool result without matching node ignored");
            continue;
        };
        let node = &mut nodes[owner];
        node.status = if result.is_error {
            NodeStatus::Error
        } else {
            NodeStatus::Completed
        };
        node.output = Some(clip(&result.tool_output, output_chars));
        if result.is_error {
            tally.add(origins.get(tool_id).copied().unwrap_or(node.phase));
        }
    }

    settle_pending(nodes, run_finished);
    tally
}

/// Promote every pending node. While the run is live the most recently
/// created pending node becomes running; all others become completed.
pub fn settle_pending(nodes: &mut [Node], run_finished: bool) {
    let running = if run_finished {
        None
    } else {
        nodes
            .iter()
            .rposition(|node| node.status == NodeStatus::Pending)
    };
    for (index, node) in nodes.iter_mut().enumerate() {
        if node.status == NodeStatus::Pending {
            node.status = if Some(index) == running {
                NodeStatus::Running
            } else {
                NodeStatus::Completed
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracelens_protocol::{Event, EventType, NodeId, NodeKind, RunId};

    fn pending_node(index: usize, tool_id: &str, phase: Phase) -> Node {
        Node {
            id: NodeId::from_index(index),
            kind: NodeKind::Tool,
            phase,
            label: format!("step {index}"),
            subtitle: String::new(),
            status: NodeStatus::Pending,
            signature: format!("sig-{index}"),
            count: 1,
            tool_ids: vec![ToolUseId::from(tool_id)],
            tool_name: Some("Bash".into()),
            file: None,
            input: None,
            output: None,
        }
    }

    fn result(tool_id: &str, output: &str, is_error: bool) -> NormalizedEvent {
        NormalizedEvent::from_event(
            &Event::new(RunId::from("run"), 0, EventType::StreamToolResult)
                .with_tool_result(tool_id, output, is_error),
        )
    }

    fn origins(nodes: &[Node]) -> HashMap<ToolUseId, Phase> {
        nodes
            .iter()
            .flat_map(|n| n.tool_ids.iter().map(move |id| (id.clone(), n.phase)))
            .collect()
    }

    #[test]
    fn matched_success_completes_node() {
        let mut nodes = vec![pending_node(0, "t1", Phase::Explore), pending_node(1, "t2", Phase::Explore)];
        let ok = result("t1", "file body", false);
        let map = origins(&nodes);
        let tally = resolve(&mut nodes, &[&ok], &map, false, 100);
        assert_eq!(nodes[0].status, NodeStatus::Completed);
        assert_eq!(nodes[0].output.as_deref(), Some("file body"));
        assert_eq!(nodes[1].status, NodeStatus::Running);
        assert_eq!(tally.total(), 0);
    }

    #[test]
    fn unmatched_result_changes_nothing() {
        let mut nodes = vec![pending_node(0, "t1", Phase::Explore)];
        let stray = result("nope", "boom", true);
        let map = origins(&nodes);
        let tally = resolve(&mut nodes, &[&stray], &map, false, 100);
        assert_eq!(nodes[0].status, NodeStatus::Running);
        assert!(nodes[0].output.is_none());
        assert_eq!(tally.total(), 0);
    }

    #[test]
    fn error_is_attributed_to_origin_phase() {
        let mut nodes = vec![pending_node(0, "t1", Phase::Verify)];
        let mut map = origins(&nodes);
        map.insert(ToolUseId::from("t1"), Phase::Verify);
        let failed = result("t1", "1 failed", true);
        let tally = resolve(&mut nodes, &[&failed], &map, true, 100);
        assert_eq!(nodes[0].status, NodeStatus::Error);
        assert_eq!(tally.get(Phase::Verify), 1);
        assert_eq!(tally.total(), 1);
    }

    #[test]
    fn finished_run_completes_every_pending_node() {
        let mut nodes = vec![pending_node(0, "t1", Phase::Explore), pending_node(1, "t2", Phase::Implement)];
        settle_pending(&mut nodes, true);
        assert!(nodes.iter().all(|n| n.status == NodeStatus::Completed));
    }

    #[test]
    fn only_newest_pending_runs_while_live() {
        let mut nodes = vec![
            pending_node(0, "t1", Phase::Explore),
            pending_node(1, "t2", Phase::Explore),
            pending_node(2, "t3", Phase::Explore),
        ];
        nodes[2].status = NodeStatus::Error;
        settle_pending(&mut nodes, false);
        assert_eq!(nodes[0].status, NodeStatus::Completed);
        assert_eq!(nodes[1].status, NodeStatus::Running);
        assert_eq!(nodes[2].status, NodeStatus::Error);
    }

    #[test]
    fn output_is_clipped() {
        let mut nodes = vec![pending_node(0, "t1", Phase::Explore)];
        let long = result("t1", &"y".repeat(50), false);
        let map = origins(&nodes);
        resolve(&mut nodes, &[&long], &map, true, 10);
        assert_eq!(nodes[0].output.as_ref().map(|o| o.chars().count()), Some(10));
    }
}
