//! Plain-text rendering of compiled views.
//!
//! Every item goes through [`render_isolated`]: one item that fails to render
//! becomes a placeholder line instead of taking the whole view down.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracelens_protocol::{
    Edge, GraphView, Lane, Node, NodeStatus, ReplayState, RunView, TimelineItem, TimelineRole,
    TimelineView,
};
use tracing::warn;

pub const RULE: &str = "============================================================";

/// Render each item independently. Failures are logged and replaced.
pub fn render_isolated<T>(
    items: &[T],
    kind: &str,
    render: impl Fn(&T) -> Result<String>,
) -> Vec<String> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| match render(item) {
            Ok(line) => line,
            Err(error) => {
                warn!(kind, index, error = %format!("{error:#}"), "item failed to render");
                format!("  <{kind} {index} could not be rendered>")
            }
        })
        .collect()
}

pub fn graph_lines(view: &GraphView) -> Vec<String> {
    let mut lines = vec![format!(
        "Graph: {} nodes, {} edges",
        view.nodes.len(),
        view.edges.len()
    )];
    lines.push("Lanes:".to_owned());
    lines.extend(render_isolated(&view.lanes, "lane", |lane| Ok(lane_line(lane))));
    lines.push("Nodes:".to_owned());
    lines.extend(render_isolated(&view.nodes, "node", |node| Ok(node_line(node))));
    lines.push("Edges:".to_owned());
    lines.extend(render_isolated(&view.edges, "edge", |edge| edge_line(edge, view)));
    lines
}

pub fn timeline_lines(view: &TimelineView) -> Vec<String> {
    render_isolated(&view.items, "timeline item", timeline_line)
}

fn lane_line(lane: &Lane) -> String {
    format!(
        "  {:<10} steps {:>3}  actions {:>3}  files {:>3}  errors {:>3}",
        lane.phase.title(),
        lane.steps,
        lane.actions,
        lane.files,
        lane.errors
    )
}

fn node_line(node: &Node) -> String {
    let mut line = format!(
        "  {:<8} [{:<10}] {:<9} {}",
        node.id.as_str(),
        node.phase.title(),
        status_word(node.status),
        node.label
    );
    if node.count > 1 {
        line.push_str(&format!(" x{}", node.count));
    }
    if !node.subtitle.is_empty() && node.subtitle != node.label {
        line.push_str(&format!("  ({})", node.subtitle));
    }
    line
}

fn edge_line(edge: &Edge, view: &GraphView) -> Result<String> {
    let source = view
        .node(&edge.source)
        .with_context(|| format!("edge {} has no source node", edge.id))?;
    let target = view
        .node(&edge.target)
        .with_context(|| format!("edge {} has no target node", edge.id))?;
    Ok(format!("  {} -> {}", source.label, target.label))
}

pub fn timeline_line(item: &TimelineItem) -> Result<String> {
    let stamp = item
        .timestamp
        .map(|ts| ts.format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "--:--:--.---".to_owned());
    let body = match item.role {
        TimelineRole::Tool => {
            let meta = item.tool.as_ref().context("tool item without tool metadata")?;
            let mut body = format!("tool       {}", item.content);
            if let Some(preview) = &meta.preview {
                let first = preview.lines().next().unwrap_or_default();
                body.push_str(&format!("\n               | {first}"));
            }
            body
        }
        TimelineRole::ToolResult => {
            let meta = item
                .tool
                .as_ref()
                .context("tool result item without tool metadata")?;
            let marker = if meta.is_error { "error" } else { "result" };
            let name = meta.tool_name.as_deref().unwrap_or("tool");
            format!("{marker:<10} {name}: {}", first_line(&item.content))
        }
        TimelineRole::Agent => {
            let Some(name) = item.agent_name.as_deref() else {
                bail!("agent item without agent name");
            };
            format!("agent      [{name}] {}", item.content)
        }
        TimelineRole::User => format!("user       {}", item.content),
        TimelineRole::Assistant => format!("assistant  {}", item.content),
        TimelineRole::Status => format!("status     {}", item.content),
        TimelineRole::Git => format!("git        {}", item.content),
    };
    Ok(format!("[{stamp}] {body}"))
}

pub fn replay_header(run: &str, total_events: usize, state: &ReplayState) -> Vec<String> {
    vec![
        RULE.to_owned(),
        format!("  Replaying Run: {run}"),
        format!("  Events: {total_events}"),
        format!("  Speed: {}x", state.speed),
        RULE.to_owned(),
    ]
}

/// Replay control state together with the views at the cursor.
#[derive(Debug, Serialize)]
pub struct ReplayFrame<'a> {
    pub state: ReplayState,
    #[serde(flatten)]
    pub view: &'a RunView,
}

pub fn replay_frame_line(state: ReplayState, view: &RunView) -> Result<String> {
    serde_json::to_string(&ReplayFrame { state, view }).context("failed serializing replay frame")
}

/// One JSON document per item, isolated like text rendering.
pub fn json_lines<T: Serialize>(items: &[T], kind: &str) -> Vec<String> {
    render_isolated(items, kind, |item| {
        serde_json::to_string(item).with_context(|| format!("failed serializing {kind}"))
    })
}

fn status_word(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Pending => "pending",
        NodeStatus::Running => "running",
        NodeStatus::Completed => "completed",
        NodeStatus::Error => "error",
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracelens_protocol::{NodeId, ToolMeta};

    fn item(role: TimelineRole, content: &str) -> TimelineItem {
        TimelineItem {
            id: content.to_owned(),
            role,
            content: content.to_owned(),
            timestamp: None,
            tool: None,
            agent_name: None,
        }
    }

    #[test]
    fn one_bad_item_does_not_blank_the_view() {
        let view = TimelineView {
            items: vec![
                item(TimelineRole::User, "fix the build"),
                item(TimelineRole::Tool, "Read a.py"),
                item(TimelineRole::Assistant, "done"),
            ],
        };
        let lines = timeline_lines(&view);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("user       fix the build"));
        assert_eq!(lines[1], "  <timeline item 1 could not be rendered>");
        assert!(lines[2].ends_with("assistant  done"));
    }

    #[test]
    fn dangling_edge_renders_as_placeholder() {
        let view = GraphView {
            nodes: Vec::new(),
            edges: vec![Edge::between(&NodeId::from_index(0), &NodeId::from_index(1))],
            lanes: Vec::new(),
        };
        let lines = graph_lines(&view);
        assert!(lines.contains(&"  <edge 0 could not be rendered>".to_owned()));
        assert_eq!(lines[0], "Graph: 0 nodes, 1 edges");
    }

    #[test]
    fn error_results_are_marked() {
        let mut failed = item(TimelineRole::ToolResult, "exit status 1\nmore");
        failed.tool = Some(ToolMeta {
            tool_name: Some("Bash".into()),
            is_error: true,
            ..ToolMeta::default()
        });
        let line = timeline_line(&failed).unwrap();
        assert_eq!(line, "[--:--:--.---] error      Bash: exit status 1");
    }

    #[test]
    fn replay_frame_carries_state_and_views() -> Result<()> {
        let state = ReplayState {
            visible_prefix_index: 2,
            total_events: 6,
            is_playing: true,
            speed: 2.0,
        };
        let line = replay_frame_line(state, &RunView::default())?;
        let frame: serde_json::Value = serde_json::from_str(&line)?;
        assert_eq!(frame["state"]["visible_prefix_index"], 2);
        assert_eq!(frame["state"]["is_playing"], true);
        assert_eq!(frame["state"]["speed"], 2.0);
        assert!(frame["graph"]["nodes"].is_array());
        assert!(frame["timeline"]["items"].is_array());
        Ok(())
    }

    #[test]
    fn isolated_renderer_keeps_order() {
        let lines = render_isolated(&[1, 2, 3], "n", |n| {
            if *n == 2 {
                bail!("two");
            }
            Ok(n.to_string())
        });
        assert_eq!(lines, ["1", "  <n 1 could not be rendered>", "3"]);
    }
}
