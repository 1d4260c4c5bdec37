//! Derived views handed to the render layer.
//!
//! Everything here is plain serializable data. The compiler rebuilds these
//! structures wholesale on every change; renderers only read them.

use crate::ids::{NodeId, ToolUseId};
use crate::tool::ToolInput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Execution stage a node belongs to, ordered left to right as lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Understand,
    Explore,
    Implement,
    Verify,
    Deliver,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Understand,
        Phase::Explore,
        Phase::Implement,
        Phase::Verify,
        Phase::Deliver,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn title(self) -> &'static str {
        match self {
            Phase::Understand => "Understand",
            Phase::Explore => "Explore",
            Phase::Implement => "Implement",
            Phase::Verify => "Verify",
            Phase::Deliver => "Deliver",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    RunStarted,
    Tool,
    ResponseDelivered,
    RunFailed,
}

/// One (possibly merged) step of the execution trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub phase: Phase,
    pub label: String,
    pub subtitle: String,
    pub status: NodeStatus,
    /// Merge key: tool name plus primary argument.
    pub signature: String,
    /// Number of merged occurrences, at least 1.
    pub count: u32,
    pub tool_ids: Vec<ToolUseId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<ToolInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Node {
    pub fn is_tool(&self) -> bool {
        self.kind == NodeKind::Tool
    }
}

/// Chain-order link between chronologically adjacent nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    pub fn between(source: &NodeId, target: &NodeId) -> Self {
        Self {
            id: format!("edge-{source}-{target}"),
            source: source.clone(),
            target: target.clone(),
        }
    }
}

/// Per-phase aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lane {
    pub phase: Phase,
    pub steps: usize,
    pub actions: usize,
    pub files: usize,
    /// Distinct paths behind `files`, sorted.
    pub paths: Vec<String>,
    pub errors: usize,
}

impl Lane {
    pub fn empty(phase: Phase) -> Self {
        Self {
            phase,
            steps: 0,
            actions: 0,
            files: 0,
            paths: Vec::new(),
            errors: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphView {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub lanes: Vec<Lane>,
}

impl GraphView {
    pub fn lane(&self, phase: Phase) -> Option<&Lane> {
        self.lanes.iter().find(|lane| lane.phase == phase)
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| &node.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineRole {
    User,
    Assistant,
    Tool,
    ToolResult,
    Agent,
    Status,
    Git,
}

/// Tool details attached to `tool` and `tool_result` items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<ToolUseId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<ToolInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    pub id: String,
    pub role: TimelineRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineView {
    pub items: Vec<TimelineItem>,
}

/// Replay control snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayState {
    pub visible_prefix_index: usize,
    pub total_events: usize,
    pub is_playing: bool,
    pub speed: f64,
}

/// Graph and timeline computed from the same event list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunView {
    pub graph: GraphView,
    pub timeline: TimelineView,
}

impl RunView {
    /// SHA-256 of the canonical JSON form. Equal views hash equally, so a
    /// renderer can skip repainting when the digest is unchanged.
    pub fn digest(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}
