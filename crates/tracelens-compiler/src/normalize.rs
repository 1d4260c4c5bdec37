//! Event normalization.
//!
//! Turns a raw, possibly redelivered event list into the canonical order
//! (sorted by sequence, deduplicated by id) and extracts a uniform view of
//! each event. Missing fields default to empty values; incomplete events are
//! kept and flagged so later stages can degrade instead of failing.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracelens_protocol::{Event, EventId, EventType, RunId, SeqNo, ToolInput, ToolUseId};
use tracing::{debug, instrument};

/// Structural problems found on an event. Flagged events stay in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventIssue {
    UnknownType,
    MissingId,
    MissingTimestamp,
    MissingToolName,
    MissingToolId,
}

/// Uniform, owned view of one canonical event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEvent {
    pub id: EventId,
    pub key: String,
    pub event_type: EventType,
    pub run_id: RunId,
    pub sequence: SeqNo,
    pub timestamp: Option<DateTime<Utc>>,
    pub role: Option<String>,
    /// Message or delta text carried by the event.
    pub text: String,
    pub tool_name: String,
    pub tool_id: Option<ToolUseId>,
    pub tool_input: ToolInput,
    pub tool_output: String,
    pub is_error: bool,
    pub payload: Value,
    pub issues: Vec<EventIssue>,
}

impl NormalizedEvent {
    pub fn from_event(event: &Event) -> Self {
        let event_type = event.event_type.clone();
        let tool_name = event
            .tool_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| payload_str(event, &["tool_name", "name"]))
            .or_else(|| content_block_str(event, "name"))
            .map(|name| name.trim().to_owned())
            .unwrap_or_default();
        let tool_id = event
            .tool_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| payload_str(event, &["tool_id", "tool_use_id"]).map(ToolUseId::from))
            .or_else(|| {
                (event_type == EventType::StreamToolUse)
                    .then(|| payload_str(event, &["id"]).or_else(|| content_block_str(event, "id")))
                    .flatten()
                    .map(ToolUseId::from)
            });
        let tool_input = event
            .tool_input
            .clone()
            .or_else(|| {
                event
                    .payload_field("tool_input")
                    .or_else(|| event.payload_field("input"))
                    .or_else(|| {
                        event
                            .payload_field("content_block")
                            .and_then(|block| block.get("input"))
                    })
                    .cloned()
                    .map(ToolInput::from_value)
            })
            .unwrap_or_default();
        let tool_output = event
            .tool_output
            .as_ref()
            .or_else(|| event.payload_field("tool_output"))
            .or_else(|| event.payload_field("output"))
            .or_else(|| {
                (event_type == EventType::StreamToolResult)
                    .then(|| event.payload_field("content"))
                    .flatten()
            })
            .map(render_output)
            .unwrap_or_default();
        let is_error = event
            .is_error
            .or_else(|| event.payload_field("is_error").and_then(Value::as_bool))
            .unwrap_or(false);
        let text = event
            .content
            .clone()
            .or_else(|| payload_str(event, &["content", "text"]))
            .or_else(|| {
                event
                    .payload_field("delta")
                    .and_then(|delta| delta.get("text"))
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
            .unwrap_or_default();

        let mut issues = Vec::new();
        if !event_type.is_known() {
            issues.push(EventIssue::UnknownType);
        }
        if event.id.is_empty() {
            issues.push(EventIssue::MissingId);
        }
        if event.timestamp.is_none() {
            issues.push(EventIssue::MissingTimestamp);
        }
        if event_type == EventType::StreamToolUse && tool_name.is_empty() {
            issues.push(EventIssue::MissingToolName);
        }
        if matches!(
            event_type,
            EventType::StreamToolUse | EventType::StreamToolResult
        ) && tool_id.is_none()
        {
            issues.push(EventIssue::MissingToolId);
        }

        Self {
            id: event.id.clone(),
            key: event.dedupe_key(),
            event_type,
            run_id: event.run_id.clone(),
            sequence: event.sequence,
            timestamp: event.timestamp,
            role: event.role.clone(),
            text,
            tool_name,
            tool_id,
            tool_input,
            tool_output,
            is_error,
            payload: event.payload.clone(),
            issues,
        }
    }

    pub fn has_issue(&self, issue: EventIssue) -> bool {
        self.issues.contains(&issue)
    }

    pub fn payload_field(&self, key: &str) -> Option<&Value> {
        self.payload.as_object().and_then(|obj| obj.get(key))
    }
}

/// Sort by `(sequence, id)` and drop redelivered copies, keeping the first
/// occurrence in canonical order. Input order never affects the result.
pub fn canonicalize(events: &[Event]) -> Vec<Event> {
    canonical_refs(events).into_iter().cloned().collect()
}

/// [`canonicalize`] followed by field extraction.
#[instrument(skip_all, fields(events = events.len()))]
pub fn normalize(events: &[Event]) -> Vec<NormalizedEvent> {
    let normalized: Vec<NormalizedEvent> = canonical_refs(events)
        .into_iter()
        .map(NormalizedEvent::from_event)
        .collect();
    let flagged = normalized
        .iter()
        .filter(|event| !event.issues.is_empty())
        .count();
    debug!(
        raw = events.len(),
        canonical = normalized.len(),
        flagged,
        "events normalized"
    );
    normalized
}

fn canonical_refs(events: &[Event]) -> Vec<&Event> {
    let mut ordered: Vec<&Event> = events.iter().collect();
    ordered.sort_by(|a, b| {
        a.sequence
            .cmp(&b.sequence)
            .then_with(|| a.id.cmp(&b.id))
    });
    let mut seen = HashSet::with_capacity(ordered.len());
    ordered.retain(|event| seen.insert(event.dedupe_key()));
    ordered
}

fn payload_str(event: &Event, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        event
            .payload_field(key)
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
            .map(str::to_owned)
    })
}

fn content_block_str(event: &Event, key: &str) -> Option<String> {
    event
        .payload_field("content_block")
        .and_then(|block| block.get(key))
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_owned)
}

/// Tool output as display text. Content-part arrays keep only their text.
fn render_output(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(text) => Some(text.clone()),
                Value::Object(obj) => obj.get("text").and_then(Value::as_str).map(str::to_owned),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}
