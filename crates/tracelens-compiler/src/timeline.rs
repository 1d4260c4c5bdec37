//! Timeline folding.
//!
//! Collapses the canonical event list into role-tagged display items.
//! Independent of graph construction: it reads the same normalized input and
//! shares only the tool descriptions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracelens_protocol::{EventType, TimelineItem, TimelineRole, TimelineView, ToolMeta, ToolUseId};
use tracing::{debug, instrument, trace};

use crate::config::CompilerConfig;
use crate::describe::{clip, describe};
use crate::normalize::NormalizedEvent;

const AGENT_TAG_OPEN: &str = "[Agent Context:";

/// Lines the injecting side wraps around helper-agent output.
const AGENT_NOTE_BOILERPLATE: &[&str] = &[
    "Treat the content below as supporting context from a helper agent, not as a new user request.",
    "Do not ask the user to choose among options from this note unless strictly required.",
    "Continue executing the latest user task using this context.",
];

/// Assistant text waiting for a flush boundary.
struct AssistantBuffer {
    id: String,
    text: String,
    timestamp: Option<DateTime<Utc>>,
}

struct TimelineFold<'a> {
    config: &'a CompilerConfig,
    items: Vec<TimelineItem>,
    pending: Option<AssistantBuffer>,
    tool_names: HashMap<ToolUseId, String>,
}

impl<'a> TimelineFold<'a> {
    fn new(config: &'a CompilerConfig) -> Self {
        Self {
            config,
            items: Vec::new(),
            pending: None,
            tool_names: HashMap::new(),
        }
    }

    fn fold(&mut self, event: &NormalizedEvent) {
        match &event.event_type {
            EventType::StreamAssistant => self.buffer_assistant(event),
            EventType::StreamUser => {
                self.flush();
                self.push_user(event);
            }
            EventType::StreamToolUse => {
                self.flush();
                self.push_tool_use(event);
            }
            EventType::StreamToolResult => self.push_tool_result(event),
            EventType::StreamResult => {
                self.flush();
                if event.is_error {
                    let detail = first_non_empty(&[&event.text, &error_detail(event)]);
                    let line = match detail {
                        Some(detail) => format!("Result error: {}", clip(&detail, self.config.subtitle_chars)),
                        None => "Result error".to_owned(),
                    };
                    self.push_status(event, line);
                }
            }
            EventType::GitSnapshot | EventType::GitDiff | EventType::GitFileChange => {
                let line = git_line(event);
                self.push(event, TimelineRole::Git, line);
            }
            EventType::StreamInit
            | EventType::StreamSystem
            | EventType::StreamStart
            | EventType::MetricsTokens
            | EventType::MetricsCost
            | EventType::MetricsDuration
            | EventType::Other(_) => {
                trace!(event_id = %event.id, event_type = %event.event_type, "dropped from timeline");
            }
            other => match status_line(other, event) {
                Some(line) => self.push_status(event, line),
                None => trace!(event_id = %event.id, event_type = %other, "no timeline entry"),
            },
        }
    }

    fn buffer_assistant(&mut self, event: &NormalizedEvent) {
        let text = if event.text.is_empty() {
            message_text(&event.payload)
        } else {
            event.text.clone()
        };
        if text.is_empty() {
            return;
        }
        match &mut self.pending {
            Some(buffer) => {
                buffer.text.push_str(&text);
                if event.timestamp.is_some() {
                    buffer.timestamp = event.timestamp;
                }
            }
            None => {
                self.pending = Some(AssistantBuffer {
                    id: event.key.clone(),
                    text,
                    timestamp: event.timestamp,
                });
            }
        }
    }

    fn flush(&mut self) {
        let Some(buffer) = self.pending.take() else {
            return;
        };
        let text = buffer.text.trim();
        if text.is_empty() {
            return;
        }
        self.items.push(TimelineItem {
            id: buffer.id,
            role: TimelineRole::Assistant,
            content: text.to_owned(),
            timestamp: buffer.timestamp,
            tool: None,
            agent_name: None,
        });
    }

    fn push_user(&mut self, event: &NormalizedEvent) {
        // The hoisted text of a structured message also carries its tool
        // result bodies, so the parts win whenever they are present.
        let structured = matches!(message_content(&event.payload), Some(Value::Array(_)));
        let text = if structured || event.text.trim().is_empty() {
            message_text(&event.payload)
        } else {
            event.text.clone()
        };
        let text = text.trim();
        if text.is_empty() {
            trace!(event_id = %event.id, "user event without text parts");
            return;
        }
        match parse_agent_note(text) {
            Some((name, body)) => {
                let mut item = self.item(event, TimelineRole::Agent, body);
                item.agent_name = Some(name);
                self.items.push(item);
            }
            None => self.push(event, TimelineRole::User, text.to_owned()),
        }
    }

    fn push_tool_use(&mut self, event: &NormalizedEvent) {
        let description = describe(&event.tool_name, &event.tool_input, self.config);
        if let Some(tool_id) = &event.tool_id
            && !event.tool_name.is_empty()
        {
            self.tool_names.insert(tool_id.clone(), event.tool_name.clone());
        }
        let mut item = self.item(event, TimelineRole::Tool, description.summary());
        item.tool = Some(ToolMeta {
            tool_name: Some(event.tool_name.clone()).filter(|name| !name.is_empty()),
            tool_id: event.tool_id.clone(),
            input: Some(event.tool_input.clone()),
            preview: description.preview,
            is_error: false,
        });
        self.items.push(item);
    }

    fn push_tool_result(&mut self, event: &NormalizedEvent) {
        let output = event.tool_output.trim();
        if output.is_empty() && !event.is_error {
            trace!(event_id = %event.id, "empty successful tool result suppressed");
            return;
        }
        let content = if output.is_empty() {
            "Tool failed".to_owned()
        } else {
            clip(output, self.config.output_chars)
        };
        let tool_name = event
            .tool_id
            .as_ref()
            .and_then(|id| self.tool_names.get(id))
            .cloned();
        let mut item = self.item(event, TimelineRole::ToolResult, content);
        item.tool = Some(ToolMeta {
            tool_name,
            tool_id: event.tool_id.clone(),
            input: None,
            preview: None,
            is_error: event.is_error,
        });
        self.items.push(item);
    }

    fn push_status(&mut self, event: &NormalizedEvent, line: String) {
        self.push(event, TimelineRole::Status, line);
    }

    fn push(&mut self, event: &NormalizedEvent, role: TimelineRole, content: String) {
        let item = self.item(event, role, content);
        self.items.push(item);
    }

    fn item(&self, event: &NormalizedEvent, role: TimelineRole, content: String) -> TimelineItem {
        TimelineItem {
            id: event.key.clone(),
            role,
            content,
            timestamp: event.timestamp,
            tool: None,
            agent_name: None,
        }
    }

    fn finish(mut self) -> TimelineView {
        self.flush();
        TimelineView { items: self.items }
    }
}

/// Fold an ordered, normalized event list into the timeline view.
#[instrument(skip_all, fields(events = events.len()))]
pub fn fold_timeline(events: &[NormalizedEvent], config: &CompilerConfig) -> TimelineView {
    let mut fold = TimelineFold::new(config);
    for event in events {
        fold.fold(event);
    }
    let view = fold.finish();
    debug!(events = events.len(), items = view.items.len(), "timeline folded");
    view
}

/// Single-line description for lifecycle, intervention, and error events.
fn status_line(event_type: &EventType, event: &NormalizedEvent) -> Option<String> {
    let line = match event_type {
        EventType::RunCreated => "Run created".to_owned(),
        EventType::RunStarted => "Run started".to_owned(),
        EventType::RunPaused => "Run paused".to_owned(),
        EventType::RunResumed => "Run resumed".to_owned(),
        EventType::RunCompleted => "Run completed".to_owned(),
        EventType::RunBranched => "Run branched".to_owned(),
        EventType::RunFailed => match non_blank(error_detail(event)) {
            Some(detail) => format!("Run failed: {detail}"),
            None => "Run failed".to_owned(),
        },
        EventType::StreamError => {
            match first_non_empty(&[&event.text, &error_detail(event)]) {
                Some(detail) => format!("Error: {detail}"),
                None => "Error".to_owned(),
            }
        }
        EventType::SessionCreated => "Session created".to_owned(),
        EventType::SessionStarted => "Session started".to_owned(),
        EventType::SessionPaused => "Session paused".to_owned(),
        EventType::SessionResumed => "Session resumed".to_owned(),
        EventType::SessionCompleted => "Session completed".to_owned(),
        EventType::SessionFailed => "Session failed".to_owned(),
        other if other.category() == "intervention" => {
            let action = other
                .as_str()
                .split_once('.')
                .map_or("", |(_, action)| action)
                .replace('_', " ");
            format!("Intervention: {action}")
        }
        _ => return None,
    };
    Some(line)
}

fn git_line(event: &NormalizedEvent) -> String {
    match event.event_type {
        EventType::GitSnapshot => {
            let changed = event
                .payload_field("dirty_files")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            let mut line = format!("Git snapshot: {changed} files changed");
            if let Some(branch) = payload_text(event, "branch") {
                line.push_str(&format!(" on {branch}"));
            }
            if let Some(commit) = payload_text(event, "commit_hash") {
                let short: String = commit.chars().take(7).collect();
                line.push_str(&format!(" @ {short}"));
            }
            line
        }
        EventType::GitDiff => match payload_text(event, "diff_stat") {
            Some(stat) => format!("Git diff: {}", stat.lines().last().unwrap_or_default().trim()),
            None => "Git diff".to_owned(),
        },
        _ => match payload_text(event, "path") {
            Some(path) => format!("File changed: {path}"),
            None => "File changed".to_owned(),
        },
    }
}

/// Split an injected helper-agent note into `(name, body)`.
///
/// The body drops the wrapper boilerplate lines.
fn parse_agent_note(text: &str) -> Option<(String, String)> {
    let rest = text.strip_prefix(AGENT_TAG_OPEN)?;
    let (name, body) = rest.split_once(']')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let body = body
        .lines()
        .filter(|line| !AGENT_NOTE_BOILERPLATE.contains(&line.trim()))
        .collect::<Vec<_>>()
        .join("\n");
    Some((name.to_owned(), body.trim().to_owned()))
}

/// Text of a structured message: `message.content` or `content`, either a
/// plain string or an array whose `text` parts are joined. Other part types
/// (tool results, images) are skipped.
fn message_text(payload: &Value) -> String {
    match message_content(payload) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(text) => Some(text.as_str()),
                Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("text") => {
                    obj.get("text").and_then(Value::as_str)
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn message_content(payload: &Value) -> Option<&Value> {
    payload
        .get("message")
        .and_then(|message| message.get("content"))
        .or_else(|| payload.get("content"))
}

fn error_detail(event: &NormalizedEvent) -> String {
    ["error", "message"]
        .iter()
        .find_map(|key| payload_text(event, key))
        .unwrap_or_default()
}

fn payload_text(event: &NormalizedEvent, key: &str) -> Option<String> {
    event
        .payload_field(key)
        .and_then(Value::as_str)
        .and_then(|text| non_blank(text.to_owned()))
}

fn non_blank(text: String) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn first_non_empty(candidates: &[&String]) -> Option<String> {
    candidates
        .iter()
        .find_map(|text| non_blank((*text).clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use serde_json::json;
    use tracelens_protocol::{Event, RunId};

    fn ev(sequence: u64, event_type: EventType) -> Event {
        Event::new(RunId::from("run-1"), sequence, event_type).with_id(format!("e{sequence}"))
    }

    fn fold(events: &[Event]) -> TimelineView {
        fold_timeline(&normalize(events), &CompilerConfig::default())
    }

    fn roles(view: &TimelineView) -> Vec<TimelineRole> {
        view.items.iter().map(|item| item.role).collect()
    }

    #[test]
    fn empty_success_results_are_suppressed_but_errors_are_not() {
        let quiet = fold(&[
            ev(0, EventType::StreamToolUse).with_tool_use("Bash", "t1", json!({"command": "true"})),
            ev(1, EventType::StreamToolResult).with_tool_result("t1", "", false),
        ]);
        assert_eq!(roles(&quiet), [TimelineRole::Tool]);

        let loud = fold(&[
            ev(0, EventType::StreamToolUse).with_tool_use("Bash", "t1", json!({"command": "true"})),
            ev(1, EventType::StreamToolResult).with_tool_result("t1", "", true),
        ]);
        assert_eq!(roles(&loud), [TimelineRole::Tool, TimelineRole::ToolResult]);
        let meta = loud.items[1].tool.as_ref().unwrap();
        assert!(meta.is_error);
        assert_eq!(meta.tool_name.as_deref(), Some("Bash"));
    }

    #[test]
    fn assistant_deltas_collapse_until_tool_use() {
        let events = [
            ev(0, EventType::StreamAssistant).with_content("Let me "),
            ev(1, EventType::StreamAssistant).with_content("look at "),
            ev(2, EventType::StreamAssistant).with_content("the file.  "),
            ev(3, EventType::StreamToolUse).with_tool_use("Read", "t1", json!({"file_path": "/a/b.py"})),
            ev(4, EventType::StreamAssistant).with_content("Done."),
        ];
        let view = fold(&events);
        assert_eq!(
            roles(&view),
            [TimelineRole::Assistant, TimelineRole::Tool, TimelineRole::Assistant]
        );
        assert_eq!(view.items[0].content, "Let me look at the file.");
        assert_eq!(view.items[0].id, "e0");
        assert_eq!(view.items[0].timestamp, events[2].timestamp);
        assert_eq!(view.items[1].content, "Read b.py (/a/b.py)");
        assert_eq!(view.items[2].content, "Done.");
    }

    #[test]
    fn status_items_do_not_split_assistant_text() {
        let view = fold(&[
            ev(0, EventType::StreamAssistant).with_content("Hello "),
            ev(1, EventType::RunPaused),
            ev(2, EventType::StreamAssistant).with_content("again"),
        ]);
        assert_eq!(roles(&view), [TimelineRole::Status, TimelineRole::Assistant]);
        assert_eq!(view.items[1].content, "Hello again");
    }

    #[test]
    fn noise_events_are_dropped() {
        let view = fold(&[
            ev(0, EventType::StreamInit),
            ev(1, EventType::StreamSystem).with_content("model: x"),
            ev(2, EventType::StreamStart),
            ev(3, EventType::MetricsTokens).with_payload(json!({"input": 10})),
            ev(4, EventType::Other("stream.ping".into())),
        ]);
        assert!(view.items.is_empty());
    }

    #[test]
    fn user_message_keeps_only_text_parts() {
        let view = fold(&[ev(0, EventType::StreamUser).with_payload(json!({
            "message": {"content": [
                {"type": "tool_result", "tool_use_id": "t1", "content": "secret"},
                {"type": "text", "text": "please also update the docs"}
            ]}
        }))]);
        assert_eq!(roles(&view), [TimelineRole::User]);
        assert_eq!(view.items[0].content, "please also update the docs");
    }

    #[test]
    fn user_message_of_only_tool_results_is_hidden() {
        let view = fold(&[ev(0, EventType::StreamUser).with_payload(json!({
            "message": {"content": [{"type": "tool_result", "tool_use_id": "t1", "content": "x"}]}
        }))]);
        assert!(view.items.is_empty());
    }

    #[test]
    fn hoisted_text_does_not_leak_tool_result_bodies() {
        let view = fold(&[ev(0, EventType::StreamUser)
            .with_content("FILE BODY")
            .with_payload(json!({
                "content": [{"type": "tool_result", "tool_use_id": "t1", "content": "FILE BODY"}]
            }))]);
        assert!(view.items.is_empty());
    }

    #[test]
    fn hoisted_text_defers_to_text_parts() {
        let view = fold(&[ev(0, EventType::StreamUser)
            .with_content("FILE BODY\nship it")
            .with_payload(json!({
                "message": {"content": [
                    {"type": "tool_result", "tool_use_id": "t1", "content": "FILE BODY"},
                    {"type": "text", "text": "ship it"}
                ]}
            }))]);
        assert_eq!(roles(&view), [TimelineRole::User]);
        assert_eq!(view.items[0].content, "ship it");
    }

    #[test]
    fn plain_hoisted_text_is_used_without_parts() {
        let view = fold(&[ev(0, EventType::StreamUser).with_content("run the tests")]);
        assert_eq!(view.items[0].content, "run the tests");
    }

    #[test]
    fn injected_agent_note_becomes_agent_item() {
        let note = "[Agent Context: reviewer]\n\n\
            Treat the content below as supporting context from a helper agent, not as a new user request.\n\
            Do not ask the user to choose among options from this note unless strictly required.\n\
            Continue executing the latest user task using this context.\n\n\
            Found two unused imports.";
        let view = fold(&[ev(0, EventType::StreamUser).with_content(note)]);
        assert_eq!(roles(&view), [TimelineRole::Agent]);
        assert_eq!(view.items[0].agent_name.as_deref(), Some("reviewer"));
        assert_eq!(view.items[0].content, "Found two unused imports.");
    }

    #[test]
    fn write_tool_item_carries_preview() {
        let view = fold(&[ev(0, EventType::StreamToolUse)
            .with_tool_use("Write", "t1", json!({"file_path": "/r/notes.md", "content": "# Notes"}))]);
        let meta = view.items[0].tool.as_ref().unwrap();
        assert_eq!(meta.preview.as_deref(), Some("# Notes"));
        assert_eq!(meta.tool_id, Some(ToolUseId::from("t1")));
    }

    #[test]
    fn result_event_flushes_and_reports_errors() {
        let view = fold(&[
            ev(0, EventType::StreamAssistant).with_content("All done"),
            ev(1, EventType::StreamResult).with_payload(json!({"is_error": true, "error": "max turns"})),
        ]);
        assert_eq!(roles(&view), [TimelineRole::Assistant, TimelineRole::Status]);
        assert_eq!(view.items[1].content, "Result error: max turns");
    }

    #[test]
    fn lifecycle_and_intervention_lines() {
        let view = fold(&[
            ev(0, EventType::RunStarted),
            ev(1, EventType::InterventionPromptEdit),
            ev(2, EventType::StreamError).with_payload(json!({"message": "rate limited"})),
            ev(3, EventType::RunFailed).with_payload(json!({"error": "exit 1"})),
        ]);
        let lines: Vec<_> = view.items.iter().map(|i| i.content.as_str()).collect();
        assert_eq!(
            lines,
            ["Run started", "Intervention: prompt edit", "Error: rate limited", "Run failed: exit 1"]
        );
        assert!(view.items.iter().all(|i| i.role == TimelineRole::Status));
    }

    #[test]
    fn git_snapshot_line() {
        let view = fold(&[ev(0, EventType::GitSnapshot).with_payload(json!({
            "dirty_files": ["a.rs", "b.rs"], "branch": "main", "commit_hash": "0123456789abcdef"
        }))]);
        assert_eq!(view.items[0].role, TimelineRole::Git);
        assert_eq!(view.items[0].content, "Git snapshot: 2 files changed on main @ 0123456");
    }

    #[test]
    fn trailing_assistant_text_is_flushed() {
        let view = fold(&[ev(0, EventType::StreamAssistant).with_payload(json!({"delta": {"text": "tail"}}))]);
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].content, "tail");
    }

    #[test]
    fn folding_twice_is_identical() {
        let events = vec![
            ev(0, EventType::RunStarted),
            ev(1, EventType::StreamAssistant).with_content("Checking"),
            ev(2, EventType::StreamToolUse).with_tool_use("Grep", "t1", json!({"pattern": "fn main"})),
            ev(3, EventType::StreamToolResult).with_tool_result("t1", "src/main.rs:1", false),
            ev(4, EventType::RunCompleted),
        ];
        let first = serde_json::to_vec(&fold(&events)).unwrap();
        let second = serde_json::to_vec(&fold(&events)).unwrap();
        assert_eq!(first, second);
    }
}
