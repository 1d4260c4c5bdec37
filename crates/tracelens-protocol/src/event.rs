//! Run events as delivered by the event store.
//!
//! An [`Event`] is an immutable record of one occurrence in an agent run. The
//! shape follows the persisted row: envelope fields plus the stream fields
//! (`tool_name`, `tool_input`, ...) hoisted to the top level. Every field is
//! optional on decode so a partial record still loads.
//!
//! Forward-compatible: unknown `"type"` strings deserialize into
//! [`EventType::Other`] instead of failing.

use crate::ids::{EventId, RunId, SeqNo, SessionId, ToolUseId};
use crate::tool::ToolInput;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// One event of an agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: EventId,
    #[serde(rename = "type", default)]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub run_id: RunId,
    #[serde(default)]
    pub sequence: SeqNo,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<EventId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<ToolUseId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<ToolInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Event {
    /// Create an event with a fresh id and the current timestamp.
    pub fn new(run_id: RunId, sequence: SeqNo, event_type: EventType) -> Self {
        Self {
            id: EventId::new_uuid(),
            event_type,
            session_id: None,
            run_id,
            sequence,
            timestamp: Some(Utc::now()),
            parent_event_id: None,
            role: None,
            content: None,
            content_type: None,
            tool_name: None,
            tool_id: None,
            tool_input: None,
            tool_output: None,
            is_error: None,
            payload: Value::Null,
        }
    }

    pub fn with_id(mut self, id: impl Into<EventId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_tool_use(
        mut self,
        tool_name: impl Into<String>,
        tool_id: impl Into<ToolUseId>,
        input: Value,
    ) -> Self {
        self.tool_name = Some(tool_name.into());
        self.tool_id = Some(tool_id.into());
        self.tool_input = Some(ToolInput::from_value(input));
        self
    }

    pub fn with_tool_result(
        mut self,
        tool_id: impl Into<ToolUseId>,
        output: impl Into<String>,
        is_error: bool,
    ) -> Self {
        self.tool_id = Some(tool_id.into());
        self.tool_output = Some(Value::String(output.into()));
        self.is_error = Some(is_error);
        self
    }

    /// Key used to collapse redelivered copies of the same event.
    ///
    /// Events without an id fall back to `<type>@<sequence>`.
    pub fn dedupe_key(&self) -> String {
        if self.id.is_empty() {
            format!("{}@{}", self.event_type.as_str(), self.sequence)
        } else {
            self.id.as_str().to_owned()
        }
    }

    /// Look up a key in the payload object, if the payload is an object.
    pub fn payload_field(&self, key: &str) -> Option<&Value> {
        self.payload.as_object().and_then(|obj| obj.get(key))
    }
}

/// Accept RFC 3339, naive ISO-8601 (read as UTC), or epoch seconds.
/// Anything else decodes to `None` rather than failing the whole record.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(parse_timestamp))
}

pub fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(number) => {
            let seconds = number.as_f64()?;
            if !seconds.is_finite() {
                return None;
            }
            let micros = (seconds * 1_000_000.0) as i64;
            DateTime::from_timestamp_micros(micros)
        }
        _ => None,
    }
}

// ─── Event taxonomy ────────────────────────────────────────────────

/// Dotted event type, e.g. `stream.tool_use`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    // ── Session lifecycle ──
    SessionCreated,
    SessionStarted,
    SessionPaused,
    SessionResumed,
    SessionCompleted,
    SessionFailed,

    // ── Run lifecycle ──
    RunCreated,
    RunStarted,
    RunPaused,
    RunResumed,
    RunCompleted,
    RunFailed,
    RunBranched,

    // ── Agent stream ──
    StreamInit,
    StreamSystem,
    StreamStart,
    StreamAssistant,
    StreamUser,
    StreamToolUse,
    StreamToolResult,
    StreamResult,
    StreamError,

    // ── Human intervention ──
    InterventionPause,
    InterventionResume,
    InterventionPromptEdit,
    InterventionRetry,
    InterventionBranch,
    InterventionInject,
    InterventionAbort,

    // ── Git tracking ──
    GitSnapshot,
    GitDiff,
    GitFileChange,

    // ── Metrics ──
    MetricsTokens,
    MetricsCost,
    MetricsDuration,

    // ── Forward-compatible catch-all ──
    Other(String),
}

impl Default for EventType {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SessionCreated => "session.created",
            Self::SessionStarted => "session.started",
            Self::SessionPaused => "session.paused",
            Self::SessionResumed => "session.resumed",
            Self::SessionCompleted => "session.completed",
            Self::SessionFailed => "session.failed",
            Self::RunCreated => "run.created",
            Self::RunStarted => "run.started",
            Self::RunPaused => "run.paused",
            Self::RunResumed => "run.resumed",
            Self::RunCompleted => "run.completed",
            Self::RunFailed => "run.failed",
            Self::RunBranched => "run.branched",
            Self::StreamInit => "stream.init",
            Self::StreamSystem => "stream.system",
            Self::StreamStart => "stream.start",
            Self::StreamAssistant => "stream.assistant",
            Self::StreamUser => "stream.user",
            Self::StreamToolUse => "stream.tool_use",
            Self::StreamToolResult => "stream.tool_result",
            Self::StreamResult => "stream.result",
            Self::StreamError => "stream.error",
            Self::InterventionPause => "intervention.pause",
            Self::InterventionResume => "intervention.resume",
            Self::InterventionPromptEdit => "intervention.prompt_edit",
            Self::InterventionRetry => "intervention.retry",
            Self::InterventionBranch => "intervention.branch",
            Self::InterventionInject => "intervention.inject",
            Self::InterventionAbort => "intervention.abort",
            Self::GitSnapshot => "git.snapshot",
            Self::GitDiff => "git.diff",
            Self::GitFileChange => "git.file_change",
            Self::MetricsTokens => "metrics.tokens",
            Self::MetricsCost => "metrics.cost",
            Self::MetricsDuration => "metrics.duration",
            Self::Other(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "session.created" => Self::SessionCreated,
            "session.started" => Self::SessionStarted,
            "session.paused" => Self::SessionPaused,
            "session.resumed" => Self::SessionResumed,
            "session.completed" => Self::SessionCompleted,
            "session.failed" => Self::SessionFailed,
            "run.created" => Self::RunCreated,
            "run.started" => Self::RunStarted,
            "run.paused" => Self::RunPaused,
            "run.resumed" => Self::RunResumed,
            "run.completed" => Self::RunCompleted,
            "run.failed" => Self::RunFailed,
            "run.branched" => Self::RunBranched,
            "stream.init" => Self::StreamInit,
            "stream.system" => Self::StreamSystem,
            "stream.start" => Self::StreamStart,
            "stream.assistant" => Self::StreamAssistant,
            "stream.user" => Self::StreamUser,
            "stream.tool_use" => Self::StreamToolUse,
            "stream.tool_result" => Self::StreamToolResult,
            "stream.result" => Self::StreamResult,
            "stream.error" => Self::StreamError,
            "intervention.pause" => Self::InterventionPause,
            "intervention.resume" => Self::InterventionResume,
            "intervention.prompt_edit" => Self::InterventionPromptEdit,
            "intervention.retry" => Self::InterventionRetry,
            "intervention.branch" => Self::InterventionBranch,
            "intervention.inject" => Self::InterventionInject,
            "intervention.abort" => Self::InterventionAbort,
            "git.snapshot" => Self::GitSnapshot,
            "git.diff" => Self::GitDiff,
            "git.file_change" => Self::GitFileChange,
            "metrics.tokens" => Self::MetricsTokens,
            "metrics.cost" => Self::MetricsCost,
            "metrics.duration" => Self::MetricsDuration,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// The prefix before the first dot (`run`, `stream`, `git`, ...).
    pub fn category(&self) -> &str {
        let raw = self.as_str();
        raw.split_once('.').map_or(raw, |(category, _)| category)
    }

    /// `run.completed` or `run.failed`.
    pub fn is_run_terminal(&self) -> bool {
        matches!(self, Self::RunCompleted | Self::RunFailed)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Forward-compatible deserializer: unknown strings become `Other`, and a
/// non-string `type` becomes an empty `Other` instead of failing the record.
impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        Ok(match raw {
            Value::String(text) => Self::parse(&text),
            _ => Self::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_types_roundtrip_through_strings() {
        for raw in [
            "run.started",
            "run.completed",
            "stream.tool_use",
            "stream.tool_result",
            "git.snapshot",
            "intervention.prompt_edit",
            "metrics.tokens",
        ] {
            let parsed = EventType::parse(raw);
            assert!(parsed.is_known(), "{raw} should be known");
            assert_eq!(parsed.as_str(), raw);
        }
    }

    #[test]
    fn unknown_type_becomes_other() {
        let parsed: EventType = serde_json::from_value(json!("stream.future_thing")).unwrap();
        assert_eq!(parsed, EventType::Other("stream.future_thing".into()));
        assert_eq!(parsed.category(), "stream");
        assert!(!parsed.is_known());
    }

    #[test]
    fn non_string_type_does_not_fail_record() {
        let event: Event = serde_json::from_value(json!({"id": "e1", "type": 42})).unwrap();
        assert_eq!(event.event_type, EventType::default());
    }

    #[test]
    fn persisted_row_decodes_with_hoisted_fields() {
        let row = json!({
            "id": "evt-7",
            "type": "stream.tool_use",
            "session_id": "sess-1",
            "run_id": "run-1",
            "timestamp": "2025-01-02T03:04:05.123456",
            "sequence": 7,
            "payload": {"content_block": {"id": "toolu_1", "name": "Read"}},
            "parent_event_id": null,
            "tool_name": "Read",
            "tool_id": "toolu_1",
            "tool_input": {"file_path": "/src/a.py"}
        });
        let event: Event = serde_json::from_value(row).unwrap();
        assert_eq!(event.sequence, 7);
        assert_eq!(event.event_type, EventType::StreamToolUse);
        assert_eq!(event.tool_name.as_deref(), Some("Read"));
        assert_eq!(
            event.tool_input.as_ref().and_then(|input| input.file_path()),
            Some("/src/a.py")
        );
        let ts = event.timestamp.unwrap();
        assert_eq!(ts.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn sparse_record_defaults_instead_of_failing() {
        let event: Event = serde_json::from_value(json!({})).unwrap();
        assert!(event.id.is_empty());
        assert_eq!(event.sequence, 0);
        assert!(event.timestamp.is_none());
        assert!(event.payload.is_null());
    }

    #[test]
    fn unparseable_timestamp_is_none() {
        let event: Event =
            serde_json::from_value(json!({"id": "e1", "timestamp": "yesterday"})).unwrap();
        assert!(event.timestamp.is_none());
    }

    #[test]
    fn epoch_seconds_timestamp_is_accepted() {
        let ts = parse_timestamp(&json!(1_700_000_000.5)).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn dedupe_key_falls_back_to_type_and_sequence() {
        let with_id = Event::new(RunId::from("r"), 4, EventType::RunStarted).with_id("abc");
        assert_eq!(with_id.dedupe_key(), "abc");

        let without_id = Event::new(RunId::from("r"), 4, EventType::RunStarted).with_id("");
        assert_eq!(without_id.dedupe_key(), "run.started@4");
    }
}
