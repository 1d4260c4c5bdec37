//! Tool invocation arguments.
//!
//! Agents send arbitrary argument shapes. [`ToolInput`] keeps them as an
//! opaque key-value map and exposes named accessors for the keys the known
//! tools use. Unknown keys are preserved but never interpreted.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ToolInput(Map<String, Value>);

impl ToolInput {
    /// Wrap a JSON value. Objects are kept as-is; any other value is stored
    /// under `"raw"` so nothing is lost.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            Value::Null => Self::default(),
            other => {
                let mut map = Map::new();
                map.insert("raw".to_owned(), other);
                Self(map)
            }
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Non-blank string value for `key`.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    fn first_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.str_field(key))
    }

    /// Path for file tools (`file_path`, then `path`, then `notebook_path`).
    pub fn file_path(&self) -> Option<&str> {
        self.first_str(&["file_path", "path", "notebook_path"])
    }

    pub fn command(&self) -> Option<&str> {
        self.str_field("command")
    }

    pub fn description(&self) -> Option<&str> {
        self.str_field("description")
    }

    pub fn pattern(&self) -> Option<&str> {
        self.str_field("pattern")
    }

    /// Full file body sent by `Write`.
    pub fn content(&self) -> Option<&str> {
        self.str_field("content")
    }

    /// Replacement text sent by `Edit`.
    pub fn new_string(&self) -> Option<&str> {
        self.str_field("new_string")
    }

    /// Replacement text of the first entry in a `MultiEdit` batch.
    pub fn first_edit_new_string(&self) -> Option<&str> {
        self.0
            .get("edits")
            .and_then(Value::as_array)
            .and_then(|edits| edits.first())
            .and_then(|edit| edit.get("new_string"))
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn url(&self) -> Option<&str> {
        self.str_field("url")
    }

    pub fn query(&self) -> Option<&str> {
        self.str_field("query")
    }

    pub fn prompt(&self) -> Option<&str> {
        self.str_field("prompt")
    }

    /// Best-effort primary argument for tools without a dedicated rule.
    pub fn generic_primary(&self) -> Option<&str> {
        self.first_str(&[
            "file_path",
            "path",
            "url",
            "query",
            "pattern",
            "command",
            "prompt",
        ])
    }
}

impl<'de> Deserialize<'de> for ToolInput {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Self::from_value(Value::deserialize(deserializer)?))
    }
}

impl From<Value> for ToolInput {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn file_path_prefers_file_path_key() {
        let input = ToolInput::from_value(json!({"path": "/b", "file_path": "/a"}));
        assert_eq!(input.file_path(), Some("/a"));

        let notebook = ToolInput::from_value(json!({"notebook_path": "/nb.ipynb"}));
        assert_eq!(notebook.file_path(), Some("/nb.ipynb"));
    }

    #[test]
    fn blank_strings_are_treated_as_missing() {
        let input = ToolInput::from_value(json!({"command": "   ", "pattern": 5}));
        assert_eq!(input.command(), None);
        assert_eq!(input.pattern(), None);
    }

    #[test]
    fn non_object_input_is_kept_under_raw() {
        let input: ToolInput = serde_json::from_value(json!("ls -la")).unwrap();
        assert_eq!(input.str_field("raw"), Some("ls -la"));
    }

    #[test]
    fn unknown_keys_survive_serialization() {
        let original = json!({"file_path": "/a", "x-custom": {"nested": true}});
        let input = ToolInput::from_value(original.clone());
        assert_eq!(serde_json::to_value(&input).unwrap(), original);
    }

    #[test]
    fn multi_edit_first_replacement() {
        let input = ToolInput::from_value(json!({
            "file_path": "/a.rs",
            "edits": [{"old_string": "a", "new_string": "b"}, {"new_string": "c"}]
        }));
        assert_eq!(input.first_edit_new_string(), Some("b"));
    }
}
