use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracelens_protocol::{LensError, LensResult};

/// Limits applied while compiling views. All lengths are in characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Inline content preview for file-producing tools.
    pub preview_chars: usize,
    /// Tool output kept on nodes and tool-result items.
    pub output_chars: usize,
    /// Shell command preview used as a node label.
    pub label_command_chars: usize,
    pub subtitle_chars: usize,
    pub replay: ReplayPacing,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            preview_chars: 500,
            output_chars: 2000,
            label_command_chars: 48,
            subtitle_chars: 120,
            replay: ReplayPacing::default(),
        }
    }
}

impl CompilerConfig {
    pub fn from_json_str(raw: &str) -> LensResult<Self> {
        serde_json::from_str(raw).map_err(|err| LensError::Serialization(err.to_string()))
    }
}

/// Bounds on the delay between two auto-advanced replay steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayPacing {
    pub floor_ms: u64,
    pub ceiling_ms: u64,
}

impl Default for ReplayPacing {
    fn default() -> Self {
        Self {
            floor_ms: 50,
            ceiling_ms: 2000,
        }
    }
}

impl ReplayPacing {
    pub fn floor(&self) -> Duration {
        Duration::from_millis(self.floor_ms)
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.ceiling_ms.max(self.floor_ms))
    }
}
