//! Typed ID wrappers.
//!
//! IDs are opaque String wrappers (serde-transparent). Event, run and tool ids
//! are assigned by the event store or the agent process; tracelens never
//! invents them except for locally generated node ids.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Create a new ID using UUID v4 (random).
            pub fn new_uuid() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// View as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(
    /// Unique identifier for an event within a run.
    EventId
);
typed_id!(
    /// Identifier for an agent run.
    RunId
);
typed_id!(
    /// Identifier for the session that owns a run.
    SessionId
);
typed_id!(
    /// Identifier the agent assigns to a tool invocation; results point back to it.
    ToolUseId
);
typed_id!(
    /// Locally generated graph node identifier, stable for a given event list.
    NodeId
);

impl NodeId {
    pub fn from_index(index: usize) -> Self {
        Self(format!("node-{index}"))
    }
}

/// Monotonic sequence number within a run.
pub type SeqNo = u64;
