//! # tracelens-protocol — run events and derived views
//!
//! Shared contract between the event store adapters, the compiler, and the
//! render layer. Dependency-light (no tokio) so it can be used as a pure
//! contract crate.
//!
//! ## Module Overview
//!
//! - [`ids`] — Typed ID wrappers (EventId, RunId, ToolUseId, NodeId, ...)
//! - [`event`] — Event record + EventType taxonomy (forward-compatible)
//! - [`tool`] — ToolInput opaque argument map with named accessors
//! - [`view`] — Node, Edge, Lane, TimelineItem, ReplayState, RunView
//! - [`error`] — LensError, LensResult

pub mod error;
pub mod event;
pub mod ids;
pub mod tool;
pub mod view;

pub use error::{LensError, LensResult};
pub use event::{Event, EventType, parse_timestamp};
pub use ids::{EventId, NodeId, RunId, SeqNo, SessionId, ToolUseId};
pub use tool::ToolInput;
pub use view::{
    Edge, GraphView, Lane, Node, NodeKind, NodeStatus, Phase, ReplayState, RunView, TimelineItem,
    TimelineRole, TimelineView, ToolMeta,
};
