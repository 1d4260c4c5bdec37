//! # tracelens-compiler — agent run events to views
//!
//! A pure, synchronous transform. Given a run's event list in any order and
//! with any amount of redelivery, it produces:
//!
//! - a phased execution graph ([`GraphView`]): nodes, chain edges, lane totals
//! - a collapsed conversational timeline ([`TimelineView`])
//! - replay over a historical prefix ([`ReplayEngine`])
//!
//! Nothing here holds state between calls. Every compile sorts and
//! deduplicates its input, then rebuilds the views from scratch.
//!
//! ## Module Overview
//!
//! - [`normalize`] — canonical order, dedupe, uniform field extraction
//! - [`phase`] — tool call to phase classification
//! - [`describe`] — per-tool labels, signatures, previews
//! - [`graph`] — node/edge/lane fold
//! - [`status`] — result join and pending promotion
//! - [`timeline`] — display item fold
//! - [`replay`] — cursor, speed, pacing
//! - [`config`] — truncation limits and replay pacing

pub mod config;
pub mod describe;
pub mod graph;
pub mod normalize;
pub mod phase;
pub mod replay;
pub mod status;
pub mod timeline;

pub use config::{CompilerConfig, ReplayPacing};
pub use describe::{ToolDescription, describe};
pub use graph::build_graph;
pub use normalize::{EventIssue, NormalizedEvent, canonicalize, normalize};
pub use phase::classify;
pub use replay::{ReplayEngine, pacing_delay};
pub use timeline::fold_timeline;

use tracelens_protocol::{Event, GraphView, RunView, TimelineView};
use tracing::instrument;

/// Entry point bundling a configuration with the compile stages.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Normalize `events` and build both views.
    #[instrument(skip(self, events), fields(events = events.len()))]
    pub fn compile(&self, events: &[Event]) -> RunView {
        self.compile_normalized(&normalize(events))
    }

    /// Build both views from an already canonical list.
    pub fn compile_normalized(&self, events: &[NormalizedEvent]) -> RunView {
        RunView {
            graph: build_graph(events, &self.config),
            timeline: fold_timeline(events, &self.config),
        }
    }

    #[instrument(skip(self, events), fields(events = events.len()))]
    pub fn graph(&self, events: &[Event]) -> GraphView {
        build_graph(&normalize(events), &self.config)
    }

    #[instrument(skip(self, events), fields(events = events.len()))]
    pub fn timeline(&self, events: &[Event]) -> TimelineView {
        fold_timeline(&normalize(events), &self.config)
    }

    /// Replay engine over `events` sharing this compiler's configuration.
    pub fn replay(&self, events: &[Event]) -> ReplayEngine {
        ReplayEngine::new(events, self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracelens_protocol::{EventType, Phase, RunId};

    fn sample() -> Vec<Event> {
        let run = RunId::from("run-42");
        vec![
            Event::new(run.clone(), 0, EventType::RunStarted).with_id("a"),
            Event::new(run.clone(), 1, EventType::StreamToolUse)
                .with_id("b")
                .with_tool_use("Edit", "t1", json!({"file_path": "/src/lib.rs", "new_string": "x"})),
            Event::new(run.clone(), 2, EventType::StreamToolResult)
                .with_id("c")
                .with_tool_result("t1", "", false),
            Event::new(run, 3, EventType::RunCompleted).with_id("d"),
        ]
    }

    #[test]
    fn redelivery_does_not_change_the_view() -> anyhow::Result<()> {
        let compiler = Compiler::default();
        let events = sample();
        let mut redelivered = events.clone();
        redelivered.extend(events.iter().cloned());
        redelivered.reverse();

        let once = compiler.compile(&events);
        let twice = compiler.compile(&redelivered);
        assert_eq!(serde_json::to_string(&once)?, serde_json::to_string(&twice)?);
        assert_eq!(once.digest(), twice.digest());
        Ok(())
    }

    #[test]
    fn graph_and_timeline_agree_with_compile() {
        let compiler = Compiler::new(CompilerConfig::default());
        let events = sample();
        let view = compiler.compile(&events);
        assert_eq!(view.graph, compiler.graph(&events));
        assert_eq!(view.timeline, compiler.timeline(&events));
        assert_eq!(view.graph.lane(Phase::Implement).map(|l| l.files), Some(1));
    }

    #[test]
    fn replay_uses_compiler_config() {
        let config = CompilerConfig {
            output_chars: 10,
            ..CompilerConfig::default()
        };
        let compiler = Compiler::new(config.clone());
        let engine = compiler.replay(&sample());
        assert_eq!(engine.state().total_events, 4);
        assert_eq!(compiler.config(), &config);
    }
}
