//! Deterministic replay over a historical event list.
//!
//! The cursor is an inclusive index into the canonical list: at index `i` the
//! first `i + 1` events are visible, so parking on the last index shows the
//! whole run. Every cursor move recompiles the prefix from scratch.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracelens_protocol::{Event, LensError, LensResult, ReplayState, RunView, SeqNo};
use tracing::{debug, instrument};

use crate::config::{CompilerConfig, ReplayPacing};
use crate::graph::build_graph;
use crate::normalize::{NormalizedEvent, canonicalize, normalize};
use crate::timeline::fold_timeline;

#[derive(Debug, Clone)]
pub struct ReplayEngine {
    events: Vec<Event>,
    normalized: Vec<NormalizedEvent>,
    config: CompilerConfig,
    cursor: usize,
    speed: f64,
    playing: bool,
}

impl ReplayEngine {
    /// Wrap a run's events. The list is canonicalized first; the cursor starts
    /// on the first event, paused, at speed 1.
    pub fn new(events: &[Event], config: CompilerConfig) -> Self {
        let events = canonicalize(events);
        let normalized = normalize(&events);
        Self {
            events,
            normalized,
            config,
            cursor: 0,
            speed: 1.0,
            playing: false,
        }
    }

    /// Park the cursor on the first event at or after `sequence`, or on the
    /// last event when none qualifies.
    pub fn starting_at_sequence(mut self, sequence: SeqNo) -> Self {
        self.cursor = self
            .events
            .iter()
            .position(|event| event.sequence >= sequence)
            .unwrap_or_else(|| self.last_index());
        self
    }

    pub fn visible_events(&self) -> &[Event] {
        match self.events.len() {
            0 => &[],
            _ => &self.events[..=self.cursor],
        }
    }

    /// Compile the graph and timeline for the visible prefix.
    #[instrument(skip(self), fields(cursor = self.cursor, total = self.events.len()))]
    pub fn view(&self) -> RunView {
        let prefix = match self.normalized.len() {
            0 => &self.normalized[..],
            _ => &self.normalized[..=self.cursor],
        };
        RunView {
            graph: build_graph(prefix, &self.config),
            timeline: fold_timeline(prefix, &self.config),
        }
    }

    /// Move the cursor, clamped to the list. Returns the new index.
    pub fn seek(&mut self, index: usize) -> usize {
        self.cursor = index.min(self.last_index());
        if self.is_at_end() {
            self.playing = false;
        }
        self.cursor
    }

    pub fn step_forward(&mut self) -> bool {
        if self.is_at_end() {
            self.playing = false;
            return false;
        }
        self.cursor += 1;
        true
    }

    pub fn step_back(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    /// Start auto-advance. Has no effect on the last index.
    pub fn play(&mut self) {
        self.playing = !self.is_at_end();
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn set_speed(&mut self, speed: f64) -> LensResult<()> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(LensError::InvalidSpeed(speed));
        }
        self.speed = speed;
        Ok(())
    }

    /// Delay before the event after the cursor becomes visible. `None` at the end.
    pub fn next_delay(&self) -> Option<Duration> {
        if self.is_at_end() {
            return None;
        }
        let current = self.events[self.cursor].timestamp;
        let next = self.events[self.cursor + 1].timestamp;
        Some(pacing_delay(current, next, self.speed, &self.config.replay))
    }

    /// Advance one step while playing. Returns the delay to wait before the
    /// next tick, or `None` once playback has halted.
    pub fn tick(&mut self) -> Option<Duration> {
        if !self.playing {
            return None;
        }
        self.step_forward();
        if self.is_at_end() {
            self.playing = false;
            debug!(total = self.events.len(), "replay reached the end");
            return None;
        }
        self.next_delay()
    }

    pub fn state(&self) -> ReplayState {
        ReplayState {
            visible_prefix_index: self.cursor,
            total_events: self.events.len(),
            is_playing: self.playing,
            speed: self.speed,
        }
    }

    pub fn is_at_end(&self) -> bool {
        self.cursor >= self.last_index()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    fn last_index(&self) -> usize {
        self.events.len().saturating_sub(1)
    }
}

/// `|next - current| / speed`, clamped to the pacing bounds. A missing
/// timestamp on either side paces at the floor.
pub fn pacing_delay(
    current: Option<DateTime<Utc>>,
    next: Option<DateTime<Utc>>,
    speed: f64,
    pacing: &ReplayPacing,
) -> Duration {
    let (Some(current), Some(next)) = (current, next) else {
        return pacing.floor();
    };
    let gap_ms = (next - current).num_milliseconds().unsigned_abs() as f64;
    let scaled = if speed > 0.0 { gap_ms / speed } else { gap_ms };
    let floor = pacing.floor().as_millis() as f64;
    let ceiling = pacing.ceiling().as_millis() as f64;
    Duration::from_millis(scaled.clamp(floor, ceiling).round() as u64)
}
