use indexmap::IndexMap;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracelens_protocol::{Event, RunId};
use tracing::{debug, trace, warn};

/// Union of fetched and pushed events for the active run.
///
/// Either producer may deliver any event any number of times; entries are
/// keyed by [`Event::dedupe_key`], so the union never grows on redelivery.
/// A fetch is authoritative and overwrites what a push delivered.
#[derive(Debug, Clone, Default)]
pub struct RunFeed {
    run_id: Option<RunId>,
    events: IndexMap<String, Event>,
    stale: bool,
}

impl RunFeed {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id: Some(run_id),
            events: IndexMap::new(),
            stale: false,
        }
    }

    pub fn run_id(&self) -> Option<&RunId> {
        self.run_id.as_ref()
    }

    /// Merge a historical fetch. Returns how many events were new.
    pub fn apply_fetch(&mut self, events: impl IntoIterator<Item = Event>) -> usize {
        let mut added = 0;
        for event in events {
            if !self.accepts(&event) {
                continue;
            }
            if self.events.insert(event.dedupe_key(), event).is_none() {
                added += 1;
            }
        }
        self.stale = false;
        debug!(added, total = self.events.len(), "fetch applied");
        added
    }

    /// Merge one pushed event. Returns `false` for duplicates and other runs.
    pub fn apply_push(&mut self, event: Event) -> bool {
        if !self.accepts(&event) {
            return false;
        }
        let key = event.dedupe_key();
        if self.events.contains_key(&key) {
            trace!(%key, "duplicate push ignored");
            return false;
        }
        self.events.insert(key, event);
        true
    }

    /// Apply everything queued on `receiver` without waiting. A lagged
    /// receiver marks the feed stale; the caller should re-fetch.
    pub fn drain(&mut self, receiver: &mut broadcast::Receiver<Event>) -> usize {
        let mut applied = 0;
        loop {
            match receiver.try_recv() {
                Ok(event) => {
                    if self.apply_push(event) {
                        applied += 1;
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "live stream lagged; feed needs a re-fetch");
                    self.stale = true;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        applied
    }

    /// Make `run_id` active and forget everything held for the previous run.
    pub fn switch_run(&mut self, run_id: RunId) {
        debug!(from = ?self.run_id, to = %run_id, dropped = self.events.len(), "switching run");
        self.run_id = Some(run_id);
        self.events.clear();
        self.stale = false;
    }

    /// Events in `(sequence, id)` order.
    pub fn snapshot(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.events.values().cloned().collect();
        events.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.id.cmp(&b.id)));
        events
    }

    /// Highest sequence held, for incremental re-fetches.
    pub fn latest_sequence(&self) -> Option<u64> {
        self.events.values().map(|event| event.sequence).max()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn accepts(&self, event: &Event) -> bool {
        let accepted = self.run_id.as_ref() == Some(&event.run_id);
        if !accepted {
            trace!(run_id = %event.run_id, "event for another run ignored");
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracelens_protocol::EventType;

    fn event(run: &str, id: &str, sequence: u64) -> Event {
        Event::new(RunId::from(run), sequence, EventType::StreamAssistant).with_id(id)
    }

    #[test]
    fn push_and_fetch_interleave_without_duplicates() {
        let mut feed = RunFeed::new(RunId::from("r"));
        assert!(feed.apply_push(event("r", "b", 1)));
        assert!(!feed.apply_push(event("r", "b", 1)));
        assert_eq!(feed.apply_fetch(vec![event("r", "a", 0), event("r", "b", 1)]), 1);
        assert!(feed.apply_push(event("r", "c", 2)));
        assert_eq!(feed.apply_fetch(vec![event("r", "c", 2)]), 0);

        let ids: Vec<_> = feed.snapshot().iter().map(|e| e.id.to_string()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(feed.latest_sequence(), Some(2));
    }

    #[test]
    fn fetch_overwrites_pushed_copy() {
        let mut feed = RunFeed::new(RunId::from("r"));
        feed.apply_push(event("r", "a", 0).with_content("partial"));
        feed.apply_fetch(vec![event("r", "a", 0).with_content("final")]);
        assert_eq!(feed.snapshot()[0].content.as_deref(), Some("final"));
    }

    #[test]
    fn other_runs_are_ignored() {
        let mut feed = RunFeed::new(RunId::from("r"));
        assert!(!feed.apply_push(event("other", "x", 0)));
        assert_eq!(feed.apply_fetch(vec![event("other", "y", 1)]), 0);
        assert!(feed.is_empty());
    }

    #[test]
    fn switching_runs_drops_previous_state() {
        let mut feed = RunFeed::new(RunId::from("r"));
        feed.apply_push(event("r", "a", 0));
        feed.switch_run(RunId::from("s"));
        assert!(feed.is_empty());
        assert!(!feed.apply_push(event("r", "b", 1)));
        assert!(feed.apply_push(event("s", "a", 0)));
        assert_eq!(feed.run_id(), Some(&RunId::from("s")));
    }

    #[test]
    fn drain_applies_queued_events_and_flags_lag() {
        let (sender, mut receiver) = broadcast::channel(2);
        let mut feed = RunFeed::new(RunId::from("r"));

        sender.send(event("r", "a", 0)).unwrap();
        sender.send(event("r", "a", 0)).unwrap();
        assert_eq!(feed.drain(&mut receiver), 1);
        assert!(!feed.is_stale());

        for (i, id) in ["b", "c", "d"].iter().enumerate() {
            sender.send(event("r", id, i as u64 + 1)).unwrap();
        }
        assert_eq!(feed.drain(&mut receiver), 2);
        assert!(feed.is_stale());
        feed.apply_fetch(Vec::new());
        assert!(!feed.is_stale());
    }
}
