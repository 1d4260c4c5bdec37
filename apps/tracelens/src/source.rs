use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracelens_events::{EventStore, EventStreamHub, FileEventStore, load_jsonl};
use tracelens_protocol::{Event, RunId, SeqNo};
use tracing::{trace, warn};

/// Where a command reads its events from.
pub enum EventSource {
    /// Per-run JSONL logs under a store root.
    Store { store: FileEventStore, run_id: RunId },
    /// A single JSONL export, optionally filtered to one run.
    File { path: PathBuf, run_id: Option<RunId> },
}

impl EventSource {
    pub fn label(&self) -> String {
        match self {
            Self::Store { run_id, .. } => run_id.to_string(),
            Self::File { path, run_id } => match run_id {
                Some(run_id) => format!("{run_id} ({})", path.display()),
                None => path.display().to_string(),
            },
        }
    }

    pub fn run_id(&self) -> Option<&RunId> {
        match self {
            Self::Store { run_id, .. } => Some(run_id),
            Self::File { run_id, .. } => run_id.as_ref(),
        }
    }

    /// Events with `sequence >= from_sequence`, in store order.
    pub async fn fetch(&self, from_sequence: SeqNo) -> Result<Vec<Event>> {
        match self {
            Self::Store { store, run_id } => store.read_run(run_id, from_sequence, usize::MAX).await,
            Self::File { path, run_id } => {
                let events = load_jsonl(path).await?;
                Ok(events
                    .into_iter()
                    .filter(|event| run_id.as_ref().is_none_or(|run| &event.run_id == run))
                    .filter(|event| event.sequence >= from_sequence)
                    .collect())
            }
        }
    }

    /// Poll for events at or past `from_sequence` every `interval` and
    /// publish them on `hub`. Runs until the task is aborted.
    pub async fn tail(
        self: Arc<Self>,
        hub: EventStreamHub,
        interval: Duration,
        from_sequence: SeqNo,
    ) {
        let mut next = from_sequence;
        loop {
            tokio::time::sleep(interval).await;
            match self.fetch(next).await {
                Ok(events) => {
                    for event in events {
                        next = next.max(event.sequence + 1);
                        hub.publish(event);
                    }
                    trace!(next, "tail polled");
                }
                Err(error) => warn!(error = %format!("{error:#}"), "tail fetch failed; retrying"),
            }
        }
    }
}
