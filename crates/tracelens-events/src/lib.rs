//! Event store collaborators for tracelens.
//!
//! The compiler never talks to storage. These adapters supply it with a run's
//! historical event list ([`EventStore`]), a live push stream of new events
//! ([`EventStreamHub`]), and the reconciliation of both into one list
//! ([`RunFeed`]).

mod feed;

pub use feed::RunFeed;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;
use tracelens_protocol::{Event, LensError, RunId, SeqNo};
use tracing::{debug, instrument, trace, warn};

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: &Event) -> Result<()>;
    async fn read_run(&self, run_id: &RunId, from_sequence: SeqNo, limit: usize)
    -> Result<Vec<Event>>;
    /// Highest stored sequence for the run, `None` when the run has no events.
    async fn latest_sequence(&self, run_id: &RunId) -> Result<Option<SeqNo>>;
}

/// One JSONL file per run under `<root>/events/`.
#[derive(Debug)]
pub struct FileEventStore {
    root: PathBuf,
    write_locks: Mutex<HashMap<RunId, Arc<tokio::sync::Mutex<()>>>>,
    sequence_cache: Mutex<HashMap<RunId, Option<SeqNo>>>,
}

impl FileEventStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_locks: Mutex::new(HashMap::new()),
            sequence_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_path(&self, run_id: &RunId) -> PathBuf {
        self.root
            .join("events")
            .join(format!("{}.jsonl", file_stem(run_id)))
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create events dir {parent:?}"))?;
        }
        Ok(())
    }

    fn lock_for(&self, run_id: &RunId) -> Arc<tokio::sync::Mutex<()>> {
        let mut guard = self.write_locks.lock();
        guard
            .entry(run_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn scan_latest_sequence(path: &Path) -> Result<Option<SeqNo>> {
        let events = read_events(path).await?;
        Ok(events.iter().map(|event| event.sequence).max())
    }

    fn cached_latest_sequence(&self, run_id: &RunId) -> Option<Option<SeqNo>> {
        self.sequence_cache.lock().get(run_id).copied()
    }

    fn update_cached_sequence(&self, run_id: &RunId, latest: Option<SeqNo>) {
        self.sequence_cache.lock().insert(run_id.clone(), latest);
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    #[instrument(skip(self, event), fields(run_id = %event.run_id, sequence = event.sequence))]
    async fn append(&self, event: &Event) -> Result<()> {
        let path = self.file_path(&event.run_id);
        Self::ensure_parent(&path).await?;

        let lock = self.lock_for(&event.run_id);
        let _guard = lock.lock().await;

        let latest = match self.cached_latest_sequence(&event.run_id) {
            Some(latest) => latest,
            None => {
                let latest = Self::scan_latest_sequence(&path).await?;
                self.update_cached_sequence(&event.run_id, latest);
                latest
            }
        };

        let expected = latest.map_or(0, |latest| latest.saturating_add(1));
        if event.sequence != expected {
            warn!(
                expected_sequence = expected,
                actual_sequence = event.sequence,
                "sequence conflict while appending event"
            );
            return Err(LensError::SequenceConflict {
                expected,
                actual: event.sequence,
            })
            .with_context(|| format!("append to run {}", event.run_id));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed opening event log {path:?}"))?;

        let line = serde_json::to_string(event).context("failed serializing event")?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        self.update_cached_sequence(&event.run_id, Some(event.sequence));
        debug!("event appended to store");
        Ok(())
    }

    #[instrument(skip(self), fields(run_id = %run_id, from_sequence, limit))]
    async fn read_run(
        &self,
        run_id: &RunId,
        from_sequence: SeqNo,
        limit: usize,
    ) -> Result<Vec<Event>> {
        let path = self.file_path(run_id);
        let mut out: Vec<Event> = read_events(&path)
            .await?
            .into_iter()
            .filter(|event| event.sequence >= from_sequence)
            .collect();
        out.sort_by_key(|event| event.sequence);
        out.truncate(limit);
        debug!(count = out.len(), "events loaded from store");
        Ok(out)
    }

    #[instrument(skip(self), fields(run_id = %run_id))]
    async fn latest_sequence(&self, run_id: &RunId) -> Result<Option<SeqNo>> {
        if let Some(latest) = self.cached_latest_sequence(run_id) {
            return Ok(latest);
        }
        let path = self.file_path(run_id);
        let latest = Self::scan_latest_sequence(&path).await?;
        self.update_cached_sequence(run_id, latest);
        debug!(?latest, "latest sequence resolved");
        Ok(latest)
    }
}

/// Read every event from a standalone JSONL export. Unparseable lines are
/// skipped with a warning.
#[instrument]
pub async fn load_jsonl(path: &Path) -> Result<Vec<Event>> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Err(LensError::Io(format!("no such file: {}", path.display())).into());
    }
    let events = read_events(path).await?;
    debug!(count = events.len(), "events loaded from file");
    Ok(events)
}

async fn read_events(path: &Path) -> Result<Vec<Event>> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Ok(Vec::new());
    }

    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .await
        .with_context(|| format!("failed opening event log {path:?}"))?;
    let mut reader = BufReader::new(file).lines();
    let mut out = Vec::new();
    let mut line_no = 0_usize;

    while let Some(line) = reader.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(&line) {
            Ok(event) => out.push(event),
            Err(err) => warn!(?path, line_no, %err, "skipping unreadable event line"),
        }
    }
    Ok(out)
}

/// Run ids are free-form strings; keep file names portable.
fn file_stem(run_id: &RunId) -> String {
    run_id
        .as_str()
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

/// Live push channel for new events. Subscribers that fall more than
/// `buffer` events behind see a lag and must re-fetch (see [`RunFeed::drain`]).
#[derive(Clone, Debug)]
pub struct EventStreamHub {
    sender: broadcast::Sender<Event>,
}

impl EventStreamHub {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }

    /// Returns how many subscribers the event reached.
    pub fn publish(&self, event: Event) -> usize {
        let reached = self.sender.send(event).unwrap_or(0);
        if reached == 0 {
            trace!("event published with no subscribers");
        }
        reached
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}
