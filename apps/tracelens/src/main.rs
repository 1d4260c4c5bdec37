mod render;
mod source;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracelens_compiler::{Compiler, CompilerConfig, ReplayEngine};
use tracelens_events::{EventStreamHub, FileEventStore, RunFeed};
use tracelens_protocol::{Event, LensError, RunId, SeqNo};
use tracing::{debug, info, warn};

use crate::render::{
    RULE, graph_lines, json_lines, replay_frame_line, replay_header, timeline_lines,
};
use crate::source::EventSource;

#[derive(Debug, Parser)]
#[command(name = "tracelens")]
#[command(about = "Phased graph, timeline, and replay views of agent runs")]
struct Cli {
    /// Event store root; run logs live under `<root>/events/`.
    #[arg(long, global = true, default_value = ".tracelens")]
    root: PathBuf,
    /// Read events from a JSONL export instead of the store.
    #[arg(long, global = true)]
    file: Option<PathBuf>,
    /// Compiler configuration (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print views as JSON.
    #[arg(long, global = true)]
    json: bool,
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the phased execution graph
    Graph(RunArg),
    /// Print the collapsed timeline
    Timeline(RunArg),
    /// Replay a run with its original pacing
    Replay(ReplayArgs),
    /// Follow a live run and reprint on change
    Watch(WatchArgs),
}

#[derive(Debug, Args, Clone)]
struct RunArg {
    /// Run to load. Optional with `--file`.
    run_id: Option<String>,
}

#[derive(Debug, Args, Clone)]
struct ReplayArgs {
    #[command(flatten)]
    run: RunArg,
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
    #[arg(long, default_value_t = 0)]
    from_sequence: SeqNo,
    /// Replay as fast as possible.
    #[arg(long)]
    no_timing: bool,
}

#[derive(Debug, Args, Clone)]
struct WatchArgs {
    #[command(flatten)]
    run: RunArg,
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let compiler = Compiler::new(load_config(cli.config.as_ref()).await?);
    let run_arg = match &cli.command {
        Command::Graph(run) | Command::Timeline(run) => run,
        Command::Replay(args) => &args.run,
        Command::Watch(args) => &args.run,
    };
    let source = Arc::new(event_source(&cli, run_arg)?);

    match &cli.command {
        Command::Graph(_) => show_graph(&compiler, &source, cli.json).await,
        Command::Timeline(_) => show_timeline(&compiler, &source, cli.json).await,
        Command::Replay(args) => replay(&compiler, &source, args, cli.json).await,
        Command::Watch(args) => watch(&compiler, source, args, cli.json).await,
    }
}

fn init_tracing(log_json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = if log_json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}

async fn load_config(path: Option<&PathBuf>) -> Result<CompilerConfig> {
    let Some(path) = path else {
        return Ok(CompilerConfig::default());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed reading config {path:?}"))?;
    let config = CompilerConfig::from_json_str(&raw)
        .with_context(|| format!("invalid config {path:?}"))?;
    debug!(?config, "compiler config loaded");
    Ok(config)
}

fn event_source(cli: &Cli, run: &RunArg) -> Result<EventSource> {
    let run_id = run.run_id.as_deref().map(RunId::from);
    match (&cli.file, run_id) {
        (Some(path), run_id) => Ok(EventSource::File {
            path: path.clone(),
            run_id,
        }),
        (None, Some(run_id)) => Ok(EventSource::Store {
            store: FileEventStore::new(&cli.root),
            run_id,
        }),
        (None, None) => anyhow::bail!("a run id is required unless --file is given"),
    }
}

async fn load_run(source: &EventSource) -> Result<Vec<Event>> {
    let events = source.fetch(0).await?;
    if events.is_empty() {
        return Err(LensError::RunNotFound(source.label()).into());
    }
    info!(run = %source.label(), events = events.len(), "run loaded");
    Ok(events)
}

fn print_lines(lines: impl IntoIterator<Item = String>) {
    for line in lines {
        println!("{line}");
    }
}

async fn show_graph(compiler: &Compiler, source: &EventSource, json: bool) -> Result<()> {
    let events = load_run(source).await?;
    let graph = compiler.graph(&events);
    if json {
        println!("{}", serde_json::to_string_pretty(&graph)?);
    } else {
        println!("Run: {}", source.label());
        print_lines(graph_lines(&graph));
    }
    Ok(())
}

async fn show_timeline(compiler: &Compiler, source: &EventSource, json: bool) -> Result<()> {
    let events = load_run(source).await?;
    let timeline = compiler.timeline(&events);
    if json {
        print_lines(json_lines(&timeline.items, "timeline item"));
    } else {
        print_lines(timeline_lines(&timeline));
    }
    Ok(())
}

async fn replay(
    compiler: &Compiler,
    source: &EventSource,
    args: &ReplayArgs,
    json: bool,
) -> Result<()> {
    let events = load_run(source).await?;
    let mut engine = compiler
        .replay(&events)
        .starting_at_sequence(args.from_sequence);
    engine.set_speed(args.speed)?;

    if !json {
        print_lines(replay_header(&source.label(), events.len(), &engine.state()));
    }

    let mut printed: HashSet<String> = HashSet::new();
    emit_replay_step(&engine, json, &mut printed)?;

    engine.play();
    while let Some(delay) = engine.next_delay() {
        if !args.no_timing {
            tokio::time::sleep(delay).await;
        }
        engine.tick();
        emit_replay_step(&engine, json, &mut printed)?;
        if !engine.state().is_playing {
            break;
        }
    }

    if !json {
        print_lines([
            RULE.to_owned(),
            format!("  Replay complete: {} events", engine.visible_events().len()),
            RULE.to_owned(),
        ]);
    }
    Ok(())
}

/// Print what became visible at the current cursor.
///
/// JSON mode writes one frame per step: the control state plus both views.
/// Text mode prints only new timeline items; the newest may still grow
/// (buffered assistant text), so it waits until it is no longer last or the
/// replay has ended.
fn emit_replay_step(
    engine: &ReplayEngine,
    json: bool,
    printed: &mut HashSet<String>,
) -> Result<()> {
    let view = engine.view();
    if json {
        println!("{}", replay_frame_line(engine.state(), &view)?);
        return Ok(());
    }
    let timeline = view.timeline;
    let settled = if engine.is_at_end() {
        timeline.items.len()
    } else {
        timeline.items.len().saturating_sub(1)
    };
    let fresh: Vec<_> = timeline.items[..settled]
        .iter()
        .filter(|item| printed.insert(item.id.clone()))
        .cloned()
        .collect();
    print_lines(timeline_lines(&tracelens_protocol::TimelineView { items: fresh }));
    Ok(())
}

/// Capacity of the live channel between the tailer and the render loop.
const WATCH_BUFFER: usize = 1024;

/// Follow a run until it reaches a terminal event or Ctrl-C.
///
/// A background tailer publishes new events on an [`EventStreamHub`]; the
/// render loop drains them into a [`RunFeed`] and falls back to a full fetch
/// when the channel lags.
async fn watch(
    compiler: &Compiler,
    source: Arc<EventSource>,
    args: &WatchArgs,
    json: bool,
) -> Result<()> {
    let interval = Duration::from_millis(args.interval_ms.max(1));
    let hub = EventStreamHub::new(WATCH_BUFFER);
    let mut live = hub.subscribe();
    let mut feed = match source.run_id() {
        Some(run_id) => RunFeed::new(run_id.clone()),
        None => RunFeed::default(),
    };
    refetch(&mut feed, &source).await;

    let from = feed.latest_sequence().map_or(0, |seq| seq + 1);
    let tailer = tokio::spawn(Arc::clone(&source).tail(hub, interval, from));
    info!(run = %source.label(), interval_ms = args.interval_ms, "watching run");

    let mut last_digest = String::new();
    let outcome = loop {
        feed.drain(&mut live);
        if feed.is_stale() || feed.run_id().is_none() {
            refetch(&mut feed, &source).await;
        }

        let snapshot = feed.snapshot();
        let view = compiler.compile(&snapshot);
        let digest = view.digest();
        if digest != last_digest {
            if json {
                match serde_json::to_string(&view) {
                    Ok(line) => println!("{line}"),
                    Err(error) => break Err(error.into()),
                }
            } else {
                println!("{RULE}");
                print_lines(graph_lines(&view.graph));
                print_lines(timeline_lines(&view.timeline));
            }
            last_digest = digest;
        }

        if snapshot.iter().any(|event| event.event_type.is_run_terminal()) {
            info!(events = snapshot.len(), "run finished");
            break Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("watch interrupted");
                break Ok(());
            }
        }
    };
    tailer.abort();
    outcome
}

/// Authoritative full fetch into the feed. Adopts the first run seen when
/// reading an unfiltered export.
async fn refetch(feed: &mut RunFeed, source: &EventSource) {
    match source.fetch(0).await {
        Ok(events) => {
            if feed.run_id().is_none()
                && let Some(first) = events.first()
            {
                feed.switch_run(first.run_id.clone());
            }
            feed.apply_fetch(events);
        }
        Err(error) => warn!(error = %format!("{error:#}"), "fetch failed; retrying"),
    }
}
