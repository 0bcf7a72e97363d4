#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{error, info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use screenpool::constants::{logging, timing};
use screenpool::x11_utils::RandrOutputSource;
use screenpool::{
    ConnectorStore, JsonConnectorStore, MemoryConnectorStore, OutputSource, ScreenEvent, ScreenPool, Settings,
};

#[derive(Parser, Debug)]
#[command(name = "screenpool", version, about = "Keeps stable screen ids for connected display outputs")]
struct Cli {
    /// Settings file (defaults to ~/.config/screenpool/settings.json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Connector mapping file (defaults to ~/.config/screenpool/screen_connectors.json)
    #[arg(long, value_name = "PATH")]
    store: Option<PathBuf>,

    /// trace, debug, info, warn or error
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// X11 display to connect to instead of $DISPLAY
    #[arg(long, value_name = "DISPLAY")]
    display: Option<String>,

    /// Print logical screen events as JSON lines on stdout
    #[arg(long)]
    print_events: bool,

    /// Keep the mapping in memory only
    #[arg(long)]
    no_persist: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Track outputs until interrupted (default)
    Run,
    /// Print the id mapping and the currently connected outputs, then exit
    Show,
}

fn parse_log_level(level: &str) -> TraceLevel {
    match level.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli.config.clone().unwrap_or_else(Settings::path);
    let settings = Settings::load_from(&settings_path)?;

    // Command line wins over environment, environment over the settings file
    let log_level = cli
        .log_level
        .clone()
        .or_else(|| std::env::var(logging::LOG_LEVEL_ENV).ok())
        .unwrap_or_else(|| settings.log_level.clone());
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_log_level(&log_level))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let source = RandrOutputSource::connect(cli.display.as_deref())?;
    let print_events = cli.print_events || settings.print_events;
    let command = cli.command.unwrap_or(Command::Run);

    if cli.no_persist {
        info!("Persistence disabled, mapping lives in memory only");
        dispatch(command, MemoryConnectorStore::new(), source, &settings, print_events)
    } else {
        let store_path = cli.store.clone().unwrap_or_else(JsonConnectorStore::default_path);
        dispatch(command, JsonConnectorStore::open(store_path), source, &settings, print_events)
    }
}

fn dispatch<S: ConnectorStore>(
    command: Command,
    store: S,
    source: RandrOutputSource,
    settings: &Settings,
    print_events: bool,
) -> Result<()> {
    match command {
        Command::Run => run(store, source, settings, print_events),
        Command::Show => show(store, &source, settings),
    }
}

fn run<S: ConnectorStore>(
    store: S,
    mut source: RandrOutputSource,
    settings: &Settings,
    print_events: bool,
) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        signal_hook::flag::register(SIGINT, Arc::clone(&shutdown)).context("Failed to register SIGINT handler")?;
        signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown)).context("Failed to register SIGTERM handler")?;
    }

    let mut pool = ScreenPool::new(store, settings.pool_settings());
    let screen_events = pool.subscribe();
    pool.load(source.outputs(), source.primary().as_deref());
    report_events(&pool, &screen_events, print_events);

    // X11 listener thread → main loop
    let (wake_tx, wake_rx) = mpsc::channel();
    let _listener = source.spawn_listener(wake_tx);

    let idle = Duration::from_millis(timing::EVENT_LOOP_IDLE_MS);
    while !shutdown.load(Ordering::SeqCst) {
        let timeout = pool
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .map_or(idle, |remaining| remaining.min(idle));

        match wake_rx.recv_timeout(timeout) {
            Ok(()) => {
                // One refresh covers every notification queued so far
                while wake_rx.try_recv().is_ok() {}
                match source.refresh() {
                    Ok(events) => {
                        for event in events {
                            pool.handle_event(event);
                        }
                    }
                    Err(e) => error!(error = ?e, "Failed to read display configuration"),
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                warn!("RandR listener stopped, shutting down");
                break;
            }
        }

        pool.poll_timers(Instant::now());
        report_events(&pool, &screen_events, print_events);
    }

    info!("Shutting down");
    pool.shutdown()?;
    Ok(())
}

fn report_events<S: ConnectorStore>(pool: &ScreenPool<S>, events: &Receiver<ScreenEvent>, print_events: bool) {
    for event in events.try_iter() {
        let output = event.output();
        let id = pool.id(&output.name);
        match &event {
            ScreenEvent::Added(_) => info!(connector = %output.name, id = ?id, geometry = %output.geometry, "Screen added"),
            ScreenEvent::Removed(_) => info!(connector = %output.name, id = ?id, "Screen removed"),
        }
        if print_events {
            let line = serde_json::json!({ "id": id, "screen": event });
            println!("{line}");
        }
    }
}

fn show<S: ConnectorStore>(store: S, source: &RandrOutputSource, settings: &Settings) -> Result<()> {
    // Loading only touches the in-memory copy; nothing is synced back
    let mut pool = ScreenPool::new(store, settings.pool_settings());
    pool.load(source.outputs(), source.primary().as_deref());

    println!("Screen ids:");
    for (id, connector) in pool.identity_table().entries() {
        let marker = if id == 0 { " (primary)" } else { "" };
        println!("  {id}: {connector}{marker}");
    }

    println!("Connected outputs:");
    for output in pool.outputs() {
        let state = match pool.state(output.handle) {
            Some(screenpool::OutputState::Live) => "screen",
            Some(screenpool::OutputState::Redundant) => "suppressed",
            None => "unknown",
        };
        let id = pool
            .id(&output.name)
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        println!("  [{id}] {} {} {state}", output.name, output.geometry);
    }
    Ok(())
}
