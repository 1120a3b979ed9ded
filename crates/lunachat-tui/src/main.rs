use std::fs::{self, OpenOptions};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use lunachat_core::{Config, DirectoryStore, GroqClient, StreamEvent};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod input;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

/// Log to a file; stderr belongs to the terminal UI
fn init_logging(config: &Config) -> Result<()> {
    let log_path = Config::log_path()?;
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log_file = OpenOptions::new().create(true).append(true).open(&log_path)?;

    let default_level = config.log_level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_env("LUNACHAT_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = Config::path().ok();
    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::new(), Some(e)),
    };

    init_logging(&config)?;
    info!("LunaChat v{} starting", env!("CARGO_PKG_VERSION"));
    if let Some(e) = config_error {
        warn!(error = %e, "could not read config, using defaults");
    }

    let store = DirectoryStore::new(config.preset_dir()?);
    info!(root = %store.root().display(), "preset store ready");

    let api_key = config.api_key().unwrap_or_default();
    let client = GroqClient::with_base_url(&api_key, config.base_url());

    let (stream_tx, mut stream_rx) = mpsc::unbounded_channel::<StreamEvent>();
    let mut app = App::new(config, config_path, Arc::new(store), Arc::new(client), stream_tx)?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let result = run(&mut terminal, &mut app, &mut events, &mut stream_rx).await;

    app.shutdown();
    tui::restore()?;
    info!("LunaChat exiting");
    result
}

async fn run(
    terminal: &mut Tui,
    app: &mut App,
    events: &mut EventHandler,
    stream_rx: &mut mpsc::UnboundedReceiver<StreamEvent>,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            Some(event) = events.next() => handler::handle_event(app, event),
            Some(event) = stream_rx.recv() => app.handle_stream_event(event),
            else => break,
        }
    }
    Ok(())
}
