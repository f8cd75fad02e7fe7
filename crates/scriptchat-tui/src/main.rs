//! ScriptChat Terminal UI.
//!
//! Browse uploaded scripts, edit their roles, and chat with a role.

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scriptchat_client::config::{default_store_path, DEFAULT_BASE_URL};
use scriptchat_client::{ClientConfig, HttpClient};
use scriptchat_core::PersistentStore;

mod app;
mod backend;
mod event;
mod state;
mod ui;

use app::App;
use event::{BackendCommand, UiEvent};

#[derive(Parser)]
#[command(name = "scriptchat-tui")]
#[command(about = "ScriptChat Terminal UI")]
#[command(version)]
struct Cli {
    /// Backend API base URL
    #[arg(long, env = "SCRIPTCHAT_API", default_value = DEFAULT_BASE_URL)]
    api: String,

    /// Path of the local script store
    #[arg(long, env = "SCRIPTCHAT_STORE")]
    store: Option<PathBuf>,

    /// Log file
    #[arg(long, default_value = "/tmp/scriptchat-tui.log")]
    log_file: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // Logs go to a file; the terminal belongs to ratatui.
    if let Ok(file) = std::fs::File::create(&cli.log_file) {
        tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(file))
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("scriptchat_tui=debug,scriptchat_client=debug,scriptchat_core=info")
            }))
            .with_ansi(false)
            .init();
    }

    let config = ClientConfig::new(&cli.api, cli.store.unwrap_or_else(default_store_path));
    let store = PersistentStore::load(config.store_path.clone())?;
    let client = HttpClient::from_config(&config);

    info!(
        base_url = %config.base_url,
        store = %config.store_path.display(),
        "Starting ScriptChat TUI"
    );

    let (ui_tx, ui_rx) = mpsc::channel::<UiEvent>(100);
    let (cmd_tx, cmd_rx) = mpsc::channel::<BackendCommand>(100);

    // HTTP and streaming run on their own runtime off the UI thread.
    let bg_handle = std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
        rt.block_on(backend::run_backend(client, ui_tx, cmd_rx));
    });

    let terminal = ratatui::init();

    let mut app = App::new(store, ui_rx, cmd_tx);
    let result = app.run(terminal);

    ratatui::restore();

    // Closing the channels unblocks a backend still waiting to send.
    drop(app);
    let _ = bg_handle.join();

    info!("ScriptChat TUI exited");

    result.map_err(|e| e.into())
}
