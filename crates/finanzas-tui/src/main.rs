// Finanzas entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config (defaults copied on first run, env overrides applied)
// 3. Open the configured backend and locate the session file
// 4. Create mpsc channels and the LLM client
// 5. Spawn app logic task (restores the saved session on start)
// 6. Run the TUI until the user quits
// 7. Cleanup on exit

use finanzas_app::app;
use finanzas_app::auth::SessionStore;
use finanzas_app::backend;
use finanzas_core::config;
use finanzas_llm::client::LlmClient;
use finanzas_tui::tui;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file, not terminal)
    init_tracing()?;
    info!("Finanzas starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        backend = ?config.backend.kind,
        model = %config.llm.model,
        "config loaded"
    );

    // 3. Open the backend
    let backend = backend::open_backend(&config).context("failed to open backend")?;
    info!(backend = backend.name(), "backend opened");
    let session_store = SessionStore::default_location(backend.name());
    match &session_store {
        Some(store) => info!(path = %store.path().display(), "session file location"),
        None => warn!("no data directory available; sessions will not persist"),
    }

    // 4. Channels and LLM client
    let (llm_tx, llm_rx) = mpsc::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    let llm_client = LlmClient::from_config(&config);
    match &llm_client {
        LlmClient::Active(_) => info!("LLM client initialized (API key configured)"),
        LlmClient::Disabled => info!("LLM client disabled (no API key)"),
    }

    let mut app_state = app::AppState::new(
        config,
        backend,
        session_store,
        llm_client,
        llm_tx.clone(),
    );
    app_state.export_dir = std::env::current_dir().context("failed to read working directory")?;

    // 5. Spawn app logic task
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(llm_rx, cmd_rx, ui_tx, app_state).await {
            error!("Application loop error: {}", e);
        }
    });

    // AppState holds its own sender for spawning LLM tasks.
    drop(llm_tx);

    // 6. Blocks until the user confirms quit or presses Ctrl+C.
    if let Err(e) = tui::run(ui_rx, cmd_tx).await {
        error!("TUI error: {}", e);
    }

    // 7. Wait for the app task to finish (with timeout)
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;

    info!("Finanzas shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (not the terminal, which is used by the TUI).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("finanzas.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("finanzas=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
