mod app;
mod banner;
mod records;

use std::{
    fs::{self, OpenOptions},
    sync::Arc,
};

use anyhow::{Context, Result};
use estokar_core::{
    config::{self, AppConfig},
    FileTokenStore, Gateway, ReqwestTransport, SessionGuard,
};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let config_path = config::ensure_default_config()?;
    let config = AppConfig::load()?;
    tracing::info!(
        config = %config_path.display(),
        base_url = %config.base_url(),
        "configuration loaded"
    );

    let transport = Arc::new(ReqwestTransport::new());
    let store = Arc::new(FileTokenStore::for_origin(
        &config.session.store_dir,
        config.base_url(),
    ));
    let gateway = Gateway::new(config.api.clone(), transport);
    let guard = SessionGuard::new(gateway, store, config.credentials.clone());
    guard.mount();

    let mut app = app::EstokarApp::new(guard);
    app.run().await
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;
    let log_path = log_dir.join("estokar.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // The terminal belongs to the UI, so events only go to the file.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(())
}
