use anyhow::{Context, Result};
use landing::api::{build_app, AppState};
use landing::config::load_with_env;
use landing::rate_limit::{build_counter_store, run_purge_loop, AdmissionFilter};
use landing::store::SubmissionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "landing=info".into()),
        )
        .init();

    info!("Landing starting...");

    let config_path =
        std::env::var("LANDING_CONFIG").unwrap_or_else(|_| "landing.toml".to_string());
    let config = load_with_env(&config_path).context("Failed to load configuration")?;

    info!(
        config_path = %config_path,
        bind_addr = %config.server.bind_addr,
        database_path = %config.store.database_path,
        rate_limit_enabled = config.rate_limit.enabled,
        capacity = config.rate_limit.capacity,
        window_seconds = config.rate_limit.window_seconds,
        backend = ?config.rate_limit.backend,
        on_store_error = ?config.rate_limit.on_store_error,
        "Configuration loaded"
    );

    let store = Arc::new(
        SubmissionStore::new(&config.store.database_path)
            .context("Failed to initialize submission store")?,
    );
    info!("Submission store initialized");

    let counters = build_counter_store(&config.rate_limit)?;
    let filter = Arc::new(AdmissionFilter::new(Arc::clone(&counters), &config.rate_limit));

    let purge_handle = tokio::spawn(run_purge_loop(
        counters,
        config.rate_limit.window(),
        Duration::from_secs(config.rate_limit.purge_interval_seconds.max(1)),
    ));

    let app = build_app(
        AppState {
            store,
            max_body_bytes: config.server.max_body_bytes,
        },
        filter,
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    purge_handle.abort();
    info!("Landing stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl_c signal");
        // Keep serving; the process can still be killed
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
