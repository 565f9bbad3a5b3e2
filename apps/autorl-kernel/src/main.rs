// [[AUTORL]]/apps/autorl-kernel/src/main.rs
// Purpose: Entry point. Loads config, builds the runtime and serves the API.
// Architecture: Application Boot
// Dependencies: Axum, Tokio, tracing-subscriber

use anyhow::Context;
use std::sync::Arc;

use autorl_kernel::{server, AutoRLRuntime, KernelConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the defaults below
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::try_new("autorl_kernel=debug,tower_http=info")
            .context("invalid log filter")?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Initializing AutoRL Kernel...");

    let config = KernelConfig::from_env();
    let addr = config.bind_addr();
    let runtime = Arc::new(AutoRLRuntime::new(config));

    let app = server::router(runtime);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("AutoRL Kernel Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("AutoRL Kernel stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
