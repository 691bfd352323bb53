use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Config;
use crate::extract::Extractor;
use crate::pdf::Ghostscript;
use crate::server::{router, AppState};
use crate::workspace::WorkDirs;

pub async fn run(config: Config) -> Result<()> {
    let dirs = WorkDirs::create(&config.work_dir).await.with_context(|| {
        format!(
            "Failed to prepare work directory {}",
            config.work_dir.display()
        )
    })?;
    Arc::new(dirs.clone()).spawn_janitor(config.sweep_interval, config.stale_after);

    let gs = Ghostscript::detect(config.gs_command.as_deref(), config.tool_timeout).await;
    let tool_version = gs.version().map(str::to_string);
    if tool_version.is_none() {
        warn!(
            command = gs.command(),
            "Ghostscript not found, page counts will be estimated and extraction will fail"
        );
    }

    let state = AppState {
        extractor: Extractor::new(Arc::new(gs), dirs),
        tool_version,
        cleanup_delay: config.cleanup_delay,
        max_upload_bytes: config.max_upload_bytes,
    };
    let app = router(state, config.static_dir.as_deref());

    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.addr))?;
    info!(addr = %config.addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
