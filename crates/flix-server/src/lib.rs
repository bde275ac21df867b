//! flix-server: HTTP server, artifact cache, worker pool, and file watcher.
//!
//! This crate ties flix-core and flix-av together into a running server:
//!
//! - Axum HTTP routes with Basic authentication and byte-range streaming
//! - Artifact cache that coalesces concurrent generation per key
//! - Bounded worker pool with graceful drain on shutdown
//! - File system watcher that schedules artifacts for new videos

pub mod cache;
pub mod context;
pub mod error;
pub mod listing;
pub mod middleware;
pub mod pipeline;
pub mod pool;
pub mod router;
pub mod routes;
pub mod stream;
pub mod watcher;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use flix_av::{ProcessRunner, SharedRunner, ToolRegistry};
use flix_core::config::Config;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Start the server.
///
/// Discovers the external tools, builds the [`AppContext`], and serves until
/// a shutdown signal arrives. On shutdown the worker pool drains for
/// `workers.shutdown_grace_secs` before remaining generations are cancelled.
pub async fn start(config: Config) -> flix_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let tools = ToolRegistry::discover(&config.tools);
    for info in tools.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}; dependent features are disabled", info.name);
        }
    }

    let runner: SharedRunner = Arc::new(ProcessRunner::new(tools.clone()));
    let ctx = AppContext::new(config, runner, tools)?;
    let grace = Duration::from_secs(ctx.config.workers.shutdown_grace_secs);

    let addr: SocketAddr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port)
        .parse()
        .map_err(|e| flix_core::Error::Internal(format!("Invalid server address: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| flix_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!(root = %ctx.root.get().display(), "Starting server on {addr}");

    let cancel = CancellationToken::new();

    let watcher_handle = tokio::spawn(watcher::run_watcher(ctx.clone(), cancel.clone()));

    // Drain the pool as soon as shutdown begins, so requests waiting on a
    // generation finish and let the HTTP server stop.
    let pool_handle = {
        let pool = ctx.pool.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            pool.shutdown(grace).await;
        })
    };

    serve(listener, ctx, shutdown_signal(cancel.clone())).await?;

    cancel.cancel();
    let _ = tokio::join!(watcher_handle, pool_handle);

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Serve the router for `ctx` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    ctx: AppContext,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> flix_core::Result<()> {
    let app = router::build_router(ctx.clone(), ctx.config.server.static_dir.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Wait for SIGINT, SIGTERM, or `cancel`; then cancel `cancel`.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
    cancel.cancel();
}
