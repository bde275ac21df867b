//! Axum router construction.
//!
//! Builds the application router with all routes, middleware layers, and
//! optional static file serving.

use std::path::PathBuf;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::middleware::auth::auth_middleware;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext, static_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/health", get(routes::library::health))
        // Library
        .route("/files", get(routes::library::list_files))
        .route("/set_dir", post(routes::library::set_dir))
        .route("/status", get(routes::library::status))
        .route("/tools", get(routes::library::tools))
        // Per-file
        .route("/file/{*path}", get(routes::media::file))
        .route("/thumbnail/{*path}", get(routes::media::thumbnail))
        .route("/metadata/{*path}", get(routes::media::metadata))
        .route("/previews/{*path}", get(routes::media::previews))
        .route("/stream/{*path}", get(routes::media::stream))
        .route("/process/{*path}", post(routes::media::process))
        // Cached artifacts
        .route("/hls/{key}/{file}", get(routes::artifacts::hls_file))
        .route("/preview/{key}/{file}", get(routes::artifacts::preview_file));

    // Static file serving for the web UI.
    if let Some(dir) = static_dir {
        if dir.exists() {
            tracing::info!("Serving static files from {:?}", dir);
            app = app.fallback_service(
                tower_http::services::ServeDir::new(&dir).append_index_html_on_directories(true),
            );
        }
    }

    // Auth wraps the static fallback too.
    app.layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
