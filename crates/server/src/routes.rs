//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::trace::trace_id_middleware;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and part headers on top of the upload limit.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state
        .config
        .blob
        .max_upload_size
        .saturating_add(MULTIPART_OVERHEAD);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    let api_routes = Router::new()
        .route(
            "/upload",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/files", get(handlers::list_files))
        .route(
            "/files/{id}",
            get(handlers::download_file).delete(handlers::delete_file),
        )
        // Readiness probe, also answers while the backend is connecting.
        .route("/health", get(handlers::health_check));

    let mut router = Router::new().merge(api_routes);

    // SECURITY: When enabled, restrict this endpoint to scraper addresses.
    // See crate::metrics module documentation for details.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    if let Some(dir) = state.config.server.static_dir.as_deref() {
        if dir.is_dir() {
            tracing::info!(static_dir = %dir.display(), "Serving static files");
            router = router.fallback_service(ServeDir::new(dir));
        } else {
            tracing::debug!(static_dir = %dir.display(), "Static directory missing, not serving it");
        }
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Middleware layers are applied in reverse order (outermost first).
    // Order of execution: CORS -> TraceLayer -> trace id -> Handler
    router
        .layer(middleware::from_fn(trace_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
