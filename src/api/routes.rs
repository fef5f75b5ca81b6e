//! API route definitions

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{self, SharedState};

/// Create the API router
pub fn create_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // ====================================================================
        // Repository catalogue
        // ====================================================================
        .route(
            "/api/repos",
            get(handlers::list_repos).post(handlers::create_repo),
        )
        .route(
            "/api/repos/{id}",
            axum::routing::put(handlers::update_repo).delete(handlers::delete_repo),
        )
        // Symbol data generation and queries
        .route(
            "/api/repos/{id}/doxygen",
            get(handlers::get_doxygen_status).post(handlers::regenerate_doxygen),
        )
        .route("/api/repos/{id}/symbols", get(handlers::get_repo_symbols))
        .route(
            "/api/repos/{id}/symbols/{qualified_name}/callers",
            get(handlers::get_symbol_callers),
        )
        .route(
            "/api/repos/{id}/symbols/{qualified_name}/callees",
            get(handlers::get_symbol_callees),
        )
        // ====================================================================
        // Mod submission and polling
        // ====================================================================
        .route("/api/mods", post(handlers::submit_mod))
        .route("/api/mods/{id}/status", get(handlers::get_mod_status))
        .route("/api/mods/{id}/cancel", post(handlers::cancel_mod))
        .route("/api/queue/status", get(handlers::get_queue_status))
        // ====================================================================
        // Registries
        // ====================================================================
        .route("/api/available/mods", get(handlers::get_available_mods))
        .route(
            "/api/available/validators",
            get(handlers::get_available_validators),
        )
        .route(
            "/api/available/compilers",
            get(handlers::get_available_compilers),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
