pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::cache::handlers as cache;
use crate::generation::handlers as generation;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Generation stream
        .route("/api/v1/cache/generate", post(generation::handle_generate))
        // Version registry
        .route("/api/v1/cache/versions", get(cache::handle_list_versions))
        .route(
            "/api/v1/cache/versions/:id",
            get(cache::handle_get_version).delete(cache::handle_delete_version),
        )
        // Export / import
        .route(
            "/api/v1/cache/versions/:id/export",
            get(cache::handle_export),
        )
        .route("/api/v1/cache/import", post(cache::handle_import))
        // Artifacts
        .route(
            "/api/v1/cache/versions/:id/artifacts",
            get(cache::handle_list_artifacts),
        )
        .route(
            "/api/v1/cache/versions/:id/artifacts/:item_id",
            get(cache::handle_get_artifact).patch(cache::handle_update_artifact),
        )
        // Active pointers + consumer read path
        .route(
            "/api/v1/cache/active",
            get(cache::handle_get_active).post(cache::handle_set_active),
        )
        .route("/api/v1/cache/active/list", get(cache::handle_list_active))
        .route("/api/v1/cache/current", get(cache::handle_get_current))
        .route("/api/v1/cache/stats", get(cache::handle_stats))
        .with_state(state)
}
