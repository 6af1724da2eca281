//! Route configuration.

use crate::api::handlers;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;

/// Creates the API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Statistics
        .route("/api/v1/stats", get(handlers::get_stats))
        // Accounts
        .route("/api/v1/accounts", get(handlers::list_accounts))
        // Sync
        .route(
            "/api/v1/accounts/{account}/sync",
            post(handlers::sync_account),
        )
        // Wheel summary
        .route(
            "/api/v1/accounts/{account}/wheels",
            get(handlers::get_wheel_summary),
        )
        // Execution history
        .route(
            "/api/v1/accounts/{account}/history",
            get(handlers::get_history),
        )
        // Analytics
        .route(
            "/api/v1/accounts/{account}/analytics",
            get(handlers::get_analytics),
        )
        .with_state(state)
}
