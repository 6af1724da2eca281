//! Wheel Tracker Backend Server
//!
//! REST API server for tracking wheel options-trading cycles.

use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use wheel_tracker_backend::api::create_router;
use wheel_tracker_backend::config::Config;
use wheel_tracker_backend::db::{DatabasePool, ExecutionStore};
use wheel_tracker_backend::state::AppState;

use wheel_tracker_backend::models::{
    AccountsListResponse, AnalyticsResponse, CategorizedTradeResponse, CloseReasonsResponse,
    HealthResponse, HistoryEntryResponse, HoldingResponse, Money, MonthlyBucketResponse,
    StatsResponse, SymbolRollupResponse, SyncResponse, WheelSummaryResponse, WheelTradeResponse,
};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    paths(
        wheel_tracker_backend::api::handlers::health_check,
        wheel_tracker_backend::api::handlers::get_stats,
        wheel_tracker_backend::api::handlers::list_accounts,
        wheel_tracker_backend::api::handlers::sync_account,
        wheel_tracker_backend::api::handlers::get_wheel_summary,
        wheel_tracker_backend::api::handlers::get_history,
        wheel_tracker_backend::api::handlers::get_analytics,
    ),
    components(
        schemas(
            HealthResponse,
            StatsResponse,
            AccountsListResponse,
            SyncResponse,
            CategorizedTradeResponse,
            WheelSummaryResponse,
            HoldingResponse,
            WheelTradeResponse,
            HistoryEntryResponse,
            AnalyticsResponse,
            MonthlyBucketResponse,
            SymbolRollupResponse,
            CloseReasonsResponse,
            Money,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Statistics", description = "Engine statistics"),
        (name = "Accounts", description = "Account listing"),
        (name = "Sync", description = "Execution ingestion"),
        (name = "Wheels", description = "Wheel cycle summaries"),
        (name = "History", description = "Execution history"),
        (name = "Analytics", description = "Aggregate analytics"),
    ),
    info(
        title = "Wheel Tracker API",
        version = "0.2.0",
        description = "REST API for tracking wheel options-trading cycles",
        license(name = "MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match std::env::var("CONFIG_PATH") {
        Ok(path) => Config::load(&path)?,
        Err(_) => {
            warn!("CONFIG_PATH not set, using default configuration");
            Config::default()
        }
    };

    // Optional database
    let db = match std::env::var("DATABASE_URL") {
        Ok(url) => Some(DatabasePool::new(&url).await?),
        Err(_) => None,
    };

    // Create application state
    let state = Arc::new(AppState::from_config(config, db));

    // Restore wheel state from the persisted execution log
    if let Some(db) = &state.db {
        let store = ExecutionStore::new(db.clone());
        store.ensure_schema().await?;
        for account in store.accounts().await? {
            let executions = store.load(&account).await?;
            state.engine.restore(&account, executions);
        }
    }

    // Get host and port from environment or configuration
    let (default_host, default_port) = state
        .config
        .as_ref()
        .map(|c| (c.server.host.clone(), c.server.port))
        .unwrap_or_else(|| ("0.0.0.0".to_string(), 8080));
    let host = std::env::var("HOST").unwrap_or(default_host);
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(default_port);

    info!("Starting Wheel Tracker Backend on {}:{}", host, port);
    info!("Swagger UI available at http://{}:{}/swagger-ui/", host, port);

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let app = create_router(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start the server
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
