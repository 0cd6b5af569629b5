use axum::{
    Router,
    routing::{get, post},
};
use configuration::Settings;
use database::DbRepository;
use executor::OrderEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod error;
pub mod handlers;

/// The shared application state that all handlers can access.
#[derive(Clone)]
pub struct AppState {
    pub engine: OrderEngine,
}

/// Builds the application router. Binds nothing, so tests can drive it
/// in-process.
pub fn router(engine: OrderEngine) -> Router {
    let app_state = Arc::new(AppState { engine });
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/accounts", post(handlers::create_account))
        .route("/api/accounts/:account_id", get(handlers::get_account))
        .route("/api/accounts/:account_id/balance", get(handlers::get_balance))
        .route("/api/accounts/:account_id/positions", get(handlers::get_positions))
        .route("/api/accounts/:account_id/orders", get(handlers::get_orders))
        .route("/api/accounts/:account_id/trades", get(handlers::get_trades))
        .route("/api/accounts/:account_id/ledger", get(handlers::get_ledger))
        .route("/api/accounts/:account_id/metrics", get(handlers::get_metrics))
        .route("/api/orders", post(handlers::create_order))
        .route("/api/orders/:order_id", get(handlers::get_order))
        .route("/api/orders/:order_id/execute", post(handlers::execute_order))
        .route("/api/orders/:order_id/ledger", get(handlers::get_order_ledger))
        .route("/api/prices", post(handlers::add_price))
        .route("/api/prices/:symbol", get(handlers::get_price_history))
        .with_state(app_state)
        .layer(cors)
        // Logs every incoming request.
        .layer(TraceLayer::new_for_http())
}

/// Serves `engine` on `addr` until the process is stopped.
pub async fn run_server(addr: SocketAddr, engine: OrderEngine) -> anyhow::Result<()> {
    let app = router(engine);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Web server started and listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Connects to PostgreSQL per `settings`, applies migrations and serves.
pub async fn serve_postgres(settings: &Settings) -> anyhow::Result<()> {
    let pool = database::connect(
        settings.database.require_url()?,
        settings.database.max_connections,
        settings.database.acquire_timeout(),
    )
    .await?;
    database::run_migrations(&pool).await?;

    let engine = OrderEngine::new(Arc::new(DbRepository::new(pool)));
    run_server(settings.server.socket_addr()?, engine).await
}
