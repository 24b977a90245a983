//! HTTP gateway
//!
//! Thin axum layer over the transfer engine and the ingestion channel.

pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use state::AppState;

/// Build the complete router for `state`
pub fn router(state: AppState) -> Router {
    let state = Arc::new(state);

    let api_routes = Router::new()
        .route("/transactions", post(handlers::create_transaction))
        .route("/transactions/async", post(handlers::queue_transaction))
        .route(
            "/transactions/{account_id}",
            get(handlers::get_transaction_history),
        )
        .route("/accounts/{account_id}", get(handlers::get_account))
        .route("/health", get(handlers::health_check));

    Router::new()
        .nest("/api/v1", api_routes)
        .with_state(state)
        // OpenAPI / Swagger UI (stateless, added after with_state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Serve the gateway until `shutdown` resolves
pub async fn run_server<F>(addr: SocketAddr, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        tracing::error!(%addr, error = %e, "Failed to bind gateway listener");
        e
    })?;

    tracing::info!("🚀 Gateway listening on http://{}", addr);
    tracing::info!("📖 API Docs: http://{}/docs", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
