//! HTTP gateway (`/api/v1`)

pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod state;
pub mod types;

use axum::{
    Router,
    routing::{get, post, put},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::shutdown::Shutdown;
use state::AppState;

/// Build the gateway router (API routes plus Swagger UI)
pub fn router(state: Arc<AppState>) -> Router {
    let clients = Router::new()
        .route("/", post(handlers::create_client))
        .route("/{id}", get(handlers::get_client))
        .route("/{id}/balance", get(handlers::get_client_balance))
        .route("/{id}/history", get(handlers::get_client_history))
        .route("/{id}/transactions", get(handlers::get_client_transactions))
        .route(
            "/{id}/transactions/{status}",
            get(handlers::get_client_transactions_by_status),
        );

    let transactions = Router::new()
        .route(
            "/",
            post(handlers::submit_transfer).get(handlers::get_transactions_by_status),
        )
        .route("/{id}", get(handlers::get_transaction))
        .route("/{id}/status", put(handlers::update_transaction_status));

    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .nest("/api/v1/clients", clients)
        .nest("/api/v1/transactions", transactions)
        .layer(axum::middleware::from_fn(middleware::log_requests))
        .with_state(state)
        // stateless, added after with_state
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Serve until `shutdown` fires
pub async fn run_server(
    host: &str,
    port: u16,
    state: Arc<AppState>,
    mut shutdown: Shutdown,
) -> std::io::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Gateway listening on http://{}", addr);
    info!("API Docs: http://{}/docs", addr);

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.wait().await })
    .await
}
