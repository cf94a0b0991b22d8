//! Embedded axum HTTP server for the RPC routes.

use crate::error::AppError;
use crate::services::api::{api_routes, ApiState};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the full router with request tracing and CORS.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .merge(api_routes().with_state(state))
        .fallback(|| async { StatusCode::NOT_FOUND.into_response() })
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Bind `addr` and serve until `cancel_token` is cancelled.
///
/// In-flight requests are allowed to finish before this returns.
pub async fn serve(
    addr: &str,
    state: ApiState,
    cancel_token: CancellationToken,
) -> Result<(), AppError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind to {}: {}", addr, e)))?;
    serve_on(listener, state, cancel_token).await
}

/// Serve on an already bound listener.
pub async fn serve_on(
    listener: TcpListener,
    state: ApiState,
    cancel_token: CancellationToken,
) -> Result<(), AppError> {
    let local_addr = listener
        .local_addr()
        .map_err(|e| AppError::internal(format!("Failed to read listener address: {}", e)))?;
    log::info!("[server] Listening on http://{}", local_addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
        })
        .await
        .map_err(|e| AppError::internal(format!("Server error: {}", e)))?;

    log::info!("[server] Server stopped");
    Ok(())
}
