//! Axum HTTP/WebSocket server.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::connection::handle_relay_connection;
use crate::feeds;
use crate::session::RelayFlavor;
use crate::state::GatewayState;

/// Build the gateway router.
pub fn router(state: Arc<GatewayState>) -> Router {
    let cors = state.config.gateway().cors;

    let mut app = Router::new()
        .route("/", get(feeds::index_handler))
        .route("/stream", get(feeds::stream_handler))
        .route("/stream-fast", get(feeds::stream_fast_handler))
        .route("/screenshot", get(feeds::screenshot_handler))
        .route("/ws/chat", get(chat_ws_handler))
        .route("/ws/markdown_agent", get(markdown_ws_handler))
        .route("/models", get(models_handler))
        .route("/health", get(health_handler));

    #[cfg(feature = "metrics")]
    {
        app = app.route("/metrics", get(metrics_handler));
    }

    app = app.layer(TraceLayer::new_for_http());
    if cors {
        app = app.layer(CorsLayer::very_permissive());
    }
    app.with_state(state)
}

/// Start the gateway and serve until Ctrl-C.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = state
        .config
        .gateway()
        .bind
        .unwrap_or_else(|| "0.0.0.0".to_string());

    let addr = format!("{bind_addr}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr}");

    serve(state, listener, ctrl_c()).await
}

/// Serve on `listener` until `shutdown` resolves.
///
/// The shared surface is closed as soon as the signal fires, before the
/// drain: open feeds never finish on their own, and a closed surface is
/// what ends them.
pub async fn serve<F>(state: Arc<GatewayState>, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state.clone());
    let draining = state.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            draining.registry.shutdown().await;
        })
        .await;

    // Covers a serve error before the signal; a no-op after it.
    state.registry.shutdown().await;
    result?;
    Ok(())
}

async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_relay_connection(state, socket, RelayFlavor::Chat))
}

async fn markdown_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_relay_connection(state, socket, RelayFlavor::Markdown))
}

async fn models_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    axum::Json(state.roster.clone())
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let surface = state.surface();

    axum::Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.uptime_secs(),
        "sessions": state.registry.active().await,
        "clients": state.registry.list().await,
        "surface": surface.state().as_str(),
        "surface_launches": surface.launches(),
        "capture_faults": surface.faults(),
    }))
}

#[cfg(feature = "metrics")]
async fn metrics_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    use axum::http::{StatusCode, header};

    let surface = state.surface();
    crate::metrics::record_surface(surface.launches(), surface.faults());

    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(%e, "Failed to listen for Ctrl-C; shutting down");
        return;
    }
    info!("Shutdown signal received");
}
