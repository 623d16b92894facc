//! Diagnostics HTTP endpoints using Axum

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use crate::channels::{ChannelRouter, RouteOutcome};
use crate::core::runtime::{EngineState, MonitorEngine};
use crate::metrics::Metrics;
use crate::models::channel::ChannelMessage;

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<Metrics>,
    pub start_time: Arc<Instant>,
    pub engine: Arc<MonitorEngine>,
    pub channels: Arc<ChannelRouter>,
}

impl AppState {
    pub fn new(metrics: Arc<Metrics>, engine: Arc<MonitorEngine>, channels: Arc<ChannelRouter>) -> Self {
        Self {
            metrics,
            start_time: Arc::new(Instant::now()),
            engine,
            channels,
        }
    }
}

/// Healthy only while the engine is running its watchers
pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let engine_state = state.engine.state();
    let status = match engine_state {
        EngineState::Running => "healthy",
        EngineState::Idle | EngineState::Stopped => "degraded",
    };
    let uptime_seconds = state.start_time.elapsed().as_secs();
    Ok(Json(json!({
        "status": status,
        "engine": engine_state.as_str(),
        "uptime_seconds": uptime_seconds,
        "service": "voltwatch"
    })))
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .export()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Middleware to track HTTP request metrics
async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Increment in-flight requests
    state.metrics.http_requests_in_flight.inc();

    // Process request
    let response = next.run(request).await;
    let status = response.status();
    let duration = start.elapsed();

    // Decrement in-flight requests
    state.metrics.http_requests_in_flight.dec();

    // Record metrics
    state.metrics.http_requests_total.inc();
    state
        .metrics
        .http_request_duration_seconds
        .observe(duration.as_secs_f64());

    // Log if error status
    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = duration.as_millis(),
            "HTTP request error"
        );
    }

    response
}

/// Strategies of the configuration the engine is running with
async fn list_strategies(State(state): State<AppState>) -> Json<Value> {
    let config = state.engine.config();
    Json(json!({
        "strategy_count": config.strategy_count(),
        "instruments": config.instruments,
    }))
}

/// Rolling price history for one instrument
async fn get_history(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let ledger = state.engine.ledger();
    let points = ledger.snapshot(&symbol).await.ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!({
        "symbol": symbol,
        "retention_hours": ledger.retention().num_hours(),
        "count": points.len(),
        "points": points,
    })))
}

async fn ingest_channel_message(
    State(state): State<AppState>,
    Json(message): Json<ChannelMessage>,
) -> Json<RouteOutcome> {
    Json(state.channels.handle(&message).await)
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/strategies", get(list_strategies))
        .route("/api/history/{symbol}", get(get_history))
        .route("/api/channel-messages", post(ingest_channel_message))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Serve the diagnostics API until `shutdown` resolves.
pub async fn start_server<F>(port: u16, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!(port = port, "HTTP server listening on port {}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
