//! HTTP exposition surface: health/readiness, Prometheus metrics, and the
//! risk-decision/signal-processing endpoints, built the way the teacher
//! wires up `axum::Router` + `tower_http::trace` + its own rate-limit and
//! request-logging middleware in `main.rs`.

pub mod metrics;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use axum::{middleware, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::Core;
use crate::middleware::logging::request_logging;
use crate::middleware::rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimitLayer};

#[derive(Clone)]
pub struct AppHttpState {
    pub core: Arc<Core>,
    pub rate_limiter: RateLimitLayer,
}

impl FromRef<AppHttpState> for RateLimitLayer {
    fn from_ref(state: &AppHttpState) -> Self {
        state.rate_limiter.clone()
    }
}

pub fn build_router(core: Arc<Core>) -> Router {
    let state = AppHttpState {
        core,
        rate_limiter: RateLimitLayer::new(RateLimitConfig::default()),
    };

    Router::new()
        .merge(routes::router())
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Background task that periodically prunes rate-limit entries, mirroring
/// the teacher's `RateLimitLayer::cleanup` usage pattern.
pub async fn spawn_rate_limit_cleanup(limiter: RateLimitLayer) {
    let mut interval = tokio::time::interval(Duration::from_secs(120));
    loop {
        interval.tick().await;
        limiter.cleanup();
    }
}

pub async fn serve(core: Arc<Core>, bind: &str) -> std::io::Result<()> {
    let addr: SocketAddr = bind.parse().expect("invalid HTTP bind address");
    let app = build_router(core).into_make_service_with_connect_info::<SocketAddr>();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "risk-core HTTP server listening");
    axum::serve(listener, app).await
}
