//! Route handlers for health, readiness, metrics, risk decisions, and
//! signal processing.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::metrics;
use super::AppHttpState;
use crate::signals::core_algorithm::FeatureRow;

pub fn router() -> Router<AppHttpState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .route("/risk/decide", post(decide_handler))
        .route("/signals/process", post(process_row_handler))
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz(State(state): State<AppHttpState>) -> impl IntoResponse {
    let _ = state.core.risk_manager.shadow_comparator().parity();
    StatusCode::OK
}

async fn metrics_handler(State(state): State<AppHttpState>) -> impl IntoResponse {
    let body = metrics::render(state.core.risk_manager.shadow_comparator());
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        body,
    )
}

async fn decide_handler(
    State(state): State<AppHttpState>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let map = match payload.as_object() {
        Some(m) => m.clone(),
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "reason_codes": ["invalid_schema"] })),
            )
        }
    };

    let decision = state.core.risk_manager.decide_map(&map);
    metrics::record_decision(decision.passed);
    metrics::record_decision_latency(decision.metrics.check_latency_seconds);

    let status = if decision.passed {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(serde_json::to_value(decision).unwrap_or_default()))
}

async fn process_row_handler(
    State(state): State<AppHttpState>,
    Json(row): Json<FeatureRow>,
) -> impl IntoResponse {
    match state.core.core_algorithm.process_feature_row(&row) {
        Some(signal) => {
            metrics::record_signal(signal.decision_code.as_str(), signal.confirm);
            (StatusCode::OK, Json(serde_json::to_value(signal).unwrap_or_default()))
        }
        None => (StatusCode::OK, Json(json!({ "status": "deduplicated" }))),
    }
}
