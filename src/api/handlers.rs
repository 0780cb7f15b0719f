//! Liveness endpoint

use axum::{Json, extract::Query, extract::State as AxumState, response::IntoResponse};
use serde_json::json;
use std::collections::HashMap;

use crate::SharedState;

/// Root health check endpoint
/// Supports ?format=json for detailed JSON response
pub async fn root(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let format = params.get("format").map(|s| s.as_str());

    if format == Some("json") {
        Json(json!({
            "name": "pr_trigger_relay",
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": state.started_at,
            "uptime_seconds": state.start_time.elapsed().as_secs(),
            "upstream_repository": state.config.upstream_repository,
            "tracked_branches": state.config.tracked_branches,
            "builds_submitted": state.history.len().await,
            "status": "running"
        }))
        .into_response()
    } else {
        "pr_trigger_relay - running".into_response()
    }
}
