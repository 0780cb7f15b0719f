//! Trigger history endpoints

use axum::{
    Json,
    extract::{Path, State as AxumState},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde_json::json;

use crate::SharedState;

/// GET /pulls - Submitted builds, oldest first
pub async fn get_pulls(AxumState(state): AxumState<SharedState>) -> impl IntoResponse {
    let entries = state.history.entries().await;
    Json(json!({
        "pulls": entries,
        "count": entries.len()
    }))
}

/// GET /jsons/{pr_number} - Last webhook body that triggered a build for a PR
pub async fn get_pull_payload(
    AxumState(state): AxumState<SharedState>,
    Path(pr_number): Path<String>,
) -> impl IntoResponse {
    let Ok(pr_number) = pr_number.parse::<u64>() else {
        return (
            StatusCode::BAD_REQUEST,
            format!("'{}' is not a valid PR number", pr_number),
        )
            .into_response();
    };

    match state.history.payload_for(pr_number).await {
        Some(raw) => ([(header::CONTENT_TYPE, "application/json")], raw).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            format!("No triggered build recorded for PR #{}", pr_number),
        )
            .into_response(),
    }
}
