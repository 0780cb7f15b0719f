//! Webhook handler for GitHub pull request events

use axum::{
    body::Bytes,
    extract::State as AxumState,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, info, warn};

use crate::SharedState;
use crate::event::{self, Evaluation, IgnoreReason, PullRequestEvent, Rejection};
use crate::history::TriggerHistoryEntry;
use crate::trigger::TriggerRequest;

/// Result of handling one webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Processed {
        pr_number: u64,
        target_ref: String,
        commit_sha: Option<String>,
        /// Trigger failure that was tolerated
        delivery_error: Option<String>,
    },
    Ignored(IgnoreReason),
    Rejected(Rejection),
    DeliveryFailed {
        pr_number: u64,
        error: String,
    },
}

impl Outcome {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Outcome::Processed { .. } | Outcome::Ignored(_) => StatusCode::OK,
            Outcome::Rejected(_) => StatusCode::BAD_REQUEST,
            Outcome::DeliveryFailed { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Outcome::Processed {
                pr_number,
                target_ref,
                commit_sha,
                delivery_error,
            } => {
                let mut msg = format!("Build submitted for PR #{} (target: {}", pr_number, target_ref);
                if let Some(sha) = commit_sha {
                    msg.push_str(&format!(", commit: {}", event::short_sha(sha)));
                }
                msg.push(')');
                if let Some(e) = delivery_error {
                    msg.push_str(&format!("; warning: CI trigger was not delivered ({})", e));
                }
                msg
            }
            Outcome::Ignored(reason) => reason.to_string(),
            Outcome::Rejected(reason) => reason.to_string(),
            Outcome::DeliveryFailed { pr_number, error } => {
                format!("Failed to submit build for PR #{}: {}", pr_number, error)
            }
        }
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        (self.status_code(), self.message()).into_response()
    }
}

/// Handles the GitHub pull request webhook POST request.
pub async fn handle_webhook(AxumState(state): AxumState<SharedState>, body: Bytes) -> Outcome {
    let outcome = process_webhook(&state, &body).await;
    match &outcome {
        Outcome::Processed { .. } => info!("{}", outcome.message()),
        Outcome::Ignored(reason) => info!("Webhook ignored: {}", reason),
        Outcome::Rejected(reason) => warn!("Webhook rejected: {}", reason),
        Outcome::DeliveryFailed { .. } => error!("{}", outcome.message()),
    }
    outcome
}

async fn process_webhook(state: &SharedState, body: &[u8]) -> Outcome {
    let payload = match event::parse_body(body) {
        Ok(v) => v,
        Err(rejection) => return Outcome::Rejected(rejection),
    };

    let pr = match event::evaluate(&payload, &state.config) {
        Ok(Evaluation::Accepted(pr)) => pr,
        Ok(Evaluation::Ignored(reason)) => return Outcome::Ignored(reason),
        Err(rejection) => return Outcome::Rejected(rejection),
    };
    debug!("Accepted {} event for PR #{}", pr.action, pr.number);

    let request = build_trigger_request(state, &pr);
    let delivery_error = match state.trigger_client.send(&request).await {
        Ok(receipt) => {
            debug!("CI endpoint answered {} for PR #{}", receipt.status, pr.number);
            None
        }
        Err(e) => {
            error!("Trigger delivery for PR #{} failed: {}", pr.number, e);
            if state.config.trigger.fail_on_delivery_error() {
                return Outcome::DeliveryFailed {
                    pr_number: pr.number,
                    error: e.to_string(),
                };
            }
            Some(e.to_string())
        }
    };

    let entry = TriggerHistoryEntry::new(
        pr.number,
        pr.base_ref.clone(),
        request.target_ref.clone(),
        pr.head_sha.clone(),
    )
    .with_delivery_error(delivery_error.clone());
    state
        .history
        .record(entry, String::from_utf8_lossy(body).into_owned())
        .await;

    Outcome::Processed {
        pr_number: pr.number,
        target_ref: request.target_ref,
        commit_sha: pr.head_sha,
        delivery_error,
    }
}

fn build_trigger_request(state: &SharedState, pr: &PullRequestEvent) -> TriggerRequest {
    TriggerRequest {
        repository_name: state.config.trigger.repository_name.clone(),
        pr_number: pr.number,
        commit_sha: if state.config.include_commit_sha() {
            pr.head_sha.clone()
        } else {
            None
        },
        target_ref: pr.target_ref(&state.config.upstream_repository),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_a_function_of_the_outcome() {
        assert_eq!(
            Outcome::Ignored(IgnoreReason::ConnectivityProbe).status_code(),
            StatusCode::OK
        );
        assert_eq!(
            Outcome::Rejected(Rejection::MissingPRNumber).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Outcome::DeliveryFailed {
                pr_number: 1,
                error: "timeout".into()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn processed_message_echoes_pr_target_and_short_sha() {
        let outcome = Outcome::Processed {
            pr_number: 10,
            target_ref: "feature-x".into(),
            commit_sha: Some("abcdef0123456789".into()),
            delivery_error: None,
        };
        assert_eq!(outcome.status_code(), StatusCode::OK);
        assert_eq!(
            outcome.message(),
            "Build submitted for PR #10 (target: feature-x, commit: abcdef0)"
        );
    }

    #[test]
    fn tolerated_delivery_error_is_reported() {
        let outcome = Outcome::Processed {
            pr_number: 10,
            target_ref: "refs/pull/10/head".into(),
            commit_sha: None,
            delivery_error: Some("connection refused".into()),
        };
        assert_eq!(
            outcome.message(),
            "Build submitted for PR #10 (target: refs/pull/10/head); warning: CI trigger was not delivered (connection refused)"
        );
    }
}
