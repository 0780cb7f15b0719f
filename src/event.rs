//! Pull request webhook payload evaluation
//!
//! Turns a raw GitHub `pull_request` webhook body into either a rejection
//! (malformed payload), an ignore decision, or an accepted event that should
//! be forwarded to CI.

use serde_json::Value;
use std::fmt;

use crate::RelayConfig;

/// Actions that (re)build a pull request.
const TRIGGERING_ACTIONS: [&str; 2] = ["opened", "synchronize"];

const SHORT_SHA_LEN: usize = 7;

/// Structural problems with the inbound payload. Surfaced as HTTP 400.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("Request body is not a valid JSON document: {0}")]
    InvalidPayload(String),

    #[error("JSON does not contain pull_request details")]
    MissingPullRequestDetails,

    #[error("JSON does not contain a valid pull_request.number")]
    MissingPRNumber,

    #[error("JSON does not contain pull_request.base details")]
    MissingBaseRef,

    #[error("JSON does not contain pull_request.base.ref")]
    MissingBaseRefField,
}

/// Why a well-formed event was not forwarded. Surfaced as HTTP 200.
#[derive(Debug, Clone, PartialEq)]
pub enum IgnoreReason {
    /// GitHub sends an action-less payload when a webhook is first registered.
    ConnectivityProbe,
    UnhandledAction(String),
    Draft { number: u64 },
    UntrackedBranch { number: u64, branch: String },
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::ConnectivityProbe => write!(
                f,
                "JSON does not contain PR action data. This may be a GitHub connectivity test payload; ignored"
            ),
            IgnoreReason::UnhandledAction(action) => write!(
                f,
                "PR action '{}' is not a newly opened or updated PR; ignored",
                action
            ),
            IgnoreReason::Draft { number } => {
                write!(f, "PR #{} is marked as draft; ignored", number)
            }
            IgnoreReason::UntrackedBranch { number, branch } => write!(
                f,
                "PR #{} targets untracked branch '{}'; ignored",
                number, branch
            ),
        }
    }
}

/// Fields of an accepted pull request event that the relay needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestEvent {
    pub number: u64,
    pub action: String,
    pub base_ref: String,
    pub head_ref: Option<String>,
    pub head_sha: Option<String>,
    pub head_repo_full_name: Option<String>,
}

impl PullRequestEvent {
    /// Reference CI should check out.
    ///
    /// Branches of the upstream repository are fetchable by name; fork
    /// heads are addressed through the `refs/pull/{number}/head` ref.
    pub fn target_ref(&self, upstream_repository: &str) -> String {
        match (&self.head_repo_full_name, &self.head_ref) {
            (Some(repo), Some(head_ref)) if repo == upstream_repository => head_ref.clone(),
            _ => format!("refs/pull/{}/head", self.number),
        }
    }
}

pub fn short_sha(sha: &str) -> &str {
    sha.get(..SHORT_SHA_LEN).unwrap_or(sha)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Accepted(PullRequestEvent),
    Ignored(IgnoreReason),
}

/// Parse the raw request body. `null` counts as an invalid payload.
pub fn parse_body(body: &[u8]) -> Result<Value, Rejection> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Null) => Err(Rejection::InvalidPayload("received JSON is null".to_string())),
        Ok(v) => Ok(v),
        Err(e) => Err(Rejection::InvalidPayload(e.to_string())),
    }
}

/// Validate the payload structure, then apply the action, draft and branch filters.
pub fn evaluate(payload: &Value, config: &RelayConfig) -> Result<Evaluation, Rejection> {
    let pull_request = payload
        .get("pull_request")
        .filter(|pr| pr.is_object())
        .ok_or(Rejection::MissingPullRequestDetails)?;
    let number = pull_request
        .get("number")
        .and_then(Value::as_u64)
        .ok_or(Rejection::MissingPRNumber)?;
    let base = pull_request
        .get("base")
        .filter(|b| b.is_object())
        .ok_or(Rejection::MissingBaseRef)?;
    let base_ref = base
        .get("ref")
        .and_then(Value::as_str)
        .ok_or(Rejection::MissingBaseRefField)?;

    let action = match payload.get("action") {
        None => return Ok(Evaluation::Ignored(IgnoreReason::ConnectivityProbe)),
        Some(Value::String(a)) => a.as_str(),
        Some(other) => {
            return Ok(Evaluation::Ignored(IgnoreReason::UnhandledAction(
                other.to_string(),
            )));
        }
    };

    if !TRIGGERING_ACTIONS.contains(&action) {
        return Ok(Evaluation::Ignored(IgnoreReason::UnhandledAction(
            action.to_string(),
        )));
    }
    if pull_request.get("draft").and_then(Value::as_bool) == Some(true) {
        return Ok(Evaluation::Ignored(IgnoreReason::Draft { number }));
    }
    if !config.is_tracked_branch(base_ref) {
        return Ok(Evaluation::Ignored(IgnoreReason::UntrackedBranch {
            number,
            branch: base_ref.to_string(),
        }));
    }

    let head = pull_request.get("head");
    let head_str = |key: &str| {
        head.and_then(|h| h.get(key))
            .and_then(Value::as_str)
            .map(String::from)
    };

    Ok(Evaluation::Accepted(PullRequestEvent {
        number,
        action: action.to_string(),
        base_ref: base_ref.to_string(),
        head_ref: head_str("ref"),
        head_sha: head_str("sha"),
        head_repo_full_name: head
            .and_then(|h| h.get("repo"))
            .and_then(|r| r.get("full_name"))
            .and_then(Value::as_str)
            .map(String::from),
    }))
}
