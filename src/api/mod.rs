//! API module for all HTTP handlers
//!
//! The webhook receiver plus the read-only history endpoints

pub mod handlers;
pub mod history;
pub mod webhook;

use axum::{Router, routing};

use crate::SharedState;

// Re-export handlers
pub use handlers::root;
pub use history::{get_pull_payload, get_pulls};
pub use webhook::handle_webhook;

/// Build the relay's router. `/prwebhook` is kept as an alias of `/webhook`.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/", routing::get(root))
        .route("/webhook", routing::post(handle_webhook))
        .route("/prwebhook", routing::post(handle_webhook))
        .route("/pulls", routing::get(get_pulls))
        .route("/jsons/{pr_number}", routing::get(get_pull_payload))
        .with_state(state)
}
