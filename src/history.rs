use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A build that was submitted to CI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerHistoryEntry {
    pub id: String,
    pub submitted_at: DateTime<Utc>,
    pub pr_number: u64,
    pub base_branch: String,
    pub target_ref: String,
    pub commit_sha: Option<String>,
    /// Set when the trigger call failed but the relay still answered 200
    pub delivery_error: Option<String>,
}

impl TriggerHistoryEntry {
    pub fn new(
        pr_number: u64,
        base_branch: String,
        target_ref: String,
        commit_sha: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            submitted_at: Utc::now(),
            pr_number,
            base_branch,
            target_ref,
            commit_sha,
            delivery_error: None,
        }
    }

    pub fn with_delivery_error(mut self, error: Option<String>) -> Self {
        self.delivery_error = error;
        self
    }
}

#[derive(Default)]
struct HistoryInner {
    entries: Vec<TriggerHistoryEntry>,
    /// Last raw webhook body per PR number
    payloads: HashMap<u64, String>,
}

/// In-memory trigger history, cleared on restart.
///
/// The entry list and the payload map share one lock so they are always
/// updated together.
#[derive(Default)]
pub struct HistoryStore {
    inner: Mutex<HistoryInner>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and replace the stored payload for its PR number.
    pub async fn record(&self, entry: TriggerHistoryEntry, raw_payload: String) {
        let mut inner = self.inner.lock().await;
        inner.payloads.insert(entry.pr_number, raw_payload);
        inner.entries.push(entry);
    }

    /// All entries in insertion order.
    pub async fn entries(&self) -> Vec<TriggerHistoryEntry> {
        self.inner.lock().await.entries.clone()
    }

    pub async fn payload_for(&self, pr_number: u64) -> Option<String> {
        self.inner.lock().await.payloads.get(&pr_number).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
