//! Outbound CI trigger call

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::TriggerConfig;
use crate::error::{RelayError, Result};

/// JSON body posted to the CI incoming-webhook endpoint.
/// Field names match the parameters the CI pipeline template reads.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TriggerRequest {
    #[serde(rename = "repositoryName")]
    pub repository_name: String,
    #[serde(rename = "PR_NUMBER")]
    pub pr_number: u64,
    #[serde(rename = "PR_HEAD_SHA", skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(rename = "TARGET_BRANCH_TO_CHECK_AZ_DEVOPS_PR")]
    pub target_ref: String,
}

/// Successful delivery of a trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerReceipt {
    pub status: StatusCode,
}

/// Thin wrapper around a shared `reqwest::Client` bound to one trigger URL.
#[derive(Debug, Clone)]
pub struct TriggerClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl TriggerClient {
    pub fn new(config: &TriggerConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(auth) = config.authorization() {
            let mut value = HeaderValue::from_str(auth).map_err(|e| {
                RelayError::ConfigError(format!("Invalid trigger authorization value: {}", e))
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            url: config.trigger_url(),
            timeout: config.timeout(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST the trigger. Transport errors and non-2xx answers are both
    /// reported as `Err`; the caller decides what to do with them.
    pub async fn send(&self, request: &TriggerRequest) -> Result<TriggerReceipt> {
        debug!("POST {} for PR #{}", self.url, request.pr_number);
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.delivery_error(e))?;
        let status = response.status();

        if status.is_success() {
            Ok(TriggerReceipt { status })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RelayError::TriggerDeliveryFailed(format!(
                "CI endpoint answered {}: {}",
                status,
                body.trim()
            )))
        }
    }

    fn delivery_error(&self, e: reqwest::Error) -> RelayError {
        if e.is_timeout() {
            RelayError::TriggerDeliveryFailed(format!(
                "CI endpoint did not answer within {:?}",
                self.timeout
            ))
        } else {
            RelayError::HttpClientError(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trigger_body_uses_pipeline_parameter_names() {
        let request = TriggerRequest {
            repository_name: "pytorch_tests".to_string(),
            pr_number: 4242,
            commit_sha: Some("deadbeef".to_string()),
            target_ref: "refs/pull/4242/head".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "repositoryName": "pytorch_tests",
                "PR_NUMBER": 4242,
                "PR_HEAD_SHA": "deadbeef",
                "TARGET_BRANCH_TO_CHECK_AZ_DEVOPS_PR": "refs/pull/4242/head"
            })
        );
    }

    #[test]
    fn commit_sha_is_omitted_when_unknown() {
        let request = TriggerRequest {
            repository_name: "pytorch_tests".to_string(),
            pr_number: 1,
            commit_sha: None,
            target_ref: "feature-x".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("PR_HEAD_SHA").is_none());
    }

    #[test]
    fn rejects_unencodable_authorization() {
        let config = TriggerConfig {
            base_url: "http://127.0.0.1:1/".to_string(),
            name: "t".to_string(),
            api_version: "6.0".to_string(),
            authorization: Some("Bearer \nabc".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            TriggerClient::new(&config),
            Err(RelayError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let config = TriggerConfig {
            base_url: "http://127.0.0.1:1/".to_string(),
            name: "t".to_string(),
            api_version: "6.0".to_string(),
            timeout_secs: Some(2),
            ..Default::default()
        };
        let client = TriggerClient::new(&config).unwrap();
        assert_eq!(client.url(), "http://127.0.0.1:1/t?api-version=6.0");
        let request = TriggerRequest {
            repository_name: "r".to_string(),
            pr_number: 1,
            commit_sha: None,
            target_ref: "main".to_string(),
        };
        assert!(client.send(&request).await.is_err());
    }
}
