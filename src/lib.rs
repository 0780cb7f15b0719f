pub mod api;
pub mod error;
pub mod event;
pub mod history;
pub mod logging;
pub mod trigger;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::error::{RelayError, Result};
use crate::history::HistoryStore;
use crate::trigger::TriggerClient;

const DEFAULT_TRIGGER_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RelayConfig {
    /// `owner/name` of the repository whose own branches can be fetched directly
    #[serde(default)]
    pub upstream_repository: String,
    #[serde(default)]
    pub tracked_branches: Vec<String>,
    pub include_commit_sha: Option<bool>,
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub trigger: TriggerConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TriggerConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub repository_name: String,
    pub authorization: Option<String>,
    pub timeout_secs: Option<u64>,
    pub fail_on_delivery_error: Option<bool>,
}

impl TriggerConfig {
    /// Full URL of the CI incoming-webhook endpoint.
    pub fn trigger_url(&self) -> String {
        let base = if self.base_url.ends_with('/') {
            self.base_url.clone()
        } else {
            format!("{}/", self.base_url)
        };
        format!("{}{}?api-version={}", base, self.name, self.api_version)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TRIGGER_TIMEOUT_SECS))
    }

    /// Returns true if a failed trigger call should fail the webhook request.
    pub fn fail_on_delivery_error(&self) -> bool {
        self.fail_on_delivery_error.unwrap_or(false)
    }

    /// Returns the configured credential, ignoring blank values.
    pub fn authorization(&self) -> Option<&str> {
        self.authorization
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl RelayConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Overlays `RELAY_*` variables on top of the file values.
    /// `lookup` is `std::env::var` in production.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RELAY_UPSTREAM_REPOSITORY") {
            self.upstream_repository = v;
        }
        if let Some(v) = lookup("RELAY_TRACKED_BRANCHES") {
            self.tracked_branches = v
                .split(',')
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("RELAY_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("RELAY_TRIGGER_BASE_URL") {
            self.trigger.base_url = v;
        }
        if let Some(v) = lookup("RELAY_TRIGGER_NAME") {
            self.trigger.name = v;
        }
        if let Some(v) = lookup("RELAY_TRIGGER_API_VERSION") {
            self.trigger.api_version = v;
        }
        if let Some(v) = lookup("RELAY_TRIGGER_REPOSITORY_NAME") {
            self.trigger.repository_name = v;
        }
        if let Some(v) = lookup("RELAY_TRIGGER_AUTHORIZATION") {
            self.trigger.authorization = Some(v);
        }
        if let Some(v) = lookup("RELAY_TRIGGER_TIMEOUT_SECS") {
            let secs = v.trim().parse::<u64>().map_err(|e| {
                RelayError::ConfigError(format!(
                    "RELAY_TRIGGER_TIMEOUT_SECS must be a whole number of seconds, got '{}': {}",
                    v, e
                ))
            })?;
            self.trigger.timeout_secs = Some(secs);
        }
        if let Some(v) = lookup("RELAY_TRIGGER_FAIL_ON_DELIVERY_ERROR") {
            self.trigger.fail_on_delivery_error =
                Some(parse_bool("RELAY_TRIGGER_FAIL_ON_DELIVERY_ERROR", &v)?);
        }
        if let Some(v) = lookup("RELAY_INCLUDE_COMMIT_SHA") {
            self.include_commit_sha = Some(parse_bool("RELAY_INCLUDE_COMMIT_SHA", &v)?);
        }
        Ok(())
    }

    /// Checks that every required value is present.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("upstream_repository", &self.upstream_repository),
            ("trigger.base_url", &self.trigger.base_url),
            ("trigger.name", &self.trigger.name),
            ("trigger.api_version", &self.trigger.api_version),
            ("trigger.repository_name", &self.trigger.repository_name),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(RelayError::ConfigError(format!(
                    "missing required setting '{}'",
                    key
                )));
            }
        }
        if self.tracked_branches.is_empty() {
            return Err(RelayError::ConfigError(
                "tracked_branches must name at least one branch".to_string(),
            ));
        }
        if self.trigger.timeout_secs == Some(0) {
            return Err(RelayError::ConfigError(
                "trigger.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_tracked_branch(&self, branch: &str) -> bool {
        self.tracked_branches.iter().any(|b| b == branch)
    }

    pub fn include_commit_sha(&self) -> bool {
        self.include_commit_sha.unwrap_or(true)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(RelayError::ConfigError(format!(
            "{} must be true or false, got '{}'",
            key, value
        ))),
    }
}

/// Load the configuration file (if any), apply env overrides and validate.
///
/// When `must_exist` is false a missing file is treated as empty, so the
/// whole configuration can come from the environment.
pub fn load_config(path: &Path, must_exist: bool) -> Result<RelayConfig> {
    let mut config = if path.exists() {
        let config_str = std::fs::read_to_string(path).map_err(|e| {
            RelayError::ConfigError(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        RelayConfig::from_toml_str(&config_str).map_err(|e| {
            RelayError::ConfigError(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?
    } else if must_exist {
        return Err(RelayError::ConfigError(format!(
            "Config file '{}' does not exist",
            path.display()
        )));
    } else {
        RelayConfig::default()
    };

    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

pub struct AppState {
    pub config: RelayConfig,
    pub history: HistoryStore,
    pub trigger_client: TriggerClient,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Result<Self> {
        let trigger_client = TriggerClient::new(&config.trigger)?;
        if config.trigger.authorization().is_none() {
            warn!("No trigger authorization configured; trigger calls will be unauthenticated");
        }
        info!(
            "Tracking branches {:?} of '{}'",
            config.tracked_branches, config.upstream_repository
        );

        Ok(Self {
            config,
            history: HistoryStore::new(),
            trigger_client,
            start_time: Instant::now(),
            started_at: Utc::now(),
        })
    }
}

pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
upstream_repository = "pytorch/pytorch"
tracked_branches = ["master"]

[trigger]
base_url = "https://dev.azure.com/aiinfra/_apis/public/distributedtask/webhooks"
name = "GitHubPyTorchPRTrigger"
api_version = "6.0-preview"
repository_name = "pytorch_tests"
"#;

    #[test]
    fn parses_file_and_builds_trigger_url() {
        let config = RelayConfig::from_toml_str(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.trigger.trigger_url(),
            "https://dev.azure.com/aiinfra/_apis/public/distributedtask/webhooks/GitHubPyTorchPRTrigger?api-version=6.0-preview"
        );
        assert!(config.is_tracked_branch("master"));
        assert!(!config.is_tracked_branch("main"));
        assert!(config.include_commit_sha());
        assert!(!config.trigger.fail_on_delivery_error());
        assert_eq!(config.trigger.timeout(), Duration::from_secs(10));
        assert_eq!(config.trigger.authorization(), None);
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = RelayConfig::from_toml_str(SAMPLE).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("RELAY_TRACKED_BRANCHES", "main, release/2.1 ,"),
            ("RELAY_TRIGGER_TIMEOUT_SECS", "3"),
            ("RELAY_TRIGGER_AUTHORIZATION", "Basic abc"),
        ]);
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.tracked_branches, vec!["main", "release/2.1"]);
        assert_eq!(config.trigger.timeout(), Duration::from_secs(3));
        assert_eq!(config.trigger.authorization(), Some("Basic abc"));
        assert_eq!(config.upstream_repository, "pytorch/pytorch");
    }

    #[test]
    fn env_alone_is_enough() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("RELAY_UPSTREAM_REPOSITORY", "acme/widgets"),
            ("RELAY_TRACKED_BRANCHES", "main"),
            ("RELAY_TRIGGER_BASE_URL", "http://ci.local/hooks/"),
            ("RELAY_TRIGGER_NAME", "widgets"),
            ("RELAY_TRIGGER_API_VERSION", "7.1"),
            ("RELAY_TRIGGER_REPOSITORY_NAME", "widgets_tests"),
        ]);
        let mut config = RelayConfig::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.trigger.trigger_url(),
            "http://ci.local/hooks/widgets?api-version=7.1"
        );
    }

    #[test]
    fn env_overrides_boolean_switches() {
        let mut config = RelayConfig::from_toml_str(SAMPLE).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("RELAY_TRIGGER_FAIL_ON_DELIVERY_ERROR", "TRUE"),
            ("RELAY_INCLUDE_COMMIT_SHA", "0"),
        ]);
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert!(config.trigger.fail_on_delivery_error());
        assert!(!config.include_commit_sha());

        let err = config
            .apply_env_overrides(|k| (k == "RELAY_INCLUDE_COMMIT_SHA").then(|| "maybe".into()))
            .unwrap_err();
        assert!(err.to_string().contains("RELAY_INCLUDE_COMMIT_SHA"));
    }

    #[test]
    fn bad_timeout_is_a_config_error() {
        let mut config = RelayConfig::default();
        let err = config
            .apply_env_overrides(|k| (k == "RELAY_TRIGGER_TIMEOUT_SECS").then(|| "soon".into()))
            .unwrap_err();
        assert!(matches!(err, RelayError::ConfigError(_)));
    }

    #[test]
    fn missing_required_values_fail_validation() {
        let err = RelayConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("upstream_repository"));

        let mut config = RelayConfig::from_toml_str(SAMPLE).unwrap();
        config.tracked_branches.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tracked_branches"));
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let path = Path::new("/nonexistent/relay_config.toml");
        let err = load_config(path, true).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
