//! Per-node timeout, retry and error-handling policy

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::workflow::WorkflowError;

/// Upper bound on `maxRetries` accepted in a document
pub const MAX_RETRIES: u32 = 100;

/// Upper bound on an attempt timeout, in seconds (one day)
pub const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// What happens once a node has exhausted its attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Abort the whole run
    #[default]
    Interrupted,
    /// Succeed with the configured custom output
    CustomReturn,
    /// Fail, but route downstream through the failure edges
    FailBranch,
}

/// Retry configuration for a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Timeout in seconds for a single attempt
    pub timeout: f64,
    pub should_retry: bool,
    pub max_retries: u32,
    pub error_strategy: ErrorStrategy,
    pub custom_output: Map<String, Value>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout: 60.0,
            should_retry: false,
            max_retries: 0,
            error_strategy: ErrorStrategy::default(),
            custom_output: Map::new(),
        }
    }
}

impl RetryConfig {
    /// Enables retrying up to `max_retries` additional attempts
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.should_retry = true;
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.as_secs_f64();
        self
    }

    pub fn with_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.error_strategy = strategy;
        self
    }

    pub fn with_custom_output(mut self, output: Map<String, Value>) -> Self {
        self.custom_output = output;
        self
    }

    /// Total number of attempts, including the first one
    pub fn max_attempts(&self) -> u32 {
        if self.should_retry {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    /// Attempt timeout, `None` when the configured value is not positive
    pub fn timeout_duration(&self) -> Option<Duration> {
        if self.timeout.is_finite() && self.timeout > 0.0 {
            Duration::try_from_secs_f64(self.timeout).ok()
        } else {
            None
        }
    }

    /// Rejects retry counts and timeouts outside the supported range
    pub fn validate(&self, node_id: &str) -> Result<(), WorkflowError> {
        if self.max_retries > MAX_RETRIES {
            return Err(WorkflowError::validation(format!(
                "Node '{}' asks for {} retries, the limit is {}",
                node_id, self.max_retries, MAX_RETRIES
            )));
        }

        if self.timeout.is_nan() || self.timeout > MAX_TIMEOUT_SECS {
            return Err(WorkflowError::validation(format!(
                "Node '{}' has an out-of-range timeout of {}s",
                node_id, self.timeout
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config: RetryConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, RetryConfig::default());
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.timeout_duration(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_max_attempts() {
        let config = RetryConfig::default().with_retries(2);
        assert_eq!(config.max_attempts(), 3);

        let mut disabled = config.clone();
        disabled.should_retry = false;
        assert_eq!(disabled.max_attempts(), 1);
    }

    #[test]
    fn test_strategy_wire_names() {
        let config: RetryConfig = serde_json::from_value(json!({
            "errorStrategy": "fail_branch",
            "customOutput": {"answer": "n/a"}
        }))
        .unwrap();

        assert_eq!(config.error_strategy, ErrorStrategy::FailBranch);
        assert_eq!(config.custom_output.get("answer"), Some(&json!("n/a")));
    }

    #[test]
    fn test_non_positive_timeout() {
        let config = RetryConfig {
            timeout: 0.0,
            ..Default::default()
        };
        assert!(config.timeout_duration().is_none());
    }

    #[test]
    fn test_extreme_values_do_not_panic() {
        let config: RetryConfig = serde_json::from_value(json!({
            "shouldRetry": true,
            "maxRetries": 4294967295u32,
            "timeout": 1e20
        }))
        .unwrap();

        assert_eq!(config.max_attempts(), u32::MAX);
        assert!(config.timeout_duration().is_none());
    }

    #[test]
    fn test_validate_limits() {
        assert!(RetryConfig::default().validate("llm::1").is_ok());
        assert!(RetryConfig::default().with_retries(MAX_RETRIES).validate("llm::1").is_ok());

        let err = RetryConfig::default()
            .with_retries(u32::MAX)
            .validate("llm::1")
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let huge = RetryConfig {
            timeout: 1e20,
            ..Default::default()
        };
        assert!(huge.validate("llm::1").unwrap_err().to_string().contains("timeout"));
    }
}
