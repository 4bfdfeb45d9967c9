use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AuditError;

/// Top-level configuration loaded from `.conclave.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use conclave_core::ConclaveConfig;
///
/// let config = ConclaveConfig::default();
/// assert_eq!(config.engine.max_retries, 3);
/// assert!(config.engine.enable_caching);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConclaveConfig {
    /// Audit engine behavior.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Outbound call rate limiting. Absent means the gate is disabled.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    /// Reviewer reliability weights.
    #[serde(default)]
    pub reviewers: ReviewerConfig,
    /// Model provider connection settings.
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl ConclaveConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] if the file cannot be read, or
    /// [`AuditError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use conclave_core::ConclaveConfig;
    /// use std::path::Path;
    ///
    /// let config = ConclaveConfig::from_file(Path::new(".conclave.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, AuditError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use conclave_core::ConclaveConfig;
    ///
    /// let toml = r#"
    /// [engine]
    /// confidence_threshold = 0.6
    /// "#;
    /// let config = ConclaveConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.engine.confidence_threshold, 0.6);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, AuditError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

/// Audit engine configuration.
///
/// # Examples
///
/// ```
/// use conclave_core::EngineConfig;
///
/// let config = EngineConfig::default();
/// assert_eq!(config.models.len(), 3);
/// assert_eq!(config.confidence_threshold, 0.4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Reviewer model ids to fan out to.
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    /// Escalate retained findings to a human review queue.
    #[serde(default)]
    pub enable_hitl: bool,
    /// Consensus findings below this score are dropped from results
    /// (they remain on the session for the audit trail).
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Attempts per reviewer call, including the first (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff delay in milliseconds; attempt `k` waits
    /// `retry_delay_ms * 2^(k-1)`.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Serve repeated requests from the result cache.
    #[serde(default = "default_enable_caching")]
    pub enable_caching: bool,
    /// Cache entry time-to-live in milliseconds (default: 1h).
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// Fall back to the offline signature scanner when a reviewer's
    /// provider calls are exhausted (default: true).
    #[serde(default = "default_enable_fallback")]
    pub enable_fallback: bool,
    /// Whole-audit time budget in milliseconds (default: 2min).
    #[serde(default = "default_audit_timeout_ms")]
    pub audit_timeout_ms: u64,
}

fn default_models() -> Vec<String> {
    vec![
        "gpt-4o".into(),
        "claude-sonnet-4".into(),
        "deepseek-v3".into(),
    ]
}

fn default_confidence_threshold() -> f64 {
    0.4
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_enable_caching() -> bool {
    true
}

fn default_cache_ttl_ms() -> u64 {
    3_600_000
}

fn default_enable_fallback() -> bool {
    true
}

fn default_audit_timeout_ms() -> u64 {
    120_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            enable_hitl: false,
            confidence_threshold: default_confidence_threshold(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            enable_caching: default_enable_caching(),
            cache_ttl_ms: default_cache_ttl_ms(),
            enable_fallback: default_enable_fallback(),
            audit_timeout_ms: default_audit_timeout_ms(),
        }
    }
}

/// Token-bucket rate limit for outbound reviewer calls.
///
/// # Examples
///
/// ```
/// use conclave_core::RateLimitConfig;
///
/// let limit = RateLimitConfig { requests: 10, window_ms: 60_000 };
/// assert_eq!(limit.requests, 10);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Bucket capacity and refill amount per window.
    pub requests: u32,
    /// Refill window in milliseconds.
    pub window_ms: u64,
}

/// Reviewer reliability weights used by the consensus merger.
///
/// Unknown reviewer ids fall back to `default_weight`; adding a reviewer is
/// a config change, not a code change.
///
/// # Examples
///
/// ```
/// use conclave_core::ReviewerConfig;
///
/// let config = ReviewerConfig::default();
/// assert_eq!(config.default_weight, 0.5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerConfig {
    /// Weight for reviewers without an explicit entry, in `(0, 1]`.
    #[serde(default = "default_reviewer_weight")]
    pub default_weight: f64,
    /// Per-reviewer weights in `(0, 1]`.
    #[serde(default)]
    pub weights: HashMap<String, f64>,
}

fn default_reviewer_weight() -> f64 {
    0.5
}

impl Default for ReviewerConfig {
    fn default() -> Self {
        Self {
            default_weight: default_reviewer_weight(),
            weights: HashMap::new(),
        }
    }
}

/// Model provider connection settings.
///
/// When `base_url` is absent the engine has no provider to call and
/// reviewers run on the offline fallback scanner (if enabled).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the analysis API.
    pub base_url: Option<String>,
    /// Bearer token for the provider.
    pub api_key: Option<String>,
    /// Per-request HTTP timeout in milliseconds (default: 30s).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = ConclaveConfig::default();
        assert_eq!(config.engine.models, default_models());
        assert!(!config.engine.enable_hitl);
        assert_eq!(config.engine.confidence_threshold, 0.4);
        assert_eq!(config.engine.max_retries, 3);
        assert_eq!(config.engine.retry_delay_ms, 500);
        assert!(config.engine.enable_caching);
        assert_eq!(config.engine.cache_ttl_ms, 3_600_000);
        assert!(config.engine.enable_fallback);
        assert!(config.rate_limit.is_none());
        assert_eq!(config.reviewers.default_weight, 0.5);
        assert!(config.reviewers.weights.is_empty());
        assert!(config.provider.base_url.is_none());
    }

    #[test]
    fn parse_minimal_toml() {
        let toml = r#"
[engine]
confidence_threshold = 0.7
max_retries = 5
"#;
        let config = ConclaveConfig::from_toml(toml).unwrap();
        assert_eq!(config.engine.confidence_threshold, 0.7);
        assert_eq!(config.engine.max_retries, 5);
        assert!(config.engine.enable_caching);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[engine]
models = ["gpt-4o", "claude-sonnet-4"]
enable_hitl = true
confidence_threshold = 0.5
enable_caching = false
audit_timeout_ms = 30000

[rate_limit]
requests = 20
window_ms = 60000

[reviewers]
default_weight = 0.4

[reviewers.weights]
"gpt-4o" = 0.9
"claude-sonnet-4" = 0.8

[provider]
base_url = "https://models.internal.example"
api_key = "sk-test"
request_timeout_ms = 10000
"#;
        let config = ConclaveConfig::from_toml(toml).unwrap();
        assert_eq!(config.engine.models.len(), 2);
        assert!(config.engine.enable_hitl);
        assert!(!config.engine.enable_caching);
        let limit = config.rate_limit.unwrap();
        assert_eq!(limit.requests, 20);
        assert_eq!(limit.window_ms, 60_000);
        assert_eq!(config.reviewers.weights["gpt-4o"], 0.9);
        assert_eq!(config.reviewers.default_weight, 0.4);
        assert_eq!(
            config.provider.base_url.as_deref(),
            Some("https://models.internal.example")
        );
        assert_eq!(config.provider.request_timeout_ms, 10_000);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ConclaveConfig::from_toml("").unwrap();
        assert_eq!(config.engine.max_retries, 3);
        assert!(config.rate_limit.is_none());
    }

    #[test]
    fn invalid_toml_returns_error() {
        let result = ConclaveConfig::from_toml("{{invalid}}");
        assert!(result.is_err());
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let config = ConclaveConfig::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let parsed = ConclaveConfig::from_toml(&rendered).unwrap();
        assert_eq!(parsed.engine.models, config.engine.models);
        assert_eq!(parsed.engine.cache_ttl_ms, config.engine.cache_ttl_ms);
    }
}
