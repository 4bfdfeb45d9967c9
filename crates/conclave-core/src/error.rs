/// Errors that can occur across the Conclave platform.
///
/// Each variant corresponds to one failure class of the audit lifecycle.
/// Library crates use this type directly; the binary crate converts to
/// `miette` diagnostics at the boundary.
///
/// # Examples
///
/// ```
/// use conclave_core::AuditError;
///
/// let err = AuditError::Validation("empty codebase".into());
/// assert!(err.to_string().contains("empty codebase"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The request shape is invalid. Fails fast, no session is created.
    #[error("invalid audit request: {0}")]
    Validation(String),

    /// Admission was denied by the rate limiter. Retry after the hinted delay.
    #[error("rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested wait before the next attempt, in milliseconds.
        retry_after_ms: u64,
    },

    /// A single reviewer failed. Recovered at the invoker boundary and never
    /// surfaced to audit callers unless every reviewer fails.
    #[error("reviewer {reviewer} failed: {message}")]
    Reviewer {
        /// Identifier of the reviewer that failed.
        reviewer: String,
        /// Human-readable failure description.
        message: String,
    },

    /// No reviewer produced usable output; the audit cannot complete.
    #[error("no usable reviewer output for project {project_id} ({attempted} reviewers attempted)")]
    AllReviewersFailed {
        /// Project the failed audit belonged to.
        project_id: String,
        /// How many reviewers were attempted.
        attempted: usize,
    },

    /// The audit exceeded its overall time budget.
    #[error("audit exceeded time budget of {budget_ms}ms")]
    Timeout {
        /// The configured budget, in milliseconds.
        budget_ms: u64,
    },

    /// A session or report lookup referenced an unknown id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Outbound HTTP failure talking to a model provider.
    #[error("provider error: {0}")]
    Provider(String),

    /// Query-surface server failure (MCP transport, startup).
    #[error("server error: {0}")]
    Server(String),

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AuditError {
    /// Returns `true` if the error is worth retrying from the caller's side.
    ///
    /// Rate-limit rejections and provider failures are transient; validation
    /// and lookup errors are not.
    ///
    /// # Examples
    ///
    /// ```
    /// use conclave_core::AuditError;
    ///
    /// assert!(AuditError::RateLimited { retry_after_ms: 100 }.is_retryable());
    /// assert!(!AuditError::Validation("bad".into()).is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuditError::RateLimited { .. }
                | AuditError::Provider(_)
                | AuditError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AuditError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn rate_limited_carries_hint() {
        let err = AuditError::RateLimited { retry_after_ms: 250 };
        assert_eq!(err.to_string(), "rate limit exceeded, retry after 250ms");
    }

    #[test]
    fn all_reviewers_failed_names_project() {
        let err = AuditError::AllReviewersFailed {
            project_id: "p1".into(),
            attempted: 3,
        };
        assert!(err.to_string().contains("p1"));
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn retryable_classification() {
        assert!(AuditError::Provider("503".into()).is_retryable());
        assert!(AuditError::Timeout { budget_ms: 1000 }.is_retryable());
        assert!(!AuditError::NotFound("s-1".into()).is_retryable());
        assert!(!AuditError::Validation("empty".into()).is_retryable());
    }
}
