use std::sync::Arc;
use std::time::Duration;

use conclave_core::{AuditRequest, Finding};
use tracing::{debug, warn};

use crate::backend::ReviewerBackend;
use crate::heuristic::heuristic_scan;

/// What one reviewer contributed to an audit.
///
/// The invoker never propagates errors: a reviewer either produced findings
/// (possibly via the offline fallback) or it failed and drops out of the
/// consensus pool.
#[derive(Debug, Clone)]
pub enum ReviewerOutcome {
    /// The reviewer produced findings.
    Produced {
        /// Reviewer id.
        reviewer_id: String,
        /// Findings, already stamped with the reviewer id.
        findings: Vec<Finding>,
        /// `true` when the findings came from the offline scanner.
        via_fallback: bool,
    },
    /// The reviewer produced nothing usable.
    Failed {
        /// Reviewer id.
        reviewer_id: String,
    },
}

impl ReviewerOutcome {
    /// The reviewer this outcome belongs to.
    pub fn reviewer_id(&self) -> &str {
        match self {
            ReviewerOutcome::Produced { reviewer_id, .. } => reviewer_id,
            ReviewerOutcome::Failed { reviewer_id } => reviewer_id,
        }
    }

    /// Findings, if the reviewer produced any output.
    pub fn findings(&self) -> Option<&[Finding]> {
        match self {
            ReviewerOutcome::Produced { findings, .. } => Some(findings),
            ReviewerOutcome::Failed { .. } => None,
        }
    }
}

/// Bounded-retry policy with exponential backoff.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use conclave_reviewer::RetryPolicy;
///
/// let policy = RetryPolicy::new(3, Duration::from_millis(500));
/// assert_eq!(policy.backoff_delay(1), Duration::from_millis(500));
/// assert_eq!(policy.backoff_delay(2), Duration::from_millis(1000));
/// assert_eq!(policy.backoff_delay(3), Duration::from_millis(2000));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per reviewer, including the first.
    pub max_retries: u32,
    /// Base delay; attempt `k` waits `retry_delay * 2^(k-1)` before the
    /// next attempt.
    pub retry_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy. `max_retries` is floored at one attempt.
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    /// Backoff after failed attempt `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.retry_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Runs one reviewer's analysis with bounded retries and graceful
/// degradation.
///
/// Tier 1 is the real provider call retried with exponential backoff;
/// tier 2 is the offline signature scanner, used when tier 1 is exhausted
/// or no backend is configured (and the fallback is enabled). A total
/// failure is reported as an outcome, never as an error: one reviewer's
/// failure must not abort the audit.
pub struct ReviewerInvoker {
    backend: Option<Arc<dyn ReviewerBackend>>,
    policy: RetryPolicy,
    enable_fallback: bool,
}

impl ReviewerInvoker {
    /// Create an invoker. `backend` may be `None` when no provider is
    /// configured.
    pub fn new(
        backend: Option<Arc<dyn ReviewerBackend>>,
        policy: RetryPolicy,
        enable_fallback: bool,
    ) -> Self {
        Self {
            backend,
            policy,
            enable_fallback,
        }
    }

    /// Perform one reviewer's analysis of the request.
    pub async fn invoke(&self, reviewer_id: &str, request: &AuditRequest) -> ReviewerOutcome {
        if let Some(backend) = &self.backend {
            for attempt in 1..=self.policy.max_retries {
                match backend.analyze(reviewer_id, request).await {
                    Ok(response) => {
                        let mut findings = response.findings;
                        stamp(&mut findings, reviewer_id);
                        debug!(
                            reviewer = reviewer_id,
                            project = %request.project_id,
                            count = findings.len(),
                            attempt,
                            "reviewer produced findings"
                        );
                        return ReviewerOutcome::Produced {
                            reviewer_id: reviewer_id.to_string(),
                            findings,
                            via_fallback: false,
                        };
                    }
                    Err(error) => {
                        warn!(
                            reviewer = reviewer_id,
                            project = %request.project_id,
                            attempt,
                            %error,
                            "reviewer call failed"
                        );
                        if attempt < self.policy.max_retries {
                            tokio::time::sleep(self.policy.backoff_delay(attempt)).await;
                        }
                    }
                }
            }
        }

        if self.enable_fallback {
            warn!(
                reviewer = reviewer_id,
                project = %request.project_id,
                "provider exhausted, degrading to offline signature scan"
            );
            let mut findings = heuristic_scan(request, reviewer_id);
            stamp(&mut findings, reviewer_id);
            return ReviewerOutcome::Produced {
                reviewer_id: reviewer_id.to_string(),
                findings,
                via_fallback: true,
            };
        }

        warn!(
            reviewer = reviewer_id,
            project = %request.project_id,
            "reviewer produced no usable output"
        );
        ReviewerOutcome::Failed {
            reviewer_id: reviewer_id.to_string(),
        }
    }
}

/// Stamp every finding with the reviewer that produced it.
fn stamp(findings: &mut [Finding], reviewer_id: &str) {
    for finding in findings.iter_mut() {
        finding.reported_by = reviewer_id.to_string();
        let marker = format!("Detected by {reviewer_id}");
        if !finding.evidence.contains(&marker) {
            finding.evidence.push(marker);
        }
    }
}
