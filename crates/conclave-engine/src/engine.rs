use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

use conclave_admission::{request_fingerprint, AdmissionGate, TtlCache};
use conclave_consensus::{merge, WeightTable};
use conclave_core::{
    AuditError, AuditRequest, AuditSession, ConclaveConfig, Finding, SessionStatus,
};
use conclave_reviewer::{
    HttpReviewerBackend, RetryPolicy, ReviewerBackend, ReviewerInvoker, ReviewerOutcome,
};

use crate::escalation::{EscalationHook, NoopEscalation};
use crate::metrics::{estimate_compute_cost, EngineMetrics};
use crate::progress::{ProgressEvent, ProgressReporter, ProgressStage};
use crate::report::{render_report, ExportedReport, ReportFormat};

/// Statistics about one audit run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    /// Reviewers the audit was configured with.
    pub reviewers_requested: usize,
    /// Reviewers that produced output.
    pub reviewers_succeeded: usize,
    /// Reviewers that answered via the offline fallback scanner.
    pub fallback_reviewers: usize,
    /// Consensus findings before the confidence filter.
    pub findings_merged: usize,
    /// Findings removed by the confidence filter.
    pub findings_filtered: usize,
}

/// Result of a completed audit, as returned to callers (and cached).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    /// Session the audit ran under.
    pub session_id: String,
    /// Project the audit belongs to.
    pub project_id: String,
    /// Overall consensus score.
    pub consensus_score: f64,
    /// Findings above the confidence threshold.
    pub findings: Vec<Finding>,
    /// Run statistics.
    pub stats: AuditStats,
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Audit Results")?;
        writeln!(f, "=============")?;
        writeln!(
            f,
            "Project: {} | Reviewers: {}/{} | Findings: {} (filtered: {}) | Consensus: {:.3}\n",
            self.project_id,
            self.stats.reviewers_succeeded,
            self.stats.reviewers_requested,
            self.findings.len(),
            self.stats.findings_filtered,
            self.consensus_score,
        )?;

        if self.findings.is_empty() {
            writeln!(f, "No findings above the confidence threshold.")?;
        } else {
            for finding in &self.findings {
                let location = finding
                    .location
                    .as_ref()
                    .map(|l| format!("{}:{}", l.file, l.line))
                    .unwrap_or_else(|| "unlocated".to_string());
                writeln!(
                    f,
                    "[{}] {} {} (confidence: {:.0}%)",
                    finding.severity.to_string().to_uppercase(),
                    finding.kind,
                    location,
                    finding.confidence * 100.0,
                )?;
                if let Some(meta) = &finding.consensus {
                    writeln!(
                        f,
                        "  agreement: {}/{} reviewers",
                        meta.models_agreed, meta.total_models
                    )?;
                }
                for line in &finding.evidence {
                    writeln!(f, "  {line}")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// The audit orchestrator.
///
/// Coordinates admission, caching, reviewer fan-out, consensus merging, and
/// session/metrics bookkeeping for audit requests. Each instance owns its
/// own gate, cache, session map, and metrics; there is no ambient global
/// state, so instances are fully isolated (and trivially testable).
///
/// # Examples
///
/// ```
/// use conclave_core::ConclaveConfig;
/// use conclave_engine::AuditEngine;
///
/// let engine = AuditEngine::new(ConclaveConfig::default()).unwrap();
/// assert!(engine.sessions().is_empty());
/// ```
pub struct AuditEngine {
    config: ConclaveConfig,
    gate: AdmissionGate,
    cache: TtlCache<AuditReport>,
    invoker: ReviewerInvoker,
    weights: WeightTable,
    escalation: Arc<dyn EscalationHook>,
    sessions: Mutex<HashMap<String, AuditSession>>,
    metrics: Mutex<EngineMetrics>,
    progress: ProgressReporter,
}

impl AuditEngine {
    /// Build an engine from configuration, constructing the HTTP provider
    /// backend when one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Provider`] if the HTTP client cannot be built.
    pub fn new(config: ConclaveConfig) -> Result<Self, AuditError> {
        let backend = HttpReviewerBackend::from_config(&config.provider)?
            .map(|backend| Arc::new(backend) as Arc<dyn ReviewerBackend>);
        Ok(Self::with_backend(config, backend))
    }

    /// Build an engine with an explicit (possibly absent) backend. This is
    /// the seam tests use to inject scripted reviewers.
    pub fn with_backend(
        config: ConclaveConfig,
        backend: Option<Arc<dyn ReviewerBackend>>,
    ) -> Self {
        let gate = AdmissionGate::new(config.rate_limit);
        let cache = TtlCache::new(Duration::from_millis(config.engine.cache_ttl_ms));
        let policy = RetryPolicy::new(
            config.engine.max_retries,
            Duration::from_millis(config.engine.retry_delay_ms),
        );
        let invoker = ReviewerInvoker::new(backend, policy, config.engine.enable_fallback);
        let weights = WeightTable::from_config(&config.reviewers);
        Self {
            config,
            gate,
            cache,
            invoker,
            weights,
            escalation: Arc::new(NoopEscalation),
            sessions: Mutex::new(HashMap::new()),
            metrics: Mutex::new(EngineMetrics::default()),
            progress: ProgressReporter::new(None),
        }
    }

    /// Attach a progress event channel.
    pub fn with_progress(mut self, sender: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = ProgressReporter::new(Some(sender));
        self
    }

    /// Replace the human-review escalation hook.
    pub fn with_escalation(mut self, hook: Arc<dyn EscalationHook>) -> Self {
        self.escalation = hook;
        self
    }

    /// Run one audit end to end.
    ///
    /// # Errors
    ///
    /// - [`AuditError::Validation`] for a malformed request (no session is
    ///   created),
    /// - [`AuditError::RateLimited`] when admission is denied,
    /// - [`AuditError::AllReviewersFailed`] when zero reviewers produce
    ///   usable output,
    /// - [`AuditError::Timeout`] when the whole-audit budget elapses.
    pub async fn audit(&self, request: AuditRequest) -> Result<AuditReport, AuditError> {
        self.progress.reset();
        self.progress.emit(
            ProgressStage::Validating,
            5,
            format!("validating request for {}", request.project_id),
        );
        request.validate()?;

        self.progress
            .emit(ProgressStage::Admitting, 10, "consulting rate limiter");
        self.gate.try_acquire()?;

        let fingerprint = request_fingerprint(&request);
        if self.config.engine.enable_caching {
            if let Some(report) = self.cache.get(&fingerprint) {
                info!(project = %request.project_id, "serving audit from cache");
                self.progress
                    .emit(ProgressStage::Done, 100, "served from cache");
                return Ok(report);
            }
        }

        self.metrics
            .lock()
            .expect("metrics mutex poisoned")
            .record_started();

        let session_id = Uuid::new_v4().to_string();
        let mut session = AuditSession::start(&session_id, &request.project_id);
        session.metadata.reviewers = self.config.engine.models.clone();
        self.store_session(session.clone());

        info!(
            project = %request.project_id,
            session = %session_id,
            reviewers = self.config.engine.models.len(),
            "audit started"
        );

        let budget_ms = self.config.engine.audit_timeout_ms;
        let outcomes = match tokio::time::timeout(
            Duration::from_millis(budget_ms),
            self.run_reviewers(&request),
        )
        .await
        {
            Ok(outcomes) => outcomes,
            Err(_) => {
                warn!(session = %session_id, budget_ms, "audit timed out, abandoning reviewers");
                self.fail_session(&session_id, "audit timed out");
                self.metrics
                    .lock()
                    .expect("metrics mutex poisoned")
                    .record_failure();
                self.progress.emit(ProgressStage::Done, 100, "audit failed");
                return Err(AuditError::Timeout { budget_ms });
            }
        };

        let reviewers_ran: Vec<String> = outcomes
            .iter()
            .filter(|o| o.findings().is_some())
            .map(|o| o.reviewer_id().to_string())
            .collect();
        let fallback_reviewers: Vec<String> = outcomes
            .iter()
            .filter_map(|o| match o {
                ReviewerOutcome::Produced {
                    reviewer_id,
                    via_fallback: true,
                    ..
                } => Some(reviewer_id.clone()),
                _ => None,
            })
            .collect();

        if reviewers_ran.is_empty() {
            self.fail_session(&session_id, "no usable reviewer output");
            self.metrics
                .lock()
                .expect("metrics mutex poisoned")
                .record_failure();
            self.progress.emit(ProgressStage::Done, 100, "audit failed");
            return Err(AuditError::AllReviewersFailed {
                project_id: request.project_id.clone(),
                attempted: self.config.engine.models.len(),
            });
        }

        self.progress.emit(
            ProgressStage::Merging,
            85,
            format!("merging findings from {} reviewers", reviewers_ran.len()),
        );

        let per_reviewer: Vec<Vec<Finding>> = outcomes
            .iter()
            .filter_map(|o| o.findings().map(|f| f.to_vec()))
            .collect();

        let (all_findings, consensus_score) = if request.options.enable_consensus {
            let result = merge(&per_reviewer, &reviewers_ran, &self.weights);
            (result.merged_findings, result.consensus_score)
        } else {
            (per_reviewer.into_iter().flatten().collect(), 0.0)
        };

        if request.options.enable_consensus
            && consensus_score < request.options.min_consensus_score
        {
            warn!(
                session = %session_id,
                consensus_score,
                requested = request.options.min_consensus_score,
                "consensus score below the requested minimum"
            );
        }

        let threshold = self.config.engine.confidence_threshold;
        let retained: Vec<Finding> = all_findings
            .iter()
            .filter(|f| f.confidence >= threshold)
            .cloned()
            .collect();
        let filtered = all_findings.len() - retained.len();
        self.progress.emit(
            ProgressStage::Merging,
            90,
            format!("{} findings above threshold", retained.len()),
        );

        if self.config.engine.enable_hitl {
            for finding in &retained {
                match self.escalation.escalate(finding).await {
                    Ok(Some(task)) => {
                        info!(finding = %finding.id, task, "escalated finding for human review");
                    }
                    Ok(None) => {}
                    Err(error) => {
                        warn!(finding = %finding.id, %error, "escalation hook failed");
                    }
                }
            }
        }

        let report = AuditReport {
            session_id: session_id.clone(),
            project_id: request.project_id.clone(),
            consensus_score,
            findings: retained,
            stats: AuditStats {
                reviewers_requested: self.config.engine.models.len(),
                reviewers_succeeded: reviewers_ran.len(),
                fallback_reviewers: fallback_reviewers.len(),
                findings_merged: all_findings.len(),
                findings_filtered: filtered,
            },
        };

        if self.config.engine.enable_caching {
            let tags = vec![
                format!("project:{}", request.project_id),
                format!(
                    "language:{}",
                    request.language.as_deref().unwrap_or("unknown")
                ),
                format!("depth:{}", request.options.depth),
            ];
            self.cache.set(
                fingerprint,
                report.clone(),
                Some(Duration::from_millis(self.config.engine.cache_ttl_ms)),
                tags,
            );
        }

        session.status = SessionStatus::Completed;
        session.completed_at = Some(Utc::now());
        session.findings = all_findings;
        session.metadata.reviewers_succeeded = reviewers_ran.clone();
        session.metadata.fallback_reviewers = fallback_reviewers;
        session.metadata.consensus_score = consensus_score;
        self.store_session(session);

        self.metrics
            .lock()
            .expect("metrics mutex poisoned")
            .record_success(
                report.findings.len() as u64,
                consensus_score,
                estimate_compute_cost(request.codebase.chars().count(), reviewers_ran.len()),
            );

        info!(
            session = %session_id,
            findings = report.findings.len(),
            score = consensus_score,
            "audit completed"
        );
        self.progress.emit(ProgressStage::Done, 100, "audit complete");
        Ok(report)
    }

    /// Launch every configured reviewer concurrently and wait for all of
    /// them to settle (success or exhausted failure).
    async fn run_reviewers(&self, request: &AuditRequest) -> Vec<ReviewerOutcome> {
        let total = self.config.engine.models.len().max(1);
        let completed = AtomicUsize::new(0);
        let tasks = self.config.engine.models.iter().map(|model| {
            let completed = &completed;
            async move {
                let outcome = self.invoker.invoke(model, request).await;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                let percent = (15 + 60 * done / total) as u8;
                self.progress.emit(
                    ProgressStage::Reviewing,
                    percent,
                    format!("{model} settled"),
                );
                outcome
            }
        });
        join_all(tasks).await
    }

    /// Look up one session by id.
    pub fn session(&self, id: &str) -> Option<AuditSession> {
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .get(id)
            .cloned()
    }

    /// All sessions, most recent first.
    pub fn sessions(&self) -> Vec<AuditSession> {
        let mut sessions: Vec<AuditSession> = self
            .sessions
            .lock()
            .expect("session mutex poisoned")
            .values()
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        sessions
    }

    /// Sessions for one project, most recent first.
    pub fn sessions_for_project(&self, project_id: &str) -> Vec<AuditSession> {
        let mut sessions: Vec<AuditSession> = self
            .sessions
            .lock()
            .expect("session mutex poisoned")
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        sessions
    }

    /// Snapshot of the engine metrics.
    pub fn metrics(&self) -> EngineMetrics {
        self.metrics
            .lock()
            .expect("metrics mutex poisoned")
            .clone()
    }

    /// Export one session as a report.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::NotFound`] for an unknown session id.
    pub fn export_report(
        &self,
        session_id: &str,
        format: ReportFormat,
    ) -> Result<ExportedReport, AuditError> {
        let session = self
            .session(session_id)
            .ok_or_else(|| AuditError::NotFound(format!("session {session_id}")))?;
        render_report(&session, format)
    }

    /// Drop every cached result for a project. Returns the number of
    /// entries removed.
    pub fn invalidate_project(&self, project_id: &str) -> usize {
        self.cache
            .invalidate_by_tags(&[format!("project:{project_id}")])
    }

    /// Drop every cached result whose key matches `pattern`.
    pub fn invalidate_matching(&self, pattern: &regex::Regex) -> usize {
        self.cache.invalidate_by_pattern(pattern)
    }

    /// Remove expired cache entries once. Returns the number removed.
    pub fn sweep_cache(&self) -> usize {
        self.cache.sweep()
    }

    /// Spawn a background task sweeping the cache at `interval`.
    pub fn spawn_cache_sweeper(
        self: &Arc<Self>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = engine.cache.sweep();
                if removed > 0 {
                    debug!(removed, "swept expired cache entries");
                }
            }
        })
    }

    fn store_session(&self, session: AuditSession) {
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .insert(session.id.clone(), session);
    }

    fn fail_session(&self, session_id: &str, error: &str) {
        let mut sessions = self.sessions.lock().expect("session mutex poisoned");
        if let Some(session) = sessions.get_mut(session_id) {
            session.status = SessionStatus::Failed;
            session.completed_at = Some(Utc::now());
            session.metadata.error = Some(error.to_string());
        }
    }
}
