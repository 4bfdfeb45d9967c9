use serde::Serialize;

/// Cost charged per 1k estimated input tokens, in abstract cost units.
const COST_PER_1K_TOKENS: f64 = 0.01;

/// Running counters for the engine. Monotonically updated, never rolled
/// back; each engine instance owns its own copy.
///
/// # Examples
///
/// ```
/// use conclave_engine::EngineMetrics;
///
/// let mut metrics = EngineMetrics::default();
/// metrics.record_started();
/// metrics.record_success(4, 0.8, 0.12);
/// assert_eq!(metrics.successful_audits, 1);
/// assert_eq!(metrics.average_consensus_score, 0.8);
/// ```
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineMetrics {
    /// Audits admitted past validation and the cache.
    pub total_audits: u64,
    /// Audits that reached `completed`.
    pub successful_audits: u64,
    /// Audits that reached `failed`.
    pub failed_audits: u64,
    /// Findings returned to callers, accumulated.
    pub total_findings: u64,
    /// Running mean of the overall consensus scores of successful audits.
    pub average_consensus_score: f64,
    /// Accumulated compute cost estimate, in abstract cost units.
    pub total_compute_cost: f64,
}

impl EngineMetrics {
    /// Record an audit entering the reviewer pipeline.
    pub fn record_started(&mut self) {
        self.total_audits += 1;
    }

    /// Record a completed audit, folding its consensus score into the
    /// running average.
    pub fn record_success(&mut self, findings: u64, consensus_score: f64, compute_cost: f64) {
        self.successful_audits += 1;
        self.total_findings += findings;
        self.total_compute_cost += compute_cost;
        let n = self.successful_audits as f64;
        self.average_consensus_score =
            ((n - 1.0) * self.average_consensus_score + consensus_score) / n;
    }

    /// Record a terminally failed audit.
    pub fn record_failure(&mut self) {
        self.failed_audits += 1;
    }
}

/// Deterministic compute-cost estimate for one audit: roughly four
/// characters per token, priced per reviewer that ran.
pub fn estimate_compute_cost(codebase_chars: usize, reviewers_ran: usize) -> f64 {
    let tokens = codebase_chars as f64 / 4.0;
    tokens / 1000.0 * COST_PER_1K_TOKENS * reviewers_ran as f64
}
