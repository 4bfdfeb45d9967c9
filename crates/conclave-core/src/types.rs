use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuditError;

/// Severity of a security finding.
///
/// Variants are ordered so that `Low < Medium < High < Critical`.
///
/// # Examples
///
/// ```
/// use conclave_core::Severity;
///
/// let s: Severity = serde_json::from_str("\"critical\"").unwrap();
/// assert_eq!(s, Severity::Critical);
/// assert!(Severity::Critical > Severity::High);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Minimal impact.
    Low,
    /// Moderate impact.
    Medium,
    /// Significant impact.
    High,
    /// Severe impact, immediate action required.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Source location a finding points at.
///
/// # Examples
///
/// ```
/// use conclave_core::FindingLocation;
///
/// let loc = FindingLocation { file: "src/db.ts".into(), line: 42 };
/// assert_eq!(loc.line, 42);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindingLocation {
    /// Path of the affected file, as reported by the reviewer.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
}

/// Merge metadata attached to a consensus finding.
///
/// Only present on findings produced by the merger; raw per-reviewer
/// findings carry `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusMeta {
    /// Number of reviewers that reported this finding.
    pub models_agreed: usize,
    /// Number of reviewers that produced any output for the audit.
    pub total_models: usize,
    /// `models_agreed / total_models`.
    pub agreement_ratio: f64,
    /// Penalty applied for divergent raw confidences.
    pub outlier_penalty: f64,
    /// Reliability-weighted mean of the raw confidences.
    pub weighted_confidence: f64,
}

/// One discrete reported security issue.
///
/// Before merging, a finding is produced by exactly one reviewer and
/// `reported_by` names it. After merging, the merger emits synthetic
/// consensus findings whose `consensus` field carries the merge metadata.
///
/// # Examples
///
/// ```
/// use conclave_core::{Finding, FindingLocation, Severity};
///
/// let finding = Finding {
///     id: "gpt-4o-0".into(),
///     kind: "SQLInjection".into(),
///     severity: Severity::Critical,
///     confidence: 0.95,
///     evidence: vec!["string-concatenated query".into()],
///     location: Some(FindingLocation { file: "api/db.ts".into(), line: 10 }),
///     risk_categories: vec!["injection".into()],
///     compliance_violations: vec![],
///     reported_by: "gpt-4o".into(),
///     consensus: None,
/// };
/// assert!(finding.consensus.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Unique id within the audit (`consensus-…` after merging).
    pub id: String,
    /// Category string, e.g. `"SQLInjection"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Severity level.
    pub severity: Severity,
    /// Reviewer (or consensus) confidence in `[0, 1]`.
    pub confidence: f64,
    /// Supporting evidence lines.
    pub evidence: Vec<String>,
    /// Where the issue was observed, if the reviewer localized it.
    pub location: Option<FindingLocation>,
    /// Risk taxonomy labels.
    #[serde(default)]
    pub risk_categories: Vec<String>,
    /// Compliance frameworks the issue violates.
    #[serde(default)]
    pub compliance_violations: Vec<String>,
    /// Id of the reviewer that produced this finding.
    pub reported_by: String,
    /// Merge metadata, present only on consensus findings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusMeta>,
}

impl Finding {
    /// Identity key used to recognize the same underlying issue across
    /// reviewers: category plus location.
    ///
    /// # Examples
    ///
    /// ```
    /// use conclave_core::{Finding, FindingLocation, Severity};
    ///
    /// let mut finding = Finding {
    ///     id: "a".into(),
    ///     kind: "XSS".into(),
    ///     severity: Severity::High,
    ///     confidence: 0.8,
    ///     evidence: vec![],
    ///     location: Some(FindingLocation { file: "app.ts".into(), line: 7 }),
    ///     risk_categories: vec![],
    ///     compliance_violations: vec![],
    ///     reported_by: "m1".into(),
    ///     consensus: None,
    /// };
    /// assert_eq!(finding.group_key(), "XSS:app.ts:7");
    /// finding.location = None;
    /// assert_eq!(finding.group_key(), "XSS::0");
    /// ```
    pub fn group_key(&self) -> String {
        match &self.location {
            Some(loc) => format!("{}:{}:{}", self.kind, loc.file, loc.line),
            None => format!("{}::0", self.kind),
        }
    }
}

/// How deep an audit should go.
///
/// # Examples
///
/// ```
/// use conclave_core::AuditDepth;
///
/// let depth: AuditDepth = "deep".parse().unwrap();
/// assert_eq!(depth, AuditDepth::Deep);
/// assert!("exhaustive".parse::<AuditDepth>().is_err());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditDepth {
    /// Fast pass over the most common issue classes.
    Quick,
    /// Balanced depth (default).
    #[default]
    Standard,
    /// Exhaustive analysis.
    Deep,
}

impl fmt::Display for AuditDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditDepth::Quick => write!(f, "quick"),
            AuditDepth::Standard => write!(f, "standard"),
            AuditDepth::Deep => write!(f, "deep"),
        }
    }
}

impl FromStr for AuditDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quick" => Ok(AuditDepth::Quick),
            "standard" => Ok(AuditDepth::Standard),
            "deep" => Ok(AuditDepth::Deep),
            other => Err(format!("unsupported audit depth: {other}")),
        }
    }
}

/// Per-request audit options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditOptions {
    /// Analysis depth.
    #[serde(default)]
    pub depth: AuditDepth,
    /// Areas to emphasize, e.g. `"injection"`, `"auth"`.
    #[serde(default)]
    pub focus_areas: Vec<String>,
    /// Whether to run the consensus merge (default: true).
    #[serde(default = "default_enable_consensus")]
    pub enable_consensus: bool,
    /// Minimum overall consensus score the caller considers acceptable.
    #[serde(default)]
    pub min_consensus_score: f64,
}

fn default_enable_consensus() -> bool {
    true
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            depth: AuditDepth::default(),
            focus_areas: Vec::new(),
            enable_consensus: true,
            min_consensus_score: 0.0,
        }
    }
}

/// An immutable audit request.
///
/// Validated at entry; a request that fails validation never creates a
/// session.
///
/// # Examples
///
/// ```
/// use conclave_core::AuditRequest;
///
/// let request = AuditRequest::new("proj-1", "SELECT * FROM users");
/// assert!(request.validate().is_ok());
///
/// let bad = AuditRequest::new("", "code");
/// assert!(bad.validate().is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRequest {
    /// Project the codebase belongs to.
    pub project_id: String,
    /// Source text under audit.
    pub codebase: String,
    /// Logical file names / paths the codebase covers.
    #[serde(default)]
    pub targets: Vec<String>,
    /// Primary language of the codebase, if known.
    #[serde(default)]
    pub language: Option<String>,
    /// Per-request options.
    #[serde(default)]
    pub options: AuditOptions,
}

impl AuditRequest {
    /// Create a request with default options and no targets.
    pub fn new(project_id: impl Into<String>, codebase: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            codebase: codebase.into(),
            targets: Vec::new(),
            language: None,
            options: AuditOptions::default(),
        }
    }

    /// Check the request shape.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Validation`] if the project id or codebase is
    /// empty.
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.project_id.trim().is_empty() {
            return Err(AuditError::Validation("project id must not be empty".into()));
        }
        if self.codebase.trim().is_empty() {
            return Err(AuditError::Validation("codebase must not be empty".into()));
        }
        Ok(())
    }
}

/// Lifecycle state of an audit session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Reviewers are running.
    InProgress,
    /// The audit finished and produced a result.
    Completed,
    /// The audit failed terminally.
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::InProgress => write!(f, "in_progress"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Bookkeeping attached to a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    /// Reviewers the audit was configured with.
    pub reviewers: Vec<String>,
    /// Reviewers that produced output.
    pub reviewers_succeeded: Vec<String>,
    /// Reviewers that answered via the offline fallback scanner.
    pub fallback_reviewers: Vec<String>,
    /// Overall consensus score of the audit.
    pub consensus_score: f64,
    /// Terminal error message, for failed sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The mutable record of one audit's lifecycle and results.
///
/// Created by the orchestrator at audit start, mutated in place as reviewer
/// outcomes and merge results arrive, and retained in memory for later
/// lookup. Sessions do not survive a process restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSession {
    /// Unique session id.
    pub id: String,
    /// Project the audit belongs to.
    pub project_id: String,
    /// Lifecycle state.
    pub status: SessionStatus,
    /// Findings recorded so far. After a completed merge these are the
    /// pre-filter consensus findings (the full audit trail).
    pub findings: Vec<Finding>,
    /// When the audit started.
    pub started_at: DateTime<Utc>,
    /// When the audit reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Session bookkeeping.
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl AuditSession {
    /// Create a fresh in-progress session.
    pub fn start(id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            status: SessionStatus::InProgress,
            findings: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            metadata: SessionMetadata::default(),
        }
    }
}
