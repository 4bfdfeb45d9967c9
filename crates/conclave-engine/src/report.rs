use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use conclave_core::{AuditError, AuditSession, Severity};
use serde::Serialize;

/// Supported export formats.
///
/// # Examples
///
/// ```
/// use conclave_engine::ReportFormat;
///
/// let format: ReportFormat = "html".parse().unwrap();
/// assert_eq!(format, ReportFormat::Html);
/// assert!("docx".parse::<ReportFormat>().is_err());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// Minimal self-contained HTML page.
    Html,
    /// Print-oriented plain-text layout.
    Pdf,
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Json => write!(f, "json"),
            ReportFormat::Html => write!(f, "html"),
            ReportFormat::Pdf => write!(f, "pdf"),
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "html" => Ok(ReportFormat::Html),
            "pdf" => Ok(ReportFormat::Pdf),
            other => Err(format!("unknown report format: {other}")),
        }
    }
}

/// A serialized session plus summary counts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedReport {
    /// Session the report was generated from.
    pub session_id: String,
    /// Requested format.
    pub format: ReportFormat,
    /// Rendered report body.
    pub content: String,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportSummary {
    total_findings: usize,
    critical: usize,
    high: usize,
    medium: usize,
    low: usize,
    consensus_score: f64,
}

impl ReportSummary {
    fn for_session(session: &AuditSession) -> Self {
        let count = |severity: Severity| {
            session
                .findings
                .iter()
                .filter(|f| f.severity == severity)
                .count()
        };
        Self {
            total_findings: session.findings.len(),
            critical: count(Severity::Critical),
            high: count(Severity::High),
            medium: count(Severity::Medium),
            low: count(Severity::Low),
            consensus_score: session.metadata.consensus_score,
        }
    }
}

/// Render a session into the requested format.
///
/// # Errors
///
/// Returns [`AuditError::Serialization`] if the session cannot be encoded.
pub fn render_report(
    session: &AuditSession,
    format: ReportFormat,
) -> Result<ExportedReport, AuditError> {
    let summary = ReportSummary::for_session(session);
    let content = match format {
        ReportFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
            "session": session,
            "summary": summary,
        }))?,
        ReportFormat::Html => render_html(session, &summary),
        ReportFormat::Pdf => render_text(session, &summary),
    };
    Ok(ExportedReport {
        session_id: session.id.clone(),
        format,
        content,
        generated_at: Utc::now(),
    })
}

fn render_html(session: &AuditSession, summary: &ReportSummary) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    let _ = writeln!(out, "<title>Audit report {}</title>", session.id);
    out.push_str("</head>\n<body>\n");
    let _ = writeln!(out, "<h1>Audit report for {}</h1>", session.project_id);
    let _ = writeln!(
        out,
        "<p>Status: {} | Findings: {} | Consensus score: {:.3}</p>",
        session.status, summary.total_findings, summary.consensus_score
    );
    let _ = writeln!(
        out,
        "<p>Critical: {} | High: {} | Medium: {} | Low: {}</p>",
        summary.critical, summary.high, summary.medium, summary.low
    );
    out.push_str("<ul>\n");
    for finding in &session.findings {
        let location = finding
            .location
            .as_ref()
            .map(|l| format!("{}:{}", l.file, l.line))
            .unwrap_or_else(|| "unlocated".to_string());
        let _ = writeln!(
            out,
            "<li><strong>[{}]</strong> {} at {} ({:.0}%)</li>",
            finding.severity, finding.kind, location, finding.confidence * 100.0
        );
    }
    out.push_str("</ul>\n</body>\n</html>\n");
    out
}

fn render_text(session: &AuditSession, summary: &ReportSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "SECURITY AUDIT REPORT");
    let _ = writeln!(out, "=====================");
    let _ = writeln!(out, "Project:  {}", session.project_id);
    let _ = writeln!(out, "Session:  {}", session.id);
    let _ = writeln!(out, "Status:   {}", session.status);
    let _ = writeln!(out, "Started:  {}", session.started_at.to_rfc3339());
    if let Some(completed) = session.completed_at {
        let _ = writeln!(out, "Finished: {}", completed.to_rfc3339());
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Findings: {} (critical {}, high {}, medium {}, low {})",
        summary.total_findings, summary.critical, summary.high, summary.medium, summary.low
    );
    let _ = writeln!(out, "Consensus score: {:.3}", summary.consensus_score);
    let _ = writeln!(out);
    for finding in &session.findings {
        let location = finding
            .location
            .as_ref()
            .map(|l| format!("{}:{}", l.file, l.line))
            .unwrap_or_else(|| "unlocated".to_string());
        let _ = writeln!(
            out,
            "[{}] {} — {} (confidence {:.0}%)",
            finding.severity.to_string().to_uppercase(),
            finding.kind,
            location,
            finding.confidence * 100.0
        );
        for line in &finding.evidence {
            let _ = writeln!(out, "    {line}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::{Finding, FindingLocation, SessionStatus};

    fn session_with_findings() -> AuditSession {
        let mut session = AuditSession::start("s-1", "p1");
        session.status = SessionStatus::Completed;
        session.metadata.consensus_score = 0.72;
        session.findings = vec![Finding {
            id: "consensus-XSS:app.ts:7".into(),
            kind: "XSS".into(),
            severity: Severity::High,
            confidence: 0.8,
            evidence: vec!["Detected by gpt-4o".into()],
            location: Some(FindingLocation {
                file: "app.ts".into(),
                line: 7,
            }),
            risk_categories: vec![],
            compliance_violations: vec![],
            reported_by: "gpt-4o".into(),
            consensus: None,
        }];
        session
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("Pdf".parse::<ReportFormat>().unwrap(), ReportFormat::Pdf);
    }

    #[test]
    fn json_report_contains_session_and_summary() {
        let report = render_report(&session_with_findings(), ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&report.content).unwrap();
        assert_eq!(value["session"]["projectId"], "p1");
        assert_eq!(value["summary"]["totalFindings"], 1);
        assert_eq!(value["summary"]["high"], 1);
    }

    #[test]
    fn html_report_lists_findings() {
        let report = render_report(&session_with_findings(), ReportFormat::Html).unwrap();
        assert!(report.content.contains("<h1>Audit report for p1</h1>"));
        assert!(report.content.contains("XSS"));
        assert!(report.content.contains("app.ts:7"));
    }

    #[test]
    fn text_report_carries_evidence() {
        let report = render_report(&session_with_findings(), ReportFormat::Pdf).unwrap();
        assert!(report.content.contains("SECURITY AUDIT REPORT"));
        assert!(report.content.contains("Detected by gpt-4o"));
        assert!(report.content.contains("[HIGH] XSS"));
    }
}
