use std::sync::OnceLock;

use conclave_core::{AuditRequest, Finding, FindingLocation, Severity};
use regex::Regex;

/// One entry of the offline vulnerability signature table.
struct Signature {
    pattern: &'static str,
    kind: &'static str,
    severity: Severity,
    confidence: f64,
    risk_category: &'static str,
}

/// Fixed signature table for the fallback scanner. Confidences are
/// deliberately low: a pattern hit is a hint, not a model judgment.
const SIGNATURES: &[Signature] = &[
    Signature {
        pattern: r#"(?i)(select|insert|update|delete)\b[^;]*["'`]\s*\+"#,
        kind: "SQLInjection",
        severity: Severity::Critical,
        confidence: 0.55,
        risk_category: "injection",
    },
    Signature {
        pattern: r#"(?i)\b(exec|system|popen|spawnsync?)\s*\([^)]*(\$\{|\+)"#,
        kind: "CommandInjection",
        severity: Severity::Critical,
        confidence: 0.5,
        risk_category: "injection",
    },
    Signature {
        pattern: r"(?i)innerHTML\s*=|document\.write\s*\(",
        kind: "CrossSiteScripting",
        severity: Severity::High,
        confidence: 0.5,
        risk_category: "injection",
    },
    Signature {
        pattern: r#"(?i)(password|secret|api[_-]?key|token)\s*[:=]\s*["'][^"']{4,}["']"#,
        kind: "HardcodedSecret",
        severity: Severity::High,
        confidence: 0.6,
        risk_category: "secrets",
    },
    Signature {
        pattern: r"(?i)\beval\s*\(",
        kind: "CodeInjection",
        severity: Severity::High,
        confidence: 0.5,
        risk_category: "injection",
    },
    Signature {
        pattern: r"(?i)\b(md5|sha1)\s*\(",
        kind: "WeakCryptography",
        severity: Severity::Medium,
        confidence: 0.45,
        risk_category: "cryptography",
    },
    Signature {
        pattern: r"(?i)pickle\.loads|\bunserialize\s*\(|yaml\.load\s*\(",
        kind: "InsecureDeserialization",
        severity: Severity::High,
        confidence: 0.5,
        risk_category: "deserialization",
    },
    Signature {
        pattern: r"\.\./(\.\./)+",
        kind: "PathTraversal",
        severity: Severity::Medium,
        confidence: 0.4,
        risk_category: "filesystem",
    },
    Signature {
        pattern: r"(?i)verify\s*=\s*false|rejectUnauthorized\s*:\s*false|InsecureSkipVerify",
        kind: "InsecureTransport",
        severity: Severity::High,
        confidence: 0.55,
        risk_category: "transport",
    },
    Signature {
        pattern: r"(?i)math\.random\s*\(",
        kind: "WeakRandomness",
        severity: Severity::Low,
        confidence: 0.35,
        risk_category: "cryptography",
    },
];

fn compiled_signatures() -> &'static [(Regex, &'static Signature)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static Signature)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        SIGNATURES
            .iter()
            .filter_map(|sig| Regex::new(sig.pattern).ok().map(|re| (re, sig)))
            .collect()
    })
}

/// Pure, offline pattern scan over the submitted codebase.
///
/// This is the tier-2 fallback when a reviewer's provider calls are
/// exhausted: deterministic, line-oriented, and best-effort. Findings are
/// attributed to the first requested target (or `"input"` when the request
/// names none) so identity grouping still works downstream.
///
/// # Examples
///
/// ```
/// use conclave_core::AuditRequest;
/// use conclave_reviewer::heuristic_scan;
///
/// let request = AuditRequest::new("p1", "const q = \"SELECT * FROM t WHERE id=\" + id;");
/// let findings = heuristic_scan(&request, "gpt-4o");
/// assert_eq!(findings[0].kind, "SQLInjection");
/// assert_eq!(findings[0].reported_by, "gpt-4o");
/// ```
pub fn heuristic_scan(request: &AuditRequest, reviewer_id: &str) -> Vec<Finding> {
    let file = request
        .targets
        .first()
        .cloned()
        .unwrap_or_else(|| "input".to_string());

    let mut findings = Vec::new();
    for (idx, line) in request.codebase.lines().enumerate() {
        let line_no = idx as u32 + 1;
        for (regex, sig) in compiled_signatures() {
            if regex.is_match(line) {
                findings.push(Finding {
                    id: format!("{reviewer_id}-offline-{}", findings.len()),
                    kind: sig.kind.to_string(),
                    severity: sig.severity,
                    confidence: sig.confidence,
                    evidence: vec![
                        format!("line {line_no}: {}", line.trim()),
                        "offline signature scan".to_string(),
                    ],
                    location: Some(FindingLocation {
                        file: file.clone(),
                        line: line_no,
                    }),
                    risk_categories: vec![sig.risk_category.to_string()],
                    compliance_violations: Vec::new(),
                    reported_by: reviewer_id.to_string(),
                    consensus: None,
                });
            }
        }
    }
    findings
}
