use std::collections::BTreeMap;

use conclave_core::{ConsensusMeta, Finding, Severity};
use tracing::debug;

use crate::weights::WeightTable;

/// Raw confidence spreads above this population standard deviation start
/// accruing an outlier penalty.
const OUTLIER_SIGMA_THRESHOLD: f64 = 0.2;
/// Penalty per unit of excess standard deviation.
const OUTLIER_PENALTY_SLOPE: f64 = 0.3;

/// Output of a consensus merge.
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// One synthetic consensus finding per identity group, in deterministic
    /// group-key order.
    pub merged_findings: Vec<Finding>,
    /// Mean of the per-group consensus scores; 0 when no groups exist.
    pub consensus_score: f64,
}

/// Fuse per-reviewer finding lists into one deduplicated, scored result.
///
/// Findings are grouped by identity key (category plus location); each group
/// receives a reliability-weighted confidence, an agreement ratio over the
/// reviewers that actually ran, and an outlier penalty for divergent raw
/// confidences. The merge is fully deterministic for fixed inputs and a
/// fixed weight table.
///
/// # Examples
///
/// ```
/// use conclave_consensus::{merge, WeightTable};
///
/// let result = merge(&[], &[], &WeightTable::default());
/// assert!(result.merged_findings.is_empty());
/// assert_eq!(result.consensus_score, 0.0);
/// ```
pub fn merge(
    findings_per_reviewer: &[Vec<Finding>],
    reviewers_ran: &[String],
    weights: &WeightTable,
) -> MergeResult {
    let total_models = reviewers_ran.len();
    if total_models == 0 {
        return MergeResult {
            merged_findings: Vec::new(),
            consensus_score: 0.0,
        };
    }

    // BTreeMap keeps group iteration order stable across runs.
    let mut groups: BTreeMap<String, Vec<&Finding>> = BTreeMap::new();
    for findings in findings_per_reviewer {
        for finding in findings {
            groups.entry(finding.group_key()).or_default().push(finding);
        }
    }

    let mut merged_findings = Vec::with_capacity(groups.len());
    let mut score_sum = 0.0;

    for (key, mut group) in groups {
        group.sort_by(|a, b| a.reported_by.cmp(&b.reported_by));

        let weight_sum: f64 = group
            .iter()
            .map(|f| weights.weight_for(&f.reported_by))
            .sum();
        let weighted_confidence: f64 = group
            .iter()
            .map(|f| f.confidence * weights.weight_for(&f.reported_by))
            .sum::<f64>()
            / weight_sum;

        let agreement_ratio = group.len() as f64 / total_models as f64;

        let confidences: Vec<f64> = group.iter().map(|f| f.confidence).collect();
        let sigma = population_std_dev(&confidences);
        let outlier_penalty = if sigma > OUTLIER_SIGMA_THRESHOLD {
            ((sigma - OUTLIER_SIGMA_THRESHOLD) * OUTLIER_PENALTY_SLOPE).min(1.0)
        } else {
            0.0
        };

        let group_score =
            (weighted_confidence * agreement_ratio * (1.0 - outlier_penalty)).clamp(0.0, 1.0);
        score_sum += group_score;

        let base = select_base(&group, weights);
        let severity = majority_severity(&group, base.severity);

        let mut merged = base.clone();
        merged.id = format!("consensus-{key}");
        merged.confidence = group_score;
        merged.severity = severity;
        merged.evidence = union_strings(group.iter().map(|f| f.evidence.iter()));
        merged.risk_categories = union_strings(group.iter().map(|f| f.risk_categories.iter()));
        merged.compliance_violations =
            union_strings(group.iter().map(|f| f.compliance_violations.iter()));
        merged.consensus = Some(ConsensusMeta {
            models_agreed: group.len(),
            total_models,
            agreement_ratio,
            outlier_penalty,
            weighted_confidence,
        });

        debug!(
            group = %key,
            agreed = group.len(),
            score = group_score,
            "merged finding group"
        );
        merged_findings.push(merged);
    }

    let consensus_score = if merged_findings.is_empty() {
        0.0
    } else {
        score_sum / merged_findings.len() as f64
    };

    MergeResult {
        merged_findings,
        consensus_score,
    }
}

/// Pick the group member with the highest reliability-weighted confidence.
/// The group is pre-sorted by reviewer id, and only strictly greater scores
/// displace the current winner, so exact ties break lexicographically.
fn select_base<'a>(group: &[&'a Finding], weights: &WeightTable) -> &'a Finding {
    let mut best = group[0];
    let mut best_score = best.confidence * weights.weight_for(&best.reported_by);
    for finding in &group[1..] {
        let score = finding.confidence * weights.weight_for(&finding.reported_by);
        if score > best_score {
            best = finding;
            best_score = score;
        }
    }
    best
}

/// Majority vote over the group's raw severities; a tie keeps the base
/// finding's severity.
fn majority_severity(group: &[&Finding], base: Severity) -> Severity {
    let mut counts: BTreeMap<Severity, usize> = BTreeMap::new();
    for finding in group {
        *counts.entry(finding.severity).or_default() += 1;
    }
    let top = counts.values().copied().max().unwrap_or(0);
    let winners: Vec<Severity> = counts
        .iter()
        .filter(|(_, count)| **count == top)
        .map(|(severity, _)| *severity)
        .collect();
    if winners.len() == 1 {
        winners[0]
    } else {
        base
    }
}

/// Set union preserving first-seen order across the (reviewer-sorted) group.
fn union_strings<'a>(
    iters: impl Iterator<Item = std::slice::Iter<'a, String>>,
) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for iter in iters {
        for value in iter {
            if seen.insert(value.as_str()) {
                out.push(value.clone());
            }
        }
    }
    out
}

fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::FindingLocation;
    use std::collections::HashMap;

    fn finding(
        reviewer: &str,
        kind: &str,
        file: &str,
        line: u32,
        severity: Severity,
        confidence: f64,
    ) -> Finding {
        Finding {
            id: format!("{reviewer}-{kind}-{line}"),
            kind: kind.into(),
            severity,
            confidence,
            evidence: vec![format!("Detected by {reviewer}")],
            location: Some(FindingLocation {
                file: file.into(),
                line,
            }),
            risk_categories: vec!["injection".into()],
            compliance_violations: vec![],
            reported_by: reviewer.into(),
            consensus: None,
        }
    }

    fn weights_abc() -> WeightTable {
        let mut weights = HashMap::new();
        weights.insert("reviewer-a".to_string(), 0.4);
        weights.insert("reviewer-b".to_string(), 0.3);
        weights.insert("reviewer-c".to_string(), 0.3);
        WeightTable::new(weights, 0.5)
    }

    #[test]
    fn empty_input_scores_zero() {
        let result = merge(&[], &[], &WeightTable::default());
        assert!(result.merged_findings.is_empty());
        assert_eq!(result.consensus_score, 0.0);
    }

    #[test]
    fn two_of_three_agreement_scenario() {
        // A (weight 0.4) at 0.95 and B (weight 0.3) at 0.85 report the same
        // issue; C ran but reported nothing.
        let per_reviewer = vec![
            vec![finding(
                "reviewer-a",
                "SQLInjection",
                "file.ts",
                10,
                Severity::Critical,
                0.95,
            )],
            vec![finding(
                "reviewer-b",
                "SQLInjection",
                "file.ts",
                10,
                Severity::Critical,
                0.85,
            )],
            vec![],
        ];
        let ran = vec![
            "reviewer-a".to_string(),
            "reviewer-b".to_string(),
            "reviewer-c".to_string(),
        ];
        let result = merge(&per_reviewer, &ran, &weights_abc());

        assert_eq!(result.merged_findings.len(), 1);
        let merged = &result.merged_findings[0];
        let meta = merged.consensus.as_ref().unwrap();

        assert!((meta.weighted_confidence - 0.907).abs() < 0.005);
        assert!((meta.agreement_ratio - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(meta.outlier_penalty, 0.0);
        assert!((result.consensus_score - 0.605).abs() < 0.005);
        assert_eq!(merged.confidence, result.consensus_score);
        assert_eq!(meta.models_agreed, 2);
        assert_eq!(meta.total_models, 3);
    }

    #[test]
    fn merged_finding_id_and_evidence_union() {
        let per_reviewer = vec![
            vec![finding("reviewer-a", "XSS", "app.ts", 7, Severity::High, 0.8)],
            vec![finding("reviewer-b", "XSS", "app.ts", 7, Severity::High, 0.8)],
        ];
        let ran = vec!["reviewer-a".to_string(), "reviewer-b".to_string()];
        let result = merge(&per_reviewer, &ran, &weights_abc());

        let merged = &result.merged_findings[0];
        assert_eq!(merged.id, "consensus-XSS:app.ts:7");
        assert_eq!(
            merged.evidence,
            vec![
                "Detected by reviewer-a".to_string(),
                "Detected by reviewer-b".to_string()
            ]
        );
        // Shared risk categories collapse to one entry.
        assert_eq!(merged.risk_categories, vec!["injection".to_string()]);
    }

    #[test]
    fn severity_majority_vote_wins() {
        let per_reviewer = vec![
            vec![finding("reviewer-a", "XSS", "a.ts", 1, Severity::High, 0.9)],
            vec![finding("reviewer-b", "XSS", "a.ts", 1, Severity::Medium, 0.5)],
            vec![finding("reviewer-c", "XSS", "a.ts", 1, Severity::Medium, 0.5)],
        ];
        let ran = vec![
            "reviewer-a".to_string(),
            "reviewer-b".to_string(),
            "reviewer-c".to_string(),
        ];
        let result = merge(&per_reviewer, &ran, &weights_abc());
        // Medium outvotes the higher-confidence base finding's High.
        assert_eq!(result.merged_findings[0].severity, Severity::Medium);
    }

    #[test]
    fn severity_tie_keeps_base() {
        let per_reviewer = vec![
            vec![finding("reviewer-a", "XSS", "a.ts", 1, Severity::High, 0.9)],
            vec![finding("reviewer-b", "XSS", "a.ts", 1, Severity::Medium, 0.5)],
        ];
        let ran = vec!["reviewer-a".to_string(), "reviewer-b".to_string()];
        let result = merge(&per_reviewer, &ran, &weights_abc());
        // 1-1 tie; base is reviewer-a (higher weighted confidence).
        assert_eq!(result.merged_findings[0].severity, Severity::High);
    }

    #[test]
    fn outlier_penalty_applies_above_threshold() {
        let per_reviewer = vec![
            vec![finding("reviewer-a", "XSS", "a.ts", 1, Severity::High, 0.9)],
            vec![finding("reviewer-b", "XSS", "a.ts", 1, Severity::High, 0.1)],
        ];
        let ran = vec!["reviewer-a".to_string(), "reviewer-b".to_string()];
        let result = merge(&per_reviewer, &ran, &weights_abc());

        let meta = result.merged_findings[0].consensus.as_ref().unwrap();
        // sigma = 0.4 -> penalty = (0.4 - 0.2) * 0.3 = 0.06
        assert!((meta.outlier_penalty - 0.06).abs() < 1e-9);
    }

    #[test]
    fn close_confidences_carry_no_penalty() {
        let per_reviewer = vec![
            vec![finding("reviewer-a", "XSS", "a.ts", 1, Severity::High, 0.84)],
            vec![finding("reviewer-b", "XSS", "a.ts", 1, Severity::High, 0.86)],
        ];
        let ran = vec!["reviewer-a".to_string(), "reviewer-b".to_string()];
        let result = merge(&per_reviewer, &ran, &weights_abc());
        let meta = result.merged_findings[0].consensus.as_ref().unwrap();
        assert_eq!(meta.outlier_penalty, 0.0);
    }

    #[test]
    fn singleton_group_scores_by_agreement() {
        let per_reviewer = vec![vec![finding(
            "reviewer-a",
            "XSS",
            "a.ts",
            1,
            Severity::High,
            0.9,
        )]];
        let ran = vec![
            "reviewer-a".to_string(),
            "reviewer-b".to_string(),
            "reviewer-c".to_string(),
        ];
        let result = merge(&per_reviewer, &ran, &weights_abc());
        let merged = &result.merged_findings[0];
        // Only one of three reviewers raised it.
        assert!((merged.confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn equal_scores_tie_break_lexicographically() {
        let mut weights = HashMap::new();
        weights.insert("zeta".to_string(), 0.5);
        weights.insert("alpha".to_string(), 0.5);
        let table = WeightTable::new(weights, 0.5);

        let mut from_zeta = finding("zeta", "XSS", "a.ts", 1, Severity::High, 0.8);
        from_zeta.risk_categories = vec!["z-category".into()];
        let mut from_alpha = finding("alpha", "XSS", "a.ts", 1, Severity::Low, 0.8);
        from_alpha.risk_categories = vec!["a-category".into()];

        // Reviewer order in the input must not matter.
        let per_reviewer = vec![vec![from_zeta], vec![from_alpha]];
        let ran = vec!["zeta".to_string(), "alpha".to_string()];
        let result = merge(&per_reviewer, &ran, &table);

        // Tie on weighted confidence: alpha wins lexicographically, so the
        // base severity on a 1-1 vote is alpha's.
        assert_eq!(result.merged_findings[0].severity, Severity::Low);
    }

    #[test]
    fn merge_is_deterministic() {
        let per_reviewer = vec![
            vec![
                finding("reviewer-b", "XSS", "a.ts", 1, Severity::High, 0.7),
                finding("reviewer-b", "SQLInjection", "db.ts", 3, Severity::Critical, 0.9),
            ],
            vec![finding("reviewer-a", "XSS", "a.ts", 1, Severity::High, 0.75)],
        ];
        let ran = vec!["reviewer-b".to_string(), "reviewer-a".to_string()];

        let first = merge(&per_reviewer, &ran, &weights_abc());
        let second = merge(&per_reviewer, &ran, &weights_abc());

        assert_eq!(first.consensus_score, second.consensus_score);
        let a = serde_json::to_string(&first.merged_findings).unwrap();
        let b = serde_json::to_string(&second.merged_findings).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn groups_come_out_in_key_order() {
        let per_reviewer = vec![vec![
            finding("reviewer-a", "XSS", "b.ts", 2, Severity::High, 0.8),
            finding("reviewer-a", "CSRF", "a.ts", 1, Severity::Medium, 0.7),
        ]];
        let ran = vec!["reviewer-a".to_string()];
        let result = merge(&per_reviewer, &ran, &weights_abc());
        assert_eq!(result.merged_findings[0].kind, "CSRF");
        assert_eq!(result.merged_findings[1].kind, "XSS");
    }

    #[test]
    fn std_dev_of_uniform_values_is_zero() {
        assert_eq!(population_std_dev(&[0.5, 0.5, 0.5]), 0.0);
        assert_eq!(population_std_dev(&[]), 0.0);
    }
}
