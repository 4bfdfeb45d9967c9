use async_trait::async_trait;
use conclave_core::{AuditError, Finding};

/// Human-review escalation capability.
///
/// Given one merged finding, an implementation decides whether it needs a
/// human task and returns an opaque task handle when it does. Hook failures
/// are logged and swallowed by the engine; escalation must never fail an
/// audit.
#[async_trait]
pub trait EscalationHook: Send + Sync {
    /// Consider one retained consensus finding for human review.
    ///
    /// # Errors
    ///
    /// Implementations may fail (queue down, permission denied); the engine
    /// only logs such errors.
    async fn escalate(&self, finding: &Finding) -> Result<Option<String>, AuditError>;
}

/// Default hook: never escalates.
pub struct NoopEscalation;

#[async_trait]
impl EscalationHook for NoopEscalation {
    async fn escalate(&self, _finding: &Finding) -> Result<Option<String>, AuditError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::Severity;

    fn finding() -> Finding {
        Finding {
            id: "consensus-XSS:a.ts:1".into(),
            kind: "XSS".into(),
            severity: Severity::High,
            confidence: 0.8,
            evidence: vec![],
            location: None,
            risk_categories: vec![],
            compliance_violations: vec![],
            reported_by: "gpt-4o".into(),
            consensus: None,
        }
    }

    #[tokio::test]
    async fn noop_never_escalates() {
        let hook = NoopEscalation;
        let handle = hook.escalate(&finding()).await.unwrap();
        assert!(handle.is_none());
    }
}
