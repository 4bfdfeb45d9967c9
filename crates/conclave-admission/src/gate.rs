use std::sync::Mutex;
use std::time::{Duration, Instant};

use conclave_core::{AuditError, RateLimitConfig};

/// Token-bucket rate limiter guarding outbound reviewer calls.
///
/// Tokens refill continuously at `requests` per `window_ms`, capped at the
/// bucket capacity. The state sits behind a single mutex so concurrently
/// in-flight audits never interleave partial updates to the token count.
///
/// A gate built without a limit configuration always admits.
///
/// # Examples
///
/// ```
/// use conclave_admission::AdmissionGate;
/// use conclave_core::RateLimitConfig;
///
/// let gate = AdmissionGate::new(Some(RateLimitConfig {
///     requests: 2,
///     window_ms: 60_000,
/// }));
/// assert!(gate.try_acquire().is_ok());
/// assert!(gate.try_acquire().is_ok());
/// assert!(gate.try_acquire().is_err());
///
/// let open = AdmissionGate::new(None);
/// assert!(open.try_acquire().is_ok());
/// ```
pub struct AdmissionGate {
    state: Option<Mutex<GateState>>,
}

struct GateState {
    tokens: u32,
    max_tokens: u32,
    refill_rate: u32,
    window: Duration,
    last_refill: Instant,
}

impl AdmissionGate {
    /// Create a gate from the optional rate-limit configuration.
    pub fn new(config: Option<RateLimitConfig>) -> Self {
        let state = config.map(|limit| {
            Mutex::new(GateState {
                tokens: limit.requests,
                max_tokens: limit.requests,
                refill_rate: limit.requests,
                window: Duration::from_millis(limit.window_ms),
                last_refill: Instant::now(),
            })
        });
        Self { state }
    }

    /// Admit one request or reject with a wait-time hint.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::RateLimited`] when the bucket is empty; the
    /// carried `retry_after_ms` is the remainder of the current window.
    pub fn try_acquire(&self) -> Result<(), AuditError> {
        let Some(state) = &self.state else {
            return Ok(());
        };
        let mut state = state.lock().expect("gate mutex poisoned");
        admit_at(&mut state, Instant::now())
    }

    /// Tokens currently available, or `None` when the gate is disabled.
    pub fn available(&self) -> Option<u32> {
        let state = self.state.as_ref()?;
        let mut state = state.lock().expect("gate mutex poisoned");
        refill_at(&mut state, Instant::now());
        Some(state.tokens)
    }
}

fn admit_at(state: &mut GateState, now: Instant) -> Result<(), AuditError> {
    refill_at(state, now);
    if state.tokens == 0 {
        let elapsed = now.duration_since(state.last_refill);
        let retry_after_ms = state.window.saturating_sub(elapsed).as_millis() as u64;
        return Err(AuditError::RateLimited { retry_after_ms });
    }
    state.tokens -= 1;
    Ok(())
}

/// Add `floor(elapsed / window * refill_rate)` tokens, capped at the bucket
/// size. `last_refill` only advances when whole tokens were added, so
/// sub-window accrual is never lost to frequent polling.
fn refill_at(state: &mut GateState, now: Instant) {
    let elapsed = now.duration_since(state.last_refill);
    let window_ms = state.window.as_millis().max(1);
    let to_add = (elapsed.as_millis() * u128::from(state.refill_rate) / window_ms) as u32;
    if to_add > 0 {
        state.tokens = state.tokens.saturating_add(to_add).min(state.max_tokens);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate_state(tokens: u32, max: u32, rate: u32, window_ms: u64) -> GateState {
        GateState {
            tokens,
            max_tokens: max,
            refill_rate: rate,
            window: Duration::from_millis(window_ms),
            last_refill: Instant::now(),
        }
    }

    #[test]
    fn disabled_gate_always_admits() {
        let gate = AdmissionGate::new(None);
        for _ in 0..100 {
            assert!(gate.try_acquire().is_ok());
        }
        assert!(gate.available().is_none());
    }

    #[test]
    fn admits_until_bucket_empty() {
        let gate = AdmissionGate::new(Some(RateLimitConfig {
            requests: 3,
            window_ms: 60_000,
        }));
        assert!(gate.try_acquire().is_ok());
        assert!(gate.try_acquire().is_ok());
        assert!(gate.try_acquire().is_ok());
        let err = gate.try_acquire().unwrap_err();
        match err {
            AuditError::RateLimited { retry_after_ms } => {
                assert!(retry_after_ms <= 60_000);
            }
            other => panic!("expected RateLimited, got {other}"),
        }
    }

    #[test]
    fn tokens_never_exceed_capacity() {
        let mut state = gate_state(2, 2, 2, 1_000);
        let start = state.last_refill;
        // A long silence refills far more than the cap would allow.
        refill_at(&mut state, start + Duration::from_secs(60));
        assert_eq!(state.tokens, 2);
    }

    #[test]
    fn tokens_never_go_negative() {
        let mut state = gate_state(1, 1, 1, 60_000);
        let now = state.last_refill;
        assert!(admit_at(&mut state, now).is_ok());
        for _ in 0..10 {
            assert!(admit_at(&mut state, now).is_err());
            assert_eq!(state.tokens, 0);
        }
    }

    #[test]
    fn refills_after_window_elapses() {
        let mut state = gate_state(0, 5, 5, 1_000);
        let start = state.last_refill;
        // 400ms at 5 tokens/s accrues two whole tokens.
        refill_at(&mut state, start + Duration::from_millis(400));
        assert_eq!(state.tokens, 2);
        assert!(admit_at(&mut state, start + Duration::from_millis(400)).is_ok());
    }

    #[test]
    fn partial_accrual_survives_frequent_checks() {
        let mut state = gate_state(0, 5, 5, 1_000);
        let start = state.last_refill;
        // Each poll sees less than one whole token; last_refill must not move.
        for step in 1..=3u64 {
            refill_at(&mut state, start + Duration::from_millis(step * 50));
            assert_eq!(state.tokens, 0);
        }
        refill_at(&mut state, start + Duration::from_millis(200));
        assert_eq!(state.tokens, 1);
    }

    #[test]
    fn rejection_hints_remaining_window() {
        let mut state = gate_state(0, 1, 1, 1_000);
        let start = state.last_refill;
        let err = admit_at(&mut state, start + Duration::from_millis(300)).unwrap_err();
        match err {
            AuditError::RateLimited { retry_after_ms } => {
                assert_eq!(retry_after_ms, 700);
            }
            other => panic!("expected RateLimited, got {other}"),
        }
    }
}
