use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// Discrete phases an audit moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    /// Request shape is being checked.
    Validating,
    /// Rate limiter and cache are being consulted.
    Admitting,
    /// Reviewers are running.
    Reviewing,
    /// Findings are being merged and filtered.
    Merging,
    /// The audit reached a terminal state.
    Done,
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressStage::Validating => write!(f, "validating"),
            ProgressStage::Admitting => write!(f, "admitting"),
            ProgressStage::Reviewing => write!(f, "reviewing"),
            ProgressStage::Merging => write!(f, "merging"),
            ProgressStage::Done => write!(f, "done"),
        }
    }
}

/// One progress observation. Percentages are monotonically non-decreasing
/// within an audit; the stream is an observation side channel only and
/// never required for correctness.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Current phase.
    pub stage: ProgressStage,
    /// Overall progress in `[0, 100]`.
    pub percent: u8,
    /// Human-readable detail, e.g. which reviewer settled.
    pub detail: String,
}

/// Emits progress events into an optional channel, enforcing monotonic
/// percentages. A reporter without a sender is a no-op.
pub struct ProgressReporter {
    sender: Option<UnboundedSender<ProgressEvent>>,
    high_water: AtomicU8,
}

impl ProgressReporter {
    /// Create a reporter; `None` disables emission entirely.
    pub fn new(sender: Option<UnboundedSender<ProgressEvent>>) -> Self {
        Self {
            sender,
            high_water: AtomicU8::new(0),
        }
    }

    /// Reset the monotonic floor for a new audit.
    pub fn reset(&self) {
        self.high_water.store(0, Ordering::SeqCst);
    }

    /// Emit an event. Percentages below the high-water mark are raised to
    /// it; send failures (dropped receiver) are ignored.
    pub fn emit(&self, stage: ProgressStage, percent: u8, detail: impl Into<String>) {
        let Some(sender) = &self.sender else {
            return;
        };
        let percent = percent.min(100);
        let floor = self.high_water.fetch_max(percent, Ordering::SeqCst);
        let percent = percent.max(floor);
        let _ = sender.send(ProgressEvent {
            stage,
            percent,
            detail: detail.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn reporter_without_sender_is_noop() {
        let reporter = ProgressReporter::new(None);
        reporter.emit(ProgressStage::Validating, 5, "check");
    }

    #[test]
    fn percentages_never_regress() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(Some(tx));
        reporter.emit(ProgressStage::Reviewing, 40, "a");
        reporter.emit(ProgressStage::Reviewing, 30, "b");
        reporter.emit(ProgressStage::Merging, 85, "c");

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        let third = rx.try_recv().unwrap();
        assert_eq!(first.percent, 40);
        assert_eq!(second.percent, 40);
        assert_eq!(third.percent, 85);
    }

    #[test]
    fn reset_allows_new_audit_to_start_low() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(Some(tx));
        reporter.emit(ProgressStage::Done, 100, "done");
        reporter.reset();
        reporter.emit(ProgressStage::Validating, 5, "next");

        rx.try_recv().unwrap();
        assert_eq!(rx.try_recv().unwrap().percent, 5);
    }

    #[test]
    fn dropped_receiver_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let reporter = ProgressReporter::new(Some(tx));
        reporter.emit(ProgressStage::Done, 100, "late");
    }
}
