//! The Conclave audit orchestrator.
//!
//! Ties the admission gate, result cache, reviewer invoker, and consensus
//! merger together into [`AuditEngine`]: one audit request in, one typed
//! result (or one typed failure) out. Also hosts the session query surface,
//! report export, progress events, and running metrics.

mod engine;
mod escalation;
mod metrics;
mod progress;
mod report;

pub use engine::{AuditEngine, AuditReport, AuditStats};
pub use escalation::{EscalationHook, NoopEscalation};
pub use metrics::{estimate_compute_cost, EngineMetrics};
pub use progress::{ProgressEvent, ProgressReporter, ProgressStage};
pub use report::{render_report, ExportedReport, ReportFormat};
