//! Reviewer invocation for the Conclave engine.
//!
//! One reviewer, one outcome: the invoker drives the provider call with
//! bounded retries and exponential backoff, degrades to a pure offline
//! signature scan when the provider is exhausted, and never lets a single
//! reviewer's failure abort the audit.

mod backend;
mod heuristic;
mod invoker;

pub use backend::{HttpReviewerBackend, ReviewerBackend, ReviewerResponse};
pub use heuristic::heuristic_scan;
pub use invoker::{RetryPolicy, ReviewerInvoker, ReviewerOutcome};
