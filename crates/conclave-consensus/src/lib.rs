//! Consensus merging for multi-reviewer audits.
//!
//! Groups findings from independent reviewers by identity, weights them by
//! reviewer reliability, and produces one merged finding per group together
//! with an overall consensus score. The merge is pure and deterministic.

mod merge;
mod weights;

pub use merge::{merge, MergeResult};
pub use weights::WeightTable;
