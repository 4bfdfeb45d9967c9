//! Request admission for the Conclave engine: the token-bucket rate limiter
//! that bounds outbound reviewer calls and the TTL result cache that avoids
//! redundant analysis of identical inputs.

mod cache;
mod fingerprint;
mod gate;

pub use cache::{CacheEntry, TtlCache};
pub use fingerprint::request_fingerprint;
pub use gate::AdmissionGate;
