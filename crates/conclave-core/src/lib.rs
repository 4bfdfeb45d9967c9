//! Core types, configuration, and error handling for the Conclave platform.
//!
//! This crate provides the shared foundation used by all other Conclave
//! crates:
//! - [`AuditError`] — unified error type using `thiserror`
//! - [`ConclaveConfig`] — configuration loaded from `.conclave.toml`
//! - Shared types: [`AuditRequest`], [`Finding`], [`Severity`],
//!   [`AuditSession`], [`ConsensusMeta`]

mod config;
mod error;
mod types;

pub use config::{
    ConclaveConfig, EngineConfig, ProviderConfig, RateLimitConfig, ReviewerConfig,
};
pub use error::AuditError;
pub use types::{
    AuditDepth, AuditOptions, AuditRequest, AuditSession, ConsensusMeta, Finding,
    FindingLocation, SessionMetadata, SessionStatus, Severity,
};

/// A convenience `Result` type for Conclave operations.
pub type Result<T> = std::result::Result<T, AuditError>;
