//! MCP integration for Conclave.
//!
//! Exposes the engine's read-only session query surface and report export
//! as MCP tools over stdio, so agents and editors can pull audit results
//! without touching the engine's write path.

pub mod server;
pub mod tools;
