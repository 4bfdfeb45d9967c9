//! MCP server setup and lifecycle.
//!
//! Provides [`run_server`] which starts the stdio-based MCP server over a
//! shared audit engine and blocks until the client disconnects.

use std::sync::Arc;

use conclave_core::AuditError;
use conclave_engine::AuditEngine;
use rmcp::{model::*, tool_handler, transport::stdio, ServerHandler, ServiceExt};

use crate::tools::ConclaveServer;

const SERVER_INSTRUCTIONS: &str = "\
Conclave is a multi-reviewer consensus engine for AI security audits. Use these tools to inspect audit results:\n\
- get_audit_session: Fetch one session with its full finding list and consensus metadata\n\
- list_audit_sessions: List sessions held by this engine, most recent first\n\
- get_project_sessions: List sessions for one project\n\
- export_audit_report: Export a session as json, html, or pdf report";

#[tool_handler]
impl ServerHandler for ConclaveServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "conclave".to_string(),
                title: Some("Conclave Security Audits".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: Some(
                    "Multi-reviewer consensus engine for AI security audits".to_string(),
                ),
                icons: None,
                website_url: None,
            },
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
        }
    }
}

/// Start the MCP server on stdio transport.
///
/// This is called by the `conclave mcp` CLI subcommand. It blocks until the
/// client closes stdin.
///
/// # Errors
///
/// Returns [`AuditError::Server`] if the server fails to initialize or
/// encounters a transport error.
pub async fn run_server(engine: Arc<AuditEngine>) -> Result<(), AuditError> {
    let server = ConclaveServer::new(engine);
    let service = server
        .serve(stdio())
        .await
        .map_err(|e| AuditError::Server(format!("MCP server failed to start: {e}")))?;

    service
        .waiting()
        .await
        .map_err(|e| AuditError::Server(format!("MCP server error: {e}")))?;

    Ok(())
}
