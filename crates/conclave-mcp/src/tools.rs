//! Tool implementations for the Conclave MCP server.
//!
//! Four read-only tools are exposed over the engine's session query surface:
//! `get_audit_session`, `list_audit_sessions`, `get_project_sessions`, and
//! `export_audit_report`. The engine remains the sole writer; these tools
//! never mutate audit state.

use std::sync::Arc;

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::*,
    schemars, tool, tool_router, ErrorData as McpError,
};
use serde::Deserialize;

use conclave_engine::{AuditEngine, ReportFormat};

/// MCP server exposing the Conclave audit-session query surface.
#[derive(Clone)]
pub struct ConclaveServer {
    pub(crate) engine: Arc<AuditEngine>,
    pub(crate) tool_router: ToolRouter<Self>,
}

// --- Parameter structs ---

/// Parameters for the `get_audit_session` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetSessionParams {
    /// Session id returned by a completed audit.
    pub session_id: String,
}

/// Parameters for the `list_audit_sessions` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListSessionsParams {
    /// Maximum sessions to return (default: 20).
    pub limit: Option<usize>,
}

/// Parameters for the `get_project_sessions` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetProjectSessionsParams {
    /// Project to filter by.
    pub project_id: String,
}

/// Parameters for the `export_audit_report` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ExportReportParams {
    /// Session id to export.
    pub session_id: String,
    /// Output format: "json" (default), "html", or "pdf".
    pub format: Option<String>,
}

fn mcp_err(msg: impl Into<String>) -> McpError {
    McpError::internal_error(msg.into(), None)
}

#[tool_router]
impl ConclaveServer {
    /// Create a new server over a shared engine.
    pub fn new(engine: Arc<AuditEngine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "get_audit_session",
        description = "Fetch one audit session by id, including its full finding list and consensus metadata. Use this to inspect the audit trail behind a reported result."
    )]
    pub fn get_audit_session(
        &self,
        Parameters(params): Parameters<GetSessionParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self
            .engine
            .session(&params.session_id)
            .ok_or_else(|| mcp_err(format!("Unknown session id: {}", params.session_id)))?;
        let json = serde_json::to_string_pretty(&session).map_err(|e| mcp_err(e.to_string()))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(
        name = "list_audit_sessions",
        description = "List audit sessions held by this engine instance, most recent first. Sessions live in memory only and do not survive a restart."
    )]
    pub fn list_audit_sessions(
        &self,
        Parameters(params): Parameters<ListSessionsParams>,
    ) -> Result<CallToolResult, McpError> {
        let limit = params.limit.unwrap_or(20);
        let sessions = self.engine.sessions();
        let total = sessions.len();
        let page: Vec<_> = sessions.into_iter().take(limit).collect();
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "sessions": page,
            "total": total,
        }))
        .map_err(|e| mcp_err(e.to_string()))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(
        name = "get_project_sessions",
        description = "List audit sessions for one project, most recent first."
    )]
    pub fn get_project_sessions(
        &self,
        Parameters(params): Parameters<GetProjectSessionsParams>,
    ) -> Result<CallToolResult, McpError> {
        let sessions = self.engine.sessions_for_project(&params.project_id);
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "projectId": params.project_id,
            "sessions": sessions,
        }))
        .map_err(|e| mcp_err(e.to_string()))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(
        name = "export_audit_report",
        description = "Export one audit session as a report in json, html, or pdf (print-text) format, including summary counts by severity."
    )]
    pub fn export_audit_report(
        &self,
        Parameters(params): Parameters<ExportReportParams>,
    ) -> Result<CallToolResult, McpError> {
        let format: ReportFormat = params
            .format
            .as_deref()
            .unwrap_or("json")
            .parse()
            .map_err(mcp_err)?;
        let report = self
            .engine
            .export_report(&params.session_id, format)
            .map_err(|e| mcp_err(e.to_string()))?;
        let json = serde_json::to_string_pretty(&report).map_err(|e| mcp_err(e.to_string()))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}
