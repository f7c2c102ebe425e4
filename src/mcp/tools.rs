/// MCP tool handlers for CodeCompass.
///
/// 1. get_architectural_context – structural neighbors of a file
/// 2. semantic_search           – ranked files for a keyword query
///
/// Both return the same text the CLI prints. Navigation calls are blocking
/// (SQLite or a synchronous socket) and run on the blocking pool.
use crate::db::Direction;
use crate::error::NavError;
use crate::mcp::server::McpContext;
use crate::navigator::Navigator;
use crate::render;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct ContextParams {
    /// Repository-relative file path, e.g. 'app/services/auth.py'
    file_path: String,
    /// Direction: in | out | both (default: both)
    direction: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
struct SearchParams {
    /// Keywords describing the code you are looking for
    query: String,
    /// Max files to return (default: 8)
    top_n: Option<usize>,
}

// ── Response helpers ─────────────────────────────────────────────────

fn text_result(text: String) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

/// Runs a navigation call off the async executor.
async fn blocking<T, F>(nav: &Arc<Navigator>, f: F) -> Result<Result<T, NavError>, McpError>
where
    T: Send + 'static,
    F: FnOnce(&Navigator) -> Result<T, NavError> + Send + 'static,
{
    let nav = Arc::clone(nav);
    tokio::task::spawn_blocking(move || f(&nav))
        .await
        .map_err(|e| McpError::internal_error(format!("navigation task failed: {e}"), None))
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    // ── Tool 1: get_architectural_context ───────────────────────────

    #[tool(
        description = "List the files structurally connected to a file through IMPORTS, INHERITS and INSTANTIATES edges. Use before editing a file to see what depends on it and what it depends on."
    )]
    async fn get_architectural_context(
        &self,
        params: Parameters<ContextParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.file_path.trim().is_empty() {
            return error_result("file_path is required");
        }
        let direction = match p.direction.as_deref().unwrap_or("both").parse::<Direction>() {
            Ok(d) => d,
            Err(e) => return error_result(&e.to_string()),
        };

        let path = p.file_path.clone();
        match blocking(&self.ctx.navigator, move |nav| nav.neighbors(&path, direction)).await? {
            Ok(rows) if rows.is_empty() => text_result(render::no_neighbors_message(&p.file_path)),
            Ok(rows) => {
                debug!("{} neighbors for {}", rows.len(), p.file_path);
                text_result(render::render_neighbors(&p.file_path, &rows))
            }
            Err(e) => error_result(&e.to_string()),
        }
    }

    // ── Tool 2: semantic_search ─────────────────────────────────────

    #[tool(
        description = "Keyword (BM25) search over indexed source chunks. Returns the best-matching files, one line per file with its score."
    )]
    async fn semantic_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.query.trim().is_empty() {
            return error_result("query is required");
        }
        let top_n = p.top_n.unwrap_or(self.ctx.config.search_top_k);

        let query = p.query.clone();
        match blocking(&self.ctx.navigator, move |nav| nav.search(&query, top_n)).await? {
            Ok(hits) if hits.is_empty() => text_result(render::no_results_message(&p.query)),
            Ok(hits) => text_result(render::render_search(&p.query, &hits)),
            Err(e) => error_result(&e.to_string()),
        }
    }
}
