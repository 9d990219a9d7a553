//! MCP server handler implementation.
//!
//! Routes tool calls to the implementations in [`crate::tools`], all of which
//! act on the signed-in user's [`Session`].
use std::sync::Arc;

use boothmark_core::{Command, Session};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use crate::tools::{ItemParams, ViewParams, catalog_impl, command_impl, favorites_impl, sign_out_impl, toggle_sort_impl};

const INSTRUCTIONS: &str = "Browse a convention booth catalog and keep a personal list of favorite \
     booths. Use `catalog` or `favorites` to read, the item ids they return with the annotation \
     tools, and `toggle_sort` to switch between publisher and booth-number ordering. `sign_out` \
     ends the session.";

#[derive(Clone)]
pub struct BoothmarkServer {
    session: Arc<Session>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl BoothmarkServer {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session, tool_router: Self::tool_router() }
    }

    #[tool(description = "List the whole booth catalog grouped by publisher, with the user's favorite and visited flags.")]
    async fn catalog(&self, params: Parameters<ViewParams>) -> Result<CallToolResult, McpError> {
        catalog_impl(&self.session, params.0).await
    }

    #[tool(description = "List only the booths the user has favorited, grouped by publisher.")]
    async fn favorites(&self, params: Parameters<ViewParams>) -> Result<CallToolResult, McpError> {
        favorites_impl(&self.session, params.0).await
    }

    #[tool(description = "Add a catalog item to the user's favorites.")]
    async fn favorite(&self, params: Parameters<ItemParams>) -> Result<CallToolResult, McpError> {
        command_impl(&self.session, Command::Favorite, params.0).await
    }

    #[tool(description = "Remove a catalog item from the user's favorites. Clears its visited flag.")]
    async fn unfavorite(&self, params: Parameters<ItemParams>) -> Result<CallToolResult, McpError> {
        command_impl(&self.session, Command::Unfavorite, params.0).await
    }

    #[tool(description = "Mark a booth as visited. Also adds it to the favorites.")]
    async fn mark_visited(&self, params: Parameters<ItemParams>) -> Result<CallToolResult, McpError> {
        command_impl(&self.session, Command::MarkVisited, params.0).await
    }

    #[tool(description = "Mark a booth as not visited. The booth stays in the favorites.")]
    async fn mark_unvisited(&self, params: Parameters<ItemParams>) -> Result<CallToolResult, McpError> {
        command_impl(&self.session, Command::MarkUnvisited, params.0).await
    }

    #[tool(description = "Switch catalog ordering between publisher name and booth location. Returns the new mode.")]
    async fn toggle_sort(&self) -> Result<CallToolResult, McpError> {
        toggle_sort_impl(&self.session).await
    }

    #[tool(description = "Sign the user out. Drops cached views and ends the remote session; later calls fail.")]
    async fn sign_out(&self) -> Result<CallToolResult, McpError> {
        sign_out_impl(&self.session).await
    }
}

impl ServerHandler for BoothmarkServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "boothmark".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(INSTRUCTIONS.into()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{remote, session};

    #[tokio::test]
    async fn test_lists_every_tool() {
        let server = BoothmarkServer::new(Arc::new(session(remote()).await));
        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["catalog", "favorite", "favorites", "mark_unvisited", "mark_visited", "sign_out", "toggle_sort", "unfavorite"]
        );
    }

    #[tokio::test]
    async fn test_server_info() {
        let server = BoothmarkServer::new(Arc::new(session(remote()).await));
        let info = server.get_info();
        assert_eq!(info.server_info.name, "boothmark");
        assert!(info.capabilities.tools.is_some());
    }
}
