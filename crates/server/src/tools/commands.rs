//! favorite, unfavorite, mark_visited and mark_unvisited tool implementations.
//!
//! Each tool runs one command through the session and waits for it to
//! settle. The success notification text is returned as the result; a rolled
//! back mutation becomes a tool error carrying the failure text.

use boothmark_core::{Command, Error, ItemId, Session};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the annotation commands.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ItemParams {
    /// Id of the catalog item, as returned by the catalog tool.
    pub item_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommandOutput {
    pub command: Command,
    pub item_id: String,
    /// User-facing notification text.
    pub message: String,
}

/// Implementation shared by the command tools.
pub async fn command_impl(session: &Session, command: Command, params: ItemParams) -> Result<CallToolResult, McpError> {
    let item_id = params.item_id.trim();
    if item_id.is_empty() {
        return Err(Error::InvalidInput("item_id must not be empty".into()).into());
    }

    let settled = session.execute(command, &ItemId::from(item_id)).await?;

    let output = CommandOutput { command, item_id: settled.item_id.to_string(), message: settled.message };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize result: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
