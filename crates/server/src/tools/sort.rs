//! toggle_sort tool implementation.

use boothmark_core::{Error, Session, SortMode};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToggleSortOutput {
    /// Sort mode now in effect.
    pub sort_mode: SortMode,
}

/// Flip between publisher and location ordering and persist the choice.
pub async fn toggle_sort_impl(session: &Session) -> Result<CallToolResult, McpError> {
    let sort_mode = session.toggle_sort().await?;

    let json = serde_json::to_string_pretty(&ToggleSortOutput { sort_mode })
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize sort mode: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::catalog::{ViewOutput, ViewParams, catalog_impl};
    use crate::tools::testing::{output_of, remote, session};

    #[tokio::test]
    async fn test_toggle_sort_reorders_catalog() {
        let session = session(remote()).await;

        let output: ToggleSortOutput = output_of(toggle_sort_impl(&session).await.unwrap());
        assert_eq!(output.sort_mode, SortMode::ByLocation);

        let view: ViewOutput = output_of(catalog_impl(&session, ViewParams::default()).await.unwrap());
        let publishers: Vec<_> = view.groups.iter().map(|g| g.publisher.as_str()).collect();
        assert_eq!(publishers, vec!["Next Move", "Stonemaier", "Lookout"]);

        let output: ToggleSortOutput = output_of(toggle_sort_impl(&session).await.unwrap());
        assert_eq!(output.sort_mode, SortMode::ByPublisher);
    }
}
