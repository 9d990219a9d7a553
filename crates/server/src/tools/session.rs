//! sign_out tool implementation.

use boothmark_core::{Error, Session};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SignOutOutput {
    pub user_id: String,
    pub signed_out: bool,
}

/// End the session: drop the user's cached views and log out remotely.
///
/// Every later tool call fails with the not-signed-in error.
pub async fn sign_out_impl(session: &Session) -> Result<CallToolResult, McpError> {
    session.sign_out().await?;

    let output = SignOutOutput { user_id: session.user_id().to_string(), signed_out: !session.is_active() };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize result: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use rmcp::model::ErrorCode;

    use super::*;
    use crate::tools::catalog::{ViewParams, catalog_impl};
    use crate::tools::testing::{output_of, remote, session};

    #[tokio::test]
    async fn test_sign_out_ends_session() {
        let session = session(remote()).await;
        catalog_impl(&session, ViewParams::default()).await.unwrap();

        let output: SignOutOutput = output_of(sign_out_impl(&session).await.unwrap());
        assert_eq!(output.user_id, "u1");
        assert!(output.signed_out);
        assert!(session.store().is_empty().await);

        let err = catalog_impl(&session, ViewParams::default()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode(-32020));
        assert_eq!(err.message, "No user is signed in");

        // Signing out twice is harmless.
        assert!(sign_out_impl(&session).await.is_ok());
    }
}
