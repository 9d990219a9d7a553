//! Unified error type for boothmark.
//!
//! Concern-specific errors ([`FetchError`], [`MutationError`],
//! [`RemoteError`], [`ConfigError`]) convert into [`Error`], which carries a
//! code prefix in its message and maps onto a JSON-RPC error code.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

use crate::config::ConfigError;
use crate::remote::RemoteError;
use crate::sync::{FetchError, MutationError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty item id).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// No user is signed in.
    #[error("NOT_SIGNED_IN")]
    NotSignedIn,

    #[error("FETCH_FAILED: {0}")]
    Fetch(#[from] FetchError),

    /// A mutation was rolled back. The message is the user-facing failure text.
    #[error("MUTATION_FAILED: {0}")]
    Mutation(#[from] MutationError),

    /// Remote call outside a fetch or mutation (e.g., sign-out).
    #[error("REMOTE_ERROR: {0}")]
    Remote(#[from] RemoteError),

    /// Preference database operation failed.
    #[error("PREFS_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    #[error("PREFS_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    #[error("CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl Error {
    /// JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidInput(_) => -32602,
            Error::NotSignedIn => -32020,
            Error::Fetch(_) => -32021,
            Error::Mutation(_) => -32022,
            Error::Remote(_) => -32023,
            Error::Database(_) | Error::MigrationFailed(_) | Error::Config(_) => -32024,
        }
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = err.code();
        let message = match &err {
            Error::InvalidInput(msg) | Error::MigrationFailed(msg) => msg.clone(),
            Error::NotSignedIn => "No user is signed in".to_string(),
            Error::Fetch(e) => e.to_string(),
            Error::Mutation(e) => e.to_string(),
            Error::Remote(e) => e.to_string(),
            Error::Database(e) => e.to_string(),
            Error::Config(e) => e.to_string(),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemId;
    use crate::sync::Command;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("item_id must not be empty".to_string());
        assert!(err.to_string().starts_with("INVALID_INPUT"));
        assert!(err.to_string().contains("item_id"));
    }

    #[test]
    fn test_fetch_error_to_mcp_error() {
        let err = Error::from(FetchError::Items(RemoteError::rejected("JWT expired")));
        assert!(err.to_string().starts_with("FETCH_FAILED"));
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32021);
        assert!(mcp_err.message.contains("JWT expired"));
    }

    #[test]
    fn test_mutation_error_keeps_failure_text() {
        let err = Error::from(MutationError {
            command: Command::MarkVisited,
            item_id: ItemId::from("7"),
            source: RemoteError::rejected("permission denied"),
        });
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32022);
        assert_eq!(mcp_err.message, "Error marking as visited: permission denied");
    }

    #[test]
    fn test_invalid_input_code() {
        let mcp_err: McpError = Error::InvalidInput("x".into()).into();
        assert_eq!(mcp_err.code.0, -32602);
    }
}
