//! Errors surfaced by the sync layer.

use crate::model::ItemId;
use crate::remote::RemoteError;

use super::Command;

/// A remote read failed; nothing was cached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("failed to load catalog: {0}")]
    Items(RemoteError),

    #[error("failed to load annotations: {0}")]
    Annotations(RemoteError),

    #[error("failed to load favorites: {0}")]
    Favorites(RemoteError),

    /// The fetch this caller joined was dropped before it settled.
    #[error("fetch interrupted before it settled")]
    Interrupted,
}

/// A remote write failed and the optimistic patch was rolled back.
///
/// Displays as the user-facing failure notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}: {source}", .command.failure_prefix())]
pub struct MutationError {
    pub command: Command,
    pub item_id: ItemId,
    pub source: RemoteError,
}
