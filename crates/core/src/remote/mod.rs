//! Remote data store capability.
//!
//! The catalog and the per-user annotations live in a remote store. This
//! module defines the operations the sync layer consumes, so the HTTP client
//! and the in-memory store used by tests are interchangeable.
//!
//! Favoriting is modeled as row existence: inserting a row favorites an item,
//! deleting it unfavorites. The visited flag is a column on that row, and
//! [`Remote::upsert_annotation`] creates the row when it is missing.

pub mod memory;

pub use memory::MemoryRemote;

use async_trait::async_trait;

use crate::model::{AnnotationRow, Item, ItemId, UserId};

/// Errors reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The store answered and refused the request.
    #[error("{message}")]
    Rejected { status: Option<u16>, message: String },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The response could not be decoded.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// The store is not reachable in the current configuration.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    pub fn rejected(message: impl Into<String>) -> Self {
        RemoteError::Rejected { status: None, message: message.into() }
    }
}

/// Operations of the remote store, all keyed by `(user, item)` uniqueness.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Every catalog item, ordered by publisher.
    async fn list_items(&self) -> Result<Vec<Item>, RemoteError>;

    /// All annotation rows of one user.
    async fn list_annotations(&self, user: &UserId) -> Result<Vec<AnnotationRow>, RemoteError>;

    /// The user's favorited items with their visited flag.
    async fn list_favorited_items(&self, user: &UserId) -> Result<Vec<(Item, bool)>, RemoteError>;

    /// Create or update the visited flag. Safe to call when no row exists.
    async fn upsert_annotation(&self, user: &UserId, item: &ItemId, is_visited: bool) -> Result<(), RemoteError>;

    async fn insert_favorite(&self, user: &UserId, item: &ItemId) -> Result<(), RemoteError>;

    async fn delete_favorite(&self, user: &UserId, item: &ItemId) -> Result<(), RemoteError>;
}
