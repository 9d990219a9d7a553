//! Client-side synchronization between the cache and the remote store.
//!
//! - [`loader`] fetches and merges views and keeps the cache filled
//! - [`mutation`] applies commands optimistically, then reconciles or rolls back
//! - [`pending`] lets callers see which items have a mutation in flight

pub mod error;
pub mod loader;
pub mod mutation;
pub mod pending;

pub use error::{FetchError, MutationError};
pub use loader::{Loader, load_view_model, merge_catalog, merge_favorites};
pub use mutation::{Command, MutationEngine, Notification, NotificationLevel, Settled};
pub use pending::{PendingGuard, PendingMutations};
