//! Core types and client-side sync for boothmark.
//!
//! This crate provides:
//! - The catalog data model and sorting
//! - A keyed cache of merged views with stale-fetch protection
//! - Optimistic favorite/visited mutations with rollback
//! - Sessions, persisted preferences and configuration
//! - Unified error types

pub mod config;
pub mod error;
pub mod model;
pub mod prefs;
pub mod remote;
pub mod session;
pub mod sort;
pub mod store;
pub mod sync;

pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use model::{AnnotatedItem, Annotation, AnnotationRow, Group, Item, ItemId, Price, UserId, ViewModel};
pub use prefs::PrefsDb;
pub use remote::{MemoryRemote, Remote, RemoteError};
pub use session::{CommandHandle, CommandStatus, Session, SignOut};
pub use sort::SortMode;
pub use store::{CacheKey, CacheStore, Resource};
pub use sync::{Command, FetchError, MutationError, Notification, NotificationLevel, Settled};
