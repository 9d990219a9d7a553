//! Keyed in-memory store of merged view models.
//!
//! One entry per `(resource, user)`. Every write replaces the whole view for
//! a key while holding the write lock, so readers never observe a partially
//! updated view. The store also carries the fetch bookkeeping the sync layer
//! relies on:
//!
//! - a generation per key; a fetch result only lands when the generation it
//!   started under is still current and the key was not removed meanwhile
//! - in-flight de-duplication; concurrent fetches of the same key share one
//!   remote round trip
//! - change events on a broadcast channel for presentation code

pub mod entry;
pub mod events;

pub use entry::{CachedView, FetchOutcome, FetchSlot, FetchTicket, join};
pub use events::{CacheEvent, CacheEventKind, KeyEvents};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast, watch};

use crate::model::{UserId, ViewModel};
use entry::{CacheEntry, InFlight};

/// Capacity of the change event channel.
const EVENT_CAPACITY: usize = 256;

/// Which remote read produced a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// The whole catalog merged with the user's annotations.
    AllItems,
    /// Only the user's favorited items.
    FavoritesOnly,
}

impl Resource {
    pub const ALL: [Resource; 2] = [Resource::AllItems, Resource::FavoritesOnly];

    pub fn as_str(self) -> &'static str {
        match self {
            Resource::AllItems => "all_items",
            Resource::FavoritesOnly => "favorites_only",
        }
    }
}

/// Cache key: a resource as seen by one user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub resource: Resource,
    pub user_id: UserId,
}

impl CacheKey {
    pub fn new(resource: Resource, user_id: UserId) -> Self {
        Self { resource, user_id }
    }

    /// Keys of every resource for one user.
    pub fn all_for(user_id: &UserId) -> Vec<CacheKey> {
        Resource::ALL.iter().map(|r| CacheKey::new(*r, user_id.clone())).collect()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource.as_str(), self.user_id)
    }
}

struct Inner {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    events: broadcast::Sender<CacheEvent>,
    next_fetch_id: AtomicU64,
    next_generation: AtomicU64,
}

/// Handle to a cache store. Clones share the same entries.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<Inner>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                events,
                next_fetch_id: AtomicU64::new(1),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    fn next_generation(&self) -> u64 {
        self.inner.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    fn entry_mut<'a>(&self, entries: &'a mut HashMap<CacheKey, CacheEntry>, key: &CacheKey) -> &'a mut CacheEntry {
        entries.entry(key.clone()).or_insert_with(|| CacheEntry::new(self.next_generation()))
    }

    fn emit(&self, key: &CacheKey, kind: CacheEventKind) {
        // No subscribers is fine.
        let _ = self.inner.events.send(CacheEvent { key: key.clone(), kind });
    }

    /// Subscribe to changes of every key.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Subscribe to changes of one key.
    pub fn watch_key(&self, key: CacheKey) -> KeyEvents {
        KeyEvents::new(key, self.inner.events.subscribe())
    }

    /// Current view for a key, if one was ever stored.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedView> {
        self.inner.entries.read().await.get(key).and_then(|e| e.cached.clone())
    }

    /// Replace the view for a key with authoritative data.
    ///
    /// Fetches started before this call will not overwrite it.
    pub async fn set(&self, key: CacheKey, view: ViewModel) {
        {
            let mut entries = self.inner.entries.write().await;
            let entry = self.entry_mut(&mut entries, &key);
            entry.generation = self.next_generation();
            entry.cached = Some(CachedView::fresh(Arc::new(view)));
        }
        tracing::debug!(%key, "cache entry replaced");
        self.emit(&key, CacheEventKind::Replaced);
    }

    /// Mark a key stale without dropping its view.
    ///
    /// Returns whether the key holds a view.
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        let invalidated = {
            let mut entries = self.inner.entries.write().await;
            match entries.get_mut(key).and_then(|e| e.cached.as_mut()) {
                Some(cached) => {
                    cached.stale = true;
                    true
                }
                None => false,
            }
        };
        if invalidated {
            tracing::debug!(%key, "cache entry invalidated");
            self.emit(key, CacheEventKind::Invalidated);
        }
        invalidated
    }

    /// Replace the view for a key with a patched copy.
    ///
    /// `patch` receives the current view and returns the replacement, or `None`
    /// to leave the entry untouched. Staleness and fetch time are kept.
    pub async fn patch(&self, key: &CacheKey, patch: impl FnOnce(&ViewModel) -> Option<ViewModel>) -> bool {
        let patched = {
            let mut entries = self.inner.entries.write().await;
            match entries.get_mut(key).and_then(|e| e.cached.as_mut()) {
                Some(cached) => match patch(&cached.view) {
                    Some(view) => {
                        cached.view = Arc::new(view);
                        true
                    }
                    None => false,
                },
                None => false,
            }
        };
        if patched {
            self.emit(key, CacheEventKind::Patched);
        }
        patched
    }

    /// Put a previously taken snapshot back in place.
    ///
    /// A `None` snapshot means the key held no view when it was taken; since
    /// patches never create views there is nothing to undo in that case. A key
    /// removed since the snapshot stays removed.
    pub async fn restore(&self, key: &CacheKey, snapshot: Option<CachedView>) {
        let Some(snapshot) = snapshot else {
            return;
        };
        let restored = {
            let mut entries = self.inner.entries.write().await;
            match entries.get_mut(key) {
                Some(entry) => {
                    entry.generation = self.next_generation();
                    entry.cached = Some(snapshot);
                    true
                }
                None => false,
            }
        };
        if restored {
            tracing::debug!(%key, "cache entry restored from snapshot");
            self.emit(key, CacheEventKind::Restored);
        } else {
            tracing::debug!(%key, "cache entry removed since snapshot, restore skipped");
        }
    }

    /// Supersede every fetch currently in flight for a key.
    ///
    /// Their results are discarded on arrival. Returns the new generation.
    pub async fn cancel_fetches(&self, key: &CacheKey) -> u64 {
        let mut entries = self.inner.entries.write().await;
        let generation = self.next_generation();
        self.entry_mut(&mut entries, key).generation = generation;
        generation
    }

    /// Start a fetch for a key, or join the one already running.
    pub async fn begin_fetch(&self, key: &CacheKey) -> FetchSlot {
        let ticket = {
            let mut entries = self.inner.entries.write().await;
            let entry = self.entry_mut(&mut entries, key);

            if let Some(in_flight) = &entry.in_flight
                && in_flight.joinable(entry.generation)
            {
                tracing::debug!(%key, fetch_id = in_flight.id, "joining in-flight fetch");
                return FetchSlot::Follower(in_flight.result.clone());
            }

            let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = watch::channel(None);
            entry.in_flight = Some(InFlight { id, generation: entry.generation, result: rx });
            FetchTicket { key: key.clone(), id, generation: entry.generation, tx }
        };
        tracing::debug!(%key, fetch_id = ticket.id, generation = ticket.generation, "fetch started");
        self.emit(key, CacheEventKind::FetchStarted);
        FetchSlot::Leader(ticket)
    }

    /// Publish a fetch result to joined callers and, when its generation is
    /// still current, store it.
    ///
    /// Failed fetches never touch the cached view, and a key removed while
    /// the fetch ran is not recreated. Returns whether the view was replaced.
    pub async fn finish_fetch(&self, ticket: FetchTicket, outcome: FetchOutcome) -> bool {
        ticket.tx.send_replace(Some(outcome.clone()));

        let applied = {
            let mut entries = self.inner.entries.write().await;
            let mut entry = entries.get_mut(&ticket.key);
            if let Some(entry) = entry.as_deref_mut()
                && entry.in_flight.as_ref().is_some_and(|f| f.id == ticket.id)
            {
                entry.in_flight = None;
            }

            match (entry, outcome) {
                (_, Err(_)) => None,
                (Some(entry), Ok(view)) if entry.generation == ticket.generation => {
                    entry.cached = Some(CachedView::fresh(view));
                    Some(true)
                }
                (_, Ok(_)) => Some(false),
            }
        };

        match applied {
            Some(true) => {
                tracing::debug!(key = %ticket.key, fetch_id = ticket.id, "fetch result stored");
                self.emit(&ticket.key, CacheEventKind::Replaced);
                true
            }
            Some(false) => {
                tracing::warn!(
                    key = %ticket.key,
                    fetch_id = ticket.id,
                    generation = ticket.generation,
                    "discarding fetch result for superseded generation or removed key"
                );
                self.emit(&ticket.key, CacheEventKind::Discarded);
                false
            }
            None => false,
        }
    }

    /// Drop every entry belonging to a user. Returns how many held a view.
    pub async fn remove_user(&self, user_id: &UserId) -> usize {
        let removed: Vec<(CacheKey, bool)> = {
            let mut entries = self.inner.entries.write().await;
            let keys: Vec<CacheKey> = entries.keys().filter(|k| &k.user_id == user_id).cloned().collect();
            keys.into_iter()
                .filter_map(|k| entries.remove(&k).map(|e| (k, e.cached.is_some())))
                .collect()
        };
        for (key, _) in &removed {
            self.emit(key, CacheEventKind::Removed);
        }
        removed.iter().filter(|(_, had_view)| *had_view).count()
    }

    /// Number of keys holding a view.
    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.values().filter(|e| e.cached.is_some()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
