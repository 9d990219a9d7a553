//! Change notifications for cache subscribers.

use tokio::sync::broadcast;

use super::CacheKey;

/// What happened to a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
    /// A fetch for the key was started.
    FetchStarted,
    /// Authoritative data replaced the entry.
    Replaced,
    /// An optimistic patch rewrote an item's annotation.
    Patched,
    /// The entry was marked stale.
    Invalidated,
    /// The entry was rolled back to a snapshot.
    Restored,
    /// A fetch result arrived for a superseded generation and was dropped.
    Discarded,
    /// The entry was removed.
    Removed,
}

/// A change to one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub key: CacheKey,
    pub kind: CacheEventKind,
}

/// Event stream filtered to a single key.
pub struct KeyEvents {
    key: CacheKey,
    rx: broadcast::Receiver<CacheEvent>,
}

impl KeyEvents {
    pub(crate) fn new(key: CacheKey, rx: broadcast::Receiver<CacheEvent>) -> Self {
        Self { key, rx }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Wait for the next change to the key.
    ///
    /// Returns `None` once the store is gone. Events missed because the
    /// subscriber lagged are skipped; the caller re-reads the entry anyway.
    pub async fn next(&mut self) -> Option<CacheEventKind> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.key == self.key => return Some(event.kind),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(key = %self.key, skipped, "cache subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Wait until an event of the given kind arrives for the key.
    pub async fn wait_for(&mut self, kind: CacheEventKind) -> bool {
        while let Some(next) = self.next().await {
            if next == kind {
                return true;
            }
        }
        false
    }
}
