//! Optimistic favorite/visited mutations.
//!
//! Every command runs the same protocol against both cached resources of the
//! user:
//!
//! 1. snapshot the cached views
//! 2. supersede in-flight fetches so they cannot overwrite the patch
//! 3. rewrite the target item's annotation in every cached view
//! 4. issue the remote write
//! 5. on success, notify and refetch every cached key (reconciliation),
//!    superseding any fetch that started while the write was in flight
//! 6. on failure, put the snapshots back and notify
//!
//! Overlapping mutations on the same item are not serialized; whichever
//! settles last decides the cached state.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{Annotation, ItemId, UserId};
use crate::remote::{Remote, RemoteError};
use crate::store::{CacheKey, CacheStore, CachedView};

use super::loader::Loader;
use super::pending::PendingMutations;
use super::MutationError;

/// Capacity of the notification channel.
const NOTIFICATION_CAPACITY: usize = 64;

/// A user-facing annotation change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Favorite,
    Unfavorite,
    MarkVisited,
    MarkUnvisited,
}

impl Command {
    pub fn favorite(value: bool) -> Self {
        if value { Command::Favorite } else { Command::Unfavorite }
    }

    pub fn visited(value: bool) -> Self {
        if value { Command::MarkVisited } else { Command::MarkUnvisited }
    }

    /// Annotation the item is expected to have once the write lands.
    ///
    /// Deleting the row clears the visited flag with it; writing the visited
    /// flag creates the row, which favorites the item.
    pub fn apply(self, current: Annotation) -> Annotation {
        match self {
            Command::Favorite => Annotation { is_favorite: true, ..current },
            Command::Unfavorite => Annotation::new(false, false),
            Command::MarkVisited => Annotation::new(true, true),
            Command::MarkUnvisited => Annotation::new(true, false),
        }
    }

    async fn write(self, remote: &dyn Remote, user: &UserId, item: &ItemId) -> Result<(), RemoteError> {
        match self {
            Command::Favorite => remote.insert_favorite(user, item).await,
            Command::Unfavorite => remote.delete_favorite(user, item).await,
            Command::MarkVisited => remote.upsert_annotation(user, item, true).await,
            Command::MarkUnvisited => remote.upsert_annotation(user, item, false).await,
        }
    }

    pub fn success_message(self, title: &str) -> String {
        match self {
            Command::Favorite => format!("Added \"{title}\" to favorites!"),
            Command::Unfavorite => format!("Removed \"{title}\" from favorites"),
            Command::MarkVisited => format!("Marked \"{title}\" as visited"),
            Command::MarkUnvisited => format!("Marked \"{title}\" as not visited"),
        }
    }

    pub fn failure_prefix(self) -> &'static str {
        match self {
            Command::Favorite => "Error adding to favorites",
            Command::Unfavorite => "Error removing from favorites",
            Command::MarkVisited => "Error marking as visited",
            Command::MarkUnvisited => "Error marking as not visited",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Favorite => "favorite",
            Command::Unfavorite => "unfavorite",
            Command::MarkVisited => "mark_visited",
            Command::MarkUnvisited => "mark_unvisited",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Error,
}

/// Passive message for the presentation layer (a toast).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Notification {
    pub level: NotificationLevel,
    pub command: Command,
    pub item_id: ItemId,
    pub message: String,
}

/// A mutation whose remote write succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub command: Command,
    pub item_id: ItemId,
    pub message: String,
}

/// Runs commands with optimistic cache updates.
#[derive(Clone)]
pub struct MutationEngine {
    loader: Loader,
    pending: PendingMutations,
    notifications: broadcast::Sender<Notification>,
}

impl MutationEngine {
    pub fn new(loader: Loader) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self { loader, pending: PendingMutations::new(), notifications }
    }

    fn store(&self) -> &CacheStore {
        self.loader.store()
    }

    pub fn pending(&self) -> &PendingMutations {
        &self.pending
    }

    /// Receive a notification for every settled mutation.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub async fn set_favorite(&self, user: &UserId, item: &ItemId, value: bool) -> Result<Settled, MutationError> {
        self.execute(Command::favorite(value), user, item).await
    }

    pub async fn set_visited(&self, user: &UserId, item: &ItemId, value: bool) -> Result<Settled, MutationError> {
        self.execute(Command::visited(value), user, item).await
    }

    /// Run one command through the optimistic protocol.
    pub async fn execute(&self, command: Command, user: &UserId, item: &ItemId) -> Result<Settled, MutationError> {
        let _pending = self.pending.begin(user, item);
        let keys = CacheKey::all_for(user);

        let mut snapshot: Vec<(CacheKey, Option<CachedView>)> = Vec::with_capacity(keys.len());
        for key in &keys {
            snapshot.push((key.clone(), self.store().get(key).await));
        }

        for key in &keys {
            self.store().cancel_fetches(key).await;
        }

        for key in &keys {
            let patched = self
                .store()
                .patch(key, |view| view.with_annotation(item, |current| command.apply(current)))
                .await;
            if !patched {
                tracing::debug!(%key, item_id = %item, "item not cached under key, optimistic patch skipped");
            }
        }

        let title = snapshot
            .iter()
            .find_map(|(_, cached)| cached.as_ref().and_then(|c| c.view.find(item)))
            .map(|entry| entry.item.title.clone())
            .unwrap_or_else(|| item.to_string());

        match command.write(self.loader.remote(), user, item).await {
            Ok(()) => {
                let message = command.success_message(&title);
                tracing::info!(%command, user_id = %user, item_id = %item, "mutation settled");
                self.notify(NotificationLevel::Success, command, item, message.clone());
                self.reconcile(&keys).await;
                Ok(Settled { command, item_id: item.clone(), message })
            }
            Err(source) => {
                for (key, cached) in snapshot {
                    self.store().restore(&key, cached).await;
                }
                let err = MutationError { command, item_id: item.clone(), source };
                tracing::warn!(%command, user_id = %user, item_id = %item, error = %err, "mutation rolled back");
                self.notify(NotificationLevel::Error, command, item, err.to_string());
                Err(err)
            }
        }
    }

    fn notify(&self, level: NotificationLevel, command: Command, item: &ItemId, message: String) {
        let _ = self.notifications.send(Notification { level, command, item_id: item.clone(), message });
    }

    /// Replace optimistic state with authoritative data for every cached key.
    ///
    /// Keys nobody has loaded are skipped. A failed refetch leaves the key
    /// stale with the optimistic view in place.
    async fn reconcile(&self, keys: &[CacheKey]) {
        for key in keys {
            if !self.store().invalidate(key).await {
                continue;
            }
            // A fetch started while the write was in flight may hold pre-write
            // rows; the refetch must lead its own.
            self.store().cancel_fetches(key).await;
            if let Err(err) = self.loader.refresh(key.resource, &key.user_id).await {
                tracing::warn!(%key, error = %err, "refresh after mutation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::model::fixtures::item;
    use crate::remote::MemoryRemote;
    use crate::store::{CacheEventKind, Resource};

    struct Harness {
        remote: Arc<MemoryRemote>,
        loader: Loader,
        engine: MutationEngine,
        user: UserId,
    }

    impl Harness {
        fn new() -> Self {
            let remote = Arc::new(MemoryRemote::new(vec![
                item("1", "X", "A", Some("10")),
                item("2", "Y", "B", Some("2")),
            ]));
            let loader = Loader::new(remote.clone(), CacheStore::new());
            let engine = MutationEngine::new(loader.clone());
            Self { remote, loader, engine, user: UserId::from("u1") }
        }

        fn key(&self, resource: Resource) -> CacheKey {
            CacheKey::new(resource, self.user.clone())
        }

        async fn annotation(&self, resource: Resource, id: &str) -> Option<Annotation> {
            let cached = self.loader.store().get(&self.key(resource)).await?;
            cached.view.find(&ItemId::from(id)).map(|entry| entry.annotation)
        }
    }

    #[test]
    fn test_command_patches() {
        let visited = Annotation::new(true, true);
        assert_eq!(Command::Favorite.apply(Annotation::default()), Annotation::new(true, false));
        assert_eq!(Command::Favorite.apply(visited), visited);
        assert_eq!(Command::Unfavorite.apply(visited), Annotation::default());
        assert_eq!(Command::MarkVisited.apply(Annotation::default()), visited);
        assert_eq!(Command::MarkUnvisited.apply(visited), Annotation::new(true, false));
    }

    #[test]
    fn test_command_from_flag() {
        assert_eq!(Command::favorite(true), Command::Favorite);
        assert_eq!(Command::favorite(false), Command::Unfavorite);
        assert_eq!(Command::visited(true), Command::MarkVisited);
        assert_eq!(Command::visited(false), Command::MarkUnvisited);
    }

    #[tokio::test]
    async fn test_optimistic_patch_visible_before_write_settles() {
        let h = Harness::new();
        h.loader.query(Resource::AllItems, &h.user).await.unwrap();
        let mut events = h.loader.store().watch_key(h.key(Resource::AllItems));

        h.remote.pause_writes();
        let engine = h.engine.clone();
        let user = h.user.clone();
        let task = tokio::spawn(async move { engine.set_favorite(&user, &ItemId::from("1"), true).await });

        assert!(events.wait_for(CacheEventKind::Patched).await);
        assert_eq!(h.annotation(Resource::AllItems, "1").await, Some(Annotation::new(true, false)));
        assert!(h.engine.pending().is_pending(&h.user, &ItemId::from("1")));

        h.remote.resume_writes();
        let settled = task.await.unwrap().unwrap();
        assert_eq!(settled.message, "Added \"X\" to favorites!");
        assert_eq!(h.annotation(Resource::AllItems, "1").await, Some(Annotation::new(true, false)));
        assert!(!h.engine.pending().is_pending(&h.user, &ItemId::from("1")));
    }

    #[tokio::test]
    async fn test_failed_write_restores_snapshot() {
        let h = Harness::new();
        h.remote.set_row(&h.user, &"2".into(), Some(true)).await;
        h.loader.query(Resource::AllItems, &h.user).await.unwrap();
        h.loader.query(Resource::FavoritesOnly, &h.user).await.unwrap();

        let before_all = h.loader.store().get(&h.key(Resource::AllItems)).await;
        let before_favorites = h.loader.store().get(&h.key(Resource::FavoritesOnly)).await;
        let mut notifications = h.engine.notifications();

        h.remote.fail_next_write(RemoteError::rejected("new row violates row-level security policy")).await;
        let err = h.engine.set_visited(&h.user, &ItemId::from("2"), false).await.unwrap_err();

        assert_eq!(err.command, Command::MarkUnvisited);
        assert_eq!(h.loader.store().get(&h.key(Resource::AllItems)).await, before_all);
        assert_eq!(h.loader.store().get(&h.key(Resource::FavoritesOnly)).await, before_favorites);

        let notification = notifications.recv().await.unwrap();
        assert_eq!(notification.level, NotificationLevel::Error);
        assert_eq!(
            notification.message,
            "Error marking as not visited: new row violates row-level security policy"
        );
    }

    #[tokio::test]
    async fn test_scenario_favorite_then_failure_reverts() {
        let remote = Arc::new(MemoryRemote::new(vec![item("1", "X", "A", None)]));
        let loader = Loader::new(remote.clone(), CacheStore::new());
        let engine = MutationEngine::new(loader.clone());
        let user = UserId::from("u1");
        let key = CacheKey::new(Resource::AllItems, user.clone());

        let view = loader.query(Resource::AllItems, &user).await.unwrap();
        assert_eq!(view.find(&"1".into()).unwrap().annotation, Annotation::new(false, false));

        let mut events = loader.store().watch_key(key.clone());
        remote.pause_writes();
        remote.fail_next_write(RemoteError::rejected("offline")).await;
        let task = {
            let engine = engine.clone();
            let user = user.clone();
            tokio::spawn(async move { engine.set_favorite(&user, &ItemId::from("1"), true).await })
        };

        assert!(events.wait_for(CacheEventKind::Patched).await);
        let patched = loader.store().get(&key).await.unwrap();
        assert!(patched.view.find(&"1".into()).unwrap().annotation.is_favorite);

        remote.resume_writes();
        assert!(task.await.unwrap().is_err());
        let reverted = loader.store().get(&key).await.unwrap();
        assert!(!reverted.view.find(&"1".into()).unwrap().annotation.is_favorite);
    }

    #[tokio::test]
    async fn test_success_reconciles_with_server_state() {
        let h = Harness::new();
        h.loader.query(Resource::AllItems, &h.user).await.unwrap();
        h.loader.query(Resource::FavoritesOnly, &h.user).await.unwrap();

        // Another client marks item 2 visited while our favorite is in flight.
        h.remote.set_row(&h.user, &"2".into(), Some(true)).await;
        h.engine.set_favorite(&h.user, &ItemId::from("1"), true).await.unwrap();

        assert_eq!(h.annotation(Resource::AllItems, "1").await, Some(Annotation::new(true, false)));
        assert_eq!(h.annotation(Resource::AllItems, "2").await, Some(Annotation::new(true, true)));
        assert_eq!(h.annotation(Resource::FavoritesOnly, "2").await, Some(Annotation::new(true, true)));

        let cached = h.loader.store().get(&h.key(Resource::FavoritesOnly)).await.unwrap();
        assert!(!cached.stale);
        assert_eq!(cached.view.item_count(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_favorite_rolls_back() {
        let h = Harness::new();
        h.remote.set_row(&h.user, &"1".into(), Some(true)).await;
        h.loader.query(Resource::AllItems, &h.user).await.unwrap();

        // Favoriting an already favorited item is rejected by the store as a
        // duplicate, so the patch rolls back to the visited state.
        let err = h.engine.set_favorite(&h.user, &ItemId::from("1"), true).await.unwrap_err();
        assert!(matches!(err.source, RemoteError::Rejected { status: Some(409), .. }));
        assert_eq!(h.annotation(Resource::AllItems, "1").await, Some(Annotation::new(true, true)));
    }

    #[tokio::test]
    async fn test_unfavorite_in_favorites_view() {
        let h = Harness::new();
        h.remote.set_row(&h.user, &"1".into(), Some(true)).await;
        h.loader.query(Resource::FavoritesOnly, &h.user).await.unwrap();

        let settled = h.engine.set_favorite(&h.user, &ItemId::from("1"), false).await.unwrap();
        assert_eq!(settled.message, "Removed \"X\" from favorites");

        let cached = h.loader.store().get(&h.key(Resource::FavoritesOnly)).await.unwrap();
        assert!(cached.view.is_empty());
        assert_eq!(h.remote.row(&h.user, &"1".into()).await, None);
    }

    #[tokio::test]
    async fn test_stale_fetch_does_not_overwrite_patch() {
        let h = Harness::new();
        h.loader.query(Resource::AllItems, &h.user).await.unwrap();
        let key = h.key(Resource::AllItems);
        let mut events = h.loader.store().watch_key(key.clone());

        // A refetch starts and stalls on the remote.
        h.remote.pause_reads();
        let stale_fetch = {
            let loader = h.loader.clone();
            let user = h.user.clone();
            tokio::spawn(async move { loader.refresh(Resource::AllItems, &user).await })
        };
        assert!(events.wait_for(CacheEventKind::FetchStarted).await);

        // The mutation patches and stalls on its write.
        h.remote.pause_writes();
        let mutation = {
            let engine = h.engine.clone();
            let user = h.user.clone();
            tokio::spawn(async move { engine.set_visited(&user, &ItemId::from("1"), true).await })
        };
        assert!(events.wait_for(CacheEventKind::Patched).await);

        // The stalled fetch completes with pre-mutation data and is dropped.
        h.remote.resume_reads();
        assert!(events.wait_for(CacheEventKind::Discarded).await);
        let returned = stale_fetch.await.unwrap().unwrap();
        assert_eq!(returned.find(&"1".into()).unwrap().annotation, Annotation::new(true, true));
        assert_eq!(h.annotation(Resource::AllItems, "1").await, Some(Annotation::new(true, true)));

        h.remote.resume_writes();
        mutation.await.unwrap().unwrap();
        assert_eq!(h.annotation(Resource::AllItems, "1").await, Some(Annotation::new(true, true)));
        assert_eq!(h.remote.row(&h.user, &"1".into()).await, Some(true));
    }

    #[tokio::test]
    async fn test_settle_refresh_ignores_fetch_started_during_write() {
        let h = Harness::new();
        h.loader.query(Resource::AllItems, &h.user).await.unwrap();
        let mut events = h.loader.store().watch_key(h.key(Resource::AllItems));

        h.remote.pause_writes();
        let mutation = {
            let engine = h.engine.clone();
            let user = h.user.clone();
            tokio::spawn(async move { engine.set_favorite(&user, &ItemId::from("1"), true).await })
        };
        assert!(events.wait_for(CacheEventKind::Patched).await);

        // A refresh starts after the patch and answers with the pre-write rows.
        h.remote.hold_rows();
        let early = {
            let loader = h.loader.clone();
            let user = h.user.clone();
            tokio::spawn(async move { loader.refresh(Resource::AllItems, &user).await })
        };
        h.remote.wait_for_held(1).await;

        // The write lands and the settle refresh reads the new row.
        h.remote.resume_writes();
        tokio::time::timeout(Duration::from_secs(5), h.remote.wait_for_held(2))
            .await
            .expect("settle refresh should run its own fetch");
        h.remote.release_rows();

        mutation.await.unwrap().unwrap();
        early.await.unwrap().unwrap();
        assert_eq!(h.remote.row(&h.user, &"1".into()).await, Some(false));

        let cached = h.loader.store().get(&h.key(Resource::AllItems)).await.unwrap();
        assert!(!cached.stale);
        assert_eq!(cached.view.find(&"1".into()).unwrap().annotation, Annotation::new(true, false));
    }

    #[tokio::test]
    async fn test_uncached_item_uses_id_in_message() {
        let h = Harness::new();
        let settled = h.engine.set_visited(&h.user, &ItemId::from("2"), true).await.unwrap();
        assert_eq!(settled.message, "Marked \"2\" as visited");
        assert!(h.loader.store().is_empty().await);
    }
}
