//! Catalog fetch and merge.
//!
//! Reads the catalog (or the user's favorites) and the user's annotations
//! from the remote store and merges them into a publisher-grouped
//! [`ViewModel`]. Groups keep the order in which their publisher first
//! appears in the remote listing. Any failed read aborts the whole load.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{AnnotatedItem, Annotation, AnnotationRow, Group, Item, ItemId, UserId, ViewModel};
use crate::remote::Remote;
use crate::store::{CacheKey, CacheStore, FetchSlot, Resource, join};

use super::FetchError;

/// Merge the catalog with a user's annotation rows.
///
/// Items without a row get the default (unfavorited, unvisited) annotation.
pub fn merge_catalog(items: Vec<Item>, rows: &[AnnotationRow]) -> ViewModel {
    let annotations: HashMap<&ItemId, Annotation> = rows.iter().map(|row| (&row.item_id, row.annotation())).collect();

    group_by_publisher(items.into_iter().map(|item| {
        let annotation = annotations.get(&item.id).copied().unwrap_or_default();
        AnnotatedItem::new(item, annotation)
    }))
}

/// Group the favorites listing. Every entry is favorited by construction.
pub fn merge_favorites(rows: Vec<(Item, bool)>) -> ViewModel {
    group_by_publisher(
        rows.into_iter()
            .map(|(item, is_visited)| AnnotatedItem::new(item, Annotation::new(true, is_visited))),
    )
}

fn group_by_publisher(entries: impl IntoIterator<Item = AnnotatedItem>) -> ViewModel {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        let slot = match index.get(&entry.item.publisher) {
            Some(&slot) => slot,
            None => {
                index.insert(entry.item.publisher.clone(), groups.len());
                groups.push(Group {
                    key: entry.item.publisher.clone(),
                    location: entry.item.location.clone(),
                    items: Vec::new(),
                });
                groups.len() - 1
            }
        };
        groups[slot].items.push(entry);
    }

    ViewModel::new(groups)
}

/// Fetch and merge one resource for a user, bypassing the cache.
pub async fn load_view_model(remote: &dyn Remote, resource: Resource, user: &UserId) -> Result<ViewModel, FetchError> {
    match resource {
        Resource::AllItems => {
            let items = remote.list_items().await.map_err(FetchError::Items)?;
            let rows = remote.list_annotations(user).await.map_err(FetchError::Annotations)?;
            Ok(merge_catalog(items, &rows))
        }
        Resource::FavoritesOnly => {
            let rows = remote.list_favorited_items(user).await.map_err(FetchError::Favorites)?;
            Ok(merge_favorites(rows))
        }
    }
}

/// Cache-aware reads of merged views.
#[derive(Clone)]
pub struct Loader {
    remote: Arc<dyn Remote>,
    store: CacheStore,
}

impl Loader {
    pub fn new(remote: Arc<dyn Remote>, store: CacheStore) -> Self {
        Self { remote, store }
    }

    pub fn remote(&self) -> &dyn Remote {
        self.remote.as_ref()
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Cached view when fresh, otherwise fetch (or join a running fetch).
    pub async fn query(&self, resource: Resource, user: &UserId) -> Result<Arc<ViewModel>, FetchError> {
        let key = CacheKey::new(resource, user.clone());
        if let Some(cached) = self.store.get(&key).await
            && !cached.stale
        {
            return Ok(cached.view);
        }
        self.refresh(resource, user).await
    }

    /// Fetch authoritative data for a key and store it.
    ///
    /// When the result arrives after a mutation superseded the fetch, it is
    /// not stored and the caller gets the view the cache currently holds.
    pub async fn refresh(&self, resource: Resource, user: &UserId) -> Result<Arc<ViewModel>, FetchError> {
        let key = CacheKey::new(resource, user.clone());
        let ticket = match self.store.begin_fetch(&key).await {
            FetchSlot::Leader(ticket) => ticket,
            FetchSlot::Follower(rx) => return join(rx).await,
        };

        let outcome = load_view_model(self.remote(), resource, user).await.map(Arc::new);
        if let Err(err) = &outcome {
            tracing::warn!(%key, error = %err, "fetch failed");
        }

        if self.store.finish_fetch(ticket, outcome.clone()).await {
            return outcome;
        }
        match (outcome, self.store.get(&key).await) {
            (Ok(_), Some(current)) => Ok(current.view),
            (outcome, _) => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::item;
    use crate::remote::{MemoryRemote, RemoteError};

    fn catalog() -> Vec<Item> {
        vec![
            item("1", "Wingspan", "Stonemaier", Some("12")),
            item("2", "Azul", "Next Move", Some("3")),
            item("3", "Scythe", "Stonemaier", Some("14")),
            item("4", "Patchwork", "Lookout", None),
        ]
    }

    fn row(id: &str, is_visited: bool) -> AnnotationRow {
        AnnotationRow { item_id: ItemId::from(id), is_favorite: true, is_visited }
    }

    #[test]
    fn test_merge_single_item_scenario() {
        let view = merge_catalog(vec![item("1", "X", "A", None)], &[]);
        assert_eq!(view.groups.len(), 1);
        assert_eq!(view.groups[0].key, "A");
        assert_eq!(view.groups[0].items.len(), 1);
        assert_eq!(view.groups[0].items[0].item.title, "X");
        assert_eq!(view.groups[0].items[0].annotation, Annotation::new(false, false));
    }

    #[test]
    fn test_merge_groups_each_item_once() {
        let items = catalog();
        let rows = vec![row("1", true), row("2", false)];
        let view = merge_catalog(items.clone(), &rows);

        assert_eq!(view.item_count(), items.len());
        for item in &items {
            let matches: Vec<_> = view
                .groups
                .iter()
                .filter(|g| g.items.iter().any(|e| e.item.id == item.id))
                .collect();
            assert_eq!(matches.len(), 1);
            assert_eq!(matches[0].key, item.publisher);
        }

        assert_eq!(view.find(&"1".into()).unwrap().annotation, Annotation::new(true, true));
        assert_eq!(view.find(&"2".into()).unwrap().annotation, Annotation::new(true, false));
        assert_eq!(view.find(&"3".into()).unwrap().annotation, Annotation::default());
    }

    #[test]
    fn test_merge_preserves_first_seen_order() {
        let view = merge_catalog(catalog(), &[]);
        let keys: Vec<_> = view.groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["Stonemaier", "Next Move", "Lookout"]);
        assert_eq!(view.groups[0].location.as_deref(), Some("12"));
        let titles: Vec<_> = view.groups[0].items.iter().map(|e| e.item.title.as_str()).collect();
        assert_eq!(titles, vec!["Wingspan", "Scythe"]);
    }

    #[test]
    fn test_merge_favorites_marks_favorite() {
        let view = merge_favorites(vec![(item("2", "Azul", "Next Move", None), true)]);
        assert_eq!(view.find(&"2".into()).unwrap().annotation, Annotation::new(true, true));
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let remote = MemoryRemote::new(catalog());
        let user = UserId::from("u1");
        remote.set_row(&user, &"3".into(), Some(false)).await;

        let first = load_view_model(&remote, Resource::AllItems, &user).await.unwrap();
        let second = load_view_model(&remote, Resource::AllItems, &user).await.unwrap();
        assert_eq!(first, second);

        let favorites = load_view_model(&remote, Resource::FavoritesOnly, &user).await.unwrap();
        assert_eq!(favorites.item_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_read_aborts_load() {
        let remote = Arc::new(MemoryRemote::new(catalog()));
        let store = CacheStore::new();
        let loader = Loader::new(remote.clone(), store.clone());
        let user = UserId::from("u1");

        remote.fail_next_read(RemoteError::rejected("JWT expired")).await;
        let err = loader.query(Resource::AllItems, &user).await;
        assert!(matches!(err, Err(FetchError::Items(_))));

        assert!(store.get(&CacheKey::new(Resource::AllItems, user)).await.is_none());
    }

    #[tokio::test]
    async fn test_query_uses_cache_until_invalidated() {
        let remote = Arc::new(MemoryRemote::new(catalog()));
        let store = CacheStore::new();
        let loader = Loader::new(remote.clone(), store.clone());
        let user = UserId::from("u1");

        loader.query(Resource::AllItems, &user).await.unwrap();
        let reads = remote.read_count();
        loader.query(Resource::AllItems, &user).await.unwrap();
        assert_eq!(remote.read_count(), reads);

        remote.set_row(&user, &"1".into(), Some(false)).await;
        store.invalidate(&CacheKey::new(Resource::AllItems, user.clone())).await;
        let view = loader.query(Resource::AllItems, &user).await.unwrap();
        assert!(remote.read_count() > reads);
        assert!(view.find(&"1".into()).unwrap().annotation.is_favorite);
    }
}
