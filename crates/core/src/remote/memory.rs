//! In-process remote store.
//!
//! Behaves like the hosted store (publisher ordering, row-existence
//! favorites, duplicate and foreign-key rejections) and adds controls for
//! exercising the sync layer: reads and writes can be paused, per-user reads
//! can be answered now and delivered later, the next read or write can be made
//! to fail, and rows can be changed behind the client's back.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};

use super::{Remote, RemoteError};
use crate::model::{AnnotationRow, Item, ItemId, UserId};

#[derive(Debug, Default)]
struct State {
    items: Vec<Item>,
    /// `(user, item) -> is_visited`; presence means favorited.
    rows: BTreeMap<(UserId, ItemId), bool>,
    fail_next_read: Option<RemoteError>,
    fail_next_write: Option<RemoteError>,
}

/// In-memory implementation of [`Remote`].
#[derive(Debug)]
pub struct MemoryRemote {
    state: Mutex<State>,
    reads_paused: watch::Sender<bool>,
    writes_paused: watch::Sender<bool>,
    rows_held: watch::Sender<bool>,
    holding: watch::Sender<usize>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MemoryRemote {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            state: Mutex::new(State { items, ..Default::default() }),
            reads_paused: watch::Sender::new(false),
            writes_paused: watch::Sender::new(false),
            rows_held: watch::Sender::new(false),
            holding: watch::Sender::new(0),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Set a row directly, as another client would. `None` deletes it.
    pub async fn set_row(&self, user: &UserId, item: &ItemId, is_visited: Option<bool>) {
        let mut state = self.state.lock().await;
        let key = (user.clone(), item.clone());
        match is_visited {
            Some(visited) => {
                state.rows.insert(key, visited);
            }
            None => {
                state.rows.remove(&key);
            }
        }
    }

    /// Current row for `(user, item)`: `Some(is_visited)` when favorited.
    pub async fn row(&self, user: &UserId, item: &ItemId) -> Option<bool> {
        self.state.lock().await.rows.get(&(user.clone(), item.clone())).copied()
    }

    pub async fn fail_next_read(&self, err: RemoteError) {
        self.state.lock().await.fail_next_read = Some(err);
    }

    pub async fn fail_next_write(&self, err: RemoteError) {
        self.state.lock().await.fail_next_write = Some(err);
    }

    /// Hold every read until [`MemoryRemote::resume_reads`].
    pub fn pause_reads(&self) {
        self.reads_paused.send_replace(true);
    }

    pub fn resume_reads(&self) {
        self.reads_paused.send_replace(false);
    }

    /// Hold every write until [`MemoryRemote::resume_writes`].
    pub fn pause_writes(&self) {
        self.writes_paused.send_replace(true);
    }

    pub fn resume_writes(&self) {
        self.writes_paused.send_replace(false);
    }

    /// Answer per-user reads from the rows as they are now, but deliver the
    /// answer only after [`MemoryRemote::release_rows`].
    pub fn hold_rows(&self) {
        self.rows_held.send_replace(true);
    }

    pub fn release_rows(&self) {
        self.rows_held.send_replace(false);
    }

    /// Wait until `count` per-user reads have their answer and are held.
    pub async fn wait_for_held(&self, count: usize) {
        let mut holding = self.holding.subscribe();
        let _ = holding.wait_for(|held| *held >= count).await;
    }

    async fn deliver<T>(&self, answer: T) -> T {
        let held = *self.rows_held.borrow();
        if !held {
            return answer;
        }
        self.holding.send_modify(|held| *held += 1);
        let mut released = self.rows_held.subscribe();
        let _ = released.wait_for(|held| !*held).await;
        self.holding.send_modify(|held| *held -= 1);
        answer
    }

    /// Number of read operations started.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of write operations started.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn begin_read(&self) -> Result<(), RemoteError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut paused = self.reads_paused.subscribe();
        let _ = paused.wait_for(|p| !*p).await;
        match self.state.lock().await.fail_next_read.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn begin_write(&self) -> Result<(), RemoteError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut paused = self.writes_paused.subscribe();
        let _ = paused.wait_for(|p| !*p).await;
        match self.state.lock().await.fail_next_write.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn conflict(message: &str) -> RemoteError {
    RemoteError::Rejected { status: Some(409), message: message.to_string() }
}

#[async_trait]
impl Remote for MemoryRemote {
    async fn list_items(&self) -> Result<Vec<Item>, RemoteError> {
        self.begin_read().await?;
        let mut items = self.state.lock().await.items.clone();
        items.sort_by(|a, b| a.publisher.cmp(&b.publisher));
        Ok(items)
    }

    async fn list_annotations(&self, user: &UserId) -> Result<Vec<AnnotationRow>, RemoteError> {
        self.begin_read().await?;
        let rows: Vec<AnnotationRow> = {
            let state = self.state.lock().await;
            state
                .rows
                .iter()
                .filter(|((owner, _), _)| owner == user)
                .map(|((_, item_id), visited)| AnnotationRow {
                    item_id: item_id.clone(),
                    is_favorite: true,
                    is_visited: *visited,
                })
                .collect()
        };
        Ok(self.deliver(rows).await)
    }

    async fn list_favorited_items(&self, user: &UserId) -> Result<Vec<(Item, bool)>, RemoteError> {
        self.begin_read().await?;
        let favorites: Vec<(Item, bool)> = {
            let state = self.state.lock().await;
            state
                .items
                .iter()
                .filter_map(|item| {
                    state
                        .rows
                        .get(&(user.clone(), item.id.clone()))
                        .map(|visited| (item.clone(), *visited))
                })
                .collect()
        };
        Ok(self.deliver(favorites).await)
    }

    async fn upsert_annotation(&self, user: &UserId, item: &ItemId, is_visited: bool) -> Result<(), RemoteError> {
        self.begin_write().await?;
        let mut state = self.state.lock().await;
        if !state.items.iter().any(|i| &i.id == item) {
            return Err(conflict("insert or update on table \"favorites\" violates foreign key constraint"));
        }
        state.rows.insert((user.clone(), item.clone()), is_visited);
        Ok(())
    }

    async fn insert_favorite(&self, user: &UserId, item: &ItemId) -> Result<(), RemoteError> {
        self.begin_write().await?;
        let mut state = self.state.lock().await;
        if !state.items.iter().any(|i| &i.id == item) {
            return Err(conflict("insert or update on table \"favorites\" violates foreign key constraint"));
        }
        let key = (user.clone(), item.clone());
        if state.rows.contains_key(&key) {
            return Err(conflict("duplicate key value violates unique constraint \"favorites_user_id_booth_id_key\""));
        }
        state.rows.insert(key, false);
        Ok(())
    }

    async fn delete_favorite(&self, user: &UserId, item: &ItemId) -> Result<(), RemoteError> {
        self.begin_write().await?;
        self.state.lock().await.rows.remove(&(user.clone(), item.clone()));
        Ok(())
    }
}
