//! A signed-in user's view of the catalog.
//!
//! [`Session`] ties the cache, the remote store, the mutation engine and the
//! preference store to one user id. It is created at sign-in and retired by
//! [`Session::sign_out`], which drops the user's cached views. Queries come
//! back sorted by the session's sort mode.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::Error;
use crate::model::{ItemId, UserId, ViewModel};
use crate::prefs::PrefsDb;
use crate::remote::{Remote, RemoteError};
use crate::sort::{SortMode, sort};
use crate::store::{CacheStore, Resource};
use crate::sync::{Command, Loader, MutationEngine, Notification, Settled};

/// Ends the user's authenticated session with the remote store.
#[async_trait]
pub trait SignOut: Send + Sync {
    async fn sign_out(&self) -> Result<(), RemoteError>;
}

/// State of a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Success(String),
    Failed(String),
}

impl CommandStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, CommandStatus::Pending)
    }
}

/// Observes one command started with [`Session::dispatch`].
#[derive(Debug, Clone)]
pub struct CommandHandle {
    command: Command,
    item_id: ItemId,
    status: watch::Receiver<CommandStatus>,
}

impl CommandHandle {
    fn settled_now(command: Command, item_id: ItemId, status: CommandStatus) -> Self {
        let (_, rx) = watch::channel(status);
        Self { command, item_id, status: rx }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    /// Current status without waiting.
    pub fn status(&self) -> CommandStatus {
        self.status.borrow().clone()
    }

    /// Wait until the command settles.
    pub async fn settled(mut self) -> CommandStatus {
        // A dropped sender has already published its final status.
        let _ = self.status.wait_for(|status| !status.is_pending()).await;
        self.status.borrow().clone()
    }
}

pub struct Session {
    user_id: UserId,
    loader: Loader,
    engine: MutationEngine,
    prefs: PrefsDb,
    sort_mode: watch::Sender<SortMode>,
    sign_out: Option<Arc<dyn SignOut>>,
    active: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("sort_mode", &*self.sort_mode.borrow())
            .field("active", &self.active.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start a session for a signed-in user.
    ///
    /// Reads the persisted sort mode. Nothing is fetched until the first query.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotSignedIn` for an empty user id, or a preference
    /// database error.
    pub async fn start(
        remote: Arc<dyn Remote>, store: CacheStore, prefs: PrefsDb, user_id: UserId,
    ) -> Result<Self, Error> {
        if user_id.as_str().trim().is_empty() {
            return Err(Error::NotSignedIn);
        }

        let mode = prefs.sort_mode().await?;
        let loader = Loader::new(remote, store);
        let engine = MutationEngine::new(loader.clone());

        tracing::info!(user_id = %user_id, sort_mode = mode.as_str(), "session started");

        Ok(Self {
            user_id,
            loader,
            engine,
            prefs,
            sort_mode: watch::Sender::new(mode),
            sign_out: None,
            active: AtomicBool::new(true),
        })
    }

    /// Attach the capability that ends the session remotely.
    pub fn with_sign_out(mut self, sign_out: Arc<dyn SignOut>) -> Self {
        self.sign_out = Some(sign_out);
        self
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn store(&self) -> &CacheStore {
        self.loader.store()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn ensure_active(&self) -> Result<(), Error> {
        if self.is_active() { Ok(()) } else { Err(Error::NotSignedIn) }
    }

    fn sorted(&self, view: &ViewModel) -> ViewModel {
        ViewModel::new(sort(&view.groups, self.sort_mode()))
    }

    /// The whole catalog with the user's annotations, sorted.
    pub async fn catalog(&self) -> Result<ViewModel, Error> {
        self.ensure_active()?;
        let view = self.loader.query(Resource::AllItems, &self.user_id).await?;
        Ok(self.sorted(&view))
    }

    /// Only the user's favorites, sorted.
    pub async fn favorites(&self) -> Result<ViewModel, Error> {
        self.ensure_active()?;
        let view = self.loader.query(Resource::FavoritesOnly, &self.user_id).await?;
        Ok(self.sorted(&view))
    }

    /// Refetch a resource regardless of the cache, sorted.
    pub async fn refresh(&self, resource: Resource) -> Result<ViewModel, Error> {
        self.ensure_active()?;
        let view = self.loader.refresh(resource, &self.user_id).await?;
        Ok(self.sorted(&view))
    }

    pub async fn set_favorite(&self, item: &ItemId, value: bool) -> Result<Settled, Error> {
        self.execute(Command::favorite(value), item).await
    }

    pub async fn set_visited(&self, item: &ItemId, value: bool) -> Result<Settled, Error> {
        self.execute(Command::visited(value), item).await
    }

    /// Run a command and wait for it to settle.
    pub async fn execute(&self, command: Command, item: &ItemId) -> Result<Settled, Error> {
        self.ensure_active()?;
        if item.as_str().trim().is_empty() {
            return Err(Error::InvalidInput("item_id must not be empty".into()));
        }
        Ok(self.engine.execute(command, &self.user_id, item).await?)
    }

    /// Start a command in the background and return a handle to observe it.
    pub fn dispatch(self: &Arc<Self>, command: Command, item: ItemId) -> CommandHandle {
        if let Err(err) = self.ensure_active() {
            return CommandHandle::settled_now(command, item, CommandStatus::Failed(err.to_string()));
        }

        let (tx, rx) = watch::channel(CommandStatus::Pending);
        let session = Arc::clone(self);
        let target = item.clone();
        tokio::spawn(async move {
            let status = match session.execute(command, &target).await {
                Ok(settled) => CommandStatus::Success(settled.message),
                // Notification text, without the error code prefix.
                Err(Error::Mutation(err)) => CommandStatus::Failed(err.to_string()),
                Err(err) => CommandStatus::Failed(err.to_string()),
            };
            tx.send_replace(status);
        });

        CommandHandle { command, item_id: item, status: rx }
    }

    /// Whether a command on the item has not settled yet.
    pub fn is_pending(&self, item: &ItemId) -> bool {
        self.engine.pending().is_pending(&self.user_id, item)
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.engine.notifications()
    }

    pub fn sort_mode(&self) -> SortMode {
        *self.sort_mode.borrow()
    }

    pub fn watch_sort_mode(&self) -> watch::Receiver<SortMode> {
        self.sort_mode.subscribe()
    }

    /// Flip the sort mode and persist it. Returns the new mode.
    pub async fn toggle_sort(&self) -> Result<SortMode, Error> {
        let next = self.sort_mode().toggled();
        self.prefs.set_sort_mode(next).await?;
        self.sort_mode.send_replace(next);
        tracing::debug!(sort_mode = next.as_str(), "sort mode changed");
        Ok(next)
    }

    /// Drop the user's cached views and end the remote session.
    ///
    /// Local state is cleared even when the remote call fails.
    pub async fn sign_out(&self) -> Result<(), Error> {
        if !self.active.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let removed = self.store().remove_user(&self.user_id).await;
        tracing::info!(user_id = %self.user_id, removed, "session signed out");

        if let Some(sign_out) = &self.sign_out {
            sign_out.sign_out().await?;
        }
        Ok(())
    }
}
