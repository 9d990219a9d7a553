//! Cache entry state and fetch bookkeeping.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::CacheKey;
use crate::model::ViewModel;
use crate::sync::FetchError;

/// Result of one fetch, shared with every caller that joined it.
pub type FetchOutcome = Result<Arc<ViewModel>, FetchError>;

/// What a reader sees for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedView {
    pub view: Arc<ViewModel>,
    /// Marked for refetch; the view is still displayable.
    pub stale: bool,
    /// When authoritative data last replaced the view.
    pub fetched_at: DateTime<Utc>,
}

impl CachedView {
    pub(crate) fn fresh(view: Arc<ViewModel>) -> Self {
        Self { view, stale: false, fetched_at: Utc::now() }
    }
}

#[derive(Debug)]
pub(crate) struct InFlight {
    pub(crate) id: u64,
    pub(crate) generation: u64,
    pub(crate) result: watch::Receiver<Option<FetchOutcome>>,
}

impl InFlight {
    /// Whether a new caller may join this fetch instead of starting another.
    pub(crate) fn joinable(&self, generation: u64) -> bool {
        self.generation == generation && self.result.has_changed().is_ok()
    }
}

#[derive(Debug)]
pub(crate) struct CacheEntry {
    pub(crate) cached: Option<CachedView>,
    /// Replaced whenever in-flight fetches must no longer land. Drawn from a
    /// store-wide counter, so a removed and recreated key never reuses one.
    pub(crate) generation: u64,
    pub(crate) in_flight: Option<InFlight>,
}

impl CacheEntry {
    pub(crate) fn new(generation: u64) -> Self {
        Self { cached: None, generation, in_flight: None }
    }
}

/// Permission to run a fetch and publish its result.
#[derive(Debug)]
pub struct FetchTicket {
    pub(crate) key: CacheKey,
    pub(crate) id: u64,
    pub(crate) generation: u64,
    pub(crate) tx: watch::Sender<Option<FetchOutcome>>,
}

impl FetchTicket {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Outcome of asking the store to start a fetch.
#[derive(Debug)]
pub enum FetchSlot {
    /// No live fetch for this generation; the caller runs it.
    Leader(FetchTicket),
    /// Another caller is already fetching; wait for its result.
    Follower(watch::Receiver<Option<FetchOutcome>>),
}

/// Wait for the leader of a joined fetch to publish its result.
pub async fn join(mut rx: watch::Receiver<Option<FetchOutcome>>) -> FetchOutcome {
    match rx.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone().unwrap_or(Err(FetchError::Interrupted)),
        Err(_) => Err(FetchError::Interrupted),
    }
}
