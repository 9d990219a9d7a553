//! Tracking of mutations that have not settled yet.
//!
//! The engine does not serialize overlapping mutations. Callers ask
//! [`PendingMutations::is_pending`] to decide whether an affordance that would
//! start another mutation on the same item should be disabled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::model::{ItemId, UserId};

type Counts = HashMap<(UserId, ItemId), usize>;

#[derive(Debug, Clone, Default)]
pub struct PendingMutations {
    counts: Arc<Mutex<Counts>>,
}

impl PendingMutations {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Counts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a mutation as in flight until the guard drops.
    pub fn begin(&self, user: &UserId, item: &ItemId) -> PendingGuard {
        let key = (user.clone(), item.clone());
        *self.lock().entry(key.clone()).or_insert(0) += 1;
        PendingGuard { counts: self.clone(), key }
    }

    pub fn is_pending(&self, user: &UserId, item: &ItemId) -> bool {
        self.lock().contains_key(&(user.clone(), item.clone()))
    }

    /// Whether any mutation of the user is in flight.
    pub fn any_pending(&self, user: &UserId) -> bool {
        self.lock().keys().any(|(owner, _)| owner == user)
    }
}

/// Clears the pending mark when the mutation settles or is dropped.
#[derive(Debug)]
pub struct PendingGuard {
    counts: PendingMutations,
    key: (UserId, ItemId),
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&self.key);
            }
        }
    }
}
