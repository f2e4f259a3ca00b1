//! Per-record locks for read-validate-commit windows.
//!
//! An operation names every record it will touch and takes all of them in
//! one step: either every id is free and all are marked held, or the caller
//! waits. No partial holding means no lock-ordering deadlocks.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};

use tracing::debug;

use dentledger_core::AggregateId;

use crate::event_store::EventStoreError;

#[derive(Debug, Default)]
pub struct RecordLocks {
    held: Mutex<HashSet<AggregateId>>,
    released: Condvar,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every id in `ids` is free, then hold them all.
    ///
    /// Duplicate ids are fine. The returned guard releases on drop.
    pub fn acquire<I>(&self, ids: I) -> Result<RecordLockGuard<'_>, EventStoreError>
    where
        I: IntoIterator<Item = AggregateId>,
    {
        let mut wanted: Vec<AggregateId> = ids.into_iter().collect();
        wanted.sort();
        wanted.dedup();

        let mut held = self.held.lock().map_err(|_| EventStoreError::Poisoned)?;
        while wanted.iter().any(|id| held.contains(id)) {
            held = self
                .released
                .wait(held)
                .map_err(|_| EventStoreError::Poisoned)?;
        }
        held.extend(wanted.iter().copied());
        debug!(records = wanted.len(), "record locks acquired");

        Ok(RecordLockGuard {
            locks: self,
            ids: wanted,
        })
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().map(|h| h.len()).unwrap_or(0)
    }
}

/// Holds a set of record locks until dropped.
#[derive(Debug)]
pub struct RecordLockGuard<'a> {
    locks: &'a RecordLocks,
    ids: Vec<AggregateId>,
}

impl RecordLockGuard<'_> {
    pub fn ids(&self) -> &[AggregateId] {
        &self.ids
    }
}

impl Drop for RecordLockGuard<'_> {
    fn drop(&mut self) {
        // Release even if another holder panicked while holding the mutex.
        let mut held = match self.locks.held.lock() {
            Ok(h) => h,
            Err(poisoned) => poisoned.into_inner(),
        };
        for id in &self.ids {
            held.remove(id);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}
