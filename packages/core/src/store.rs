//! Dedup store.
//!
//! The set of slot identities that have already triggered a notification.
//! It is the only source of truth for "have we told the user about this
//! one". Entries never expire: a slot once reported must never be reported
//! again.
//!
//! [`DedupStore`] is the contract the scheduler depends on. The durable
//! implementation lives in [`crate::repository::SqliteDedupStore`];
//! [`MemoryDedupStore`] backs tests and throwaway runs.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::slots::SlotKey;

#[async_trait]
pub trait DedupStore {
    /// `true` when `key` has already been reported. A cold store answers
    /// `false` for everything.
    async fn contains(&self, key: &SlotKey) -> Result<bool, StoreError>;

    /// Mark `key` as reported. Idempotent; returns `true` only when the key
    /// was not present before.
    async fn record(&self, key: &SlotKey) -> Result<bool, StoreError>;

    /// Every reported identity at one location, for bulk membership tests.
    async fn recorded_at(&self, location_id: u32) -> Result<HashSet<SlotKey>, StoreError>;

    /// Number of identities held.
    async fn count(&self) -> Result<u64, StoreError>;

    /// Operator reset. Returns the number of identities removed.
    async fn clear(&self) -> Result<u64, StoreError>;
}

/// Non-durable store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryDedupStore {
    keys: Mutex<HashSet<SlotKey>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn contains(&self, key: &SlotKey) -> Result<bool, StoreError> {
        let keys = self.keys.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(keys.contains(key))
    }

    async fn record(&self, key: &SlotKey) -> Result<bool, StoreError> {
        let mut keys = self.keys.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(keys.insert(*key))
    }

    async fn recorded_at(&self, location_id: u32) -> Result<HashSet<SlotKey>, StoreError> {
        let keys = self.keys.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(keys
            .iter()
            .filter(|key| key.location_id == location_id)
            .copied()
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let keys = self.keys.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(keys.len() as u64)
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        let mut keys = self.keys.lock().map_err(|_| StoreError::Poisoned)?;
        let removed = keys.len() as u64;
        keys.clear();
        Ok(removed)
    }
}
