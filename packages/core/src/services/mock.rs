//! Scripted in-process slot fetcher.
//!
//! Returns fixed results per location and counts calls, so scheduler tests
//! run without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::slots::{AppointmentSlot, FetchError, RawSlot, SlotFetcher};

#[derive(Debug, Default)]
pub struct MockSlotFetcher {
    responses: Mutex<HashMap<u32, Result<Vec<RawSlot>, FetchError>>>,
    calls: AtomicUsize,
}

impl MockSlotFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slots(self, location_id: u32, slots: &[AppointmentSlot]) -> Self {
        let raw = slots.iter().map(RawSlot::from_slot).collect();
        self.with_raw(location_id, raw)
    }

    pub fn with_raw(self, location_id: u32, raw: Vec<RawSlot>) -> Self {
        self.set(location_id, Ok(raw));
        self
    }

    pub fn with_error(self, location_id: u32, err: FetchError) -> Self {
        self.set(location_id, Err(err));
        self
    }

    /// Replace the scripted result for a location between cycles.
    pub fn set(&self, location_id: u32, result: Result<Vec<RawSlot>, FetchError>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(location_id, result);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SlotFetcher for MockSlotFetcher {
    /// Unscripted locations offer nothing.
    async fn fetch(&self, location_id: u32) -> Result<Vec<RawSlot>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let responses = self
            .responses
            .lock()
            .map_err(|_| FetchError::network("mock fetcher lock poisoned"))?;
        responses
            .get(&location_id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn fetcher_name(&self) -> &str {
        "mock"
    }
}
