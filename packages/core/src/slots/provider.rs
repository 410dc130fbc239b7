//! Slot Fetcher Interface
//!
//! Provides abstraction layer over the appointment source so the scheduler
//! never depends on a concrete HTTP client.

use async_trait::async_trait;
use thiserror::Error;

use crate::slots::types::RawSlot;

/// Transport-level failure while fetching one location.
///
/// Always recoverable: the scheduler records it, moves on to the next
/// location and retries on the next natural cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Appointment API returned HTTP {status}")]
    Status { status: u16 },

    #[error("Data format error: {message}")]
    Format { message: String },
}

impl FetchError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }
}

/// Trait for appointment sources.
#[async_trait]
pub trait SlotFetcher {
    /// Fetch every slot currently offered at `location_id`.
    async fn fetch(&self, location_id: u32) -> Result<Vec<RawSlot>, FetchError>;

    /// Get the name of this fetcher for logging/debugging
    fn fetcher_name(&self) -> &str;
}
