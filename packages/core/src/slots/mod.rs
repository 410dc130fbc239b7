//! Appointment slots
//!
//! The data model for bookable openings, the fetcher interface that
//! retrieves them, and the filter that decides which ones are worth
//! telling the user about.

pub mod filter;
pub mod provider;
pub mod types;

pub use filter::{FilterOutcome, SlotFilter, TimeWindow};
pub use provider::{FetchError, SlotFetcher};
pub use types::{AppointmentSlot, RawSlot, SlotKey};
