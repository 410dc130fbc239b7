//! Core data types for appointment slots

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Wire format of slot timestamps, minute precision, local wall-clock.
pub const SLOT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Dedup identity of a slot: the same location and start time is the
/// same slot, no matter how many times it is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub location_id: u32,
    pub start_time: NaiveDateTime,
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}",
            self.location_id,
            self.start_time.format(SLOT_TIMESTAMP_FORMAT)
        )
    }
}

/// One bookable opening at an enrollment location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppointmentSlot {
    pub location_id: u32,
    pub start_time: NaiveDateTime,
}

impl AppointmentSlot {
    pub fn new(location_id: u32, start_time: NaiveDateTime) -> Self {
        Self {
            location_id,
            start_time,
        }
    }

    pub fn key(&self) -> SlotKey {
        SlotKey {
            location_id: self.location_id,
            start_time: self.start_time,
        }
    }

    /// Wall-clock component, independent of the date.
    pub fn time_of_day(&self) -> NaiveTime {
        self.start_time.time()
    }

    pub fn date(&self) -> NaiveDate {
        self.start_time.date()
    }
}

/// A slot record as handed over by a fetcher, before validation.
///
/// `start_timestamp` is kept as the provider sent it; a record whose
/// timestamp is absent or unparseable is dropped by the filter and counted
/// as a data-quality event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSlot {
    pub location_id: u32,
    pub start_timestamp: Option<String>,
}

impl RawSlot {
    pub fn new(location_id: u32, start_timestamp: impl Into<String>) -> Self {
        Self {
            location_id,
            start_timestamp: Some(start_timestamp.into()),
        }
    }

    /// A record with no start time at all.
    pub fn missing_time(location_id: u32) -> Self {
        Self {
            location_id,
            start_timestamp: None,
        }
    }

    pub fn from_slot(slot: &AppointmentSlot) -> Self {
        Self::new(
            slot.location_id,
            slot.start_time.format(SLOT_TIMESTAMP_FORMAT).to_string(),
        )
    }

    /// Parse into a validated slot. Seconds are tolerated but the
    /// canonical form is minute precision.
    pub fn parse(&self) -> Option<AppointmentSlot> {
        let raw = self.start_timestamp.as_deref()?.trim();
        let start_time = NaiveDateTime::parse_from_str(raw, SLOT_TIMESTAMP_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
            .ok()?;
        Some(AppointmentSlot::new(self.location_id, start_time))
    }
}
