//! Filter Engine
//!
//! Narrows a fetch result down to the slots the user should hear about.
//! A slot survives only if its time of day is inside the preferred window,
//! it starts at least the travel time from now, it is strictly before the
//! cutoff date (when one is set) and it has never been reported before.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::slots::types::{AppointmentSlot, RawSlot, SlotKey};

/// Inclusive time-of-day window. When `latest < earliest` the window wraps
/// midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub earliest: NaiveTime,
    pub latest: NaiveTime,
}

impl TimeWindow {
    pub fn new(earliest: NaiveTime, latest: NaiveTime) -> Self {
        Self { earliest, latest }
    }

    pub fn wraps_midnight(&self) -> bool {
        self.latest < self.earliest
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.wraps_midnight() {
            time >= self.earliest || time <= self.latest
        } else {
            self.earliest <= time && time <= self.latest
        }
    }
}

impl Default for TimeWindow {
    /// The whole day.
    fn default() -> Self {
        Self {
            earliest: NaiveTime::default(),
            latest: NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default(),
        }
    }
}

/// Result of one filter pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    /// Eligible, never-reported slots ordered by start time then location.
    pub eligible: Vec<AppointmentSlot>,
    /// Records dropped because their start time was missing or unparseable.
    pub malformed: usize,
    /// Well-formed slots rejected by a preference or because already seen.
    pub rejected: usize,
}

/// Preference-driven slot filter.
#[derive(Debug, Clone)]
pub struct SlotFilter {
    window: TimeWindow,
    travel_time: Duration,
    cutoff: Option<NaiveDate>,
}

impl SlotFilter {
    pub fn new(window: TimeWindow, travel_time: Duration, cutoff: Option<NaiveDate>) -> Self {
        Self {
            window,
            travel_time,
            cutoff,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.time_window,
            Duration::seconds(config.travel_time.as_secs() as i64),
            config.current_appointment_cutoff,
        )
    }

    /// Preference checks only; membership in the dedup store is not
    /// consulted here.
    pub fn is_acceptable(&self, slot: &AppointmentSlot, now: NaiveDateTime) -> bool {
        if !self.window.contains(slot.time_of_day()) {
            return false;
        }

        if slot.start_time - now < self.travel_time {
            return false;
        }

        match self.cutoff {
            Some(cutoff) => slot.date() < cutoff,
            None => true,
        }
    }

    /// Run a fetch result through the filter. `seen` answers whether a slot
    /// identity has already triggered a notification.
    pub fn filter<F>(&self, raw: &[RawSlot], now: NaiveDateTime, seen: F) -> FilterOutcome
    where
        F: Fn(&SlotKey) -> bool,
    {
        let mut outcome = FilterOutcome::default();

        for record in raw {
            let Some(slot) = record.parse() else {
                tracing::debug!(
                    location_id = record.location_id,
                    start_timestamp = ?record.start_timestamp,
                    "Dropping malformed slot record"
                );
                outcome.malformed += 1;
                continue;
            };

            if self.is_acceptable(&slot, now) && !seen(&slot.key()) {
                outcome.eligible.push(slot);
            } else {
                outcome.rejected += 1;
            }
        }

        outcome
            .eligible
            .sort_by_key(|slot| (slot.start_time, slot.location_id));
        outcome
    }
}
