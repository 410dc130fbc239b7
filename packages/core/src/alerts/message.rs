//! Message bodies sent through the notifier.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::locations::LocationDirectory;
use crate::slots::{AppointmentSlot, FetchError};

/// Times listed per date before collapsing into "and N more".
const MAX_TIMES_PER_DATE: usize = 3;

pub const TEST_MESSAGE: &str = "This is a test message.";

/// One message per location, grouping new slots by date:
///
/// ```text
/// New appointment(s) found for Blaine NEXUS (5020)
/// - Fri, March 01, 2024 [08:00 AM, 08:15 AM, 08:30 AM, and 2 more]
/// ```
pub fn new_slots(directory: &LocationDirectory, location_id: u32, slots: &[AppointmentSlot]) -> String {
    let mut by_date: BTreeMap<NaiveDate, Vec<&AppointmentSlot>> = BTreeMap::new();
    for slot in slots {
        by_date.entry(slot.date()).or_default().push(slot);
    }

    let mut message = format!("New appointment(s) found for {}\n", directory.label(location_id));

    for (date, mut day) in by_date {
        day.sort_by_key(|slot| slot.start_time);

        let mut times = day
            .iter()
            .take(MAX_TIMES_PER_DATE)
            .map(|slot| slot.start_time.format("%I:%M %p").to_string())
            .collect::<Vec<_>>()
            .join(", ");

        if day.len() > MAX_TIMES_PER_DATE {
            times.push_str(&format!(", and {} more", day.len() - MAX_TIMES_PER_DATE));
        }

        message.push_str(&format!("- {} [{}]\n", date.format("%a, %B %d, %Y"), times));
    }

    message
}

/// Summary of every location whose fetch failed in one cycle.
pub fn fetch_failures(directory: &LocationDirectory, failures: &[(u32, FetchError)]) -> String {
    let mut message = format!(
        "Failed to retrieve appointments for {} location(s)\n",
        failures.len()
    );
    for (location_id, err) in failures {
        message.push_str(&format!("- {}: {}\n", directory.label(*location_id), err));
    }
    message
}

/// Sent once before the scheduler stops on an unrecoverable error.
pub fn fatal(error: &dyn std::fmt::Display) -> String {
    format!("Scheduler stopped: {}", error)
}
