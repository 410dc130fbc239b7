use std::path::PathBuf;

use clap::Parser;

use crate::config::Overrides;

/// Trusted Traveler Scheduler CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "ttp-scheduler",
    version,
    about = "Watch Trusted Traveler Program locations for open interview slots"
)]
pub struct Cli {
    /// JSON configuration file (defaults to ./config.json when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Send a test message through every notification target and exit
    #[arg(short = 't', long)]
    pub test_notifications: bool,

    /// Only report slots before this date (e.g. "January 1, 2025" or 2025-01-01)
    #[arg(short = 'd', long)]
    pub current_appointment_date: Option<String>,

    /// Comma-separated location ids to add to the configured set
    #[arg(short = 'l', long)]
    pub location_ids: Option<String>,

    /// Comma-separated location ids to watch instead of the configured set
    #[arg(long, conflicts_with = "location_ids")]
    pub locations_only: Option<String>,

    /// 1 = new slots and errors, 2 = errors only
    #[arg(short = 'n', long)]
    pub notification_level: Option<u8>,

    /// Comma-separated notification target URLs to add
    #[arg(short = 'u', long)]
    pub notification_urls: Option<String>,

    /// Time between cycles, e.g. 5m. Zero runs a single cycle.
    #[arg(short = 'r', long)]
    pub retrieval_interval: Option<String>,

    /// Earliest acceptable time of day (HH:MM)
    #[arg(short = 's', long)]
    pub start_appointment_time: Option<String>,

    /// Latest acceptable time of day (HH:MM)
    #[arg(short = 'e', long)]
    pub end_appointment_time: Option<String>,

    /// Minimum lead time before a slot, e.g. 30m
    #[arg(short = 'T', long)]
    pub travel_time: Option<String>,

    /// SQLite database file holding notification history
    #[arg(long)]
    pub database: Option<String>,

    /// JSON file mapping location ids to names
    #[arg(long)]
    pub locations_file: Option<PathBuf>,

    /// Serve /health, /status and /metrics on this address
    #[arg(long)]
    pub metrics_addr: Option<String>,

    /// Forget every slot already notified about and exit
    #[arg(long)]
    pub reset_history: bool,

    /// Print the N most recent notification records and exit
    #[arg(long, value_name = "N")]
    pub history: Option<i64>,

    /// Verbose logging
    #[arg(short = 'D', long)]
    pub debug: bool,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            current_appointment_date: self.current_appointment_date.clone(),
            location_ids: self.location_ids.clone(),
            locations_only: self.locations_only.clone(),
            notification_level: self.notification_level,
            notification_urls: self.notification_urls.clone(),
            retrieval_interval: self.retrieval_interval.clone(),
            start_appointment_time: self.start_appointment_time.clone(),
            end_appointment_time: self.end_appointment_time.clone(),
            travel_time: self.travel_time.clone(),
            database: self.database.clone(),
            locations_file: self.locations_file.clone(),
            metrics_addr: self.metrics_addr.clone(),
        }
    }
}
