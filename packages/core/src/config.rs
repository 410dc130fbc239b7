//! Run configuration.
//!
//! A [`Config`] is resolved once at startup from four layers, later layers
//! winning: built-in defaults, an optional JSON file, `TTP_*` environment
//! variables and command-line overrides. Once built it is never mutated.

use std::env;
use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use thiserror::Error;

use crate::alerts::Severity;
use crate::slots::TimeWindow;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_DATABASE: &str = "ttp.db";
pub const DEFAULT_API_BASE_URL: &str = "https://ttp.cbp.dhs.gov/schedulerapi";
pub const DEFAULT_TRAVEL_TIME: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_RETRIEVAL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Upper bound for any configured duration (100 years).
const MAX_DURATION_SECS: u64 = 100 * 365 * 86_400;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for '{key}': {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Which messages reach the notification targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NotificationLevel {
    /// New slots and errors.
    Info = 1,
    /// Errors only.
    Error = 2,
}

impl NotificationLevel {
    pub fn from_number(level: u8) -> Result<Self, ConfigError> {
        match level {
            1 => Ok(Self::Info),
            2 => Ok(Self::Error),
            other => Err(ConfigError::invalid(
                "notification_level",
                format!("must be 1 or 2, got {}", other),
            )),
        }
    }

    pub fn allows(self, severity: Severity) -> bool {
        match self {
            Self::Info => true,
            Self::Error => severity == Severity::Error,
        }
    }
}

/// Immutable snapshot of everything one scheduler run needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub location_ids: Vec<u32>,
    pub time_window: TimeWindow,
    pub travel_time: Duration,
    pub current_appointment_cutoff: Option<NaiveDate>,
    /// Zero means run a single cycle and exit.
    pub retrieval_interval: Duration,
    pub notification_level: NotificationLevel,
    pub notification_urls: Vec<String>,
    pub database: String,
    pub locations_file: Option<PathBuf>,
    pub metrics_addr: Option<SocketAddr>,
    pub api_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            location_ids: Vec::new(),
            time_window: TimeWindow::default(),
            travel_time: DEFAULT_TRAVEL_TIME,
            current_appointment_cutoff: None,
            retrieval_interval: DEFAULT_RETRIEVAL_INTERVAL,
            notification_level: NotificationLevel::Info,
            notification_urls: Vec::new(),
            database: DEFAULT_DATABASE.to_string(),
            locations_file: None,
            metrics_addr: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// SQLite connection URL for the dedup store.
    pub fn database_url(&self) -> String {
        if self.database.starts_with("sqlite:") {
            self.database.clone()
        } else {
            format!("sqlite://{}", self.database)
        }
    }

    pub fn is_one_shot(&self) -> bool {
        self.retrieval_interval.is_zero()
    }

    /// Resolve the full configuration.
    ///
    /// `config_path` of `None` means the default `config.json`, which may be
    /// absent. An explicitly named file must exist.
    pub fn load(
        config_path: Option<&Path>,
        overrides: &Overrides,
        today: NaiveDate,
    ) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, overrides, today, |key| env::var(key).ok())
    }

    /// [`Config::load`] with the `TTP_*` lookup supplied by the caller.
    pub fn load_with_env<F>(
        config_path: Option<&Path>,
        overrides: &Overrides,
        today: NaiveDate,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match config_path {
            Some(path) => Some(FileConfig::read(path)?),
            None => FileConfig::read_optional(Path::new(DEFAULT_CONFIG_FILE))?,
        };

        let mut builder = ConfigBuilder::default();
        if let Some(file) = file {
            builder.apply_file(file)?;
        }
        builder.apply_env(lookup)?;
        builder.apply_overrides(overrides)?;
        builder.build(today)
    }
}

/// Command-line level overrides, already split out of the argument parser.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub current_appointment_date: Option<String>,
    /// Appended to the configured set.
    pub location_ids: Option<String>,
    /// Replaces the configured set for this run.
    pub locations_only: Option<String>,
    pub notification_level: Option<u8>,
    /// Appended to the configured targets.
    pub notification_urls: Option<String>,
    pub retrieval_interval: Option<String>,
    pub start_appointment_time: Option<String>,
    pub end_appointment_time: Option<String>,
    pub travel_time: Option<String>,
    pub database: Option<String>,
    pub locations_file: Option<PathBuf>,
    pub metrics_addr: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Number(u32),
    Text(String),
}

/// Durations may be given as plain seconds or as `<integer><unit>`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DurationValue {
    Seconds(u64),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    location_ids: Option<OneOrMany<IdValue>>,
    current_appointment_date: Option<String>,
    notification_level: Option<u8>,
    notification_urls: Option<OneOrMany<String>>,
    retrieval_interval: Option<DurationValue>,
    start_appointment_time: Option<String>,
    end_appointment_time: Option<String>,
    travel_time: Option<DurationValue>,
    database: Option<String>,
    locations_file: Option<PathBuf>,
    metrics_addr: Option<String>,
    api_base_url: Option<String>,
}

impl FileConfig {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &contents)
    }

    fn read_optional(path: &Path) -> Result<Option<Self>, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(path, &contents).map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Accumulates layers; start and end times are kept apart until `build`
/// so either may be overridden alone.
#[derive(Debug, Default)]
struct ConfigBuilder {
    config: Config,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
}

impl ConfigBuilder {
    fn apply_file(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(ids) = file.location_ids {
            self.config.location_ids = ids
                .into_vec()
                .into_iter()
                .map(|id| match id {
                    IdValue::Number(n) => Ok(n),
                    IdValue::Text(text) => parse_location_id(&text),
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(date) = file.current_appointment_date {
            self.config.current_appointment_cutoff = Some(parse_date(&date)?);
        }
        if let Some(level) = file.notification_level {
            self.config.notification_level = NotificationLevel::from_number(level)?;
        }
        if let Some(urls) = file.notification_urls {
            self.config.notification_urls = urls.into_vec();
        }
        if let Some(interval) = file.retrieval_interval {
            self.config.retrieval_interval = duration_value("retrieval_interval", interval)?;
        }
        if let Some(start) = file.start_appointment_time {
            self.start_time = Some(parse_time("start_appointment_time", &start)?);
        }
        if let Some(end) = file.end_appointment_time {
            self.end_time = Some(parse_time("end_appointment_time", &end)?);
        }
        if let Some(travel) = file.travel_time {
            self.config.travel_time = duration_value("travel_time", travel)?;
        }
        if let Some(database) = file.database {
            self.config.database = database;
        }
        if let Some(path) = file.locations_file {
            self.config.locations_file = Some(path);
        }
        if let Some(addr) = file.metrics_addr {
            self.config.metrics_addr = Some(parse_addr(&addr)?);
        }
        if let Some(url) = file.api_base_url {
            self.config.api_base_url = url;
        }
        Ok(())
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ids) = lookup("TTP_LOCATION_IDS") {
            self.config.location_ids = parse_location_list(&ids)?;
        }
        if let Some(date) = lookup("TTP_CURRENT_APPOINTMENT_DATE") {
            self.config.current_appointment_cutoff = Some(parse_date(&date)?);
        }
        if let Some(level) = lookup("TTP_NOTIFICATION_LEVEL") {
            let level = level.trim().parse::<u8>().map_err(|_| {
                ConfigError::invalid("notification_level", "must be a valid number")
            })?;
            self.config.notification_level = NotificationLevel::from_number(level)?;
        }
        if let Some(urls) = lookup("TTP_NOTIFICATION_URLS") {
            self.config.notification_urls = split_list(&urls);
        }
        if let Some(interval) = lookup("TTP_RETRIEVAL_INTERVAL") {
            self.config.retrieval_interval = parse_duration("retrieval_interval", &interval)?;
        }
        if let Some(start) = lookup("TTP_START_APPOINTMENT_TIME") {
            self.start_time = Some(parse_time("start_appointment_time", &start)?);
        }
        if let Some(end) = lookup("TTP_END_APPOINTMENT_TIME") {
            self.end_time = Some(parse_time("end_appointment_time", &end)?);
        }
        if let Some(travel) = lookup("TTP_TRAVEL_TIME") {
            self.config.travel_time = parse_duration("travel_time", &travel)?;
        }
        if let Some(database) = lookup("TTP_DATABASE") {
            self.config.database = database;
        }
        if let Some(path) = lookup("TTP_LOCATIONS_FILE") {
            self.config.locations_file = Some(PathBuf::from(path));
        }
        if let Some(addr) = lookup("TTP_METRICS_ADDR") {
            self.config.metrics_addr = Some(parse_addr(&addr)?);
        }
        if let Some(url) = lookup("TTP_API_BASE_URL") {
            self.config.api_base_url = url;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &Overrides) -> Result<(), ConfigError> {
        if let Some(date) = &overrides.current_appointment_date {
            self.config.current_appointment_cutoff = Some(parse_date(date)?);
        }
        if let Some(ids) = &overrides.location_ids {
            self.config.location_ids.extend(parse_location_list(ids)?);
        }
        if let Some(ids) = &overrides.locations_only {
            self.config.location_ids = parse_location_list(ids)?;
        }
        if let Some(level) = overrides.notification_level {
            self.config.notification_level = NotificationLevel::from_number(level)?;
        }
        if let Some(urls) = &overrides.notification_urls {
            self.config.notification_urls.extend(split_list(urls));
        }
        if let Some(interval) = &overrides.retrieval_interval {
            self.config.retrieval_interval = parse_duration("retrieval_interval", interval)?;
        }
        if let Some(start) = &overrides.start_appointment_time {
            self.start_time = Some(parse_time("start_appointment_time", start)?);
        }
        if let Some(end) = &overrides.end_appointment_time {
            self.end_time = Some(parse_time("end_appointment_time", end)?);
        }
        if let Some(travel) = &overrides.travel_time {
            self.config.travel_time = parse_duration("travel_time", travel)?;
        }
        if let Some(database) = &overrides.database {
            self.config.database = database.clone();
        }
        if let Some(path) = &overrides.locations_file {
            self.config.locations_file = Some(path.clone());
        }
        if let Some(addr) = &overrides.metrics_addr {
            self.config.metrics_addr = Some(parse_addr(addr)?);
        }
        Ok(())
    }

    fn build(self, today: NaiveDate) -> Result<Config, ConfigError> {
        let mut config = self.config;
        let whole_day = TimeWindow::default();

        config.time_window = TimeWindow::new(
            self.start_time.unwrap_or(whole_day.earliest),
            self.end_time.unwrap_or(whole_day.latest),
        );

        if let Some(cutoff) = config.current_appointment_cutoff {
            if cutoff < today {
                return Err(ConfigError::invalid(
                    "current_appointment_date",
                    "cannot be in the past",
                ));
            }
        }

        config.location_ids.sort_unstable();
        config.location_ids.dedup();

        let mut unique_urls: Vec<String> = Vec::with_capacity(config.notification_urls.len());
        for url in config.notification_urls.drain(..) {
            if !unique_urls.contains(&url) {
                unique_urls.push(url);
            }
        }
        config.notification_urls = unique_urls;

        Ok(config)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_location_id(value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| {
        ConfigError::invalid("location_ids", format!("'{}' is not a location id", value))
    })
}

/// Parse a comma-separated list of location ids, e.g. `5140,5446`.
pub fn parse_location_list(value: &str) -> Result<Vec<u32>, ConfigError> {
    split_list(value)
        .iter()
        .map(|id| parse_location_id(id))
        .collect()
}

fn duration_value(key: &str, value: DurationValue) -> Result<Duration, ConfigError> {
    match value {
        DurationValue::Seconds(secs) => checked_duration(key, secs),
        DurationValue::Text(text) => parse_duration(key, &text),
    }
}

fn checked_duration(key: &str, secs: u64) -> Result<Duration, ConfigError> {
    if secs > MAX_DURATION_SECS {
        return Err(ConfigError::invalid(key, "duration is too large"));
    }
    Ok(Duration::from_secs(secs))
}

/// Parse `45s`, `30m`, `2h`, `1d` or a bare number of seconds.
pub fn parse_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let value = value.trim().to_ascii_lowercase();

    if let Ok(secs) = value.parse::<u64>() {
        return checked_duration(key, secs);
    }

    let format_error = || {
        ConfigError::invalid(
            key,
            "must be in the format of <integer><unit> (e.g. 45s, 30m, 2h, 1d)",
        )
    };

    let unit = value.chars().last().ok_or_else(format_error)?;
    let amount = value[..value.len() - unit.len_utf8()]
        .parse::<u64>()
        .map_err(|_| format_error())?;

    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        _ => return Err(format_error()),
    };

    let secs = amount
        .checked_mul(multiplier)
        .ok_or_else(|| ConfigError::invalid(key, "duration is too large"))?;
    checked_duration(key, secs)
}

/// Parse `Month Day, Year` (e.g. `January 1, 2024`) or ISO `2024-01-01`.
pub fn parse_date(value: &str) -> Result<NaiveDate, ConfigError> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%B %d, %Y")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .map_err(|_| {
            ConfigError::invalid(
                "current_appointment_date",
                "date must be in the format of Month Day, Year (e.g. January 1, 2024)",
            )
        })
}

/// Parse `HH:MM`.
pub fn parse_time(key: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ConfigError::invalid(key, "time must be in the format of HH:MM (e.g. 15:00)"))
}

fn parse_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .trim()
        .parse::<SocketAddr>()
        .map_err(|_| ConfigError::invalid("metrics_addr", format!("'{}' is not a socket address", value)))
}
