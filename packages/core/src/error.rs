use thiserror::Error;

use crate::alerts::NotifyError;
use crate::config::ConfigError;
use crate::slots::FetchError;

/// Errors from the dedup store medium.
///
/// Any of these is fatal to the scheduler: without a readable and writable
/// store it can no longer promise that a slot is reported at most once.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("In-memory store lock poisoned")]
    Poisoned,
}

/// Unified application error.
///
/// Every startup and runtime failure `main` can report.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Slot fetcher error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Status server error: {0}")]
    Server(#[from] std::io::Error),
}
