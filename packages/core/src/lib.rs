// Library root: exposes the scheduler's modules to `src/main.rs` and to the
// integration tests in `tests/`.

pub mod alerts;
pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod locations;
pub mod logging;
pub mod metrics;
pub mod repository;
pub mod scheduler;
pub mod services;
pub mod slots;
pub mod store;
