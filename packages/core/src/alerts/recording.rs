//! Recording notification target.
//!
//! Keeps every message in memory instead of delivering it, so scheduler and
//! notifier tests can assert on exactly what would have been sent.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::alerts::{NotificationTarget, NotifyError, Severity};

#[derive(Debug, Default)]
pub struct RecordingTarget {
    name: String,
    fail: bool,
    sent: Mutex<Vec<(String, Severity)>>,
}

impl RecordingTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A target whose every delivery fails.
    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, Severity)> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    pub fn sent_with(&self, severity: Severity) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(_, s)| *s == severity)
            .map(|(message, _)| message)
            .collect()
    }
}

#[async_trait]
impl NotificationTarget for RecordingTarget {
    async fn send(&self, message: &str, severity: Severity) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Transport {
                message: format!("{} is unreachable", self.name),
            });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((message.to_string(), severity));
        }
        Ok(())
    }

    fn target_name(&self) -> &str {
        &self.name
    }
}
