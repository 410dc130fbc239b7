//! Notification dispatch.
//!
//! A [`Notifier`] fans a message out to every registered
//! [`NotificationTarget`]. Targets fail independently: one unreachable
//! webhook never prevents delivery to the others, and the overall send
//! succeeds as long as at least one target accepted the message.
//!
//! Level gating (whether a slot-found message should be sent at all) is the
//! caller's decision, see [`crate::config::NotificationLevel`].

pub mod console;
pub mod message;
pub mod recording;
pub mod webhook;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

pub use console::ConsoleTarget;
pub use webhook::WebhookTarget;

/// Title attached to every delivery.
pub const NOTIFICATION_TITLE: &str = "Trusted Traveler Scheduler";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One target's failed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub target: String,
    pub error: String,
}

impl fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.error)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Target rejected notification with HTTP {status}")]
    Rejected { status: u16 },

    #[error("All {} notification targets failed: {}", .failures.len(), join_failures(.failures))]
    AllFailed { failures: Vec<TargetFailure> },

    #[error("No notification targets registered")]
    NoTargets,
}

fn join_failures(failures: &[TargetFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single delivery channel.
#[async_trait]
pub trait NotificationTarget {
    async fn send(&self, message: &str, severity: Severity) -> Result<(), NotifyError>;

    /// Name used in logs and failure reports.
    fn target_name(&self) -> &str;
}

/// Per-target outcome of a successful fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failures: Vec<TargetFailure>,
}

impl DeliveryReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Fans messages out to every registered target.
#[derive(Clone, Default)]
pub struct Notifier {
    targets: Vec<Arc<dyn NotificationTarget + Send + Sync>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, target: Arc<dyn NotificationTarget + Send + Sync>) -> Self {
        self.targets.push(target);
        self
    }

    /// Build targets from configured URLs. `http(s)://` becomes a webhook,
    /// `console://` or `log://` the local console. With no URLs at all the
    /// console is used.
    pub fn from_urls(urls: &[String], http: reqwest::Client) -> Result<Self, ConfigError> {
        let mut notifier = Self::new();

        for url in urls {
            let lower = url.to_ascii_lowercase();
            let target: Arc<dyn NotificationTarget + Send + Sync> =
                if lower.starts_with("http://") || lower.starts_with("https://") {
                    Arc::new(WebhookTarget::new(url.clone(), http.clone()))
                } else if lower.starts_with("console://") || lower.starts_with("log://") {
                    Arc::new(ConsoleTarget::new())
                } else {
                    return Err(ConfigError::invalid(
                        "notification_urls",
                        format!("unsupported notification URL '{}'", url),
                    ));
                };
            notifier.targets.push(target);
        }

        if notifier.targets.is_empty() {
            notifier.targets.push(Arc::new(ConsoleTarget::new()));
        }

        Ok(notifier)
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Send to every target. Succeeds if at least one target delivered.
    pub async fn send(&self, message: &str, severity: Severity) -> Result<DeliveryReport, NotifyError> {
        tracing::debug!(
            %severity,
            targets = self.targets.len(),
            "Dispatching notification: {}",
            message
        );

        if self.targets.is_empty() {
            return Err(NotifyError::NoTargets);
        }

        let mut report = DeliveryReport::default();

        for target in &self.targets {
            match target.send(message, severity).await {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    tracing::warn!(
                        target_name = target.target_name(),
                        "Notification delivery failed: {}",
                        err
                    );
                    report.failures.push(TargetFailure {
                        target: target.target_name().to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        if report.delivered == 0 {
            return Err(NotifyError::AllFailed {
                failures: report.failures,
            });
        }

        Ok(report)
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.targets.iter().map(|t| t.target_name()).collect();
        f.debug_struct("Notifier").field("targets", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::recording::RecordingTarget;

    #[tokio::test]
    async fn send_reaches_every_target() {
        let a = Arc::new(RecordingTarget::new("a"));
        let b = Arc::new(RecordingTarget::new("b"));
        let notifier = Notifier::new().with_target(a.clone()).with_target(b.clone());

        let report = notifier.send("hello", Severity::Info).await.unwrap();

        assert_eq!(report.delivered, 2);
        assert!(!report.is_partial());
        assert_eq!(a.sent(), vec![("hello".to_string(), Severity::Info)]);
        assert_eq!(b.sent(), vec![("hello".to_string(), Severity::Info)]);
    }

    #[tokio::test]
    async fn one_failing_target_does_not_block_others() {
        let bad = Arc::new(RecordingTarget::failing("bad"));
        let good = Arc::new(RecordingTarget::new("good"));
        let notifier = Notifier::new().with_target(bad).with_target(good.clone());

        let report = notifier.send("slot", Severity::Info).await.unwrap();

        assert_eq!(report.delivered, 1);
        assert!(report.is_partial());
        assert_eq!(report.failures[0].target, "bad");
        assert_eq!(good.sent().len(), 1);
    }

    #[tokio::test]
    async fn all_targets_failing_reports_each_failure() {
        let notifier = Notifier::new()
            .with_target(Arc::new(RecordingTarget::failing("a")))
            .with_target(Arc::new(RecordingTarget::failing("b")));

        let err = notifier.send("slot", Severity::Error).await.unwrap_err();

        match err {
            NotifyError::AllFailed { failures } => {
                let names: Vec<_> = failures.iter().map(|f| f.target.as_str()).collect();
                assert_eq!(names, vec!["a", "b"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_notifier_reports_no_targets() {
        let err = Notifier::new().send("x", Severity::Info).await.unwrap_err();
        assert_eq!(err, NotifyError::NoTargets);
    }

    #[test]
    fn from_urls_builds_one_target_per_url() {
        let urls = vec![
            "https://hooks.example.com/a".to_string(),
            "console://".to_string(),
        ];
        let notifier = Notifier::from_urls(&urls, reqwest::Client::new()).unwrap();
        assert_eq!(notifier.target_count(), 2);
    }

    #[test]
    fn from_urls_defaults_to_console() {
        let notifier = Notifier::from_urls(&[], reqwest::Client::new()).unwrap();
        assert_eq!(notifier.target_count(), 1);
        assert!(format!("{notifier:?}").contains("console"));
    }

    #[test]
    fn from_urls_rejects_unknown_scheme() {
        let urls = vec!["discord://id/token".to_string()];
        assert!(Notifier::from_urls(&urls, reqwest::Client::new()).is_err());
    }

    #[test]
    fn all_failed_error_message_lists_targets() {
        let err = NotifyError::AllFailed {
            failures: vec![TargetFailure {
                target: "hook".into(),
                error: "timeout".into(),
            }],
        };
        assert_eq!(
            err.to_string(),
            "All 1 notification targets failed: hook: timeout"
        );
    }
}
