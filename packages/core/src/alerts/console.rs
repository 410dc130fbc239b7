//! Console delivery.
//!
//! Prints each notification with a local timestamp so a user running the
//! scheduler in a terminal sees it even without any remote target.

use std::io::{self, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Local;

use crate::alerts::{NotificationTarget, NotifyError, Severity};

pub struct ConsoleTarget {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleTarget {
    /// Console target writing to stdout.
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl Default for ConsoleTarget {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationTarget for ConsoleTarget {
    async fn send(&self, message: &str, severity: Severity) -> Result<(), NotifyError> {
        let prefix = match severity {
            Severity::Info => "",
            Severity::Error => "error: ",
        };
        let line = format!(
            "{}: {}{}\n",
            Local::now().format("%Y/%m/%d %H:%M:%S"),
            prefix,
            message
        );

        let mut out = self.out.lock().map_err(|_| NotifyError::Transport {
            message: "console writer lock poisoned".to_string(),
        })?;
        out.write_all(line.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|err| NotifyError::Transport {
                message: err.to_string(),
            })
    }

    fn target_name(&self) -> &str {
        "console"
    }
}
