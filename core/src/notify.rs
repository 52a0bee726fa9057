//! Outbound notification seam.
//!
//! The message sender sits outside the core's consistency boundary:
//! notifications are fire-and-forget, sent after commit, and a failed
//! send never rolls anything back.

use std::sync::{Arc, Mutex};

pub trait Notifier: Send {
    fn send(&self, account_id: &str, subject: &str, body: &str);
}

/// Default sender: writes the notification to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, account_id: &str, subject: &str, body: &str) {
        log::info!("notify account={account_id} subject={subject:?} body={body:?}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub account_id: String,
    pub subject: String,
    pub body: String,
}

/// Captures notifications instead of sending them. Used in tests.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentNotification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle onto the captured notifications, valid after the notifier
    /// itself has been boxed into an engine.
    pub fn handle(&self) -> Arc<Mutex<Vec<SentNotification>>> {
        Arc::clone(&self.sent)
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, account_id: &str, subject: &str, body: &str) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentNotification {
                account_id: account_id.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        }
    }
}
