//! Recording notification sender for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{Notification, NotificationSender};

/// Notification double that records every send.
///
/// Supports failure injection so callers' "log and continue" handling can
/// be exercised.
#[derive(Default)]
pub struct RecordingNotificationSender {
    sent: Mutex<Vec<Notification>>,
    fail_sends: AtomicBool,
}

impl RecordingNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications accepted so far.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of notifications accepted so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Makes every subsequent send fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationSender for RecordingNotificationSender {
    async fn send(&self, notification: &Notification) -> Result<(), DomainError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::NotificationFailed,
                "simulated notification failure",
            ));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
