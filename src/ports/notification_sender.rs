//! NotificationSender port - outbound billing emails.
//!
//! Send failures are logged by the caller and never roll back the
//! reconciliation transaction: whether an email is *due* is decided by the
//! aggregate's own state markers, which are committed with the pass.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;

/// A billing notification ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient_email: String,
    pub subject: String,
    pub html_body: String,
}

impl Notification {
    pub fn new(
        recipient_email: impl Into<String>,
        subject: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Self {
        Self {
            recipient_email: recipient_email.into(),
            subject: subject.into(),
            html_body: html_body.into(),
        }
    }
}

/// Port for delivering billing notifications.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Sends one notification.
    async fn send(&self, notification: &Notification) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn NotificationSender) {}

    #[test]
    fn notification_constructor_converts_arguments() {
        let n = Notification::new("ops@example.com", "Payment failed", "<p>…</p>");
        assert_eq!(n.recipient_email, "ops@example.com");
        assert_eq!(n.subject, "Payment failed");
    }
}
