//! HTTP notification sender.
//!
//! Delivers billing emails through a Resend-style transactional email
//! API. Failures surface as `NotificationFailed`, which callers log and
//! swallow; an email must never block a reconciliation commit.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{Notification, NotificationSender};

/// Email API configuration.
#[derive(Clone)]
pub struct EmailApiConfig {
    /// Secret API key.
    api_key: SecretString,

    /// Base URL for the email API.
    api_base_url: String,

    /// From email address.
    from_email: String,

    /// From display name.
    from_name: String,
}

impl EmailApiConfig {
    /// Create a new email API configuration.
    pub fn new(
        api_key: impl Into<String>,
        from_email: impl Into<String>,
        from_name: impl Into<String>,
    ) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            api_base_url: "https://api.resend.com".to_string(),
            from_email: from_email.into(),
            from_name: from_name.into(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Get formatted "From" header value.
    pub fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }
}

/// HTTP implementation of the `NotificationSender` port.
pub struct HttpNotificationSender {
    config: EmailApiConfig,
    http_client: reqwest::Client,
}

impl HttpNotificationSender {
    /// Create a new sender with the given configuration.
    pub fn new(config: EmailApiConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSender for HttpNotificationSender {
    async fn send(&self, notification: &Notification) -> Result<(), DomainError> {
        let url = format!("{}/emails", self.config.api_base_url);
        let body = json!({
            "from": self.config.from_header(),
            "to": [notification.recipient_email],
            "subject": notification.subject,
            "html": notification.html_body,
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::NotificationFailed,
                    format!("Email request failed: {}", e),
                )
            })?;

        if !response.status().is_success() {
            return Err(DomainError::new(
                ErrorCode::NotificationFailed,
                format!("Email API returned {}", response.status()),
            ));
        }
        Ok(())
    }
}
