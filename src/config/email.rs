//! Email configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Email configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Email API key
    pub api_key: String,

    /// From email address
    #[serde(default = "default_from_email")]
    pub from_email: String,

    /// From name
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl EmailConfig {
    /// Validate email configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.api_key.is_empty() {
            return Err(ValidationError::MissingRequired("EMAIL__API_KEY"));
        }
        if !self.from_email.contains('@') {
            return Err(ValidationError::InvalidFromEmail);
        }
        Ok(())
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            from_email: default_from_email(),
            from_name: default_from_name(),
        }
    }
}

fn default_from_email() -> String {
    "billing@workspaces.example".to_string()
}

fn default_from_name() -> String {
    "Billing".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let config = EmailConfig::default();
        assert_eq!(config.from_name, "Billing");
        assert!(config.from_email.contains('@'));
    }

    #[test]
    fn missing_api_key_fails_validation() {
        assert!(EmailConfig::default().validate().is_err());
    }

    #[test]
    fn invalid_from_email_fails_validation() {
        let config = EmailConfig {
            api_key: "re_key".to_string(),
            from_email: "not-an-email".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFromEmail)
        ));
    }
}
