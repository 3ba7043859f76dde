//! Payment provider configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Payment provider configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    /// Provider API key
    pub api_key: String,

    /// Webhook signing secret
    pub webhook_secret: String,

    /// Base URL override for the provider API (optional, for testing)
    pub api_base_url: Option<String>,
}

impl ProviderConfig {
    /// Validate provider configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.api_key.is_empty() {
            return Err(ValidationError::MissingRequired("PROVIDER__API_KEY"));
        }
        if self.webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("PROVIDER__WEBHOOK_SECRET"));
        }
        if !self.webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidWebhookSecret);
        }
        if let Some(url) = &self.api_base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ValidationError::InvalidProviderUrl);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ProviderConfig {
        ProviderConfig {
            api_key: "sk_test_abc".to_string(),
            webhook_secret: "whsec_xyz".to_string(),
            api_base_url: None,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn missing_api_key_fails() {
        let mut cfg = valid();
        cfg.api_key = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn webhook_secret_prefix_is_enforced() {
        let mut cfg = valid();
        cfg.webhook_secret = "plain_secret".to_string();
        assert!(matches!(
            cfg.validate(),
            Err(ValidationError::InvalidWebhookSecret)
        ));
    }

    #[test]
    fn base_url_override_must_be_http() {
        let mut cfg = valid();
        cfg.api_base_url = Some("ftp://example.com".to_string());
        assert!(matches!(
            cfg.validate(),
            Err(ValidationError::InvalidProviderUrl)
        ));
    }
}
