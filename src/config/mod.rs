//! Application configuration module
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Configuration is loaded with the
//! `BILLING_RECONCILER` prefix; nested values use double underscores as
//! separators.
//!
//! # Example
//!
//! ```no_run
//! use billing_reconciler::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod email;
mod error;
mod provider;
mod reconciler;

pub use database::DatabaseConfig;
pub use email::EmailConfig;
pub use error::{ConfigError, ValidationError};
pub use provider::ProviderConfig;
pub use reconciler::ReconcilerConfig;

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Payment provider configuration
    pub provider: ProviderConfig,

    /// Email configuration
    pub email: EmailConfig,

    /// Reconciliation engine configuration
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with the `BILLING_RECONCILER` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    ///
    /// # Environment Variable Format
    ///
    /// - `BILLING_RECONCILER__DATABASE__URL=postgres://…`
    /// - `BILLING_RECONCILER__PROVIDER__API_KEY=sk_…`
    /// - `BILLING_RECONCILER__RECONCILER__LOCK_TIMEOUT_SECS=5`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed into the expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("BILLING_RECONCILER")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.provider.validate()?;
        self.email.validate()?;
        self.reconciler.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            database: DatabaseConfig {
                url: "postgres://localhost/billing".to_string(),
                max_connections: 5,
                connect_timeout_secs: 10,
            },
            provider: ProviderConfig {
                api_key: "sk_test_key".to_string(),
                webhook_secret: "whsec_secret".to_string(),
                api_base_url: None,
            },
            email: EmailConfig {
                api_key: "re_key".to_string(),
                ..Default::default()
            },
            reconciler: ReconcilerConfig::default(),
        }
    }

    #[test]
    fn valid_config_validates() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validation_surfaces_section_errors() {
        let mut config = valid_config();
        config.database.url = String::new();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.provider.webhook_secret = "bad".to_string();
        assert!(config.validate().is_err());
    }
}
