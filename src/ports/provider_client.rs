//! ProviderClient port - facade over the external payment provider.
//!
//! The provider is the source of truth for billing facts. Every
//! reconciliation pass re-pulls canonical state through this facade rather
//! than deriving state from webhook payloads, because webhooks arrive out
//! of order, duplicated, or late; the batch of event *types* only decides
//! which side effects run, never what the new state is.
//!
//! The facade must be treated as unreliable: timeouts and transient errors
//! surface as retryable `ProviderError`s that roll the pass back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{BillingInfo, Plan, SubscriptionSnapshot};
use crate::domain::foundation::{CustomerId, DomainError, ErrorCode};

/// Port for pulling canonical billing state from the payment provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Pulls the full current truth for a customer.
    ///
    /// Returns `None` if the customer has no active subscription, which
    /// maps to the free Basis plan.
    async fn sync_subscription_state(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<SubscriptionSnapshot>, ProviderError>;

    /// Fetches the customer's invoicing details.
    async fn get_billing_info(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<BillingInfo>, ProviderError>;

    /// Previews the first charge for checking out into `target_plan`.
    async fn get_checkout_preview(
        &self,
        customer_id: &CustomerId,
        target_plan: Plan,
    ) -> Result<Option<CheckoutPreview>, ProviderError>;

    /// Previews the prorated charge for upgrading an existing subscription.
    async fn get_upgrade_preview(
        &self,
        provider_subscription_id: &str,
        target_plan: Plan,
    ) -> Result<Option<UpgradePreview>, ProviderError>;

    /// Current prices for all purchasable plans.
    async fn get_price_catalog(&self) -> Result<Vec<PlanPrice>, ProviderError>;
}

/// Preview of the first charge for a new checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutPreview {
    pub total_amount_cents: i64,
    pub currency: String,
    pub tax_amount_cents: i64,
}

/// One line of an upgrade preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewLineItem {
    pub description: String,
    pub amount_cents: i64,
}

/// Preview of the prorated charge for an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradePreview {
    pub total_amount_cents: i64,
    pub currency: String,
    pub line_items: Vec<PreviewLineItem>,
}

/// Published price for one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPrice {
    pub plan: Plan,
    pub amount_cents: i64,
    pub currency: String,
    /// Provider-side price identifier used at checkout.
    pub provider_price_id: String,
}

/// Errors from provider facade operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderError {
    /// Error code for categorization.
    pub code: ProviderErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl ProviderError {
    /// Create a new provider error.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationError, message)
    }

    /// Create a rate limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    /// Create an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    /// Create a provider-side API error.
    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ApiError, message)
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ProviderError {}

impl From<ProviderError> for DomainError {
    fn from(err: ProviderError) -> Self {
        DomainError::new(ErrorCode::ProviderUnavailable, err.message)
            .with_detail("provider_error_code", err.code.to_string())
    }
}

/// Provider error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorCode {
    /// Network connectivity issue or timeout.
    NetworkError,

    /// API authentication failed.
    AuthenticationError,

    /// Rate limit exceeded.
    RateLimited,

    /// Response body could not be interpreted.
    InvalidResponse,

    /// Provider reported a server-side error.
    ApiError,
}

impl ProviderErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderErrorCode::NetworkError
                | ProviderErrorCode::RateLimited
                | ProviderErrorCode::ApiError
        )
    }
}

impl std::fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderErrorCode::NetworkError => "network_error",
            ProviderErrorCode::AuthenticationError => "authentication_error",
            ProviderErrorCode::RateLimited => "rate_limited",
            ProviderErrorCode::InvalidResponse => "invalid_response",
            ProviderErrorCode::ApiError => "api_error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trait object safety test
    #[test]
    fn provider_client_is_object_safe() {
        fn _accepts_dyn(_client: &dyn ProviderClient) {}
    }

    #[test]
    fn network_and_rate_limit_errors_are_retryable() {
        assert!(ProviderErrorCode::NetworkError.is_retryable());
        assert!(ProviderErrorCode::RateLimited.is_retryable());
        assert!(ProviderErrorCode::ApiError.is_retryable());

        assert!(!ProviderErrorCode::AuthenticationError.is_retryable());
        assert!(!ProviderErrorCode::InvalidResponse.is_retryable());
    }

    #[test]
    fn provider_error_display_includes_code() {
        let err = ProviderError::network("connection refused");
        assert!(err.to_string().contains("network_error"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn provider_error_converts_to_domain_error() {
        let err = ProviderError::rate_limited("slow down");
        let domain: DomainError = err.into();
        assert_eq!(domain.code, ErrorCode::ProviderUnavailable);
        assert!(domain.is_retryable());
    }
}
