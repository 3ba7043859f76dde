//! HTTP provider client adapter.
//!
//! Implements the `ProviderClient` port against the payment provider's
//! REST API. The provider is treated as unreliable: connectivity problems
//! and 5xx responses map to retryable errors so the surrounding
//! reconciliation pass rolls back and retries later.
//!
//! # Security
//!
//! API keys are held in `secrecy::SecretString` and only exposed at the
//! point of the request.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::domain::billing::{
    BillingInfo, PaymentMethod, PaymentTransaction, Plan, SubscriptionSnapshot,
    TransactionStatus,
};
use crate::domain::foundation::{CustomerId, Timestamp};
use crate::ports::{
    CheckoutPreview, PlanPrice, PreviewLineItem, ProviderClient, ProviderError, UpgradePreview,
};

/// Provider API configuration.
#[derive(Clone)]
pub struct ProviderApiConfig {
    /// Secret API key.
    api_key: SecretString,

    /// Base URL for the provider API.
    api_base_url: String,
}

impl ProviderApiConfig {
    /// Create a new provider API configuration.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            api_base_url: "https://api.paymentprovider.com".to_string(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// HTTP implementation of the `ProviderClient` port.
pub struct HttpProviderClient {
    config: ProviderApiConfig,
    http_client: reqwest::Client,
}

impl HttpProviderClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ProviderApiConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    /// GET a JSON resource. `None` means the resource does not exist.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, ProviderError> {
        let url = format!("{}{}", self.config.api_base_url, path);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::authentication(format!(
                "provider rejected credentials ({})",
                status
            )));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::rate_limited("provider rate limit exceeded"));
        }
        if status.is_server_error() {
            return Err(ProviderError::api(format!(
                "provider returned server error ({})",
                status
            )));
        }
        if !status.is_success() {
            return Err(ProviderError::invalid_response(format!(
                "unexpected provider status {}",
                status
            )));
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| ProviderError::invalid_response(format!("malformed body: {}", e)))
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn sync_subscription_state(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<SubscriptionSnapshot>, ProviderError> {
        let path = format!("/v1/customers/{}/subscription", customer_id);
        let dto: Option<SnapshotDto> = self.get_json(&path, &[]).await?;
        dto.map(SubscriptionSnapshot::try_from).transpose()
    }

    async fn get_billing_info(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<BillingInfo>, ProviderError> {
        let path = format!("/v1/customers/{}/billing-info", customer_id);
        self.get_json(&path, &[]).await
    }

    async fn get_checkout_preview(
        &self,
        customer_id: &CustomerId,
        target_plan: Plan,
    ) -> Result<Option<CheckoutPreview>, ProviderError> {
        let path = format!("/v1/customers/{}/checkout-preview", customer_id);
        self.get_json(&path, &[("plan", plan_param(target_plan))])
            .await
    }

    async fn get_upgrade_preview(
        &self,
        provider_subscription_id: &str,
        target_plan: Plan,
    ) -> Result<Option<UpgradePreview>, ProviderError> {
        let path = format!("/v1/subscriptions/{}/upgrade-preview", provider_subscription_id);
        let dto: Option<UpgradePreviewDto> = self
            .get_json(&path, &[("plan", plan_param(target_plan))])
            .await?;
        Ok(dto.map(UpgradePreview::from))
    }

    async fn get_price_catalog(&self) -> Result<Vec<PlanPrice>, ProviderError> {
        let dto: Option<Vec<PlanPriceDto>> = self.get_json("/v1/prices", &[]).await?;
        let entries = dto.unwrap_or_default();

        let mut catalog = Vec::with_capacity(entries.len());
        for entry in entries {
            match parse_plan(&entry.plan) {
                Ok(plan) => catalog.push(PlanPrice {
                    plan,
                    amount_cents: entry.amount_cents,
                    currency: entry.currency,
                    provider_price_id: entry.price_id,
                }),
                Err(_) => {
                    // Plans we do not sell yet are not an error.
                    tracing::debug!(plan = %entry.plan, "skipping unknown plan in price catalog");
                }
            }
        }
        Ok(catalog)
    }
}

fn map_request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::network(format!("provider request timed out: {}", e))
    } else {
        ProviderError::network(format!("provider request failed: {}", e))
    }
}

fn plan_param(plan: Plan) -> &'static str {
    match plan {
        Plan::Basis => "basis",
        Plan::Standard => "standard",
        Plan::Premium => "premium",
    }
}

fn parse_plan(s: &str) -> Result<Plan, ProviderError> {
    match s {
        "basis" => Ok(Plan::Basis),
        "standard" => Ok(Plan::Standard),
        "premium" => Ok(Plan::Premium),
        other => Err(ProviderError::invalid_response(format!(
            "unknown plan '{}' in provider response",
            other
        ))),
    }
}

fn parse_transaction_status(s: &str) -> Result<TransactionStatus, ProviderError> {
    match s {
        "succeeded" => Ok(TransactionStatus::Succeeded),
        "failed" => Ok(TransactionStatus::Failed),
        "pending" => Ok(TransactionStatus::Pending),
        "refunded" => Ok(TransactionStatus::Refunded),
        other => Err(ProviderError::invalid_response(format!(
            "unknown transaction status '{}'",
            other
        ))),
    }
}

// ============================================
// Wire DTOs
// ============================================

#[derive(Debug, Deserialize)]
struct SnapshotDto {
    plan: String,
    scheduled_plan: Option<String>,
    subscription_id: String,
    /// Unix seconds.
    current_period_end: i64,
    cancel_at_period_end: bool,
    #[serde(default)]
    transactions: Vec<TransactionDto>,
    payment_method: Option<PaymentMethodDto>,
}

#[derive(Debug, Deserialize)]
struct TransactionDto {
    id: String,
    amount_cents: i64,
    currency: String,
    status: String,
    /// Unix seconds.
    date: i64,
    failure_reason: Option<String>,
    invoice_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentMethodDto {
    brand: String,
    last4: String,
    exp_month: u8,
    exp_year: u16,
}

#[derive(Debug, Deserialize)]
struct UpgradePreviewDto {
    total_amount_cents: i64,
    currency: String,
    #[serde(default)]
    line_items: Vec<LineItemDto>,
}

#[derive(Debug, Deserialize)]
struct LineItemDto {
    description: String,
    amount_cents: i64,
}

#[derive(Debug, Deserialize)]
struct PlanPriceDto {
    plan: String,
    amount_cents: i64,
    currency: String,
    price_id: String,
}

impl TryFrom<SnapshotDto> for SubscriptionSnapshot {
    type Error = ProviderError;

    fn try_from(dto: SnapshotDto) -> Result<Self, Self::Error> {
        let plan = parse_plan(&dto.plan)?;
        let scheduled_plan = dto.scheduled_plan.as_deref().map(parse_plan).transpose()?;
        let transactions = dto
            .transactions
            .into_iter()
            .map(PaymentTransaction::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SubscriptionSnapshot {
            plan,
            scheduled_plan,
            provider_subscription_id: dto.subscription_id,
            current_period_end: Timestamp::from_unix_secs(dto.current_period_end.max(0) as u64),
            cancel_at_period_end: dto.cancel_at_period_end,
            transactions,
            payment_method: dto.payment_method.map(PaymentMethod::from),
        })
    }
}

impl TryFrom<TransactionDto> for PaymentTransaction {
    type Error = ProviderError;

    fn try_from(dto: TransactionDto) -> Result<Self, Self::Error> {
        Ok(PaymentTransaction {
            id: dto.id,
            amount_cents: dto.amount_cents,
            currency: dto.currency,
            status: parse_transaction_status(&dto.status)?,
            date: Timestamp::from_unix_secs(dto.date.max(0) as u64),
            failure_reason: dto.failure_reason,
            invoice_url: dto.invoice_url,
        })
    }
}

impl From<PaymentMethodDto> for PaymentMethod {
    fn from(dto: PaymentMethodDto) -> Self {
        PaymentMethod {
            brand: dto.brand,
            last4: dto.last4,
            exp_month: dto.exp_month,
            exp_year: dto.exp_year,
        }
    }
}

impl From<UpgradePreviewDto> for UpgradePreview {
    fn from(dto: UpgradePreviewDto) -> Self {
        UpgradePreview {
            total_amount_cents: dto.total_amount_cents,
            currency: dto.currency,
            line_items: dto
                .line_items
                .into_iter()
                .map(|item| PreviewLineItem {
                    description: item.description,
                    amount_cents: item.amount_cents,
                })
                .collect(),
        }
    }
}
