//! Payment value objects embedded in the Subscription aggregate.
//!
//! Monetary amounts are integer cents throughout; floats never touch money.

use crate::domain::foundation::Timestamp;
use serde::{Deserialize, Serialize};

/// Card (or equivalent) on file with the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    /// Card brand as reported by the provider (e.g. "visa").
    pub brand: String,

    /// Last four digits for display.
    pub last4: String,

    /// Expiry month (1-12).
    pub exp_month: u8,

    /// Expiry year (four digits).
    pub exp_year: u16,
}

impl PaymentMethod {
    /// Masked display form, e.g. "visa •••• 4242".
    pub fn display(&self) -> String {
        format!("{} \u{2022}\u{2022}\u{2022}\u{2022} {}", self.brand, self.last4)
    }
}

/// Invoicing address and tax data for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingInfo {
    pub company_name: Option<String>,
    pub email: String,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    /// ISO 3166-1 alpha-2 country code.
    pub country: Option<String>,
    pub vat_id: Option<String>,
}

/// Outcome of a single historical charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Succeeded,
    Failed,
    Pending,
    Refunded,
}

/// One historical charge against the subscription.
///
/// Append-mostly: rows are replaced wholesale from the provider snapshot on
/// every reconciliation pass, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    /// Provider-assigned transaction/charge identifier.
    pub id: String,

    /// Amount in the smallest currency unit (cents).
    pub amount_cents: i64,

    /// ISO 4217 currency code, lowercase (provider convention).
    pub currency: String,

    pub status: TransactionStatus,

    /// When the charge happened.
    pub date: Timestamp,

    /// Provider failure reason, present only for failed charges.
    pub failure_reason: Option<String>,

    /// Hosted invoice URL, when the provider issued one.
    pub invoice_url: Option<String>,
}

impl PaymentTransaction {
    /// Returns true for charges that actually moved money.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            TransactionStatus::Succeeded | TransactionStatus::Refunded
        )
    }
}
