//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the reconciliation engine and the outside world. Adapters implement
//! these ports.
//!
//! ## Storage Ports
//!
//! - `EventStore` - Idempotent record of inbound provider events
//! - `ReconciliationStore` / `ReconciliationTxn` - Transactional unit of
//!   work with per-customer locking
//!
//! ## Collaborator Ports
//!
//! - `ProviderClient` - Canonical billing state from the payment provider
//! - `NotificationSender` - Outbound billing emails
//! - `TelemetrySink` - Post-commit analytics events
//! - `TenantDirectory` - Billing contact lookup

mod event_store;
mod notification_sender;
mod provider_client;
mod reconciliation_store;
mod telemetry_sink;
mod tenant_directory;

pub use event_store::{EventStore, RecordOutcome};
pub use notification_sender::{Notification, NotificationSender};
pub use provider_client::{
    CheckoutPreview, PlanPrice, PreviewLineItem, ProviderClient, ProviderError,
    ProviderErrorCode, UpgradePreview,
};
pub use reconciliation_store::{LockedSubscription, ReconciliationStore, ReconciliationTxn};
pub use telemetry_sink::{TelemetryEvent, TelemetrySink};
pub use tenant_directory::{BillingContact, TenantDirectory};
