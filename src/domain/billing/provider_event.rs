//! Inbound provider webhook events.
//!
//! Every notification from the payment provider is recorded as an
//! `InboundEvent` before anything reacts to it. The raw event-type string
//! is classified into the closed `ProviderEventKind` enum once, at the
//! ingestion boundary; the rest of the pipeline never matches on strings.

use crate::domain::foundation::{CustomerId, ProviderEventId, SubscriptionId, TenantId, Timestamp};
use serde::{Deserialize, Serialize};

/// Classified provider event kind.
///
/// Closed set of the event types the reconciliation engine reacts to, plus
/// `Unknown` so unrecognized types are recorded (audit trail) and drained
/// without side effects rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderEventKind {
    /// `invoice.payment_succeeded`
    PaymentSucceeded,
    /// `invoice.payment_failed`
    PaymentFailed,
    /// `charge.dispute.created`
    DisputeCreated,
    /// `charge.dispute.closed`
    DisputeClosed,
    /// `charge.refunded`
    PaymentRefunded,
    /// `checkout.session.completed`
    CheckoutCompleted,
    /// `customer.deleted`
    CustomerDeleted,
    /// `customer.subscription.deleted`
    SubscriptionDeleted,
    /// Any other event type, preserved verbatim.
    Unknown(String),
}

impl ProviderEventKind {
    /// Classifies a wire event-type string.
    pub fn from_wire(event_type: &str) -> Self {
        match event_type {
            "invoice.payment_succeeded" => Self::PaymentSucceeded,
            "invoice.payment_failed" => Self::PaymentFailed,
            "charge.dispute.created" => Self::DisputeCreated,
            "charge.dispute.closed" => Self::DisputeClosed,
            "charge.refunded" => Self::PaymentRefunded,
            "checkout.session.completed" => Self::CheckoutCompleted,
            "customer.deleted" => Self::CustomerDeleted,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Returns the wire event-type string.
    pub fn as_wire(&self) -> &str {
        match self {
            Self::PaymentSucceeded => "invoice.payment_succeeded",
            Self::PaymentFailed => "invoice.payment_failed",
            Self::DisputeCreated => "charge.dispute.created",
            Self::DisputeClosed => "charge.dispute.closed",
            Self::PaymentRefunded => "charge.refunded",
            Self::CheckoutCompleted => "checkout.session.completed",
            Self::CustomerDeleted => "customer.deleted",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::Unknown(raw) => raw,
        }
    }

    /// Returns true if the engine has a handler for this kind.
    pub fn is_handled(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

/// One recorded notification from the payment provider.
///
/// # Invariants
///
/// - `provider_event_id` is globally unique; a second delivery of the same
///   ID is a no-op at the store.
/// - `processed_at` moves from `None` to `Some` exactly once, inside the
///   reconciliation transaction that consumed the event.
/// - Rows are never deleted; the pending/processed flag is the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Provider-assigned, globally unique event ID (the dedup key).
    pub provider_event_id: ProviderEventId,

    /// Raw wire event-type string, kept for audit.
    pub event_type: String,

    /// Classified kind, derived from `event_type` at ingestion.
    pub kind: ProviderEventKind,

    /// When this process first saw the event.
    pub received_at: Timestamp,

    /// When a reconciliation pass consumed the event. `None` means pending.
    pub processed_at: Option<Timestamp>,

    /// Provider-assigned customer the event belongs to.
    pub customer_id: CustomerId,

    /// Provider-side subscription ID from the payload, when present.
    pub provider_subscription_id: Option<String>,

    /// Our subscription aggregate, filled in once resolved.
    pub subscription_id: Option<SubscriptionId>,

    /// Owning tenant, filled in once resolved.
    pub tenant_id: Option<TenantId>,

    /// Opaque original payload for audit and replay.
    pub raw_payload: serde_json::Value,
}

impl InboundEvent {
    /// Creates a freshly received, pending event.
    pub fn received(
        provider_event_id: ProviderEventId,
        event_type: impl Into<String>,
        customer_id: CustomerId,
        provider_subscription_id: Option<String>,
        raw_payload: serde_json::Value,
    ) -> Self {
        let event_type = event_type.into();
        let kind = ProviderEventKind::from_wire(&event_type);
        Self {
            provider_event_id,
            event_type,
            kind,
            received_at: Timestamp::now(),
            processed_at: None,
            customer_id,
            provider_subscription_id,
            subscription_id: None,
            tenant_id: None,
            raw_payload,
        }
    }

    /// Returns true if no reconciliation pass has consumed this event yet.
    pub fn is_pending(&self) -> bool {
        self.processed_at.is_none()
    }

    /// Records consumption by a reconciliation pass with resolved linkage.
    pub fn mark_processed(
        &mut self,
        at: Timestamp,
        subscription_id: SubscriptionId,
        tenant_id: TenantId,
    ) {
        self.processed_at = Some(at);
        self.subscription_id = Some(subscription_id);
        self.tenant_id = Some(tenant_id);
    }
}
