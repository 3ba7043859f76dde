//! Subscription aggregate entity.
//!
//! The Subscription is one tenant's billing relationship and the unit of
//! locking and consistency for reconciliation. Exactly one exists per
//! tenant, created in the Basis plan at tenant-creation time.
//!
//! # Design Decisions
//!
//! - **One per tenant**: unique constraint on tenant_id enforced at the
//!   database level
//! - **Money in cents**: all monetary values stored as i64 cents
//! - **Provider is source of truth**: plan, schedule, period, transactions
//!   and payment method are overwritten from the provider snapshot on every
//!   reconciliation pass; webhook payloads never construct state directly
//! - **Markers gate side effects**: `first_payment_failed_at`, `disputed_at`
//!   and `refunded_at` change only on genuine transitions, which is what
//!   makes notification dispatch redelivery-safe

use crate::domain::foundation::{SubscriptionId, TenantId, Timestamp};
use serde::{Deserialize, Serialize};

use super::{BillingInfo, PaymentMethod, PaymentTransaction, Plan};

/// Canonical subscription state pulled from the provider.
///
/// Produced by the provider client facade; consumed wholesale by
/// [`Subscription::apply_snapshot`]. Absence of a snapshot means the
/// customer has no active subscription and maps to the Basis plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub plan: Plan,
    pub scheduled_plan: Option<Plan>,
    pub provider_subscription_id: String,
    pub current_period_end: Timestamp,
    pub cancel_at_period_end: bool,
    pub transactions: Vec<PaymentTransaction>,
    pub payment_method: Option<PaymentMethod>,
}

/// Subscription aggregate - one tenant's billing relationship.
///
/// # Invariants
///
/// - `id` is globally unique; `tenant_id` is unique (one subscription per
///   tenant)
/// - Plan ordering is total, enabling upgrade/downgrade comparison
/// - `first_payment_failed_at` and tenant suspension are correlated but not
///   identical; suspension is a separate, later consequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique identifier for this subscription.
    pub id: SubscriptionId,

    /// Tenant that owns this subscription.
    pub tenant_id: TenantId,

    /// Current plan.
    pub plan: Plan,

    /// Pending downgrade taking effect at period end, if any.
    pub scheduled_plan: Option<Plan>,

    /// Provider customer ID; set once billing info is first saved.
    pub provider_customer_id: Option<String>,

    /// Provider subscription ID; absent on the free plan.
    pub provider_subscription_id: Option<String>,

    /// End of the current billing period.
    pub current_period_end: Option<Timestamp>,

    /// Whether the subscription ends at the current period boundary.
    pub cancel_at_period_end: bool,

    /// Set on the first payment failure, cleared on recovery. Presence
    /// signals "in payment-failure state".
    pub first_payment_failed_at: Option<Timestamp>,

    /// Throttles repeat billing emails.
    pub last_notification_sent_at: Option<Timestamp>,

    /// Set while an unresolved dispute exists.
    pub disputed_at: Option<Timestamp>,

    /// Set when a charge was refunded.
    pub refunded_at: Option<Timestamp>,

    /// User-entered cancellation reason, if the tenant cancelled.
    pub cancellation_reason: Option<String>,

    /// User-entered cancellation feedback.
    pub feedback: Option<String>,

    /// Card on file, mirrored from the provider.
    pub payment_method: Option<PaymentMethod>,

    /// Invoicing details, mirrored from the provider.
    pub billing_info: Option<BillingInfo>,

    /// Historical charges, mirrored from the provider.
    pub payment_transactions: Vec<PaymentTransaction>,

    /// When the subscription was created.
    pub created_at: Timestamp,

    /// When the subscription was last updated.
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Creates the subscription a new tenant starts with: Basis plan, no
    /// provider linkage.
    pub fn new_basis(id: SubscriptionId, tenant_id: TenantId) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            tenant_id,
            plan: Plan::Basis,
            scheduled_plan: None,
            provider_customer_id: None,
            provider_subscription_id: None,
            current_period_end: None,
            cancel_at_period_end: false,
            first_payment_failed_at: None,
            last_notification_sent_at: None,
            disputed_at: None,
            refunded_at: None,
            cancellation_reason: None,
            feedback: None,
            payment_method: None,
            billing_info: None,
            payment_transactions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the provider-owned portion of the aggregate from a
    /// canonical snapshot.
    pub fn apply_snapshot(&mut self, snapshot: &SubscriptionSnapshot) {
        self.plan = snapshot.plan;
        self.scheduled_plan = snapshot.scheduled_plan;
        self.provider_subscription_id = Some(snapshot.provider_subscription_id.clone());
        self.current_period_end = Some(snapshot.current_period_end);
        self.cancel_at_period_end = snapshot.cancel_at_period_end;
        self.payment_transactions = snapshot.transactions.clone();
        self.payment_method = snapshot.payment_method.clone();
        self.touch();
    }

    /// Resets the provider-owned portion to the free plan.
    ///
    /// Called when the provider reports no active subscription for the
    /// customer, so stale paid-plan data never survives a reconciliation.
    pub fn reset_to_free(&mut self) {
        self.plan = Plan::Basis;
        self.scheduled_plan = None;
        self.provider_subscription_id = None;
        self.current_period_end = None;
        self.cancel_at_period_end = false;
        self.payment_method = None;
        self.touch();
    }

    /// Records a payment failure.
    ///
    /// Returns true only on the transition into the failure state; repeat
    /// failures while already failed return false, which is what guards
    /// duplicate notifications.
    pub fn record_payment_failure(&mut self, at: Timestamp) -> bool {
        if self.first_payment_failed_at.is_some() {
            return false;
        }
        self.first_payment_failed_at = Some(at);
        self.touch();
        true
    }

    /// Clears a recorded payment failure.
    ///
    /// Returns true only if a failure was actually recorded.
    pub fn clear_payment_failure(&mut self) -> bool {
        if self.first_payment_failed_at.is_none() {
            return false;
        }
        self.first_payment_failed_at = None;
        self.touch();
        true
    }

    /// Marks an open dispute. Returns true on the transition.
    pub fn mark_disputed(&mut self, at: Timestamp) -> bool {
        if self.disputed_at.is_some() {
            return false;
        }
        self.disputed_at = Some(at);
        self.touch();
        true
    }

    /// Clears the dispute marker. Returns true if one was set.
    pub fn clear_dispute(&mut self) -> bool {
        if self.disputed_at.is_none() {
            return false;
        }
        self.disputed_at = None;
        self.touch();
        true
    }

    /// Marks a refund. Returns true on the transition.
    pub fn mark_refunded(&mut self, at: Timestamp) -> bool {
        if self.refunded_at.is_some() {
            return false;
        }
        self.refunded_at = Some(at);
        self.touch();
        true
    }

    /// Records that a billing notification went out.
    pub fn record_notification_sent(&mut self, at: Timestamp) {
        self.last_notification_sent_at = Some(at);
        self.touch();
    }

    /// Replaces the mirrored billing info.
    pub fn set_billing_info(&mut self, info: Option<BillingInfo>) {
        self.billing_info = info;
        self.touch();
    }

    /// Returns true while a payment failure is recorded.
    pub fn in_payment_failure(&self) -> bool {
        self.first_payment_failed_at.is_some()
    }

    /// Returns true if the user recorded a cancellation reason.
    pub fn has_cancellation_reason(&self) -> bool {
        self.cancellation_reason
            .as_deref()
            .map(|r| !r.trim().is_empty())
            .unwrap_or(false)
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}
