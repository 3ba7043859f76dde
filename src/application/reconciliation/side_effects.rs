//! Side-effect dispatch for a reconciled batch.
//!
//! Applies the derived consequences of a batch of provider events: marker
//! transitions on the aggregate, tenant state edges, notifications, and
//! telemetry. The input is the **distinct set** of event kinds - two
//! deliveries of the same type in one batch produce one side effect.
//!
//! Every effect is idempotent given the aggregate's own state markers. A
//! payment-failed email goes out only on the *transition into* failure,
//! not on every batch that happens to contain a payment_failed event while
//! already failed. That is what makes replay after a crash-and-retry safe:
//! guards are state-based, never event-count-based.
//!
//! Kinds are handled in fixed precedence because several can co-occur in
//! one batch and some are mutually exclusive or order-sensitive; a
//! provider-side customer deletion wins over independent subscription
//! deletion handling in the same batch.

use std::collections::HashSet;

use serde_json::json;

use crate::domain::billing::{ProviderEventKind, Subscription, TenantState};
use crate::domain::foundation::Timestamp;
use crate::ports::{BillingContact, Notification, TelemetryEvent};

/// Everything a reconciliation pass owes the outside world after applying
/// one batch: the resulting tenant state, notifications to send, and
/// telemetry to drain post-commit.
#[derive(Debug)]
pub struct SideEffectPlan {
    pub tenant_state: TenantState,
    pub notifications: Vec<Notification>,
    pub telemetry: Vec<TelemetryEvent>,
}

/// Applies batch side effects in fixed precedence.
pub struct SideEffectDispatcher;

impl SideEffectDispatcher {
    /// Applies the distinct event kinds of one batch to the locked
    /// aggregate and the owning tenant's state.
    ///
    /// Mutates the aggregate's markers in place and returns the plan of
    /// outward effects. The caller persists the aggregate and tenant state
    /// inside the reconciliation transaction, then dispatches the plan
    /// after commit.
    pub fn apply(
        kinds: &HashSet<ProviderEventKind>,
        subscription: &mut Subscription,
        tenant_state: TenantState,
        contact: Option<&BillingContact>,
        now: Timestamp,
    ) -> SideEffectPlan {
        let mut state = tenant_state;
        let mut notifications = Vec::new();
        let mut telemetry = Vec::new();

        // 1. Payment succeeded: clear a recorded failure and recover the
        //    tenant. A suspended tenant without a failure marker (forced
        //    suspension) is not auto-reversed here.
        if kinds.contains(&ProviderEventKind::PaymentSucceeded)
            && subscription.clear_payment_failure()
        {
            telemetry.push(Self::event("billing.payment_recovered", subscription));
            if !matches!(state, TenantState::Active) {
                state = TenantState::Active;
            }
        }

        // 2. Payment failed: only on the transition into failure.
        if kinds.contains(&ProviderEventKind::PaymentFailed)
            && subscription.record_payment_failure(now)
        {
            if let Some(contact) = contact {
                notifications.push(Self::payment_failed_email(contact, subscription));
                subscription.record_notification_sent(now);
            }
            telemetry.push(Self::event("billing.payment_failed", subscription));
            if matches!(state, TenantState::Active) {
                state = TenantState::PastDue;
            }
        }

        // 3. Dispute opened.
        if kinds.contains(&ProviderEventKind::DisputeCreated) && subscription.mark_disputed(now)
        {
            if let Some(contact) = contact {
                notifications.push(Self::dispute_email(contact));
                subscription.record_notification_sent(now);
            }
            telemetry.push(Self::event("billing.dispute_opened", subscription));
        }

        // 4. Dispute resolved.
        if kinds.contains(&ProviderEventKind::DisputeClosed) && subscription.clear_dispute() {
            telemetry.push(Self::event("billing.dispute_resolved", subscription));
        }

        // 5. Refund.
        if kinds.contains(&ProviderEventKind::PaymentRefunded) && subscription.mark_refunded(now)
        {
            telemetry.push(Self::event("billing.payment_refunded", subscription));
        }

        // 6. Completed checkout reactivates the tenant.
        if kinds.contains(&ProviderEventKind::CheckoutCompleted) {
            if !matches!(state, TenantState::Active) {
                state = TenantState::Active;
            }
            telemetry.push(Self::event("billing.subscription_created", subscription));
        }

        // 7/8. Deletions. Customer deletion is checked first and
        // short-circuits the subscription-deleted branch for this batch.
        if kinds.contains(&ProviderEventKind::CustomerDeleted) {
            state = TenantState::Suspended;
        } else if kinds.contains(&ProviderEventKind::SubscriptionDeleted)
            && !state.is_suspended()
        {
            if subscription.has_cancellation_reason() && !subscription.in_payment_failure() {
                // The user cancelled and is paid up: benign transition to
                // the free plan, service continues.
                state = TenantState::Active;
            } else {
                state = TenantState::Suspended;
                telemetry.push(Self::event("billing.subscription_suspended", subscription));
            }
        }

        SideEffectPlan {
            tenant_state: state,
            notifications,
            telemetry,
        }
    }

    fn event(name: &str, subscription: &Subscription) -> TelemetryEvent {
        TelemetryEvent::new(
            name,
            json!({
                "tenant_id": subscription.tenant_id.to_string(),
                "subscription_id": subscription.id.to_string(),
                "plan": subscription.plan,
            }),
        )
    }

    fn payment_failed_email(contact: &BillingContact, subscription: &Subscription) -> Notification {
        let greeting = contact.name.as_deref().unwrap_or("there");
        Notification::new(
            contact.email.clone(),
            "Action required: your payment failed",
            format!(
                "<p>Hi {greeting},</p>\
                 <p>We could not collect the latest payment for your {} plan. \
                 Please update your payment method to keep your workspace active.</p>",
                subscription.plan.display_name()
            ),
        )
    }

    fn dispute_email(contact: &BillingContact) -> Notification {
        let greeting = contact.name.as_deref().unwrap_or("there");
        Notification::new(
            contact.email.clone(),
            "A payment dispute was opened",
            format!(
                "<p>Hi {greeting},</p>\
                 <p>Your bank reported a dispute for a recent charge. \
                 We will follow up with the details; no action is needed yet.</p>"
            ),
        )
    }
}
