//! ReconciliationEngine - the two-phase webhook reconciliation pipeline.
//!
//! Phase one (`ingest`) records a single validated inbound event in the
//! event store and returns fast, so the webhook ingress can acknowledge
//! within its deadline regardless of whether phase two has run. Duplicate
//! deliveries are absorbed, never failed.
//!
//! Phase two (`reconcile_customer`) drains the pending backlog for one
//! customer under a per-customer lock: it re-pulls canonical state from the
//! provider, applies it to the subscription aggregate, derives side effects
//! from the distinct set of event kinds in the batch, marks the batch
//! processed, and commits - all in one transaction. Telemetry queued during
//! the pass is drained only after the commit succeeds.
//!
//! Both phases are safe to invoke arbitrarily many times: phase one is
//! keyed on the provider event ID, phase two becomes a cheap no-op once the
//! backlog is empty. Triggering is therefore allowed to be at-least-once
//! and lossy; the durable pending flag in the event store is what
//! guarantees nothing is dropped.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use crate::domain::billing::{InboundEvent, ProviderEventKind};
use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, StateMachine, TenantId, Timestamp,
};
use crate::ports::{
    BillingContact, EventStore, Notification, NotificationSender, ProviderClient, ProviderError,
    ReconciliationStore, ReconciliationTxn, RecordOutcome, TelemetryEvent, TelemetrySink,
    TenantDirectory,
};

use super::side_effects::SideEffectDispatcher;

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The pass mutated state and committed.
    Completed { events_processed: usize },

    /// No subscription exists for the customer yet. Benign: the events
    /// stay pending and the provider's redelivery retries later.
    NoSubscription,

    /// Another pass already drained the backlog, or the trigger was
    /// spurious. Benign no-op.
    NoPendingEvents,
}

/// Failure of one reconciliation pass. Nothing was persisted.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Bounded wait for the per-customer lock elapsed.
    #[error("timed out waiting for the customer reconciliation lock")]
    LockTimeout,

    /// The provider facade failed; the pass rolled back.
    #[error("provider sync failed: {0}")]
    Provider(ProviderError),

    /// The backing store failed.
    #[error("store operation failed: {0}")]
    Store(DomainError),

    /// A domain invariant would have been violated. Programmer error;
    /// never retried silently.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl ReconcileError {
    /// Whether redelivery or the scheduled sweep may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::LockTimeout => true,
            ReconcileError::Provider(e) => e.retryable,
            ReconcileError::Store(e) => e.is_retryable(),
            ReconcileError::InvariantViolation(_) => false,
        }
    }
}

impl From<DomainError> for ReconcileError {
    fn from(err: DomainError) -> Self {
        if err.code == ErrorCode::LockTimeout {
            ReconcileError::LockTimeout
        } else {
            ReconcileError::Store(err)
        }
    }
}

/// What a successful in-transaction pass leaves for the post-commit step.
enum Pass {
    Commit {
        events_processed: usize,
        notifications: Vec<Notification>,
        telemetry: Vec<TelemetryEvent>,
    },
    NoSubscription,
    NoPendingEvents,
}

/// The reconciliation engine.
///
/// All collaborators are ports; the engine itself holds no mutable state
/// and is freely shared across tasks.
pub struct ReconciliationEngine {
    events: Arc<dyn EventStore>,
    store: Arc<dyn ReconciliationStore>,
    provider: Arc<dyn ProviderClient>,
    directory: Arc<dyn TenantDirectory>,
    notifications: Arc<dyn NotificationSender>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ReconciliationEngine {
    pub fn new(
        events: Arc<dyn EventStore>,
        store: Arc<dyn ReconciliationStore>,
        provider: Arc<dyn ProviderClient>,
        directory: Arc<dyn TenantDirectory>,
        notifications: Arc<dyn NotificationSender>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            events,
            store,
            provider,
            directory,
            notifications,
            telemetry,
        }
    }

    /// Phase one: record a validated inbound event.
    ///
    /// Must be cheap and must never fail for an already-seen event ID - the
    /// provider would retry a non-2xx acknowledgement forever.
    pub async fn ingest(&self, event: InboundEvent) -> Result<RecordOutcome, DomainError> {
        let event_id = event.provider_event_id.clone();
        let customer_id = event.customer_id.clone();
        let event_type = event.event_type.clone();

        let outcome = self.events.record(event).await?;

        match outcome {
            RecordOutcome::Recorded => {
                tracing::info!(
                    provider_event_id = %event_id,
                    customer_id = %customer_id,
                    event_type = %event_type,
                    "recorded inbound provider event"
                );
            }
            RecordOutcome::Duplicate => {
                tracing::debug!(
                    provider_event_id = %event_id,
                    customer_id = %customer_id,
                    "duplicate provider event delivery absorbed"
                );
            }
        }

        Ok(outcome)
    }

    /// Phase two: reconcile one customer's pending backlog.
    ///
    /// Serialized per customer by the store's row lock; fully parallel
    /// across customers. Any failure rolls the whole pass back and leaves
    /// the backlog pending for the next trigger or sweep.
    pub async fn reconcile_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let mut txn = self.store.begin().await?;

        let pass = match self.run_pass(txn.as_mut(), customer_id).await {
            Ok(pass) => pass,
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::warn!(
                        customer_id = %customer_id,
                        error = %rollback_err,
                        "rollback after failed reconciliation pass also failed"
                    );
                }
                return Err(err);
            }
        };

        match pass {
            Pass::NoSubscription => {
                txn.rollback().await?;
                tracing::debug!(
                    customer_id = %customer_id,
                    "no subscription for customer; leaving events pending"
                );
                Ok(ReconcileOutcome::NoSubscription)
            }
            Pass::NoPendingEvents => {
                txn.rollback().await?;
                Ok(ReconcileOutcome::NoPendingEvents)
            }
            Pass::Commit {
                events_processed,
                notifications,
                telemetry,
            } => {
                txn.commit().await?;

                tracing::info!(
                    customer_id = %customer_id,
                    events_processed,
                    notifications = notifications.len(),
                    "reconciliation pass committed"
                );

                self.dispatch_notifications(&notifications).await;
                self.drain_telemetry(telemetry).await;

                Ok(ReconcileOutcome::Completed { events_processed })
            }
        }
    }

    /// Steps 2-10 of the pass, inside the open transaction.
    async fn run_pass(
        &self,
        txn: &mut dyn ReconciliationTxn,
        customer_id: &CustomerId,
    ) -> Result<Pass, ReconcileError> {
        // Serialize against concurrent passes for this customer.
        let locked = match txn.lock_subscription(customer_id).await? {
            Some(locked) => locked,
            None => return Ok(Pass::NoSubscription),
        };
        let mut subscription = locked.subscription;
        let tenant_state = locked.tenant_state;

        let pending = txn.pending_events(customer_id).await?;
        if pending.is_empty() {
            return Ok(Pass::NoPendingEvents);
        }

        // The provider is the source of truth; the webhook payloads are
        // not. Re-pulling here makes the pass convergent no matter how the
        // deliveries were ordered.
        match self
            .provider
            .sync_subscription_state(customer_id)
            .await
            .map_err(ReconcileError::Provider)?
        {
            Some(snapshot) => subscription.apply_snapshot(&snapshot),
            None => subscription.reset_to_free(),
        }

        let billing_info = self
            .provider
            .get_billing_info(customer_id)
            .await
            .map_err(ReconcileError::Provider)?;
        subscription.set_billing_info(billing_info);

        let kinds: HashSet<ProviderEventKind> =
            pending.iter().map(|event| event.kind.clone()).collect();

        let contact = self.lookup_contact(&subscription.tenant_id).await;

        let now = Timestamp::now();
        let effects = SideEffectDispatcher::apply(
            &kinds,
            &mut subscription,
            tenant_state,
            contact.as_ref(),
            now,
        );

        txn.update_subscription(&subscription).await?;

        if effects.tenant_state != tenant_state {
            if !tenant_state.can_transition_to(&effects.tenant_state) {
                return Err(ReconcileError::InvariantViolation(format!(
                    "illegal tenant state transition {:?} -> {:?} for tenant {}",
                    tenant_state, effects.tenant_state, subscription.tenant_id
                )));
            }
            txn.update_tenant_state(&subscription.tenant_id, effects.tenant_state)
                .await?;
        }

        let event_ids: Vec<_> = pending
            .iter()
            .map(|event| event.provider_event_id.clone())
            .collect();
        txn.mark_processed(&event_ids, now, &subscription.id, &subscription.tenant_id)
            .await?;

        Ok(Pass::Commit {
            events_processed: pending.len(),
            notifications: effects.notifications,
            telemetry: effects.telemetry,
        })
    }

    async fn lookup_contact(&self, tenant_id: &TenantId) -> Option<BillingContact> {
        match self.directory.billing_contact(tenant_id).await {
            Ok(contact) => contact,
            Err(err) => {
                // Missing contact only means no email goes out; the state
                // change itself must not depend on the directory.
                tracing::warn!(
                    tenant_id = %tenant_id,
                    error = %err,
                    "billing contact lookup failed; skipping notifications"
                );
                None
            }
        }
    }

    async fn dispatch_notifications(&self, notifications: &[Notification]) {
        for notification in notifications {
            if let Err(err) = self.notifications.send(notification).await {
                tracing::warn!(
                    recipient = %notification.recipient_email,
                    subject = %notification.subject,
                    error = %err,
                    "billing notification send failed"
                );
            }
        }
    }

    async fn drain_telemetry(&self, events: Vec<TelemetryEvent>) {
        for event in events {
            let name = event.name.clone();
            if let Err(err) = self.telemetry.track_event(event).await {
                tracing::warn!(event = %name, error = %err, "telemetry event dropped");
            }
        }
    }
}
