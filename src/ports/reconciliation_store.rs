//! ReconciliationStore port - transactional unit of work for phase two.
//!
//! A reconciliation pass mutates three things that must move together: the
//! subscription aggregate, the owning tenant's state, and the processed
//! flags on the batch of inbound events it consumed. This port exposes a
//! transaction object so all three commit or roll back as one.
//!
//! ## Locking
//!
//! `lock_subscription` takes a row-level lock on the subscription for the
//! given customer (`SELECT … FOR UPDATE` semantics, or an equivalent
//! per-customer mutex in test doubles). The lock serializes concurrent
//! reconciliations for the *same* customer while leaving different
//! customers fully parallel. Acquisition has a bounded wait; timing out
//! surfaces as `ErrorCode::LockTimeout`, which is retryable - the pending
//! events stay on file and the next trigger or sweep picks them up.

use async_trait::async_trait;

use crate::domain::billing::{InboundEvent, Subscription, TenantState};
use crate::domain::foundation::{
    CustomerId, DomainError, ProviderEventId, SubscriptionId, TenantId, Timestamp,
};

/// Subscription loaded under lock, together with the owning tenant's
/// current state.
#[derive(Debug, Clone)]
pub struct LockedSubscription {
    pub subscription: Subscription,
    pub tenant_state: TenantState,
}

/// Port for opening reconciliation transactions.
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Opens a transaction against the backing store.
    async fn begin(&self) -> Result<Box<dyn ReconciliationTxn>, DomainError>;
}

/// One open reconciliation transaction.
///
/// Dropping the transaction without calling `commit` must discard all
/// staged writes and release the lock.
#[async_trait]
pub trait ReconciliationTxn: Send {
    /// Locks and loads the subscription for a provider customer.
    ///
    /// Returns `None` if no subscription exists for the customer - the
    /// pass rolls back and the events stay pending. Lookup is unscoped by
    /// tenant: reconciliation runs outside any user request context.
    ///
    /// # Errors
    ///
    /// `ErrorCode::LockTimeout` if the bounded wait for the row lock
    /// elapsed.
    async fn lock_subscription(
        &mut self,
        customer_id: &CustomerId,
    ) -> Result<Option<LockedSubscription>, DomainError>;

    /// All pending events for the customer, in receipt order.
    async fn pending_events(
        &mut self,
        customer_id: &CustomerId,
    ) -> Result<Vec<InboundEvent>, DomainError>;

    /// Stages the updated subscription aggregate.
    async fn update_subscription(&mut self, subscription: &Subscription)
        -> Result<(), DomainError>;

    /// Stages the tenant state change.
    async fn update_tenant_state(
        &mut self,
        tenant_id: &TenantId,
        state: TenantState,
    ) -> Result<(), DomainError>;

    /// Stages the processed flag and resolved linkage for a batch of
    /// events. Must only ever run inside the same transaction as the
    /// aggregate mutation it corresponds to.
    async fn mark_processed(
        &mut self,
        event_ids: &[ProviderEventId],
        at: Timestamp,
        subscription_id: &SubscriptionId,
        tenant_id: &TenantId,
    ) -> Result<(), DomainError>;

    /// Commits all staged writes and releases the lock.
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    /// Discards all staged writes and releases the lock.
    ///
    /// Rolling back is cheap and correct whenever nothing should be
    /// persisted: missing subscription, empty batch, provider failure.
    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}
