//! In-memory implementation of the storage ports.
//!
//! Backs tests and local development. Per-customer mutual exclusion uses
//! an async mutex per customer instead of row locks - a coarser strategy
//! than the Postgres adapter, which is acceptable because the contract
//! only requires that two passes for the same customer never overlap.
//!
//! Writes are staged on the transaction object and applied to the shared
//! state atomically on commit; dropping the transaction discards them.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};
use tokio::time::timeout;

use crate::domain::billing::{InboundEvent, Subscription, TenantState};
use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, ProviderEventId, SubscriptionId, TenantId, Timestamp,
};
use crate::ports::{
    EventStore, LockedSubscription, ReconciliationStore, ReconciliationTxn, RecordOutcome,
};

/// Default bounded wait for the per-customer lock.
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct State {
    /// Inbound events in receipt order. Never removed.
    events: Vec<InboundEvent>,

    /// Subscription aggregates by ID.
    subscriptions: HashMap<SubscriptionId, Subscription>,

    /// Tenant account states.
    tenants: HashMap<TenantId, TenantState>,
}

impl State {
    fn subscription_for_customer(&self, customer_id: &CustomerId) -> Option<&Subscription> {
        self.subscriptions
            .values()
            .find(|s| s.provider_customer_id.as_deref() == Some(customer_id.as_str()))
    }
}

/// In-memory billing store implementing `EventStore` and
/// `ReconciliationStore`.
pub struct InMemoryBillingStore {
    state: Arc<RwLock<State>>,
    locks: Arc<StdMutex<HashMap<CustomerId, Arc<AsyncMutex<()>>>>>,
    lock_timeout: Duration,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            locks: Arc::new(StdMutex::new(HashMap::new())),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Overrides the bounded lock wait (tests exercise timeouts).
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Seeds a subscription and its tenant's state.
    ///
    /// The subscription must carry a provider customer ID or no
    /// reconciliation trigger will ever find it.
    pub async fn insert_subscription(&self, subscription: Subscription, tenant_state: TenantState) {
        let mut state = self.state.write().await;
        state.tenants.insert(subscription.tenant_id, tenant_state);
        state.subscriptions.insert(subscription.id, subscription);
    }

    /// Returns the current aggregate for a provider customer.
    pub async fn subscription_by_customer(&self, customer_id: &CustomerId) -> Option<Subscription> {
        let state = self.state.read().await;
        state.subscription_for_customer(customer_id).cloned()
    }

    /// Returns the current state of a tenant.
    pub async fn tenant_state(&self, tenant_id: &TenantId) -> Option<TenantState> {
        let state = self.state.read().await;
        state.tenants.get(tenant_id).copied()
    }

    /// Returns a stored event by provider event ID.
    pub async fn event(&self, provider_event_id: &ProviderEventId) -> Option<InboundEvent> {
        let state = self.state.read().await;
        state
            .events
            .iter()
            .find(|e| &e.provider_event_id == provider_event_id)
            .cloned()
    }

    /// Number of pending events for a customer.
    pub async fn pending_count(&self, customer_id: &CustomerId) -> usize {
        let state = self.state.read().await;
        state
            .events
            .iter()
            .filter(|e| e.is_pending() && &e.customer_id == customer_id)
            .count()
    }

    fn customer_lock(&self, customer_id: &CustomerId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("lock registry poisoned");
        locks
            .entry(customer_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

impl Default for InMemoryBillingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryBillingStore {
    async fn record(&self, event: InboundEvent) -> Result<RecordOutcome, DomainError> {
        let mut state = self.state.write().await;
        if state
            .events
            .iter()
            .any(|e| e.provider_event_id == event.provider_event_id)
        {
            return Ok(RecordOutcome::Duplicate);
        }
        state.events.push(event);
        Ok(RecordOutcome::Recorded)
    }

    async fn customers_with_pending(
        &self,
        limit: usize,
    ) -> Result<Vec<CustomerId>, DomainError> {
        let state = self.state.read().await;
        let mut customers: Vec<CustomerId> = Vec::new();
        for event in state.events.iter().filter(|e| e.is_pending()) {
            if !customers.contains(&event.customer_id) {
                customers.push(event.customer_id.clone());
                if customers.len() == limit {
                    break;
                }
            }
        }
        Ok(customers)
    }
}

#[async_trait]
impl ReconciliationStore for InMemoryBillingStore {
    async fn begin(&self) -> Result<Box<dyn ReconciliationTxn>, DomainError> {
        Ok(Box::new(InMemoryTxn {
            store: InMemoryBillingStore {
                state: Arc::clone(&self.state),
                locks: Arc::clone(&self.locks),
                lock_timeout: self.lock_timeout,
            },
            guard: None,
            staged: Vec::new(),
        }))
    }
}

enum StagedWrite {
    Subscription(Subscription),
    TenantState(TenantId, TenantState),
    Processed {
        event_ids: Vec<ProviderEventId>,
        at: Timestamp,
        subscription_id: SubscriptionId,
        tenant_id: TenantId,
    },
}

struct InMemoryTxn {
    store: InMemoryBillingStore,
    /// Held for the lifetime of the transaction once a subscription is
    /// locked; dropping it (commit or rollback) releases the customer.
    guard: Option<OwnedMutexGuard<()>>,
    staged: Vec<StagedWrite>,
}

#[async_trait]
impl ReconciliationTxn for InMemoryTxn {
    async fn lock_subscription(
        &mut self,
        customer_id: &CustomerId,
    ) -> Result<Option<LockedSubscription>, DomainError> {
        if self.guard.is_none() {
            let lock = self.store.customer_lock(customer_id);
            let guard = timeout(self.store.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    DomainError::new(
                        ErrorCode::LockTimeout,
                        format!("lock wait for customer {} elapsed", customer_id),
                    )
                })?;
            self.guard = Some(guard);
        }

        let state = self.store.state.read().await;
        let Some(subscription) = state.subscription_for_customer(customer_id) else {
            return Ok(None);
        };
        let tenant_state = state
            .tenants
            .get(&subscription.tenant_id)
            .copied()
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::TenantNotFound,
                    format!("tenant {} missing for subscription", subscription.tenant_id),
                )
            })?;

        Ok(Some(LockedSubscription {
            subscription: subscription.clone(),
            tenant_state,
        }))
    }

    async fn pending_events(
        &mut self,
        customer_id: &CustomerId,
    ) -> Result<Vec<InboundEvent>, DomainError> {
        let state = self.store.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.is_pending() && &e.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn update_subscription(
        &mut self,
        subscription: &Subscription,
    ) -> Result<(), DomainError> {
        self.staged
            .push(StagedWrite::Subscription(subscription.clone()));
        Ok(())
    }

    async fn update_tenant_state(
        &mut self,
        tenant_id: &TenantId,
        state: TenantState,
    ) -> Result<(), DomainError> {
        self.staged.push(StagedWrite::TenantState(*tenant_id, state));
        Ok(())
    }

    async fn mark_processed(
        &mut self,
        event_ids: &[ProviderEventId],
        at: Timestamp,
        subscription_id: &SubscriptionId,
        tenant_id: &TenantId,
    ) -> Result<(), DomainError> {
        self.staged.push(StagedWrite::Processed {
            event_ids: event_ids.to_vec(),
            at,
            subscription_id: *subscription_id,
            tenant_id: *tenant_id,
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let InMemoryTxn {
            store,
            guard,
            staged,
        } = *self;

        let mut state = store.state.write().await;
        for write in staged {
            match write {
                StagedWrite::Subscription(subscription) => {
                    state.subscriptions.insert(subscription.id, subscription);
                }
                StagedWrite::TenantState(tenant_id, tenant_state) => {
                    state.tenants.insert(tenant_id, tenant_state);
                }
                StagedWrite::Processed {
                    event_ids,
                    at,
                    subscription_id,
                    tenant_id,
                } => {
                    for event in state
                        .events
                        .iter_mut()
                        .filter(|e| event_ids.contains(&e.provider_event_id))
                    {
                        event.mark_processed(at, subscription_id, tenant_id);
                    }
                }
            }
        }
        drop(state);

        // The customer is released only once the writes are visible.
        drop(guard);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        // Staged writes are discarded with self; the guard drop releases
        // the customer.
        Ok(())
    }
}
