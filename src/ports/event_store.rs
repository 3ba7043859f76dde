//! EventStore port - append-only, idempotent record of inbound events.
//!
//! The store is the durable half of webhook deduplication. The provider
//! may deliver the same event many times (network timeouts, 5xx responses
//! from our ingress, acknowledgements lost in flight); `record` absorbs
//! every redelivery into a single row.
//!
//! Duplicate inserts are NOT errors - they are the dedup mechanism. Phase
//! one of the pipeline must always be able to acknowledge the webhook,
//! whether or not the call inserted anything, or the provider will retry
//! forever.

use async_trait::async_trait;

use crate::domain::billing::InboundEvent;
use crate::domain::foundation::{CustomerId, DomainError};

/// Result of attempting to record an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First time this provider event ID was seen; a row was inserted.
    Recorded,
    /// The event was already on file; nothing changed.
    Duplicate,
}

/// Port for the append-only inbound event store.
///
/// Implementations must make `record` atomic under concurrent calls with
/// the same provider event ID (unique constraint or equivalent
/// check-and-insert).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Inserts the event if its provider event ID is not already present.
    ///
    /// Returns whether this call caused an insert. Never fails on
    /// duplicates.
    async fn record(&self, event: InboundEvent) -> Result<RecordOutcome, DomainError>;

    /// Customers that currently have pending (unprocessed) events, oldest
    /// backlog first, capped at `limit`.
    ///
    /// Feeds the scheduled sweep that backstops lost reconciliation
    /// triggers.
    async fn customers_with_pending(&self, limit: usize)
        -> Result<Vec<CustomerId>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ProviderEventId;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    /// Minimal in-memory store exercising the contract.
    struct MapEventStore {
        events: RwLock<HashMap<ProviderEventId, InboundEvent>>,
    }

    impl MapEventStore {
        fn new() -> Self {
            Self {
                events: RwLock::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl EventStore for MapEventStore {
        async fn record(&self, event: InboundEvent) -> Result<RecordOutcome, DomainError> {
            let mut events = self.events.write().await;
            if events.contains_key(&event.provider_event_id) {
                Ok(RecordOutcome::Duplicate)
            } else {
                events.insert(event.provider_event_id.clone(), event);
                Ok(RecordOutcome::Recorded)
            }
        }

        async fn customers_with_pending(
            &self,
            limit: usize,
        ) -> Result<Vec<CustomerId>, DomainError> {
            let events = self.events.read().await;
            let mut customers: Vec<CustomerId> = Vec::new();
            for event in events.values().filter(|e| e.is_pending()) {
                if !customers.contains(&event.customer_id) {
                    customers.push(event.customer_id.clone());
                }
            }
            customers.truncate(limit);
            Ok(customers)
        }
    }

    fn event(id: &str, customer: &str) -> InboundEvent {
        InboundEvent::received(
            ProviderEventId::new(id).unwrap(),
            "invoice.payment_failed",
            CustomerId::new(customer).unwrap(),
            None,
            json!({}),
        )
    }

    #[tokio::test]
    async fn first_record_inserts() {
        let store = MapEventStore::new();

        let outcome = store.record(event("evt_1", "cus_1")).await.unwrap();

        assert_eq!(outcome, RecordOutcome::Recorded);
    }

    #[tokio::test]
    async fn second_record_with_same_id_is_duplicate() {
        let store = MapEventStore::new();

        store.record(event("evt_1", "cus_1")).await.unwrap();
        let outcome = store.record(event("evt_1", "cus_1")).await.unwrap();

        assert_eq!(outcome, RecordOutcome::Duplicate);
    }

    #[tokio::test]
    async fn pending_customers_deduplicated() {
        let store = MapEventStore::new();

        store.record(event("evt_1", "cus_1")).await.unwrap();
        store.record(event("evt_2", "cus_1")).await.unwrap();
        store.record(event("evt_3", "cus_2")).await.unwrap();

        let customers = store.customers_with_pending(10).await.unwrap();
        assert_eq!(customers.len(), 2);
    }

    #[tokio::test]
    async fn pending_customers_respects_limit() {
        let store = MapEventStore::new();

        store.record(event("evt_1", "cus_1")).await.unwrap();
        store.record(event("evt_2", "cus_2")).await.unwrap();
        store.record(event("evt_3", "cus_3")).await.unwrap();

        let customers = store.customers_with_pending(2).await.unwrap();
        assert_eq!(customers.len(), 2);
    }
}
