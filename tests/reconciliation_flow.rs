//! End-to-end tests for the reconciliation pipeline.
//!
//! Exercises both phases over the in-memory adapters: idempotent
//! ingestion, convergence regardless of delivery order, exactly-once side
//! effects under redelivery, per-customer mutual exclusion, and the
//! tenant-state scenarios around suspension and recovery.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use billing_reconciler::adapters::memory::{
    InMemoryBillingStore, RecordingNotificationSender, RecordingTelemetrySink,
    StaticTenantDirectory,
};
use billing_reconciler::adapters::provider::MockProviderClient;
use billing_reconciler::application::reconciliation::{ReconcileOutcome, ReconciliationEngine};
use billing_reconciler::domain::billing::{
    InboundEvent, Plan, Subscription, SubscriptionSnapshot, TenantState,
};
use billing_reconciler::domain::foundation::{
    CustomerId, ProviderEventId, SubscriptionId, TenantId, Timestamp,
};
use billing_reconciler::ports::{BillingContact, ProviderError, RecordOutcome};

// =============================================================================
// Test Harness
// =============================================================================

struct Harness {
    store: Arc<InMemoryBillingStore>,
    provider: MockProviderClient,
    notifications: Arc<RecordingNotificationSender>,
    telemetry: Arc<RecordingTelemetrySink>,
    directory: Arc<StaticTenantDirectory>,
    engine: Arc<ReconciliationEngine>,
}

fn build_harness() -> Harness {
    let store = Arc::new(InMemoryBillingStore::new());
    let provider = MockProviderClient::new();
    let notifications = Arc::new(RecordingNotificationSender::new());
    let telemetry = Arc::new(RecordingTelemetrySink::new());
    let directory = Arc::new(StaticTenantDirectory::new());

    let engine = Arc::new(ReconciliationEngine::new(
        store.clone(),
        store.clone(),
        Arc::new(provider.clone()),
        directory.clone(),
        notifications.clone(),
        telemetry.clone(),
    ));

    Harness {
        store,
        provider,
        notifications,
        telemetry,
        directory,
        engine,
    }
}

fn customer(id: &str) -> CustomerId {
    CustomerId::new(id).unwrap()
}

/// Seeds a subscription for the customer plus a billing contact, returning
/// the tenant ID.
async fn seed_tenant(harness: &Harness, customer_id: &CustomerId, state: TenantState) -> TenantId {
    let mut subscription = Subscription::new_basis(SubscriptionId::new(), TenantId::new());
    subscription.provider_customer_id = Some(customer_id.as_str().to_string());
    let tenant_id = subscription.tenant_id;

    harness
        .directory
        .insert_contact(
            tenant_id,
            BillingContact {
                email: format!("billing+{}@tenant.example", customer_id.as_str()),
                name: Some("Jo".to_string()),
            },
        )
        .await;
    harness.store.insert_subscription(subscription, state).await;
    tenant_id
}

fn event(id: &str, event_type: &str, customer_id: &CustomerId) -> InboundEvent {
    InboundEvent::received(
        ProviderEventId::new(id).unwrap(),
        event_type,
        customer_id.clone(),
        None,
        json!({ "type": event_type }),
    )
}

fn good_standing_snapshot(plan: Plan) -> SubscriptionSnapshot {
    SubscriptionSnapshot {
        plan,
        scheduled_plan: None,
        provider_subscription_id: "sub_live".to_string(),
        current_period_end: Timestamp::now().add_days(30),
        cancel_at_period_end: false,
        transactions: vec![],
        payment_method: None,
    }
}

// =============================================================================
// Phase One
// =============================================================================

#[tokio::test]
async fn ingestion_is_idempotent_per_provider_event_id() {
    let harness = build_harness();
    let customer = customer("cus_ingest");

    let first = harness
        .engine
        .ingest(event("evt_1", "invoice.payment_failed", &customer))
        .await
        .unwrap();
    let second = harness
        .engine
        .ingest(event("evt_1", "invoice.payment_failed", &customer))
        .await
        .unwrap();

    assert_eq!(first, RecordOutcome::Recorded);
    assert_eq!(second, RecordOutcome::Duplicate);
    assert_eq!(harness.store.pending_count(&customer).await, 1);
}

// =============================================================================
// Phase Two - basics
// =============================================================================

#[tokio::test]
async fn reconcile_applies_canonical_provider_state() {
    let harness = build_harness();
    let customer = customer("cus_sync");
    let tenant_id = seed_tenant(&harness, &customer, TenantState::Active).await;
    harness
        .provider
        .set_snapshot(customer.as_str(), good_standing_snapshot(Plan::Premium));

    harness
        .engine
        .ingest(event("evt_1", "invoice.payment_succeeded", &customer))
        .await
        .unwrap();
    let outcome = harness.engine.reconcile_customer(&customer).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Completed { events_processed: 1 });

    let subscription = harness.store.subscription_by_customer(&customer).await.unwrap();
    assert_eq!(subscription.plan, Plan::Premium);
    assert_eq!(subscription.provider_subscription_id.as_deref(), Some("sub_live"));

    // The batch is marked processed with resolved linkage.
    let stored = harness
        .store
        .event(&ProviderEventId::new("evt_1").unwrap())
        .await
        .unwrap();
    assert!(!stored.is_pending());
    assert_eq!(stored.subscription_id, Some(subscription.id));
    assert_eq!(stored.tenant_id, Some(tenant_id));
}

#[tokio::test]
async fn missing_subscription_is_benign_and_leaves_events_pending() {
    let harness = build_harness();
    let customer = customer("cus_unknown");

    harness
        .engine
        .ingest(event("evt_1", "invoice.payment_failed", &customer))
        .await
        .unwrap();
    let outcome = harness.engine.reconcile_customer(&customer).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::NoSubscription);
    assert_eq!(harness.store.pending_count(&customer).await, 1);
}

#[tokio::test]
async fn empty_backlog_is_a_cheap_no_op() {
    let harness = build_harness();
    let customer = customer("cus_idle");
    seed_tenant(&harness, &customer, TenantState::Active).await;

    let outcome = harness.engine.reconcile_customer(&customer).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::NoPendingEvents);
}

#[tokio::test]
async fn absent_provider_subscription_resets_to_free_plan() {
    let harness = build_harness();
    let customer = customer("cus_gone");
    seed_tenant(&harness, &customer, TenantState::Active).await;
    // No snapshot configured: the provider reports no active subscription.

    harness
        .engine
        .ingest(event("evt_1", "customer.subscription.deleted", &customer))
        .await
        .unwrap();
    harness.engine.reconcile_customer(&customer).await.unwrap();

    let subscription = harness.store.subscription_by_customer(&customer).await.unwrap();
    assert_eq!(subscription.plan, Plan::Basis);
    assert!(subscription.provider_subscription_id.is_none());
}

#[tokio::test]
async fn unknown_event_types_are_drained_without_side_effects() {
    let harness = build_harness();
    let customer = customer("cus_misc");
    seed_tenant(&harness, &customer, TenantState::Active).await;
    harness
        .provider
        .set_snapshot(customer.as_str(), good_standing_snapshot(Plan::Standard));

    harness
        .engine
        .ingest(event("evt_1", "customer.tax_id.created", &customer))
        .await
        .unwrap();
    let outcome = harness.engine.reconcile_customer(&customer).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Completed { events_processed: 1 });
    assert_eq!(harness.notifications.sent_count(), 0);
    assert!(harness.telemetry.events().is_empty());
    assert_eq!(harness.store.pending_count(&customer).await, 0);
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn provider_failure_rolls_back_and_retry_succeeds() {
    let harness = build_harness();
    let customer = customer("cus_flaky");
    seed_tenant(&harness, &customer, TenantState::Active).await;
    harness
        .provider
        .set_snapshot(customer.as_str(), good_standing_snapshot(Plan::Standard));

    harness
        .engine
        .ingest(event("evt_1", "invoice.payment_failed", &customer))
        .await
        .unwrap();

    harness
        .provider
        .set_error(ProviderError::network("connection reset"));
    let err = harness.engine.reconcile_customer(&customer).await.unwrap_err();
    assert!(err.is_retryable());

    // Nothing was persisted; the backlog survives for the retry.
    assert_eq!(harness.store.pending_count(&customer).await, 1);
    let subscription = harness.store.subscription_by_customer(&customer).await.unwrap();
    assert!(!subscription.in_payment_failure());
    assert_eq!(harness.notifications.sent_count(), 0);

    // The redelivered trigger succeeds once the provider recovers.
    let outcome = harness.engine.reconcile_customer(&customer).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Completed { events_processed: 1 });
    assert_eq!(harness.notifications.sent_count(), 1);
}

#[tokio::test]
async fn notification_failure_does_not_block_the_commit() {
    let harness = build_harness();
    let customer = customer("cus_mailless");
    seed_tenant(&harness, &customer, TenantState::Active).await;
    harness
        .provider
        .set_snapshot(customer.as_str(), good_standing_snapshot(Plan::Standard));
    harness.notifications.fail_sends(true);

    harness
        .engine
        .ingest(event("evt_1", "invoice.payment_failed", &customer))
        .await
        .unwrap();
    let outcome = harness.engine.reconcile_customer(&customer).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Completed { events_processed: 1 });
    let subscription = harness.store.subscription_by_customer(&customer).await.unwrap();
    assert!(subscription.in_payment_failure());
    assert_eq!(harness.store.pending_count(&customer).await, 0);
}

// =============================================================================
// Exactly-once side effects
// =============================================================================

#[tokio::test]
async fn redelivery_and_retriggering_send_at_most_one_email() {
    let harness = build_harness();
    let customer = customer("cus_redeliver");
    seed_tenant(&harness, &customer, TenantState::Active).await;
    harness
        .provider
        .set_snapshot(customer.as_str(), good_standing_snapshot(Plan::Standard));

    harness
        .engine
        .ingest(event("evt_1", "invoice.payment_failed", &customer))
        .await
        .unwrap();
    harness.engine.reconcile_customer(&customer).await.unwrap();
    assert_eq!(harness.notifications.sent_count(), 1);

    // Redelivery of the same event is absorbed in phase one…
    let outcome = harness
        .engine
        .ingest(event("evt_1", "invoice.payment_failed", &customer))
        .await
        .unwrap();
    assert_eq!(outcome, RecordOutcome::Duplicate);

    // …and a legitimate second trigger finds nothing to do.
    let outcome = harness.engine.reconcile_customer(&customer).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::NoPendingEvents);
    assert_eq!(harness.notifications.sent_count(), 1);

    // A *new* failure event while already failed is state-gated too.
    harness
        .engine
        .ingest(event("evt_2", "invoice.payment_failed", &customer))
        .await
        .unwrap();
    harness.engine.reconcile_customer(&customer).await.unwrap();
    assert_eq!(harness.notifications.sent_count(), 1);
}

// =============================================================================
// Mutual exclusion
// =============================================================================

#[tokio::test]
async fn concurrent_triggers_for_one_customer_mutate_exactly_once() {
    let harness = build_harness();
    let customer = customer("cus_race");
    seed_tenant(&harness, &customer, TenantState::Active).await;
    harness
        .provider
        .set_snapshot(customer.as_str(), good_standing_snapshot(Plan::Standard));

    harness
        .engine
        .ingest(event("evt_1", "invoice.payment_failed", &customer))
        .await
        .unwrap();

    let engine_a = harness.engine.clone();
    let engine_b = harness.engine.clone();
    let customer_a = customer.clone();
    let customer_b = customer.clone();

    let (a, b) = tokio::join!(
        tokio::spawn(async move { engine_a.reconcile_customer(&customer_a).await }),
        tokio::spawn(async move { engine_b.reconcile_customer(&customer_b).await }),
    );
    let outcomes = [a.unwrap().unwrap(), b.unwrap().unwrap()];

    let completed = outcomes
        .iter()
        .filter(|o| matches!(o, ReconcileOutcome::Completed { .. }))
        .count();
    let no_ops = outcomes
        .iter()
        .filter(|o| matches!(o, ReconcileOutcome::NoPendingEvents))
        .count();

    // One pass consumed the batch; the other blocked on the lock and then
    // found the backlog empty.
    assert_eq!(completed, 1);
    assert_eq!(no_ops, 1);
    assert_eq!(harness.notifications.sent_count(), 1);
    assert_eq!(harness.store.pending_count(&customer).await, 0);
}

// =============================================================================
// Tenant-state scenarios
// =============================================================================

#[tokio::test]
async fn happy_path_recovery_clears_failure_marker() {
    let harness = build_harness();
    let customer = customer("cus_recover");
    let tenant_id = seed_tenant(&harness, &customer, TenantState::Active).await;

    // Get into the failure state first.
    harness
        .provider
        .set_snapshot(customer.as_str(), good_standing_snapshot(Plan::Standard));
    harness
        .engine
        .ingest(event("evt_1", "invoice.payment_failed", &customer))
        .await
        .unwrap();
    harness.engine.reconcile_customer(&customer).await.unwrap();
    assert_eq!(
        harness.store.tenant_state(&tenant_id).await,
        Some(TenantState::PastDue)
    );

    // Payment recovers; provider reports good standing.
    harness
        .engine
        .ingest(event("evt_2", "invoice.payment_succeeded", &customer))
        .await
        .unwrap();
    harness.engine.reconcile_customer(&customer).await.unwrap();

    let subscription = harness.store.subscription_by_customer(&customer).await.unwrap();
    assert!(!subscription.in_payment_failure());
    assert_eq!(
        harness.store.tenant_state(&tenant_id).await,
        Some(TenantState::Active)
    );
    assert!(harness
        .telemetry
        .event_names()
        .contains(&"billing.payment_recovered".to_string()));
}

#[tokio::test]
async fn involuntary_subscription_loss_suspends_the_tenant() {
    let harness = build_harness();
    let customer = customer("cus_involuntary");
    let tenant_id = seed_tenant(&harness, &customer, TenantState::Active).await;

    // A payment failure precedes the provider cancelling the subscription.
    harness
        .provider
        .set_snapshot(customer.as_str(), good_standing_snapshot(Plan::Standard));
    harness
        .engine
        .ingest(event("evt_1", "invoice.payment_failed", &customer))
        .await
        .unwrap();
    harness.engine.reconcile_customer(&customer).await.unwrap();

    harness.provider.clear_snapshot(customer.as_str());
    harness
        .engine
        .ingest(event("evt_2", "customer.subscription.deleted", &customer))
        .await
        .unwrap();
    harness.engine.reconcile_customer(&customer).await.unwrap();

    assert_eq!(
        harness.store.tenant_state(&tenant_id).await,
        Some(TenantState::Suspended)
    );
    assert!(harness
        .telemetry
        .event_names()
        .contains(&"billing.subscription_suspended".to_string()));
}

#[tokio::test]
async fn voluntary_cancellation_downgrades_without_suspension() {
    let harness = build_harness();
    let customer = customer("cus_voluntary");
    let tenant_id = seed_tenant(&harness, &customer, TenantState::Active).await;

    // The user recorded a cancellation reason and is paid up.
    let mut subscription = harness.store.subscription_by_customer(&customer).await.unwrap();
    subscription.cancellation_reason = Some("project finished".to_string());
    harness
        .store
        .insert_subscription(subscription, TenantState::Active)
        .await;

    harness
        .engine
        .ingest(event("evt_1", "customer.subscription.deleted", &customer))
        .await
        .unwrap();
    harness.engine.reconcile_customer(&customer).await.unwrap();

    assert_eq!(
        harness.store.tenant_state(&tenant_id).await,
        Some(TenantState::Active)
    );
    assert!(!harness
        .telemetry
        .event_names()
        .contains(&"billing.subscription_suspended".to_string()));

    let subscription = harness.store.subscription_by_customer(&customer).await.unwrap();
    assert_eq!(subscription.plan, Plan::Basis);
}

#[tokio::test]
async fn customer_deleted_takes_precedence_over_subscription_deleted() {
    let harness = build_harness();
    let customer = customer("cus_deleted");
    let tenant_id = seed_tenant(&harness, &customer, TenantState::Active).await;

    // A cancellation reason exists, but customer deletion must win.
    let mut subscription = harness.store.subscription_by_customer(&customer).await.unwrap();
    subscription.cancellation_reason = Some("leaving".to_string());
    harness
        .store
        .insert_subscription(subscription, TenantState::Active)
        .await;

    harness
        .engine
        .ingest(event("evt_1", "customer.subscription.deleted", &customer))
        .await
        .unwrap();
    harness
        .engine
        .ingest(event("evt_2", "customer.deleted", &customer))
        .await
        .unwrap();
    harness.engine.reconcile_customer(&customer).await.unwrap();

    assert_eq!(
        harness.store.tenant_state(&tenant_id).await,
        Some(TenantState::Suspended)
    );
    assert!(!harness
        .telemetry
        .event_names()
        .contains(&"billing.subscription_suspended".to_string()));
}

#[tokio::test]
async fn checkout_completed_reactivates_a_suspended_tenant() {
    let harness = build_harness();
    let customer = customer("cus_comeback");
    let tenant_id = seed_tenant(&harness, &customer, TenantState::Suspended).await;
    harness
        .provider
        .set_snapshot(customer.as_str(), good_standing_snapshot(Plan::Premium));

    harness
        .engine
        .ingest(event("evt_1", "checkout.session.completed", &customer))
        .await
        .unwrap();
    harness.engine.reconcile_customer(&customer).await.unwrap();

    assert_eq!(
        harness.store.tenant_state(&tenant_id).await,
        Some(TenantState::Active)
    );
    let subscription = harness.store.subscription_by_customer(&customer).await.unwrap();
    assert_eq!(subscription.plan, Plan::Premium);
    assert!(harness
        .telemetry
        .event_names()
        .contains(&"billing.subscription_created".to_string()));
}

// =============================================================================
// Convergence regardless of delivery order
// =============================================================================

const CONVERGENCE_EVENT_TYPES: [&str; 5] = [
    "invoice.payment_failed",
    "invoice.payment_succeeded",
    "charge.dispute.created",
    "charge.refunded",
    "invoice.payment_failed",
];

/// Runs one reconciliation over the convergence batch delivered in the
/// given order and returns the observable end state.
async fn run_convergence_order(
    order: &[usize],
) -> (Subscription, TenantState, usize, Vec<String>) {
    let harness = build_harness();
    let customer = customer("cus_converge");
    let tenant_id = seed_tenant(&harness, &customer, TenantState::Active).await;
    harness
        .provider
        .set_snapshot(customer.as_str(), good_standing_snapshot(Plan::Standard));

    for &index in order {
        harness
            .engine
            .ingest(event(
                &format!("evt_{}", index),
                CONVERGENCE_EVENT_TYPES[index],
                &customer,
            ))
            .await
            .unwrap();
    }
    harness.engine.reconcile_customer(&customer).await.unwrap();

    let subscription = harness.store.subscription_by_customer(&customer).await.unwrap();
    let tenant_state = harness.store.tenant_state(&tenant_id).await.unwrap();
    let mut telemetry = harness.telemetry.event_names();
    telemetry.sort();
    (
        subscription,
        tenant_state,
        harness.notifications.sent_count(),
        telemetry,
    )
}

#[tokio::test]
async fn failed_then_succeeded_converges_with_the_reverse_order() {
    let (sub_a, state_a, emails_a, telemetry_a) = run_convergence_order(&[0, 1]).await;
    let (sub_b, state_b, emails_b, telemetry_b) = run_convergence_order(&[1, 0]).await;

    assert_eq!(sub_a.plan, sub_b.plan);
    assert_eq!(sub_a.first_payment_failed_at.is_some(), sub_b.first_payment_failed_at.is_some());
    assert_eq!(state_a, state_b);
    assert_eq!(emails_a, emails_b);
    assert_eq!(telemetry_a, telemetry_b);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Any permutation of the batch reaches the same end state, because
    /// side effects key off the distinct kind set and the aggregate's own
    /// markers, never off delivery order.
    #[test]
    fn any_delivery_order_converges(order in Just(vec![0usize, 1, 2, 3, 4]).prop_shuffle()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (sub_a, state_a, emails_a, telemetry_a) =
            runtime.block_on(run_convergence_order(&order));
        let (sub_b, state_b, emails_b, telemetry_b) =
            runtime.block_on(run_convergence_order(&[0, 1, 2, 3, 4]));

        prop_assert_eq!(sub_a.plan, sub_b.plan);
        prop_assert_eq!(
            sub_a.first_payment_failed_at.is_some(),
            sub_b.first_payment_failed_at.is_some()
        );
        prop_assert_eq!(sub_a.disputed_at.is_some(), sub_b.disputed_at.is_some());
        prop_assert_eq!(sub_a.refunded_at.is_some(), sub_b.refunded_at.is_some());
        prop_assert_eq!(state_a, state_b);
        prop_assert_eq!(emails_a, emails_b);
        prop_assert_eq!(telemetry_a, telemetry_b);
    }
}
