//! PostgreSQL implementation of the storage ports.
//!
//! Dedup relies on the primary key over `provider_event_id` with
//! `ON CONFLICT DO NOTHING`; per-customer serialization relies on a
//! `SELECT … FOR UPDATE` row lock on the subscription, bounded by a
//! transaction-local `lock_timeout`. Read-committed isolation is
//! sufficient given the row lock.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::billing::{
    BillingInfo, InboundEvent, PaymentMethod, PaymentTransaction, Plan, ProviderEventKind,
    Subscription, TenantState,
};
use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, ProviderEventId, SubscriptionId, TenantId, Timestamp,
};
use crate::ports::{
    EventStore, LockedSubscription, ReconciliationStore, ReconciliationTxn, RecordOutcome,
};

/// Postgres SQLSTATE for "lock_not_available".
const SQLSTATE_LOCK_NOT_AVAILABLE: &str = "55P03";

/// Default bounded wait for the subscription row lock.
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// PostgreSQL billing store implementing `EventStore` and
/// `ReconciliationStore`.
pub struct PostgresBillingStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresBillingStore {
    /// Creates a store with the default lock timeout.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Overrides the bounded wait for the subscription row lock.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

#[async_trait]
impl EventStore for PostgresBillingStore {
    async fn record(&self, event: InboundEvent) -> Result<RecordOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO provider_events (
                provider_event_id, event_type, received_at, customer_id,
                provider_subscription_id, raw_payload
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (provider_event_id) DO NOTHING
            "#,
        )
        .bind(event.provider_event_id.as_str())
        .bind(&event.event_type)
        .bind(event.received_at.as_datetime())
        .bind(event.customer_id.as_str())
        .bind(&event.provider_subscription_id)
        .bind(&event.raw_payload)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to record event: {}", e))
        })?;

        if result.rows_affected() == 1 {
            Ok(RecordOutcome::Recorded)
        } else {
            Ok(RecordOutcome::Duplicate)
        }
    }

    async fn customers_with_pending(
        &self,
        limit: usize,
    ) -> Result<Vec<CustomerId>, DomainError> {
        let rows: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT customer_id
            FROM provider_events
            WHERE processed_at IS NULL
            GROUP BY customer_id
            ORDER BY MIN(seq)
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to list pending customers: {}", e),
            )
        })?;

        rows.into_iter()
            .map(|raw| CustomerId::new(raw).map_err(DomainError::from))
            .collect()
    }
}

#[async_trait]
impl ReconciliationStore for PostgresBillingStore {
    async fn begin(&self) -> Result<Box<dyn ReconciliationTxn>, DomainError> {
        let txn = self.pool.begin().await.map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to open transaction: {}", e),
            )
        })?;
        Ok(Box::new(PostgresTxn {
            txn,
            lock_timeout: self.lock_timeout,
            lock_timeout_applied: false,
        }))
    }
}

struct PostgresTxn {
    txn: Transaction<'static, Postgres>,
    lock_timeout: Duration,
    lock_timeout_applied: bool,
}

#[async_trait]
impl ReconciliationTxn for PostgresTxn {
    async fn lock_subscription(
        &mut self,
        customer_id: &CustomerId,
    ) -> Result<Option<LockedSubscription>, DomainError> {
        if !self.lock_timeout_applied {
            // SET LOCAL is scoped to this transaction only.
            let statement = format!(
                "SET LOCAL lock_timeout = '{}ms'",
                self.lock_timeout.as_millis()
            );
            sqlx::query(&statement)
                .execute(&mut *self.txn)
                .await
                .map_err(|e| {
                    DomainError::new(
                        ErrorCode::DatabaseError,
                        format!("Failed to set lock timeout: {}", e),
                    )
                })?;
            self.lock_timeout_applied = true;
        }

        let row: Option<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT s.id, s.tenant_id, s.plan, s.scheduled_plan,
                   s.provider_customer_id, s.provider_subscription_id,
                   s.current_period_end, s.cancel_at_period_end,
                   s.first_payment_failed_at, s.last_notification_sent_at,
                   s.disputed_at, s.refunded_at, s.cancellation_reason,
                   s.feedback, s.payment_method, s.billing_info,
                   s.payment_transactions, s.created_at, s.updated_at,
                   t.state AS tenant_state
            FROM subscriptions s
            JOIN tenants t ON t.id = s.tenant_id
            WHERE s.provider_customer_id = $1
            FOR UPDATE OF s
            "#,
        )
        .bind(customer_id.as_str())
        .fetch_optional(&mut *self.txn)
        .await
        .map_err(map_lock_error)?;

        row.map(LockedSubscription::try_from).transpose()
    }

    async fn pending_events(
        &mut self,
        customer_id: &CustomerId,
    ) -> Result<Vec<InboundEvent>, DomainError> {
        let rows: Vec<ProviderEventRow> = sqlx::query_as(
            r#"
            SELECT provider_event_id, event_type, received_at, processed_at,
                   customer_id, provider_subscription_id, subscription_id,
                   tenant_id, raw_payload
            FROM provider_events
            WHERE customer_id = $1 AND processed_at IS NULL
            ORDER BY seq
            "#,
        )
        .bind(customer_id.as_str())
        .fetch_all(&mut *self.txn)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to load pending events: {}", e),
            )
        })?;

        rows.into_iter().map(InboundEvent::try_from).collect()
    }

    async fn update_subscription(
        &mut self,
        subscription: &Subscription,
    ) -> Result<(), DomainError> {
        let payment_method = subscription
            .payment_method
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(json_error)?;
        let billing_info = subscription
            .billing_info
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(json_error)?;
        let transactions =
            serde_json::to_value(&subscription.payment_transactions).map_err(json_error)?;

        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                plan = $2,
                scheduled_plan = $3,
                provider_customer_id = $4,
                provider_subscription_id = $5,
                current_period_end = $6,
                cancel_at_period_end = $7,
                first_payment_failed_at = $8,
                last_notification_sent_at = $9,
                disputed_at = $10,
                refunded_at = $11,
                cancellation_reason = $12,
                feedback = $13,
                payment_method = $14,
                billing_info = $15,
                payment_transactions = $16,
                updated_at = $17
            WHERE id = $1
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(plan_to_string(&subscription.plan))
        .bind(subscription.scheduled_plan.as_ref().map(plan_to_string))
        .bind(&subscription.provider_customer_id)
        .bind(&subscription.provider_subscription_id)
        .bind(subscription.current_period_end.map(|t| *t.as_datetime()))
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.first_payment_failed_at.map(|t| *t.as_datetime()))
        .bind(
            subscription
                .last_notification_sent_at
                .map(|t| *t.as_datetime()),
        )
        .bind(subscription.disputed_at.map(|t| *t.as_datetime()))
        .bind(subscription.refunded_at.map(|t| *t.as_datetime()))
        .bind(&subscription.cancellation_reason)
        .bind(&subscription.feedback)
        .bind(payment_method)
        .bind(billing_info)
        .bind(transactions)
        .bind(subscription.updated_at.as_datetime())
        .execute(&mut *self.txn)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to update subscription: {}", e),
            )
        })?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                "Subscription not found",
            ));
        }
        Ok(())
    }

    async fn update_tenant_state(
        &mut self,
        tenant_id: &TenantId,
        state: TenantState,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE tenants SET state = $2, updated_at = now() WHERE id = $1",
        )
        .bind(tenant_id.as_uuid())
        .bind(tenant_state_to_string(&state))
        .execute(&mut *self.txn)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to update tenant state: {}", e),
            )
        })?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(ErrorCode::TenantNotFound, "Tenant not found"));
        }
        Ok(())
    }

    async fn mark_processed(
        &mut self,
        event_ids: &[ProviderEventId],
        at: Timestamp,
        subscription_id: &SubscriptionId,
        tenant_id: &TenantId,
    ) -> Result<(), DomainError> {
        let ids: Vec<String> = event_ids.iter().map(|id| id.as_str().to_string()).collect();
        sqlx::query(
            r#"
            UPDATE provider_events
            SET processed_at = $2, subscription_id = $3, tenant_id = $4
            WHERE provider_event_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .bind(at.as_datetime())
        .bind(subscription_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .execute(&mut *self.txn)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to mark events processed: {}", e),
            )
        })?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.txn.commit().await.map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Commit failed: {}", e))
        })
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.txn.rollback().await.map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Rollback failed: {}", e))
        })
    }
}

fn map_lock_error(e: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some(SQLSTATE_LOCK_NOT_AVAILABLE) {
            return DomainError::new(
                ErrorCode::LockTimeout,
                "Timed out waiting for subscription row lock",
            );
        }
    }
    DomainError::new(ErrorCode::DatabaseError, format!("Failed to lock subscription: {}", e))
}

fn json_error(e: serde_json::Error) -> DomainError {
    DomainError::new(ErrorCode::InternalError, format!("JSON encoding failed: {}", e))
}

/// Database row representation of a subscription joined with its tenant.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    tenant_id: Uuid,
    plan: String,
    scheduled_plan: Option<String>,
    provider_customer_id: Option<String>,
    provider_subscription_id: Option<String>,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    first_payment_failed_at: Option<DateTime<Utc>>,
    last_notification_sent_at: Option<DateTime<Utc>>,
    disputed_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    feedback: Option<String>,
    payment_method: Option<JsonValue>,
    billing_info: Option<JsonValue>,
    payment_transactions: JsonValue,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    tenant_state: String,
}

impl TryFrom<SubscriptionRow> for LockedSubscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let plan = parse_plan(&row.plan)?;
        let scheduled_plan = row.scheduled_plan.as_deref().map(parse_plan).transpose()?;
        let tenant_state = parse_tenant_state(&row.tenant_state)?;

        let payment_method: Option<PaymentMethod> = row
            .payment_method
            .map(serde_json::from_value)
            .transpose()
            .map_err(row_json_error)?;
        let billing_info: Option<BillingInfo> = row
            .billing_info
            .map(serde_json::from_value)
            .transpose()
            .map_err(row_json_error)?;
        let payment_transactions: Vec<PaymentTransaction> =
            serde_json::from_value(row.payment_transactions).map_err(row_json_error)?;

        Ok(LockedSubscription {
            subscription: Subscription {
                id: SubscriptionId::from_uuid(row.id),
                tenant_id: TenantId::from_uuid(row.tenant_id),
                plan,
                scheduled_plan,
                provider_customer_id: row.provider_customer_id,
                provider_subscription_id: row.provider_subscription_id,
                current_period_end: row.current_period_end.map(Timestamp::from_datetime),
                cancel_at_period_end: row.cancel_at_period_end,
                first_payment_failed_at: row
                    .first_payment_failed_at
                    .map(Timestamp::from_datetime),
                last_notification_sent_at: row
                    .last_notification_sent_at
                    .map(Timestamp::from_datetime),
                disputed_at: row.disputed_at.map(Timestamp::from_datetime),
                refunded_at: row.refunded_at.map(Timestamp::from_datetime),
                cancellation_reason: row.cancellation_reason,
                feedback: row.feedback,
                payment_method,
                billing_info,
                payment_transactions,
                created_at: Timestamp::from_datetime(row.created_at),
                updated_at: Timestamp::from_datetime(row.updated_at),
            },
            tenant_state,
        })
    }
}

/// Database row representation of an inbound event.
#[derive(Debug, sqlx::FromRow)]
struct ProviderEventRow {
    provider_event_id: String,
    event_type: String,
    received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    customer_id: String,
    provider_subscription_id: Option<String>,
    subscription_id: Option<Uuid>,
    tenant_id: Option<Uuid>,
    raw_payload: JsonValue,
}

impl TryFrom<ProviderEventRow> for InboundEvent {
    type Error = DomainError;

    fn try_from(row: ProviderEventRow) -> Result<Self, Self::Error> {
        let kind = ProviderEventKind::from_wire(&row.event_type);
        Ok(InboundEvent {
            provider_event_id: ProviderEventId::new(row.provider_event_id)?,
            event_type: row.event_type,
            kind,
            received_at: Timestamp::from_datetime(row.received_at),
            processed_at: row.processed_at.map(Timestamp::from_datetime),
            customer_id: CustomerId::new(row.customer_id)?,
            provider_subscription_id: row.provider_subscription_id,
            subscription_id: row.subscription_id.map(SubscriptionId::from_uuid),
            tenant_id: row.tenant_id.map(TenantId::from_uuid),
            raw_payload: row.raw_payload,
        })
    }
}

fn row_json_error(e: serde_json::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Invalid JSON column: {}", e))
}

fn parse_plan(s: &str) -> Result<Plan, DomainError> {
    match s.to_lowercase().as_str() {
        "basis" => Ok(Plan::Basis),
        "standard" => Ok(Plan::Standard),
        "premium" => Ok(Plan::Premium),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid plan value: {}", s),
        )),
    }
}

fn plan_to_string(plan: &Plan) -> &'static str {
    match plan {
        Plan::Basis => "basis",
        Plan::Standard => "standard",
        Plan::Premium => "premium",
    }
}

fn parse_tenant_state(s: &str) -> Result<TenantState, DomainError> {
    match s.to_lowercase().as_str() {
        "active" => Ok(TenantState::Active),
        "past_due" => Ok(TenantState::PastDue),
        "suspended" => Ok(TenantState::Suspended),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid tenant state value: {}", s),
        )),
    }
}

fn tenant_state_to_string(state: &TenantState) -> &'static str {
    match state {
        TenantState::Active => "active",
        TenantState::PastDue => "past_due",
        TenantState::Suspended => "suspended",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plan_works_for_all_values() {
        assert_eq!(parse_plan("basis").unwrap(), Plan::Basis);
        assert_eq!(parse_plan("standard").unwrap(), Plan::Standard);
        assert_eq!(parse_plan("premium").unwrap(), Plan::Premium);
        assert_eq!(parse_plan("Premium").unwrap(), Plan::Premium);
    }

    #[test]
    fn parse_plan_rejects_invalid_values() {
        assert!(parse_plan("enterprise").is_err());
        assert!(parse_plan("").is_err());
    }

    #[test]
    fn roundtrip_plan_conversion() {
        for plan in [Plan::Basis, Plan::Standard, Plan::Premium] {
            let s = plan_to_string(&plan);
            assert_eq!(parse_plan(s).unwrap(), plan);
        }
    }

    #[test]
    fn parse_tenant_state_works_for_all_values() {
        assert_eq!(parse_tenant_state("active").unwrap(), TenantState::Active);
        assert_eq!(parse_tenant_state("past_due").unwrap(), TenantState::PastDue);
        assert_eq!(
            parse_tenant_state("suspended").unwrap(),
            TenantState::Suspended
        );
    }

    #[test]
    fn parse_tenant_state_rejects_invalid_values() {
        assert!(parse_tenant_state("archived").is_err());
    }

    #[test]
    fn roundtrip_tenant_state_conversion() {
        for state in [
            TenantState::Active,
            TenantState::PastDue,
            TenantState::Suspended,
        ] {
            let s = tenant_state_to_string(&state);
            assert_eq!(parse_tenant_state(s).unwrap(), state);
        }
    }

    #[test]
    fn event_row_reclassifies_wire_type() {
        let row = ProviderEventRow {
            provider_event_id: "evt_1".to_string(),
            event_type: "invoice.payment_failed".to_string(),
            received_at: Utc::now(),
            processed_at: None,
            customer_id: "cus_1".to_string(),
            provider_subscription_id: None,
            subscription_id: None,
            tenant_id: None,
            raw_payload: serde_json::json!({}),
        };

        let event = InboundEvent::try_from(row).unwrap();
        assert_eq!(event.kind, ProviderEventKind::PaymentFailed);
        assert!(event.is_pending());
    }
}
