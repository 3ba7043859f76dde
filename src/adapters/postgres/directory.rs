//! PostgreSQL implementation of the TenantDirectory port.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode, TenantId};
use crate::ports::{BillingContact, TenantDirectory};

/// Tenant directory reading billing contacts from the tenants table.
pub struct PostgresTenantDirectory {
    pool: PgPool,
}

impl PostgresTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ContactRow {
    billing_email: Option<String>,
    billing_name: Option<String>,
}

#[async_trait]
impl TenantDirectory for PostgresTenantDirectory {
    async fn billing_contact(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<BillingContact>, DomainError> {
        let row: Option<ContactRow> = sqlx::query_as(
            "SELECT billing_email, billing_name FROM tenants WHERE id = $1",
        )
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to load billing contact: {}", e),
            )
        })?;

        Ok(row.and_then(|row| {
            row.billing_email.map(|email| BillingContact {
                email,
                name: row.billing_name,
            })
        }))
    }
}
