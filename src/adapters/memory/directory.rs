//! Static tenant directory for tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, TenantId};
use crate::ports::{BillingContact, TenantDirectory};

/// Tenant directory backed by a fixed map.
#[derive(Default)]
pub struct StaticTenantDirectory {
    contacts: RwLock<HashMap<TenantId, BillingContact>>,
}

impl StaticTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the billing contact for a tenant.
    pub async fn insert_contact(&self, tenant_id: TenantId, contact: BillingContact) {
        self.contacts.write().await.insert(tenant_id, contact);
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn billing_contact(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<BillingContact>, DomainError> {
        Ok(self.contacts.read().await.get(tenant_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_registered_contact() {
        let directory = StaticTenantDirectory::new();
        let tenant_id = TenantId::new();
        directory
            .insert_contact(
                tenant_id,
                BillingContact {
                    email: "owner@tenant.example".to_string(),
                    name: None,
                },
            )
            .await;

        let contact = directory.billing_contact(&tenant_id).await.unwrap();

        assert_eq!(contact.unwrap().email, "owner@tenant.example");
    }

    #[tokio::test]
    async fn returns_none_for_unknown_tenant() {
        let directory = StaticTenantDirectory::new();

        let contact = directory.billing_contact(&TenantId::new()).await.unwrap();

        assert!(contact.is_none());
    }
}
