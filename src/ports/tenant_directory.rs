//! TenantDirectory port - read-only tenant/user directory.
//!
//! The engine never depends on ambient request context; it resolves the
//! billing contact for a tenant explicitly through this collaborator when
//! a notification is due.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, TenantId};

/// Who receives billing notifications for a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingContact {
    pub email: String,
    pub name: Option<String>,
}

/// Port for looking up tenant billing contacts.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Returns the billing contact for a tenant, if one is on file.
    async fn billing_contact(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<BillingContact>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn TenantDirectory) {}
}
