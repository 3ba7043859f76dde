//! Mock provider client for testing.
//!
//! Configurable implementation of `ProviderClient` for unit and
//! integration tests. Supports pre-configured responses, error injection,
//! and call tracking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::billing::{BillingInfo, Plan, SubscriptionSnapshot};
use crate::domain::foundation::CustomerId;
use crate::ports::{
    CheckoutPreview, PlanPrice, ProviderClient, ProviderError, UpgradePreview,
};

/// Mock provider client.
///
/// # Example
///
/// ```ignore
/// let mock = MockProviderClient::new();
///
/// // Configure canonical state
/// mock.set_snapshot("cus_123", snapshot);
///
/// // Inject a transient failure for the next call
/// mock.set_error(ProviderError::network("connection reset"));
/// ```
#[derive(Default, Clone)]
pub struct MockProviderClient {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Canonical subscription state by customer ID. Absence means "no
    /// active subscription".
    snapshots: HashMap<String, SubscriptionSnapshot>,

    /// Billing info by customer ID.
    billing_info: HashMap<String, BillingInfo>,

    /// Checkout preview returned for any customer.
    checkout_preview: Option<CheckoutPreview>,

    /// Upgrade preview returned for any subscription.
    upgrade_preview: Option<UpgradePreview>,

    /// Price catalog.
    catalog: Vec<PlanPrice>,

    /// Error returned by the next call, then cleared.
    next_error: Option<ProviderError>,

    /// Method names in call order, for assertions.
    call_log: Vec<String>,
}

impl MockProviderClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the canonical snapshot for a customer.
    pub fn set_snapshot(&self, customer_id: impl Into<String>, snapshot: SubscriptionSnapshot) {
        self.inner
            .lock()
            .unwrap()
            .snapshots
            .insert(customer_id.into(), snapshot);
    }

    /// Removes the snapshot for a customer ("no active subscription").
    pub fn clear_snapshot(&self, customer_id: &str) {
        self.inner.lock().unwrap().snapshots.remove(customer_id);
    }

    /// Sets the billing info for a customer.
    pub fn set_billing_info(&self, customer_id: impl Into<String>, info: BillingInfo) {
        self.inner
            .lock()
            .unwrap()
            .billing_info
            .insert(customer_id.into(), info);
    }

    /// Sets the checkout preview response.
    pub fn set_checkout_preview(&self, preview: CheckoutPreview) {
        self.inner.lock().unwrap().checkout_preview = Some(preview);
    }

    /// Sets the upgrade preview response.
    pub fn set_upgrade_preview(&self, preview: UpgradePreview) {
        self.inner.lock().unwrap().upgrade_preview = Some(preview);
    }

    /// Sets the price catalog.
    pub fn set_catalog(&self, catalog: Vec<PlanPrice>) {
        self.inner.lock().unwrap().catalog = catalog;
    }

    /// Injects an error for the next call only.
    pub fn set_error(&self, error: ProviderError) {
        self.inner.lock().unwrap().next_error = Some(error);
    }

    /// Method names in call order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().call_log.clone()
    }

    fn enter(&self, method: &str) -> Result<(), ProviderError> {
        let mut state = self.inner.lock().unwrap();
        state.call_log.push(method.to_string());
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    async fn sync_subscription_state(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<SubscriptionSnapshot>, ProviderError> {
        self.enter("sync_subscription_state")?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .snapshots
            .get(customer_id.as_str())
            .cloned())
    }

    async fn get_billing_info(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<BillingInfo>, ProviderError> {
        self.enter("get_billing_info")?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .billing_info
            .get(customer_id.as_str())
            .cloned())
    }

    async fn get_checkout_preview(
        &self,
        _customer_id: &CustomerId,
        _target_plan: Plan,
    ) -> Result<Option<CheckoutPreview>, ProviderError> {
        self.enter("get_checkout_preview")?;
        Ok(self.inner.lock().unwrap().checkout_preview.clone())
    }

    async fn get_upgrade_preview(
        &self,
        _provider_subscription_id: &str,
        _target_plan: Plan,
    ) -> Result<Option<UpgradePreview>, ProviderError> {
        self.enter("get_upgrade_preview")?;
        Ok(self.inner.lock().unwrap().upgrade_preview.clone())
    }

    async fn get_price_catalog(&self) -> Result<Vec<PlanPrice>, ProviderError> {
        self.enter("get_price_catalog")?;
        Ok(self.inner.lock().unwrap().catalog.clone())
    }
}
