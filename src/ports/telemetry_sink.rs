//! TelemetrySink port - best-effort analytics events.
//!
//! Telemetry is a post-commit, at-least-once side effect. Events queued
//! during a reconciliation pass are buffered and only drained to the sink
//! after the transaction commits; a crash between commit and drain can
//! duplicate telemetry but never state changes.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::domain::foundation::DomainError;

/// One analytics event.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    /// Event name, e.g. "billing.payment_recovered".
    pub name: String,

    /// Free-form properties.
    pub properties: JsonValue,
}

impl TelemetryEvent {
    pub fn new(name: impl Into<String>, properties: JsonValue) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }
}

/// Port for the analytics/metrics sink.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Records one event. Best-effort; callers log failures and continue.
    async fn track_event(&self, event: TelemetryEvent) -> Result<(), DomainError>;
}
