//! Tracing-backed telemetry sink.
//!
//! Default production sink: emits analytics events as structured log
//! lines under the `telemetry` target, where the log pipeline forwards
//! them to the analytics backend.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::ports::{TelemetryEvent, TelemetrySink};

/// Telemetry sink that logs events through `tracing`.
#[derive(Default)]
pub struct TracingTelemetrySink;

impl TracingTelemetrySink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TelemetrySink for TracingTelemetrySink {
    async fn track_event(&self, event: TelemetryEvent) -> Result<(), DomainError> {
        tracing::info!(
            target: "telemetry",
            event = %event.name,
            properties = %event.properties,
            "telemetry event"
        );
        Ok(())
    }
}
