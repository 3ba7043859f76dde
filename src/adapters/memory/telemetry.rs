//! Recording telemetry sink for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::ports::{TelemetryEvent, TelemetrySink};

/// Telemetry double that records every tracked event.
#[derive(Default)]
pub struct RecordingTelemetrySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All tracked events so far.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Names of all tracked events, in order.
    pub fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }
}

#[async_trait]
impl TelemetrySink for RecordingTelemetrySink {
    async fn track_event(&self, event: TelemetryEvent) -> Result<(), DomainError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
