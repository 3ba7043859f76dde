//! In-memory adapters.
//!
//! Production-representative doubles used by tests, local development,
//! and the integration suite.

mod directory;
mod notification;
mod store;
mod telemetry;

pub use directory::StaticTenantDirectory;
pub use notification::RecordingNotificationSender;
pub use store::InMemoryBillingStore;
pub use telemetry::RecordingTelemetrySink;
