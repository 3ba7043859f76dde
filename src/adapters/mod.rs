//! Adapters - infrastructure implementations of the ports.

pub mod email;
pub mod memory;
pub mod postgres;
pub mod provider;

mod telemetry;

pub use telemetry::TracingTelemetrySink;
