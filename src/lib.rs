//! Billing Reconciler - Webhook-driven billing reconciliation engine.
//!
//! Ingests payment-provider webhook notifications, deduplicates them, and
//! converts them into consistent, exactly-once-applied changes to tenant
//! subscription and account state.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
