//! Reconciliation pipeline.
//!
//! - `engine` - two-phase ingestion and per-customer reconciliation
//! - `side_effects` - fixed-precedence, state-gated batch side effects
//! - `sweeper` - scheduled backstop draining pending backlogs

mod engine;
mod side_effects;
mod sweeper;

pub use engine::{ReconcileError, ReconcileOutcome, ReconciliationEngine};
pub use side_effects::{SideEffectDispatcher, SideEffectPlan};
pub use sweeper::{Sweeper, SweeperConfig};
