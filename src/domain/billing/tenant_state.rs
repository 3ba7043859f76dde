//! Tenant account state machine.
//!
//! Tracks the service-level consequence of billing outcomes. The
//! reconciliation engine is the only writer; transitions are driven by
//! reconciled payment events, never directly by raw webhooks.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Tenant account state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantState {
    /// Tenant is in good standing with full service.
    Active,

    /// A payment has failed; service continues during the grace period.
    PastDue,

    /// Service is withdrawn. Reached through exhausted payment retries,
    /// involuntary subscription loss, or provider-side customer deletion.
    /// Only a genuine reactivation (completed checkout, recovered payment)
    /// leaves this state.
    Suspended,
}

impl TenantState {
    /// Returns true if the tenant currently receives service.
    pub fn has_service(&self) -> bool {
        matches!(self, TenantState::Active | TenantState::PastDue)
    }

    /// Returns true if the tenant is suspended.
    pub fn is_suspended(&self) -> bool {
        matches!(self, TenantState::Suspended)
    }
}

impl StateMachine for TenantState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use TenantState::*;
        matches!(
            (self, target),
            (Active, PastDue)
                | (Active, Suspended)
                | (PastDue, Active)
                | (PastDue, Suspended)
                | (Suspended, Active)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use TenantState::*;
        match self {
            Active => vec![PastDue, Suspended],
            PastDue => vec![Active, Suspended],
            Suspended => vec![Active],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_can_become_past_due() {
        assert!(TenantState::Active.can_transition_to(&TenantState::PastDue));
    }

    #[test]
    fn active_can_be_suspended_directly() {
        // Customer deletion at the provider suspends without a PastDue stop.
        assert!(TenantState::Active.can_transition_to(&TenantState::Suspended));
    }

    #[test]
    fn past_due_recovers_to_active() {
        let result = TenantState::PastDue.transition_to(TenantState::Active);
        assert_eq!(result, Ok(TenantState::Active));
    }

    #[test]
    fn suspended_can_reactivate() {
        assert!(TenantState::Suspended.can_transition_to(&TenantState::Active));
    }

    #[test]
    fn suspended_cannot_move_to_past_due() {
        assert!(!TenantState::Suspended.can_transition_to(&TenantState::PastDue));
    }

    #[test]
    fn no_state_is_terminal() {
        assert!(!TenantState::Active.is_terminal());
        assert!(!TenantState::PastDue.is_terminal());
        assert!(!TenantState::Suspended.is_terminal());
    }

    #[test]
    fn service_levels_are_correct() {
        assert!(TenantState::Active.has_service());
        assert!(TenantState::PastDue.has_service());
        assert!(!TenantState::Suspended.has_service());
        assert!(TenantState::Suspended.is_suspended());
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&TenantState::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");
    }
}
