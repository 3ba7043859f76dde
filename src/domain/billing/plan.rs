//! Subscription plan definitions.
//!
//! Plans form a total order (Basis < Standard < Premium) so that upgrade
//! and downgrade decisions are plain comparisons.

use serde::{Deserialize, Serialize};

/// Subscription plan level.
///
/// The derived `Ord` follows declaration order, which is the commercial
/// ordering: every later plan is a strict upgrade of every earlier one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    /// Free plan every tenant starts on.
    Basis,

    /// Entry paid plan.
    Standard,

    /// Full-feature paid plan.
    Premium,
}

impl Plan {
    /// Returns true if this plan is a paid plan.
    pub fn is_paid(&self) -> bool {
        !matches!(self, Plan::Basis)
    }

    /// Returns true if moving from `other` to this plan is an upgrade.
    pub fn is_upgrade_from(&self, other: Plan) -> bool {
        *self > other
    }

    /// Returns true if moving from `other` to this plan is a downgrade.
    pub fn is_downgrade_from(&self, other: Plan) -> bool {
        *self < other
    }

    /// Returns the display name for this plan.
    pub fn display_name(&self) -> &'static str {
        match self {
            Plan::Basis => "Basis",
            Plan::Standard => "Standard",
            Plan::Premium => "Premium",
        }
    }

    /// Returns the numeric rank of this plan for comparison.
    pub fn rank(&self) -> u8 {
        match self {
            Plan::Basis => 0,
            Plan::Standard => 1,
            Plan::Premium => 2,
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
