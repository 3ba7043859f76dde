//! Reconciliation engine configuration

use std::time::Duration;

use serde::Deserialize;

use super::error::ValidationError;

/// Reconciliation engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    /// Bounded wait for the per-customer lock, in seconds
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// How often the sweeper scans for pending backlogs, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Maximum customers reconciled per sweep cycle
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,
}

impl ReconcilerConfig {
    /// Lock timeout as a Duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// Sweep interval as a Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate reconciler configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.lock_timeout_secs == 0 || self.lock_timeout_secs > 60 {
            return Err(ValidationError::InvalidLockTimeout);
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        if self.sweep_batch_size == 0 {
            return Err(ValidationError::InvalidSweepBatchSize);
        }
        Ok(())
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: default_lock_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_batch_size: default_sweep_batch_size(),
        }
    }
}

fn default_lock_timeout_secs() -> u64 {
    5
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_sweep_batch_size() -> usize {
    50
}
