use chrono::Duration;

use crate::db_types::{AccountBalance, Order};

/// Configuration for the suffix lease pool.
#[derive(Debug, Clone, Copy)]
pub struct SuffixPoolConfig {
    /// Smallest suffix that may be leased. At least 1.
    pub min_suffix: u16,
    /// Largest suffix that may be leased. At most 999.
    pub max_suffix: u16,
    /// How long after a lease's nominal expiry the suffix is still held back from re-acquisition.
    ///
    /// A transfer that arrives just after the lease expired, while the order is still pending, must still match
    /// its order. The grace window keeps the suffix out of circulation for that long before it is reclaimed.
    pub grace: Duration,
}

impl Default for SuffixPoolConfig {
    fn default() -> Self {
        Self { min_suffix: 1, max_suffix: 999, grace: Duration::minutes(5) }
    }
}

impl SuffixPoolConfig {
    pub fn capacity(&self) -> usize {
        (self.max_suffix.saturating_sub(self.min_suffix) as usize) + 1
    }
}

/// The result of one reaper sweep.
#[derive(Debug, Clone, Default)]
pub struct ExpiryResult {
    pub expired: Vec<Order>,
}

impl ExpiryResult {
    pub fn new(expired: Vec<Order>) -> Self {
        Self { expired }
    }

    pub fn count(&self) -> usize {
        self.expired.len()
    }
}

/// The result of a balance credit. `applied` is false when the related order had already been credited and the
/// call was a no-op replay.
#[derive(Debug, Clone)]
pub struct CreditResult {
    pub balance: AccountBalance,
    pub applied: bool,
}
