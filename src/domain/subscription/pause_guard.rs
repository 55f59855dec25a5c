//! Voluntary pause allowance.

use super::{Subscription, SubscriptionError};

/// Caps how many voluntary pauses a subscription may take.
///
/// Dunning pauses never consult the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseCycleGuard {
    max_pause_cycles: u32,
}

impl PauseCycleGuard {
    pub const DEFAULT_MAX_PAUSE_CYCLES: u32 = 3;

    pub fn new(max_pause_cycles: u32) -> Self {
        Self { max_pause_cycles }
    }

    pub fn max_pause_cycles(&self) -> u32 {
        self.max_pause_cycles
    }

    pub fn can_pause(&self, subscription: &Subscription) -> bool {
        subscription.pause_count < self.max_pause_cycles
    }

    pub fn remaining_pause_cycles(&self, subscription: &Subscription) -> u32 {
        self.max_pause_cycles.saturating_sub(subscription.pause_count)
    }

    /// Fails with `PauseLimitExceeded` when the allowance is used up.
    pub fn check(&self, subscription: &Subscription) -> Result<(), SubscriptionError> {
        if self.can_pause(subscription) {
            Ok(())
        } else {
            Err(SubscriptionError::PauseLimitExceeded {
                max: self.max_pause_cycles,
                used: subscription.pause_count,
            })
        }
    }
}

impl Default for PauseCycleGuard {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_PAUSE_CYCLES)
    }
}
