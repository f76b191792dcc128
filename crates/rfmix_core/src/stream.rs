//! Stream State and Recovery Escalation
//!
//! Each pooled stream carries a `consecutive_failures` counter. Two
//! independent rules read it:
//!
//! ```text
//! reuse gate (lookup):  failures >= reuse threshold  -> recreate on next lookup
//! escalation (write):   == 1            -> clear native buffer (rate-limited)
//!                       == restart      -> stop + start, keep the record
//!                       >= destroy      -> drop the record entirely
//! ```
//!
//! Only a fully successful write resets the counter.

use std::time::{Duration, Instant};

use rfmix_platform::StreamHandle;

use crate::config::PoolConfig;

/// Corrective action chosen after a failed write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    None,
    ClearBuffer,
    Restart,
    Destroy,
}

/// Pool record owning one native stream
#[derive(Debug, Clone)]
pub struct StreamState {
    pub handle: StreamHandle,
    pub consecutive_failures: u32,
    pub last_write: Instant,
    pub last_clear: Option<Instant>,
}

impl StreamState {
    pub fn new(handle: StreamHandle, now: Instant) -> Self {
        Self {
            handle,
            consecutive_failures: 0,
            last_write: now,
            last_clear: None,
        }
    }

    /// Healthy enough to hand out from a lookup
    pub fn is_reusable(&self, policy: &PoolConfig) -> bool {
        self.consecutive_failures < policy.reuse_failure_threshold
    }

    pub fn on_write_complete(&mut self, now: Instant) {
        self.consecutive_failures = 0;
        self.last_write = now;
    }

    /// Escalate after a short write
    pub fn on_shortfall(&mut self, policy: &PoolConfig, now: Instant) -> RecoveryAction {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let failures = self.consecutive_failures;

        if failures >= policy.destroy_on_failure {
            RecoveryAction::Destroy
        } else if failures == policy.restart_on_failure {
            RecoveryAction::Restart
        } else if failures == 1 && self.try_reserve_clear(policy, now) {
            RecoveryAction::ClearBuffer
        } else {
            RecoveryAction::None
        }
    }

    /// A native exception counts as a failure and asks for an immediate clear
    pub fn on_exception(&mut self, policy: &PoolConfig, now: Instant) -> RecoveryAction {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.try_reserve_clear(policy, now) {
            RecoveryAction::ClearBuffer
        } else {
            RecoveryAction::None
        }
    }

    /// Force recreation on the next lookup
    pub fn mark_unhealthy(&mut self, policy: &PoolConfig) {
        self.consecutive_failures = self
            .consecutive_failures
            .max(policy.reuse_failure_threshold);
    }

    pub fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
        self.last_clear = None;
    }

    fn try_reserve_clear(&mut self, policy: &PoolConfig, now: Instant) -> bool {
        let spacing = Duration::from_millis(policy.min_clear_interval_ms);
        let allowed = match self.last_clear {
            Some(last) => now.saturating_duration_since(last) >= spacing,
            None => true,
        };
        if allowed {
            self.last_clear = Some(now);
        }
        allowed
    }
}
