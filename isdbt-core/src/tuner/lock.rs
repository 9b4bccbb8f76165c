//! Caller-level signal-lock polling on top of the single-shot tuner operations.

use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::tuner::{DeviceBackend, TunerResource};

/// How long to wait for the frontend to report lock after a tune.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Number of lock checks.
    pub attempts: u32,
    /// Pause after each failed check.
    pub interval: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// Locked on the given (1-based) check.
    Locked { attempts: u32 },
    /// The budget ran out without a lock.
    NotLocked,
}

impl LockOutcome {
    pub fn is_locked(self) -> bool {
        matches!(self, LockOutcome::Locked { .. })
    }
}

/// Polls `signal_locked` up to `policy.attempts` times.
///
/// A failed status read counts as "not locked yet".
pub fn wait_for_lock<B: DeviceBackend>(tuner: &mut TunerResource<B>, policy: &LockPolicy) -> LockOutcome {
    for attempt in 1..=policy.attempts {
        match tuner.signal_locked() {
            Ok(true) => {
                debug!("[Lock] Locked after {} check(s)", attempt);
                return LockOutcome::Locked { attempts: attempt };
            }
            Ok(false) => debug!("[Lock] Not locked yet ({}/{})", attempt, policy.attempts),
            Err(e) => warn!("[Lock] Status check {} failed: {}", attempt, e),
        }
        if attempt < policy.attempts {
            thread::sleep(policy.interval);
        }
    }
    LockOutcome::NotLocked
}
