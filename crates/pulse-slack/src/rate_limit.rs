//! Local cooldown guard for rate-limited chat platform calls.
//!
//! `Idle -> Cooldown -> Idle` with lazy transitions: nothing runs in the
//! background, the window is evaluated on each check. While the cooldown is
//! active every call attempt is rejected locally instead of reaching the
//! platform; the first check at or after expiry clears the state and lets
//! exactly one retry through.

use std::sync::Mutex;

use crate::chat_client::ChatError;

/// Default suppression window after a rate-limit signal.
pub const DEFAULT_COOLDOWN_MS: u64 = 60_000;

/// Cooldown snapshot for status surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub in_cooldown: bool,
    pub remaining_seconds: u64,
}

/// Process-wide guard wrapped around every chat platform call.
pub struct RateLimitGuard {
    cooldown_ms: u64,
    cooldown_started_unix_ms: Mutex<Option<u64>>,
}

impl RateLimitGuard {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown_ms: cooldown_ms.max(1),
            cooldown_started_unix_ms: Mutex::new(None),
        }
    }

    /// Rejects with `CooldownActive` while inside the window; clears the
    /// cooldown and allows the call on the first check after it elapses.
    pub fn check(&self, now_unix_ms: u64) -> Result<(), ChatError> {
        let mut started = self
            .cooldown_started_unix_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(started_unix_ms) = *started else {
            return Ok(());
        };
        let elapsed = now_unix_ms.saturating_sub(started_unix_ms);
        if elapsed >= self.cooldown_ms {
            *started = None;
            return Ok(());
        }
        let remaining_ms = self.cooldown_ms - elapsed;
        Err(ChatError::CooldownActive {
            remaining_seconds: remaining_ms.div_ceil(1_000),
        })
    }

    /// Enters (or restarts) the cooldown window. Returns true only when the
    /// guard was idle, so callers can notify once per incident.
    pub fn record_rate_limit(&self, now_unix_ms: u64) -> bool {
        let mut started = self
            .cooldown_started_unix_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let was_idle = started.is_none();
        *started = Some(now_unix_ms);
        was_idle
    }

    /// Non-mutating snapshot of the current cooldown state.
    pub fn status(&self, now_unix_ms: u64) -> RateLimitStatus {
        let started = self
            .cooldown_started_unix_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *started {
            Some(started_unix_ms) => {
                let elapsed = now_unix_ms.saturating_sub(started_unix_ms);
                if elapsed >= self.cooldown_ms {
                    RateLimitStatus {
                        in_cooldown: false,
                        remaining_seconds: 0,
                    }
                } else {
                    RateLimitStatus {
                        in_cooldown: true,
                        remaining_seconds: (self.cooldown_ms - elapsed).div_ceil(1_000),
                    }
                }
            }
            None => RateLimitStatus {
                in_cooldown: false,
                remaining_seconds: 0,
            },
        }
    }
}

impl Default for RateLimitGuard {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_MS)
    }
}
