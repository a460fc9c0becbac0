use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::domain::UserId;

// ============== Rate Limiter (per-sender cooldown) ==============

/// Minimum spacing between accepted messages from the same sender.
///
/// Volatile by nature: a restart simply starts everyone with a fresh cooldown.
/// Never consulted for the owner.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    enabled: bool,
    cooldown: Duration,
    last_seen: HashMap<UserId, Instant>,
    /// Longest interval any caller has asked for; stamps older than this
    /// can no longer deny anything.
    horizon: Duration,
    /// Sweep stale stamps once the map reaches this size.
    sweep_at: usize,
}

const MIN_SWEEP: usize = 256;

impl RateLimiter {
    pub fn new(enabled: bool, cooldown: Duration) -> Self {
        Self {
            enabled: enabled && !cooldown.is_zero(),
            cooldown,
            last_seen: HashMap::new(),
            horizon: cooldown,
            sweep_at: MIN_SWEEP,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Accept and stamp `sender` iff at least `min_interval` has passed since
    /// its last accepted message. A rejected call leaves the state untouched.
    ///
    /// The interval passed in decides, whatever the configured cooldown.
    pub fn allow(&mut self, sender: UserId, now: Instant, min_interval: Duration) -> bool {
        if let Some(last) = self.last_seen.get(&sender) {
            if now.saturating_duration_since(*last) < min_interval {
                return false;
            }
        }

        self.horizon = self.horizon.max(min_interval);
        self.last_seen.insert(sender, now);
        if self.last_seen.len() >= self.sweep_at {
            self.sweep(now);
        }
        true
    }

    /// [`allow`](Self::allow) with the configured cooldown; always accepts
    /// when the limiter is disabled.
    pub fn check_at(&mut self, sender: UserId, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }
        let cooldown = self.cooldown;
        self.allow(sender, now, cooldown)
    }

    pub fn allow_now(&mut self, sender: UserId) -> bool {
        self.check_at(sender, Instant::now())
    }

    /// Number of senders currently tracked.
    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }

    fn sweep(&mut self, now: Instant) {
        let horizon = self.horizon;
        self.last_seen
            .retain(|_, last| now.saturating_duration_since(*last) < horizon);
        self.sweep_at = (self.last_seen.len() * 2).max(MIN_SWEEP);
    }

    /// How long `sender` still has to wait as of `now`.
    pub fn retry_after(&self, sender: UserId, now: Instant) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        let last = self.last_seen.get(&sender)?;
        let elapsed = now.saturating_duration_since(*last);
        (elapsed < self.cooldown).then(|| self.cooldown - elapsed)
    }
}
