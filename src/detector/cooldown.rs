use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::AlertKind;

/// Per alert-kind rate limiter
///
/// Remembers when each kind last fired and suppresses another fire of the
/// same kind within the configured interval. The interval is measured from
/// fire-time to fire-time: callers record a fire when the alert is
/// attempted, not when delivery is confirmed, so a flaky endpoint cannot
/// cause a storm of retried alerts.
///
/// `should_fire` and `record_fire` are separate calls. The single-threaded
/// processing loop is the only mutator, which keeps the pair safe without
/// locking.
#[derive(Debug)]
pub struct CooldownTracker {
    /// Minimum spacing between two fires of the same kind
    interval: Duration,

    /// Last fire time per kind; absent means never fired
    last_fired: HashMap<AlertKind, Instant>,
}

impl CooldownTracker {
    /// Create a tracker enforcing `interval` between same-kind fires
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: HashMap::new(),
        }
    }

    /// Whether an alert of `kind` may fire at `now`
    pub fn should_fire(&self, kind: AlertKind, now: Instant) -> bool {
        match self.last_fired.get(&kind) {
            Some(last) => now.saturating_duration_since(*last) >= self.interval,
            None => true,
        }
    }

    /// Record that an alert of `kind` fired at `now`
    pub fn record_fire(&mut self, kind: AlertKind, now: Instant) {
        self.last_fired.insert(kind, now);
    }

    /// Last fire time for `kind`, if it ever fired
    pub fn last_fired(&self, kind: AlertKind) -> Option<Instant> {
        self.last_fired.get(&kind).copied()
    }

    /// Configured cooldown interval
    pub fn interval(&self) -> Duration {
        self.interval
    }
}
