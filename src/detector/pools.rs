use tracing::{debug, info};

/// Candidate event produced by [`PoolTracker::observe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolChange {
    /// Traffic moved to a different pool
    Failover {
        /// Pool that was serving before the change
        previous: String,
        /// Pool serving now
        current: String,
    },

    /// Traffic is back on the primary pool after a failover
    Recovery {
        /// The recovered (primary) pool
        pool: String,
    },
}

/// Tracks which backend pool is serving traffic
///
/// The first pool ever observed becomes the primary for the life of the
/// process. A change of serving pool away from the primary, or between two
/// alternate pools, is a failover candidate; seeing the primary again while
/// failed over is a recovery candidate.
///
/// The failover flag flips as soon as a change is observed, whether or not
/// the resulting alert is delivered, so suppressed notifications cannot
/// desynchronize the tracker from reality. Recovery is the one exception:
/// the caller confirms it with [`mark_recovered`](Self::mark_recovered)
/// once the recovery alert clears its rate limit, and an unconfirmed
/// candidate is offered again on the next matching observation.
#[derive(Debug, Default)]
pub struct PoolTracker {
    /// Pool of the most recently processed record
    last_seen: Option<String>,

    /// First pool ever observed; never changes once set
    primary: Option<String>,

    /// True strictly between a failover and its confirmed recovery
    in_failover: bool,
}

impl PoolTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one observed pool value; returns a candidate event, if any
    ///
    /// The very first pool sets the primary and produces no event. A pool
    /// equal to the last seen one produces a recovery candidate only while
    /// failed over on the primary, so a rate-limited recovery retries.
    pub fn observe(&mut self, pool: &str) -> Option<PoolChange> {
        let Some(last) = self.last_seen.as_deref() else {
            self.last_seen = Some(pool.to_string());
            self.primary = Some(pool.to_string());
            info!(pool = %pool, "primary pool set");
            return None;
        };

        if pool != last {
            let previous = last.to_string();
            self.last_seen = Some(pool.to_string());

            if self.in_failover && self.primary.as_deref() == Some(pool) {
                // Change back to primary is a recovery, not another failover
                return Some(PoolChange::Recovery {
                    pool: pool.to_string(),
                });
            }

            self.in_failover = true;
            debug!(previous = %previous, current = %pool, "pool change observed");
            return Some(PoolChange::Failover {
                previous,
                current: pool.to_string(),
            });
        }

        if self.in_failover && self.primary.as_deref() == Some(pool) {
            return Some(PoolChange::Recovery {
                pool: pool.to_string(),
            });
        }

        None
    }

    /// Confirm a recovery candidate: traffic is considered back to normal
    pub fn mark_recovered(&mut self) {
        if self.in_failover {
            info!(pool = self.primary.as_deref().unwrap_or("unknown"), "recovered to primary pool");
        }
        self.in_failover = false;
    }

    /// Whether a failover is currently in effect
    pub fn in_failover(&self) -> bool {
        self.in_failover
    }

    /// The primary pool, once the first record has been seen
    pub fn primary_pool(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    /// Pool of the most recently processed record
    pub fn last_seen_pool(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }
}
