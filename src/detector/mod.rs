//! Stateful event detection over the parsed record stream
//!
//! This module owns the three pieces of detection state and the policy
//! that ties them together:
//!
//! - [`RollingWindow`]: trailing sample of request outcomes for the 5xx
//!   error rate
//! - [`PoolTracker`]: failover/recovery state machine over the serving pool
//! - [`CooldownTracker`]: per alert-kind rate limiting
//!
//! The [`Detector`] consumes one [`AccessRecord`] at a time and returns the
//! alerts that cleared their cooldown. Delivery is the caller's concern;
//! cooldowns are recorded here, on attempt, so undelivered alerts still
//! count against the interval.

pub mod cooldown;
pub mod pools;
pub mod window;

pub use cooldown::CooldownTracker;
pub use pools::{PoolChange, PoolTracker};
pub use window::RollingWindow;

use std::fmt;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::DetectorConfig;
use crate::parser::AccessRecord;

/// Kind of operational event an alert reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    /// Traffic shifted away from the serving pool
    Failover,
    /// Trailing 5xx rate crossed the configured threshold
    ErrorRate,
    /// Traffic returned to the primary pool
    Recovery,
}

impl AlertKind {
    /// Stable lowercase identifier used in logs and payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Failover => "failover",
            AlertKind::ErrorRate => "error_rate",
            AlertKind::Recovery => "recovery",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One alert ready for dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub kind: AlertKind,

    /// Human-readable message body (Slack mrkdwn)
    pub message: String,

    /// Ordered key/value pairs rendered as structured fields
    pub metadata: Vec<(String, String)>,
}

/// Orchestrates the window, the pool tracker and the cooldown tracker
///
/// All detection state lives here and is mutated from a single processing
/// loop. The detector decides which alerts fire; it never talks to the
/// network.
pub struct Detector {
    window: RollingWindow,
    pools: PoolTracker,
    cooldowns: CooldownTracker,
    threshold: f64,
}

impl Detector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            window: RollingWindow::new(config.window_size),
            pools: PoolTracker::new(),
            cooldowns: CooldownTracker::new(Duration::from_secs(config.cooldown_secs)),
            threshold: config.error_rate_threshold,
        }
    }

    /// Process one parsed record; returns the alerts that cleared cooldown
    ///
    /// Records without a usable pool are ignored entirely: they touch
    /// neither the window nor the pool tracker, so garbled lines cannot
    /// skew the error rate or fake a pool change.
    pub fn process(&mut self, record: &AccessRecord, now: Instant) -> Vec<Alert> {
        let mut alerts = Vec::new();

        let Some(pool) = record.pool.as_deref().filter(|p| !p.is_empty()) else {
            return alerts;
        };
        let upstream = record.upstream_addr.as_deref().unwrap_or("unknown");

        self.window.push(record.is_server_error());

        match self.pools.observe(pool) {
            Some(PoolChange::Failover { previous, current }) => {
                if self.cooldowns.should_fire(AlertKind::Failover, now) {
                    self.cooldowns.record_fire(AlertKind::Failover, now);
                    alerts.push(failover_alert(&previous, &current, upstream));
                } else {
                    debug!(
                        previous = %previous,
                        current = %current,
                        "failover alert suppressed by cooldown"
                    );
                }
            }
            Some(PoolChange::Recovery { pool }) => {
                if self.cooldowns.should_fire(AlertKind::Recovery, now) {
                    self.cooldowns.record_fire(AlertKind::Recovery, now);
                    self.pools.mark_recovered();
                    alerts.push(recovery_alert(&pool, upstream));
                } else {
                    debug!(pool = %pool, "recovery alert suppressed by cooldown");
                }
            }
            None => {}
        }

        if let Some(rate) = self.window.error_rate() {
            if rate >= self.threshold && self.cooldowns.should_fire(AlertKind::ErrorRate, now) {
                self.cooldowns.record_fire(AlertKind::ErrorRate, now);
                alerts.push(error_rate_alert(
                    rate,
                    self.window.error_count(),
                    self.window.len(),
                    self.threshold,
                ));
            }
        }

        alerts
    }

    /// Current rolling window, for inspection
    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    /// Current pool tracker, for inspection
    pub fn pools(&self) -> &PoolTracker {
        &self.pools
    }
}

fn failover_alert(previous: &str, current: &str, upstream: &str) -> Alert {
    Alert {
        kind: AlertKind::Failover,
        message: format!(
            "*Failover detected:* `{}` → `{}`\nUpstream: `{}`",
            previous, current, upstream
        ),
        metadata: vec![
            ("Previous Pool".to_string(), previous.to_string()),
            ("Current Pool".to_string(), current.to_string()),
            ("Upstream".to_string(), upstream.to_string()),
        ],
    }
}

fn recovery_alert(pool: &str, upstream: &str) -> Alert {
    Alert {
        kind: AlertKind::Recovery,
        message: format!(
            "*Recovery detected:* traffic switched back to `{}`\nUpstream: `{}`\n✅ Service restored to primary pool.",
            pool, upstream
        ),
        metadata: vec![
            ("Recovered Pool".to_string(), pool.to_string()),
            ("Status".to_string(), "Healthy".to_string()),
            ("Upstream".to_string(), upstream.to_string()),
        ],
    }
}

fn error_rate_alert(rate: f64, errors: usize, window_len: usize, threshold: f64) -> Alert {
    Alert {
        kind: AlertKind::ErrorRate,
        message: format!(
            "*High 5xx Error Rate:* {:.2}% over last {} requests",
            rate, window_len
        ),
        metadata: vec![
            ("Error Count".to_string(), errors.to_string()),
            ("Window Size".to_string(), window_len.to_string()),
            ("Threshold".to_string(), format!("{}%", threshold)),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(window_size: usize, threshold: f64, cooldown_secs: u64) -> DetectorConfig {
        DetectorConfig {
            window_size,
            error_rate_threshold: threshold,
            cooldown_secs,
        }
    }

    fn record(pool: Option<&str>, status: Option<u16>) -> AccessRecord {
        AccessRecord {
            pool: pool.map(str::to_string),
            release: None,
            status,
            upstream_status: None,
            upstream_addr: Some("10.0.0.5:8080".to_string()),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_without_pool_is_ignored() {
        let mut detector = Detector::new(&config(4, 50.0, 0));
        let now = Instant::now();

        assert!(detector.process(&record(None, Some(500)), now).is_empty());
        assert!(detector.process(&record(Some(""), Some(500)), now).is_empty());
        assert_eq!(detector.window().len(), 0);
        assert_eq!(detector.pools().primary_pool(), None);
    }

    #[test]
    fn test_failover_then_recovery_sequence() {
        let mut detector = Detector::new(&config(100, 99.0, 0));
        let now = Instant::now();

        // A, A, B, B, A with A as primary
        assert!(detector.process(&record(Some("a"), Some(200)), now).is_empty());
        assert!(detector.process(&record(Some("a"), Some(200)), now).is_empty());

        let alerts = detector.process(&record(Some("b"), Some(200)), now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Failover);
        assert!(alerts[0].message.contains("`a` → `b`"));

        assert!(detector.process(&record(Some("b"), Some(200)), now).is_empty());

        let alerts = detector.process(&record(Some("a"), Some(200)), now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Recovery);
        assert!(!detector.pools().in_failover());
    }

    #[test]
    fn test_error_rate_fires_at_threshold() {
        let mut detector = Detector::new(&config(4, 50.0, 0));
        let now = Instant::now();

        assert!(detector.process(&record(Some("a"), Some(200)), now).is_empty());
        assert!(detector.process(&record(Some("a"), Some(200)), now).is_empty());
        assert!(detector.process(&record(Some("a"), Some(500)), now).is_empty());

        let alerts = detector.process(&record(Some("a"), Some(500)), now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::ErrorRate);
        assert!(alerts[0].message.contains("50.00%"));
        assert!(alerts[0]
            .metadata
            .contains(&("Error Count".to_string(), "2".to_string())));
    }

    #[test]
    fn test_unknown_status_counts_as_success() {
        let mut detector = Detector::new(&config(2, 1.0, 0));
        let now = Instant::now();

        detector.process(&record(Some("a"), None), now);
        let alerts = detector.process(&record(Some("a"), None), now);

        assert!(alerts.is_empty());
        assert_eq!(detector.window().error_rate(), Some(0.0));
    }

    #[test]
    fn test_cooldown_suppresses_repeat_failovers() {
        let mut detector = Detector::new(&config(100, 99.0, 300));
        let t0 = Instant::now();

        detector.process(&record(Some("a"), Some(200)), t0);
        let first = detector.process(&record(Some("b"), Some(200)), t0);
        assert_eq!(first.len(), 1);

        // Second change inside the interval is suppressed but still tracked
        let second = detector.process(&record(Some("c"), Some(200)), t0 + Duration::from_secs(10));
        assert!(second.is_empty());
        assert_eq!(detector.pools().last_seen_pool(), Some("c"));
        assert!(detector.pools().in_failover());

        // Third change after expiry fires again
        let third = detector.process(&record(Some("b"), Some(200)), t0 + Duration::from_secs(301));
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].kind, AlertKind::Failover);
    }

    #[test]
    fn test_rate_limited_recovery_retries_after_expiry() {
        let mut detector = Detector::new(&config(100, 99.0, 300));
        let t0 = Instant::now();

        detector.process(&record(Some("a"), Some(200)), t0);
        let first = detector.process(&record(Some("b"), Some(200)), t0);
        assert_eq!(first.len(), 1);

        // First recovery fires and burns the recovery cooldown
        let recovered = detector.process(&record(Some("a"), Some(200)), t0 + Duration::from_secs(2));
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].kind, AlertKind::Recovery);

        // Flap again: failover alert is rate-limited but the state still flips
        let flap = detector.process(&record(Some("b"), Some(200)), t0 + Duration::from_secs(3));
        assert!(flap.is_empty());
        assert!(detector.pools().in_failover());

        // Return to primary while recovery is still rate-limited
        let alerts = detector.process(&record(Some("a"), Some(200)), t0 + Duration::from_secs(4));
        assert!(alerts.is_empty());
        assert!(detector.pools().in_failover());

        // Same pool again after expiry completes the recovery
        let alerts = detector.process(&record(Some("a"), Some(200)), t0 + Duration::from_secs(303));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Recovery);
        assert!(!detector.pools().in_failover());
    }
}
