use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::detector::Detector;
use crate::notify::SlackNotifier;
use crate::parser::ParserChain;
use crate::tail::LogTailer;

/// The watcher: one sequential loop from log lines to alerts
///
/// Owns every piece of detection state, so records are processed in exact
/// arrival order and no locking is needed. All per-line failures are
/// contained within their iteration; only I/O errors on the tailed file
/// itself escape `run`.
pub struct Watcher {
    config: Arc<Config>,
    parser: ParserChain,
    detector: Detector,
    notifier: SlackNotifier,
}

impl Watcher {
    pub fn new(config: Config) -> Self {
        let detector = Detector::new(&config.detector);
        let notifier = SlackNotifier::new(&config.notifier);

        Self {
            config: Arc::new(config),
            parser: ParserChain::new(),
            detector,
            notifier,
        }
    }

    /// Tail the configured log file until interrupted or a fatal I/O error
    pub async fn run(&mut self) -> Result<()> {
        let log_path = self.config.watcher.log_path.clone();
        let file_wait = Duration::from_secs(self.config.watcher.file_wait_secs);
        let poll_interval = Duration::from_millis(self.config.watcher.poll_interval_ms);

        info!(path = %log_path, "watching log file");
        info!(
            "config: threshold={}% window={} cooldown={}s",
            self.config.detector.error_rate_threshold,
            self.config.detector.window_size,
            self.config.detector.cooldown_secs
        );
        if self.notifier.is_enabled() {
            info!("webhook: configured");
        } else {
            warn!("webhook: missing, alerts will only be logged");
        }
        if self.config.notifier.maintenance_mode {
            warn!("maintenance mode is ON, outbound alerts are suppressed");
        }

        let mut tailer = LogTailer::wait_for(&log_path, file_wait, poll_interval)
            .await
            .context(format!("Failed to open log file: {}", log_path))?;

        loop {
            let line = tailer
                .next_line()
                .await
                .context(format!("Failed reading from {}", log_path))?;

            self.process_line(&line).await;
        }
    }

    /// Parse one line and run detection; never fails the loop
    pub async fn process_line(&mut self, line: &str) {
        let Some(record) = self.parser.parse(line) else {
            debug!(line = %line, "line did not match any parser");
            return;
        };

        // Records without a pool are unusable for detection: skipping them
        // here keeps garbled lines out of the window and the pool tracker
        if !record.has_pool() {
            debug!("record has no pool, skipped");
            return;
        }

        let alerts = self.detector.process(&record, Instant::now());
        for alert in &alerts {
            self.notifier.notify(alert).await;
        }
    }

    /// Detection state, for inspection
    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Effective configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
