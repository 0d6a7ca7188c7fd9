use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Watched-file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Path of the access log to tail
    #[serde(default = "default_log_path")]
    pub log_path: String,

    /// Sleep between reads when no new content is available, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Sleep between existence checks while waiting for the file, in seconds
    #[serde(default = "default_file_wait_secs")]
    pub file_wait_secs: u64,
}

fn default_log_path() -> String {
    "nginx/logs/access.log".to_string()
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_file_wait_secs() -> u64 {
    2
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            poll_interval_ms: default_poll_interval_ms(),
            file_wait_secs: default_file_wait_secs(),
        }
    }
}

/// Detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Rolling window capacity in requests
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// 5xx error-rate alert threshold in percent
    #[serde(default = "default_error_rate_threshold")]
    pub error_rate_threshold: f64,

    /// Minimum spacing between two alerts of the same kind, in seconds
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_window_size() -> usize {
    200
}

fn default_error_rate_threshold() -> f64 {
    2.0
}

fn default_cooldown_secs() -> u64 {
    300
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            error_rate_threshold: default_error_rate_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Slack incoming-webhook URL; absence disables delivery while
    /// detection keeps running and logging what would have been sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Suppress all outbound alerts while detection bookkeeping continues
    #[serde(default)]
    pub maintenance_mode: bool,

    /// Webhook request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Skip TLS certificate verification for the webhook endpoint
    #[serde(default)]
    pub insecure_tls: bool,
}

fn default_timeout_secs() -> u64 {
    5
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            maintenance_mode: false,
            timeout_secs: default_timeout_secs(),
            insecure_tls: false,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// File tailing settings
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Detection settings
    #[serde(default)]
    pub detector: DetectorConfig,

    /// Notification settings
    #[serde(default)]
    pub notifier: NotifierConfig,
}

impl Config {
    /// Create a configuration with all defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject values the detector cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.detector.window_size == 0 {
            anyhow::bail!("detector.window_size must be greater than zero");
        }
        if self.detector.error_rate_threshold < 0.0 {
            anyhow::bail!("detector.error_rate_threshold must not be negative");
        }
        if self.watcher.log_path.is_empty() {
            anyhow::bail!("watcher.log_path must not be empty");
        }
        if let Some(webhook) = self.notifier.webhook_url.as_deref() {
            let parsed = url::Url::parse(webhook)
                .context(format!("Invalid webhook URL: {}", webhook))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("Webhook URL must be http or https: {}", webhook);
            }
        }
        Ok(())
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: Config =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Load configuration from environment variables
///
/// All variables are optional; unset or unparseable values fall back to
/// the defaults:
/// - NGINX_LOG_PATH (default nginx/logs/access.log)
/// - SLACK_WEBHOOK_URL (unset disables delivery)
/// - WINDOW_SIZE (default 200)
/// - ERROR_RATE_THRESHOLD (default 2.0, percent)
/// - ALERT_COOLDOWN_SEC (default 300)
/// - MAINTENANCE_MODE (1/true/yes, default off)
/// - POLL_INTERVAL_MS (default 200)
/// - WEBHOOK_INSECURE_TLS (1/true/yes, default off)
pub fn load_from_env() -> Result<Config> {
    // Pick up a .env file if one exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();

    let mut config = Config::new();

    if let Ok(path) = std::env::var("NGINX_LOG_PATH") {
        if !path.is_empty() {
            config.watcher.log_path = path;
        }
    }

    config.notifier.webhook_url = std::env::var("SLACK_WEBHOOK_URL")
        .ok()
        .filter(|url| !url.is_empty());

    if let Ok(size) = std::env::var("WINDOW_SIZE") {
        if let Ok(val) = size.parse() {
            config.detector.window_size = val;
        }
    }

    if let Ok(threshold) = std::env::var("ERROR_RATE_THRESHOLD") {
        if let Ok(val) = threshold.parse() {
            config.detector.error_rate_threshold = val;
        }
    }

    if let Ok(cooldown) = std::env::var("ALERT_COOLDOWN_SEC") {
        if let Ok(val) = cooldown.parse() {
            config.detector.cooldown_secs = val;
        }
    }

    if let Ok(mode) = std::env::var("MAINTENANCE_MODE") {
        config.notifier.maintenance_mode = parse_bool(&mode);
    }

    if let Ok(interval) = std::env::var("POLL_INTERVAL_MS") {
        if let Ok(val) = interval.parse() {
            config.watcher.poll_interval_ms = val;
        }
    }

    if let Ok(insecure) = std::env::var("WEBHOOK_INSECURE_TLS") {
        config.notifier.insecure_tls = parse_bool(&insecure);
    }

    Ok(config)
}

/// Load configuration from file or environment
///
/// Tries the YAML file when a path is given, otherwise reads the
/// environment.
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config = if let Some(path) = config_path {
        load_from_yaml(path)?
    } else {
        load_from_env()?
    };

    config.validate()?;
    Ok(config)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
watcher:
  log_path: /var/log/nginx/access.log
  poll_interval_ms: 100

detector:
  window_size: 500
  error_rate_threshold: 5.0
  cooldown_secs: 120

notifier:
  webhook_url: https://hooks.slack.com/services/T000/B000/XXX
  maintenance_mode: true
  timeout_secs: 10
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.watcher.log_path, "/var/log/nginx/access.log");
        assert_eq!(config.watcher.poll_interval_ms, 100);
        assert_eq!(config.watcher.file_wait_secs, 2);

        assert_eq!(config.detector.window_size, 500);
        assert_eq!(config.detector.error_rate_threshold, 5.0);
        assert_eq!(config.detector.cooldown_secs, 120);

        assert_eq!(
            config.notifier.webhook_url.as_deref(),
            Some("https://hooks.slack.com/services/T000/B000/XXX")
        );
        assert!(config.notifier.maintenance_mode);
        assert_eq!(config.notifier.timeout_secs, 10);
        assert!(!config.notifier.insecure_tls);
    }

    #[test]
    fn test_default_values() {
        let config: Config = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config.watcher.log_path, "nginx/logs/access.log");
        assert_eq!(config.watcher.poll_interval_ms, 200);
        assert_eq!(config.detector.window_size, 200);
        assert_eq!(config.detector.error_rate_threshold, 2.0);
        assert_eq!(config.detector.cooldown_secs, 300);
        assert_eq!(config.notifier.webhook_url, None);
        assert!(!config.notifier.maintenance_mode);
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = Config::new();
        config.detector.window_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_threshold() {
        let mut config = Config::new();
        config.detector.error_rate_threshold = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_malformed_webhook() {
        let mut config = Config::new();
        config.notifier.webhook_url = Some("not a url".to_string());
        assert!(config.validate().is_err());

        config.notifier.webhook_url = Some("ftp://example.com/hook".to_string());
        assert!(config.validate().is_err());

        config.notifier.webhook_url =
            Some("https://hooks.slack.com/services/T000/B000/XXX".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("off"));
    }
}
