use std::fs;
use tempfile::TempDir;

/// Test loading configuration from a YAML file
#[test]
fn test_load_yaml_config() {
    let yaml = r#"
watcher:
  log_path: /var/log/nginx/access.log
  poll_interval_ms: 250
  file_wait_secs: 5

detector:
  window_size: 400
  error_rate_threshold: 1.5
  cooldown_secs: 600

notifier:
  webhook_url: https://hooks.slack.com/services/T000/B000/XXX
  timeout_secs: 3
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = poolwatch::config::load_from_yaml(&config_path).unwrap();

    assert_eq!(config.watcher.log_path, "/var/log/nginx/access.log");
    assert_eq!(config.watcher.poll_interval_ms, 250);
    assert_eq!(config.watcher.file_wait_secs, 5);

    assert_eq!(config.detector.window_size, 400);
    assert_eq!(config.detector.error_rate_threshold, 1.5);
    assert_eq!(config.detector.cooldown_secs, 600);

    assert_eq!(
        config.notifier.webhook_url.as_deref(),
        Some("https://hooks.slack.com/services/T000/B000/XXX")
    );
    assert_eq!(config.notifier.timeout_secs, 3);
    assert!(!config.notifier.maintenance_mode);
    assert!(!config.notifier.insecure_tls);
}

/// Partial files keep defaults for everything unspecified
#[test]
fn test_partial_yaml_uses_defaults() {
    let yaml = r#"
detector:
  error_rate_threshold: 10.0
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = poolwatch::config::load_from_yaml(&config_path).unwrap();

    assert_eq!(config.detector.error_rate_threshold, 10.0);
    assert_eq!(config.detector.window_size, 200);
    assert_eq!(config.detector.cooldown_secs, 300);
    assert_eq!(config.watcher.log_path, "nginx/logs/access.log");
    assert_eq!(config.notifier.webhook_url, None);
}

/// load_config surfaces a clear error for a missing file
#[test]
fn test_missing_config_file_errors() {
    let result = poolwatch::config::load_config(Some("/nonexistent/poolwatch.yaml"));
    assert!(result.is_err());
    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("Failed to read config file"));
}

/// Invalid YAML is rejected with a parse error, not silently defaulted
#[test]
fn test_invalid_yaml_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, "detector: [not, a, mapping]").unwrap();

    assert!(poolwatch::config::load_from_yaml(&config_path).is_err());
}

/// Validation failures propagate through load_config
#[test]
fn test_load_config_validates() {
    let yaml = r#"
detector:
  window_size: 0
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let result = poolwatch::config::load_config(Some(config_path.to_str().unwrap()));
    assert!(result.is_err());
}
