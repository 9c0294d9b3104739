use std::time::Duration;

use session_board::{config::GlobalConfig, AppError};

#[test]
fn empty_file_yields_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("empty config");
    assert_eq!(config, GlobalConfig::default());
    assert_eq!(config.bind_address(), "localhost:8080");
    assert!((config.cpu_threshold_percent - 5.0).abs() < f64::EPSILON);
    assert_eq!(config.sample_interval(), Duration::from_secs(2));
    assert_eq!(config.retention(), Duration::from_secs(30));
    assert_eq!(config.purge_interval(), Duration::from_secs(2));
    assert_eq!(config.tracked_cli, "claude");
    assert!(config.auto_discover);
    assert!(!config.rediscover);
}

#[test]
fn overrides_are_parsed() {
    let raw = r#"
http_host = "127.0.0.1"
http_port = 9090
cpu_threshold_percent = 12.5
sample_interval_seconds = 1
retention_seconds = 60
purge_interval_seconds = 10
tracked_cli = "aider"
auto_discover = false
rediscover = true
"#;
    let config = GlobalConfig::from_toml_str(raw).expect("valid config");
    assert_eq!(config.bind_address(), "127.0.0.1:9090");
    assert_eq!(config.retention(), Duration::from_secs(60));
    assert_eq!(config.purge_interval(), Duration::from_secs(10));
    assert_eq!(config.tracked_cli, "aider");
    assert!(!config.auto_discover);
    assert!(config.rediscover);
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "http_port = 7000\n").expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("load");
    assert_eq!(config.http_port, 7000);
}

#[test]
fn missing_file_is_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = GlobalConfig::load_from_path(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn unknown_keys_are_rejected() {
    let result = GlobalConfig::from_toml_str("http_prot = 1\n");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn validation_rejects_bad_values() {
    for raw in [
        "http_host = \"  \"",
        "cpu_threshold_percent = -1.0",
        "cpu_threshold_percent = nan",
        "cpu_threshold_percent = 100.5",
        "sample_interval_seconds = 0",
        "purge_interval_seconds = 0",
        "tracked_cli = \"\"",
    ] {
        let result = GlobalConfig::from_toml_str(raw);
        assert!(matches!(result, Err(AppError::Config(_))), "accepted: {raw}");
    }
}

#[test]
fn threshold_bounds_are_inclusive() {
    for raw in ["cpu_threshold_percent = 0.0", "cpu_threshold_percent = 100.0"] {
        assert!(GlobalConfig::from_toml_str(raw).is_ok(), "rejected: {raw}");
    }
}

#[test]
fn zero_retention_is_allowed() {
    let config = GlobalConfig::from_toml_str("retention_seconds = 0").expect("valid");
    assert_eq!(config.retention(), Duration::ZERO);
}
