use std::path::PathBuf;
use std::time::Duration;

use tmux_supervisor::input::CoalescerOptions;
use tmux_supervisor::lifecycle::LifecycleOptions;
use tmux_supervisor::{AppError, SupervisorConfig};

const SAMPLE_CONFIG: &str = r#"
tmux_binary = "/usr/local/bin/tmux"
socket_prefix = "agents"
max_history = 10
queue_capacity = 32
command_timeout_ms = 2500
graceful_stop_timeout_ms = 750
persistent_control = false

[batch]
enabled = true
flush_interval_ms = 25
max_batch_size = 16

[session]
width = 120
height = 40
history_limit = 1000
"#;

#[test]
fn parses_full_config() {
    let config = SupervisorConfig::from_toml_str(SAMPLE_CONFIG).expect("config");
    assert_eq!(config.tmux_binary, PathBuf::from("/usr/local/bin/tmux"));
    assert_eq!(config.socket_prefix, "agents");
    assert_eq!(config.max_history, 10);
    assert!(!config.persistent_control);
    assert_eq!(config.command_timeout(), Duration::from_millis(2500));
    assert_eq!(config.graceful_stop_timeout(), Duration::from_millis(750));

    let batch = config.batch_config();
    assert!(batch.enabled);
    assert_eq!(batch.flush_interval, Duration::from_millis(25));
    assert_eq!(batch.max_batch_size, 16);

    let size = config.default_size();
    assert_eq!((size.width, size.height, size.history_limit), (120, 40, 1000));
}

#[test]
fn empty_config_uses_defaults() {
    let config = SupervisorConfig::from_toml_str("").expect("config");
    assert_eq!(config, SupervisorConfig::default());
    assert_eq!(config.tmux_binary, PathBuf::from("tmux"));
    assert_eq!(config.max_history, 100);
    assert!(config.persistent_control);

    let batch = config.batch_config();
    assert!(!batch.enabled);
    assert_eq!(batch.flush_interval, Duration::from_millis(10));
    assert_eq!(batch.max_batch_size, 64);

    let size = config.default_size();
    assert_eq!((size.width, size.height, size.history_limit), (200, 30, 50_000));
}

#[test]
fn options_derive_from_config() {
    let config = SupervisorConfig::from_toml_str(SAMPLE_CONFIG).expect("config");

    let coalescer = CoalescerOptions::from(&config);
    assert_eq!(coalescer.max_history, 10);
    assert_eq!(coalescer.queue_capacity, 32);
    assert!(coalescer.batch.enabled);

    let lifecycle = LifecycleOptions::from(&config);
    assert_eq!(lifecycle.default_size.width, 120);
    assert_eq!(lifecycle.graceful_stop_timeout, Duration::from_millis(750));
}

#[test]
fn rejects_empty_socket_prefix() {
    let err = SupervisorConfig::from_toml_str("socket_prefix = \"  \"").expect_err("invalid");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("socket_prefix")));
}

#[test]
fn rejects_zero_queue_capacity() {
    let err = SupervisorConfig::from_toml_str("queue_capacity = 0").expect_err("invalid");
    assert!(err.to_string().contains("queue_capacity"));
}

#[test]
fn rejects_zero_batch_size_when_enabled() {
    let raw = "[batch]\nenabled = true\nmax_batch_size = 0\n";
    let err = SupervisorConfig::from_toml_str(raw).expect_err("invalid");
    assert!(err.to_string().contains("max_batch_size"));
}

#[test]
fn zero_batch_size_is_fine_when_disabled() {
    let raw = "[batch]\nenabled = false\nmax_batch_size = 0\n";
    assert!(SupervisorConfig::from_toml_str(raw).is_ok());
}

#[test]
fn rejects_zero_session_width() {
    let raw = "[session]\nwidth = 0\n";
    let err = SupervisorConfig::from_toml_str(raw).expect_err("invalid");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn rejects_malformed_toml() {
    let err = SupervisorConfig::from_toml_str("max_history = \"lots\"").expect_err("invalid");
    assert!(err.to_string().starts_with("config:"));
}

#[test]
fn loads_from_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("supervisor.toml");
    std::fs::write(&path, SAMPLE_CONFIG).expect("write config");

    let config = SupervisorConfig::load_from_path(&path).expect("config");
    assert_eq!(config.socket_prefix, "agents");
}

#[test]
fn missing_file_is_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = SupervisorConfig::load_from_path(dir.path().join("absent.toml")).expect_err("missing");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("failed to read config")));
}
