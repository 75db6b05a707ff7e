use std::io::Write;

use wireflow_core::config::{AppConfig, DEFAULT_MAX_STEPS};
use wireflow_core::error::GraphError;
use wireflow_core::types::StreamMode;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
max_steps = 50
stream_mode = "updates"

[log]
enabled = true
log_dir = "/tmp/wireflow-logs"
level = 1

[demo]
seed = 42
max_attempts = 5
transcript = "conversation_history.txt"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_steps, 50);
    assert_eq!(config.engine.stream_mode, StreamMode::Updates);

    let log = config.log.as_ref().expect("log present");
    assert_eq!(log.level, 1);
    assert_eq!(
        config.log_dir().as_deref(),
        Some(std::path::Path::new("/tmp/wireflow-logs"))
    );

    assert_eq!(config.demo.seed, Some(42));
    assert_eq!(config.demo.max_attempts, 5);
    assert_eq!(
        config.demo.transcript.as_deref(),
        Some("conversation_history.txt")
    );
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("WIREFLOW_TEST_LOG_DIR", "/var/log/wireflow");

    let toml_content = r#"
[log]
log_dir = "${WIREFLOW_TEST_LOG_DIR}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(
        config.log.map(|l| l.log_dir),
        Some("/var/log/wireflow".to_string())
    );

    std::env::remove_var("WIREFLOW_TEST_LOG_DIR");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[demo]\nseed = 1\n").expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_steps, DEFAULT_MAX_STEPS);
    assert_eq!(config.engine.stream_mode, StreamMode::Values);
    assert!(config.log.is_none());
    assert_eq!(config.demo.max_attempts, 3);
    assert!(config.demo.transcript.is_none());
}

#[test]
fn test_missing_file_is_reported() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/wireflow.toml")).unwrap_err();
    assert!(matches!(err, GraphError::ConfigNotFound(_)));
}

#[test]
fn test_invalid_values_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[engine]\nmax_steps = 0\n").expect("write toml");
    assert!(matches!(
        AppConfig::load(tmp.path()),
        Err(GraphError::Config(_))
    ));

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[engine]\nstream_mode = \"debug\"\n").expect("write toml");
    assert!(matches!(
        AppConfig::load(tmp.path()),
        Err(GraphError::Config(_))
    ));
}
