//! Telemetry module tests for the bootstrap orchestrator.

use std::sync::Mutex;
use std::time::Duration;

use hsm_bootstrap::telemetry::{
    init_logging, record_harness_exit, record_step_failure, record_step_ready, BootstrapSpan, LogConfig, LogError,
    LogFormat, SpanExt, StepSpan,
};
use hsm_bootstrap::{ReadinessCheck, ServiceDescriptor};
use tracing::Span;
use uuid::Uuid;

static ENV_LOCK: Mutex<()> = Mutex::new(());

// =============================================================================
// LogConfig Tests
// =============================================================================

#[test]
fn log_config_default_is_json() {
    let config = LogConfig::default();
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, "info");
    assert!(config.output_path.is_none());
}

#[test]
fn log_format_parses_names() {
    assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    assert!(matches!("xml".parse::<LogFormat>(), Err(LogError::InvalidFormat(_))));
}

#[test]
fn rust_log_overrides_level() {
    let _lock = ENV_LOCK.lock().unwrap();
    std::env::set_var("RUST_LOG", "hsm_bootstrap=trace");
    let config = LogConfig {
        level: "info".to_string(),
        ..LogConfig::default()
    }
    .with_env_override();
    assert_eq!(config.level, "hsm_bootstrap=trace");

    std::env::set_var("RUST_LOG", "  ");
    let config = LogConfig::default().with_env_override();
    assert_eq!(config.level, "info");
    std::env::remove_var("RUST_LOG");
}

#[test]
fn invalid_filter_is_rejected() {
    let config = LogConfig {
        level: "hsm_bootstrap=loudest".to_string(),
        ..LogConfig::default()
    };
    assert!(matches!(init_logging(&config), Err(LogError::InvalidFilter(_))));
}

#[test]
fn json_logs_go_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bootstrap.log");
    let config = LogConfig {
        format: LogFormat::Json,
        level: "info".to_string(),
        output_path: Some(path.clone()),
    };
    init_logging(&config).unwrap();
    tracing::info!(service = "device-simulator", "service ready");

    let contents = std::fs::read_to_string(&path).unwrap();
    let line = contents.lines().find(|l| l.contains("service ready")).unwrap();
    let json: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(json["fields"]["service"], "device-simulator");
    assert!(matches!(init_logging(&config), Err(LogError::AlreadyInitialized)));
}

// =============================================================================
// Span Tests
// =============================================================================

#[test]
fn span_ext_records_both_outcomes() {
    let span = Span::none();
    span.record_result(&Ok::<(), &str>(()));
    span.record_result(&Err::<(), &str>("step sim timed out"));
}

#[test]
fn bootstrap_and_step_spans_nest() {
    let descriptor = ServiceDescriptor::new("device-simulator", "swtpm", ReadinessCheck::TcpPort(2321));
    let run = BootstrapSpan::new(Uuid::new_v4(), 3);
    let _run = run.enter();
    let step = StepSpan::new(&descriptor);
    let _step = step.enter();
    step.record("pid", 4242u32);
    step.record_result(&Ok::<(), String>(()));
}

// =============================================================================
// Metrics Tests
// =============================================================================

#[test]
fn metrics_without_recorder_are_noops() {
    record_step_ready("device-simulator", Duration::from_millis(1200));
    record_step_failure("message-broker", "timeout");
    record_step_failure("bus-daemon", "skipped");
    record_harness_exit("random", 4);
    record_harness_exit("cert", 0);
}
