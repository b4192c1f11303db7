//! Orchestrator configuration loading from environment variables.
//!
//! All values are loaded from `HSM_*` environment variables with sensible
//! defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `HSM_DEV_MODE` | unset | Select development mode |
//! | `HSM_UNIT_TEST` | unset | Select unit-test mode (wins over dev) |
//! | `HMAC_SECRET` | unset | Opaque secret passed to the workload |
//! | `HSM_BOOTSTRAP_PLAN` | unset | TOML plan file replacing the default plan |
//! | `HSM_BOOTSTRAP_STEP_TIMEOUT` | 30 | Per-step readiness timeout (secs) |
//! | `HSM_BOOTSTRAP_POLL_INTERVAL_MS` | 1000 | Probe interval (ms) |
//! | `HSM_BOOTSTRAP_SHUTDOWN_GRACE` | 5 | Per-service stop wait (secs) |
//! | `HSM_STATE_DIR` | /tmp/tpmstate | Device simulator state directory |
//! | `HSM_SCRATCH_DIR` | . | Harness artifact directory |
//! | `HSM_LOG_DIR` | unset | Per-service log directory |
//! | `HSM_WITH_BUS` | on | Launch a bus daemon |
//! | `HSM_REQUIRE_BUS` | off | Make the bus daemon a hard step |
//! | `HSM_WITH_BROKER` | off | Launch the message broker |
//! | `HSM_TEST_CMD` | pytest -v tests | Automated test command |
//! | `HSM_SHELL` | $SHELL or /bin/bash | Interactive shell |
//! | `HSM_INSTALL_CMD` | unset | Minimal dependency install command |
//! | `HSM_INSTALL_TEST_CMD` | unset | Install command with test extras |
//! | `HSM_OPS_DIR` | unset | Directory of real operation executables |
//! | `HSM_LOG_FORMAT` | mode profile | `json` or `pretty` (`text`) |

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::mode::{is_truthy, ModeSignals};
use crate::plan::DefaultPlanOptions;
use crate::sequencer::SequencerConfig;
use crate::telemetry::{LogError, LogFormat};

pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;
pub const DEFAULT_STATE_DIR: &str = "/tmp/tpmstate";
pub const DEFAULT_TEST_CMD: &str = "pytest -v tests";
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Floors shared by the environment and plan files.
pub const MIN_STEP_TIMEOUT_SECS: u64 = 1;
pub const MIN_POLL_INTERVAL_MS: u64 = 10;

/// A value that must never appear in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Effective configuration summary, printable as `KEY=VALUE`.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub dev_mode: bool,
    pub unit_test: bool,
    pub hmac_secret_set: bool,
    pub plan_file: Option<PathBuf>,
    pub step_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub shutdown_grace_secs: u64,
    pub state_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub with_bus: bool,
    pub require_bus: bool,
    pub with_broker: bool,
    pub test_cmd: String,
    pub shell: String,
    pub install_cmd: Option<String>,
    pub install_test_cmd: Option<String>,
    pub ops_dir: Option<PathBuf>,
    pub log_format: Option<String>,
}

/// All orchestrator configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub signals: ModeSignals,
    pub hmac_secret: Option<Secret>,
    pub plan_file: Option<PathBuf>,
    pub step_timeout: Duration,
    pub poll_interval: Duration,
    pub shutdown_grace: Duration,
    pub state_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub with_bus: bool,
    pub require_bus: bool,
    pub with_broker: bool,
    pub test_cmd: Vec<String>,
    pub shell: String,
    pub install_cmd: Option<Vec<String>>,
    pub install_test_cmd: Option<Vec<String>>,
    pub ops_dir: Option<PathBuf>,
    /// Raw `HSM_LOG_FORMAT`; see [`EnvConfig::log_format`].
    pub log_format: Option<String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            signals: ModeSignals::default(),
            hmac_secret: None,
            plan_file: None,
            step_timeout: Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            scratch_dir: PathBuf::from("."),
            log_dir: None,
            with_bus: true,
            require_bus: false,
            with_broker: false,
            test_cmd: split_command(DEFAULT_TEST_CMD),
            shell: DEFAULT_SHELL.to_string(),
            install_cmd: None,
            install_test_cmd: None,
            ops_dir: None,
            log_format: None,
        }
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a flag env var, returning `default` when unset.
fn parse_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => is_truthy(&val),
        Err(_) => default,
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Split a command line on whitespace. No quoting is supported.
pub fn split_command(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let step_secs = parse_u64("HSM_BOOTSTRAP_STEP_TIMEOUT", DEFAULT_STEP_TIMEOUT_SECS).max(MIN_STEP_TIMEOUT_SECS);
    let poll_ms = parse_u64("HSM_BOOTSTRAP_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS).max(MIN_POLL_INTERVAL_MS);
    let grace_secs = parse_u64("HSM_BOOTSTRAP_SHUTDOWN_GRACE", DEFAULT_SHUTDOWN_GRACE_SECS);

    let test_cmd = non_empty("HSM_TEST_CMD").unwrap_or_else(|| DEFAULT_TEST_CMD.to_string());
    let shell = non_empty("HSM_SHELL")
        .or_else(|| non_empty("SHELL"))
        .unwrap_or_else(|| DEFAULT_SHELL.to_string());

    EnvConfig {
        signals: ModeSignals::from_env(),
        hmac_secret: std::env::var("HMAC_SECRET").ok().map(Secret::new),
        plan_file: non_empty("HSM_BOOTSTRAP_PLAN").map(PathBuf::from),
        step_timeout: Duration::from_secs(step_secs),
        poll_interval: Duration::from_millis(poll_ms),
        shutdown_grace: Duration::from_secs(grace_secs),
        state_dir: non_empty("HSM_STATE_DIR").map_or_else(|| PathBuf::from(DEFAULT_STATE_DIR), PathBuf::from),
        scratch_dir: non_empty("HSM_SCRATCH_DIR").map_or_else(|| PathBuf::from("."), PathBuf::from),
        log_dir: non_empty("HSM_LOG_DIR").map(PathBuf::from),
        with_bus: parse_flag("HSM_WITH_BUS", true),
        require_bus: parse_flag("HSM_REQUIRE_BUS", false),
        with_broker: parse_flag("HSM_WITH_BROKER", false),
        test_cmd: split_command(&test_cmd),
        shell,
        install_cmd: non_empty("HSM_INSTALL_CMD").map(|c| split_command(&c)),
        install_test_cmd: non_empty("HSM_INSTALL_TEST_CMD").map(|c| split_command(&c)),
        ops_dir: non_empty("HSM_OPS_DIR").map(PathBuf::from),
        log_format: non_empty("HSM_LOG_FORMAT"),
    }
}

impl EnvConfig {
    pub fn sequencer_config(&self) -> SequencerConfig {
        SequencerConfig {
            step_timeout: self.step_timeout,
            poll_interval: self.poll_interval,
            shutdown_wait: self.shutdown_grace,
        }
    }

    pub fn plan_options(&self) -> DefaultPlanOptions {
        DefaultPlanOptions {
            state_dir: self.state_dir.clone(),
            with_bus: self.with_bus,
            require_bus: self.require_bus,
            with_broker: self.with_broker,
            ..DefaultPlanOptions::default()
        }
    }

    /// Log format override, `None` when unset so the mode profile decides.
    pub fn log_format(&self) -> Result<Option<LogFormat>, LogError> {
        self.log_format.as_deref().map(str::parse::<LogFormat>).transpose()
    }

    /// Return a printable summary of all effective values. The secret is
    /// reported only as present or absent.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            dev_mode: self.signals.dev,
            unit_test: self.signals.unit_test,
            hmac_secret_set: self.hmac_secret.is_some(),
            plan_file: self.plan_file.clone(),
            step_timeout_secs: self.step_timeout.as_secs(),
            poll_interval_ms: self.poll_interval.as_millis() as u64,
            shutdown_grace_secs: self.shutdown_grace.as_secs(),
            state_dir: self.state_dir.clone(),
            scratch_dir: self.scratch_dir.clone(),
            log_dir: self.log_dir.clone(),
            with_bus: self.with_bus,
            require_bus: self.require_bus,
            with_broker: self.with_broker,
            test_cmd: self.test_cmd.join(" "),
            shell: self.shell.clone(),
            install_cmd: self.install_cmd.as_ref().map(|c| c.join(" ")),
            install_test_cmd: self.install_test_cmd.as_ref().map(|c| c.join(" ")),
            ops_dir: self.ops_dir.clone(),
            log_format: self.log_format.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "HSM_DEV_MODE",
        "HSM_UNIT_TEST",
        "HMAC_SECRET",
        "HSM_BOOTSTRAP_PLAN",
        "HSM_BOOTSTRAP_STEP_TIMEOUT",
        "HSM_BOOTSTRAP_POLL_INTERVAL_MS",
        "HSM_BOOTSTRAP_SHUTDOWN_GRACE",
        "HSM_STATE_DIR",
        "HSM_SCRATCH_DIR",
        "HSM_LOG_DIR",
        "HSM_WITH_BUS",
        "HSM_REQUIRE_BUS",
        "HSM_WITH_BROKER",
        "HSM_TEST_CMD",
        "HSM_SHELL",
        "HSM_INSTALL_CMD",
        "HSM_INSTALL_TEST_CMD",
        "HSM_OPS_DIR",
        "HSM_LOG_FORMAT",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg.signals, ModeSignals::default());
        assert!(cfg.hmac_secret.is_none());
        assert_eq!(cfg.step_timeout, Duration::from_secs(30));
        assert_eq!(cfg.poll_interval, Duration::from_secs(1));
        assert_eq!(cfg.shutdown_grace, Duration::from_secs(5));
        assert_eq!(cfg.state_dir, PathBuf::from("/tmp/tpmstate"));
        assert_eq!(cfg.scratch_dir, PathBuf::from("."));
        assert!(cfg.with_bus);
        assert!(!cfg.require_bus);
        assert!(!cfg.with_broker);
        assert_eq!(cfg.test_cmd, vec!["pytest", "-v", "tests"]);
        assert!(cfg.install_cmd.is_none());
        assert_eq!(cfg.log_format().unwrap(), None);
    }

    #[test]
    fn test_default_matches_unset_environment() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let loaded = load();
        let defaults = EnvConfig::default();
        assert_eq!(loaded.step_timeout, defaults.step_timeout);
        assert_eq!(loaded.poll_interval, defaults.poll_interval);
        assert_eq!(loaded.test_cmd, defaults.test_cmd);
        assert_eq!(loaded.state_dir, defaults.state_dir);
    }

    #[test]
    fn test_log_format_override() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("HSM_LOG_FORMAT", "Text");
        assert_eq!(load().log_format().unwrap(), Some(LogFormat::Pretty));

        std::env::set_var("HSM_LOG_FORMAT", "xml");
        assert!(matches!(load().log_format(), Err(LogError::InvalidFormat(_))));
        clear_env_vars();
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("HSM_BOOTSTRAP_STEP_TIMEOUT", "90");
        std::env::set_var("HSM_BOOTSTRAP_POLL_INTERVAL_MS", "250");
        std::env::set_var("HSM_WITH_BUS", "off");
        std::env::set_var("HSM_WITH_BROKER", "yes");
        std::env::set_var("HSM_INSTALL_TEST_CMD", "pip install -e .[test]");
        let cfg = load();
        assert_eq!(cfg.step_timeout, Duration::from_secs(90));
        assert_eq!(cfg.poll_interval, Duration::from_millis(250));
        assert!(!cfg.with_bus);
        assert!(cfg.with_broker);
        assert_eq!(
            cfg.install_test_cmd,
            Some(vec!["pip".to_string(), "install".into(), "-e".into(), ".[test]".into()])
        );
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("HSM_BOOTSTRAP_STEP_TIMEOUT", "soon");
        std::env::set_var("HSM_BOOTSTRAP_POLL_INTERVAL_MS", "-5");
        let cfg = load();
        assert_eq!(cfg.step_timeout, Duration::from_secs(30));
        assert_eq!(cfg.poll_interval, Duration::from_millis(1000));
        clear_env_vars();
    }

    #[test]
    fn test_floors_applied() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("HSM_BOOTSTRAP_STEP_TIMEOUT", "0");
        std::env::set_var("HSM_BOOTSTRAP_POLL_INTERVAL_MS", "1");
        let cfg = load();
        assert_eq!(cfg.step_timeout, Duration::from_secs(1));
        assert_eq!(cfg.poll_interval, Duration::from_millis(10));
        clear_env_vars();
    }

    #[test]
    fn test_secret_is_redacted() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("HMAC_SECRET", "s3cr3t-value");
        let cfg = load();
        assert_eq!(cfg.hmac_secret.as_ref().map(Secret::expose), Some("s3cr3t-value"));
        assert!(!format!("{:?}", cfg).contains("s3cr3t-value"));
        assert!(cfg.effective_config().hmac_secret_set);
        clear_env_vars();
    }
}
