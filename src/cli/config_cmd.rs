//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration directly from environment variables
//! and never launch anything.

use std::path::{Path, PathBuf};

use crate::config::{self, EffectiveConfig, EnvConfig};
use crate::mode::select_mode;

use super::{load_plan, EXIT_CONFIG_ERROR, EXIT_SUCCESS};

/// Print effective config as key-value pairs to stdout.
pub fn run_show() {
    let env = config::load();
    println!("HSM_MODE={}", select_mode(env.signals));
    print_config(&env.effective_config());
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    println!("HSM_DEV_MODE=");
    println!("HSM_UNIT_TEST=");
    println!("HSM_BOOTSTRAP_PLAN=");
    println!("HSM_BOOTSTRAP_STEP_TIMEOUT={}", config::DEFAULT_STEP_TIMEOUT_SECS);
    println!("HSM_BOOTSTRAP_POLL_INTERVAL_MS={}", config::DEFAULT_POLL_INTERVAL_MS);
    println!("HSM_BOOTSTRAP_SHUTDOWN_GRACE={}", config::DEFAULT_SHUTDOWN_GRACE_SECS);
    println!("HSM_STATE_DIR={}", config::DEFAULT_STATE_DIR);
    println!("HSM_SCRATCH_DIR=.");
    println!("HSM_LOG_DIR=");
    println!("HSM_WITH_BUS=1");
    println!("HSM_REQUIRE_BUS=0");
    println!("HSM_WITH_BROKER=0");
    println!("HSM_TEST_CMD={}", config::DEFAULT_TEST_CMD);
    println!("HSM_SHELL={}", config::DEFAULT_SHELL);
    println!("HSM_INSTALL_CMD=");
    println!("HSM_INSTALL_TEST_CMD=");
    println!("HSM_OPS_DIR=");
    println!("HSM_LOG_FORMAT=");
}

/// Validate configuration and the plan it selects.
///
/// Returns 0 if valid, 2 if any problem is found.
pub fn run_validate() -> u8 {
    let problems = validate(&config::load());
    if problems.is_empty() {
        println!("Configuration is valid.");
        return EXIT_SUCCESS;
    }
    for problem in &problems {
        eprintln!("ERROR: {}", problem);
    }
    EXIT_CONFIG_ERROR
}

/// Every configuration problem found, as printable messages.
pub fn validate(env: &EnvConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if let Err(e) = load_plan(env) {
        problems.push(e.to_string());
    }
    if env.require_bus && !env.with_bus {
        problems.push("HSM_REQUIRE_BUS is set but HSM_WITH_BUS is off".to_string());
    }
    if let Err(e) = env.log_format() {
        problems.push(format!("HSM_LOG_FORMAT: {}", e));
    }
    if env.test_cmd.is_empty() {
        problems.push("HSM_TEST_CMD is empty".to_string());
    }
    if let Some(dir) = &env.ops_dir {
        if !dir.is_dir() {
            problems.push(format!("HSM_OPS_DIR {} is not a directory", dir.display()));
        }
    }
    if let Some(dir) = &env.log_dir {
        if !dir.is_dir() {
            problems.push(format!("HSM_LOG_DIR {} is not a directory", dir.display()));
        }
    }
    problems
}

fn display(path: &Option<PathBuf>) -> String {
    path.as_deref().map(Path::display).map(|d| d.to_string()).unwrap_or_default()
}

fn flag(value: bool) -> u8 {
    value as u8
}

fn print_config(cfg: &EffectiveConfig) {
    println!("HSM_DEV_MODE={}", flag(cfg.dev_mode));
    println!("HSM_UNIT_TEST={}", flag(cfg.unit_test));
    println!("HMAC_SECRET={}", if cfg.hmac_secret_set { "<set>" } else { "" });
    println!("HSM_BOOTSTRAP_PLAN={}", display(&cfg.plan_file));
    println!("HSM_BOOTSTRAP_STEP_TIMEOUT={}", cfg.step_timeout_secs);
    println!("HSM_BOOTSTRAP_POLL_INTERVAL_MS={}", cfg.poll_interval_ms);
    println!("HSM_BOOTSTRAP_SHUTDOWN_GRACE={}", cfg.shutdown_grace_secs);
    println!("HSM_STATE_DIR={}", cfg.state_dir.display());
    println!("HSM_SCRATCH_DIR={}", cfg.scratch_dir.display());
    println!("HSM_LOG_DIR={}", display(&cfg.log_dir));
    println!("HSM_WITH_BUS={}", flag(cfg.with_bus));
    println!("HSM_REQUIRE_BUS={}", flag(cfg.require_bus));
    println!("HSM_WITH_BROKER={}", flag(cfg.with_broker));
    println!("HSM_TEST_CMD={}", cfg.test_cmd);
    println!("HSM_SHELL={}", cfg.shell);
    println!("HSM_INSTALL_CMD={}", cfg.install_cmd.as_deref().unwrap_or(""));
    println!("HSM_INSTALL_TEST_CMD={}", cfg.install_test_cmd.as_deref().unwrap_or(""));
    println!("HSM_OPS_DIR={}", display(&cfg.ops_dir));
    println!("HSM_LOG_FORMAT={}", cfg.log_format.as_deref().unwrap_or(""));
}
