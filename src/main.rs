//! hsm-bootstrap entry point.
//!
//! Brings up the simulated security-module environment with:
//! - Deployment mode selection from the environment
//! - Ordered service launch with readiness gating
//! - Workload hand-off and reverse-order teardown
//!
//! ## CLI Subcommands
//!
//! - `hsm-bootstrap` or `hsm-bootstrap up` - Bootstrap and run the workload (default)
//! - `hsm-bootstrap plan` - Print the resolved launch order
//! - `hsm-bootstrap ready` - One-shot readiness check (exit 0/1)
//! - `hsm-bootstrap provision|cert|random` - Device operations

use std::process::ExitCode;

use hsm_bootstrap::cli::{config_cmd, harness_cmd, plan_cmd, up_cmd, EXIT_CONFIG_ERROR};
use hsm_bootstrap::config::{self as hsm_config, EnvConfig};
use hsm_bootstrap::harness::Operation;
use hsm_bootstrap::mode::ModeController;
use hsm_bootstrap::telemetry::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("up");
    let rest = args.get(2..).unwrap_or_default();
    let json_output = rest.iter().any(|a| a == "--json");

    let config = hsm_config::load();
    let controller = ModeController::new(config.signals);

    match command {
        "up" | "" => {
            init_mode_logging(&controller, &config);
            ExitCode::from(up_cmd::run_up(&config, &controller, json_output).await)
        }
        "plan" => ExitCode::from(plan_cmd::run_plan(&config, json_output)),
        "ready" | "readiness" => {
            init_mode_logging(&controller, &config);
            ExitCode::from(plan_cmd::run_ready(&config, json_output).await)
        }
        "mode" => ExitCode::from(plan_cmd::run_mode(&controller, json_output)),
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("hsm-bootstrap {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    config_cmd::run_show();
                    ExitCode::SUCCESS
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => ExitCode::from(config_cmd::run_validate()),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::from(EXIT_CONFIG_ERROR)
                }
            }
        }
        other => match other.parse::<Operation>() {
            Ok(operation) => {
                init_mode_logging(&controller, &config);
                let op_args: Vec<String> = rest.iter().filter(|a| *a != "--json").cloned().collect();
                let runner = harness_cmd::runner_for(controller.profile(), &config);
                ExitCode::from(harness_cmd::run_operation(&runner, operation, &op_args, json_output).await)
            }
            Err(_) => {
                eprintln!("Unknown command: {}", command);
                print_usage();
                ExitCode::FAILURE
            }
        },
    }
}

/// Logging defaults come from the mode profile, `HSM_LOG_FORMAT` overrides
/// the format and `RUST_LOG` the level.
fn init_mode_logging(controller: &ModeController, config: &EnvConfig) {
    let format = match config.log_format() {
        Ok(format) => format,
        Err(e) => {
            eprintln!("Warning: ignoring HSM_LOG_FORMAT: {}", e);
            None
        }
    };
    let log_config = controller.log_config(format).with_env_override();
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Warning: logging disabled: {}", e);
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "hsm-bootstrap - Security-module test environment orchestrator v{}

USAGE:
    hsm-bootstrap [COMMAND] [OPTIONS]

COMMANDS:
    up           Bootstrap services, run the workload, tear down (default)
    plan         Print the resolved launch order
    ready        Probe every service once (exit 0 if healthy)
    mode         Show the selected deployment mode and its profile
    provision    Provision a signing key
    cert         Issue a self-signed certificate
    random       Generate random bytes
    config       Manage configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

OPTIONS:
    -h, --help     Show help for command
    -V, --version  Show version information
    --json         Machine-readable output

EXAMPLES:
    hsm-bootstrap                      # Bootstrap and run the workload
    HSM_UNIT_TEST=1 hsm-bootstrap up   # Run the automated test suite
    hsm-bootstrap plan                 # Show launch order
    hsm-bootstrap random 64            # 64 bytes into the scratch directory
    hsm-bootstrap config validate      # Validate configuration

ENVIRONMENT:
    HSM_UNIT_TEST        Select unit-test mode
    HSM_DEV_MODE         Select development mode
    HSM_BOOTSTRAP_PLAN   TOML plan file replacing the built-in plan
    HSM_SCRATCH_DIR      Directory for operation artifacts
    RUST_LOG             Log level (debug, info, warn, error)

EXIT CODES:
    0    Success / Healthy
    1    Bootstrap or workload failure
    2    Configuration error
    3    Launch error
    126  Operation refused
    127  Operation executable missing
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "up" => {
            eprintln!(
                "hsm-bootstrap up - Bootstrap and run the workload

USAGE:
    hsm-bootstrap up [--json]

DESCRIPTION:
    Launches each service of the plan in order, waiting for its readiness
    signal before starting the next. Then runs the workload selected by the
    deployment mode: the test command (unit-test), an interactive shell
    (development) or nothing until a shutdown signal (production). Services
    are stopped in reverse order on exit.

OPTIONS:
    --json    Print the bootstrap report as JSON
"
            );
        }
        "plan" => {
            eprintln!(
                "hsm-bootstrap plan - Print the resolved launch order

USAGE:
    hsm-bootstrap plan [--json]
"
            );
        }
        "ready" => {
            eprintln!(
                "hsm-bootstrap ready - One-shot readiness check

USAGE:
    hsm-bootstrap ready [--json]

DESCRIPTION:
    Probes every service in the plan once without launching anything.

EXIT CODES:
    0  Every hard service is ready
    1  A hard service is not ready
"
            );
        }
        "provision" => {
            eprintln!(
                "hsm-bootstrap provision - Provision a signing key

USAGE:
    hsm-bootstrap provision [--test-mode] [--fail]

EXIT CODES:
    0  Signing key and handle written
    1  Forced failure
"
            );
        }
        "cert" => {
            eprintln!(
                "hsm-bootstrap cert - Issue a self-signed certificate

USAGE:
    hsm-bootstrap cert

EXIT CODES:
    0  Certificate and key id written
    2  Certificate already exists
"
            );
        }
        "random" => {
            eprintln!(
                "hsm-bootstrap random - Generate random bytes

USAGE:
    hsm-bootstrap random [SIZE]

SIZE defaults to 32 and may not exceed 1024.

EXIT CODES:
    0  Bytes written
    3  SIZE is not a non-negative integer
    4  SIZE is too large
"
            );
        }
        "config" => {
            eprintln!(
                "hsm-bootstrap config - Manage configuration

USAGE:
    hsm-bootstrap config <SUBCOMMAND>

SUBCOMMANDS:
    show       Show effective configuration
    defaults   Show default values
    validate   Validate configuration and plan (exit 2 on error)
"
            );
        }
        _ => {
            eprintln!("No detailed help for: {}", command);
            print_usage();
        }
    }
}
