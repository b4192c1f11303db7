//! Device operation subcommands: provision, cert, random.

use crate::config::EnvConfig;
use crate::harness::{Operation, OperationResult, OperationRunner};
use crate::mode::{HarnessKind, ModeProfile};

/// Runner matching the mode's harness kind. A real runner without an ops
/// directory refuses every operation.
pub fn runner_for(profile: &ModeProfile, config: &EnvConfig) -> OperationRunner {
    match (profile.harness, &config.ops_dir) {
        (HarnessKind::Mock, _) => OperationRunner::mock(&config.scratch_dir),
        (HarnessKind::Real, Some(dir)) => OperationRunner::from_ops_dir(&config.scratch_dir, dir),
        (HarnessKind::Real, None) => OperationRunner::real(&config.scratch_dir),
    }
}

/// Run one operation and return the process exit code.
pub async fn run_operation(runner: &OperationRunner, operation: Operation, args: &[String], json: bool) -> u8 {
    match runner.run(operation, args).await {
        Ok(result) => {
            print_result(&result, json);
            exit_code(result.exit_code)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(super::EXIT_FAILURE)
}

fn print_result(result: &OperationResult, json: bool) {
    if json {
        match serde_json::to_string_pretty(result) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Error: failed to serialize result: {}", e),
        }
        return;
    }
    if let Some(message) = &result.message {
        if !message.is_empty() {
            println!("{}", message);
        }
    }
    if let Some(diagnostic) = &result.diagnostic {
        if !diagnostic.is_empty() {
            eprintln!("{}", diagnostic);
        }
    }
}
