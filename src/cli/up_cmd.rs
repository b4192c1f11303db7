//! `up`: bootstrap every service, hand control to the workload, tear down.

use tracing::{error, info, warn};

use crate::config::EnvConfig;
use crate::health::BootstrapReport;
use crate::launcher::ProcessLauncher;
use crate::mode::ModeController;
use crate::probe::{ProbeConfig, SystemProbe};
use crate::sequencer::BootstrapSequencer;
use crate::shutdown::{cancel_on_signal, ShutdownResult};
use crate::workload::WorkloadRunner;

use super::{load_plan, EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_LAUNCH_ERROR};

pub async fn run_up(config: &EnvConfig, controller: &ModeController, json_output: bool) -> u8 {
    let (plan, timing) = match load_plan(config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_CONFIG_ERROR;
        }
    };

    if config.plan_file.is_none() {
        if let Err(e) = std::fs::create_dir_all(&config.state_dir) {
            eprintln!("Error: cannot create state directory {}: {}", config.state_dir.display(), e);
            return EXIT_LAUNCH_ERROR;
        }
    }

    let mut launcher = ProcessLauncher::new();
    if let Some(dir) = &config.log_dir {
        launcher = launcher.with_log_dir(dir);
    }
    let probe = SystemProbe::new(ProbeConfig::default());
    let mut sequencer = BootstrapSequencer::new(launcher, probe, timing);
    let token = sequencer.cancellation_token();
    let signal_task = cancel_on_signal(token.clone());

    info!(mode = %controller.mode(), steps = plan.len(), "starting bootstrap");
    let code = match sequencer.run(&plan).await {
        Ok(report) => {
            print_report(&report, json_output);
            let runner = WorkloadRunner::from_config(controller.profile(), config);
            match runner.run(&token).await {
                Ok(code) => u8::try_from(code).unwrap_or(EXIT_FAILURE),
                Err(e) => {
                    error!(error = %e, "workload failed");
                    eprintln!("Error: {}", e);
                    EXIT_FAILURE
                }
            }
        }
        Err(e) => {
            error!(error = %e, kind = ?e.kind(), "bootstrap failed");
            eprintln!("Bootstrap failed: {}", e);
            if json_output {
                print_report(&sequencer.report(), true);
            }
            e.exit_code()
        }
    };

    match sequencer.shutdown().await {
        ShutdownResult::Complete => info!("all services stopped"),
        ShutdownResult::Timeout { remaining } => {
            warn!(remaining = ?remaining, "services still running after shutdown grace")
        }
    }
    token.cancel();
    let _ = signal_task.await;
    code
}

fn print_report(report: &BootstrapReport, json_output: bool) {
    if json_output {
        match serde_json::to_string_pretty(report) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Error: failed to serialize report: {}", e),
        }
        return;
    }
    eprintln!("Bootstrap {:?} in {}ms", report.state, report.elapsed_ms);
    for svc in &report.services {
        let pid = svc.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        match &svc.failure {
            Some(failure) => eprintln!("  {:<24} {:<8} pid={:<8} {}", svc.name, svc.state, pid, failure),
            None => eprintln!("  {:<24} {:<8} pid={}", svc.name, svc.state, pid),
        }
    }
}
