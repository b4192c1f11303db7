//! Inspection subcommands: plan, ready, mode.

use serde_json::json;

use crate::config::EnvConfig;
use crate::health::{assess_entries, check_plan, HealthState};
use crate::mode::ModeController;
use crate::plan::BootstrapPlan;
use crate::probe::{ProbeConfig, SystemProbe};

use super::{load_plan, EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_SUCCESS};

/// Print the resolved launch order.
pub fn run_plan(config: &EnvConfig, json_output: bool) -> u8 {
    let plan = match load_plan(config) {
        Ok((plan, _)) => plan,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_CONFIG_ERROR;
        }
    };
    if json_output {
        match serde_json::to_string_pretty(plan.steps()) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error: {}", e);
                return EXIT_FAILURE;
            }
        }
    } else {
        print!("{}", format_plan(&plan));
    }
    EXIT_SUCCESS
}

/// One line per step: position, name, criticality, readiness, predecessors.
pub fn format_plan(plan: &BootstrapPlan) -> String {
    let mut out = String::new();
    for (i, step) in plan.iter().enumerate() {
        out.push_str(&format!("{:>2}. {} [{}] {}", i + 1, step.name, step.criticality, step.readiness));
        if !step.depends_on.is_empty() {
            out.push_str(&format!(" after {}", step.depends_on.join(", ")));
        }
        out.push('\n');
    }
    out
}

/// Probe every step once. Exit 0 unless a hard step is not ready.
pub async fn run_ready(config: &EnvConfig, json_output: bool) -> u8 {
    let plan = match load_plan(config) {
        Ok((plan, _)) => plan,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_CONFIG_ERROR;
        }
    };

    let probe = SystemProbe::new(ProbeConfig::default());
    let entries = check_plan(&probe, &plan).await;
    let state = assess_entries(&entries);

    if json_output {
        let services: Vec<_> = entries
            .iter()
            .map(|e| {
                json!({
                    "name": e.name,
                    "criticality": e.criticality,
                    "check": e.check,
                    "ready": e.ready.as_ref().ok().copied().unwrap_or(false),
                    "error": e.ready.as_ref().err().map(ToString::to_string),
                })
            })
            .collect();
        println!("{}", json!({ "state": state, "services": services }));
    } else {
        for e in &entries {
            let status = match &e.ready {
                Ok(true) => "ready".to_string(),
                Ok(false) => "not ready".to_string(),
                Err(err) => format!("error: {}", err),
            };
            println!("{:<24} {:<12} {:<40} {}", e.name, e.criticality, e.check, status);
        }
        println!("Overall: {:?}", state);
    }

    match state {
        HealthState::Healthy | HealthState::Degraded => EXIT_SUCCESS,
        HealthState::Unhealthy => EXIT_FAILURE,
    }
}

/// Print the selected mode and its profile.
pub fn run_mode(controller: &ModeController, json_output: bool) -> u8 {
    let profile = controller.profile();
    if json_output {
        println!("{}", json!({ "mode": controller.mode(), "profile": profile }));
        return EXIT_SUCCESS;
    }
    println!("mode={}", controller.mode());
    println!("install={:?}", profile.install);
    println!("workload={:?}", profile.workload);
    println!("harness={:?}", profile.harness);
    println!("log_level={}", profile.log_level);
    println!("log_format={:?}", profile.log_format);
    EXIT_SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{default_plan, DefaultPlanOptions};

    #[test]
    fn test_format_plan_lists_steps_in_order() {
        let plan = default_plan(&DefaultPlanOptions::default()).unwrap();
        let text = format_plan(&plan);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), plan.len());
        assert!(lines[0].starts_with(" 1. device-simulator [hard] tcp-port 2321"));
        assert!(text.contains("resource-manager-daemon"));
        assert!(text.contains("after device-simulator"));
    }
}
