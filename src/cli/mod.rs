//! CLI subcommands for the bootstrap orchestrator.
//!
//! ## Usage
//!
//! ```bash
//! hsm-bootstrap              # Bootstrap, run the workload, tear down
//! hsm-bootstrap plan         # Print the resolved launch order
//! hsm-bootstrap ready        # Probe every step once, exit 0 if healthy
//! hsm-bootstrap random 64    # Run a device operation
//! ```

pub mod config_cmd;
pub mod harness_cmd;
pub mod plan_cmd;
pub mod up_cmd;

use crate::config::EnvConfig;
use crate::plan::{default_plan, load_plan_file, BootstrapPlan, PlanFileError};
use crate::sequencer::SequencerConfig;

pub const EXIT_SUCCESS: u8 = 0;
/// Bootstrap or workload failure, or an unhealthy readiness check.
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_LAUNCH_ERROR: u8 = 3;
/// Operation refused: not registered, or digest mismatch.
pub const EXIT_REFUSED: u8 = 126;
/// Operation executable missing.
pub const EXIT_NOT_FOUND: u8 = 127;

/// The plan to run and the sequencer timing, with plan-file settings
/// taking precedence over the environment.
pub fn load_plan(config: &EnvConfig) -> Result<(BootstrapPlan, SequencerConfig), PlanFileError> {
    let mut timing = config.sequencer_config();
    let Some(path) = &config.plan_file else {
        let plan = default_plan(&config.plan_options()).map_err(PlanFileError::Plan)?;
        return Ok((plan, timing));
    };

    let doc = load_plan_file(path)?;
    if let Some(step_timeout) = doc.step_timeout {
        timing.step_timeout = step_timeout;
    }
    if let Some(poll_interval) = doc.poll_interval {
        timing.poll_interval = poll_interval;
    }
    Ok((doc.plan, timing))
}
