//! hsm-bootstrap
//!
//! Bootstrap and readiness-gating orchestrator for security-module test
//! environments. Brings up a device simulator, its resource manager and the
//! optional bus and message broker in dependency order, and gates all later
//! work until each has published its readiness signal.
//!
//! # Components
//!
//! - [`probe`]: side-effect-free readiness predicates
//! - [`launcher`]: starts service processes without waiting on them
//! - [`sequencer`]: drives launch then probe per step, with bounded waits
//! - [`mode`]: selects Development, Production or UnitTest once at startup
//! - [`harness`]: deterministic mock device operations and the runner that
//!   dispatches to them or to real executables

pub mod cli;
pub mod config;
pub mod error;
pub mod harness;
pub mod health;
pub mod launcher;
pub mod mode;
pub mod plan;
pub mod probe;
pub mod sequencer;
pub mod service;
pub mod shutdown;
pub mod telemetry;
pub mod workload;

pub use error::{BootstrapError, ErrorKind};
pub use health::{BootstrapReport, HealthState};
pub use launcher::{LaunchError, ProcessLauncher, ServiceHandle, ServiceLauncher};
pub use mode::{select_mode, DeploymentMode, ModeController, ModeProfile, ModeSignals};
pub use plan::{BootstrapPlan, Criticality, PlanError, ReadinessCheck, ServiceDescriptor};
pub use probe::{ProbeError, ReadinessProbe, SystemProbe};
pub use sequencer::{BootstrapSequencer, SequencerConfig};
pub use service::{RunningService, ServiceState};
