//! Bootstrap plan model.
//!
//! A plan is an ordered list of service descriptors forming a valid
//! topological order of an acyclic dependency graph. Every structural check
//! (names, dependencies, cycles, readiness inputs) runs when the plan is
//! constructed, before anything is launched.

pub mod defaults;
pub mod file;
mod graph;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::probe::ProbeError;

pub use defaults::{default_descriptors, default_plan, DefaultPlanOptions};
pub use file::{load_plan_file, parse_plan, PlanDocument, PlanFileError};

/// Whether a step's failure aborts the bootstrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Criticality {
    /// Timeout or early exit aborts the whole sequence.
    #[default]
    Hard,
    /// Failure is logged and the sequence continues.
    BestEffort,
}

impl fmt::Display for Criticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hard => f.pad("hard"),
            Self::BestEffort => f.pad("best-effort"),
        }
    }
}

/// External signal used as evidence that a service finished its startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum ReadinessCheck {
    /// A filesystem socket object exists at the path.
    SocketPath(PathBuf),
    /// A TCP connect to `localhost:<port>` completes.
    TcpPort(u16),
    /// The bus lists the name among its registered names.
    BusName(String),
}

impl ReadinessCheck {
    /// Signal kind as written in plan files.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SocketPath(_) => "socket-path",
            Self::TcpPort(_) => "tcp-port",
            Self::BusName(_) => "bus-name",
        }
    }

    /// Reject inputs no probe could ever satisfy.
    pub fn validate(&self) -> Result<(), ProbeError> {
        match self {
            Self::SocketPath(path) if path.as_os_str().is_empty() => Err(ProbeError::EmptySocketPath),
            Self::SocketPath(_) => Ok(()),
            Self::TcpPort(0) => Err(ProbeError::InvalidPort),
            Self::TcpPort(_) => Ok(()),
            Self::BusName(name) => {
                if is_valid_bus_name(name) {
                    Ok(())
                } else {
                    Err(ProbeError::InvalidBusName(name.clone()))
                }
            }
        }
    }
}

impl fmt::Display for ReadinessCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SocketPath(path) => write!(f, "socket-path {}", path.display()),
            Self::TcpPort(port) => write!(f, "tcp-port {}", port),
            Self::BusName(name) => write!(f, "bus-name {}", name),
        }
    }
}

/// Well-known or unique bus name: dot-separated elements of `[A-Za-z0-9_-]`,
/// at least two of them, at most 255 bytes.
fn is_valid_bus_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 255 {
        return false;
    }
    let body = name.strip_prefix(':').unwrap_or(name);
    let elements: Vec<&str> = body.split('.').collect();
    elements.len() >= 2
        && elements.iter().all(|e| {
            !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}

/// How to start a service process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StartDirective {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl StartDirective {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }
}

impl fmt::Display for StartDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// One dependency of the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub start: StartDirective,
    pub readiness: ReadinessCheck,
    pub depends_on: Vec<String>,
    pub criticality: Criticality,
    /// Overrides the sequencer's per-step timeout.
    pub timeout: Option<Duration>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, command: impl Into<String>, readiness: ReadinessCheck) -> Self {
        Self {
            name: name.into(),
            start: StartDirective::new(command),
            readiness,
            depends_on: Vec::new(),
            criticality: Criticality::Hard,
            timeout: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.start.env.insert(key.into(), value.into());
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    pub fn best_effort(mut self) -> Self {
        self.criticality = Criticality::BestEffort;
        self
    }

    pub fn criticality(mut self, criticality: Criticality) -> Self {
        self.criticality = criticality;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn is_best_effort(&self) -> bool {
        self.criticality == Criticality::BestEffort
    }
}

/// Structural problems found while building a plan.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("service name cannot be empty")]
    EmptyName,

    #[error("duplicate service name: {0}")]
    DuplicateName(String),

    #[error("service {0} has an empty start command")]
    EmptyCommand(String),

    #[error("service {service} has a malformed readiness check: {source}")]
    InvalidReadiness {
        service: String,
        #[source]
        source: ProbeError,
    },

    #[error("service {service} depends on unknown service {dependency}")]
    UnknownDependency { service: String, dependency: String },

    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("service {service} is listed before its dependency {dependency}")]
    OutOfOrder { service: String, dependency: String },
}

/// Validated, ordered sequence of service descriptors.
#[derive(Debug, Clone, Default)]
pub struct BootstrapPlan {
    steps: Vec<ServiceDescriptor>,
}

impl BootstrapPlan {
    /// Accept descriptors in the given order, which must already be a valid
    /// topological order.
    pub fn new(descriptors: Vec<ServiceDescriptor>) -> Result<Self, PlanError> {
        graph::validate(&descriptors)?;
        graph::check_order(&descriptors)?;
        Ok(Self { steps: descriptors })
    }

    /// Compute a topological order, keeping input order among independent
    /// services.
    pub fn resolve(descriptors: Vec<ServiceDescriptor>) -> Result<Self, PlanError> {
        graph::validate(&descriptors)?;
        let order = graph::stable_topological_order(&descriptors);
        let mut slots: Vec<Option<ServiceDescriptor>> = descriptors.into_iter().map(Some).collect();
        let steps = order.into_iter().filter_map(|i| slots[i].take()).collect();
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[ServiceDescriptor] {
        &self.steps
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(name: &str, port: u16) -> ServiceDescriptor {
        ServiceDescriptor::new(name, "true", ReadinessCheck::TcpPort(port))
    }

    #[test]
    fn test_new_accepts_topological_order() {
        let plan = BootstrapPlan::new(vec![svc("a", 1), svc("b", 2).depends_on("a")]).unwrap();
        assert_eq!(plan.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_new_rejects_out_of_order() {
        let err = BootstrapPlan::new(vec![svc("b", 2).depends_on("a"), svc("a", 1)]).unwrap_err();
        assert_eq!(
            err,
            PlanError::OutOfOrder {
                service: "b".into(),
                dependency: "a".into()
            }
        );
    }

    #[test]
    fn test_resolve_reorders_dependencies_first() {
        let plan = BootstrapPlan::resolve(vec![
            svc("rm", 3).depends_on("sim").depends_on("bus"),
            svc("sim", 1),
            svc("bus", 2),
        ])
        .unwrap();
        assert_eq!(plan.names(), vec!["sim", "bus", "rm"]);
    }

    #[test]
    fn test_resolve_keeps_input_order_for_independent_services() {
        let plan = BootstrapPlan::resolve(vec![svc("z", 1), svc("a", 2), svc("m", 3)]).unwrap();
        assert_eq!(plan.names(), vec!["z", "a", "m"]);
    }

    #[test]
    fn test_cycle_detected_before_order_check() {
        let err = BootstrapPlan::new(vec![
            svc("a", 1).depends_on("c"),
            svc("b", 2).depends_on("a"),
            svc("c", 3).depends_on("b"),
        ])
        .unwrap_err();
        match err {
            PlanError::Cycle(path) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = BootstrapPlan::resolve(vec![svc("a", 1).depends_on("a")]).unwrap_err();
        assert_eq!(err, PlanError::Cycle(vec!["a".into(), "a".into()]));
    }

    #[test]
    fn test_duplicate_and_unknown_names() {
        let err = BootstrapPlan::resolve(vec![svc("a", 1), svc("a", 2)]).unwrap_err();
        assert_eq!(err, PlanError::DuplicateName("a".into()));

        let err = BootstrapPlan::resolve(vec![svc("a", 1).depends_on("ghost")]).unwrap_err();
        assert!(matches!(err, PlanError::UnknownDependency { .. }));
    }

    #[test]
    fn test_malformed_readiness_rejected() {
        let err = BootstrapPlan::resolve(vec![svc("a", 0)]).unwrap_err();
        assert!(matches!(
            err,
            PlanError::InvalidReadiness {
                source: ProbeError::InvalidPort,
                ..
            }
        ));

        let bad_bus = ServiceDescriptor::new("rm", "x", ReadinessCheck::BusName("nodots".into()));
        assert!(BootstrapPlan::resolve(vec![bad_bus]).is_err());
    }

    #[test]
    fn test_bus_name_validation() {
        assert!(is_valid_bus_name("com.intel.tss2.Tabrmd"));
        assert!(is_valid_bus_name(":1.42"));
        assert!(!is_valid_bus_name(""));
        assert!(!is_valid_bus_name("com..intel"));
        assert!(!is_valid_bus_name("com.intel/x"));
    }

    #[test]
    fn test_readiness_display() {
        assert_eq!(ReadinessCheck::TcpPort(2321).to_string(), "tcp-port 2321");
        assert_eq!(
            ReadinessCheck::BusName("com.intel.tss2.Tabrmd".into()).to_string(),
            "bus-name com.intel.tss2.Tabrmd"
        );
    }
}
