//! TOML plan files.
//!
//! ```toml
//! step_timeout_secs = 30
//! poll_interval_ms = 1000
//!
//! [[service]]
//! name = "device-simulator"
//! command = "swtpm"
//! args = ["socket", "--tpm2", "--server", "type=tcp,port=2321"]
//! readiness = { kind = "tcp-port", value = 2321 }
//!
//! [[service]]
//! name = "resource-manager-daemon"
//! command = "tpm2-abrmd"
//! depends_on = ["device-simulator"]
//! readiness = { kind = "bus-name", value = "com.intel.tss2.Tabrmd" }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::config::{MIN_POLL_INTERVAL_MS, MIN_STEP_TIMEOUT_SECS};

use super::{BootstrapPlan, Criticality, PlanError, ReadinessCheck, ServiceDescriptor, StartDirective};

#[derive(Debug, Error)]
pub enum PlanFileError {
    #[error("failed to read plan file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse plan file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPlan {
    step_timeout_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
    #[serde(default)]
    service: Vec<RawService>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawService {
    name: String,
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
    readiness: ReadinessCheck,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    criticality: Criticality,
    timeout_secs: Option<u64>,
}

impl From<RawService> for ServiceDescriptor {
    fn from(raw: RawService) -> Self {
        Self {
            name: raw.name,
            start: StartDirective {
                command: raw.command,
                args: raw.args,
                env: raw.env,
                cwd: raw.cwd,
            },
            readiness: raw.readiness,
            depends_on: raw.depends_on,
            criticality: raw.criticality,
            timeout: raw.timeout_secs.map(step_timeout),
        }
    }
}

/// Timeouts get the same floor as the environment loader's.
fn step_timeout(secs: u64) -> Duration {
    Duration::from_secs(secs.max(MIN_STEP_TIMEOUT_SECS))
}

/// A validated plan plus the timing overrides declared alongside it.
#[derive(Debug, Clone)]
pub struct PlanDocument {
    pub plan: BootstrapPlan,
    pub step_timeout: Option<Duration>,
    pub poll_interval: Option<Duration>,
}

/// Parse plan text. Services may be listed in any order that is acyclic.
pub fn parse_plan(text: &str) -> Result<PlanDocument, PlanFileError> {
    let raw: RawPlan = toml::from_str(text)?;
    let descriptors = raw.service.into_iter().map(ServiceDescriptor::from).collect();
    let plan = BootstrapPlan::resolve(descriptors)?;
    Ok(PlanDocument {
        plan,
        step_timeout: raw.step_timeout_secs.map(step_timeout),
        poll_interval: raw
            .poll_interval_ms
            .map(|ms| Duration::from_millis(ms.max(MIN_POLL_INTERVAL_MS))),
    })
}

pub fn load_plan_file(path: &Path) -> Result<PlanDocument, PlanFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| PlanFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_plan(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
step_timeout_secs = 45
poll_interval_ms = 250

[[service]]
name = "resource-manager-daemon"
command = "tpm2-abrmd"
args = ["--allow-root"]
depends_on = ["device-simulator", "bus-daemon"]
readiness = { kind = "bus-name", value = "com.intel.tss2.Tabrmd" }

[[service]]
name = "device-simulator"
command = "swtpm"
timeout_secs = 10
readiness = { kind = "tcp-port", value = 2321 }

[[service]]
name = "bus-daemon"
command = "dbus-daemon"
criticality = "best-effort"
readiness = { kind = "socket-path", value = "/run/dbus/system_bus_socket" }
"#;

    #[test]
    fn test_parse_sample_plan() {
        let doc = parse_plan(SAMPLE).unwrap();
        assert_eq!(doc.step_timeout, Some(Duration::from_secs(45)));
        assert_eq!(doc.poll_interval, Some(Duration::from_millis(250)));
        assert_eq!(
            doc.plan.names(),
            vec!["device-simulator", "bus-daemon", "resource-manager-daemon"]
        );

        let sim = doc.plan.get("device-simulator").unwrap();
        assert_eq!(sim.timeout, Some(Duration::from_secs(10)));
        assert_eq!(sim.readiness, ReadinessCheck::TcpPort(2321));

        let bus = doc.plan.get("bus-daemon").unwrap();
        assert!(bus.is_best_effort());
    }

    #[test]
    fn test_zero_timing_values_are_floored() {
        let text = r#"
step_timeout_secs = 0
poll_interval_ms = 0

[[service]]
name = "sim"
command = "swtpm"
timeout_secs = 0
readiness = { kind = "tcp-port", value = 2321 }
"#;
        let doc = parse_plan(text).unwrap();
        assert_eq!(doc.step_timeout, Some(Duration::from_secs(1)));
        assert_eq!(doc.poll_interval, Some(Duration::from_millis(10)));
        assert_eq!(doc.plan.get("sim").unwrap().timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_unknown_signal_kind_is_parse_error() {
        let text = r#"
[[service]]
name = "x"
command = "x"
readiness = { kind = "pid-file", value = "/run/x.pid" }
"#;
        assert!(matches!(parse_plan(text), Err(PlanFileError::Parse(_))));
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        let text = r#"
[[service]]
name = "x"
command = "x"
restart = "always"
readiness = { kind = "tcp-port", value = 80 }
"#;
        assert!(matches!(parse_plan(text), Err(PlanFileError::Parse(_))));
    }

    #[test]
    fn test_cycle_in_file_is_plan_error() {
        let text = r#"
[[service]]
name = "a"
command = "a"
depends_on = ["b"]
readiness = { kind = "tcp-port", value = 1 }

[[service]]
name = "b"
command = "b"
depends_on = ["a"]
readiness = { kind = "tcp-port", value = 2 }
"#;
        assert!(matches!(
            parse_plan(text),
            Err(PlanFileError::Plan(PlanError::Cycle(_)))
        ));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = load_plan_file(Path::new("/nonexistent/plan.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/plan.toml"));
    }
}
