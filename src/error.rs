//! Bootstrap error taxonomy.
//!
//! Every variant names the step that failed and the observed condition.

use std::time::Duration;

use thiserror::Error;

use crate::launcher::LaunchError;
use crate::plan::PlanError;
use crate::probe::ProbeError;

/// Broad class of a bootstrap failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed plan; detected before any launch.
    Configuration,
    /// A start directive could not be executed.
    Launch,
    /// A hard step did not become ready.
    Readiness,
    /// Interrupted by a shutdown signal.
    Cancelled,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("invalid bootstrap plan: {0}")]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("step {service} timed out after {waited:?} waiting for {check}")]
    Timeout {
        service: String,
        check: String,
        waited: Duration,
    },

    #[error("step {service} exited with {status} before becoming ready")]
    ExitedEarly { service: String, status: String },

    #[error("step {service} cannot start: dependency {dependency} is not ready")]
    DependencyNotReady { service: String, dependency: String },

    #[error("step {service} has a malformed readiness check: {source}")]
    Probe {
        service: String,
        #[source]
        source: ProbeError,
    },

    #[error("bootstrap cancelled while waiting for {service}")]
    Cancelled { service: String },
}

impl BootstrapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Plan(_) | Self::Probe { .. } => ErrorKind::Configuration,
            Self::Launch(_) => ErrorKind::Launch,
            Self::Timeout { .. } | Self::ExitedEarly { .. } | Self::DependencyNotReady { .. } => {
                ErrorKind::Readiness
            }
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// The step that failed, when the failure belongs to one.
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::Plan(_) => None,
            Self::Launch(e) => Some(e.service()),
            Self::Timeout { service, .. }
            | Self::ExitedEarly { service, .. }
            | Self::DependencyNotReady { service, .. }
            | Self::Probe { service, .. }
            | Self::Cancelled { service } => Some(service),
        }
    }

    /// CLI exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Configuration => crate::cli::EXIT_CONFIG_ERROR,
            ErrorKind::Launch => crate::cli::EXIT_LAUNCH_ERROR,
            ErrorKind::Readiness | ErrorKind::Cancelled => crate::cli::EXIT_FAILURE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_step_and_duration() {
        let err = BootstrapError::Timeout {
            service: "device-simulator".into(),
            check: "tcp-port 2321".into(),
            waited: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "step device-simulator timed out after 30s waiting for tcp-port 2321"
        );
        assert_eq!(err.kind(), ErrorKind::Readiness);
        assert_eq!(err.service(), Some("device-simulator"));
    }

    #[test]
    fn test_plan_errors_are_configuration() {
        let err = BootstrapError::from(PlanError::Cycle(vec!["a".into(), "a".into()]));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.service(), None);
        assert_eq!(err.exit_code(), crate::cli::EXIT_CONFIG_ERROR);
    }

    #[test]
    fn test_launch_errors_name_the_service() {
        let err = BootstrapError::from(LaunchError::NotFound {
            service: "resource-manager-daemon".into(),
            command: "tpm2-abrmd".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Launch);
        assert_eq!(err.service(), Some("resource-manager-daemon"));
        assert!(err.to_string().contains("tpm2-abrmd not found"));
    }
}
