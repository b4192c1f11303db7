//! Deployment mode selection.
//!
//! The mode is chosen once at startup from an explicit [`ModeSignals`] value
//! and never changes afterwards. Each mode maps to a fixed [`ModeProfile`].

use std::fmt;

use serde::Serialize;

use crate::telemetry::{LogConfig, LogFormat};

/// Env var that selects unit-test mode.
pub const UNIT_TEST_VAR: &str = "HSM_UNIT_TEST";
/// Env var that selects development mode.
pub const DEV_MODE_VAR: &str = "HSM_DEV_MODE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    Development,
    Production,
    UnitTest,
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::UnitTest => "unit_test",
        };
        f.pad(s)
    }
}

/// Whether `value` switches a flag on: `1`, `true`, `yes` or `on`, any case.
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Presence of each mode signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeSignals {
    pub dev: bool,
    pub unit_test: bool,
}

impl ModeSignals {
    pub fn new(dev: bool, unit_test: bool) -> Self {
        Self { dev, unit_test }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build signals from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).is_some_and(|v| is_truthy(&v));
        Self {
            dev: flag(DEV_MODE_VAR),
            unit_test: flag(UNIT_TEST_VAR),
        }
    }
}

/// UnitTest wins over Development, which wins over Production.
pub fn select_mode(signals: ModeSignals) -> DeploymentMode {
    if signals.unit_test {
        DeploymentMode::UnitTest
    } else if signals.dev {
        DeploymentMode::Development
    } else {
        DeploymentMode::Production
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallBehavior {
    InstallWithTestExtras,
    InstallMinimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Workload {
    RunAutomatedTests,
    InteractiveSession,
    NoOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HarnessKind {
    Mock,
    Real,
}

/// Fixed configuration implied by a mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeProfile {
    pub install: InstallBehavior,
    pub workload: Workload,
    pub harness: HarnessKind,
    pub log_level: &'static str,
    pub log_format: LogFormat,
}

impl DeploymentMode {
    pub fn profile(self) -> ModeProfile {
        match self {
            Self::UnitTest => ModeProfile {
                install: InstallBehavior::InstallWithTestExtras,
                workload: Workload::RunAutomatedTests,
                harness: HarnessKind::Mock,
                log_level: "info",
                log_format: LogFormat::Pretty,
            },
            Self::Development => ModeProfile {
                install: InstallBehavior::InstallWithTestExtras,
                workload: Workload::InteractiveSession,
                harness: HarnessKind::Mock,
                log_level: "debug",
                log_format: LogFormat::Pretty,
            },
            Self::Production => ModeProfile {
                install: InstallBehavior::InstallMinimal,
                workload: Workload::NoOp,
                harness: HarnessKind::Real,
                log_level: "info",
                log_format: LogFormat::Json,
            },
        }
    }
}

/// Holds the mode selected at startup.
#[derive(Debug, Clone)]
pub struct ModeController {
    mode: DeploymentMode,
    profile: ModeProfile,
}

impl ModeController {
    pub fn new(signals: ModeSignals) -> Self {
        let mode = select_mode(signals);
        Self {
            mode,
            profile: mode.profile(),
        }
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn profile(&self) -> &ModeProfile {
        &self.profile
    }

    /// Logging from the profile, with an explicit format taking precedence.
    pub fn log_config(&self, format: Option<LogFormat>) -> LogConfig {
        LogConfig {
            format: format.unwrap_or(self.profile.log_format),
            level: self.profile.log_level.to_string(),
            output_path: None,
        }
    }
}
